// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Calendar connection and event models.

use serde::{Deserialize, Serialize};

/// A user's stored Google Calendar connection (encrypted in Firestore).
///
/// One document per user, keyed by `user_id`. Writes overwrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarCredential {
    /// Identity subject of the owning user (also used as document ID)
    pub user_id: String,
    /// Encrypted refresh token (base64)
    pub refresh_token_encrypted: String,
    /// When the calendar was (re)connected (RFC 3339)
    pub connected_at: String,
    /// Granted OAuth scopes
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Start or end of a calendar event, as reported by Google.
///
/// Timed events carry `dateTime`; all-day events carry `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// Upcoming calendar event reshaped for the trips view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEventProjection {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EventTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EventTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}
