// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Saved trip model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status assigned to trips created without one.
pub const DEFAULT_TRIP_STATUS: &str = "planned";

/// Trip stored in Firestore and returned by the API.
///
/// The plan payloads are produced by the frontend and stored as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    /// Server-generated UUID (also used as document ID)
    pub trip_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Creation time (RFC 3339)
    pub generated_at: String,
    pub status: String,
    #[serde(default)]
    pub basics: Value,
    #[serde(default)]
    pub preferences: Value,
    #[serde(default)]
    pub plan_result: Value,
    #[serde(default)]
    pub map: Value,
}

/// Client-supplied fields for a new trip.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTrip {
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub basics: Option<Value>,
    pub preferences: Option<Value>,
    pub plan_result: Option<Value>,
    pub map: Option<Value>,
}

impl Trip {
    /// Build a trip from request fields, filling in server-owned values.
    pub fn from_new(new: NewTrip, trip_id: String, generated_at: String) -> Self {
        Self {
            trip_id,
            user_id: new.user_id.filter(|id| !id.is_empty()),
            generated_at,
            status: new
                .status
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_TRIP_STATUS.to_string()),
            basics: new.basics.unwrap_or(Value::Null),
            preferences: new.preferences.unwrap_or(Value::Null),
            plan_result: new.plan_result.unwrap_or(Value::Null),
            map: new.map.unwrap_or(Value::Null),
        }
    }
}
