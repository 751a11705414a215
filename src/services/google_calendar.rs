// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google OAuth and Calendar API client.
//!
//! Handles:
//! - Consent-screen URL construction (offline access, forced consent)
//! - Authorization code and refresh token exchanges
//! - Listing upcoming events for the trips view

use crate::config::Config;
use crate::db::FirestoreDb;
use crate::error::AppError;
use crate::models::calendar::{CalendarEventProjection, EventTime};
use crate::models::CalendarCredential;
use crate::services::kms::{self, KmsService};
use crate::services::oauth_state;
use crate::time_utils::{format_utc_rfc3339, format_utc_rfc3339_millis};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on event pages fetched for one sync.
const MAX_EVENT_PAGES: usize = 10;

/// Google OAuth + Calendar API client.
#[derive(Clone)]
pub struct GoogleClient {
    http: reqwest::Client,
    auth_url: String,
    token_url: String,
    calendar_api_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scope: String,
}

impl GoogleClient {
    /// Create a new Google client with OAuth credentials from config.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            auth_url: config.google_auth_url.clone(),
            token_url: config.google_token_url.clone(),
            calendar_api_url: config.google_calendar_api_url.trim_end_matches('/').to_string(),
            client_id: config.google_client_id.clone(),
            client_secret: config.google_client_secret.clone(),
            redirect_uri: config.google_redirect_uri.clone(),
            scope: config.calendar_scope.clone(),
        })
    }

    /// Scopes requested on the consent screen.
    pub fn scopes(&self) -> Vec<String> {
        self.scope.split_whitespace().map(String::from).collect()
    }

    /// Build the consent-screen URL carrying `state`.
    ///
    /// `access_type=offline` asks for a refresh token and `prompt=consent`
    /// makes Google issue one even for returning users.
    pub fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?\
             client_id={}&\
             redirect_uri={}&\
             response_type=code&\
             access_type=offline&\
             prompt=consent&\
             scope={}&\
             include_granted_scopes=true&\
             state={}",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&self.scope),
            urlencoding::encode(state)
        )
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Token exchange request failed: {}", e)))?;

        self.check_response_json(response, "Google token exchange")
            .await
    }

    /// Exchange a stored refresh token for a fresh access token.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Token refresh request failed: {}", e)))?;

        self.check_response_json(response, "Google token refresh")
            .await
    }

    /// List events on the primary calendar within `[time_min, time_max]`.
    ///
    /// Recurring events are expanded into single occurrences and results are
    /// ordered by start time.
    pub async fn list_events(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<GoogleEvent>, AppError> {
        let url = format!("{}/calendars/primary/events", self.calendar_api_url);
        let time_min = format_utc_rfc3339_millis(time_min);
        let time_max = format_utc_rfc3339_millis(time_max);

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_EVENT_PAGES {
            let mut query = vec![
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("timeMin", time_min.clone()),
                ("timeMax", time_max.clone()),
            ];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }

            let response = self
                .http
                .get(&url)
                .bearer_auth(access_token)
                .query(&query)
                .send()
                .await
                .map_err(|e| AppError::Upstream(format!("Calendar API request failed: {}", e)))?;

            let page: EventsPage = self
                .check_response_json(response, "Google Calendar API")
                .await?;
            events.extend(page.items);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(events),
            }
        }

        tracing::warn!(
            pages = MAX_EVENT_PAGES,
            events = events.len(),
            "Calendar listing truncated at page limit"
        );
        Ok(events)
    }

    /// Check response status and parse JSON, logging provider bodies on failure.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
        what: &str,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "{} failed", what);
            return Err(AppError::Upstream(format!(
                "{} failed with status {}",
                what, status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("{}: JSON parse error: {}", what, e)))
    }
}

/// Token endpoint response (both grant types).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Only present on code exchange with offline access and fresh consent.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Event as returned by the Calendar API (fields we use).
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleEvent {
    pub id: String,
    pub summary: Option<String>,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
    pub location: Option<String>,
}

impl From<GoogleEvent> for CalendarEventProjection {
    fn from(event: GoogleEvent) -> Self {
        Self {
            id: event.id,
            summary: event.summary,
            start: event.start,
            end: event.end,
            location: event.location,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    next_page_token: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// GoogleCalendarService - connect / callback / sync workflow
// ─────────────────────────────────────────────────────────────────────────────

/// Days of upcoming events returned by a sync.
pub const SYNC_WINDOW_DAYS: i64 = 7;

/// High-level calendar service tying OAuth, storage and the Calendar API.
///
/// Holds no per-user state: every sync reads the stored refresh token and
/// mints a fresh access token.
#[derive(Clone)]
pub struct GoogleCalendarService {
    client: GoogleClient,
    db: FirestoreDb,
    kms: KmsService,
    state_key: Vec<u8>,
}

impl GoogleCalendarService {
    pub fn new(client: GoogleClient, db: FirestoreDb, kms: KmsService, state_key: Vec<u8>) -> Self {
        Self {
            client,
            db,
            kms,
            state_key,
        }
    }

    // ─── Connect ─────────────────────────────────────────────────────────────

    /// Consent-screen URL for `user_id`. Nothing is persisted yet.
    pub fn authorization_url(&self, user_id: &str) -> Result<String, AppError> {
        if user_id.is_empty() {
            return Err(AppError::MissingParameter("userId"));
        }

        let state = oauth_state::encode_state(user_id, &self.state_key)?;
        Ok(self.client.authorization_url(&state))
    }

    // ─── OAuth Callback Handling ─────────────────────────────────────────────

    /// Exchange `code`, then store the refresh token for the user named in `state`.
    ///
    /// Returns the connected user id.
    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
    ) -> Result<String, AppError> {
        let user_id = oauth_state::decode_state(state, &self.state_key)
            .map_err(|e| {
                tracing::warn!(reason = %e, "Rejected OAuth state");
                e
            })?
            .user_id;

        let tokens = self.client.exchange_code(code).await?;

        let refresh_token = tokens
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                tracing::warn!(user_id = %user_id, "Token response had no refresh_token");
                AppError::MissingRefreshToken
            })?;

        let scopes = tokens
            .scope
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_else(|| self.client.scopes());

        let credential = CalendarCredential {
            user_id: user_id.clone(),
            refresh_token_encrypted: kms::encrypt_refresh_token(&self.kms, &refresh_token, &user_id)
                .await?,
            connected_at: format_utc_rfc3339(Utc::now()),
            scopes,
        };

        self.db.set_credential(&credential).await?;

        tracing::info!(user_id = %user_id, "Google Calendar connected");
        Ok(user_id)
    }

    // ─── Sync ────────────────────────────────────────────────────────────────

    /// Upcoming events for `user_id` over the next `SYNC_WINDOW_DAYS` days.
    pub async fn sync_events(
        &self,
        user_id: &str,
    ) -> Result<Vec<CalendarEventProjection>, AppError> {
        let credential = self
            .db
            .get_credential(user_id)
            .await?
            .filter(|c| !c.refresh_token_encrypted.is_empty())
            .ok_or(AppError::NotConnected)?;

        let refresh_token =
            kms::decrypt_refresh_token(&self.kms, &credential.refresh_token_encrypted, user_id)
                .await?;

        let tokens = self.client.refresh_access_token(&refresh_token).await?;

        let time_min = Utc::now();
        let time_max = time_min + chrono::Duration::days(SYNC_WINDOW_DAYS);
        let events = self
            .client
            .list_events(&tokens.access_token, time_min, time_max)
            .await?;

        tracing::info!(user_id = %user_id, count = events.len(), "Calendar synced");

        Ok(events.into_iter().map(CalendarEventProjection::from).collect())
    }

    // ─── Disconnect ──────────────────────────────────────────────────────────

    /// Forget the stored credential. Google-side access stays granted until
    /// the user revokes it in their account settings.
    pub async fn disconnect(&self, user_id: &str) -> Result<(), AppError> {
        self.db.delete_credential(user_id).await?;
        tracing::info!(user_id = %user_id, "Google Calendar disconnected");
        Ok(())
    }
}
