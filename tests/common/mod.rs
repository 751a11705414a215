// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use trip_calendar::config::{Config, IdentityKeySource};
use trip_calendar::db::FirestoreDb;
use trip_calendar::routes::create_router;
use trip_calendar::services::{GoogleCalendarService, GoogleClient, IdentityVerifier, KmsService};
use trip_calendar::AppState;

/// Refresh token issued by the fake provider on code exchange.
#[allow(dead_code)]
pub const FAKE_REFRESH_TOKEN: &str = "fake-refresh-token";
/// Access token issued by the fake provider on refresh.
#[allow(dead_code)]
pub const FAKE_ACCESS_TOKEN: &str = "fake-access-token";

/// How the fake Google endpoints respond.
#[derive(Clone)]
pub struct FakeGoogleBehavior {
    pub token_status: StatusCode,
    pub issue_refresh_token: bool,
    pub events_status: StatusCode,
    pub events: serde_json::Value,
    /// Split `events` into pages of this size, linked by `nextPageToken`.
    pub events_page_size: Option<usize>,
}

impl Default for FakeGoogleBehavior {
    fn default() -> Self {
        Self {
            token_status: StatusCode::OK,
            issue_refresh_token: true,
            events_status: StatusCode::OK,
            events: serde_json::json!([]),
            events_page_size: None,
        }
    }
}

/// Requests observed by the fake provider.
#[derive(Default)]
pub struct FakeGoogleLog {
    pub token_calls: AtomicUsize,
    pub events_calls: AtomicUsize,
    pub token_forms: Mutex<Vec<HashMap<String, String>>>,
    pub events_queries: Mutex<Vec<HashMap<String, String>>>,
}

#[allow(dead_code)]
impl FakeGoogleLog {
    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn events_calls(&self) -> usize {
        self.events_calls.load(Ordering::SeqCst)
    }

    pub fn last_token_form(&self) -> Option<HashMap<String, String>> {
        self.token_forms.lock().unwrap().last().cloned()
    }

    pub fn last_events_query(&self) -> Option<HashMap<String, String>> {
        self.events_queries.lock().unwrap().last().cloned()
    }
}

#[derive(Clone)]
struct FakeGoogleState {
    behavior: FakeGoogleBehavior,
    log: Arc<FakeGoogleLog>,
}

/// Local stand-in for Google's token and Calendar endpoints.
pub struct FakeGoogle {
    pub base_url: String,
    pub log: Arc<FakeGoogleLog>,
}

impl FakeGoogle {
    pub async fn start(behavior: FakeGoogleBehavior) -> Self {
        let log = Arc::new(FakeGoogleLog::default());
        let state = FakeGoogleState {
            behavior,
            log: log.clone(),
        };

        let app = Router::new()
            .route("/token", post(fake_token))
            .route("/calendar/v3/calendars/primary/events", get(fake_events))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            log,
        }
    }

    /// Point a config at this fake provider.
    pub fn configure(&self, config: &mut Config) {
        config.google_token_url = format!("{}/token", self.base_url);
        config.google_calendar_api_url = format!("{}/calendar/v3", self.base_url);
    }
}

async fn fake_token(
    State(state): State<FakeGoogleState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.log.token_calls.fetch_add(1, Ordering::SeqCst);
    let grant_type = form.get("grant_type").cloned().unwrap_or_default();
    state.log.token_forms.lock().unwrap().push(form);

    if !state.behavior.token_status.is_success() {
        return (
            state.behavior.token_status,
            Json(serde_json::json!({ "error": "invalid_grant", "secret": "provider-internal" })),
        )
            .into_response();
    }

    let mut body = serde_json::json!({
        "access_token": FAKE_ACCESS_TOKEN,
        "expires_in": 3599,
        "scope": "https://www.googleapis.com/auth/calendar.readonly",
        "token_type": "Bearer",
    });
    if grant_type == "authorization_code" && state.behavior.issue_refresh_token {
        body["refresh_token"] = serde_json::json!(FAKE_REFRESH_TOKEN);
    }
    Json(body).into_response()
}

async fn fake_events(
    State(state): State<FakeGoogleState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.log.events_calls.fetch_add(1, Ordering::SeqCst);
    state.log.events_queries.lock().unwrap().push(query.clone());

    let expected = format!("Bearer {}", FAKE_ACCESS_TOKEN);
    if headers.get(header::AUTHORIZATION).and_then(|h| h.to_str().ok()) != Some(&expected) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if !state.behavior.events_status.is_success() {
        return (state.behavior.events_status, "backend error").into_response();
    }

    let events = state.behavior.events.as_array().cloned().unwrap_or_default();
    let Some(page_size) = state.behavior.events_page_size else {
        return Json(serde_json::json!({
            "kind": "calendar#events",
            "items": events,
        }))
        .into_response();
    };

    // Page tokens are plain offsets into the event list.
    let offset: usize = query
        .get("pageToken")
        .map(|t| t.parse().unwrap())
        .unwrap_or(0);
    let end = (offset + page_size).min(events.len());
    let mut body = serde_json::json!({
        "kind": "calendar#events",
        "items": events[offset.min(end)..end].to_vec(),
    });
    if end < events.len() {
        body["nextPageToken"] = serde_json::json!(end.to_string());
    }
    Json(body).into_response()
}

/// Create a test app over an in-memory store, mock KMS and `config`.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app_with(config: Config) -> (Router, Arc<AppState>) {
    let db = FirestoreDb::new_in_memory();
    let kms = KmsService::new_mock();
    let identity_verifier = Arc::new(IdentityVerifier::new(&config.identity).unwrap());
    let calendar_service = GoogleCalendarService::new(
        GoogleClient::new(&config).unwrap(),
        db.clone(),
        kms,
        config.oauth_state_key.clone(),
    );

    let state = Arc::new(AppState {
        config,
        db,
        identity_verifier,
        calendar_service,
    });

    (create_router(state.clone()), state)
}

/// Create a test app with default test configuration.
#[allow(dead_code)]
pub fn create_test_app() -> (Router, Arc<AppState>) {
    create_test_app_with(Config::test_default())
}

/// Test app wired to a freshly started fake provider.
#[allow(dead_code)]
pub async fn create_test_app_with_google(
    behavior: FakeGoogleBehavior,
) -> (Router, Arc<AppState>, FakeGoogle) {
    let google = FakeGoogle::start(behavior).await;
    let mut config = Config::test_default();
    google.configure(&mut config);
    let (app, state) = create_test_app_with(config);
    (app, state, google)
}

/// Signing key of the test identity provider.
#[allow(dead_code)]
pub fn identity_key(config: &Config) -> Vec<u8> {
    match &config.identity.key_source {
        IdentityKeySource::SharedSecret(key) => key.clone(),
        IdentityKeySource::Jwks(_) => panic!("test config uses a shared secret"),
    }
}

/// Create an identity token for `sub`, valid for a day.
#[allow(dead_code)]
pub fn create_test_jwt(sub: &str, signing_key: &[u8]) -> String {
    #[derive(Serialize)]
    struct Claims {
        sub: String,
        exp: u64,
        iat: u64,
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();

    let claims = Claims {
        sub: sub.to_string(),
        exp: now + 86400,
        iat: now,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )
    .unwrap()
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a database connection to the emulator.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project", trip_calendar::db::Collections::default())
        .await
        .expect("Failed to connect to Firestore emulator")
}
