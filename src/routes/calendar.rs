// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Calendar connect, callback and sync routes.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::middleware::{require_identity, sync_cors, AuthUser};
use crate::models::CalendarEventProjection;
use crate::AppState;

pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Preflight is answered by `sync_cors` before identity checks run.
    // Identity is checked before method matching, so unauthenticated callers
    // get 401 for any method and only verified callers see 405.
    let sync = Router::new()
        .route("/sync", get(sync_calendar).delete(disconnect_calendar))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_identity))
        .layer(middleware::from_fn_with_state(state, sync_cors));

    Router::new()
        .route("/connect", get(connect))
        .route("/callback", get(callback))
        .merge(sync)
}

/// `302 Found` to `location`.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

// ─── Connect ─────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    #[serde(default)]
    user_id: Option<String>,
}

/// Start OAuth flow - redirect to Google's consent screen.
async fn connect(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConnectParams>,
) -> Result<Response> {
    let user_id = params.user_id.unwrap_or_default();
    let auth_url = state.calendar_service.authorization_url(&user_id)?;

    tracing::info!(user_id = %user_id, "Starting OAuth flow, redirecting to Google");

    Ok(found(&auth_url))
}

// ─── Callback ────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange code for tokens, store the refresh token.
async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Response> {
    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from Google");
        return Err(AppError::BadRequest(
            "Authorization was not granted".to_string(),
        ));
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or(AppError::MissingParameter("code"))?;
    let oauth_state = params
        .state
        .filter(|s| !s.is_empty())
        .ok_or(AppError::MissingParameter("state"))?;

    tracing::info!("Exchanging authorization code for tokens");

    state
        .calendar_service
        .complete_authorization(&code, &oauth_state)
        .await?;

    Ok(found(&state.config.success_redirect_url))
}

// ─── Sync ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub trips: Vec<CalendarEventProjection>,
}

/// Upcoming calendar events for the authenticated caller.
async fn sync_calendar(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SyncResponse>> {
    tracing::debug!(user_id = %user.user_id, "Syncing calendar");

    let trips = state.calendar_service.sync_events(&user.user_id).await?;
    Ok(Json(SyncResponse { trips }))
}

/// Drop the caller's stored calendar credential.
async fn disconnect_calendar(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<StatusCode> {
    state.calendar_service.disconnect(&user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
