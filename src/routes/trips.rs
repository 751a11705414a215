// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trip CRUD routes.

use crate::error::{AppError, Result};
use crate::models::{NewTrip, Trip};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;
use std::sync::Arc;

/// Response header carrying the continuation token for the next page.
pub const NEXT_CURSOR_HEADER: &str = "x-next-cursor";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/trips", get(list_trips).post(create_trip))
        .route("/api/trips/{trip_id}", get(get_trip).delete(delete_trip))
}

// ─── Listing ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct ListTripsQuery {
    /// Page size; parsed by hand so bad values get a JSON error body.
    limit: Option<String>,
    /// Opaque continuation token from a previous page.
    cursor: Option<String>,
}

const DEFAULT_LIMIT: u32 = 100;
const MAX_LIMIT: u32 = 500;

fn parse_limit(limit: Option<&str>) -> Result<u32> {
    let Some(raw) = limit else {
        return Ok(DEFAULT_LIMIT);
    };
    let limit: u32 = raw
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid 'limit' parameter".to_string()))?;
    if limit == 0 {
        return Err(AppError::BadRequest(
            "'limit' must be greater than 0".to_string(),
        ));
    }
    Ok(limit.min(MAX_LIMIT))
}

fn parse_cursor(cursor: Option<&str>) -> Result<Option<String>> {
    cursor
        .map(|raw| {
            let invalid_cursor = || AppError::BadRequest("Invalid 'cursor' parameter".to_string());
            let decoded = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid_cursor())?;
            String::from_utf8(decoded)
                .ok()
                .filter(|id| !id.is_empty())
                .ok_or_else(invalid_cursor)
        })
        .transpose()
}

fn encode_cursor(trip_id: &str) -> String {
    URL_SAFE_NO_PAD.encode(trip_id)
}

/// List trips ordered by ID, one page at a time.
async fn list_trips(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTripsQuery>,
) -> Result<(HeaderMap, Json<Vec<Trip>>)> {
    let limit = parse_limit(params.limit.as_deref())?;
    let after = parse_cursor(params.cursor.as_deref())?;

    tracing::debug!(limit, cursor = ?after, "Listing trips");

    // Fetch one extra item to determine if another page is available.
    let mut trips = state
        .db
        .list_trips(after.as_deref(), limit.saturating_add(1))
        .await?;

    let mut headers = HeaderMap::new();
    if trips.len() > limit as usize {
        trips.truncate(limit as usize);
        if let Some(last) = trips.last() {
            let cursor = HeaderValue::from_str(&encode_cursor(&last.trip_id))
                .map_err(|e| AppError::Internal(anyhow::anyhow!("Bad cursor header: {}", e)))?;
            headers.insert(NEXT_CURSOR_HEADER, cursor);
        }
    }

    Ok((headers, Json(trips)))
}

// ─── Single Trip ─────────────────────────────────────────────

async fn get_trip(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<String>,
) -> Result<Json<Trip>> {
    state
        .db
        .get_trip(&trip_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Trip {} not found", trip_id)))
}

/// Create a trip. The body is parsed by hand so empty and malformed bodies
/// get distinct messages.
async fn create_trip(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Trip>)> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::BadRequest("Request body is required".to_string()));
    }

    let new: NewTrip = serde_json::from_slice(&body)
        .map_err(|_| AppError::BadRequest("Invalid JSON body supplied".to_string()))?;

    let trip = Trip::from_new(
        new,
        uuid::Uuid::new_v4().to_string(),
        format_utc_rfc3339(chrono::Utc::now()),
    );

    state.db.insert_trip(&trip).await?;

    tracing::info!(trip_id = %trip.trip_id, user_id = ?trip.user_id, "Trip created");

    Ok((StatusCode::CREATED, Json(trip)))
}

/// Delete a trip. Succeeds whether or not it existed.
async fn delete_trip(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<String>,
) -> Result<StatusCode> {
    state.db.delete_trip(&trip_id).await?;
    tracing::info!(trip_id = %trip_id, "Trip deleted");
    Ok(StatusCode::NO_CONTENT)
}
