// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! CORS handling for the calendar sync endpoint.
//!
//! Every `/sync` response, errors included, carries the same fixed headers.
//! Preflight requests are answered with `204 No Content` before
//! authentication runs.

use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

const SYNC_ALLOW_HEADERS: &str = "Authorization,Content-Type";
const SYNC_ALLOW_METHODS: &str = "GET,OPTIONS";

pub async fn sync_cors(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    apply_sync_cors_headers(response.headers_mut(), &state.config.frontend_url);
    response
}

fn apply_sync_cors_headers(headers: &mut HeaderMap, frontend_url: &str) {
    match HeaderValue::from_str(frontend_url) {
        Ok(origin) => {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
        Err(_) => {
            tracing::warn!(origin = %frontend_url, "FRONTEND_URL is not a valid header value");
        }
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(SYNC_ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(SYNC_ALLOW_METHODS),
    );
}
