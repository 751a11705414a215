// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bearer-token authentication middleware.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Authenticated caller extracted from a verified identity token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// Middleware that requires a valid identity bearer token.
///
/// The token's `sub` claim becomes the `AuthUser` request extension.
pub async fn require_identity(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = state
        .identity_verifier
        .verify_bearer(request.headers().get(header::AUTHORIZATION))
        .await?;

    request.extensions_mut().insert(AuthUser {
        user_id: identity.user_id,
    });

    Ok(next.run(request).await)
}
