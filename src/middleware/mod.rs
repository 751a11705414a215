// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (authentication, CORS, security headers).

pub mod auth;
pub mod cors;
pub mod security;

pub use auth::{require_identity, AuthUser};
pub use cors::sync_cors;
