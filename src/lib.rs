// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trip-Calendar: calendar sync and trip storage for a trip planner
//!
//! This crate provides the backend API that connects a user's Google
//! Calendar, lists their upcoming events, and stores planned trips.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use services::{GoogleCalendarService, IdentityVerifier};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub identity_verifier: Arc<IdentityVerifier>,
    pub calendar_service: GoogleCalendarService,
}
