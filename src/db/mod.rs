// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

/// Default collection names.
pub mod collections {
    /// Calendar credentials (keyed by user_id)
    pub const CALENDAR_CREDENTIALS: &str = "calendar_credentials";
    /// Saved trips (keyed by tripId)
    pub const TRIPS: &str = "trips";
}

/// Collection names in use, overridable through configuration.
#[derive(Debug, Clone)]
pub struct Collections {
    pub credentials: String,
    pub trips: String,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            credentials: collections::CALENDAR_CREDENTIALS.to_string(),
            trips: collections::TRIPS.to_string(),
        }
    }
}

impl Collections {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            credentials: config.credentials_collection.clone(),
            trips: config.trips_collection.clone(),
        }
    }
}
