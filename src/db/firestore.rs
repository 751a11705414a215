// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Calendar credentials (encrypted refresh tokens, one per user)
//! - Trips (create-once documents with cursor listing)
//!
//! An in-memory backend with the same semantics backs offline tests.

use crate::db::Collections;
use crate::error::AppError;
use crate::models::{CalendarCredential, Trip};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Field trips are ordered by when listing.
const TRIP_ORDER_FIELD: &str = "tripId";

#[derive(Clone)]
enum Backend {
    Firestore(firestore::FirestoreDb),
    Memory(Arc<MemoryStore>),
    Offline,
}

#[derive(Default)]
struct MemoryStore {
    credentials: DashMap<String, CalendarCredential>,
    trips: DashMap<String, Trip>,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    backend: Backend,
    collections: Collections,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str, collections: Collections) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id, collections).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            backend: Backend::Firestore(client),
            collections,
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(
        project_id: &str,
        collections: Collections,
    ) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            backend: Backend::Firestore(client),
            collections,
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self {
            backend: Backend::Offline,
            collections: Collections::default(),
        }
    }

    /// Create a process-local store for tests and local runs without GCP.
    pub fn new_in_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(MemoryStore::default())),
            collections: Collections::default(),
        }
    }

    fn offline() -> AppError {
        AppError::Database("Database not connected (offline mode)".to_string())
    }

    // ─── Calendar Credential Operations ──────────────────────────

    /// Get the calendar credential for a user.
    pub async fn get_credential(
        &self,
        user_id: &str,
    ) -> Result<Option<CalendarCredential>, AppError> {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(&self.collections.credentials)
                .obj()
                .one(user_id)
                .await
                .map_err(|e| AppError::Database(e.to_string())),
            Backend::Memory(store) => Ok(store.credentials.get(user_id).map(|c| c.clone())),
            Backend::Offline => Err(Self::offline()),
        }
    }

    /// Store the calendar credential for a user, replacing any previous one.
    pub async fn set_credential(&self, credential: &CalendarCredential) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(&self.collections.credentials)
                    .document_id(&credential.user_id)
                    .object(credential)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(())
            }
            Backend::Memory(store) => {
                store
                    .credentials
                    .insert(credential.user_id.clone(), credential.clone());
                Ok(())
            }
            Backend::Offline => Err(Self::offline()),
        }
    }

    /// Delete the calendar credential for a user (no-op if absent).
    pub async fn delete_credential(&self, user_id: &str) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                client
                    .fluent()
                    .delete()
                    .from(self.collections.credentials.as_str())
                    .document_id(user_id)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(())
            }
            Backend::Memory(store) => {
                store.credentials.remove(user_id);
                Ok(())
            }
            Backend::Offline => Err(Self::offline()),
        }
    }

    // ─── Trip Operations ─────────────────────────────────────────

    /// Get a trip by ID.
    pub async fn get_trip(&self, trip_id: &str) -> Result<Option<Trip>, AppError> {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(&self.collections.trips)
                .obj()
                .one(trip_id)
                .await
                .map_err(|e| AppError::Database(e.to_string())),
            Backend::Memory(store) => Ok(store.trips.get(trip_id).map(|t| t.clone())),
            Backend::Offline => Err(Self::offline()),
        }
    }

    /// Insert a new trip.
    ///
    /// Fails with `Conflict` if a trip with the same ID already exists.
    pub async fn insert_trip(&self, trip: &Trip) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let result: Result<Trip, _> = client
                    .fluent()
                    .insert()
                    .into(&self.collections.trips)
                    .document_id(&trip.trip_id)
                    .object(trip)
                    .execute()
                    .await;

                match result {
                    Ok(_) => Ok(()),
                    Err(firestore::errors::FirestoreError::DataConflictError(_)) => Err(
                        AppError::Conflict(format!("Trip {} already exists", trip.trip_id)),
                    ),
                    Err(e) => Err(AppError::Database(e.to_string())),
                }
            }
            Backend::Memory(store) => match store.trips.entry(trip.trip_id.clone()) {
                Entry::Occupied(_) => Err(AppError::Conflict(format!(
                    "Trip {} already exists",
                    trip.trip_id
                ))),
                Entry::Vacant(slot) => {
                    slot.insert(trip.clone());
                    Ok(())
                }
            },
            Backend::Offline => Err(Self::offline()),
        }
    }

    /// List trips ordered by ID, starting strictly after `after_trip_id`.
    pub async fn list_trips(
        &self,
        after_trip_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Trip>, AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let query = client.fluent().select().from(self.collections.trips.as_str());

                let query = if let Some(after) = after_trip_id {
                    let after = after.to_string();
                    query.filter(move |q| {
                        q.for_all([q.field(TRIP_ORDER_FIELD).greater_than(after.clone())])
                    })
                } else {
                    query
                };

                query
                    .order_by([(
                        TRIP_ORDER_FIELD,
                        firestore::FirestoreQueryDirection::Ascending,
                    )])
                    .limit(limit)
                    .obj()
                    .query()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))
            }
            Backend::Memory(store) => {
                let mut trips: Vec<Trip> = store
                    .trips
                    .iter()
                    .filter(|entry| after_trip_id.map_or(true, |after| entry.key().as_str() > after))
                    .map(|entry| entry.value().clone())
                    .collect();
                trips.sort_by(|a, b| a.trip_id.cmp(&b.trip_id));
                trips.truncate(limit as usize);
                Ok(trips)
            }
            Backend::Offline => Err(Self::offline()),
        }
    }

    /// Delete a trip (no-op if absent).
    pub async fn delete_trip(&self, trip_id: &str) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                client
                    .fluent()
                    .delete()
                    .from(self.collections.trips.as_str())
                    .document_id(trip_id)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(())
            }
            Backend::Memory(store) => {
                store.trips.remove(trip_id);
                Ok(())
            }
            Backend::Offline => Err(Self::offline()),
        }
    }
}
