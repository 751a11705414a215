// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Built once at startup and shared through `AppState`; handlers never
//! read the environment themselves.

use std::env;

pub const DEFAULT_GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_GOOGLE_CALENDAR_API_URL: &str = "https://www.googleapis.com/calendar/v3";
pub const DEFAULT_CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";

/// How an incoming identity token's signature is checked.
#[derive(Debug, Clone)]
pub enum IdentityKeySource {
    /// RS256 tokens verified against a JWKS endpoint (e.g. a Cognito user pool).
    Jwks(String),
    /// HS256 tokens signed with a shared secret (local development and tests).
    SharedSecret(Vec<u8>),
}

/// Identity token verification settings.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub key_source: IdentityKeySource,
    /// Expected `iss` claim; unchecked when `None`.
    pub issuer: Option<String>,
    /// Expected `aud` claim; unchecked when `None`.
    pub audience: Option<String>,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Google OAuth client ID (public)
    pub google_client_id: String,
    /// Redirect URI registered with Google for the callback route
    pub google_redirect_uri: String,
    /// Where the browser lands after a successful calendar connection
    pub success_redirect_url: String,
    /// Frontend origin allowed by CORS
    pub frontend_url: String,
    /// Firestore collection holding calendar credentials
    pub credentials_collection: String,
    /// Firestore collection holding trips
    pub trips_collection: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// GCP region (KMS key location)
    pub gcp_region: String,
    /// Server port
    pub port: u16,

    // --- Provider endpoints (overridable for local fakes) ---
    pub google_auth_url: String,
    pub google_token_url: String,
    pub google_calendar_api_url: String,
    pub calendar_scope: String,

    // --- Secrets ---
    /// Google OAuth client secret
    pub google_client_secret: String,
    /// HMAC key for signing the OAuth `state` parameter (raw bytes)
    pub oauth_state_key: Vec<u8>,
    /// How identity bearer tokens are verified
    pub identity: IdentityConfig,
}

impl Config {
    /// Deterministic configuration for tests.
    pub fn test_default() -> Self {
        Self {
            google_client_id: "test_client_id".to_string(),
            google_redirect_uri: "http://localhost:8080/callback".to_string(),
            success_redirect_url: "http://localhost:5173/dashboard?calendar=connected".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            credentials_collection: "calendar_credentials".to_string(),
            trips_collection: "trips".to_string(),
            gcp_project_id: "test-project".to_string(),
            gcp_region: "us-west1".to_string(),
            port: 8080,
            google_auth_url: DEFAULT_GOOGLE_AUTH_URL.to_string(),
            google_token_url: DEFAULT_GOOGLE_TOKEN_URL.to_string(),
            google_calendar_api_url: DEFAULT_GOOGLE_CALENDAR_API_URL.to_string(),
            calendar_scope: DEFAULT_CALENDAR_SCOPE.to_string(),
            google_client_secret: "test_secret".to_string(),
            oauth_state_key: b"test_state_key_32_bytes_minimum!!".to_vec(),
            identity: IdentityConfig {
                key_source: IdentityKeySource::SharedSecret(
                    b"test_identity_key_32_bytes_min!!".to_vec(),
                ),
                issuer: None,
                audience: None,
            },
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file is honoured for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            google_client_id: required("GOOGLE_CALENDAR_CLIENT_ID")?,
            google_redirect_uri: required("GOOGLE_CALENDAR_REDIRECT_URI")?,
            success_redirect_url: required("FRONTEND_SUCCESS_URL")?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            credentials_collection: env::var("CREDENTIALS_COLLECTION")
                .unwrap_or_else(|_| "calendar_credentials".to_string()),
            trips_collection: env::var("TRIPS_COLLECTION").unwrap_or_else(|_| "trips".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            gcp_region: env::var("GCP_REGION").unwrap_or_else(|_| "us-west1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            google_auth_url: env::var("GOOGLE_AUTH_URL")
                .unwrap_or_else(|_| DEFAULT_GOOGLE_AUTH_URL.to_string()),
            google_token_url: env::var("GOOGLE_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_GOOGLE_TOKEN_URL.to_string()),
            google_calendar_api_url: env::var("GOOGLE_CALENDAR_API_URL")
                .unwrap_or_else(|_| DEFAULT_GOOGLE_CALENDAR_API_URL.to_string()),
            calendar_scope: env::var("GOOGLE_CALENDAR_SCOPE")
                .unwrap_or_else(|_| DEFAULT_CALENDAR_SCOPE.to_string()),

            google_client_secret: required("GOOGLE_CALENDAR_CLIENT_SECRET")?,
            oauth_state_key: required("OAUTH_STATE_KEY")?.into_bytes(),
            identity: identity_from_env()?,
        })
    }
}

/// Read a required variable, trimming stray whitespace from secret bindings.
fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn identity_from_env() -> Result<IdentityConfig, ConfigError> {
    let key_source = match (
        env::var("IDENTITY_JWKS_URL").ok(),
        env::var("IDENTITY_SIGNING_KEY").ok(),
    ) {
        (Some(url), _) => IdentityKeySource::Jwks(url),
        (None, Some(key)) => IdentityKeySource::SharedSecret(key.into_bytes()),
        (None, None) => return Err(ConfigError::Missing("IDENTITY_JWKS_URL")),
    };

    Ok(IdentityConfig {
        key_source,
        issuer: env::var("IDENTITY_ISSUER").ok(),
        audience: env::var("IDENTITY_AUDIENCE").ok(),
    })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
