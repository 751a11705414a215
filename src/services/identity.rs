// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity token verification for calendar sync callers.
//!
//! Callers present the identity provider's JWT as a bearer token. The
//! signature, expiry and (when configured) issuer and audience are checked
//! before the `sub` claim is trusted as the user id.

use crate::config::{IdentityConfig, IdentityKeySource};
use anyhow::Context;
use axum::http::HeaderValue;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const CLOCK_SKEW_SECS: u64 = 60;

/// Identity established from a verified bearer token.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub user_id: String,
}

/// Identity verification error categories.
#[derive(Debug, Clone)]
pub enum IdentityError {
    /// No usable bearer credential was presented.
    Unauthorized(String),
    /// A token was presented but failed verification.
    InvalidToken(String),
    /// The key set could not be fetched.
    Transient(String),
}

impl From<IdentityError> for crate::error::AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Unauthorized(reason) => {
                tracing::debug!(reason = %reason, "Rejected unauthenticated request");
                crate::error::AppError::Unauthorized
            }
            IdentityError::InvalidToken(reason) => {
                tracing::warn!(reason = %reason, "Rejected identity token");
                crate::error::AppError::InvalidToken
            }
            IdentityError::Transient(reason) => crate::error::AppError::Upstream(reason),
        }
    }
}

enum VerifierMode {
    Jwks { url: String },
    SharedSecret { decoding_key: DecodingKey },
}

#[derive(Clone)]
struct JwksCacheEntry {
    keys_by_kid: HashMap<String, Arc<DecodingKey>>,
    expires_at: Instant,
}

/// Verifier for identity provider JWTs.
pub struct IdentityVerifier {
    http_client: reqwest::Client,
    issuer: Option<String>,
    audience: Option<String>,
    mode: VerifierMode,
    jwks_cache: RwLock<Option<JwksCacheEntry>>,
    refresh_lock: Mutex<()>,
}

impl IdentityVerifier {
    pub fn new(config: &IdentityConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building JWKS HTTP client")?;

        let mode = match &config.key_source {
            IdentityKeySource::Jwks(url) => {
                if url.trim().is_empty() {
                    anyhow::bail!("JWKS URL must not be empty");
                }
                VerifierMode::Jwks { url: url.clone() }
            }
            IdentityKeySource::SharedSecret(secret) => {
                if secret.is_empty() {
                    anyhow::bail!("identity signing key must not be empty");
                }
                VerifierMode::SharedSecret {
                    decoding_key: DecodingKey::from_secret(secret),
                }
            }
        };

        tracing::info!(
            issuer = ?config.issuer,
            audience = ?config.audience,
            jwks = matches!(mode, VerifierMode::Jwks { .. }),
            "Initialized identity token verifier"
        );

        Ok(Self {
            http_client,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            mode,
            jwks_cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Verify an identity bearer token from an Authorization header.
    pub async fn verify_bearer(
        &self,
        auth_header: Option<&HeaderValue>,
    ) -> Result<VerifiedIdentity, IdentityError> {
        let token = extract_bearer_token(auth_header)?;

        let header = decode_header(token)
            .map_err(|e| IdentityError::InvalidToken(format!("invalid JWT header: {e}")))?;

        let (algorithm, decoding_key) = match &self.mode {
            VerifierMode::SharedSecret { decoding_key } => {
                if header.alg != Algorithm::HS256 {
                    return Err(IdentityError::InvalidToken(format!(
                        "unexpected JWT alg: {:?}",
                        header.alg
                    )));
                }
                (Algorithm::HS256, KeyRef::Borrowed(decoding_key))
            }
            VerifierMode::Jwks { .. } => {
                if header.alg != Algorithm::RS256 {
                    return Err(IdentityError::InvalidToken(format!(
                        "unexpected JWT alg: {:?}",
                        header.alg
                    )));
                }
                let kid = header
                    .kid
                    .ok_or_else(|| IdentityError::InvalidToken("missing JWT kid".to_string()))?;
                (
                    Algorithm::RS256,
                    KeyRef::Shared(self.decoding_key_for_kid(&kid).await?),
                )
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.set_required_spec_claims(&["exp"]);
        validation.leeway = CLOCK_SKEW_SECS;
        match &self.issuer {
            Some(issuer) => validation.set_issuer(&[issuer.as_str()]),
            None => validation.iss = None,
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }

        let token_data = decode::<IdentityClaims>(token, decoding_key.as_ref(), &validation)
            .map_err(|e| IdentityError::InvalidToken(format!("JWT validation failed: {e}")))?;

        let claims = token_data.claims;

        if claims.sub.is_empty() {
            return Err(IdentityError::Unauthorized("no sub in token".to_string()));
        }

        tracing::debug!(
            user_id = %claims.sub,
            token_use = claims.token_use.as_deref().unwrap_or("<missing>"),
            "Identity token verified"
        );

        Ok(VerifiedIdentity {
            user_id: claims.sub,
        })
    }

    async fn decoding_key_for_kid(&self, kid: &str) -> Result<Arc<DecodingKey>, IdentityError> {
        if let Some(key) = self.lookup_cached_key(kid).await {
            return Ok(key);
        }

        // A kid we have not seen may mean the provider rotated keys.
        for force_refresh in [false, true] {
            self.refresh_jwks(force_refresh).await?;
            if let Some(key) = self.lookup_cached_key(kid).await {
                return Ok(key);
            }
        }

        Err(IdentityError::InvalidToken(format!(
            "JWT kid not found in JWKS after refresh: {kid}"
        )))
    }

    async fn lookup_cached_key(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        let cache = self.jwks_cache.read().await;
        let now = Instant::now();
        cache
            .as_ref()
            .filter(|entry| entry.expires_at > now)
            .and_then(|entry| entry.keys_by_kid.get(kid))
            .cloned()
    }

    async fn refresh_jwks(&self, force_refresh: bool) -> Result<(), IdentityError> {
        let VerifierMode::Jwks { url } = &self.mode else {
            return Ok(());
        };

        let _guard = self.refresh_lock.lock().await;

        if !force_refresh {
            let cache = self.jwks_cache.read().await;
            if cache
                .as_ref()
                .is_some_and(|entry| entry.expires_at > Instant::now())
            {
                return Ok(());
            }
        }

        tracing::debug!(jwks_uri = %url, "Refreshing identity JWKS cache");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| IdentityError::Transient(format!("JWKS request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(IdentityError::Transient(format!(
                "JWKS request returned status {}",
                response.status()
            )));
        }

        let ttl = cache_ttl_from_headers(response.headers(), DEFAULT_CACHE_TTL);

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| IdentityError::Transient(format!("invalid JWKS JSON: {e}")))?;

        let keys_by_kid = usable_rsa_keys(jwks);

        if keys_by_kid.is_empty() {
            return Err(IdentityError::Transient(
                "JWKS response did not include any usable RSA keys".to_string(),
            ));
        }

        *self.jwks_cache.write().await = Some(JwksCacheEntry {
            keys_by_kid,
            expires_at: Instant::now() + ttl,
        });

        tracing::debug!(ttl_secs = ttl.as_secs(), "Identity JWKS cache refreshed");
        Ok(())
    }
}

/// Either the verifier's own key or one from the JWKS cache.
enum KeyRef<'a> {
    Borrowed(&'a DecodingKey),
    Shared(Arc<DecodingKey>),
}

impl AsRef<DecodingKey> for KeyRef<'_> {
    fn as_ref(&self) -> &DecodingKey {
        match self {
            KeyRef::Borrowed(key) => key,
            KeyRef::Shared(key) => key.as_ref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    n: String,
    e: String,
    #[serde(rename = "use")]
    use_: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdentityClaims {
    #[serde(default)]
    sub: String,
    token_use: Option<String>,
}

fn usable_rsa_keys(jwks: Jwks) -> HashMap<String, Arc<DecodingKey>> {
    let mut keys_by_kid = HashMap::new();

    for jwk in jwks.keys {
        if jwk.kty != "RSA" || jwk.kid.trim().is_empty() {
            continue;
        }

        if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
            continue;
        }

        if jwk.use_.as_deref().is_some_and(|use_| use_ != "sig") {
            continue;
        }

        match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
            Ok(key) => {
                keys_by_kid.insert(jwk.kid, Arc::new(key));
            }
            Err(e) => {
                tracing::warn!(error = %e, kid = %jwk.kid, "Skipping invalid RSA JWKS key");
            }
        }
    }

    keys_by_kid
}

fn extract_bearer_token(auth_header: Option<&HeaderValue>) -> Result<&str, IdentityError> {
    let value = auth_header
        .ok_or_else(|| IdentityError::Unauthorized("missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| IdentityError::Unauthorized("invalid Authorization header".to_string()))?;

    let token = value.strip_prefix("Bearer ").ok_or_else(|| {
        IdentityError::Unauthorized("Authorization header must be Bearer token".to_string())
    })?;

    if token.is_empty() {
        return Err(IdentityError::Unauthorized("Bearer token is empty".to_string()));
    }

    Ok(token)
}

fn cache_ttl_from_headers(headers: &reqwest::header::HeaderMap, fallback: Duration) -> Duration {
    headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_cache_control_max_age)
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

fn parse_cache_control_max_age(value: &str) -> Option<u64> {
    value.split(',').find_map(|directive| {
        directive
            .trim()
            .strip_prefix("max-age=")
            .and_then(|raw| raw.trim_matches('"').parse::<u64>().ok())
    })
}
