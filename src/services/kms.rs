// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud KMS service for encrypting/decrypting stored refresh tokens.
//!
//! Uses direct KMS encryption with additional authenticated data (AAD) bound
//! to the owning user, so a ciphertext copied onto another user's credential
//! fails to decrypt.

use crate::error::AppError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

#[cfg(debug_assertions)]
const MOCK_PREFIX: &str = "mock";

/// KMS encryption service.
#[derive(Clone)]
pub struct KmsService {
    /// Full resource path to the KMS key
    /// Format: projects/{project}/locations/{location}/keyRings/{ring}/cryptoKeys/{key}
    key_path: String,

    /// GCP KMS client
    client: Option<std::sync::Arc<google_cloud_kms::client::Client>>,
}

impl KmsService {
    /// KMS Key Ring Name
    const KEY_RING_NAME: &str = "trip-calendar";

    /// Create a new KMS service.
    /// Connects to GCP KMS.
    pub async fn new(project_id: &str, location: &str, key_name: &str) -> Result<Self, AppError> {
        let key_path = format!(
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
            project_id,
            location,
            Self::KEY_RING_NAME,
            key_name
        );

        let config = google_cloud_kms::client::ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to create KMS auth config: {}", e))
            })?;

        let client = google_cloud_kms::client::Client::new(config)
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to create KMS client: {}", e))
            })?;

        Ok(Self {
            key_path,
            client: Some(std::sync::Arc::new(client)),
        })
    }

    /// Create a mock KMS service for testing (offline mode).
    /// Only available in debug/test builds.
    #[cfg(debug_assertions)]
    pub fn new_mock() -> Self {
        Self {
            key_path: "projects/mock/locations/mock/keyRings/mock/cryptoKeys/mock".to_string(),
            client: None,
        }
    }

    /// Encrypt plaintext bound to `aad`.
    /// Returns base64-encoded ciphertext.
    pub async fn encrypt(&self, plaintext: &str, aad: &[u8]) -> Result<String, AppError> {
        use google_cloud_googleapis::cloud::kms::v1::EncryptRequest;

        // Mock mode (Debug builds only)
        #[cfg(debug_assertions)]
        {
            if self.client.is_none() {
                return Ok(format!(
                    "{}:{}:{}",
                    MOCK_PREFIX,
                    BASE64.encode(aad),
                    BASE64.encode(plaintext)
                ));
            }
        }

        // In release builds a missing client is an error, never a plaintext fallback.
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("KMS client not connected")))?;

        let req = EncryptRequest {
            name: self.key_path.clone(),
            plaintext: plaintext.as_bytes().to_vec(),
            additional_authenticated_data: aad.to_vec(),
            ..Default::default()
        };

        let response = client
            .encrypt(req, None)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS encrypt failed: {}", e)))?;

        Ok(BASE64.encode(response.ciphertext))
    }

    /// Decrypt base64-encoded ciphertext that was encrypted with `aad`.
    pub async fn decrypt(&self, ciphertext_b64: &str, aad: &[u8]) -> Result<String, AppError> {
        use google_cloud_googleapis::cloud::kms::v1::DecryptRequest;

        // Mock mode (Debug builds only)
        #[cfg(debug_assertions)]
        {
            if self.client.is_none() {
                return decrypt_mock(ciphertext_b64, aad);
            }
        }

        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("KMS client not connected")))?;

        let ciphertext = BASE64.decode(ciphertext_b64).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Base64 ciphertext decode failed: {}", e))
        })?;

        let req = DecryptRequest {
            name: self.key_path.clone(),
            ciphertext,
            additional_authenticated_data: aad.to_vec(),
            ..Default::default()
        };

        let response = client
            .decrypt(req, None)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS decrypt failed: {}", e)))?;

        String::from_utf8(response.plaintext)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("UTF-8 decode failed: {}", e)))
    }
}

#[cfg(debug_assertions)]
fn decrypt_mock(ciphertext: &str, aad: &[u8]) -> Result<String, AppError> {
    let mut parts = ciphertext.splitn(3, ':');
    let (Some(MOCK_PREFIX), Some(aad_b64), Some(body_b64)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err(AppError::Internal(anyhow::anyhow!(
            "Malformed mock ciphertext"
        )));
    };

    if aad_b64 != BASE64.encode(aad) {
        return Err(AppError::Internal(anyhow::anyhow!(
            "KMS decrypt failed (mock): AAD mismatch"
        )));
    }

    let bytes = BASE64.decode(body_b64).map_err(|e| {
        AppError::Internal(anyhow::anyhow!("Base64 decode failed (mock): {}", e))
    })?;
    String::from_utf8(bytes)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("UTF-8 decode failed (mock): {}", e)))
}

/// AAD binding a stored token to its owner.
pub fn user_aad(user_id: &str) -> Vec<u8> {
    format!("user_id:{}", user_id).into_bytes()
}

/// Helper to encrypt a refresh token before storing.
pub async fn encrypt_refresh_token(
    kms: &KmsService,
    refresh_token: &str,
    user_id: &str,
) -> Result<String, AppError> {
    kms.encrypt(refresh_token, &user_aad(user_id)).await
}

/// Helper to decrypt a refresh token after retrieval.
pub async fn decrypt_refresh_token(
    kms: &KmsService,
    encrypted: &str,
    user_id: &str,
) -> Result<String, AppError> {
    kms.decrypt(encrypted, &user_aad(user_id)).await
}
