//! Per-request token for the step service gateway.
//!
//! The gateway recomputes `METHOD&PATH&QUERY` from the request it receives,
//! hashes it, and compares the result with the `qsh` claim. The canonical
//! parts therefore come from the same [`Endpoint`] that is later sent.

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::http::Endpoint;

pub const TOKEN_TTL_SECS: u64 = 60;
pub const ACCESS_KEY_HEADER: &str = "zapiAccessKey";

#[derive(Debug, Clone, Error)]
pub enum SignError {
    #[error("signing secret is not configured")]
    MissingSecret,
    #[error("system clock error: {0}")]
    Clock(String),
    #[error("could not encode token: {0}")]
    Encode(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub iss: String,
    pub iat: u64,
    pub exp: u64,
    pub qsh: String,
}

pub fn canonical_request(endpoint: &Endpoint) -> String {
    format!(
        "{}&{}&{}",
        endpoint.method.as_str().to_uppercase(),
        endpoint.canonical_path(),
        endpoint.canonical_query()
    )
}

/// Hex SHA-256 of the canonical request.
pub fn query_string_hash(canonical: &str) -> String {
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

pub struct RequestSigner {
    access_key: String,
    secret_key: SecretString,
}

impl RequestSigner {
    pub fn new(access_key: impl Into<String>, secret_key: SecretString) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key,
        }
    }

    pub fn claims(&self, endpoint: &Endpoint, now: u64) -> Claims {
        Claims {
            iss: self.access_key.clone(),
            iat: now,
            exp: now + TOKEN_TTL_SECS,
            qsh: query_string_hash(&canonical_request(endpoint)),
        }
    }

    pub fn sign_at(&self, endpoint: &Endpoint, now: u64) -> Result<String, SignError> {
        let secret = self.secret_key.expose_secret();
        if secret.is_empty() {
            return Err(SignError::MissingSecret);
        }
        let claims = self.claims(endpoint, now);
        let key = EncodingKey::from_secret(secret.as_bytes());
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key)
            .map_err(|error| SignError::Encode(error.to_string()))
    }

    /// Returns `endpoint` carrying the `Authorization: JWT` and access-key
    /// headers for exactly its own method, path and query.
    pub fn authorize(&self, endpoint: Endpoint) -> Result<Endpoint, SignError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|error| SignError::Clock(error.to_string()))?
            .as_secs();
        let token = self.sign_at(&endpoint, now)?;
        Ok(endpoint
            .with_header("Authorization", format!("JWT {}", token))
            .with_header(ACCESS_KEY_HEADER, self.access_key.clone()))
    }
}
