//! Identity provider signing keys.
//!
//! # Purpose
//! Defines the [`SigningKey`] record, the [`KeyResolver`] capability the token
//! verifier depends on, and the JWK set parser shared by every resolver.
//!
//! # Architectural role
//! The verifier never talks to the identity provider directly; it asks a
//! `KeyResolver` for the key named by a token's `kid`. Production wires
//! [`crate::auth::jwks::JwksKeyResolver`]; tests and pinned deployments use
//! [`StaticKeyResolver`].
//!
//! # Key invariants
//! - Only RSA keys usable with RS256 become `SigningKey`s. Entries with another
//!   key type, another `alg`, an encryption `use`, or no `kid` are skipped.
//! - A `SigningKey` is immutable once parsed.
//!
//! # Security model and threat assumptions
//! - The key set document is public data; the trust anchor is the configured
//!   JWKS URL, not anything inside the document.
//! - Key ids are lookup handles, never secrets.
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, KeyAlgorithm as JwkAlgorithm, PublicKeyUse};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rs256,
}

/// Public RSA key published by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKey {
    pub key_id: String,
    pub algorithm: KeyAlgorithm,
    /// Big-endian RSA modulus.
    pub modulus: Vec<u8>,
    /// Big-endian RSA public exponent.
    pub exponent: Vec<u8>,
}

impl SigningKey {
    pub fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_rsa_raw_components(&self.modulus, &self.exponent)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum KeyError {
    /// The key id is absent from a freshly fetched key set. Terminal for the token.
    #[error("signing key {0} not found")]
    NotFound(String),
    /// The identity provider could not be reached or answered with an error.
    #[error("key set fetch failed: {0}")]
    FetchFailed(String),
    /// The identity provider served a document with no usable keys.
    #[error("invalid key set: {0}")]
    InvalidKeySet(String),
}

impl KeyError {
    /// `true` when a later attempt may succeed without a different token.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KeyError::FetchFailed(_) | KeyError::InvalidKeySet(_))
    }
}

#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn signing_key(&self, key_id: &str) -> Result<Arc<SigningKey>, KeyError>;
}

/// Resolver over a fixed key set.
#[derive(Debug, Clone, Default)]
pub struct StaticKeyResolver {
    keys: HashMap<String, Arc<SigningKey>>,
}

impl StaticKeyResolver {
    pub fn new(keys: impl IntoIterator<Item = SigningKey>) -> Self {
        Self {
            keys: keys
                .into_iter()
                .map(|key| (key.key_id.clone(), Arc::new(key)))
                .collect(),
        }
    }

    pub fn from_jwks(document: &Value) -> Result<Self, KeyError> {
        Ok(Self::new(parse_jwks(document)?))
    }
}

#[async_trait]
impl KeyResolver for StaticKeyResolver {
    async fn signing_key(&self, key_id: &str) -> Result<Arc<SigningKey>, KeyError> {
        self.keys
            .get(key_id)
            .cloned()
            .ok_or_else(|| KeyError::NotFound(key_id.to_string()))
    }
}

/// Parse every usable RS256 key out of a JWK set document.
///
/// Entries are parsed one at a time so a single unknown key type does not
/// poison the whole document.
///
/// # Errors
/// - `KeyError::InvalidKeySet` when the document has no `keys` array or no
///   entry survives filtering.
pub fn parse_jwks(document: &Value) -> Result<Vec<SigningKey>, KeyError> {
    let entries = document
        .get("keys")
        .and_then(Value::as_array)
        .ok_or_else(|| KeyError::InvalidKeySet("missing keys array".to_string()))?;
    let keys: Vec<SigningKey> = entries.iter().filter_map(parse_entry).collect();
    if keys.is_empty() {
        return Err(KeyError::InvalidKeySet("no usable RS256 keys".to_string()));
    }
    Ok(keys)
}

fn parse_entry(entry: &Value) -> Option<SigningKey> {
    let jwk: Jwk = match serde_json::from_value(entry.clone()) {
        Ok(jwk) => jwk,
        Err(err) => {
            tracing::debug!(error = %err, "skipping unparseable jwk");
            return None;
        }
    };
    let Some(key_id) = jwk.common.key_id.clone() else {
        tracing::debug!("skipping jwk without kid");
        return None;
    };
    if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
        tracing::debug!(kid = %key_id, "skipping encryption jwk");
        return None;
    }
    // A missing `alg` is allowed; the verifier pins RS256 either way.
    if jwk
        .common
        .key_algorithm
        .is_some_and(|alg| alg != JwkAlgorithm::RS256)
    {
        tracing::debug!(kid = %key_id, "skipping jwk with non-RS256 alg");
        return None;
    }
    let AlgorithmParameters::RSA(params) = &jwk.algorithm else {
        tracing::debug!(kid = %key_id, "skipping non-RSA jwk");
        return None;
    };
    let modulus = URL_SAFE_NO_PAD.decode(params.n.trim_end_matches('=')).ok()?;
    let exponent = URL_SAFE_NO_PAD.decode(params.e.trim_end_matches('=')).ok()?;
    if modulus.is_empty() || exponent.is_empty() {
        return None;
    }
    Some(SigningKey {
        key_id,
        algorithm: KeyAlgorithm::Rs256,
        modulus,
        exponent,
    })
}
