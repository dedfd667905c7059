//! RS256 bearer token verification.
//!
//! # Purpose
//! Turn a compact JWS string into [`VerifiedClaims`] or a [`VerifyError`].
//!
//! # Key invariants
//! - The algorithm is pinned to RS256. A token whose header names any other
//!   algorithm is rejected before a key is resolved; it is never negotiated.
//! - `iss` must equal the configured issuer exactly and `aud` must contain the
//!   configured audience.
//! - `exp` and `iat` are checked against the current time with the configured
//!   clock-skew allowance.
//! - Callers must not echo [`VerifyError`] details to clients. The request
//!   pipeline maps every terminal variant onto the same generic response.
//!
//! # Security model and threat assumptions
//! - Attackers control the whole token, including the header. Nothing from an
//!   unverified token is trusted except the `kid`, which only selects a key.
//! - Extra claims are carried in `raw_claims` for downstream display and are
//!   never consulted for authorization.
use crate::auth::keys::{KeyError, KeyResolver};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Claims of a token that passed every check. Request-scoped; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClaims {
    pub subject_id: String,
    pub issuer: String,
    /// The configured audience the token was accepted for.
    pub audience: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Value of the configured tenant claim, when present and non-empty.
    pub tenant_hint: Option<String>,
    /// The complete verified payload.
    pub raw_claims: Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("malformed token: {0}")]
    Malformed(&'static str),
    #[error("unsupported algorithm {0:?}")]
    UnsupportedAlgorithm(Algorithm),
    #[error("missing key id")]
    MissingKeyId,
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("invalid claim: {0}")]
    InvalidClaim(String),
}

impl VerifyError {
    /// Only identity provider outages are worth retrying with the same token.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VerifyError::Key(err) if err.is_retryable())
    }
}

#[derive(Debug, Clone)]
pub struct VerifierSettings {
    pub issuer: String,
    pub audience: String,
    pub clock_skew_secs: u64,
    pub tenant_claim: String,
}

#[derive(Clone)]
pub struct TokenVerifier {
    keys: Arc<dyn KeyResolver>,
    settings: VerifierSettings,
}

#[derive(Debug, Deserialize)]
struct RegisteredClaims {
    sub: String,
    iss: String,
    iat: i64,
    exp: i64,
}

impl TokenVerifier {
    pub fn new(keys: Arc<dyn KeyResolver>, settings: VerifierSettings) -> Self {
        Self { keys, settings }
    }

    /// Verify `token` and extract its claims.
    ///
    /// # Errors
    /// - `VerifyError::Malformed` when the token is not three base64url segments.
    /// - `VerifyError::UnsupportedAlgorithm` for anything but RS256.
    /// - `VerifyError::MissingKeyId` when the header has no `kid`.
    /// - `VerifyError::Key` when the signing key cannot be resolved.
    /// - `VerifyError::Jwt` for signature, issuer, audience and expiry failures.
    /// - `VerifyError::InvalidClaim` for a missing or future `iat`, or a
    ///   malformed registered claim.
    pub async fn verify(&self, token: &str) -> Result<VerifiedClaims, VerifyError> {
        // Step 1: Cheap structural check before any parsing.
        check_shape(token)?;

        // Step 2: Pin the algorithm and read the key id.
        let header = decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(VerifyError::UnsupportedAlgorithm(header.alg));
        }
        let kid = header
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or(VerifyError::MissingKeyId)?;

        // Step 3: Resolve the key; this is the only step that may do I/O.
        let key = self.keys.signing_key(kid).await?;

        // Step 4: Signature, issuer, audience and expiry.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.settings.issuer.as_str()]);
        validation.set_audience(&[self.settings.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = self.settings.clock_skew_secs;
        let data = decode::<Map<String, Value>>(token, &key.decoding_key(), &validation)?;

        // Step 5: Lift the named claims into a typed struct.
        let raw_claims = data.claims;
        let registered: RegisteredClaims =
            serde_json::from_value(Value::Object(raw_claims.clone()))
                .map_err(|err| VerifyError::InvalidClaim(err.to_string()))?;

        // Step 6: `iat` may not sit in the future beyond the skew allowance.
        let now = Utc::now().timestamp();
        let skew = i64::try_from(self.settings.clock_skew_secs).unwrap_or(i64::MAX);
        if registered.iat > now.saturating_add(skew) {
            return Err(VerifyError::InvalidClaim("iat in future".to_string()));
        }
        let issued_at = timestamp(registered.iat, "iat")?;
        let expires_at = timestamp(registered.exp, "exp")?;
        let tenant_hint = raw_claims
            .get(&self.settings.tenant_claim)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        Ok(VerifiedClaims {
            subject_id: registered.sub,
            issuer: registered.iss,
            audience: self.settings.audience.clone(),
            issued_at,
            expires_at,
            tenant_hint,
            raw_claims,
        })
    }
}

fn check_shape(token: &str) -> Result<(), VerifyError> {
    let mut segments = 0;
    for segment in token.split('.') {
        segments += 1;
        if segment.is_empty() {
            return Err(VerifyError::Malformed("empty segment"));
        }
        if !segment
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_')
        {
            return Err(VerifyError::Malformed("segment is not base64url"));
        }
    }
    if segments != 3 {
        return Err(VerifyError::Malformed("expected three segments"));
    }
    Ok(())
}

fn timestamp(seconds: i64, claim: &str) -> Result<DateTime<Utc>, VerifyError> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| VerifyError::InvalidClaim(format!("{claim} out of range")))
}
