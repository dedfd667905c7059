//! Bearer token authentication.
//!
//! # Purpose
//! Groups signing-key resolution (static or JWKS-backed) and RS256 token
//! verification into [`verifier::VerifiedClaims`].
pub mod jwks;
pub mod keys;
pub mod verifier;
