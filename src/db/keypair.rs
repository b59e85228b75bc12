//! Key-pair login for Snowflake.
//!
//! Instead of a password the login request carries a short-lived RS256 JWT.
//! Its issuer names the SHA-256 fingerprint of the user's public key, which
//! is how Snowflake picks the key to verify the signature with.

use crate::error::{Result, TransformationError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Snowflake refuses tokens valid for more than an hour.
const TOKEN_LIFETIME_SECS: u64 = 59 * 60;

/// Claims of the login token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub iss: String,
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
}

/// A workspace private key ready to sign login tokens.
#[derive(Clone)]
pub(crate) struct KeyPair {
    qualified_user: String,
    fingerprint: String,
    signing_key: EncodingKey,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("qualified_user", &self.qualified_user)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Reads an unencrypted PKCS#8 or PKCS#1 PEM key.
    pub(crate) fn from_pem(account: &str, user: &str, pem: &str) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| {
                TransformationError::config(format!("Invalid workspace private key: {e}"))
            })?;
        let public = private.to_public_key().to_public_key_der().map_err(|e| {
            TransformationError::config(format!("Invalid workspace private key: {e}"))
        })?;
        let signing_key = EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
            TransformationError::config(format!("Invalid workspace private key: {e}"))
        })?;

        Ok(Self {
            qualified_user: format!("{}.{}", account_locator(account), user.to_uppercase()),
            fingerprint: format!(
                "SHA256:{}",
                STANDARD.encode(Sha256::digest(public.as_bytes()))
            ),
            signing_key,
        })
    }

    pub(crate) fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub(crate) fn claims(&self, issued_at: u64) -> Claims {
        Claims {
            iss: format!("{}.{}", self.qualified_user, self.fingerprint),
            sub: self.qualified_user.clone(),
            iat: issued_at,
            exp: issued_at + TOKEN_LIFETIME_SECS,
        }
    }

    /// Signs a fresh token; called on every login so reconnects never reuse one.
    pub(crate) fn token(&self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        encode(
            &Header::new(Algorithm::RS256),
            &self.claims(now),
            &self.signing_key,
        )
        .map_err(|e| TransformationError::connection(format!("Failed to sign login token: {e}")))
    }
}

/// Account part of the issuer: upper-cased, region suffix dropped.
fn account_locator(account: &str) -> String {
    account
        .split('.')
        .next()
        .unwrap_or_default()
        .to_uppercase()
}
