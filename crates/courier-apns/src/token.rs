//! Provider token minting and reuse.
//!
//! A provider token is a compact JWS: `base64url(header).base64url(claims).base64url(sig)`
//! with header `{"alg":"ES256","kid":…,"typ":"JWT"}`, claims `{"iss":team,"iat":now}`
//! and a raw 64-byte P-256 signature over the first two segments.
//!
//! Apple accepts a token for up to an hour and throttles providers that mint
//! too often, so [`ProviderTokenCache`] hands out the same token until it ages
//! past its TTL.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL;
use courier_core::Clock;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::DecodePrivateKey;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::signature::{SignatureError, der_to_raw};

/// Default reuse window: 55 minutes, inside Apple's one-hour limit.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(55 * 60);

/// Why a provider token could not be produced.
#[derive(Debug, Error)]
pub enum MintError {
    /// The private key material is not a P-256 PKCS#8 or SEC1 PEM key.
    #[error("invalid provider key: {reason}")]
    InvalidKey {
        /// Error description.
        reason: String,
    },
    /// The signer refused to sign.
    #[error("failed to sign provider token: {reason}")]
    Signing {
        /// Error description.
        reason: String,
    },
    /// The signer's DER output could not be converted to raw form.
    #[error("malformed signature encoding: {0}")]
    Transcode(#[from] SignatureError),
    /// A token segment could not be serialized.
    #[error("failed to encode token segment: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct JwsHeader<'a> {
    alg: &'static str,
    kid: &'a str,
    typ: &'static str,
}

#[derive(Serialize)]
struct ProviderClaims<'a> {
    iss: &'a str,
    iat: i64,
}

/// A signed provider token plus the `iat` it carries.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderToken {
    value: String,
    issued_at: i64,
}

impl ProviderToken {
    /// The compact JWS string sent as the bearer credential.
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Unix seconds embedded as `iat`.
    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }
}

impl fmt::Debug for ProviderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderToken")
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}

/// Parse Apple `.p8` key material.
///
/// Accepts PKCS#8 (`BEGIN PRIVATE KEY`, what Apple ships) and SEC1
/// (`BEGIN EC PRIVATE KEY`).
pub fn parse_signing_key(pem: &str) -> Result<SigningKey, MintError> {
    let pem = pem.trim();
    if pem.contains("BEGIN EC PRIVATE KEY") {
        let secret = p256::SecretKey::from_sec1_pem(pem).map_err(|e| MintError::InvalidKey {
            reason: e.to_string(),
        })?;
        return Ok(SigningKey::from(secret));
    }
    SigningKey::from_pkcs8_pem(pem).map_err(|e| MintError::InvalidKey {
        reason: e.to_string(),
    })
}

/// Build and sign a provider token.
pub fn sign_provider_token(
    team_id: &str,
    key_id: &str,
    key: &SigningKey,
    issued_at: i64,
) -> Result<String, MintError> {
    let header = serde_json::to_vec(&JwsHeader {
        alg: "ES256",
        kid: key_id,
        typ: "JWT",
    })?;
    let claims = serde_json::to_vec(&ProviderClaims {
        iss: team_id,
        iat: issued_at,
    })?;

    let signing_input = format!("{}.{}", BASE64URL.encode(header), BASE64URL.encode(claims));

    let signature: Signature = key
        .try_sign(signing_input.as_bytes())
        .map_err(|e| MintError::Signing {
            reason: e.to_string(),
        })?;
    let raw = der_to_raw(signature.to_der().as_bytes())?;

    Ok(format!("{signing_input}.{}", BASE64URL.encode(raw)))
}

/// Mints provider tokens for one team/key pair.
pub struct TokenMinter {
    team_id: String,
    key_id: String,
    private_key: String,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenMinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenMinter")
            .field("team_id", &self.team_id)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl TokenMinter {
    /// Create a minter. The key is parsed on every [`mint`](Self::mint), so
    /// bad key material surfaces as a [`MintError`] rather than here.
    pub fn new(
        team_id: impl Into<String>,
        key_id: impl Into<String>,
        private_key: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            team_id: team_id.into(),
            key_id: key_id.into(),
            private_key: private_key.into(),
            clock,
        }
    }

    /// Mint a fresh token stamped with the clock's current time.
    pub fn mint(&self) -> Result<ProviderToken, MintError> {
        let key = parse_signing_key(&self.private_key)?;
        let issued_at = self.clock.unix_now();
        let value = sign_provider_token(&self.team_id, &self.key_id, &key, issued_at)?;
        debug!(team_id = %self.team_id, key_id = %self.key_id, issued_at, "minted provider token");
        Ok(ProviderToken { value, issued_at })
    }

    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

/// Reuses a minted token until it is `ttl` old.
///
/// A zero TTL disables reuse and mints on every call.
#[derive(Debug)]
pub struct ProviderTokenCache {
    minter: TokenMinter,
    ttl: Duration,
    cached: Mutex<Option<ProviderToken>>,
}

impl ProviderTokenCache {
    /// Wrap a minter.
    pub fn new(minter: TokenMinter, ttl: Duration) -> Self {
        Self {
            minter,
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Return the cached token while fresh, otherwise mint and remember a new one.
    ///
    /// A failed mint clears the cache.
    pub fn current(&self) -> Result<ProviderToken, MintError> {
        if self.ttl.is_zero() {
            return self.minter.mint();
        }

        let mut cached = self.cached.lock();
        if let Some(token) = cached.as_ref() {
            if self.is_fresh(token) {
                return Ok(token.clone());
            }
        }

        match self.minter.mint() {
            Ok(token) => {
                *cached = Some(token.clone());
                Ok(token)
            }
            Err(e) => {
                *cached = None;
                Err(e)
            }
        }
    }

    /// Drop the cached token so the next [`current`](Self::current) mints.
    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }

    fn is_fresh(&self, token: &ProviderToken) -> bool {
        let age = self.minter.clock().unix_now() - token.issued_at;
        u64::try_from(age).is_ok_and(|age| age < self.ttl.as_secs())
    }
}
