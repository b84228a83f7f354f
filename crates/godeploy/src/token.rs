//! # Access token lifecycle
//!
//! Access tokens are JWTs whose payload is decoded without signature
//! verification, solely to read the `exp` claim. The server remains the
//! authority on validity; the local check only decides when to refresh.
//!
//! A token that cannot be decoded is treated as expired and triggers a
//! refresh attempt. Each call makes at most one refresh attempt.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use derive_more::{Display, Error, From};
use serde::Deserialize;

use crate::{
    api::ApiError,
    credentials::{CredentialError, CredentialStore},
};

/// Tokens are refreshed when they expire within this window.
pub(crate) const EXPIRY_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Access and refresh token pair issued by the authentication API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TokenPair {
    /// New access token.
    pub access_token: String,

    /// New refresh token.
    pub refresh_token: String,
}

/// Refresh callback, usually backed by the API client.
pub(crate) type RefreshFn<'a> = Box<dyn Fn(&str) -> Result<TokenPair, ApiError> + 'a>;

/// Token lifecycle errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum TokenError {
    /// No access token is stored.
    #[display(fmt = "no authentication token found")]
    NoToken,

    /// No refresh token is stored.
    #[display(fmt = "no refresh token found, please login again")]
    NoRefreshToken,

    /// Refresh request failed; the previous tokens are kept.
    #[display(fmt = "failed to refresh token: {}", _0)]
    RefreshFailed(ApiError),

    /// Credential storage error.
    Credentials(CredentialError),
}

/// The only claim read from the access token payload.
#[derive(Deserialize)]
struct ExpiryClaims {
    /// Expiration time, in seconds since the Unix epoch.
    exp: i64,
}

/// Keeps the stored access token fresh.
pub(crate) struct TokenManager<'a> {
    /// Credential storage.
    store: CredentialStore,

    /// Refresh callback.
    refresh: RefreshFn<'a>,

    /// Refresh window before expiration.
    buffer: Duration,
}

impl<'a> TokenManager<'a> {
    /// Create a new token manager over `store`, calling `refresh` to exchange refresh tokens.
    pub fn new(
        store: CredentialStore,
        refresh: impl Fn(&str) -> Result<TokenPair, ApiError> + 'a,
    ) -> Self {
        Self {
            store,
            refresh: Box::new(refresh),
            buffer: EXPIRY_BUFFER,
        }
    }

    /// Underlying credential store.
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Return a usable access token, refreshing it first if it expires within the buffer.
    pub fn ensure_valid_token(&self) -> Result<String, TokenError> {
        tracing::debug!("ensuring valid token");

        let token = self.store.auth_token()?;

        if token.is_empty() {
            tracing::debug!("no authentication token found");
            return Err(TokenError::NoToken);
        }

        match expires_at(&token) {
            Some(exp) if !is_expiring(exp, unix_now(), self.buffer) => {
                tracing::debug!(exp, "token is valid");
                return Ok(token);
            }
            Some(exp) => tracing::info!(exp, "token expired or expiring soon, refreshing"),
            None => tracing::warn!("unable to read token expiration, attempting refresh"),
        }

        self.refresh_access_token()?;

        Ok(self.store.auth_token()?)
    }

    /// Exchange the stored refresh token for a new token pair and persist it.
    pub fn refresh_access_token(&self) -> Result<(), TokenError> {
        let refresh_token = self.store.refresh_token()?;

        if refresh_token.is_empty() {
            tracing::warn!("no refresh token found in storage");
            return Err(TokenError::NoRefreshToken);
        }

        let pair = (self.refresh)(&refresh_token).map_err(|error| {
            tracing::error!(%error, "refresh request failed");
            TokenError::RefreshFailed(error)
        })?;

        // Servers that do not rotate refresh tokens leave the field empty.
        if pair.refresh_token.is_empty() {
            self.store.set_auth_token(&pair.access_token)?;
        } else {
            self.store
                .set_tokens(&pair.access_token, &pair.refresh_token)?;
        }

        tracing::info!("tokens refreshed and saved");

        Ok(())
    }
}

/// Read the `exp` claim from the unverified payload of a JWT.
pub(crate) fn expires_at(token: &str) -> Option<i64> {
    let mut segments = token.split('.');

    let (Some(_), Some(payload), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };

    let payload = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: ExpiryClaims = serde_json::from_slice(&payload).ok()?;

    Some(claims.exp)
}

/// Whether a token expiring at `exp` should be refreshed at `now`.
fn is_expiring(exp: i64, now: i64, buffer: Duration) -> bool {
    now.saturating_add(buffer.as_secs() as i64) >= exp
}

/// Current time, in seconds since the Unix epoch.
fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as i64)
}
