//! Shared-secret authentication.
//!
//! Three strategies are supported, selected by [`AuthMode`]:
//! - `shared_secret`: the client sends the secret itself.
//! - `hash`: the client sends `hex(SHA-256(secret))`.
//! - `timestamped`: the client sends `hex(HMAC-SHA256(secret, window))` where
//!   `window = unix_seconds / window_seconds`, optionally with the timestamp it
//!   signed.
//!
//! All comparisons run in constant time.

use crate::config::{AuthConfig, AuthMode};
use crate::domain::model::Credentials;
use crate::utils::error::{RelayError, Result};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct Authenticator {
    mode: AuthMode,
    secret: String,
    window_seconds: u64,
    max_skew_seconds: u64,
}

impl Authenticator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            mode: config.mode,
            secret: config.shared_secret.clone(),
            window_seconds: config.window_seconds.max(1),
            max_skew_seconds: config.max_skew_seconds,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Verifies the credentials against the configured strategy at `now` (unix seconds).
    pub fn verify(&self, credentials: &Credentials, now: i64) -> Result<()> {
        match self.mode {
            AuthMode::SharedSecret => self.verify_shared_secret(credentials),
            AuthMode::Hash => self.verify_static_hash(credentials),
            AuthMode::Timestamped => self.verify_timestamped(credentials, now),
        }
    }

    fn verify_shared_secret(&self, credentials: &Credentials) -> Result<()> {
        let provided = credentials
            .shared_secret
            .as_deref()
            .ok_or_else(|| RelayError::unauthorized("missing shared_secret"))?;

        if constant_time_eq(provided.as_bytes(), self.secret.as_bytes()) {
            Ok(())
        } else {
            Err(RelayError::unauthorized("shared secret mismatch"))
        }
    }

    fn verify_static_hash(&self, credentials: &Credentials) -> Result<()> {
        let provided = decode_hash(credentials)?;
        let expected = Sha256::digest(self.secret.as_bytes());

        if constant_time_eq(&provided, expected.as_slice()) {
            Ok(())
        } else {
            Err(RelayError::unauthorized("hash mismatch"))
        }
    }

    fn verify_timestamped(&self, credentials: &Credentials, now: i64) -> Result<()> {
        let provided = decode_hash(credentials)?;

        let windows = match credentials.timestamp {
            Some(timestamp) => {
                let skew = now.abs_diff(timestamp);
                if skew > self.max_skew_seconds {
                    return Err(RelayError::unauthorized(format!(
                        "timestamp outside allowed skew ({}s)",
                        skew
                    )));
                }
                vec![self.window_of(timestamp)]
            }
            None => {
                let current = self.window_of(now);
                vec![current, current - 1]
            }
        };

        let accepted = windows
            .iter()
            .any(|window| self.verify_window(*window, &provided));

        if accepted {
            Ok(())
        } else {
            Err(RelayError::unauthorized("dynamic hash mismatch"))
        }
    }

    fn window_of(&self, unix_seconds: i64) -> i64 {
        window_for(unix_seconds, self.window_seconds)
    }

    fn verify_window(&self, window: i64, provided: &[u8]) -> bool {
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.as_bytes()) else {
            return false;
        };
        mac.update(window.to_string().as_bytes());
        mac.verify_slice(provided).is_ok()
    }
}

fn decode_hash(credentials: &Credentials) -> Result<Vec<u8>> {
    let hash = credentials
        .hash
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| RelayError::unauthorized("missing hash"))?;

    hex::decode(hash).map_err(|_| RelayError::unauthorized("hash is not valid hex"))
}

/// Dynamic secret for a window: `hex(HMAC-SHA256(secret, window))`.
pub fn derive_dynamic_secret(secret: &str, window: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(window.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn window_for(unix_seconds: i64, window_seconds: u64) -> i64 {
    unix_seconds.div_euclid(window_seconds.max(1) as i64)
}

/// `hex(SHA-256(secret))`
pub fn static_hash(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Compares two byte strings without short-circuiting on the first difference.
/// Length is not treated as secret.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
