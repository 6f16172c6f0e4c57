use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    config::{Credentials, normalize_pem},
    error::{AscError, Result},
};

pub const AUDIENCE: &str = "appstoreconnect-v1";
/// Apple caps token lifetime at 20 minutes.
pub const TOKEN_LIFETIME_SECS: u64 = 20 * 60;
/// Cached tokens are reused while more than this many seconds remain.
pub const REFRESH_MARGIN_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub iss: String,
    pub iat: u64,
    pub exp: u64,
    pub aud: String,
}

struct CachedToken {
    token: String,
    expires_at: u64,
}

/// Issues ES256 bearer tokens and caches the latest one.
pub struct TokenMinter {
    key_id: String,
    issuer_id: String,
    key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenMinter {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        if credentials.key_id.trim().is_empty() {
            return Err(AscError::Configuration("key ID is required".into()));
        }
        if credentials.issuer_id.trim().is_empty() {
            return Err(AscError::Configuration("issuer ID is required".into()));
        }
        let pem = normalize_pem(&credentials.private_key_pem);
        let key = EncodingKey::from_ec_pem(pem.as_bytes()).map_err(|e| {
            AscError::Configuration(format!(
                "failed to parse private key as an EC PKCS#8 key: {e}"
            ))
        })?;
        Ok(Self {
            key_id: credentials.key_id.trim().to_string(),
            issuer_id: credentials.issuer_id.trim().to_string(),
            key,
            cached: Mutex::new(None),
        })
    }

    pub async fn token(&self) -> Result<String> {
        self.token_at(unix_now()?).await
    }

    /// Returns the cached token while it has more than a minute left, otherwise
    /// mints a new one. The lock is held across the mint so concurrent callers
    /// share a single refresh.
    pub async fn token_at(&self, now: u64) -> Result<String> {
        let mut guard = self.cached.lock().await;
        if let Some(cached) = guard.as_ref()
            && cached.expires_at.saturating_sub(now) > REFRESH_MARGIN_SECS
        {
            return Ok(cached.token.clone());
        }

        let token = self.mint(now)?;
        debug!(kid = %self.key_id, iat = now, "minted bearer token");
        *guard = Some(CachedToken {
            token: token.clone(),
            expires_at: now + TOKEN_LIFETIME_SECS,
        });
        Ok(token)
    }

    /// Drops the cached token so the next call mints a fresh one.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }

    pub fn mint(&self, now: u64) -> Result<String> {
        let claims = Claims {
            iss: self.issuer_id.clone(),
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
            aud: AUDIENCE.to_string(),
        };
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());
        encode(&header, &claims, &self.key).map_err(|e| AscError::Signer(e.to_string()))
    }
}

fn unix_now() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| AscError::Signer(format!("system clock before unix epoch: {e}")))
}
