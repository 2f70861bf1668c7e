//! Bearer token capability
//!
//! Token acquisition lives outside this crate. The engine only asks an
//! [`AuthContext`] for the current valid token at the moment it builds a
//! request, and never persists what it gets back.

use crate::error::{GraphError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Environment variable read by [`EnvToken`]
pub const ACCESS_TOKEN_ENV: &str = "GRAPH_ACCESS_TOKEN";

/// Tokens within this many seconds of expiry are treated as already expired
const TOKEN_EXPIRY_BUFFER_SECS: i64 = 60;

/// An access token handed out by a provider
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    /// `None` means the provider did not say; the token is not cached
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                now + chrono::Duration::seconds(TOKEN_EXPIRY_BUFFER_SECS) < expires_at
            }
            None => false,
        }
    }
}

// Keep secrets out of debug output and logs.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// External source of bearer tokens
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<AccessToken>;
}

/// A fixed token, e.g. one pasted by the user or injected by a test
#[derive(Clone)]
pub struct StaticToken(AccessToken);

impl StaticToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(AccessToken::new(secret))
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<AccessToken> {
        Ok(self.0.clone())
    }
}

/// Reads the token from an environment variable on every call, so an
/// external refresher can rotate it underneath a running process
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvToken {
    fn default() -> Self {
        Self::new(ACCESS_TOKEN_ENV)
    }
}

#[async_trait]
impl TokenProvider for EnvToken {
    async fn token(&self) -> Result<AccessToken> {
        match std::env::var(&self.var) {
            Ok(value) if !value.trim().is_empty() => Ok(AccessToken::new(value.trim())),
            _ => Err(GraphError::Auth(format!("{} is not set", self.var))),
        }
    }
}

/// Wraps a provider and reuses its tokens until they near expiry
pub struct CachingProvider<P> {
    inner: P,
    token_cache: RwLock<Option<AccessToken>>,
}

impl<P: TokenProvider> CachingProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            token_cache: RwLock::new(None),
        }
    }

    /// Drop the cached token so the next call asks the inner provider again
    pub async fn invalidate(&self) {
        let mut cache = self.token_cache.write().await;
        *cache = None;
    }
}

#[async_trait]
impl<P: TokenProvider> TokenProvider for CachingProvider<P> {
    /// A cached token is returned only while it is outside the expiry
    /// buffer. Tokens without a known expiry are fetched every time.
    async fn token(&self) -> Result<AccessToken> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_fresh(Utc::now()) {
                    return Ok(cached.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let token = self.inner.token().await?;
        let mut cache = self.token_cache.write().await;
        if token.is_fresh(Utc::now()) {
            tracing::debug!("New token cached until {:?}", token.expires_at);
            *cache = Some(token.clone());
        } else {
            *cache = None;
        }

        Ok(token)
    }
}

/// Read-only handle to the external token capability
#[derive(Clone)]
pub struct AuthContext {
    provider: Arc<dyn TokenProvider>,
}

impl AuthContext {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self { provider }
    }

    pub fn from_provider<P: TokenProvider + 'static>(provider: P) -> Self {
        Self::new(Arc::new(provider))
    }

    pub fn static_token(secret: impl Into<String>) -> Self {
        Self::from_provider(StaticToken::new(secret))
    }

    /// The current valid token, as the provider reports it right now
    pub async fn current_token(&self) -> Result<String> {
        let token = self.provider.token().await?;
        if token.secret.is_empty() {
            return Err(GraphError::Auth("provider returned an empty token".to_string()));
        }
        Ok(token.secret)
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext").finish_non_exhaustive()
    }
}
