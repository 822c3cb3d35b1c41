//! GCP Authentication
//!
//! Handles authentication using Application Default Credentials (ADC), or a
//! static bearer token taken from `INFRAKIT_GCP_TOKEN`.

use anyhow::{Context, Result};
use gcp_auth::TokenProvider;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default scopes for GCP API access
pub const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Environment variable holding a pre-issued access token
pub const STATIC_TOKEN_ENV: &str = "INFRAKIT_GCP_TOKEN";

/// Refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if we can't determine expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Clone)]
enum TokenSource {
    Adc(Arc<dyn TokenProvider>),
    Static(String),
}

/// GCP credentials holder with token caching
#[derive(Clone)]
pub struct GcpCredentials {
    source: TokenSource,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl GcpCredentials {
    /// Create new GCP credentials using Application Default Credentials
    pub async fn new() -> Result<Self> {
        let provider = gcp_auth::provider().await.context(
            "Failed to initialize GCP authentication. Run 'gcloud auth application-default login'",
        )?;

        Ok(Self {
            source: TokenSource::Adc(provider),
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Credentials that always hand out `token`
    pub fn from_static(token: impl Into<String>) -> Self {
        Self {
            source: TokenSource::Static(token.into()),
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Static token from the environment if set, ADC otherwise
    pub async fn from_env_or_adc() -> Result<Self> {
        match std::env::var(STATIC_TOKEN_ENV) {
            Ok(token) if !token.is_empty() => {
                tracing::info!("Using GCP token from {}", STATIC_TOKEN_ENV);
                Ok(Self::from_static(token))
            }
            _ => Self::new().await,
        }
    }

    /// Get an access token for API calls
    pub async fn get_token(&self) -> Result<String> {
        let provider = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Adc(provider) => provider,
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let token = provider
            .token(DEFAULT_SCOPES)
            .await
            .context("Failed to get access token")?;

        let token_str = token.as_str().to_string();
        let expires_at = Instant::now() + DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER;

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token_str.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            (DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token_is_returned_as_is() {
        let creds = GcpCredentials::from_static("ya29.test");
        assert_eq!(creds.get_token().await.unwrap(), "ya29.test");
        assert_eq!(creds.get_token().await.unwrap(), "ya29.test");
    }

    #[test]
    fn test_cached_token_expiry() {
        let fresh = CachedToken {
            token: "t".to_string(),
            expires_at: Instant::now() + Duration::from_secs(30),
        };
        assert!(fresh.is_valid());

        let stale = CachedToken {
            token: "t".to_string(),
            expires_at: Instant::now() - Duration::from_secs(1),
        };
        assert!(!stale.is_valid());
    }
}
