use crate::render::RetryPolicy;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Pipeline configuration, loadable from a JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileConfig {
    /// Pages rendered per batch invocation
    pub batch_size: usize,
    /// Render interior pages with bleed
    pub include_bleed: bool,
    pub retry: RetryPolicy,
    /// TTL for caller-facing download URLs
    pub download_url_ttl_secs: u64,
    /// TTL for URLs handed to the fulfillment partner's queue
    pub fulfillment_url_ttl_secs: u64,
    /// TTL for the per-page token given to the rasterizer
    pub capability_token_ttl_secs: u64,
    /// HMAC secret for signed URLs and capability tokens
    pub signing_secret: String,
    /// Public origin signed URLs are issued under
    pub public_base_url: String,
    /// Rough render cost used for the accepted-response estimate
    pub seconds_per_page: u64,
    /// Block compiles on unacknowledged critical pre-flight violations.
    /// When off, violations are only logged.
    pub enforce_preflight: bool,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            include_bleed: true,
            retry: RetryPolicy::default(),
            download_url_ttl_secs: 60 * 60,
            fulfillment_url_ttl_secs: 24 * 60 * 60,
            capability_token_ttl_secs: 5 * 60,
            signing_secret: generate_secret(),
            public_base_url: "https://artifacts.localhost".to_string(),
            seconds_per_page: 6,
            enforce_preflight: true,
        }
    }
}

fn generate_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

impl CompileConfig {
    /// Load configuration from a JSON file
    pub async fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let config: CompileConfig = serde_json::from_slice(&bytes)
            .map_err(|e| CompileError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub async fn save(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CompileError::Config(format!("Failed to serialize config: {}", e)))?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(CompileError::Config(
                "Batch size must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(CompileError::Config(
                "Retry policy needs at least one attempt".to_string(),
            ));
        }
        if self.signing_secret.is_empty() {
            return Err(CompileError::Config("Signing secret is empty".to_string()));
        }
        if self.download_url_ttl_secs == 0 || self.fulfillment_url_ttl_secs == 0 {
            return Err(CompileError::Config(
                "Signed URL TTLs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn download_url_ttl(&self) -> Duration {
        Duration::from_secs(self.download_url_ttl_secs)
    }

    pub fn fulfillment_url_ttl(&self) -> Duration {
        Duration::from_secs(self.fulfillment_url_ttl_secs)
    }

    pub fn capability_token_ttl(&self) -> Duration {
        Duration::from_secs(self.capability_token_ttl_secs)
    }

    /// Estimated wall-clock minutes for a book of `page_count` pages
    pub fn estimated_minutes(&self, page_count: usize) -> u64 {
        let seconds = page_count as u64 * self.seconds_per_page;
        seconds.div_ceil(60).max(1)
    }
}
