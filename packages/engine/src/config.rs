use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::domains::reconciliation::EngineSettings;

/// Engine configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_concurrent_checks: usize,
    pub store_timeout_ms: u64,
    pub location_cache_ttl_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_concurrent_checks: env::var("MAX_CONCURRENT_CHECKS")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .context("MAX_CONCURRENT_CHECKS must be a valid number")?,
            store_timeout_ms: env::var("STORE_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .context("STORE_TIMEOUT_MS must be a valid number")?,
            location_cache_ttl_secs: env::var("LOCATION_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("LOCATION_CACHE_TTL_SECS must be a valid number")?,
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            max_concurrent_checks: self.max_concurrent_checks,
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            location_cache_ttl: Duration::from_secs(self.location_cache_ttl_secs),
        }
    }
}
