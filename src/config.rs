//! # Configuration
//!
//! Typed configuration for the fulfillment core. Every field has a working
//! default, so an empty environment yields a usable config; a YAML file named
//! by `FULFILLMENT_CONFIG_PATH` and `FULFILLMENT__`-prefixed environment
//! variables override in that order.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::system;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FulfillmentConfig {
    pub pricing: PricingConfig,
    pub assignment: AssignmentConfig,
    pub events: EventsConfig,
    pub database: DatabaseConfig,
}

impl FulfillmentConfig {
    /// Load from the optional YAML file plus environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Ok(path) = std::env::var("FULFILLMENT_CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&path));
        }
        builder
            .add_source(Environment::with_prefix("FULFILLMENT").separator("__"))
            .build()?
            .try_deserialize()
    }
}

/// Money and tax settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// GST rate applied when totals are recomputed
    pub gst_rate: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            gst_rate: system::DEFAULT_GST_RATE,
        }
    }
}

/// Driver assignment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Wall-clock budget for one auto-assignment run
    pub auto_assign_timeout_seconds: u64,
}

impl AssignmentConfig {
    pub fn auto_assign_timeout(&self) -> Duration {
        Duration::from_secs(self.auto_assign_timeout_seconds)
    }
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            auto_assign_timeout_seconds: system::DEFAULT_AUTO_ASSIGN_TIMEOUT_SECS,
        }
    }
}

/// Event publisher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
        }
    }
}

/// Database connection settings for the Postgres store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl DatabaseConfig {
    /// Build a connection pool from these settings
    pub async fn connect(&self) -> Result<sqlx::PgPool, sqlx::Error> {
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_seconds))
            .connect(&self.url)
            .await
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/fulfillment".to_string(),
            max_connections: 10,
            acquire_timeout_seconds: 30,
        }
    }
}
