//! Configuration management for the operator CLI.
//!
//! Loads configuration from environment variables with sensible defaults.
//! The ticket signing secret has no default.

use anyhow::Context;
use boxoffice_core::environment::OrderPolicy;
use boxoffice_core::qr::SigningSecret;
use boxoffice_postgres::PostgresConfig;
use serde::{Deserialize, Serialize};
use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// `PostgreSQL` configuration
    pub postgres: PostgresConfig,
    /// Order creation configuration
    pub orders: OrdersConfig,
}

/// Order creation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdersConfig {
    /// Currency recorded on new orders
    pub currency: String,
    /// Per-selection quantity cap
    pub max_quantity_per_product: u32,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        let policy = OrderPolicy::default();
        Self {
            currency: policy.currency,
            max_quantity_per_product: policy.max_quantity_per_product,
        }
    }
}

impl OrdersConfig {
    /// Order policy for the services.
    #[must_use]
    pub fn policy(&self) -> OrderPolicy {
        OrderPolicy {
            currency: self.currency.clone(),
            max_quantity_per_product: self.max_quantity_per_product,
            ..OrderPolicy::default()
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = OrdersConfig::default();
        Self {
            postgres: PostgresConfig::from_env(),
            orders: OrdersConfig {
                currency: env::var("ORDER_CURRENCY")
                    .ok()
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty())
                    .unwrap_or(defaults.currency),
                max_quantity_per_product: env::var("ORDER_MAX_QUANTITY_PER_PRODUCT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|max: &u32| *max > 0)
                    .unwrap_or(defaults.max_quantity_per_product),
            },
        }
    }
}

/// Reads the ticket signing secret from `TICKET_HMAC_SECRET`, falling back to
/// `HMAC_SECRET`.
///
/// Kept out of [`Config`] so it never ends up in a serialized or logged copy.
///
/// # Errors
///
/// Returns an error if neither variable holds a non-blank value.
pub fn signing_secret() -> anyhow::Result<SigningSecret> {
    let raw = ["TICKET_HMAC_SECRET", "HMAC_SECRET"]
        .into_iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.trim().is_empty())
        .unwrap_or_default();
    SigningSecret::new(raw).context("set TICKET_HMAC_SECRET (or HMAC_SECRET)")
}
