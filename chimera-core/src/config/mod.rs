//! Runtime configuration from the environment, with `.env` fallback.
//!
//! Process environment always takes precedence: the `.env` file is loaded
//! without overriding variables that are already set. Credentials are
//! namespaced per exchange (`BINANCE_API_KEY`, `BINANCE_API_SECRET`,
//! optional passphrase), and `<EXCHANGE>_TRADE_MODE` selects spot versus
//! futures endpoints inside the adapter.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::runtime::arm::DEFAULT_MIN_ARM_SECONDS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    Spot,
    Futures,
}

impl TradeMode {
    fn from_env_value(value: &str) -> Self {
        if value.eq_ignore_ascii_case("futures") {
            TradeMode::Futures
        } else {
            TradeMode::Spot
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExchangeCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub exchange: String,
    pub trade_mode: TradeMode,
    pub credentials: Option<ExchangeCredentials>,
    pub event_log_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub min_arm_secs: u64,
    pub truth_interval_secs: u64,
}

impl RuntimeConfig {
    /// Read configuration for one exchange prefix (e.g. `"BINANCE"`).
    /// Consults `.env` as fallback first; existing process env wins.
    pub fn from_env(exchange: &str) -> Self {
        // dotenvy never overrides variables that are already set.
        if dotenvy::dotenv().is_ok() {
            info!(".env loaded");
        }

        let prefix = exchange.to_ascii_uppercase();
        let get = |suffix: &str| env::var(format!("{}_{}", prefix, suffix)).ok();

        let trade_mode = get("TRADE_MODE")
            .map(|v| TradeMode::from_env_value(&v))
            .unwrap_or(TradeMode::Spot);

        let credentials = match (get("API_KEY"), get("API_SECRET")) {
            (Some(api_key), Some(api_secret)) => Some(ExchangeCredentials {
                api_key,
                api_secret,
                passphrase: get("API_PASSPHRASE"),
            }),
            _ => None,
        };

        let data_dir = env::var("CHIMERA_DATA_DIR").unwrap_or_else(|_| "data".to_string());

        Self {
            exchange: prefix,
            trade_mode,
            credentials,
            event_log_path: env::var("CHIMERA_EVENT_LOG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(&data_dir).join("events.bin")),
            snapshot_path: env::var("CHIMERA_SNAPSHOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(&data_dir).join("snapshot.bin")),
            min_arm_secs: env::var("CHIMERA_MIN_ARM_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MIN_ARM_SECONDS),
            truth_interval_secs: env::var("CHIMERA_TRUTH_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }
}
