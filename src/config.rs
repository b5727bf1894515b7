// Process-level configuration for the planner service
// Vendor credentials live here and are never echoed back to callers

use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_VENDOR_BASE_URL: &str = "https://test.api.amadeus.com";
pub const DEFAULT_RATES_BASE_URL: &str = "https://api.frankfurter.app";
pub const DEFAULT_PORT: u16 = 8888;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

// Credentials and endpoint of the travel vendor
#[derive(Clone)]
pub struct VendorConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for VendorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub vendor: VendorConfig,
    pub rates_base_url: String,
    pub port: u16,
    // None keeps outbound calls unbounded
    pub timeout_ms: Option<u64>,
}

impl AppConfig {
    // Reads the process environment; call dotenv::dotenv() first to pick up a .env file
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let setting = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());

        let client_id =
            setting("AMADEUS_CLIENT_ID").ok_or(ConfigError::MissingSetting("AMADEUS_CLIENT_ID"))?;
        let client_secret = setting("AMADEUS_CLIENT_SECRET")
            .ok_or(ConfigError::MissingSetting("AMADEUS_CLIENT_SECRET"))?;

        let port = match setting("TRIP_PLANNER_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                key: "TRIP_PLANNER_PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let timeout_ms = match setting("TRIP_PLANNER_TIMEOUT_MS") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue {
                    key: "TRIP_PLANNER_TIMEOUT_MS",
                    value: raw,
                }
            })?),
            None => None,
        };

        Ok(Self {
            vendor: VendorConfig {
                base_url: trim_base_url(
                    setting("AMADEUS_BASE_URL").unwrap_or_else(|| DEFAULT_VENDOR_BASE_URL.into()),
                ),
                client_id,
                client_secret,
            },
            rates_base_url: trim_base_url(
                setting("FRANKFURTER_BASE_URL").unwrap_or_else(|| DEFAULT_RATES_BASE_URL.into()),
            ),
            port,
            timeout_ms,
        })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

fn trim_base_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}
