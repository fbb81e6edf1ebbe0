use std::collections::HashMap;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::enrich::EntityKind;
use crate::error::{AppError, Result};

const DEFAULT_FIRECRAWL_BASE_URL: &str = "https://api.firecrawl.dev";
const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
const DEFAULT_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetcherBackend {
    Firecrawl,
    Direct,
}

impl FromStr for FetcherBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firecrawl" => Ok(FetcherBackend::Firecrawl),
            "direct" => Ok(FetcherBackend::Direct),
            other => Err(AppError::ConfigError(format!(
                "Invalid PAGE_FETCHER '{}': expected 'firecrawl' or 'direct'",
                other
            ))),
        }
    }
}

/// Delay between two targets, per entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingConfig {
    pub delays: HashMap<EntityKind, Duration>,
    pub default_delay: Duration,
}

impl PacingConfig {
    pub fn delay_for(&self, kind: EntityKind) -> Duration {
        self.delays.get(&kind).copied().unwrap_or(self.default_delay)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub page_fetcher: FetcherBackend,
    pub firecrawl_api_key: Option<String>,
    pub firecrawl_base_url: String,
    pub fetch_wait: Duration,
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub http_timeout: Duration,
    pub identity_url: String,
    pub identity_api_key: Option<String>,
    pub pacing: PacingConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source. Blank values count
    /// as unset.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| AppError::ConfigError(format!("{} is not set", key)))
        };

        let host = var("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or(var("PORT"), "PORT", 3000u16)?;
        let ip = IpAddr::from_str(&host)
            .map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;

        let page_fetcher = match var("PAGE_FETCHER") {
            Some(value) => value.parse()?,
            None => FetcherBackend::Firecrawl,
        };

        let default_delay =
            Duration::from_millis(parse_or(var("ENRICH_DELAY_MS"), "ENRICH_DELAY_MS", DEFAULT_DELAY_MS)?);
        let mut delays = HashMap::new();
        for kind in EntityKind::ALL {
            let key = format!("ENRICH_DELAY_MS_{}", kind.as_str().to_ascii_uppercase());
            if let Some(value) = var(&key) {
                let ms: u64 = parse_or(Some(value), &key, DEFAULT_DELAY_MS)?;
                delays.insert(kind, Duration::from_millis(ms));
            }
        }

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            database_url: required("DATABASE_URL")?,
            database_max_connections: parse_or(
                var("DATABASE_MAX_CONNECTIONS"),
                "DATABASE_MAX_CONNECTIONS",
                5,
            )?,
            page_fetcher,
            firecrawl_api_key: var("FIRECRAWL_API_KEY"),
            firecrawl_base_url: var("FIRECRAWL_BASE_URL")
                .unwrap_or_else(|| DEFAULT_FIRECRAWL_BASE_URL.to_string()),
            fetch_wait: Duration::from_millis(parse_or(var("FETCH_WAIT_MS"), "FETCH_WAIT_MS", 3000)?),
            llm_api_key: var("LLM_API_KEY"),
            llm_base_url: var("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            llm_model: var("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            llm_temperature: parse_or(var("LLM_TEMPERATURE"), "LLM_TEMPERATURE", 0.7)?,
            http_timeout: Duration::from_secs(parse_or(
                var("HTTP_TIMEOUT_SECS"),
                "HTTP_TIMEOUT_SECS",
                60,
            )?),
            identity_url: required("IDENTITY_URL")?,
            identity_api_key: var("IDENTITY_API_KEY"),
            pacing: PacingConfig {
                delays,
                default_delay,
            },
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::ConfigError(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}
