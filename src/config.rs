use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: String,
    pub order_queue_size: usize,
    pub event_buffer_size: usize,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub agent_staleness: Duration,
    pub match_batch_size: usize,
    pub offer_timeout: Duration,
    // from entry into `matching`
    pub matching_timeout: Duration,
    pub requery_interval: Duration,
    pub search_radius_m: f64,
    pub arrival_radius_m: f64,
    pub allow_final_below_estimate: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            agent_staleness: Duration::from_secs(30),
            match_batch_size: 5,
            offer_timeout: Duration::from_secs(15),
            matching_timeout: Duration::from_secs(60),
            requery_interval: Duration::from_millis(1_000),
            search_radius_m: 5_000.0,
            arrival_radius_m: 100.0,
            allow_final_below_estimate: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            agent_staleness: Duration::from_secs(parse_or_default(
                "AGENT_STALENESS_SECS",
                defaults.agent_staleness.as_secs(),
            )?),
            match_batch_size: parse_or_default("MATCH_BATCH_SIZE", defaults.match_batch_size)?
                .max(1),
            offer_timeout: Duration::from_secs(parse_or_default(
                "OFFER_TIMEOUT_SECS",
                defaults.offer_timeout.as_secs(),
            )?),
            matching_timeout: Duration::from_secs(parse_or_default(
                "MATCHING_TIMEOUT_SECS",
                defaults.matching_timeout.as_secs(),
            )?),
            requery_interval: Duration::from_millis(parse_or_default(
                "REQUERY_INTERVAL_MS",
                defaults.requery_interval.as_millis() as u64,
            )?),
            search_radius_m: parse_or_default("SEARCH_RADIUS_M", defaults.search_radius_m)?,
            arrival_radius_m: parse_or_default("ARRIVAL_RADIUS_M", defaults.arrival_radius_m)?,
            allow_final_below_estimate: parse_or_default(
                "ALLOW_FINAL_BELOW_ESTIMATE",
                defaults.allow_final_below_estimate,
            )?,
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
            order_queue_size: parse_or_default("ORDER_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            engine,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
