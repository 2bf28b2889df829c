use std::time::Duration;

use clap::Parser;

pub const MAX_LINK_CHECK_CONCURRENCY: usize = 100;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("PORT must be between 1 and 65535")]
    InvalidPort,
    #[error("LINK_CHECK_CONCURRENCY must be between 1 and {MAX_LINK_CHECK_CONCURRENCY}, got {0}")]
    InvalidConcurrency(usize),
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Server settings. Every flag can also come from the environment or a `.env` file.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "page-insight",
    version,
    about = "Analyzes a web page's structure and checks its outbound links"
)]
pub struct Config {
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// One of TRACE, DEBUG, INFO, WARN, ERROR. Anything else means ERROR.
    #[arg(long, env = "LOG_LEVEL", default_value = "ERROR")]
    pub log_level: String,

    #[arg(long, env = "LINK_CHECK_CONCURRENCY", default_value_t = 25)]
    pub link_check_concurrency: usize,

    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECONDS", default_value_t = 10)]
    pub shutdown_timeout_seconds: u64,

    #[arg(long, env = "PAGE_FETCH_TIMEOUT_SECONDS", default_value_t = 10)]
    pub page_fetch_timeout_seconds: u64,

    #[arg(long, env = "PROBE_TIMEOUT_SECONDS", default_value_t = 4)]
    pub probe_timeout_seconds: u64,

    #[arg(long, env = "ANALYZE_TIMEOUT_SECONDS", default_value_t = 60)]
    pub analyze_timeout_seconds: u64,
}

impl Config {
    /// Loads `.env` if present, then parses flags and environment.
    pub fn load() -> Config {
        dotenvy::dotenv().ok();
        Config::parse()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if !(1..=MAX_LINK_CHECK_CONCURRENCY).contains(&self.link_check_concurrency) {
            return Err(ConfigError::InvalidConcurrency(self.link_check_concurrency));
        }
        for (name, value) in [
            ("SHUTDOWN_TIMEOUT_SECONDS", self.shutdown_timeout_seconds),
            ("PAGE_FETCH_TIMEOUT_SECONDS", self.page_fetch_timeout_seconds),
            ("PROBE_TIMEOUT_SECONDS", self.probe_timeout_seconds),
            ("ANALYZE_TIMEOUT_SECONDS", self.analyze_timeout_seconds),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroTimeout(name));
            }
        }
        Ok(())
    }

    pub fn log_level(&self) -> tracing::Level {
        self.log_level.trim().parse().unwrap_or(tracing::Level::ERROR)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    pub fn page_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.page_fetch_timeout_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn analyze_timeout(&self) -> Duration {
        Duration::from_secs(self.analyze_timeout_seconds)
    }
}
