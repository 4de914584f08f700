use std::net::SocketAddr;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// How the quota tracker derives calls consumed this month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaMode {
    /// `tracked accounts × calls per refresh × day of month`.
    Estimate,
    /// Count of real calls recorded in the usage ledger this month.
    Ledger,
}

impl std::fmt::Display for QuotaMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaMode::Estimate => write!(f, "estimate"),
            QuotaMode::Ledger => write!(f, "ledger"),
        }
    }
}

/// Budget and pacing knobs for the collection scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorSettings {
    pub monthly_call_limit: u32,
    pub daily_safety_cap: u32,
    pub calls_per_account_refresh: u32,
    pub posts_per_fetch: u32,
    pub inter_account_delay_ms: u64,
    pub quota_mode: QuotaMode,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            monthly_call_limit: 1000,
            daily_safety_cap: 30,
            calls_per_account_refresh: 2,
            posts_per_fetch: 20,
            inter_account_delay_ms: 1000,
            quota_mode: QuotaMode::Estimate,
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub social_api_key: Option<String>,
    pub social_api_host: String,
    pub social_api_base_url: String,
    pub social_request_timeout_secs: u64,
    pub collector: CollectorSettings,
    pub collect_cron: String,
    pub api_rate_limit_per_min: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "social_api_key",
                &self.social_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("social_api_host", &self.social_api_host)
            .field("social_api_base_url", &self.social_api_base_url)
            .field(
                "social_request_timeout_secs",
                &self.social_request_timeout_secs,
            )
            .field("collector", &self.collector)
            .field("collect_cron", &self.collect_cron)
            .field("api_rate_limit_per_min", &self.api_rate_limit_per_min)
            .finish()
    }
}
