use crate::app_config::{AppConfig, CollectorSettings, Environment, QuotaMode};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;

    let env = parse_environment(&or_default("CPDB_ENV", "development"));
    let bind_addr = parse_addr("CPDB_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("CPDB_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("CPDB_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("CPDB_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("CPDB_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let social_api_key = lookup("SOCIAL_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty());
    let social_api_host = or_default("SOCIAL_API_HOST", "twitter-api45.p.rapidapi.com");
    let social_api_base_url = or_default(
        "SOCIAL_API_BASE_URL",
        "https://twitter-api45.p.rapidapi.com",
    );
    let social_request_timeout_secs = parse_u64("SOCIAL_REQUEST_TIMEOUT_SECS", "30")?;

    let calls_per_account_refresh = parse_u32("CPDB_CALLS_PER_ACCOUNT_REFRESH", "2")?;
    if calls_per_account_refresh < 2 {
        return Err(invalid(
            "CPDB_CALLS_PER_ACCOUNT_REFRESH",
            "must be at least 2 (profile and posts calls)".to_string(),
        ));
    }

    let quota_mode_var = "CPDB_QUOTA_MODE";
    let quota_mode = parse_quota_mode(&or_default(quota_mode_var, "estimate"))
        .ok_or_else(|| invalid(quota_mode_var, "expected 'estimate' or 'ledger'".to_string()))?;

    let collector = CollectorSettings {
        monthly_call_limit: parse_u32("CPDB_MONTHLY_CALL_LIMIT", "1000")?,
        daily_safety_cap: parse_u32("CPDB_DAILY_SAFETY_CAP", "30")?,
        calls_per_account_refresh,
        posts_per_fetch: parse_u32("CPDB_POSTS_PER_FETCH", "20")?,
        inter_account_delay_ms: parse_u64("CPDB_INTER_ACCOUNT_DELAY_MS", "1000")?,
        quota_mode,
    };

    let collect_cron = or_default("CPDB_COLLECT_CRON", "0 0 3 * * *");
    let api_rate_limit_per_min = parse_usize("CPDB_API_RATE_LIMIT_PER_MIN", "120")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        social_api_key,
        social_api_host,
        social_api_base_url,
        social_request_timeout_secs,
        collector,
        collect_cron,
        api_rate_limit_per_min,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

fn parse_quota_mode(s: &str) -> Option<QuotaMode> {
    match s.trim().to_ascii_lowercase().as_str() {
        "estimate" => Some(QuotaMode::Estimate),
        "ledger" => Some(QuotaMode::Ledger),
        _ => None,
    }
}
