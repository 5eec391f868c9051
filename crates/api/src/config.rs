use editlock_core::error::CoreError;
use editlock_core::settings::LockSettings;

use crate::auth::jwt::JwtConfig;

/// Everything the server reads from its environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Browser origins allowed to call the lock endpoints.
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
    /// Period of the expired-lock purge.
    pub lock_sweep_interval_secs: u64,
    pub lock: LockSettings,
    pub jwt: JwtConfig,
}

impl ServerConfig {
    /// | Env Var                    | Default                 |
    /// |----------------------------|-------------------------|
    /// | `HOST`                     | `0.0.0.0`               |
    /// | `PORT`                     | `3000`                  |
    /// | `CORS_ORIGINS`             | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                    |
    /// | `LOCK_SWEEP_INTERVAL_SECS` | `60`                    |
    ///
    /// plus [`LockSettings::from_env`] and [`JwtConfig::from_env`].
    pub fn from_env() -> Result<Self, CoreError> {
        let lock_sweep_interval_secs: u64 = parse_env("LOCK_SWEEP_INTERVAL_SECS", 60)?;
        if lock_sweep_interval_secs == 0 {
            return Err(CoreError::Validation(
                "LOCK_SWEEP_INTERVAL_SECS must be greater than 0".into(),
            ));
        }

        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_env("PORT", 3000)?,
            cors_origins: csv_env("CORS_ORIGINS", "http://localhost:5173"),
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", 30)?,
            lock_sweep_interval_secs,
            lock: LockSettings::from_env()?,
            jwt: JwtConfig::from_env()?,
        })
    }
}

/// Parse an optional variable, falling back to `default` when unset.
pub(crate) fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, CoreError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Validation(format!("{key} has an invalid value: '{raw}'"))),
        Err(_) => Ok(default),
    }
}

fn csv_env(key: &str, default: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
