//! Lease timing configuration shared by the coordinator and the session.

use std::time::Duration;

use crate::error::CoreError;

/// Default lease duration in seconds (30 minutes).
pub const DEFAULT_LEASE_SECS: u64 = 1800;

/// Default warning lead time in seconds (5 minutes before expiry).
pub const DEFAULT_WARNING_LEAD_SECS: u64 = 300;

/// Minimum lease duration in seconds (1 minute).
pub const MIN_LEASE_SECS: u64 = 60;

/// Maximum lease duration in seconds (4 hours).
pub const MAX_LEASE_SECS: u64 = 14_400;

/// How long a lock lives and how early the holder is warned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    pub lease_duration: Duration,
    pub warning_lead_time: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(DEFAULT_LEASE_SECS),
            warning_lead_time: Duration::from_secs(DEFAULT_WARNING_LEAD_SECS),
        }
    }
}

impl LockSettings {
    /// Build validated settings.
    pub fn new(lease_duration: Duration, warning_lead_time: Duration) -> Result<Self, CoreError> {
        let settings = Self {
            lease_duration,
            warning_lead_time,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from environment variables with defaults.
    ///
    /// | Env Var                  | Default |
    /// |--------------------------|---------|
    /// | `LOCK_LEASE_SECS`        | `1800`  |
    /// | `LOCK_WARNING_LEAD_SECS` | `300`   |
    pub fn from_env() -> Result<Self, CoreError> {
        let lease = env_secs("LOCK_LEASE_SECS", DEFAULT_LEASE_SECS)?;
        let lead = env_secs("LOCK_WARNING_LEAD_SECS", DEFAULT_WARNING_LEAD_SECS)?;
        Self::new(Duration::from_secs(lease), Duration::from_secs(lead))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let lease = self.lease_duration.as_secs();
        if lease < MIN_LEASE_SECS {
            return Err(CoreError::Validation(format!(
                "Lease duration must be at least {MIN_LEASE_SECS} seconds, got {lease}"
            )));
        }
        if lease > MAX_LEASE_SECS {
            return Err(CoreError::Validation(format!(
                "Lease duration must be at most {MAX_LEASE_SECS} seconds, got {lease}"
            )));
        }
        if self.warning_lead_time.is_zero() || self.warning_lead_time >= self.lease_duration {
            return Err(CoreError::Validation(format!(
                "Warning lead time must be between 1 second and the lease duration, got {}s",
                self.warning_lead_time.as_secs()
            )));
        }
        Ok(())
    }

    /// Delay from lock confirmation to the expiry warning.
    pub fn warning_delay(&self) -> Duration {
        self.lease_duration.saturating_sub(self.warning_lead_time)
    }

    /// Delay from lock confirmation to client-side expiry.
    pub fn expiry_delay(&self) -> Duration {
        self.lease_duration
    }

    /// Lease as a chrono duration for timestamp arithmetic.
    pub fn lease(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.lease_duration)
            .unwrap_or_else(|_| chrono::Duration::seconds(MAX_LEASE_SECS as i64))
    }

    /// Whole minutes shown in the expiry warning, never less than one.
    pub fn warning_minutes(&self) -> u64 {
        let secs = self.warning_lead_time.as_secs();
        ((secs + 30) / 60).max(1)
    }
}

fn env_secs(key: &str, default: u64) -> Result<u64, CoreError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Validation(format!("{key} must be a whole number of seconds"))),
        Err(_) => Ok(default),
    }
}
