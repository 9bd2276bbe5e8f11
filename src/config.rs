//! Startup configuration, read once from the environment.
//!
//! There is no config-file format and no CLI surface here: this crate
//! backs a long-running worker process, not a tool invoked interactively,
//! so environment variables are the only configuration source.

use std::time::Duration;

use crate::error::{QueueError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub queue_backend_url: String,
    pub max_retries: u32,
    pub lease_ttl: Duration,
    pub dispatcher_scan_interval: Duration,
    pub min_typing_speed: f64,
    pub max_typing_speed: f64,
    pub random_offset_min: f64,
    pub random_offset_max: f64,
    pub max_delay: Duration,
    pub typing_interval: Duration,
    pub typing_pulse_threshold: Duration,
    pub transport_timeout: Duration,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

fn env_var(name: &str) -> Result<Option<String>> {
    match std::env::var(name) {
        Ok(v) => Ok(Some(v)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => {
            Err(QueueError::Config(format!("{name} is not valid unicode")))
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env_var(name)? {
        Some(raw) => raw
            .parse()
            .map_err(|e| QueueError::Config(format!("{name}={raw:?}: {e}"))),
        None => Ok(default),
    }
}

fn parse_secs_env(name: &str, default_secs: f64) -> Result<Duration> {
    let secs: f64 = parse_env(name, default_secs)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(QueueError::Config(format!(
            "{name} must be a non-negative number of seconds, got {secs}"
        )));
    }
    Ok(Duration::from_secs_f64(secs))
}

impl Config {
    /// Loads configuration from the process environment, applying the
    /// defaults from the persistent state / configuration surface table.
    pub fn from_env() -> Result<Self> {
        let queue_backend_url = env_var("QUEUE_BACKEND_URL")?
            .ok_or_else(|| QueueError::Config("QUEUE_BACKEND_URL is required".into()))?;

        let cfg = Self {
            queue_backend_url,
            max_retries: parse_env("MAX_RETRIES", 3)?,
            lease_ttl: parse_secs_env("LEASE_TTL_SECONDS", 30.0)?,
            dispatcher_scan_interval: parse_secs_env("DISPATCHER_SCAN_INTERVAL", 0.1)?,
            min_typing_speed: parse_env("MIN_TYPING_SPEED", 10.0)?,
            max_typing_speed: parse_env("MAX_TYPING_SPEED", 30.0)?,
            random_offset_min: parse_env("RANDOM_OFFSET_MIN", 0.1)?,
            random_offset_max: parse_env("RANDOM_OFFSET_MAX", 0.5)?,
            max_delay: parse_secs_env("MAX_DELAY", 5.0)?,
            typing_interval: parse_secs_env("TYPING_INTERVAL", 3.0)?,
            typing_pulse_threshold: parse_secs_env("TYPING_PULSE_THRESHOLD", 0.7)?,
            transport_timeout: parse_secs_env("TRANSPORT_TIMEOUT", 10.0)?,
            base_backoff: parse_secs_env("BASE_BACKOFF_SECONDS", 1.0)?,
            max_backoff: parse_secs_env("MAX_BACKOFF_SECONDS", 30.0)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.min_typing_speed <= 0.0 || self.max_typing_speed <= 0.0 {
            return Err(QueueError::Config(
                "typing speeds must be positive".into(),
            ));
        }
        if self.min_typing_speed > self.max_typing_speed {
            return Err(QueueError::Config(
                "MIN_TYPING_SPEED must not exceed MAX_TYPING_SPEED".into(),
            ));
        }
        if self.random_offset_min > self.random_offset_max {
            return Err(QueueError::Config(
                "RANDOM_OFFSET_MIN must not exceed RANDOM_OFFSET_MAX".into(),
            ));
        }
        let worst_case = self.max_delay + self.transport_timeout + self.base_backoff;
        if self.lease_ttl < 2 * worst_case {
            tracing::warn!(
                lease_ttl_secs = self.lease_ttl.as_secs_f64(),
                worst_case_secs = worst_case.as_secs_f64(),
                "LEASE_TTL_SECONDS is below 2x the worst-case delivery time; \
                 the dispatcher relies on renewal to avoid losing the lease mid-delivery",
            );
        }
        Ok(())
    }
}
