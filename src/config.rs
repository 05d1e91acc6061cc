//! Pool configuration
//!
//! Timing knobs for the head poller and the idle reaper. Defaults match
//! the production cadence (30 s poll window, 90 s idle timeout, 30 s
//! sweep interval); tests shrink them via the struct literal.

use std::time::Duration;

/// Configuration for the session pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// How long the head poller waits for a real head before publishing
    /// a heartbeat placeholder (default: 30 s)
    pub poll_window: Duration,
    /// Inactivity duration after which an instance becomes eviction
    /// eligible (default: 90 s)
    pub idle_timeout: Duration,
    /// Cadence of the per-instance idle sweep (default: 30 s)
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            poll_window: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(90),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// Create config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("POOL_POLL_WINDOW_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.poll_window = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("POOL_IDLE_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.idle_timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("POOL_SWEEP_INTERVAL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.sweep_interval = Duration::from_secs(secs);
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.poll_window, Duration::from_secs(30));
        assert_eq!(config.idle_timeout, Duration::from_secs(90));
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("POOL_POLL_WINDOW_SECS", "5");
        std::env::set_var("POOL_IDLE_TIMEOUT_SECS", "12");
        std::env::set_var("POOL_SWEEP_INTERVAL_SECS", "soon");

        let config = PoolConfig::from_env();
        assert_eq!(config.poll_window, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(12));
        // Unparseable values keep the default
        assert_eq!(config.sweep_interval, Duration::from_secs(30));

        std::env::remove_var("POOL_POLL_WINDOW_SECS");
        std::env::remove_var("POOL_IDLE_TIMEOUT_SECS");
        std::env::remove_var("POOL_SWEEP_INTERVAL_SECS");
    }
}
