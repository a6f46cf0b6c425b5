//! Runtime configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables (`from_env`)
//! 3. Library defaults (`defaults` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use evtls_runtime::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env()
//!     .num_workers(8)
//!     .park_timeout(Duration::from_millis(20));
//! config.validate()?;
//! ```

pub mod defaults;

use std::time::Duration;

use evtls_core::env::{env_get, env_get_bool, env_get_millis, env_get_str};
use evtls_core::ConfigError;

/// Runtime configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of worker threads
    pub num_workers: usize,
    /// How long an idle loop parks between exit-flag checks
    pub park_timeout: Duration,
    /// Worker thread name prefix
    pub thread_name_prefix: String,
    /// Raise log level to debug when the runtime is built
    pub debug_logging: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Create config from library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `EVTLS_NUM_WORKERS` - Number of worker threads
    /// - `EVTLS_PARK_TIMEOUT_MS` - Idle park timeout in milliseconds
    /// - `EVTLS_THREAD_NAME_PREFIX` - Worker thread name prefix
    /// - `EVTLS_DEBUG` - Enable debug logging (0/1)
    pub fn from_env() -> Self {
        Self {
            num_workers: env_get("EVTLS_NUM_WORKERS", defaults::NUM_WORKERS),
            park_timeout: env_get_millis("EVTLS_PARK_TIMEOUT_MS", defaults::PARK_TIMEOUT_MS),
            thread_name_prefix: env_get_str(
                "EVTLS_THREAD_NAME_PREFIX",
                defaults::THREAD_NAME_PREFIX,
            ),
            debug_logging: env_get_bool("EVTLS_DEBUG", defaults::DEBUG_LOGGING),
        }
    }

    /// Create config with library defaults only (no env override).
    pub fn new() -> Self {
        Self {
            num_workers: defaults::NUM_WORKERS,
            park_timeout: Duration::from_millis(defaults::PARK_TIMEOUT_MS),
            thread_name_prefix: defaults::THREAD_NAME_PREFIX.to_string(),
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    // Builder methods

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = d;
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    /// Name of worker `i`
    pub fn worker_name(&self, i: usize) -> String {
        format!("{}-{}", self.thread_name_prefix, i)
    }

    /// Validate configuration.
    ///
    /// Zero workers is valid: the main thread alone owns every slot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers > defaults::MAX_WORKERS {
            return Err(ConfigError::InvalidValue("num_workers must be <= 256"));
        }
        if self.park_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("park_timeout must be > 0"));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(ConfigError::InvalidValue("thread_name_prefix must not be empty"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("evtls Configuration:");
        eprintln!("  num_workers:         {}", self.num_workers);
        eprintln!("  park_timeout:        {:?}", self.park_timeout);
        eprintln!("  thread_name_prefix:  {}", self.thread_name_prefix);
        eprintln!("  debug_logging:       {}", self.debug_logging);
    }
}
