//! Server-wide configuration.
//!
//! Mirrors the builder/validate split used throughout the codebase's
//! ancestor: a plain data struct (`TusdConfig`) with a `Default` impl for
//! sane out-of-the-box values, and a `ConfigBuilder` that accumulates
//! overrides and validates them once at `build()` time rather than on every
//! setter call.

use std::time::Duration;

use crate::error::ConfigError;

/// Default lock lease TTL (§4.2 "Liveness").
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(8);

/// Default post-receive hook byte cadence (§9, resolved Open Question).
pub const DEFAULT_POST_RECEIVE_BYTES: u64 = 4 * 1024 * 1024;

/// Default post-receive hook time cadence.
pub const DEFAULT_POST_RECEIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Default per-request lock acquisition deadline.
pub const DEFAULT_LOCK_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Top-level, immutable server configuration.
#[derive(Debug, Clone)]
pub struct TusdConfig {
    /// Base path uploads are served under, e.g. `/files/`. Used only to
    /// build absolute `Location` headers; routing itself is out of scope.
    pub base_path: String,

    /// Maximum total upload size accepted across all uploads, in bytes.
    /// `None` means unlimited.
    pub max_size: Option<u64>,

    /// Lock lease TTL; the keep-alive task extends the lease at
    /// `lease_ttl / 2` intervals while the holder is alive.
    pub lease_ttl: Duration,

    /// Deadline for a single lock acquisition attempt before the caller
    /// gives up with `ErrLockTimeout`.
    pub lock_acquire_timeout: Duration,

    /// post-receive hook fires after this many bytes have been committed
    /// since the last firing, or `post_receive_interval`, whichever is
    /// sooner. Never fired once `Offset == Size`.
    pub post_receive_bytes: u64,
    pub post_receive_interval: Duration,
}

impl Default for TusdConfig {
    fn default() -> Self {
        Self {
            base_path: "/files/".to_string(),
            max_size: None,
            lease_ttl: DEFAULT_LEASE_TTL,
            lock_acquire_timeout: DEFAULT_LOCK_ACQUIRE_TIMEOUT,
            post_receive_bytes: DEFAULT_POST_RECEIVE_BYTES,
            post_receive_interval: DEFAULT_POST_RECEIVE_INTERVAL,
        }
    }
}

impl TusdConfig {
    /// The lease keep-alive task's tick interval, derived from `lease_ttl`
    /// per §4.2 ("extends the lease at TTL/2 intervals").
    pub fn lease_extend_interval(&self) -> Duration {
        self.lease_ttl / 2
    }
}

/// Builder with validation, following the reference crate's
/// `ConfigBuilder` split between accumulation and a single `build()`
/// validation pass.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: TusdConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: TusdConfig::default(),
        }
    }

    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.config.base_path = base_path.into();
        self
    }

    pub fn max_size(mut self, max_size: u64) -> Self {
        self.config.max_size = Some(max_size);
        self
    }

    pub fn lease_ttl(mut self, ttl: Duration) -> Self {
        self.config.lease_ttl = ttl;
        self
    }

    pub fn lock_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.lock_acquire_timeout = timeout;
        self
    }

    pub fn post_receive_bytes(mut self, bytes: u64) -> Self {
        self.config.post_receive_bytes = bytes;
        self
    }

    pub fn post_receive_interval(mut self, interval: Duration) -> Self {
        self.config.post_receive_interval = interval;
        self
    }

    pub fn build(self) -> Result<TusdConfig, ConfigError> {
        self.validate()?;
        Ok(self.config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.config.base_path.is_empty() {
            return Err(ConfigError::Invalid {
                field: "base_path".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if self.config.lease_ttl.is_zero() {
            return Err(ConfigError::Invalid {
                field: "lease_ttl".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if let Some(max) = self.config.max_size {
            if max == 0 {
                return Err(ConfigError::Invalid {
                    field: "max_size".to_string(),
                    message: "zero would reject every upload; omit instead".to_string(),
                });
            }
        }

        if self.config.post_receive_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "post_receive_bytes".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = ConfigBuilder::new().build().unwrap();
        assert_eq!(cfg.base_path, "/files/");
        assert_eq!(cfg.lease_extend_interval(), DEFAULT_LEASE_TTL / 2);
    }

    #[test]
    fn rejects_empty_base_path() {
        let err = ConfigBuilder::new().base_path("").build().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn rejects_zero_max_size() {
        let err = ConfigBuilder::new().max_size(0).build().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
