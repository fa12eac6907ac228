//! Validated construction-time configuration shared across pipeline stages.

use crate::error::{Error, Result};

/// Configuration for a bounded producer/consumer stage (shuffle reservoir, prefetch queue,
/// dynamic-batch window). Every stage that accepts a capacity validates it the same way.
#[derive(Debug, Clone, Copy)]
pub struct CapacityConfig {
    pub capacity: usize,
}

impl CapacityConfig {
    pub fn new(capacity: usize) -> Result<Self> {
        let cfg = Self { capacity };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidArgument(
                "capacity must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for a worker pool (`prefetch`, `ordered_prefetch`).
#[derive(Debug, Clone, Copy)]
pub struct WorkerPoolConfig {
    pub prefetch_size: usize,
    pub num_threads: usize,
}

impl WorkerPoolConfig {
    pub fn new(prefetch_size: usize, num_threads: usize) -> Result<Self> {
        let cfg = Self {
            prefetch_size,
            num_threads,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.prefetch_size < 1 {
            return Err(Error::InvalidArgument(format!(
                "prefetch_size {} must be >= 1",
                self.prefetch_size
            )));
        }
        if self.num_threads < 1 {
            return Err(Error::InvalidArgument(format!(
                "num_threads {} must be >= 1",
                self.num_threads
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_config_rejects_zero() {
        assert!(CapacityConfig::new(0).is_err());
        assert!(CapacityConfig::new(1).is_ok());
    }

    #[test]
    fn test_worker_pool_config_validates_both_fields() {
        assert!(WorkerPoolConfig::new(0, 4).is_err());
        assert!(WorkerPoolConfig::new(8, 0).is_err());
        assert!(WorkerPoolConfig::new(8, 4).is_ok());
    }
}
