use serde::{Deserialize, Serialize};

use crate::error::{CollectorError, Result};
use crate::segment::MAX_CAPACITY;

/// Capacity of the head segment when none is configured.
pub const DEFAULT_INITIAL_CAPACITY: usize = 16;

/// Configuration for a [`Collector`](crate::Collector).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Capacity of the first segment. Later segments double in size up to
    /// [`MAX_CAPACITY`].
    pub initial_capacity: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
        }
    }
}

impl CollectorConfig {
    /// Set the capacity of the head segment.
    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    /// Check that the configured capacity is usable.
    pub fn validate(&self) -> Result<()> {
        if self.initial_capacity == 0 || self.initial_capacity > MAX_CAPACITY {
            return Err(CollectorError::InvalidCapacity {
                requested: self.initial_capacity,
                max: MAX_CAPACITY,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_sixteen() {
        let cfg = CollectorConfig::default();
        assert_eq!(cfg.initial_capacity, 16);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_capacity_rejected() {
        let err = CollectorConfig::default()
            .with_initial_capacity(0)
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            CollectorError::InvalidCapacity {
                requested: 0,
                max: MAX_CAPACITY
            }
        );
    }

    #[test]
    fn oversized_capacity_rejected() {
        let cfg = CollectorConfig::default().with_initial_capacity(MAX_CAPACITY + 1);
        assert!(cfg.validate().is_err());
        let cfg = CollectorConfig::default().with_initial_capacity(MAX_CAPACITY);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: CollectorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, CollectorConfig::default());

        let cfg: CollectorConfig = serde_json::from_str(r#"{"initial_capacity": 4}"#).unwrap();
        assert_eq!(cfg.initial_capacity, 4);
    }
}
