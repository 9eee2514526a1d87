//! Bridge configuration.

use std::time::Duration;

use json_bridge_diff::{DiffOptions, DEFAULT_MAX_DEPTH};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Upper bound accepted for [`BridgeConfig::debounce_ms`].
pub const MAX_DEBOUNCE_MS: u64 = 60_000;

/// Options for a [`Bridge`](crate::Bridge).
///
/// Every field has a default, so partial documents deserialize:
///
/// ```
/// use json_bridge::BridgeConfig;
///
/// let config: BridgeConfig = serde_json::from_str(r#"{"debounce_ms": 50}"#).unwrap();
/// assert_eq!(config.debounce_ms, 50);
/// assert_eq!(config, BridgeConfig { debounce_ms: 50, ..BridgeConfig::default() });
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Quiet period before a partition's pending value is diffed and delivered.
    pub debounce_ms: u64,
    /// Depth past which the diff engine compares subtrees as opaque values.
    pub max_diff_depth: usize,
    /// Deliver a full snapshot instead of a patch when the patch has more
    /// than `ratio * node_count(value)` operations.
    pub snapshot_ratio: Option<f64>,
    /// Re-apply every computed patch to the baseline before delivering it.
    pub verify_deliveries: bool,
    /// Reject partition values whose JSON encoding exceeds this many bytes.
    pub max_partition_bytes: Option<usize>,
    /// Bound on scheduler cycles run back-to-back at one instant.
    pub max_cycles_per_drain: usize,
    /// Initial value of the diagnostics flag.
    pub diagnostics: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 16,
            max_diff_depth: DEFAULT_MAX_DEPTH,
            snapshot_ratio: None,
            verify_deliveries: false,
            max_partition_bytes: None,
            max_cycles_per_drain: 1024,
            diagnostics: false,
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_diff_depth == 0 {
            return Err(ConfigError::ZeroDiffDepth);
        }
        if self.max_cycles_per_drain == 0 {
            return Err(ConfigError::ZeroCycleLimit);
        }
        if let Some(ratio) = self.snapshot_ratio {
            if !ratio.is_finite() || ratio <= 0.0 {
                return Err(ConfigError::InvalidSnapshotRatio(ratio));
            }
        }
        if self.max_partition_bytes == Some(0) {
            return Err(ConfigError::ZeroPartitionLimit);
        }
        if self.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::DebounceTooLong(self.debounce_ms));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub(crate) fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            max_depth: self.max_diff_depth,
        }
    }
}
