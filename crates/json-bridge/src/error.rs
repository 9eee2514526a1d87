use json_bridge_diff::ApplyError;
use thiserror::Error;

use crate::bridge::BridgeState;

/// Errors returned by the [`Bridge`](crate::Bridge) façade.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge is not ready (state: {0:?})")]
    NotReady(BridgeState),
    #[error("bridge initialization failed: {0}")]
    InitFailed(String),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("state for partition {partition:?} is not representable as JSON: {source}")]
    Serialize {
        partition: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Rejected [`BridgeConfig`](crate::BridgeConfig) values.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("max_diff_depth must be at least 1")]
    ZeroDiffDepth,
    #[error("max_cycles_per_drain must be at least 1")]
    ZeroCycleLimit,
    #[error("snapshot_ratio must be a positive finite number, got {0}")]
    InvalidSnapshotRatio(f64),
    #[error("max_partition_bytes must be positive when set")]
    ZeroPartitionLimit,
    #[error("debounce_ms {0} exceeds the {max} ms ceiling", max = crate::config::MAX_DEBOUNCE_MS)]
    DebounceTooLong(u64),
}

/// A partition update that could not be delivered.
///
/// Reported to the partition's subscribers as
/// [`StateDelivery::Error`](crate::StateDelivery::Error); the partition's
/// baseline is left untouched.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    #[error("partition {partition:?} value is {bytes} bytes, limit is {limit}")]
    TooLarge {
        partition: String,
        bytes: usize,
        limit: usize,
    },
    #[error("patch for partition {partition:?} does not apply: {source}")]
    Apply {
        partition: String,
        #[source]
        source: ApplyError,
    },
    #[error("patch for partition {partition:?} does not reproduce the new value")]
    Verification { partition: String },
}
