//! json-bridge - in-process state synchronization between two UI surfaces
//!
//! A [`Bridge`] keeps a collaborator's view of named state partitions and
//! events consistent without sharing object graphs:
//!
//! - [`sync`]: debounced, diff-based delivery of partition values
//! - [`channel`]: batched, strictly ordered event delivery
//! - [`lifecycle`]: owner-scoped cleanups that run exactly once
//! - [`scheduler`]: the logical-time task queue everything is driven by
//!
//! Everything is single-threaded (`Rc`/`RefCell`); the host pumps the
//! [`Scheduler`] from its own event loop.

pub mod bridge;
pub mod channel;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod scheduler;
pub mod subscription;
pub mod sync;

mod callback;

pub use bridge::{Bridge, BridgeState, Diagnostics, Flushed};
pub use callback::DeliveryDepth;
pub use channel::{EventChannel, ListenerStats};
pub use config::BridgeConfig;
pub use error::{BridgeError, ConfigError, SyncError};
pub use lifecycle::{
    create_disposable, memoize_last, safe_listener, CleanupId, ComponentGuard, Disposable, LifecycleRegistry,
    MemoizeLast, OwnerId, RegistryStats, WeakRegistry,
};
pub use scheduler::{Scheduler, TimerId};
pub use subscription::{EventHandler, ListenerId, ListenerTarget, Subscription};
pub use sync::{StateCallback, StateDelivery, StateSynchronizer, SyncOptions, SyncStats};

// Re-exported so collaborators can consume patches without a direct
// dependency on the diff crate.
pub use json_bridge_diff::{apply, diff, format_path, DiffOperation, Path, PathStep};
