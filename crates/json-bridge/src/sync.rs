//! Debounced, diff-based synchronization of named state partitions.
//!
//! Each partition keeps the last value it delivered (its *baseline*) and
//! the latest value it has not delivered yet (its *pending* value). The
//! first value a partition sees is delivered whole; later values are
//! debounced, diffed against the baseline, and delivered as patches.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, debug_span, warn};

use json_bridge_diff::{apply, diff_with, DiffOperation, DiffOptions};
use json_bridge_util::{deep_equal, json_size, node_count};

use crate::callback::{invoke_isolated, DeliveryDepth};
use crate::config::BridgeConfig;
use crate::error::SyncError;
use crate::scheduler::{Scheduler, TimerId};
use crate::subscription::Subscription;

// ── Public types ──────────────────────────────────────────────────────────

/// What a partition subscriber receives.
#[derive(Debug, Clone, PartialEq)]
pub enum StateDelivery {
    /// The whole value: on the first sync of a partition, or when a patch
    /// would be too large relative to the value.
    Snapshot(Value),
    /// Operations turning the previous delivery into the new value.
    Patch(Vec<DiffOperation>),
    /// The update was rejected; the previous delivery is still current.
    Error(SyncError),
}

impl StateDelivery {
    pub fn kind(&self) -> &'static str {
        match self {
            StateDelivery::Snapshot(_) => "snapshot",
            StateDelivery::Patch(_) => "patch",
            StateDelivery::Error(_) => "error",
        }
    }
}

pub type StateCallback = Rc<dyn Fn(&StateDelivery)>;

#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    pub debounce: Duration,
    pub diff: DiffOptions,
    /// See [`BridgeConfig::snapshot_ratio`].
    pub snapshot_ratio: Option<f64>,
    /// Re-apply every patch to the baseline before delivering it.
    pub verify: bool,
    pub max_partition_bytes: Option<usize>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for SyncOptions {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            debounce: config.debounce(),
            diff: config.diff_options(),
            snapshot_ratio: config.snapshot_ratio,
            verify: config.verify_deliveries,
            max_partition_bytes: config.max_partition_bytes,
        }
    }
}

/// Counters exposed through diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Partition processing passes, including ones that found no change.
    pub passes: u64,
    pub snapshots: u64,
    pub patches: u64,
    /// Passes whose value equalled the baseline; nothing was delivered.
    pub skipped: u64,
    pub errors: u64,
    pub callback_failures: u64,
}

// ── State ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Partition {
    baseline: Option<Value>,
    pending: Option<Value>,
    timer: Option<TimerId>,
}

struct StateSubscriber {
    id: u64,
    callback: StateCallback,
}

#[derive(Default)]
struct SyncState {
    partitions: IndexMap<String, Partition>,
    subscribers: IndexMap<String, Vec<StateSubscriber>>,
    next_id: u64,
    stats: SyncStats,
}

struct Shared {
    scheduler: Scheduler,
    options: SyncOptions,
    depth: DeliveryDepth,
    state: RefCell<SyncState>,
}

#[derive(Clone)]
pub struct StateSynchronizer {
    shared: Rc<Shared>,
}

impl fmt::Debug for StateSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("StateSynchronizer")
            .field("partitions", &state.partitions.len())
            .field("options", &self.shared.options)
            .field("stats", &state.stats)
            .finish()
    }
}

// ── Public API ────────────────────────────────────────────────────────────

impl StateSynchronizer {
    pub fn new(scheduler: Scheduler, options: SyncOptions) -> Self {
        Self::with_delivery_depth(scheduler, options, DeliveryDepth::new())
    }

    /// Like [`new`](Self::new), but calls made from inside any callback
    /// counted by `depth` are deferred, not only calls from this
    /// synchronizer's own subscribers.
    pub fn with_delivery_depth(scheduler: Scheduler, options: SyncOptions, depth: DeliveryDepth) -> Self {
        Self {
            shared: Rc::new(Shared {
                scheduler,
                options,
                depth,
                state: RefCell::new(SyncState::default()),
            }),
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.shared.options
    }

    /// Receive every delivery for partition `name`.
    pub fn subscribe(&self, name: impl Into<String>, callback: impl Fn(&StateDelivery) + 'static) -> Subscription {
        let name = name.into();
        let id = {
            let mut state = self.shared.state.borrow_mut();
            let id = state.next_id;
            state.next_id += 1;
            state
                .subscribers
                .entry(name.clone())
                .or_default()
                .push(StateSubscriber {
                    id,
                    callback: Rc::new(callback),
                });
            id
        };
        let weak = Rc::downgrade(&self.shared);
        Subscription::new(move || {
            if let Some(shared) = weak.upgrade() {
                StateSynchronizer { shared }.unsubscribe(&name, id);
            }
        })
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.shared
            .state
            .borrow()
            .subscribers
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Record `value` as the latest state of partition `name`.
    ///
    /// The first value of a partition, and any value sent with `immediate`,
    /// is processed before this returns. Other values wait for the
    /// partition's debounce timer; values sent before it fires replace each
    /// other, and only the last one is diffed.
    ///
    /// Calls made from inside a delivery callback are never processed
    /// inline: they are picked up on the next scheduler cycle.
    pub fn sync_state(&self, name: &str, value: Value, immediate: bool) {
        let process_now = {
            let reentrant = self.shared.depth.is_delivering();
            let mut state = self.shared.state.borrow_mut();
            let partition = state.partitions.entry(name.to_string()).or_default();
            let first = partition.baseline.is_none()
                && partition.pending.is_none()
                && partition.timer.is_none();
            partition.pending = Some(value);

            let urgent = first || immediate;
            if urgent && !reentrant {
                true
            } else {
                if urgent {
                    if let Some(timer) = partition.timer.take() {
                        self.shared.scheduler.cancel(timer);
                    }
                }
                if partition.timer.is_none() {
                    let delay = if urgent {
                        Duration::ZERO
                    } else {
                        self.shared.options.debounce
                    };
                    partition.timer = Some(self.arm(name, delay));
                    debug!(partition = name, delay_ms = delay.as_millis() as u64, "sync scheduled");
                }
                false
            }
        };
        if process_now {
            self.process_partition(name);
        }
    }

    /// Process every partition whose pending value is due: its timer has
    /// reached its deadline, or it has no timer. Returns how many partitions
    /// were processed.
    pub fn process_pending_updates(&self) -> usize {
        let now = self.shared.scheduler.now();
        let due: Vec<String> = self
            .shared
            .state
            .borrow()
            .partitions
            .iter()
            .filter(|(_, p)| p.pending.is_some() && p.timer.map_or(true, |t| t.deadline() <= now))
            .map(|(name, _)| name.clone())
            .collect();
        self.process_names(due)
    }

    /// Process every partition with a pending value now, regardless of
    /// timers. Returns how many partitions were processed.
    ///
    /// Called from inside a delivery callback, this instead moves every
    /// pending partition to the next scheduler cycle and returns 0.
    pub fn flush_pending_updates(&self) -> usize {
        let pending: Vec<String> = self
            .shared
            .state
            .borrow()
            .partitions
            .iter()
            .filter(|(_, p)| p.pending.is_some())
            .map(|(name, _)| name.clone())
            .collect();
        if self.shared.depth.is_delivering() {
            for name in &pending {
                self.rearm_now(name);
            }
            return 0;
        }
        let span = debug_span!("sync.flush", partitions = pending.len());
        let _guard = span.enter();
        self.process_names(pending)
    }

    /// Forget every baseline and pending value and cancel every timer.
    /// Subscribers stay registered.
    pub fn reset(&self) {
        let partitions = std::mem::take(&mut self.shared.state.borrow_mut().partitions);
        for partition in partitions.values() {
            if let Some(timer) = partition.timer {
                self.shared.scheduler.cancel(timer);
            }
        }
        debug!(partitions = partitions.len(), "synchronizer reset");
    }

    /// The last value delivered for `name`.
    pub fn baseline(&self, name: &str) -> Option<Value> {
        self.shared
            .state
            .borrow()
            .partitions
            .get(name)?
            .baseline
            .clone()
    }

    pub fn has_pending(&self, name: &str) -> bool {
        self.shared
            .state
            .borrow()
            .partitions
            .get(name)
            .is_some_and(|p| p.pending.is_some())
    }

    /// Number of partitions holding an undelivered value.
    pub fn pending_partitions(&self) -> usize {
        self.shared
            .state
            .borrow()
            .partitions
            .values()
            .filter(|p| p.pending.is_some())
            .count()
    }

    pub fn partition_names(&self) -> Vec<String> {
        self.shared.state.borrow().partitions.keys().cloned().collect()
    }

    pub fn stats(&self) -> SyncStats {
        self.shared.state.borrow().stats
    }
}

// ── Processing ────────────────────────────────────────────────────────────

impl StateSynchronizer {
    fn arm(&self, name: &str, delay: Duration) -> TimerId {
        let weak = Rc::downgrade(&self.shared);
        let name = name.to_string();
        self.shared.scheduler.schedule(delay, move || {
            if let Some(shared) = weak.upgrade() {
                StateSynchronizer { shared }.timer_fired(&name);
            }
        })
    }

    /// Replace the partition's timer with a zero-delay one.
    fn rearm_now(&self, name: &str) {
        let mut state = self.shared.state.borrow_mut();
        let Some(partition) = state.partitions.get_mut(name) else {
            return;
        };
        if let Some(timer) = partition.timer.take() {
            self.shared.scheduler.cancel(timer);
        }
        partition.timer = Some(self.arm(name, Duration::ZERO));
    }

    fn timer_fired(&self, name: &str) {
        if let Some(partition) = self.shared.state.borrow_mut().partitions.get_mut(name) {
            partition.timer = None;
        }
        self.process_partition(name);
    }

    fn process_names(&self, names: Vec<String>) -> usize {
        names
            .iter()
            .filter(|name| self.process_partition(name))
            .count()
    }

    /// Diff the partition's pending value against its baseline and deliver
    /// the result. Returns `false` if there was nothing to process.
    fn process_partition(&self, name: &str) -> bool {
        if self.shared.depth.is_delivering() {
            self.rearm_now(name);
            return false;
        }

        let delivery = {
            let mut guard = self.shared.state.borrow_mut();
            let state = &mut *guard;
            let Some(partition) = state.partitions.get_mut(name) else {
                return false;
            };
            if let Some(timer) = partition.timer.take() {
                self.shared.scheduler.cancel(timer);
            }
            let Some(pending) = partition.pending.take() else {
                return false;
            };

            state.stats.passes += 1;
            match compute_delivery(&self.shared.options, name, partition.baseline.as_ref(), &pending) {
                Ok(StateDelivery::Patch(ops)) if ops.is_empty() => {
                    state.stats.skipped += 1;
                    partition.baseline = Some(pending);
                    None
                }
                Ok(delivery) => {
                    match &delivery {
                        StateDelivery::Snapshot(_) => state.stats.snapshots += 1,
                        _ => state.stats.patches += 1,
                    }
                    partition.baseline = Some(pending);
                    Some(delivery)
                }
                Err(err) => {
                    warn!(partition = name, error = %err, "state update rejected");
                    state.stats.errors += 1;
                    Some(StateDelivery::Error(err))
                }
            }
        };

        match delivery {
            Some(delivery) => self.deliver(name, &delivery),
            None => debug!(partition = name, "no change"),
        }
        true
    }

    fn deliver(&self, name: &str, delivery: &StateDelivery) {
        let subscribers: Vec<(u64, StateCallback)> = self
            .shared
            .state
            .borrow()
            .subscribers
            .get(name)
            .map(|subs| subs.iter().map(|s| (s.id, Rc::clone(&s.callback))).collect())
            .unwrap_or_default();
        if let StateDelivery::Patch(ops) = delivery {
            debug!(partition = name, ops = ops.len(), subscribers = subscribers.len(), "delivering patch");
        } else {
            debug!(partition = name, kind = delivery.kind(), subscribers = subscribers.len(), "delivering");
        }

        let _depth = self.shared.depth.enter();
        for (id, callback) in subscribers {
            if !self.is_subscribed(name, id) {
                continue;
            }
            if !invoke_isolated("state", name, || callback(delivery)) {
                self.shared.state.borrow_mut().stats.callback_failures += 1;
            }
        }
    }

    fn is_subscribed(&self, name: &str, id: u64) -> bool {
        self.shared
            .state
            .borrow()
            .subscribers
            .get(name)
            .is_some_and(|subs| subs.iter().any(|s| s.id == id))
    }

    fn unsubscribe(&self, name: &str, id: u64) {
        let removed = {
            let mut state = self.shared.state.borrow_mut();
            let Some(subs) = state.subscribers.get_mut(name) else {
                return;
            };
            let Some(pos) = subs.iter().position(|s| s.id == id) else {
                return;
            };
            let removed = subs.remove(pos);
            if subs.is_empty() {
                state.subscribers.shift_remove(name);
            }
            removed
        };
        drop(removed);
    }
}

fn compute_delivery(
    options: &SyncOptions,
    name: &str,
    baseline: Option<&Value>,
    pending: &Value,
) -> Result<StateDelivery, SyncError> {
    if let Some(limit) = options.max_partition_bytes {
        let bytes = json_size(pending);
        if bytes > limit {
            return Err(SyncError::TooLarge {
                partition: name.to_string(),
                bytes,
                limit,
            });
        }
    }

    let Some(baseline) = baseline else {
        return Ok(StateDelivery::Snapshot(pending.clone()));
    };
    let ops = diff_with(baseline, pending, &options.diff);
    if ops.is_empty() {
        return Ok(StateDelivery::Patch(ops));
    }

    if options.verify {
        let rebuilt = apply(baseline, &ops).map_err(|source| SyncError::Apply {
            partition: name.to_string(),
            source,
        })?;
        if !deep_equal(&rebuilt, pending) {
            return Err(SyncError::Verification {
                partition: name.to_string(),
            });
        }
    }

    if let Some(ratio) = options.snapshot_ratio {
        if ops.len() as f64 > ratio * node_count(pending) as f64 {
            return Ok(StateDelivery::Snapshot(pending.clone()));
        }
    }
    Ok(StateDelivery::Patch(ops))
}

#[cfg(test)]
mod tests {
    use super::*;
    use json_bridge_diff::PathStep;
    use serde_json::json;

    fn setup(options: SyncOptions) -> (Scheduler, StateSynchronizer, Rc<RefCell<Vec<StateDelivery>>>) {
        let scheduler = Scheduler::new();
        let sync = StateSynchronizer::new(scheduler.clone(), options);
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        sync.subscribe("x", move |d: &StateDelivery| sink.borrow_mut().push(d.clone()));
        (scheduler, sync, log)
    }

    fn debounce() -> Duration {
        SyncOptions::default().debounce
    }

    #[test]
    fn first_sync_delivers_snapshot_synchronously() {
        let (scheduler, sync, log) = setup(SyncOptions::default());
        sync.sync_state("x", json!({"n": 1}), false);
        assert_eq!(*log.borrow(), vec![StateDelivery::Snapshot(json!({"n": 1}))]);
        assert_eq!(sync.baseline("x"), Some(json!({"n": 1})));
        assert_eq!(scheduler.pending_tasks(), 0);
    }

    #[test]
    fn debounced_updates_coalesce_into_one_pass() {
        let (scheduler, sync, log) = setup(SyncOptions::default());
        sync.sync_state("x", json!({"n": 0}), false);
        let before = sync.stats().passes;

        for n in 1..=3 {
            sync.sync_state("x", json!({"n": n}), false);
        }
        assert_eq!(log.borrow().len(), 1);
        assert!(sync.has_pending("x"));
        assert_eq!(scheduler.pending_tasks(), 1);

        scheduler.advance(debounce());
        assert_eq!(sync.stats().passes, before + 1);
        assert_eq!(
            log.borrow().last(),
            Some(&StateDelivery::Patch(vec![DiffOperation::Replace {
                path: vec![PathStep::from("n")],
                old_value: json!(0),
                value: json!(3),
            }]))
        );
        assert_eq!(sync.baseline("x"), Some(json!({"n": 3})));
        assert!(!sync.has_pending("x"));
    }

    #[test]
    fn debounce_window_starts_at_first_update() {
        let (scheduler, sync, log) = setup(SyncOptions::default());
        sync.sync_state("x", json!(0), false);
        sync.sync_state("x", json!(1), false);
        scheduler.advance(debounce() / 2);
        sync.sync_state("x", json!(2), false);
        scheduler.advance(debounce() / 2);
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(sync.baseline("x"), Some(json!(2)));
    }

    #[test]
    fn immediate_bypasses_timer() {
        let (scheduler, sync, log) = setup(SyncOptions::default());
        sync.sync_state("x", json!([1]), false);
        sync.sync_state("x", json!([1, 2]), false);
        assert_eq!(scheduler.pending_tasks(), 1);
        sync.sync_state("x", json!([1, 2, 3]), true);
        assert_eq!(scheduler.pending_tasks(), 0);
        assert_eq!(
            log.borrow().last(),
            Some(&StateDelivery::Patch(vec![DiffOperation::ArraySplice {
                path: vec![],
                index: 1,
                removed: vec![],
                added: vec![json!(2), json!(3)],
            }]))
        );
    }

    #[test]
    fn flush_processes_every_partition() {
        let (scheduler, sync, _log) = setup(SyncOptions::default());
        for name in ["a", "b", "c"] {
            sync.sync_state(name, json!(0), false);
            sync.sync_state(name, json!(1), false);
        }
        assert_eq!(sync.pending_partitions(), 3);
        assert_eq!(sync.flush_pending_updates(), 3);
        assert_eq!(sync.pending_partitions(), 0);
        assert_eq!(scheduler.pending_tasks(), 0);
        assert_eq!(sync.flush_pending_updates(), 0);
    }

    #[test]
    fn process_pending_skips_partitions_not_yet_due() {
        let (scheduler, sync, _log) = setup(SyncOptions::default());
        sync.sync_state("x", json!(0), false);
        sync.sync_state("x", json!(1), false);
        assert_eq!(sync.process_pending_updates(), 0);
        assert!(sync.has_pending("x"));
        scheduler.advance(debounce());
        assert_eq!(sync.process_pending_updates(), 0);
        assert_eq!(sync.baseline("x"), Some(json!(1)));
    }

    #[test]
    fn unchanged_value_is_not_delivered() {
        let (_scheduler, sync, log) = setup(SyncOptions::default());
        sync.sync_state("x", json!({"a": 1}), false);
        sync.sync_state("x", json!({"a": 1}), true);
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(sync.stats().skipped, 1);
        assert_eq!(sync.stats().passes, 2);
    }

    #[test]
    fn reset_forgets_baselines_and_cancels_timers() {
        let (scheduler, sync, log) = setup(SyncOptions::default());
        sync.sync_state("x", json!(1), false);
        sync.sync_state("x", json!(2), false);
        sync.reset();
        sync.reset();
        assert_eq!(scheduler.pending_tasks(), 0);
        assert_eq!(sync.baseline("x"), None);

        sync.sync_state("x", json!(3), false);
        assert_eq!(log.borrow().last(), Some(&StateDelivery::Snapshot(json!(3))));
        assert_eq!(sync.subscriber_count("x"), 1);
    }

    #[test]
    fn oversized_value_is_rejected_and_baseline_kept() {
        let options = SyncOptions {
            max_partition_bytes: Some(16),
            ..SyncOptions::default()
        };
        let (_scheduler, sync, log) = setup(options);
        sync.sync_state("x", json!("short"), false);
        sync.sync_state("x", json!("this string is far too long"), true);
        assert!(matches!(
            log.borrow().last(),
            Some(StateDelivery::Error(SyncError::TooLarge { limit: 16, .. }))
        ));
        assert_eq!(sync.baseline("x"), Some(json!("short")));
        assert_eq!(sync.stats().errors, 1);
    }

    #[test]
    fn large_patch_becomes_snapshot() {
        let options = SyncOptions {
            snapshot_ratio: Some(0.5),
            ..SyncOptions::default()
        };
        let (_scheduler, sync, log) = setup(options);
        sync.sync_state("x", json!({"a": 1, "b": 2, "c": 3}), false);
        sync.sync_state("x", json!({"a": 9, "b": 9, "c": 9}), true);
        assert_eq!(
            log.borrow().last(),
            Some(&StateDelivery::Snapshot(json!({"a": 9, "b": 9, "c": 9})))
        );

        sync.sync_state("x", json!({"a": 9, "b": 9, "c": 10}), true);
        assert_eq!(log.borrow().last().map(StateDelivery::kind), Some("patch"));
    }

    #[test]
    fn verified_patch_is_delivered() {
        let options = SyncOptions {
            verify: true,
            ..SyncOptions::default()
        };
        let (_scheduler, sync, log) = setup(options);
        sync.sync_state("x", json!({"list": [1, 2, 3]}), false);
        sync.sync_state("x", json!({"list": [1, 5, 2, 3]}), true);
        assert_eq!(log.borrow().last().map(StateDelivery::kind), Some("patch"));
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let (_scheduler, sync, log) = setup(SyncOptions::default());
        sync.subscribe("x", |_: &StateDelivery| panic!("subscriber failure"));
        let late = Rc::new(RefCell::new(0));
        let l = Rc::clone(&late);
        sync.subscribe("x", move |_: &StateDelivery| *l.borrow_mut() += 1);
        sync.sync_state("x", json!(1), false);
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(*late.borrow(), 1);
        assert_eq!(sync.stats().callback_failures, 1);
    }

    #[test]
    fn reentrant_sync_is_deferred_to_next_cycle() {
        let scheduler = Scheduler::new();
        let sync = StateSynchronizer::new(scheduler.clone(), SyncOptions::default());
        let mirror_log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&mirror_log);
        sync.subscribe("mirror", move |d: &StateDelivery| sink.borrow_mut().push(d.clone()));
        let relay = sync.clone();
        sync.subscribe("source", move |d: &StateDelivery| {
            if let StateDelivery::Snapshot(v) = d {
                relay.sync_state("mirror", v.clone(), true);
            }
        });

        sync.sync_state("source", json!(42), false);
        assert!(mirror_log.borrow().is_empty());
        assert!(sync.has_pending("mirror"));
        scheduler.run_cycle();
        assert_eq!(*mirror_log.borrow(), vec![StateDelivery::Snapshot(json!(42))]);
    }

    #[test]
    fn shared_depth_defers_first_sync() {
        let scheduler = Scheduler::new();
        let depth = DeliveryDepth::new();
        let sync = StateSynchronizer::with_delivery_depth(scheduler.clone(), SyncOptions::default(), depth.clone());
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        sync.subscribe("x", move |d: &StateDelivery| sink.borrow_mut().push(d.clone()));

        {
            let _outside = depth.enter();
            sync.sync_state("x", json!(1), false);
            assert_eq!(sync.flush_pending_updates(), 0);
        }
        assert!(log.borrow().is_empty());
        assert!(sync.has_pending("x"));
        scheduler.run_cycle();
        assert_eq!(*log.borrow(), vec![StateDelivery::Snapshot(json!(1))]);
    }

    #[test]
    fn unsubscribed_callback_stops_receiving() {
        let scheduler = Scheduler::new();
        let sync = StateSynchronizer::new(scheduler, SyncOptions::default());
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        let sub = sync.subscribe("x", move |_: &StateDelivery| *c.borrow_mut() += 1);
        sync.sync_state("x", json!(1), false);
        assert!(sub.unsubscribe());
        assert_eq!(sync.subscriber_count("x"), 0);
        sync.sync_state("x", json!(2), true);
        assert_eq!(*count.borrow(), 1);
    }
}
