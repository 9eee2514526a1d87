//! The façade collaborators talk to.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::callback::DeliveryDepth;
use crate::channel::EventChannel;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::lifecycle::{CleanupId, ComponentGuard, LifecycleRegistry, OwnerId, RegistryStats};
use crate::scheduler::Scheduler;
use crate::subscription::Subscription;
use crate::sync::{StateDelivery, StateSynchronizer, SyncOptions, SyncStats};

/// Lifecycle of a [`Bridge`].
///
/// `Uninitialized → Initializing → Ready`. A failed initialization ends in
/// `Error`, which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    Uninitialized,
    Initializing,
    Ready,
    Error,
}

/// Point-in-time report returned by [`Bridge::diagnostics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub enabled: bool,
    pub state: BridgeState,
    pub listener_total: usize,
    pub listeners_by_event: IndexMap<String, usize>,
    pub pending_partitions: usize,
    pub pending_emissions: usize,
    pub tracked_owners: usize,
    pub scheduled_tasks: usize,
    pub sync: SyncStats,
    pub lifecycle: RegistryStats,
    pub handler_failures: u64,
    pub last_error: Option<String>,
}

/// Work done by one [`Bridge::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flushed {
    pub partitions: usize,
    pub emissions: usize,
}

struct BridgeShared {
    config: BridgeConfig,
    state: Cell<BridgeState>,
    diagnostics: Cell<bool>,
    last_error: RefCell<Option<String>>,
    scheduler: Scheduler,
    sync: StateSynchronizer,
    channel: EventChannel,
    registry: LifecycleRegistry,
}

/// Single entry point composing the scheduler, synchronizer, event channel
/// and lifecycle registry.
///
/// ```
/// use json_bridge::{Bridge, BridgeConfig, OwnerId, StateDelivery};
/// use serde_json::json;
/// use std::{cell::RefCell, rc::Rc};
///
/// let bridge = Bridge::new(BridgeConfig::default());
/// bridge.initialize().unwrap();
///
/// let owner = OwnerId::unique();
/// bridge.register_component(owner, "sidebar").unwrap();
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let sink = Rc::clone(&seen);
/// bridge
///     .subscribe_to_state("user", move |d: &StateDelivery| sink.borrow_mut().push(d.kind()), owner)
///     .unwrap();
///
/// bridge.update_state("user", &json!({"name": "Ada"})).unwrap();
/// bridge.update_state("user", &json!({"name": "Grace"})).unwrap();
/// bridge.run_until_idle();
/// assert_eq!(*seen.borrow(), vec!["snapshot", "patch"]);
///
/// assert_eq!(bridge.release_component(owner), 1);
/// ```
#[derive(Clone)]
pub struct Bridge {
    shared: Rc<BridgeShared>,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.shared.state.get())
            .field("config", &self.shared.config)
            .finish()
    }
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        let scheduler = Scheduler::with_cycle_limit(config.max_cycles_per_drain);
        // One depth for both, so a state callback that emits (or a handler
        // that updates state) is deferred like any other re-entrant call.
        let depth = DeliveryDepth::new();
        let sync =
            StateSynchronizer::with_delivery_depth(scheduler.clone(), SyncOptions::from(&config), depth.clone());
        let channel = EventChannel::with_delivery_depth(scheduler.clone(), depth);
        Self {
            shared: Rc::new(BridgeShared {
                diagnostics: Cell::new(config.diagnostics),
                config,
                state: Cell::new(BridgeState::Uninitialized),
                last_error: RefCell::new(None),
                scheduler,
                sync,
                channel,
                registry: LifecycleRegistry::new(),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Validate the configuration and move to `Ready`. Calling it again
    /// once `Ready` is a no-op; after a failure every call fails.
    pub fn initialize(&self) -> Result<(), BridgeError> {
        match self.shared.state.get() {
            BridgeState::Ready => return Ok(()),
            BridgeState::Error => {
                let reason = self
                    .shared
                    .last_error
                    .borrow()
                    .clone()
                    .unwrap_or_else(|| "unknown failure".to_string());
                return Err(BridgeError::InitFailed(reason));
            }
            BridgeState::Initializing => return Err(BridgeError::NotReady(BridgeState::Initializing)),
            BridgeState::Uninitialized => {}
        }

        self.set_state(BridgeState::Initializing);
        if let Err(err) = self.shared.config.validate() {
            warn!(error = %err, "bridge initialization failed");
            *self.shared.last_error.borrow_mut() = Some(err.to_string());
            self.set_state(BridgeState::Error);
            return Err(err.into());
        }
        self.set_state(BridgeState::Ready);
        Ok(())
    }

    pub fn state(&self) -> BridgeState {
        self.shared.state.get()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == BridgeState::Ready
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    fn set_state(&self, next: BridgeState) {
        let prev = self.shared.state.replace(next);
        info!(from = ?prev, to = ?next, "bridge state changed");
    }

    fn ensure_ready(&self) -> Result<(), BridgeError> {
        match self.shared.state.get() {
            BridgeState::Ready => Ok(()),
            other => Err(BridgeError::NotReady(other)),
        }
    }

    /// Clear every partition and every event listener; queued emissions and
    /// timers are dropped. Registered components stay tracked.
    pub fn reset(&self) -> Result<(), BridgeError> {
        self.ensure_ready()?;
        self.shared.sync.reset();
        self.shared.channel.reset();
        info!("bridge reset");
        Ok(())
    }

    // ── Components ───────────────────────────────────────────────────────

    /// Returns `false` if `owner` was already registered.
    pub fn register_component(&self, owner: OwnerId, label: impl Into<String>) -> Result<bool, BridgeError> {
        self.ensure_ready()?;
        Ok(self.shared.registry.register(owner, label))
    }

    /// Register a fresh owner released when the guard drops.
    pub fn component(&self, label: impl Into<String>) -> Result<ComponentGuard, BridgeError> {
        self.ensure_ready()?;
        Ok(self.shared.registry.scope(label))
    }

    /// Run every cleanup `owner` accumulated. Works in any state.
    pub fn release_component(&self, owner: OwnerId) -> usize {
        self.shared.registry.release_component(owner)
    }

    pub fn is_tracked(&self, owner: OwnerId) -> bool {
        self.shared.registry.is_tracked(owner)
    }

    pub fn track_cleanup(
        &self,
        owner: OwnerId,
        label: impl Into<String>,
        cleanup: impl FnOnce() + 'static,
    ) -> CleanupId {
        self.shared.registry.track_cleanup(owner, label, cleanup)
    }

    pub fn registry(&self) -> &LifecycleRegistry {
        &self.shared.registry
    }

    // ── State ────────────────────────────────────────────────────────────

    /// Deliver partition `name` to `callback`; releasing `owner`
    /// unsubscribes it.
    pub fn subscribe_to_state(
        &self,
        name: &str,
        callback: impl Fn(&StateDelivery) + 'static,
        owner: OwnerId,
    ) -> Result<Subscription, BridgeError> {
        self.ensure_ready()?;
        let subscription = self.shared.sync.subscribe(name, callback);
        Ok(self.owned_subscription(owner, format!("state:{name}"), subscription))
    }

    /// Debounced update of partition `name`.
    pub fn update_state<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), BridgeError> {
        self.submit_state(name, value, false)
    }

    /// Update partition `name` and deliver before returning.
    pub fn update_state_now<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), BridgeError> {
        self.submit_state(name, value, true)
    }

    fn submit_state<T: Serialize + ?Sized>(&self, name: &str, value: &T, immediate: bool) -> Result<(), BridgeError> {
        self.ensure_ready()?;
        let value = serde_json::to_value(value).map_err(|source| {
            warn!(partition = name, error = %source, "state update is not representable as JSON");
            BridgeError::Serialize {
                partition: name.to_string(),
                source,
            }
        })?;
        if self.shared.diagnostics.get() {
            info!(partition = name, immediate, "state update");
        }
        self.shared.sync.sync_state(name, value, immediate);
        Ok(())
    }

    /// The last value delivered for partition `name`.
    pub fn state_snapshot(&self, name: &str) -> Option<Value> {
        self.shared.sync.baseline(name)
    }

    // ── Events ───────────────────────────────────────────────────────────

    /// Deliver `event` to `callback`; releasing `owner` unsubscribes it.
    pub fn subscribe_to_event(
        &self,
        event: &str,
        callback: impl Fn(&[Value]) + 'static,
        owner: OwnerId,
    ) -> Result<Subscription, BridgeError> {
        self.ensure_ready()?;
        let subscription = self.shared.channel.on(event, callback);
        Ok(self.owned_subscription(owner, format!("event:{event}"), subscription))
    }

    /// Queue `event` for the next delivery pass.
    pub fn emit_event(&self, event: &str, args: Vec<Value>) -> Result<(), BridgeError> {
        self.submit_event(event, args, false)
    }

    /// Deliver `event` before returning (queued instead when called from a
    /// handler).
    pub fn emit_event_now(&self, event: &str, args: Vec<Value>) -> Result<(), BridgeError> {
        self.submit_event(event, args, true)
    }

    fn submit_event(&self, event: &str, args: Vec<Value>, immediate: bool) -> Result<(), BridgeError> {
        self.ensure_ready()?;
        if self.shared.diagnostics.get() {
            info!(event, args = args.len(), immediate, "event emitted");
        }
        self.shared.channel.emit(event, args, immediate);
        Ok(())
    }

    /// Queue a batch of events in order; they are delivered in one pass.
    pub fn emit_multiple_events<I, E>(&self, events: I) -> Result<(), BridgeError>
    where
        I: IntoIterator<Item = (E, Vec<Value>)>,
        E: Into<String>,
    {
        self.ensure_ready()?;
        self.shared.channel.emit_multiple(events);
        Ok(())
    }

    // ── Pumping ──────────────────────────────────────────────────────────

    /// Process every pending partition, then every queued emission.
    pub fn flush(&self) -> Result<Flushed, BridgeError> {
        self.ensure_ready()?;
        let partitions = self.shared.sync.flush_pending_updates();
        let emissions = self.shared.channel.flush();
        debug!(partitions, emissions, "bridge flushed");
        Ok(Flushed {
            partitions,
            emissions,
        })
    }

    /// Move the scheduler clock forward. Returns how many tasks ran.
    pub fn advance(&self, by: Duration) -> usize {
        self.shared.scheduler.advance(by)
    }

    /// Run scheduled work until nothing is pending. Returns how many tasks
    /// ran.
    pub fn run_until_idle(&self) -> usize {
        self.shared.scheduler.run_until_idle()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.shared.scheduler
    }

    // ── Diagnostics ──────────────────────────────────────────────────────

    pub fn set_diagnostics(&self, enabled: bool) {
        self.shared.diagnostics.set(enabled);
        info!(enabled, "diagnostics toggled");
    }

    pub fn diagnostics_enabled(&self) -> bool {
        self.shared.diagnostics.get()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let listeners = self.shared.channel.listener_stats();
        let report = Diagnostics {
            enabled: self.shared.diagnostics.get(),
            state: self.shared.state.get(),
            listener_total: listeners.total,
            listeners_by_event: listeners.by_event,
            pending_partitions: self.shared.sync.pending_partitions(),
            pending_emissions: self.shared.channel.pending_emissions(),
            tracked_owners: self.shared.registry.tracked_owners(),
            scheduled_tasks: self.shared.scheduler.pending_tasks(),
            sync: self.shared.sync.stats(),
            lifecycle: self.shared.registry.stats(),
            handler_failures: self.shared.channel.handler_failures(),
            last_error: self.shared.last_error.borrow().clone(),
        };
        if report.enabled {
            info!(?report, "bridge diagnostics");
        }
        report
    }

    /// Wrap `inner` so that releasing `owner` unsubscribes it, and
    /// unsubscribing it first drops the owner's cleanup record.
    fn owned_subscription(&self, owner: OwnerId, label: String, inner: Subscription) -> Subscription {
        let record: Rc<Cell<Option<CleanupId>>> = Rc::new(Cell::new(None));
        let registry = self.shared.registry.downgrade();
        let handle = {
            let record = Rc::clone(&record);
            Subscription::new(move || {
                if let (Some(id), Some(registry)) = (record.get(), registry.upgrade()) {
                    registry.untrack(owner, id);
                }
                inner.unsubscribe();
            })
        };
        let tracked = handle.clone();
        let id = self.shared.registry.track_cleanup(owner, label, move || {
            tracked.unsubscribe();
        });
        record.set(Some(id));
        handle
    }
}
