//! Owner-scoped cleanup tracking.
//!
//! Every cleanup is recorded under an [`OwnerId`] and runs exactly once:
//! when the owner is released, when its [`Disposable`] is disposed, or when
//! the registry itself is dropped, whichever comes first.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, debug_span, warn};

use crate::callback::invoke_isolated;
use crate::subscription::{ListenerTarget, Subscription};

pub use json_bridge_util::{memoize_last, MemoizeLast};

// ── OwnerId ───────────────────────────────────────────────────────────────

/// Identity of a component that owns cleanups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct OwnerId(u64);

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

impl OwnerId {
    /// A process-wide unique id.
    pub fn unique() -> Self {
        Self(NEXT_OWNER.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a host-provided identity. The caller keeps it unique.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

// ── Registry ──────────────────────────────────────────────────────────────

/// Handle to one tracked cleanup, for [`LifecycleRegistry::untrack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CleanupId(u64);

struct CleanupRecord {
    id: CleanupId,
    label: String,
    cleanup: Box<dyn FnOnce()>,
}

#[derive(Default)]
struct OwnerRecord {
    label: Option<String>,
    cleanups: VecDeque<CleanupRecord>,
    releasing: bool,
}

/// Counters exposed through diagnostics.
///
/// Only releases are counted. Cleanups that run because the registry itself
/// is dropped are logged instead, since nothing can read the counters then.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub cleanups_run: u64,
    pub cleanup_failures: u64,
    pub owners_released: u64,
}

#[derive(Default)]
struct RegistryState {
    owners: IndexMap<OwnerId, OwnerRecord>,
    next_cleanup: u64,
    stats: RegistryStats,
}

impl Drop for RegistryState {
    fn drop(&mut self) {
        let mut ran = 0_usize;
        let mut failed = 0_usize;
        for (owner, record) in self.owners.drain(..) {
            if !record.cleanups.is_empty() {
                debug!(%owner, cleanups = record.cleanups.len(), "registry dropped; running cleanups");
            }
            for CleanupRecord { label, cleanup, .. } in record.cleanups {
                if !invoke_isolated("cleanup", &label, cleanup) {
                    failed += 1;
                }
                ran += 1;
            }
        }
        if failed > 0 {
            warn!(ran, failed, "cleanups failed while dropping registry");
        } else if ran > 0 {
            debug!(ran, "registry dropped");
        }
    }
}

#[derive(Clone, Default)]
pub struct LifecycleRegistry {
    state: Rc<RefCell<RegistryState>>,
}

impl fmt::Debug for LifecycleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("LifecycleRegistry")
            .field("owners", &state.owners.len())
            .field("stats", &state.stats)
            .finish()
    }
}

impl LifecycleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `owner`. Returns `false` if it was already tracked, in
    /// which case only the label is updated.
    pub fn register(&self, owner: OwnerId, label: impl Into<String>) -> bool {
        let mut state = self.state.borrow_mut();
        let label = label.into();
        debug!(%owner, label = %label, "component registered");
        match state.owners.get_mut(&owner) {
            Some(record) => {
                record.label = Some(label);
                false
            }
            None => {
                state.owners.insert(
                    owner,
                    OwnerRecord {
                        label: Some(label),
                        ..OwnerRecord::default()
                    },
                );
                true
            }
        }
    }

    /// Queue `cleanup` to run when `owner` is released. Untracked owners are
    /// registered on the fly. Cleanups added while the owner is being
    /// released run in the same release.
    pub fn track_cleanup(
        &self,
        owner: OwnerId,
        label: impl Into<String>,
        cleanup: impl FnOnce() + 'static,
    ) -> CleanupId {
        let label = label.into();
        debug!(%owner, label = %label, "cleanup tracked");
        let mut state = self.state.borrow_mut();
        let id = CleanupId(state.next_cleanup);
        state.next_cleanup += 1;
        state.owners.entry(owner).or_default().cleanups.push_back(CleanupRecord {
            id,
            label,
            cleanup: Box::new(cleanup),
        });
        id
    }

    /// Forget a cleanup without running it, once its resource has been torn
    /// down some other way. An owner tracked only implicitly, through its
    /// cleanups, is forgotten with its last one.
    ///
    /// Returns `false` if the cleanup already ran or was never tracked here.
    pub fn untrack(&self, owner: OwnerId, id: CleanupId) -> bool {
        let removed = {
            let mut state = self.state.borrow_mut();
            let Some(record) = state.owners.get_mut(&owner) else {
                return false;
            };
            let Some(pos) = record.cleanups.iter().position(|c| c.id == id) else {
                return false;
            };
            let removed = record.cleanups.remove(pos);
            if record.label.is_none() && record.cleanups.is_empty() && !record.releasing {
                state.owners.shift_remove(&owner);
            }
            removed
        };
        if let Some(CleanupRecord { label, .. }) = &removed {
            debug!(%owner, label = %label, "cleanup untracked");
        }
        // The closure may own the last handle to something with its own Drop.
        drop(removed);
        true
    }

    pub fn is_tracked(&self, owner: OwnerId) -> bool {
        self.state.borrow().owners.contains_key(&owner)
    }

    pub fn cleanup_count(&self, owner: OwnerId) -> usize {
        self.state
            .borrow()
            .owners
            .get(&owner)
            .map_or(0, |record| record.cleanups.len())
    }

    pub fn label(&self, owner: OwnerId) -> Option<String> {
        self.state.borrow().owners.get(&owner)?.label.clone()
    }

    /// Run every cleanup of `owner` in registration order, then forget the
    /// owner. Returns how many cleanups ran; 0 for an unknown owner or a
    /// release already in progress.
    ///
    /// A panicking cleanup is logged and counted; the rest still run.
    pub fn release_component(&self, owner: OwnerId) -> usize {
        {
            let mut state = self.state.borrow_mut();
            match state.owners.get_mut(&owner) {
                Some(record) if !record.releasing => record.releasing = true,
                _ => return 0,
            }
        }

        let span = debug_span!("lifecycle.release", %owner);
        let _guard = span.enter();
        let mut ran = 0;
        let mut failed = 0;
        loop {
            let next = self
                .state
                .borrow_mut()
                .owners
                .get_mut(&owner)
                .and_then(|record| record.cleanups.pop_front());
            let Some(CleanupRecord { label, cleanup, .. }) = next else {
                break;
            };
            if !invoke_isolated("cleanup", &label, cleanup) {
                failed += 1;
            }
            ran += 1;
        }

        let mut state = self.state.borrow_mut();
        state.owners.shift_remove(&owner);
        state.stats.owners_released += 1;
        state.stats.cleanups_run += ran as u64;
        state.stats.cleanup_failures += failed;
        debug!(ran, failed, "component released");
        ran
    }

    /// Release every tracked owner, oldest first. Returns the total number
    /// of cleanups run.
    pub fn release_all(&self) -> usize {
        let owners: Vec<OwnerId> = self.state.borrow().owners.keys().copied().collect();
        owners
            .into_iter()
            .map(|owner| self.release_component(owner))
            .sum()
    }

    pub fn tracked_owners(&self) -> usize {
        self.state.borrow().owners.len()
    }

    pub fn stats(&self) -> RegistryStats {
        self.state.borrow().stats
    }

    /// Wrap `target` in a [`Disposable`] whose cleanup is also tracked under
    /// `owner`: disposing it or releasing the owner runs the cleanup, once.
    pub fn track_disposable<T>(
        &self,
        owner: OwnerId,
        target: T,
        label: impl Into<String>,
        cleanup: impl FnOnce() + 'static,
    ) -> Disposable<T> {
        let mut disposable = create_disposable(target, label, cleanup);
        let slot = Rc::clone(&disposable.slot);
        let id = self.track_cleanup(owner, disposable.label.clone(), move || {
            let cleanup = slot.borrow_mut().take();
            if let Some(cleanup) = cleanup {
                cleanup();
            }
        });
        disposable.tracked = Some(TrackedBy {
            registry: self.downgrade(),
            owner,
            id,
        });
        disposable
    }

    /// Register a fresh owner and return a guard that releases it on drop.
    pub fn scope(&self, label: impl Into<String>) -> ComponentGuard {
        let owner = OwnerId::unique();
        self.register(owner, label);
        ComponentGuard {
            registry: self.downgrade(),
            owner,
        }
    }

    pub fn downgrade(&self) -> WeakRegistry {
        WeakRegistry {
            state: Rc::downgrade(&self.state),
        }
    }
}

/// Non-owning handle to a [`LifecycleRegistry`].
#[derive(Clone, Default)]
pub struct WeakRegistry {
    state: Weak<RefCell<RegistryState>>,
}

impl WeakRegistry {
    pub fn upgrade(&self) -> Option<LifecycleRegistry> {
        self.state.upgrade().map(|state| LifecycleRegistry { state })
    }
}

/// RAII owner scope: dropping the guard releases the owner.
pub struct ComponentGuard {
    registry: WeakRegistry,
    owner: OwnerId,
}

impl ComponentGuard {
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Returns `None` when the registry is gone; the cleanup has then
    /// already run.
    pub fn track_cleanup(&self, label: impl Into<String>, cleanup: impl FnOnce() + 'static) -> Option<CleanupId> {
        match self.registry.upgrade() {
            Some(registry) => Some(registry.track_cleanup(self.owner, label, cleanup)),
            // Registry is gone; nothing will ever release this owner.
            None => {
                let label = label.into();
                invoke_isolated("cleanup", &label, cleanup);
                None
            }
        }
    }

    /// Release now instead of at drop. Returns how many cleanups ran.
    pub fn release(self) -> usize {
        self.registry
            .upgrade()
            .map_or(0, |registry| registry.release_component(self.owner))
    }
}

impl fmt::Debug for ComponentGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentGuard").field("owner", &self.owner).finish()
    }
}

impl Drop for ComponentGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.release_component(self.owner);
        }
    }
}

// ── Disposable ────────────────────────────────────────────────────────────

type CleanupSlot = Rc<RefCell<Option<Box<dyn FnOnce()>>>>;

/// A value paired with a cleanup that runs exactly once: on
/// [`dispose`](Disposable::dispose), on drop, or when the owning component
/// is released.
pub struct Disposable<T> {
    target: T,
    label: String,
    slot: CleanupSlot,
    tracked: Option<TrackedBy>,
}

struct TrackedBy {
    registry: WeakRegistry,
    owner: OwnerId,
    id: CleanupId,
}

/// Wrap `target` with an untracked cleanup.
pub fn create_disposable<T>(target: T, label: impl Into<String>, cleanup: impl FnOnce() + 'static) -> Disposable<T> {
    Disposable {
        target,
        label: label.into(),
        slot: Rc::new(RefCell::new(Some(Box::new(cleanup)))),
        tracked: None,
    }
}

impl<T> Disposable<T> {
    /// Run the cleanup, and drop its record from the owning registry if it
    /// is tracked. Returns `false` if it already ran.
    pub fn dispose(&self) -> bool {
        let cleanup = self.slot.borrow_mut().take();
        match cleanup {
            Some(cleanup) => {
                if let Some(tracked) = &self.tracked {
                    if let Some(registry) = tracked.registry.upgrade() {
                        registry.untrack(tracked.owner, tracked.id);
                    }
                }
                invoke_isolated("dispose", &self.label, cleanup);
                true
            }
            None => false,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.slot.borrow().is_none()
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<T> Deref for Disposable<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.target
    }
}

impl<T> DerefMut for Disposable<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.target
    }
}

impl<T> Drop for Disposable<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: fmt::Debug> fmt::Debug for Disposable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("target", &self.target)
            .field("label", &self.label)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ── Listeners ─────────────────────────────────────────────────────────────

/// Attach `listener` to `target` and return a handle that detaches it once.
pub fn safe_listener<T>(target: &T, event: &str, listener: impl Fn(&[Value]) + 'static) -> Subscription
where
    T: ListenerTarget + Clone + 'static,
{
    let id = target.add_listener(event, Rc::new(listener));
    let target = target.clone();
    let event = event.to_string();
    Subscription::new(move || {
        target.remove_listener(&event, id);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, impl Fn() -> Box<dyn FnOnce()>) {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        (count, move || -> Box<dyn FnOnce()> {
            let c = Rc::clone(&c);
            Box::new(move || c.set(c.get() + 1))
        })
    }

    #[test]
    fn release_runs_cleanups_in_order_once() {
        let registry = LifecycleRegistry::new();
        let owner = OwnerId::unique();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = Rc::clone(&order);
            registry.track_cleanup(owner, format!("c{i}"), move || order.borrow_mut().push(i));
        }
        assert!(registry.is_tracked(owner));
        assert_eq!(registry.cleanup_count(owner), 3);
        assert_eq!(registry.release_component(owner), 3);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        assert!(!registry.is_tracked(owner));
        assert_eq!(registry.release_component(owner), 0);
    }

    #[test]
    fn panicking_cleanup_does_not_stop_release() {
        let registry = LifecycleRegistry::new();
        let owner = OwnerId::unique();
        let (count, make) = counter();
        registry.track_cleanup(owner, "boom", || panic!("cleanup failure"));
        registry.track_cleanup(owner, "ok", make());
        assert_eq!(registry.release_component(owner), 2);
        assert_eq!(count.get(), 1);
        assert!(!registry.is_tracked(owner));
        assert_eq!(
            registry.stats(),
            RegistryStats {
                cleanups_run: 2,
                cleanup_failures: 1,
                owners_released: 1
            }
        );
    }

    #[test]
    fn nested_release_is_a_noop() {
        let registry = LifecycleRegistry::new();
        let owner = OwnerId::unique();
        let nested = Rc::new(Cell::new(usize::MAX));
        let (r, n) = (registry.clone(), Rc::clone(&nested));
        registry.track_cleanup(owner, "reentrant", move || n.set(r.release_component(owner)));
        assert_eq!(registry.release_component(owner), 1);
        assert_eq!(nested.get(), 0);
    }

    #[test]
    fn cleanup_added_during_release_runs_in_same_release() {
        let registry = LifecycleRegistry::new();
        let owner = OwnerId::unique();
        let (count, make) = counter();
        let r = registry.clone();
        let late = make();
        registry.track_cleanup(owner, "adds", move || {
            r.track_cleanup(owner, "late", late);
        });
        assert_eq!(registry.release_component(owner), 2);
        assert_eq!(count.get(), 1);
        assert!(!registry.is_tracked(owner));
    }

    #[test]
    fn register_updates_label() {
        let registry = LifecycleRegistry::new();
        let owner = OwnerId::from_raw(7);
        assert!(registry.register(owner, "panel"));
        assert!(!registry.register(owner, "sidebar"));
        assert_eq!(registry.label(owner).as_deref(), Some("sidebar"));
        assert_eq!(registry.tracked_owners(), 1);
        assert_eq!(owner.to_string(), "owner#7");
    }

    #[test]
    fn disposable_runs_once() {
        let (count, make) = counter();
        let mut handle = create_disposable(vec![1, 2], "buffer", make());
        handle.push(3);
        assert_eq!(*handle, vec![1, 2, 3]);
        assert!(handle.dispose());
        assert!(!handle.dispose());
        assert!(handle.is_disposed());
        drop(handle);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn disposable_drop_disposes() {
        let (count, make) = counter();
        drop(create_disposable((), "unit", make()));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn tracked_disposable_runs_once_either_way() {
        let registry = LifecycleRegistry::new();
        let owner = OwnerId::unique();
        let (count, make) = counter();

        let handle = registry.track_disposable(owner, "timer", "interval", make());
        assert_eq!(registry.release_component(owner), 1);
        assert!(handle.is_disposed());
        drop(handle);
        assert_eq!(count.get(), 1);

        let handle = registry.track_disposable(owner, "timer", "interval", make());
        assert!(handle.dispose());
        assert_eq!(registry.cleanup_count(owner), 0);
        assert_eq!(registry.release_component(owner), 0);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn untrack_drops_record_without_running() {
        let registry = LifecycleRegistry::new();
        let owner = OwnerId::unique();
        registry.register(owner, "list");
        let (count, make) = counter();
        let first = registry.track_cleanup(owner, "row", make());
        registry.track_cleanup(owner, "row", make());

        assert!(registry.untrack(owner, first));
        assert!(!registry.untrack(owner, first));
        assert_eq!(registry.cleanup_count(owner), 1);
        assert_eq!(registry.release_component(owner), 1);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn untracking_last_cleanup_forgets_implicit_owner() {
        let registry = LifecycleRegistry::new();
        let (implicit, registered) = (OwnerId::unique(), OwnerId::unique());
        registry.register(registered, "panel");
        let (_count, make) = counter();
        let a = registry.track_cleanup(implicit, "a", make());
        let b = registry.track_cleanup(registered, "b", make());

        registry.untrack(implicit, a);
        registry.untrack(registered, b);
        assert!(!registry.is_tracked(implicit));
        assert!(registry.is_tracked(registered));
    }

    #[test]
    fn disposing_repeatedly_does_not_grow_owner() {
        let registry = LifecycleRegistry::new();
        let owner = OwnerId::unique();
        registry.register(owner, "poller");
        let (count, make) = counter();
        for _ in 0..100 {
            drop(registry.track_disposable(owner, (), "tick", make()));
        }
        assert_eq!(count.get(), 100);
        assert_eq!(registry.cleanup_count(owner), 0);
        assert_eq!(registry.release_component(owner), 0);
    }

    #[test]
    fn dropping_registry_runs_outstanding_cleanups() {
        let (count, make) = counter();
        let registry = LifecycleRegistry::new();
        registry.track_cleanup(OwnerId::unique(), "a", make());
        registry.track_cleanup(OwnerId::unique(), "b", make());
        drop(registry);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn component_guard_releases_on_drop() {
        let registry = LifecycleRegistry::new();
        let (count, make) = counter();
        let owner = {
            let guard = registry.scope("dialog");
            guard.track_cleanup("close", make());
            assert!(registry.is_tracked(guard.owner()));
            guard.owner()
        };
        assert!(!registry.is_tracked(owner));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn component_guard_explicit_release() {
        let registry = LifecycleRegistry::new();
        let (count, make) = counter();
        let guard = registry.scope("dialog");
        guard.track_cleanup("close", make());
        assert_eq!(guard.release(), 1);
        assert_eq!(count.get(), 1);
        assert_eq!(registry.stats().owners_released, 1);
    }

    #[test]
    fn memoize_last_is_reexported() {
        let calls = Cell::new(0);
        let square = memoize_last(|x: &i32| {
            calls.set(calls.get() + 1);
            x * x
        });
        assert_eq!(square.call(3), 9);
        assert_eq!(square.call(3), 9);
        assert_eq!(calls.get(), 1);
        assert_eq!(square.call(4), 16);
        assert_eq!(calls.get(), 2);
    }
}
