//! Batched publish/subscribe.
//!
//! Queued emissions are delivered in one pass on the next scheduler cycle,
//! strictly in enqueue order across all event names. Each emission reaches
//! the handlers registered when the pass gets to it, not when it was
//! emitted.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, debug_span};

use crate::callback::{invoke_isolated, DeliveryDepth};
use crate::scheduler::{Scheduler, TimerId};
use crate::subscription::{EventHandler, ListenerId, ListenerTarget, Subscription};

struct Listener {
    id: ListenerId,
    handler: EventHandler,
    once: bool,
}

struct PendingEmission {
    event: String,
    args: Vec<Value>,
}

#[derive(Default)]
struct ChannelState {
    buckets: IndexMap<String, Vec<Listener>>,
    queue: VecDeque<PendingEmission>,
    flush_timer: Option<TimerId>,
    next_id: u64,
    emissions_delivered: u64,
    handler_failures: u64,
}

struct Shared {
    scheduler: Scheduler,
    depth: DeliveryDepth,
    state: RefCell<ChannelState>,
}

/// Listener counts as reported by [`EventChannel::listener_stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListenerStats {
    pub total: usize,
    pub by_event: IndexMap<String, usize>,
}

#[derive(Clone)]
pub struct EventChannel {
    shared: Rc<Shared>,
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("EventChannel")
            .field("events", &state.buckets.len())
            .field("pending", &state.queue.len())
            .field("flush_scheduled", &state.flush_timer.is_some())
            .finish()
    }
}

impl EventChannel {
    pub fn new(scheduler: Scheduler) -> Self {
        Self::with_delivery_depth(scheduler, DeliveryDepth::new())
    }

    /// Share `depth` with other components, so that an emission or flush
    /// made from inside any of their callbacks is queued too.
    pub fn with_delivery_depth(scheduler: Scheduler, depth: DeliveryDepth) -> Self {
        Self {
            shared: Rc::new(Shared {
                scheduler,
                depth,
                state: RefCell::new(ChannelState::default()),
            }),
        }
    }

    // ── Subscribing ──────────────────────────────────────────────────────

    /// Append `handler` to `event`'s handler list.
    pub fn on(&self, event: impl Into<String>, handler: impl Fn(&[Value]) + 'static) -> Subscription {
        self.subscribe(event.into(), Rc::new(handler), false)
    }

    /// Like [`on`](Self::on), but the handler is removed right before its
    /// first invocation.
    pub fn once(&self, event: impl Into<String>, handler: impl Fn(&[Value]) + 'static) -> Subscription {
        self.subscribe(event.into(), Rc::new(handler), true)
    }

    fn subscribe(&self, event: String, handler: EventHandler, once: bool) -> Subscription {
        let id = self.insert_listener(&event, handler, once);
        let weak = Rc::downgrade(&self.shared);
        Subscription::new(move || {
            if let Some(shared) = weak.upgrade() {
                EventChannel { shared }.remove_listener(&event, id);
            }
        })
    }

    fn insert_listener(&self, event: &str, handler: EventHandler, once: bool) -> ListenerId {
        let mut state = self.shared.state.borrow_mut();
        let id = ListenerId(state.next_id);
        state.next_id += 1;
        state
            .buckets
            .entry(event.to_string())
            .or_default()
            .push(Listener { id, handler, once });
        id
    }

    pub fn has(&self, event: &str) -> bool {
        self.shared.state.borrow().buckets.contains_key(event)
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.shared
            .state
            .borrow()
            .buckets
            .get(event)
            .map_or(0, Vec::len)
    }

    pub fn listener_stats(&self) -> ListenerStats {
        let state = self.shared.state.borrow();
        let by_event: IndexMap<String, usize> = state
            .buckets
            .iter()
            .map(|(event, bucket)| (event.clone(), bucket.len()))
            .collect();
        ListenerStats {
            total: by_event.values().sum(),
            by_event,
        }
    }

    pub fn remove_all_listeners(&self) {
        let buckets = std::mem::take(&mut self.shared.state.borrow_mut().buckets);
        debug!(events = buckets.len(), "all listeners removed");
    }

    // ── Emitting ─────────────────────────────────────────────────────────

    /// Deliver `args` to `event`'s handlers.
    ///
    /// With `immediate` the handlers run before this returns, unless the
    /// call comes from inside a handler: then, as for every non-immediate
    /// emission, the entry is queued for the next flush.
    pub fn emit(&self, event: impl Into<String>, args: Vec<Value>, immediate: bool) {
        let event = event.into();
        if immediate && !self.shared.depth.is_delivering() {
            self.deliver(&event, &args);
            return;
        }
        debug!(event = %event, args = args.len(), "emission queued");
        self.shared
            .state
            .borrow_mut()
            .queue
            .push_back(PendingEmission { event, args });
        self.ensure_flush_scheduled();
    }

    /// Queue a batch of emissions in order; they share one flush.
    pub fn emit_multiple<I, E>(&self, emissions: I)
    where
        I: IntoIterator<Item = (E, Vec<Value>)>,
        E: Into<String>,
    {
        let queued = {
            let mut state = self.shared.state.borrow_mut();
            let before = state.queue.len();
            state.queue.extend(
                emissions
                    .into_iter()
                    .map(|(event, args)| PendingEmission { event: event.into(), args }),
            );
            state.queue.len() - before
        };
        if queued > 0 {
            debug!(queued, "emission batch queued");
            self.ensure_flush_scheduled();
        }
    }

    pub fn pending_emissions(&self) -> usize {
        self.shared.state.borrow().queue.len()
    }

    pub fn is_flush_scheduled(&self) -> bool {
        self.shared.state.borrow().flush_timer.is_some()
    }

    /// Deliver every queued emission now. Returns how many were delivered.
    ///
    /// Called from inside a handler this only makes sure a flush is
    /// scheduled, and returns 0.
    pub fn flush(&self) -> usize {
        if self.shared.depth.is_delivering() {
            // The timer that brought us here, if any, has already fired.
            let stale = self.shared.state.borrow_mut().flush_timer.take();
            if let Some(timer) = stale {
                self.shared.scheduler.cancel(timer);
            }
            if self.pending_emissions() > 0 {
                self.ensure_flush_scheduled();
            }
            return 0;
        }
        let (queue, timer) = {
            let mut state = self.shared.state.borrow_mut();
            (std::mem::take(&mut state.queue), state.flush_timer.take())
        };
        if let Some(timer) = timer {
            self.shared.scheduler.cancel(timer);
        }
        if queue.is_empty() {
            return 0;
        }

        let span = debug_span!("channel.flush", emissions = queue.len());
        let _guard = span.enter();
        let count = queue.len();
        for emission in queue {
            self.deliver(&emission.event, &emission.args);
        }
        count
    }

    pub fn handler_failures(&self) -> u64 {
        self.shared.state.borrow().handler_failures
    }

    pub fn emissions_delivered(&self) -> u64 {
        self.shared.state.borrow().emissions_delivered
    }

    /// Drop every listener and queued emission, and cancel the pending flush.
    pub fn reset(&self) {
        let (buckets, queue, timer) = {
            let mut state = self.shared.state.borrow_mut();
            (
                std::mem::take(&mut state.buckets),
                std::mem::take(&mut state.queue),
                state.flush_timer.take(),
            )
        };
        if let Some(timer) = timer {
            self.shared.scheduler.cancel(timer);
        }
        debug!(
            events = buckets.len(),
            dropped_emissions = queue.len(),
            "channel reset"
        );
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn ensure_flush_scheduled(&self) {
        if self.shared.state.borrow().flush_timer.is_some() {
            return;
        }
        let weak: Weak<Shared> = Rc::downgrade(&self.shared);
        let timer = self.shared.scheduler.schedule(Duration::ZERO, move || {
            if let Some(shared) = weak.upgrade() {
                EventChannel { shared }.flush();
            }
        });
        self.shared.state.borrow_mut().flush_timer = Some(timer);
    }

    fn deliver(&self, event: &str, args: &[Value]) {
        let ids: Vec<ListenerId> = self
            .shared
            .state
            .borrow()
            .buckets
            .get(event)
            .map(|bucket| bucket.iter().map(|l| l.id).collect())
            .unwrap_or_default();

        let _depth = self.shared.depth.enter();
        for id in ids {
            let Some(handler) = self.take_handler(event, id) else {
                continue;
            };
            if !invoke_isolated("event", event, || handler(args)) {
                self.shared.state.borrow_mut().handler_failures += 1;
            }
        }
        self.shared.state.borrow_mut().emissions_delivered += 1;
    }

    /// Look up a still-registered handler, unregistering it first when it is
    /// a `once` handler.
    fn take_handler(&self, event: &str, id: ListenerId) -> Option<EventHandler> {
        let mut state = self.shared.state.borrow_mut();
        let bucket = state.buckets.get_mut(event)?;
        let pos = bucket.iter().position(|l| l.id == id)?;
        let handler = Rc::clone(&bucket[pos].handler);
        if bucket[pos].once {
            bucket.remove(pos);
            if bucket.is_empty() {
                state.buckets.shift_remove(event);
            }
        }
        Some(handler)
    }
}

impl ListenerTarget for EventChannel {
    fn add_listener(&self, event: &str, listener: EventHandler) -> ListenerId {
        self.insert_listener(event, listener, false)
    }

    fn remove_listener(&self, event: &str, id: ListenerId) -> bool {
        let removed = {
            let mut state = self.shared.state.borrow_mut();
            let Some(bucket) = state.buckets.get_mut(event) else {
                return false;
            };
            let Some(pos) = bucket.iter().position(|l| l.id == id) else {
                return false;
            };
            let removed = bucket.remove(pos);
            if bucket.is_empty() {
                state.buckets.shift_remove(event);
            }
            removed
        };
        drop(removed);
        true
    }
}
