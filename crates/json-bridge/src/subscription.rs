//! Removal handles and the listener-target seam.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;

type Cancel = Box<dyn FnOnce()>;

/// Idempotent removal handle returned by every subscribe-style call.
///
/// Clones share the same registration. Dropping a handle does *not*
/// unsubscribe; teardown is explicit or goes through the
/// [`LifecycleRegistry`](crate::LifecycleRegistry).
#[derive(Clone)]
pub struct Subscription {
    cancel: Rc<RefCell<Option<Cancel>>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Rc::new(RefCell::new(Some(Box::new(cancel)))),
        }
    }

    /// A handle that was never active.
    pub fn noop() -> Self {
        Self {
            cancel: Rc::new(RefCell::new(None)),
        }
    }

    /// Returns `true` on the first call only.
    pub fn unsubscribe(&self) -> bool {
        let cancel = self.cancel.borrow_mut().take();
        match cancel {
            Some(cancel) => {
                cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.borrow().is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Identifier of one listener registration on a [`ListenerTarget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ListenerId(pub(crate) u64);

/// Event listener callback.
pub type EventHandler = Rc<dyn Fn(&[Value])>;

/// Anything listeners can be attached to and detached from by id.
///
/// [`EventChannel`](crate::EventChannel) implements it; host event sources
/// can too, and then get leak-free teardown through
/// [`safe_listener`](crate::lifecycle::safe_listener).
pub trait ListenerTarget {
    fn add_listener(&self, event: &str, listener: EventHandler) -> ListenerId;

    /// Returns `false` if the listener was already gone.
    fn remove_listener(&self, event: &str, id: ListenerId) -> bool;
}
