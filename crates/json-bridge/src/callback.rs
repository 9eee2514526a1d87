//! Panic isolation and re-entrancy tracking for user callbacks.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

/// How many delivery callbacks are currently on the stack.
///
/// Components that share one depth treat a call from inside any of their
/// callbacks as re-entrant, not only calls from their own.
#[derive(Clone, Default)]
pub struct DeliveryDepth(Rc<Cell<u32>>);

impl DeliveryDepth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_delivering(&self) -> bool {
        self.0.get() > 0
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }

    /// Mark a delivery as running until the returned guard drops.
    pub(crate) fn enter(&self) -> DepthGuard {
        self.0.set(self.0.get() + 1);
        DepthGuard(Rc::clone(&self.0))
    }
}

impl fmt::Debug for DeliveryDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeliveryDepth").field(&self.0.get()).finish()
    }
}

pub(crate) struct DepthGuard(Rc<Cell<u32>>);

impl Drop for DepthGuard {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// Run `f`, catching a panic so the caller can keep going with the next
/// callback. Returns `false` when `f` panicked.
pub(crate) fn invoke_isolated(context: &str, name: &str, f: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            tracing::warn!(
                context,
                name,
                panic = %panic_message(payload.as_ref()),
                "callback panicked"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
