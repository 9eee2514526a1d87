#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use json_bridge::{Bridge, BridgeConfig, StateDelivery};
use serde_json::Value;
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

pub fn ready_bridge() -> Bridge {
    ready_bridge_with(BridgeConfig::default())
}

pub fn ready_bridge_with(config: BridgeConfig) -> Bridge {
    let bridge = Bridge::new(config);
    bridge.initialize().expect("default config initializes");
    bridge
}

/// Shared log of everything a callback received.
pub struct Recorder<T> {
    pub seen: Rc<RefCell<Vec<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            seen: Rc::clone(&self.seen),
        }
    }
}

pub fn state_recorder() -> Recorder<StateDelivery> {
    Recorder {
        seen: Rc::new(RefCell::new(Vec::new())),
    }
}

pub fn event_recorder() -> Recorder<Vec<Value>> {
    Recorder {
        seen: Rc::new(RefCell::new(Vec::new())),
    }
}

impl<T: Clone> Recorder<T> {
    pub fn len(&self) -> usize {
        self.seen.borrow().len()
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.seen.borrow().clone()
    }

    pub fn last(&self) -> Option<T> {
        self.seen.borrow().last().cloned()
    }
}

impl Recorder<StateDelivery> {
    pub fn state_callback(&self) -> impl Fn(&StateDelivery) + 'static {
        let seen = Rc::clone(&self.seen);
        move |delivery: &StateDelivery| seen.borrow_mut().push(delivery.clone())
    }
}

impl Recorder<Vec<Value>> {
    pub fn event_callback(&self) -> impl Fn(&[Value]) + 'static {
        let seen = Rc::clone(&self.seen);
        move |args: &[Value]| seen.borrow_mut().push(args.to_vec())
    }
}

// ── Log capture ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct CapturedEvent {
    pub level: tracing::Level,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct CapturedLogs {
    pub events: Vec<CapturedEvent>,
    pub spans: Vec<String>,
}

impl CapturedLogs {
    pub fn has_event(&self, level: tracing::Level, message: &str) -> bool {
        self.events
            .iter()
            .any(|e| e.level == level && e.message == message)
    }

    pub fn has_span(&self, name: &str) -> bool {
        self.spans.iter().any(|s| s == name)
    }
}

struct LogCapture {
    logs: Arc<Mutex<CapturedLogs>>,
}

struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

impl<S> Layer<S> for LogCapture
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_new_span(&self, attrs: &tracing::span::Attributes<'_>, _id: &tracing::Id, _ctx: Context<'_, S>) {
        self.logs
            .lock()
            .expect("log capture lock")
            .spans
            .push(attrs.metadata().name().to_string());
    }

    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);
        self.logs.lock().expect("log capture lock").events.push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.message,
        });
    }
}

/// Run `f` with a capturing subscriber installed on this thread.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, CapturedLogs) {
    let logs = Arc::new(Mutex::new(CapturedLogs::default()));
    let subscriber = tracing_subscriber::registry().with(LogCapture {
        logs: Arc::clone(&logs),
    });
    let result = tracing::subscriber::with_default(subscriber, f);
    let captured = std::mem::take(&mut *logs.lock().expect("log capture lock"));
    (result, captured)
}
