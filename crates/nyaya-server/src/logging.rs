use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

pub(crate) const RING_CAPACITY: usize = 500;

/// Recent log lines plus a live feed of new ones. Lines are appended and
/// broadcast under one lock, so a reader that snapshots and subscribes
/// together sees every line exactly once.
#[derive(Clone)]
pub struct LogHub {
    tx: broadcast::Sender<String>,
    ring: Arc<Mutex<VecDeque<String>>>,
}

impl LogHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            tx,
            ring: Arc::new(Mutex::new(VecDeque::with_capacity(RING_CAPACITY))),
        }
    }

    pub fn layer(&self) -> BroadcastLayer {
        BroadcastLayer { hub: self.clone() }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.ring.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, line: String) {
        let mut ring = self.lock();
        // No subscribers is fine.
        let _ = self.tx.send(line.clone());
        ring.push_back(line);
        if ring.len() > RING_CAPACITY {
            ring.pop_front();
        }
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    /// The ring so far and a receiver for every line pushed after it.
    pub fn follow(&self) -> (Vec<String>, broadcast::Receiver<String>) {
        let ring = self.lock();
        (ring.iter().cloned().collect(), self.tx.subscribe())
    }
}

impl Default for LogHub {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct LogLine {
    ts: u64,
    level: &'static str,
    category: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    fields: Map<String, Value>,
}

fn category(target: &str) -> &'static str {
    if target.contains("pipeline") {
        "pipeline"
    } else if target.contains("store") {
        "store"
    } else if target.contains("agent") || target.contains("groq") || target.contains("ollama") {
        "agent"
    } else {
        "system"
    }
}

/// Collects the message and the structured fields (`jurisdiction`, `tool`,
/// `iteration`, ...) of one event.
#[derive(Default)]
struct FieldCollector {
    message: String,
    fields: Map<String, Value>,
}

impl FieldCollector {
    fn put(&mut self, field: &tracing::field::Field, value: Value) {
        if field.name() == "message" {
            self.message = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl tracing::field::Visit for FieldCollector {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.put(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.put(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.put(field, Value::from(format!("{value:?}")));
    }
}

/// Mirrors tracing events into a [`LogHub`] as JSON lines.
pub struct BroadcastLayer {
    hub: LogHub,
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for BroadcastLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let metadata = event.metadata();
        let level = match *metadata.level() {
            tracing::Level::ERROR => "err",
            tracing::Level::WARN => "warn",
            tracing::Level::INFO => "info",
            tracing::Level::DEBUG => "debug",
            tracing::Level::TRACE => return,
        };

        let mut collected = FieldCollector::default();
        event.record(&mut collected);

        let line = LogLine {
            ts: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            level,
            category: category(metadata.target()),
            message: collected.message,
            fields: collected.fields,
        };
        if let Ok(json) = serde_json::to_string(&line) {
            self.hub.push(json);
        }
    }
}
