//! Capture tracing events in memory for assertions in tests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::level_filters::LevelFilter;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// A captured tracing event.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    /// The log level.
    pub level: Level,
    /// The target module.
    pub target: String,
    /// The formatted message.
    pub message: String,
    /// Field key-value pairs.
    pub fields: Vec<(String, String)>,
}

impl CapturedEvent {
    /// Value of a field, if recorded.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Thread-safe store for captured events.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    fn lock(&self) -> MutexGuard<'_, Vec<CapturedEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All captured events.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.lock().clone()
    }

    /// Whether any event at `level` contains the message substring.
    pub fn has_event(&self, level: Level, message_contains: &str) -> bool {
        self.lock()
            .iter()
            .any(|e| e.level == level && e.message.contains(message_contains))
    }

    /// Events at `level` whose message contains the substring.
    pub fn find(&self, level: Level, message_contains: &str) -> Vec<CapturedEvent> {
        self.lock()
            .iter()
            .filter(|e| e.level == level && e.message.contains(message_contains))
            .cloned()
            .collect()
    }

    /// Count events at a specific level.
    pub fn count_at_level(&self, level: Level) -> usize {
        self.lock().iter().filter(|e| e.level == level).count()
    }

    /// Clear all captured events.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

struct CaptureLayer {
    logs: CapturedLogs,
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl FieldVisitor {
    fn push(&mut self, field: &tracing::field::Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.push((field.name().to_owned(), value));
        }
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.push(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.push(field, value.to_owned());
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.push(field, value.to_string());
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.push(field, value.to_string());
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.push(field, value.to_string());
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        self.logs.lock().push(CapturedEvent {
            level: *metadata.level(),
            target: metadata.target().to_owned(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

/// Install a thread-local subscriber that captures every event.
///
/// Keep the returned guard alive for the duration of the test. Only events
/// emitted on the current thread are captured, so async tests should use a
/// current-thread runtime.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let layer = CaptureLayer { logs: logs.clone() };

    let subscriber = tracing_subscriber::registry()
        .with(layer)
        .with(LevelFilter::TRACE);

    let guard = subscriber.set_default();
    (logs, guard)
}
