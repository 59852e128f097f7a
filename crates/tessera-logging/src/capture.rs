//! In-memory log capture for assertions in tests.
//!
//! [`capture_logs`] installs a thread-local subscriber that appends every
//! event and every span opening to a shared journal. Assertions read the
//! journal through [`CapturedLogs`].

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// One recorded event or span opening.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    /// Level of the event or span.
    pub level: Level,
    /// Module path that emitted it.
    pub target: String,
    /// Event message, or the span name for spans.
    pub message: String,
    /// Remaining fields in declaration order, values rendered as text.
    pub fields: Vec<(String, String)>,
}

impl CapturedEvent {
    fn empty(level: Level, target: &str) -> Self {
        Self {
            level,
            target: target.to_owned(),
            message: String::new(),
            fields: Vec::new(),
        }
    }

    fn put(&mut self, field: &Field, text: String) {
        if field.name() == "message" {
            self.message = text;
        } else {
            self.fields.push((field.name().to_owned(), text));
        }
    }

    /// Value of the named field, if one was recorded.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find_map(|(key, value)| (key == name).then_some(value.as_str()))
    }
}

impl Visit for CapturedEvent {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{value:?}"));
    }
}

#[derive(Clone, Debug)]
enum Entry {
    Event(CapturedEvent),
    Span(CapturedEvent),
}

/// Shared journal of what a test logged.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    journal: Arc<Mutex<Vec<Entry>>>,
}

impl CapturedLogs {
    fn push(&self, entry: Entry) {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    fn entries(&self) -> Vec<Entry> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every captured event, oldest first.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Event(event) => Some(event),
                Entry::Span(_) => None,
            })
            .collect()
    }

    /// Every span opened, oldest first. `message` holds the span name.
    pub fn spans(&self) -> Vec<CapturedEvent> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Span(span) => Some(span),
                Entry::Event(_) => None,
            })
            .collect()
    }

    /// Events at `level` whose message contains `needle`.
    pub fn find(&self, level: Level, needle: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.level == level && e.message.contains(needle))
            .collect()
    }

    /// Whether an event at `level` mentions `needle`.
    pub fn has_event(&self, level: Level, needle: &str) -> bool {
        !self.find(level, needle).is_empty()
    }

    /// Whether a span called `name` was opened.
    pub fn has_span(&self, name: &str) -> bool {
        self.spans().iter().any(|s| s.message == name)
    }

    /// Number of events at `level`.
    pub fn count_at_level(&self, level: Level) -> usize {
        self.events().iter().filter(|e| e.level == level).count()
    }
}

struct JournalLayer {
    logs: CapturedLogs,
}

impl<S> Layer<S> for JournalLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut captured = CapturedEvent::empty(*meta.level(), meta.target());
        event.record(&mut captured);
        self.logs.push(Entry::Event(captured));
    }

    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
        let meta = attrs.metadata();
        let mut captured = CapturedEvent::empty(*meta.level(), meta.target());
        attrs.record(&mut captured);
        captured.message = meta.name().to_owned();
        self.logs.push(Entry::Span(captured));
    }
}

/// Install a thread-local subscriber recording every event and span.
///
/// Capture stops when the returned guard is dropped.
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let guard = tracing_subscriber::registry()
        .with(JournalLayer { logs: logs.clone() })
        .set_default();
    (logs, guard)
}
