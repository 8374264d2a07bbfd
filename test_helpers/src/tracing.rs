//! Capture of `tracing` events for asserting on log output.
//!
//! ```rust
//! # use observability_deps::tracing::{error, Level};
//! # use test_helpers::tracing::{LogValue, TracingCapture};
//! let capture = TracingCapture::builder().build();
//!
//! error!(item_type = "series", "failed to cache item");
//!
//! let errors = capture.lines_at_level(Level::ERROR);
//! assert_eq!(errors[0]["item_type"], LogValue::String("series".to_owned()));
//! ```
use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    sync::Arc,
};

use observability_deps::tracing::{
    self, Event, Level, Metadata,
    field::{Field, Visit},
    span::{Attributes, Id, Record},
    subscriber::{DefaultGuard, Subscriber},
};
use parking_lot::Mutex;

/// Key of the field holding the event level.
const LEVEL_KEY: &str = "level";

/// A recorded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum LogValue {
    /// Boolean field.
    Bool(bool),
    /// Floating point field.
    Float(f64),
    /// Signed integer field.
    SignedInt(i128),
    /// Anything recorded through `str`, `Display` or `Debug`.
    String(String),
    /// Unsigned integer field.
    UnsignedInt(u128),
}

impl fmt::Display for LogValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::SignedInt(i) => write!(f, "{i}"),
            Self::String(s) => f.write_str(s),
            Self::UnsignedInt(u) => write!(f, "{u}"),
        }
    }
}

/// One captured event: its level, message and fields by name.
pub type LogLine = BTreeMap<String, LogValue>;

/// Builder for [`TracingCapture`].
#[derive(Debug, Clone, Default)]
pub struct TracingCaptureBuilder {
    targets: HashSet<&'static str>,
}

impl TracingCaptureBuilder {
    /// Only capture events emitted from `target`.
    ///
    /// Repeated calls widen the filter.
    #[must_use]
    pub fn filter_target(mut self, target: &'static str) -> Self {
        self.targets.insert(target);
        self
    }

    /// Start capturing on the current thread.
    ///
    /// Capturing stops when the returned value is dropped.
    #[must_use]
    pub fn build(self) -> TracingCapture {
        // See <https://github.com/tokio-rs/tracing/issues/2874>.
        let _dont_drop_me = tracing::Dispatch::new(tracing::subscriber::NoSubscriber::new());

        let lines = Arc::new(Mutex::new(Vec::new()));
        let guard = tracing::subscriber::set_default(Recorder {
            lines: Arc::clone(&lines),
            targets: self.targets,
        });

        TracingCapture {
            lines,
            _guard: guard,
            _dont_drop_me,
        }
    }
}

/// Events captured on the current thread since [`build`](TracingCaptureBuilder::build).
///
/// Async tests should stay on a current-thread runtime (the `#[tokio::test]`
/// default) so events are emitted on the capturing thread.
#[derive(Debug)]
pub struct TracingCapture {
    lines: Arc<Mutex<Vec<LogLine>>>,
    _guard: DefaultGuard,
    _dont_drop_me: tracing::Dispatch,
}

impl TracingCapture {
    /// Capture configuration.
    pub fn builder() -> TracingCaptureBuilder {
        TracingCaptureBuilder::default()
    }

    /// All captured events, oldest first.
    pub fn lines_as_maps(&self) -> Vec<LogLine> {
        self.lines.lock().clone()
    }

    /// Captured events emitted at exactly `level`, oldest first.
    pub fn lines_at_level(&self, level: Level) -> Vec<LogLine> {
        let level = LogValue::String(level.to_string());
        self.lines
            .lock()
            .iter()
            .filter(|line| line.get(LEVEL_KEY) == Some(&level))
            .cloned()
            .collect()
    }
}

impl fmt::Display for TracingCapture {
    /// One event per line, fields as `key = value; `.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.lock().iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            for (k, v) in line {
                write!(f, "{k} = {v}; ")?;
            }
        }
        Ok(())
    }
}

/// Subscriber appending every accepted event to the shared lines.
struct Recorder {
    lines: Arc<Mutex<Vec<LogLine>>>,
    targets: HashSet<&'static str>,
}

impl Subscriber for Recorder {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let md = event.metadata();
        if !self.targets.is_empty() && !self.targets.contains(md.target()) {
            return;
        }

        let mut line = LogLine::new();
        line.insert(LEVEL_KEY.to_owned(), LogValue::String(md.level().to_string()));
        event.record(&mut FieldVisitor(&mut line));

        self.lines.lock().push(line);
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

struct FieldVisitor<'a>(&'a mut LogLine);

impl FieldVisitor<'_> {
    fn insert(&mut self, field: &Field, value: LogValue) {
        self.0.insert(field.name().to_owned(), value);
    }
}

impl Visit for FieldVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, LogValue::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, LogValue::String(value.to_owned()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, LogValue::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, LogValue::Float(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, LogValue::SignedInt(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, LogValue::UnsignedInt(value.into()));
    }
}

#[cfg(test)]
mod tests {
    use observability_deps::tracing::{error, info};

    use super::*;

    #[test]
    fn test_capture_levels_and_fields() {
        let capture = TracingCapture::builder().build();

        info!(answer = 42_u64, "hello");
        error!(error = %"boom", "failed");

        let lines = capture.lines_as_maps();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["message"], LogValue::String("hello".to_owned()));
        assert_eq!(lines[0]["answer"], LogValue::UnsignedInt(42));

        let errors = capture.lines_at_level(Level::ERROR);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["error"].to_string(), "boom");
        assert_eq!(
            capture.to_string(),
            "answer = 42; level = INFO; message = hello; \n\
             error = boom; level = ERROR; message = failed; "
        );
    }

    #[test]
    fn test_target_filter() {
        let capture = TracingCapture::builder()
            .filter_target("some_other_target")
            .build();

        info!("not captured");

        assert!(capture.lines_as_maps().is_empty());
    }
}
