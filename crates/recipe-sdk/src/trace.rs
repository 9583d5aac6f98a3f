use std::fmt;

/// Severity of a trace message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TraceLevel {
    Verbose,
    Info,
    Warning,
    Error,
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TraceLevel::Verbose => "verbose",
            TraceLevel::Info => "info",
            TraceLevel::Warning => "warning",
            TraceLevel::Error => "error",
        })
    }
}

/// Write-only output sink handed to the step modules.
///
/// Modules never print directly. Download progress and process diagnostics
/// go through the `TraceWriter` the caller supplies. Implementations must not
/// fail: a message that cannot be delivered is dropped.
pub trait TraceWriter: Send + Sync {
    fn write(&self, level: TraceLevel, message: &str);

    fn info(&self, message: &str) {
        self.write(TraceLevel::Info, message);
    }

    fn verbose(&self, message: &str) {
        self.write(TraceLevel::Verbose, message);
    }

    fn warning(&self, message: &str) {
        self.write(TraceLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.write(TraceLevel::Error, message);
    }
}

/// Forwards to the `tracing` crate; verbose maps to `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTraceWriter;

impl TraceWriter for TracingTraceWriter {
    fn write(&self, level: TraceLevel, message: &str) {
        match level {
            TraceLevel::Verbose => tracing::debug!("{}", message),
            TraceLevel::Info => tracing::info!("{}", message),
            TraceLevel::Warning => tracing::warn!("{}", message),
            TraceLevel::Error => tracing::error!("{}", message),
        }
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTraceWriter;

impl TraceWriter for NullTraceWriter {
    fn write(&self, _level: TraceLevel, _message: &str) {}
}

/// Keeps every message in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct CollectingTraceWriter {
    messages: parking_lot::Mutex<Vec<(TraceLevel, String)>>,
}

impl CollectingTraceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(TraceLevel, String)> {
        self.messages.lock().clone()
    }

    /// Messages written at `level`, oldest first.
    pub fn lines_at(&self, level: TraceLevel) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Whether any message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.messages
            .lock()
            .iter()
            .any(|(_, message)| message.contains(needle))
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl TraceWriter for CollectingTraceWriter {
    fn write(&self, level: TraceLevel, message: &str) {
        self.messages.lock().push((level, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collecting_writer_keeps_levels() {
        let writer = CollectingTraceWriter::new();
        writer.info("hello");
        writer.warning("warn");
        writer.error("err");
        writer.verbose("verb");

        assert_eq!(
            writer.messages(),
            vec![
                (TraceLevel::Info, "hello".to_string()),
                (TraceLevel::Warning, "warn".to_string()),
                (TraceLevel::Error, "err".to_string()),
                (TraceLevel::Verbose, "verb".to_string()),
            ]
        );
        assert_eq!(writer.lines_at(TraceLevel::Warning), vec!["warn"]);
        assert!(writer.contains("ell"));

        writer.clear();
        assert!(writer.messages().is_empty());
    }

    #[test]
    fn convenience_methods_route_through_write() {
        struct Levels(parking_lot::Mutex<Vec<TraceLevel>>);
        impl TraceWriter for Levels {
            fn write(&self, level: TraceLevel, _message: &str) {
                self.0.lock().push(level);
            }
        }

        let writer = Levels(parking_lot::Mutex::new(Vec::new()));
        writer.verbose("a");
        writer.info("b");
        writer.error("c");
        assert_eq!(
            *writer.0.lock(),
            vec![TraceLevel::Verbose, TraceLevel::Info, TraceLevel::Error]
        );
    }

    #[test]
    fn level_ordering_and_names() {
        assert!(TraceLevel::Verbose < TraceLevel::Info);
        assert!(TraceLevel::Warning < TraceLevel::Error);
        assert_eq!(TraceLevel::Warning.to_string(), "warning");
    }

    #[test]
    fn null_writer_accepts_everything() {
        let writer = NullTraceWriter;
        writer.info("test");
        writer.verbose("test");
        writer.warning("test");
        writer.error("test");
    }
}
