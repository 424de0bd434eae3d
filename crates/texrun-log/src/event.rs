use serde::{Deserialize, Serialize};

/// Classification of a console message.
///
/// `MinorWarning` covers the overfull/underfull box notices: they are shown
/// to the user but do not count towards the warning total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageClass {
    Info,
    Warning,
    MinorWarning,
    Error,
    Fatal,
}

/// A navigable source location resolved for a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// One event produced while parsing a toolchain console stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Event {
    /// A classified message, with a location when one could be resolved.
    Message {
        class: MessageClass,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
    },
    /// The active source file changed because a new file was opened.
    FileEnter { file: String },
    /// The active source file changed because a nested file was closed.
    FileResume { file: String },
    /// Auxiliary text attached to the surrounding messages: section banners,
    /// remediation hints, per-run count reports.
    Remark { text: String },
}

impl Event {
    pub fn message(class: MessageClass, text: impl Into<String>) -> Self {
        Event::Message {
            class,
            text: text.into(),
            location: None,
        }
    }

    pub fn located(class: MessageClass, text: impl Into<String>, location: Location) -> Self {
        Event::Message {
            class,
            text: text.into(),
            location: Some(location),
        }
    }
}

/// Receiver for parser events. The parsers push events in source order;
/// rendering is the caller's concern.
pub trait EventSink {
    fn emit(&mut self, event: Event);
}

/// Collecting sink, mostly for tests and batch consumers.
impl EventSink for Vec<Event> {
    fn emit(&mut self, event: Event) {
        self.push(event);
    }
}

/// State of a parser's pull loop.
///
/// `Aborted` means the stream ended before the parser saw its terminal
/// marker: the producing process died or was killed. It is deliberately
/// distinct from `Done` so callers can attribute the failure to the process
/// rather than to document-content errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Done,
    Aborted,
}

/// Result of running a parser over a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub fatal: bool,
    pub errors: u32,
    pub warnings: u32,
    pub runs: u32,
}

impl RunOutcome {
    /// True when the run completed normally with nothing to report.
    pub fn clean(&self) -> bool {
        self.status == RunStatus::Done && !self.fatal && self.errors == 0
    }
}

/// Aggregate handed back to the orchestration layer once the producing
/// process has been reaped. Exit and signal codes come from the process
/// supervisor; the counters come from the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub errors: u32,
    pub warnings: u32,
    pub runs: u32,
    pub fatal: bool,
}

impl ProcessResult {
    pub fn from_outcome(outcome: RunOutcome, exit_code: Option<i32>, signal: Option<i32>) -> Self {
        Self {
            exit_code,
            signal,
            errors: outcome.errors,
            warnings: outcome.warnings,
            runs: outcome.runs,
            fatal: outcome.fatal,
        }
    }

    /// A fatal stop marker fails the run regardless of the exit code.
    pub fn success(&self) -> bool {
        !self.fatal
            && self.signal.unwrap_or(0) == 0
            && self.exit_code.unwrap_or(0) == 0
            && self.errors == 0
    }
}
