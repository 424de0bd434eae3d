//! Base dispatch machinery shared by the tool-specific parsers.
//!
//! Every parser is a pattern table plus a handful of counters. A statement
//! is matched against the table in declared order, first match wins, and
//! the matching handler updates counters and emits events. Unmatched
//! statements surface only in verbose mode. Malformed input never fails the
//! parser; the only way a run ends early is the stream ending.

use crate::event::{Event, EventSink, Location, MessageClass, RunOutcome, RunStatus};
use crate::stream::StatementSource;

/// Counters and flags owned by a single parser instance.
#[derive(Debug)]
pub struct ParserState {
    pub status: RunStatus,
    pub fatal: bool,
    pub errors: u32,
    pub warnings: u32,
    pub runs: u32,
    pub verbose: bool,
}

impl ParserState {
    pub fn new(verbose: bool) -> Self {
        Self {
            status: RunStatus::Running,
            fatal: false,
            errors: 0,
            warnings: 0,
            runs: 0,
            verbose,
        }
    }

    /// The terminal marker was seen; no further statements are dispatched.
    pub fn mark_done(&mut self) {
        self.status = RunStatus::Done;
    }

    /// Closes the books on a run. A session with at least one attempt is
    /// implied even when no explicit run marker appeared.
    pub fn finish(&mut self) -> RunOutcome {
        if self.runs == 0 {
            self.runs = 1;
        }
        RunOutcome {
            status: self.status,
            fatal: self.fatal,
            errors: self.errors,
            warnings: self.warnings,
            runs: self.runs,
        }
    }

    pub fn info(&mut self, sink: &mut dyn EventSink, text: &str) {
        sink.emit(Event::message(MessageClass::Info, text));
    }

    pub fn warning(&mut self, sink: &mut dyn EventSink, text: &str) {
        self.warning_at(sink, text, None);
    }

    pub fn warning_at(&mut self, sink: &mut dyn EventSink, text: &str, location: Option<Location>) {
        self.warnings += 1;
        sink.emit(Event::Message {
            class: MessageClass::Warning,
            text: text.to_string(),
            location,
        });
    }

    /// Box notices and the like: displayed, never counted.
    pub fn minor_warning(&mut self, sink: &mut dyn EventSink, text: &str) {
        sink.emit(Event::message(MessageClass::MinorWarning, text));
    }

    pub fn error(&mut self, sink: &mut dyn EventSink, text: &str) {
        self.error_at(sink, text, None);
    }

    pub fn error_at(&mut self, sink: &mut dyn EventSink, text: &str, location: Option<Location>) {
        self.errors += 1;
        sink.emit(Event::Message {
            class: MessageClass::Error,
            text: text.to_string(),
            location,
        });
    }

    /// An explicit stop marker from the tool. The whole run is failed, but
    /// parsing continues so trailing output is still classified.
    pub fn fatal_error(&mut self, sink: &mut dyn EventSink, text: &str) {
        self.fatal = true;
        sink.emit(Event::message(MessageClass::Fatal, text));
    }

    pub fn unclassified(&mut self, sink: &mut dyn EventSink, text: &str) {
        if self.verbose {
            sink.emit(Event::message(MessageClass::Info, text));
        }
    }
}

/// One tool-specific parser: a pattern table over a statement stream.
///
/// Implementations own their counters and table exclusively; the statement
/// source is borrowed per call so nested parsers can share one cursor.
pub trait ToolParser {
    fn state(&mut self) -> &mut ParserState;

    /// Dispatches one statement through the pattern table. The source is
    /// available so handlers can read ahead or delegate a span of the same
    /// stream to another parser.
    fn process(
        &mut self,
        statement: &str,
        src: &mut dyn StatementSource,
        sink: &mut dyn EventSink,
    );

    /// Invoked when the stream ends before the terminal marker was seen.
    fn abnormal_termination(&mut self, sink: &mut dyn EventSink) {
        let _ = sink;
    }
}

/// The pull loop: reads statements and dispatches them until the parser is
/// done or the stream ends. Statements are dispatched strictly in arrival
/// order; trailing newlines are stripped before dispatch.
pub fn run_to_completion<P: ToolParser + ?Sized>(
    parser: &mut P,
    src: &mut dyn StatementSource,
    sink: &mut dyn EventSink,
) -> RunOutcome {
    while parser.state().status == RunStatus::Running {
        match src.next_statement() {
            Some(raw) => {
                let statement = raw.trim_end_matches('\n');
                parser.process(statement, src, sink);
            }
            None => {
                parser.state().status = RunStatus::Aborted;
                parser.abnormal_termination(sink);
            }
        }
    }
    parser.state().finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::LineReader;
    use std::io::Cursor;

    struct CountingParser {
        state: ParserState,
    }

    impl ToolParser for CountingParser {
        fn state(&mut self) -> &mut ParserState {
            &mut self.state
        }

        fn process(
            &mut self,
            statement: &str,
            _src: &mut dyn StatementSource,
            sink: &mut dyn EventSink,
        ) {
            if statement.starts_with("warn") {
                self.state.warning(sink, statement);
            } else if statement.starts_with("err") {
                self.state.error(sink, statement);
            } else if statement == "stop" {
                self.state.mark_done();
            }
        }
    }

    fn run(input: &str) -> (RunOutcome, Vec<Event>) {
        let mut parser = CountingParser {
            state: ParserState::new(false),
        };
        let mut src = LineReader::new(Cursor::new(input.as_bytes().to_vec()));
        let mut events = Vec::new();
        let outcome = run_to_completion(&mut parser, &mut src, &mut events);
        (outcome, events)
    }

    #[test]
    fn counts_match_dispatched_handlers() {
        let (outcome, events) = run("warn one\nerr one\nwarn two\nstop\n");
        assert_eq!(outcome.errors, 1);
        assert_eq!(outcome.warnings, 2);
        assert_eq!(outcome.status, RunStatus::Done);
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn eof_without_terminal_marker_aborts() {
        let (outcome, _) = run("warn one\n");
        assert_eq!(outcome.status, RunStatus::Aborted);
        assert_eq!(outcome.warnings, 1);
    }

    #[test]
    fn runs_default_to_one() {
        let (outcome, _) = run("stop\n");
        assert_eq!(outcome.runs, 1);
    }

    #[test]
    fn nothing_dispatched_after_done() {
        let (outcome, _) = run("stop\nerr after stop\n");
        assert_eq!(outcome.errors, 0);
        assert_eq!(outcome.status, RunStatus::Done);
    }
}
