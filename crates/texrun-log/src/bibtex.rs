//! Parser for the bibliography processor's console output.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::event::{EventSink, Location, RunOutcome};
use crate::parser::{run_to_completion, ParserState, ToolParser};
use crate::stream::StatementSource;

#[derive(Debug, Clone, Copy)]
enum Handler {
    PlainWarning,
    FileLineRef,
    Error,
    Banner,
    Separator,
}

static PATTERNS: Lazy<Vec<(Regex, Handler)>> = Lazy::new(|| {
    [
        (r"^Warning--(.*)", Handler::PlainWarning),
        (r"^--line (\d+) of file (.*)", Handler::FileLineRef),
        (r"^I found no \\\w+ command", Handler::PlainWarning),
        (r"^I couldn't open style file", Handler::Error),
        (r"^I couldn't open \w+ file", Handler::Error),
        (r"^This is BibTeX", Handler::Banner),
        (r"^The style", Handler::Banner),
        (r"^Database", Handler::Banner),
        (r"^---", Handler::Separator),
    ]
    .iter()
    .map(|(pattern, handler)| (Regex::new(pattern).unwrap(), *handler))
    .collect()
});

pub struct BibtexParser {
    state: ParserState,
}

impl BibtexParser {
    pub fn new(verbose: bool) -> Self {
        Self {
            state: ParserState::new(verbose),
        }
    }

    /// Bibliography output needs no line-wrap repair; the raw stream is
    /// consumed as-is.
    pub fn run(&mut self, src: &mut dyn StatementSource, sink: &mut dyn EventSink) -> RunOutcome {
        run_to_completion(self, src, sink)
    }
}

impl ToolParser for BibtexParser {
    fn state(&mut self) -> &mut ParserState {
        &mut self.state
    }

    fn process(
        &mut self,
        statement: &str,
        _src: &mut dyn StatementSource,
        sink: &mut dyn EventSink,
    ) {
        for (pattern, handler) in PATTERNS.iter() {
            let Some(caps) = pattern.captures(statement) else {
                continue;
            };
            match handler {
                Handler::PlainWarning => self.state.warning(sink, statement),
                Handler::FileLineRef => {
                    // `--line 42 of file refs.bib`: continuation of the
                    // warning right above it, but carrying the location.
                    let location = Location::new(&caps[2], caps[1].parse().unwrap_or(0));
                    self.state.warning_at(sink, statement, Some(location));
                }
                Handler::Error => self.state.error(sink, statement),
                Handler::Banner => self.state.info(sink, statement),
                Handler::Separator => self.state.mark_done(),
            }
            return;
        }
        self.state.unclassified(sink, statement);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, MessageClass, RunStatus};
    use crate::stream::LineReader;
    use std::io::Cursor;

    fn run(input: &str) -> (RunOutcome, Vec<Event>) {
        let mut parser = BibtexParser::new(false);
        let mut src = LineReader::new(Cursor::new(input.as_bytes().to_vec()));
        let mut events = Vec::new();
        let outcome = parser.run(&mut src, &mut events);
        (outcome, events)
    }

    #[test]
    fn classifies_typical_run() {
        let input = "This is BibTeX, Version 0.99d\nThe style file: plain.bst\nDatabase file #1: refs.bib\nWarning--empty journal in knuth84\n---\n";
        let (outcome, events) = run(input);
        assert_eq!(outcome.status, RunStatus::Done);
        assert_eq!(outcome.warnings, 1);
        assert_eq!(outcome.errors, 0);
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn file_line_reference_carries_location() {
        let input = "--line 42 of file refs.bib\n---\n";
        let (outcome, events) = run(input);
        assert_eq!(outcome.warnings, 1);
        if let Event::Message {
            class, location, ..
        } = &events[0]
        {
            assert_eq!(*class, MessageClass::Warning);
            let location = location.as_ref().unwrap();
            assert_eq!(location.file, "refs.bib");
            assert_eq!(location.line, 42);
        } else {
            panic!("expected a located warning");
        }
    }

    #[test]
    fn open_failures_are_errors() {
        let input = "I couldn't open style file fancy.bst\nI couldn't open database file refs.bib\n---\n";
        let (outcome, _) = run(input);
        assert_eq!(outcome.errors, 2);
    }

    #[test]
    fn missing_separator_aborts() {
        let (outcome, _) = run("This is BibTeX, Version 0.99d\n");
        assert_eq!(outcome.status, RunStatus::Aborted);
    }
}
