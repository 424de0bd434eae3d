//! Parser for the index processor's console output.
//!
//! One message matters here: the missing input file. It usually means the
//! document never requested an index, so the error carries a remediation
//! hint. Everything else is surfaced only in verbose mode. There is no
//! terminal marker; the parser runs until its view of the stream ends.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::event::{Event, EventSink, RunOutcome};
use crate::parser::{run_to_completion, ParserState, ToolParser};
use crate::stream::StatementSource;

static MISSING_INPUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Input index file (.*) not found").unwrap());

const MISSING_INPUT_HINT: &str = "Make sure the document loads the makeidx package \
(\\usepackage{makeidx} \\makeindex) and run latex before running makeindex.";

pub struct MakeindexParser {
    state: ParserState,
}

impl MakeindexParser {
    pub fn new(verbose: bool) -> Self {
        Self {
            state: ParserState::new(verbose),
        }
    }

    pub fn run(&mut self, src: &mut dyn StatementSource, sink: &mut dyn EventSink) -> RunOutcome {
        run_to_completion(self, src, sink)
    }
}

impl ToolParser for MakeindexParser {
    fn state(&mut self) -> &mut ParserState {
        &mut self.state
    }

    fn process(
        &mut self,
        statement: &str,
        _src: &mut dyn StatementSource,
        sink: &mut dyn EventSink,
    ) {
        if MISSING_INPUT.is_match(statement) {
            self.state.error(sink, statement);
            sink.emit(Event::Remark {
                text: MISSING_INPUT_HINT.to_string(),
            });
        } else {
            self.state.unclassified(sink, statement);
        }
    }
}
