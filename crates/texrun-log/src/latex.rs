//! Parser for the typesetting engine's console output (latex, pdflatex,
//! xelatex and friends).
//!
//! On top of the shared dispatch machinery this parser tracks the engine's
//! file-inclusion chatter: every statement is scanned for `(file` and `)`
//! markers before pattern dispatch, and the "active" file is the topmost
//! stack entry with a tracked extension. Warnings that only carry an input
//! line number are resolved against the active file.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::event::{Event, EventSink, Location, MessageClass, RunOutcome};
use crate::parser::{run_to_completion, ParserState, ToolParser};
use crate::stream::{normalize, StatementSource};

#[derive(Debug, Clone, Copy)]
enum Handler {
    Banner,
    Include,
    OutputWritten,
    LineWarning,
    PlainWarning,
    FileLineWarning,
    BoxNotice,
    FileLineError,
    Transcript,
    PdfLatexError,
    OldStyle,
    FatalMarker,
}

/// Priority order is deliberate: located warnings before generic ones,
/// `file:line:` errors before the old-style `!` fallback.
static PATTERNS: Lazy<Vec<(Regex, Handler)>> = Lazy::new(|| {
    [
        (r"^This is", Handler::Banner),
        (r"^Document Class", Handler::Banner),
        (r"^.*<use (.*?)>", Handler::Include),
        (r"^Output written on (.*) (\(.*\))", Handler::OutputWritten),
        (r"^LaTeX Warning:.*?input line (\d+)(\.|$)", Handler::LineWarning),
        (
            r"^Package \w+ Warning:.*?input line (\d+)(\.|$)",
            Handler::LineWarning,
        ),
        (r"^LaTeX Warning:.*", Handler::PlainWarning),
        (r"^Package \w+ Warning:.*", Handler::PlainWarning),
        (
            r"^([^:]*):(\d+):\s+(pdfTeX warning.*)",
            Handler::FileLineWarning,
        ),
        (r"^.*pdfTeX warning.*", Handler::PlainWarning),
        (r"^LaTeX Font Warning:.*", Handler::PlainWarning),
        (r"^Overfull.*wide", Handler::BoxNotice),
        (r"^Underfull.*badness", Handler::BoxNotice),
        (r"^([^:]*):(\d+): LaTeX Error:(.*)", Handler::FileLineError),
        (r"^([^:]*):(\d+): (Emergency stop)", Handler::FileLineError),
        (r"^.*?([^:]+\.\w+):(\d+):\s+(.*)", Handler::FileLineError),
        (r"^Transcript written on (.*)\.$", Handler::Transcript),
        (r"^Error: pdflatex", Handler::PdfLatexError),
        (r"^!.*", Handler::OldStyle),
        (r"^\s+==>", Handler::FatalMarker),
    ]
    .iter()
    .map(|(pattern, handler)| (Regex::new(pattern).unwrap(), *handler))
    .collect()
});

/// Matches `(filename` and `)` markers inside a statement. The engine also
/// parenthesizes plenty of non-file text; filtering happens by extension
/// when the active file is computed, not here.
static FILE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"([()])([\w/.\-]*)").unwrap());

static FATAL_FOLLOWUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ ==> Fatal error occurred").unwrap());

static ERROR_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[Ee]rror").unwrap());

pub struct LatexParser {
    state: ParserState,
    file_stack: Vec<String>,
    current_file: String,
    tracked_exts: Vec<String>,
    root_file: Option<String>,
    output_file: Option<String>,
}

impl LatexParser {
    /// `root_file` seeds the file stack so line-only warnings printed before
    /// the first open marker still resolve, and its extension joins the
    /// tracked set (the default is just `tex`).
    pub fn new(verbose: bool, root_file: Option<String>) -> Self {
        let mut tracked_exts = vec!["tex".to_string()];
        if let Some(ext) = root_file.as_deref().and_then(extension) {
            if !tracked_exts.iter().any(|e| e == ext) {
                tracked_exts.push(ext.to_string());
            }
        }
        let file_stack = root_file.iter().cloned().collect();
        let mut parser = Self {
            state: ParserState::new(verbose),
            file_stack,
            current_file: String::new(),
            tracked_exts,
            root_file,
            output_file: None,
        };
        // Locations reported before the first open marker resolve against
        // the seeded root file.
        parser.current_file = parser.active_file();
        parser
    }

    /// Runs over the raw line stream, wrapped in the full normalizer chain.
    pub fn run(&mut self, src: &mut dyn StatementSource, sink: &mut dyn EventSink) -> RunOutcome {
        let mut statements = normalize(&mut *src);
        run_to_completion(self, &mut statements, sink)
    }

    /// The artifact named by the engine's `Output written on ...` line.
    pub fn output_file(&self) -> Option<&str> {
        self.output_file.as_deref()
    }

    /// Topmost stack entry with a tracked extension. The stack holds plenty
    /// of style/class/config files that never become the active file.
    fn active_file(&self) -> String {
        self.file_stack
            .iter()
            .rev()
            .find(|name| {
                extension(name).is_some_and(|ext| self.tracked_exts.iter().any(|e| e == ext))
            })
            .cloned()
            .unwrap_or_default()
    }

    /// Maintains the file stack from the open/close markers in a statement.
    /// The engine's output is not guaranteed to be well nested; a close
    /// marker on an empty stack is ignored.
    fn track_files(&mut self, statement: &str, sink: &mut dyn EventSink) {
        for caps in FILE_MARKER.captures_iter(statement) {
            let entering = &caps[1] == "(";
            if entering {
                self.file_stack.push(caps[2].to_string());
            } else if self.file_stack.pop().is_none() {
                continue;
            }
            let active = self.active_file();
            if active != self.current_file {
                log::debug!("active file changed to {active:?}");
                if entering {
                    sink.emit(Event::FileEnter {
                        file: active.clone(),
                    });
                } else {
                    sink.emit(Event::FileResume {
                        file: active.clone(),
                    });
                }
                self.current_file = active;
            }
        }
    }

    fn resolved_location(&self, line: u32) -> Option<Location> {
        if self.current_file.is_empty() {
            None
        } else {
            Some(Location::new(self.current_file.clone(), line))
        }
    }

    fn handle(
        &mut self,
        handler: Handler,
        caps: &regex::Captures,
        statement: &str,
        src: &mut dyn StatementSource,
        sink: &mut dyn EventSink,
    ) {
        match handler {
            Handler::Banner => self.state.info(sink, statement),
            Handler::Include => {
                let text = format!("Including: {}", &caps[1]);
                self.state.info(sink, &text);
            }
            Handler::OutputWritten => {
                self.output_file = Some(caps[1].trim_matches('"').to_string());
                self.state.info(sink, statement);
            }
            Handler::LineWarning => {
                let line = caps[1].parse().unwrap_or(0);
                let location = self.resolved_location(line);
                self.state.warning_at(sink, statement, location);
            }
            Handler::PlainWarning => self.state.warning(sink, statement),
            Handler::FileLineWarning => {
                let location = Location::new(&caps[1], caps[2].parse().unwrap_or(0));
                self.state.warning_at(sink, &caps[3], Some(location));
            }
            Handler::BoxNotice => self.state.minor_warning(sink, statement),
            Handler::FileLineError => {
                let location = Location::new(&caps[1], caps[2].parse().unwrap_or(0));
                self.state.error_at(sink, statement, Some(location));
            }
            Handler::Transcript => {
                let transcript = caps[1].trim_matches('"').to_string();
                let location = Location::new(transcript.clone(), 1);
                sink.emit(Event::located(
                    MessageClass::Info,
                    format!("Complete transcript is in {transcript}"),
                    location,
                ));
                self.state.mark_done();
            }
            Handler::PdfLatexError => {
                // Two-statement form: the fatal-stop marker, when present,
                // is on the very next statement.
                self.state.error(sink, statement);
                if let Some(next) = src.next_statement() {
                    let next = next.trim_end_matches('\n');
                    if FATAL_FOLLOWUP.is_match(next) {
                        self.state.fatal_error(sink, next);
                    }
                }
            }
            Handler::OldStyle => {
                if ERROR_WORD.is_match(statement) {
                    self.state.error(sink, statement);
                } else {
                    self.state.warning(sink, statement);
                }
            }
            Handler::FatalMarker => self.state.fatal_error(sink, statement),
        }
    }
}

impl ToolParser for LatexParser {
    fn state(&mut self) -> &mut ParserState {
        &mut self.state
    }

    fn process(
        &mut self,
        statement: &str,
        src: &mut dyn StatementSource,
        sink: &mut dyn EventSink,
    ) {
        self.track_files(statement, sink);
        for (pattern, handler) in PATTERNS.iter() {
            if let Some(caps) = pattern.captures(statement) {
                self.handle(*handler, &caps, statement, src, sink);
                return;
            }
        }
        self.state.unclassified(sink, statement);
    }

    /// The engine died or was killed before `Transcript written` appeared.
    /// Reported as a message, not as a counted error, so the caller can
    /// attribute it to process failure rather than document content.
    fn abnormal_termination(&mut self, sink: &mut dyn EventSink) {
        match self.root_file.as_deref() {
            Some(name) => {
                let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
                let transcript = format!("{stem}.log");
                sink.emit(Event::located(
                    MessageClass::Error,
                    format!("Typesetting ended prematurely; the transcript is in {transcript}"),
                    Location::new(transcript.clone(), 1),
                ));
            }
            None => sink.emit(Event::message(
                MessageClass::Error,
                "Typesetting ended prematurely",
            )),
        }
    }
}

fn extension(name: &str) -> Option<&str> {
    std::path::Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RunStatus;
    use crate::stream::LineReader;
    use std::io::Cursor;

    fn run(input: &str, root: Option<&str>) -> (RunOutcome, Vec<Event>) {
        let mut parser = LatexParser::new(false, root.map(str::to_string));
        let mut src = LineReader::new(Cursor::new(input.as_bytes().to_vec()));
        let mut events = Vec::new();
        let outcome = parser.run(&mut src, &mut events);
        (outcome, events)
    }

    #[test]
    fn active_file_skips_style_files() {
        let input = "(./main.tex (./preamble.sty\nLaTeX Warning: Reference `x' undefined on input line 4.\n";
        let (_, events) = run(input, None);
        assert_eq!(
            events[0],
            Event::FileEnter {
                file: "./main.tex".into()
            }
        );
        // The .sty push must not change the active file.
        let warning = events
            .iter()
            .find(|e| matches!(e, Event::Message { class, .. } if *class == MessageClass::Warning))
            .unwrap();
        if let Event::Message { location, .. } = warning {
            assert_eq!(location.as_ref().unwrap().file, "./main.tex");
        }
    }

    #[test]
    fn close_marker_on_empty_stack_is_ignored() {
        let (outcome, events) = run(")))\nTranscript written on main.log.\n", None);
        assert_eq!(outcome.status, RunStatus::Done);
        assert!(!events
            .iter()
            .any(|e| matches!(e, Event::FileResume { .. })));
    }

    #[test]
    fn old_style_bang_classification() {
        let (outcome, _) = run("! Undefined control sequence.\n! This is an error message.\n", None);
        // First has no "error" substring, second does.
        assert_eq!(outcome.warnings, 1);
        assert_eq!(outcome.errors, 1);
    }

    #[test]
    fn box_notices_do_not_count() {
        let input = "Overfull \\hbox (10.1pt too wide) in paragraph\nUnderfull \\vbox (badness 10000) detected\n";
        let (outcome, events) = run(input, None);
        assert_eq!(outcome.warnings, 0);
        assert_eq!(outcome.errors, 0);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(
                    e,
                    Event::Message { class, .. } if *class == MessageClass::MinorWarning
                ))
                .count(),
            2
        );
    }

    #[test]
    fn seeded_root_resolves_early_warnings() {
        let input = "LaTeX Warning: Citation `k' undefined on input line 9.\n";
        let (_, events) = run(input, Some("thesis.ltx"));
        if let Event::Message { location, .. } = &events[0] {
            let location = location.as_ref().unwrap();
            assert_eq!(location.file, "thesis.ltx");
            assert_eq!(location.line, 9);
        } else {
            panic!("expected a warning message");
        }
    }
}
