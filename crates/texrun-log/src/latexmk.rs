//! Parser for the build orchestrator's console output.
//!
//! The orchestrator interleaves its own progress lines with the full output
//! of every tool it runs. On a tool banner this parser constructs the
//! matching specialized parser, hands it the shared stream cursor, folds
//! the returned counts into its own totals, and resumes scanning where the
//! delegate stopped. `Run number` markers separate successive build
//! attempts; counters reset at each one so the totals reflect the last
//! attempt, not the whole session.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::bibtex::BibtexParser;
use crate::event::{Event, EventSink, RunOutcome};
use crate::latex::LatexParser;
use crate::makeindex::MakeindexParser;
use crate::parser::{run_to_completion, ParserState, ToolParser};
use crate::stream::{SectionSource, StatementSource};

#[derive(Debug, Clone, Copy)]
enum Handler {
    StartLatex,
    StartBibtex,
    AllUpToDate,
    StartMakeindex,
    Progress,
    RunBoundary,
}

static PATTERNS: Lazy<Vec<(Regex, Handler)>> = Lazy::new(|| {
    [
        (
            r"^This is (pdfTeXk|pdfTeX|latex2e|latex|XeTeXk|XeTeX|LuaHBTeX|LuaTeX)",
            Handler::StartLatex,
        ),
        (r"^This is BibTeX", Handler::StartBibtex),
        (
            r"^Latexmk: All targets \(.*?\) are up-to-date",
            Handler::AllUpToDate,
        ),
        (r"^This is makeindex", Handler::StartMakeindex),
        (r"^Latexmk", Handler::Progress),
        (r"^Run number", Handler::RunBoundary),
    ]
    .iter()
    .map(|(pattern, handler)| (Regex::new(pattern).unwrap(), *handler))
    .collect()
});

enum Delegate {
    Latex,
    Bibtex,
    Makeindex,
}

pub struct LatexmkParser {
    state: ParserState,
    root_file: Option<String>,
}

impl LatexmkParser {
    pub fn new(verbose: bool, root_file: Option<String>) -> Self {
        Self {
            state: ParserState::new(verbose),
            root_file,
        }
    }

    /// The orchestrator reads the raw line stream itself; only the latex
    /// delegate applies the normalizer chain to its span.
    pub fn run(&mut self, src: &mut dyn StatementSource, sink: &mut dyn EventSink) -> RunOutcome {
        run_to_completion(self, src, sink)
    }

    /// Runs a sub-parser over the same stream cursor and folds its counts
    /// into the running totals. The delegate keeps the cursor until it sees
    /// its terminal marker, the end of input, or one of the orchestrator's
    /// own markers; a marker that ended the section is processed here
    /// immediately afterwards, so no statement is lost or reordered.
    fn delegate(
        &mut self,
        which: Delegate,
        banner: &str,
        src: &mut dyn StatementSource,
        sink: &mut dyn EventSink,
    ) {
        sink.emit(Event::Remark {
            text: banner.to_string(),
        });
        let mut section = SectionSource::new(&mut *src);
        let outcome = match which {
            Delegate::Latex => {
                let mut sub = LatexParser::new(self.state.verbose, self.root_file.clone());
                sub.run(&mut section, sink)
            }
            Delegate::Bibtex => BibtexParser::new(self.state.verbose).run(&mut section, sink),
            Delegate::Makeindex => MakeindexParser::new(self.state.verbose).run(&mut section, sink),
        };
        log::debug!(
            "delegate finished: {} errors, {} warnings",
            outcome.errors,
            outcome.warnings
        );
        self.state.errors += outcome.errors;
        self.state.warnings += outcome.warnings;
        if let Some(held) = section.into_held() {
            let statement = held.trim_end_matches('\n').to_string();
            self.process(&statement, src, sink);
        }
    }

    /// Run boundary: report the counts accumulated since the previous
    /// boundary, then start the next attempt from zero.
    fn new_run(&mut self, sink: &mut dyn EventSink) {
        if self.state.runs > 0 {
            sink.emit(Event::Remark {
                text: format!(
                    "{} errors, {} warnings in this run.",
                    self.state.errors, self.state.warnings
                ),
            });
        }
        self.state.errors = 0;
        self.state.warnings = 0;
        self.state.runs += 1;
    }
}

impl ToolParser for LatexmkParser {
    fn state(&mut self) -> &mut ParserState {
        &mut self.state
    }

    fn process(
        &mut self,
        statement: &str,
        src: &mut dyn StatementSource,
        sink: &mut dyn EventSink,
    ) {
        for (pattern, handler) in PATTERNS.iter() {
            if !pattern.is_match(statement) {
                continue;
            }
            match handler {
                Handler::StartLatex => self.delegate(Delegate::Latex, statement, src, sink),
                Handler::StartBibtex => self.delegate(Delegate::Bibtex, statement, src, sink),
                Handler::StartMakeindex => {
                    self.delegate(Delegate::Makeindex, statement, src, sink)
                }
                Handler::AllUpToDate => {
                    self.state.info(sink, statement);
                    self.state.mark_done();
                }
                Handler::Progress => self.state.info(sink, statement),
                Handler::RunBoundary => self.new_run(sink),
            }
            return;
        }
        self.state.unclassified(sink, statement);
    }
}
