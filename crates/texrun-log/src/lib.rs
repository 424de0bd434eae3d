//! # texrun-log
//!
//! Streaming parser for the console output of a TeX build toolchain:
//! the typesetting engine, BibTeX, makeindex, and the latexmk orchestrator
//! that runs them in sequence.
//!
//! ## Overview
//!
//! The raw combined stdout/stderr of these tools is a line-oriented
//! protocol with awkward framing: hard wraps at 80 columns, warnings glued
//! to the end of unrelated text, messages spread over several physical
//! lines. This crate turns that stream into a sequence of classified
//! [`Event`](event::Event)s (info / warning / minor-warning / error /
//! fatal), tracks which source file each message belongs to, and counts
//! totals per run.
//!
//! ## Architecture
//!
//! ```text
//! raw lines ──► normalizer chain ──► statements ──► dispatch parser ──► events
//!               (stream module)                     (per-tool pattern       +
//!                                                    tables)            counters
//! ```
//!
//! - [`stream`] repairs the framing: each transformer wraps the previous
//!   one and yields logical statements instead of physical lines.
//! - [`parser`] is the shared dispatch loop: ordered pattern tables, first
//!   match wins, counters and done/fatal flags per parser instance.
//! - [`latex`], [`bibtex`], [`makeindex`] are the tool-specific parsers;
//!   [`latexmk`] recognizes each tool's banner in the orchestrator's
//!   combined output and delegates that span of the *same* stream to the
//!   matching parser, folding the counts back into its own totals.
//!
//! ## Example
//!
//! ```
//! use std::io::Cursor;
//! use texrun_log::{Event, LatexmkParser, LineReader};
//!
//! let console = "This is BibTeX, Version 0.99d\n\
//!                Warning--empty year in knuth84\n\
//!                Latexmk: All targets (main.pdf) are up-to-date\n";
//! let mut source = LineReader::new(Cursor::new(console));
//! let mut events: Vec<Event> = Vec::new();
//! let mut parser = LatexmkParser::new(false, Some("main.tex".to_string()));
//! let outcome = parser.run(&mut source, &mut events);
//! assert_eq!(outcome.warnings, 1);
//! assert_eq!(outcome.errors, 0);
//! ```
//!
//! The parsers never fail on malformed input: every statement is either
//! classified or dropped (surfaced in verbose mode), and a stream that ends
//! before the expected terminal marker is reported as an aborted run, not
//! as a parse error.

pub mod bibtex;
pub mod event;
pub mod latex;
pub mod latexmk;
pub mod makeindex;
pub mod parser;
pub mod stream;


pub use bibtex::BibtexParser;
pub use event::{
    Event, EventSink, Location, MessageClass, ProcessResult, RunOutcome, RunStatus,
};
pub use latex::LatexParser;
pub use latexmk::LatexmkParser;
pub use makeindex::MakeindexParser;
pub use parser::{run_to_completion, ParserState, ToolParser};
pub use stream::{normalize, LineReader, StatementSource};
