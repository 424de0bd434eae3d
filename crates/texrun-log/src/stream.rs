//! Statement stream normalization.
//!
//! TeX engines hard-wrap console output at 80 columns, sometimes glue two
//! messages onto one physical line, and spread some warnings over several
//! lines. The transformers here repair those framing quirks so the parsers
//! downstream see one logical statement per read.
//!
//! Every stage wraps an inner source, buffers at most one pending statement,
//! and forwards end-of-input immediately. Statements keep their trailing
//! newline while inside the chain; the dispatch loop strips it.

use std::io::BufRead;

use once_cell::sync::Lazy;
use regex::Regex;

/// A forward-only source of statements. `None` is end-of-input; the chain is
/// not seekable and a statement is never produced twice.
pub trait StatementSource {
    fn next_statement(&mut self) -> Option<String>;
}

impl<S: StatementSource + ?Sized> StatementSource for &mut S {
    fn next_statement(&mut self) -> Option<String> {
        (**self).next_statement()
    }
}

/// Root of every chain: yields raw physical lines, terminator included.
///
/// Read errors are treated as end-of-input. The parsers have no recovery
/// path for a broken pipe, and the supervising layer sees the process exit
/// code anyway.
pub struct LineReader<R> {
    inner: R,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: BufRead> StatementSource for LineReader<R> {
    fn next_statement(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.inner.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line),
            Err(err) => {
                log::warn!("console stream read failed, treating as end of input: {err}");
                None
            }
        }
    }
}

/// Undoes the engine's hard wrap at 80 columns.
///
/// Consecutive physical lines of exactly 80 characters (terminator
/// included, counted in characters, not bytes) are joined with the inner
/// terminators removed. A message whose genuinely last line is exactly 80
/// characters long is indistinguishable from a wrapped one and gets joined
/// with whatever follows; that heuristic comes with the territory.
pub struct Rewrap80<S> {
    inner: S,
}

impl<S: StatementSource> Rewrap80<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: StatementSource> StatementSource for Rewrap80<S> {
    fn next_statement(&mut self) -> Option<String> {
        let mut statement = String::new();
        loop {
            let Some(line) = self.inner.next_statement() else {
                return if statement.is_empty() {
                    None
                } else {
                    Some(statement)
                };
            };
            if line.chars().count() == 80 {
                statement.push_str(line.strip_suffix('\n').unwrap_or(&line));
            } else {
                statement.push_str(&line);
                return Some(statement);
            }
        }
    }
}

static INLINE_INTRODUCER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*[^a-zA-Z])([a-zA-Z]*[Tt]e[Xx] (?:warning|error).*)").unwrap()
});

/// Splits statements the engine forgot to break, e.g.
/// `sometext1234 pdfTeX warning (ext4): destination with the same identifier`.
/// The half after the introducer is buffered for the next read.
pub struct InlineSplit<S> {
    inner: S,
    pending: Option<String>,
}

impl<S: StatementSource> InlineSplit<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            pending: None,
        }
    }
}

impl<S: StatementSource> StatementSource for InlineSplit<S> {
    fn next_statement(&mut self) -> Option<String> {
        if let Some(buffered) = self.pending.take() {
            return Some(buffered);
        }
        let line = self.inner.next_statement()?;
        if let Some(caps) = INLINE_INTRODUCER.captures(&line) {
            let head = caps[1].to_string();
            self.pending = Some(caps[2].to_string());
            return Some(head);
        }
        Some(line)
    }
}

/// Merges multi-line `LaTeX Warning` statements, e.g.
///
/// ```text
/// LaTeX Warning: You have requested package `styles/cases',
///                but the package provides `cases'.
/// ```
///
/// Continuation lines start with two or more spaces and are appended with a
/// single space. The first non-indented line ends the merge and is buffered.
pub struct WarningMerge<S> {
    inner: S,
    pending: Option<String>,
}

impl<S: StatementSource> WarningMerge<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            pending: None,
        }
    }

    fn take_line(&mut self) -> Option<String> {
        match self.pending.take() {
            Some(line) => Some(line),
            None => self.inner.next_statement(),
        }
    }
}

impl<S: StatementSource> StatementSource for WarningMerge<S> {
    fn next_statement(&mut self) -> Option<String> {
        let mut statement = self.take_line()?;
        if !statement.starts_with("LaTeX Warning") {
            return Some(statement);
        }
        loop {
            let Some(line) = self.take_line() else {
                return Some(statement);
            };
            if line.starts_with("  ") {
                statement = format!("{} {}", statement.trim_end_matches('\n'), line.trim_start());
            } else {
                self.pending = Some(line);
                return Some(statement);
            }
        }
    }
}

static PACKAGE_WARNING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Package (\w+) Warning:.*").unwrap());

/// Merges multi-line package warnings, whose continuations repeat the
/// package name in parentheses:
///
/// ```text
/// Package amsmath Warning: Cannot use `split' here;
/// (amsmath)                trying to recover with `aligned'
/// ```
pub struct PackageWarningMerge<S> {
    inner: S,
    pending: Option<String>,
}

impl<S: StatementSource> PackageWarningMerge<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            pending: None,
        }
    }

    fn take_line(&mut self) -> Option<String> {
        match self.pending.take() {
            Some(line) => Some(line),
            None => self.inner.next_statement(),
        }
    }
}

impl<S: StatementSource> StatementSource for PackageWarningMerge<S> {
    fn next_statement(&mut self) -> Option<String> {
        let mut statement = self.take_line()?;
        let tag = match PACKAGE_WARNING.captures(&statement) {
            Some(caps) => format!("({})", &caps[1]),
            None => return Some(statement),
        };
        loop {
            let Some(line) = self.take_line() else {
                return Some(statement);
            };
            if let Some(rest) = line.strip_prefix(&tag) {
                statement = format!("{} {}", statement.trim_end_matches('\n'), rest.trim_start());
            } else {
                self.pending = Some(line);
                return Some(statement);
            }
        }
    }
}

/// The full chain in its required order: rewrap, inline split, warning
/// merge, package-warning merge.
pub fn normalize<S: StatementSource>(
    source: S,
) -> PackageWarningMerge<WarningMerge<InlineSplit<Rewrap80<S>>>> {
    PackageWarningMerge::new(WarningMerge::new(InlineSplit::new(Rewrap80::new(source))))
}

static SECTION_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(Latexmk|Run number|This is )").unwrap());

/// View of a shared stream handed to a delegated sub-parser.
///
/// The orchestrator and its sub-parsers read the same underlying cursor;
/// only one of them holds it at a time. A sub-parser without a terminal
/// marker (or one whose terminal marker never arrives) must still hand
/// control back when the orchestrator's own markers or the next tool banner
/// appear, so this wrapper presents such a statement as end-of-input and
/// holds it for the delegator. Nothing is lost or duplicated: the held
/// statement is processed by the delegator right after the delegate
/// returns.
pub struct SectionSource<'a> {
    inner: &'a mut dyn StatementSource,
    held: Option<String>,
}

impl<'a> SectionSource<'a> {
    pub fn new(inner: &'a mut dyn StatementSource) -> Self {
        Self { inner, held: None }
    }

    /// The boundary statement that ended the section, if any.
    pub fn into_held(self) -> Option<String> {
        self.held
    }
}

impl StatementSource for SectionSource<'_> {
    fn next_statement(&mut self) -> Option<String> {
        if self.held.is_some() {
            return None;
        }
        let line = self.inner.next_statement()?;
        if SECTION_BOUNDARY.is_match(&line) {
            self.held = Some(line);
            return None;
        }
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn raw(input: &str) -> LineReader<Cursor<Vec<u8>>> {
        LineReader::new(Cursor::new(input.as_bytes().to_vec()))
    }

    fn collect<S: StatementSource>(mut src: S) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(statement) = src.next_statement() {
            out.push(statement);
        }
        out
    }

    #[test]
    fn rewrap_joins_exact_80_char_lines() {
        let wrapped = format!("{}\n", "a".repeat(79));
        assert_eq!(wrapped.chars().count(), 80);
        let input = format!("{wrapped}tail\nshort\n");
        let statements = collect(Rewrap80::new(raw(&input)));
        assert_eq!(statements, vec![format!("{}tail\n", "a".repeat(79)), "short\n".to_string()]);
    }

    #[test]
    fn rewrap_counts_characters_not_bytes() {
        // 79 two-byte characters plus the newline: 80 chars, 159 bytes.
        let wrapped = format!("{}\n", "é".repeat(79));
        assert_eq!(wrapped.chars().count(), 80);
        let input = format!("{wrapped}tail\n");
        let statements = collect(Rewrap80::new(raw(&input)));
        assert_eq!(statements.len(), 1);
        assert!(statements[0].ends_with("tail\n"));
    }

    #[test]
    fn rewrap_leaves_short_lines_alone() {
        let input = "one\ntwo\nthree\n";
        let statements = collect(Rewrap80::new(raw(input)));
        assert_eq!(statements, vec!["one\n", "two\n", "three\n"]);
    }

    #[test]
    fn rewrap_flushes_partial_join_at_eof() {
        let input = format!("{}\n", "a".repeat(79));
        let statements = collect(Rewrap80::new(raw(&input)));
        assert_eq!(statements, vec!["a".repeat(79)]);
    }

    #[test]
    fn inline_split_buffers_second_half() {
        let input = "sometext1234 pdfTeX warning (ext4): duplicate destination\n";
        let statements = collect(InlineSplit::new(raw(input)));
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "sometext1234 ");
        assert_eq!(
            statements[1],
            "pdfTeX warning (ext4): duplicate destination"
        );
    }

    #[test]
    fn inline_split_passes_clean_lines() {
        let input = "pdfTeX warning: already first on the line\n";
        let statements = collect(InlineSplit::new(raw(input)));
        assert_eq!(statements, vec![input.to_string()]);
    }

    #[test]
    fn warning_merge_joins_indented_continuations() {
        let input = "LaTeX Warning: You have requested package `a',\n               but the package provides `b'.\nNext line\n";
        let statements = collect(WarningMerge::new(raw(input)));
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0].trim_end(),
            "LaTeX Warning: You have requested package `a', but the package provides `b'."
        );
        assert_eq!(statements[1], "Next line\n");
    }

    #[test]
    fn warning_merge_stops_at_eof() {
        let input = "LaTeX Warning: dangling,\n   continued to the end\n";
        let statements = collect(WarningMerge::new(raw(input)));
        assert_eq!(statements.len(), 1);
        assert!(statements[0].contains("continued to the end"));
    }

    #[test]
    fn package_warning_merge_strips_name_prefix() {
        let input = "Package amsmath Warning: Cannot use `split' here;\n(amsmath)                trying to recover with `aligned'\ndone\n";
        let statements = collect(PackageWarningMerge::new(raw(input)));
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0].trim_end(),
            "Package amsmath Warning: Cannot use `split' here; trying to recover with `aligned'"
        );
        assert_eq!(statements[1], "done\n");
    }

    #[test]
    fn package_warning_merge_ignores_other_packages() {
        let input = "Package amsmath Warning: Cannot use `split' here;\n(hyperref) unrelated\n";
        let statements = collect(PackageWarningMerge::new(raw(input)));
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1], "(hyperref) unrelated\n");
    }

    #[test]
    fn normalize_is_identity_on_plain_streams() {
        let input = "first line\nsecond line\nthird line\n";
        let statements = collect(normalize(raw(input)));
        assert_eq!(statements, vec!["first line\n", "second line\n", "third line\n"]);
    }

    #[test]
    fn normalize_forwards_eof_immediately() {
        let mut chain = normalize(raw(""));
        assert!(chain.next_statement().is_none());
        assert!(chain.next_statement().is_none());
    }

    #[test]
    fn section_source_holds_boundary_statement() {
        let mut src = raw("Database file #1: refs.bib\nLatexmk: applying rule\n");
        let mut section = SectionSource::new(&mut src);
        assert_eq!(
            section.next_statement().as_deref(),
            Some("Database file #1: refs.bib\n")
        );
        assert!(section.next_statement().is_none());
        assert!(section.next_statement().is_none());
        assert_eq!(
            section.into_held().as_deref(),
            Some("Latexmk: applying rule\n")
        );
    }
}
