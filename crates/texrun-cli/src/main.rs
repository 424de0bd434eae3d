use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use texrun_log::{
    BibtexParser, Event, EventSink, LatexParser, LatexmkParser, LineReader, MakeindexParser,
    MessageClass, ProcessResult, RunOutcome, RunStatus,
};

#[derive(Parser)]
#[command(name = "texrun")]
#[command(about = "Parse TeX toolchain console output into classified events", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a captured console stream ("-" for stdin)
    Parse {
        /// Path to the captured combined stdout/stderr
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Which tool produced the stream
        #[arg(long, value_enum, default_value_t = Tool::Latexmk)]
        tool: Tool,

        /// Root document name, used to seed the file tracker
        #[arg(long)]
        root_file: Option<String>,

        /// Surface unclassified statements instead of dropping them
        #[arg(long)]
        verbose: bool,

        /// Emit events as JSON lines instead of plain text
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Tool {
    Latexmk,
    Latex,
    Bibtex,
    Makeindex,
}

/// Renders events as plain text, one per line, with `file:line` prefixes
/// where a location was resolved.
struct TextSink;

impl EventSink for TextSink {
    fn emit(&mut self, event: Event) {
        match event {
            Event::Message {
                class,
                text,
                location,
            } => {
                let tag = match class {
                    MessageClass::Info => "",
                    MessageClass::Warning => "warning: ",
                    MessageClass::MinorWarning => "notice: ",
                    MessageClass::Error => "error: ",
                    MessageClass::Fatal => "fatal: ",
                };
                match location {
                    Some(location) => {
                        println!("{}:{}: {tag}{text}", location.file, location.line)
                    }
                    None => println!("{tag}{text}"),
                }
            }
            Event::FileEnter { file } => println!("Processing: {file}"),
            Event::FileResume { file } => println!("Resuming: {file}"),
            Event::Remark { text } => println!("{text}"),
        }
    }
}

/// Renders events as one JSON object per line.
struct JsonSink;

impl EventSink for JsonSink {
    fn emit(&mut self, event: Event) {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(err) => eprintln!("failed to serialize event: {err}"),
        }
    }
}

fn open_input(path: &PathBuf) -> Result<Box<dyn BufRead>> {
    if path.as_os_str() == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

fn run_tool(
    tool: Tool,
    root_file: Option<String>,
    verbose: bool,
    input: Box<dyn BufRead>,
    sink: &mut dyn EventSink,
) -> RunOutcome {
    let mut source = LineReader::new(input);
    match tool {
        Tool::Latexmk => LatexmkParser::new(verbose, root_file).run(&mut source, sink),
        Tool::Latex => LatexParser::new(verbose, root_file).run(&mut source, sink),
        Tool::Bibtex => BibtexParser::new(verbose).run(&mut source, sink),
        Tool::Makeindex => MakeindexParser::new(verbose).run(&mut source, sink),
    }
}

fn main() -> Result<ExitCode> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Parse {
            path,
            tool,
            root_file,
            verbose,
            json,
        } => {
            let input = open_input(&path)?;
            let mut sink: Box<dyn EventSink> = if json {
                Box::new(JsonSink)
            } else {
                Box::new(TextSink)
            };
            let outcome = run_tool(tool, root_file, verbose, input, sink.as_mut());
            let result = ProcessResult::from_outcome(outcome, None, None);

            eprintln!(
                "{} errors, {} warnings in {} run{}.",
                result.errors,
                result.warnings,
                result.runs,
                if result.runs == 1 { "" } else { "s" }
            );
            if outcome.status == RunStatus::Aborted {
                eprintln!("output ended before the tool finished; the process likely died");
            }

            let failed =
                result.fatal || result.errors > 0 || outcome.status == RunStatus::Aborted;
            Ok(if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}
