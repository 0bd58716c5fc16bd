//! Include Gardener - include/import dependency graph generator
//!
//! Scans source trees for include-style directives of one language and
//! writes the resulting dependency graph as dot, GraphML or JSON.
//!
//! Render dot output with `dot -Tsvg graph.dot > graph.svg`.

mod output;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, trace, Level};
use tracing_subscriber::FmtSubscriber;

use gardener_config::{ConfigLoader, RunOverrides, DEFAULT_LANGUAGE};
use gardener_core::detector::{DetectorOptions, FileDetector, RecursionLimit};
use gardener_core::rules::Config;

use crate::output::{write_graph, OutputFormat};

/// Include Gardener - build a dependency graph from include statements
#[derive(Parser, Debug)]
#[command(name = "include-gardener")]
#[command(author, version, about, long_about = None, disable_version_flag = true)]
struct Cli {
    /// Display version information
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: (),

    /// Enable verbose output
    #[arg(short = 'V', long)]
    verbose: bool,

    /// Include search path (repeatable, searched in order)
    #[arg(short = 'I', long = "include-path", value_name = "DIR")]
    include_paths: Vec<PathBuf>,

    /// Path which is processed (repeatable)
    #[arg(short = 'P', long = "process-path", value_name = "PATH")]
    process_paths: Vec<PathBuf>,

    /// Paths to process, same as --process-path
    #[arg(value_name = "PROCESS_PATH")]
    positional_paths: Vec<PathBuf>,

    /// Regular expression excluding matching files and directories (repeatable)
    #[arg(short = 'e', long = "exclude", value_name = "REGEX")]
    exclude: Vec<String>,

    /// Limit for recursive processing (-1 = unlimited)
    #[arg(short = 'L', long, allow_negative_numbers = true, value_name = "N")]
    recursive_limit: Option<i64>,

    /// Number of worker threads (default: 2)
    #[arg(short = 'j', long, value_name = "N")]
    threads: Option<usize>,

    /// Language of the processed files
    #[arg(short = 'l', long, default_value = DEFAULT_LANGUAGE)]
    language: String,

    /// Path to the config file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "dot")]
    format: OutputFormat,

    /// Output file (default: stdout)
    #[arg(short = 'o', long = "out-file", value_name = "FILE")]
    out_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::TRACE
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let mut process_paths = cli.process_paths;
    process_paths.extend(cli.positional_paths);
    if process_paths.is_empty() {
        bail!("No input provided! Pass at least one process path.");
    }

    let language = cli.language.to_lowercase();

    let settings = ConfigLoader::new()
        .load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    let config = Config::from_settings(&settings).context("Invalid language rules")?;
    if !config.supports_language(&language) {
        bail!("Language {} not supported.", language);
    }
    trace!("{}", config);

    let run = settings.resolve_run(&RunOverrides {
        threads: cli.threads,
        recursive_limit: cli.recursive_limit,
        include_paths: cli.include_paths,
        exclude: cli.exclude,
    })?;

    trace!("threads:         {}", run.threads);
    trace!("recursive_limit: {}", run.recursive_limit);
    trace!("language:        {}", language);
    trace!("config:          {:?}", cli.config);
    trace!("format:          {:?}", cli.format);
    trace!("out_file:        {:?}", cli.out_file);
    trace!("include_paths:   {:?}", run.include_paths);
    trace!("process_paths:   {:?}", process_paths);
    trace!("exclude:         {:?}", run.exclude);

    let rules = config.get_file_detection(&language)?;
    let detector = FileDetector::new(
        language.as_str(),
        rules,
        DetectorOptions {
            process_paths,
            include_paths: run.include_paths,
            exclude: run.exclude,
            recursive_limit: RecursionLimit::from(run.recursive_limit),
            threads: run.threads,
        },
    )?;
    let report = detector.run()?;
    info!("{:?}", report.stats);

    match &cli.out_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?;
            let mut out = BufWriter::new(file);
            write_graph(&report.graph, cli.format, &mut out)?;
            out.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            write_graph(&report.graph, cli.format, &mut out)?;
            out.flush()?;
        }
    }

    Ok(())
}
