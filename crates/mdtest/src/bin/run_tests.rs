//! Run markdown tests.
//!
//! ```bash
//! # Every enabled and available engine, one summary row each
//! run-tests
//!
//! # One engine with detailed failure output, base and extension tests
//! run-tests pandoc
//!
//! # Third test whose name contains "link", with a diff of the canonical forms
//! run-tests pandoc --filter link --only 3 --diff
//! ```
//!
//! Engines listed in `run_all_disable` are skipped unless `--all` is given.

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use termcolor::{Buffer, BufferWriter, ColorChoice, StandardStream, WriteColor};
use tracing_subscriber::EnvFilter;

use mdtest::config::DEFAULT_CONFIG_FILE;
use mdtest::report::{DetailReporter, ReportEntry, SummaryReporter, write_json};
use mdtest::{
    CorpusLoader, CorpusRun, Engine, EngineJob, EngineRegistry, RunOptions, SuiteConfig,
    run_corpus, run_corpus_observed, run_engines_parallel, run_engines_parallel_observed,
};

/// Compare markdown engines against expected HTML.
#[derive(Parser, Debug, Clone)]
#[command(name = "run-tests", author, version, about)]
struct Cli {
    /// Engine to test in detail. Without it, every enabled and available
    /// engine is summarized.
    engine: Option<String>,

    /// Include engines disabled by `run_all_disable`
    #[arg(long)]
    all: bool,

    /// List engines and their availability, then exit
    #[arg(long)]
    list: bool,

    /// Run only the K-th selected test (1-based)
    #[arg(long, value_name = "K", value_parser = parse_ordinal)]
    only: Option<usize>,

    /// Run only tests whose name contains this substring
    #[arg(long, value_name = "SUBSTR")]
    filter: Option<String>,

    /// Fixtures directory
    #[arg(long, value_name = "DIR", default_value = "fixtures", env = "MDTEST_FIXTURES")]
    fixtures: PathBuf,

    /// Configuration file. Defaults to `mdtest.toml` in the fixtures
    /// directory, if present.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print a diff of the canonical forms for each failure
    #[arg(long)]
    diff: bool,

    /// Print a JSON report instead of the console report
    #[arg(long)]
    json: bool,

    /// Run engines on parallel workers
    #[arg(long)]
    parallel: bool,

    /// Enable verbose logging (repeat for more)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_ordinal(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("test numbers start at 1".to_string()),
        Ok(k) => Ok(k),
        Err(e) => Err(e.to_string()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

// =============================================================================
// Setup
// =============================================================================

struct Suite {
    config: SuiteConfig,
    registry: EngineRegistry,
    loader: CorpusLoader,
    options: RunOptions,
    color: ColorChoice,
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => SuiteConfig::load(path)?,
        None => SuiteConfig::load_or_default(cli.fixtures.join(DEFAULT_CONFIG_FILE))?,
    }
    .with_env_token();

    let registry = EngineRegistry::from_config(&config).context("failed to set up engines")?;
    let loader = CorpusLoader::new(&cli.fixtures).with_encoding(config.encoding);
    let options = RunOptions {
        id_filter: cli.filter.clone(),
        only: cli.only,
    };
    let color = if io::stdout().is_terminal() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };

    let suite = Suite {
        config,
        registry,
        loader,
        options,
        color,
    };

    if cli.list {
        list_engines(&suite)?;
        return Ok(ExitCode::SUCCESS);
    }

    match &cli.engine {
        Some(id) => run_single(cli, &suite, id),
        None => run_all(cli, &suite),
    }
}

// =============================================================================
// Engine listing
// =============================================================================

fn list_engines(suite: &Suite) -> Result<()> {
    let corpus_ids = suite.loader.engine_ids()?;
    let mut ids: Vec<&str> = suite.registry.ids().collect();
    for id in &corpus_ids {
        if !suite.registry.contains(id) {
            ids.push(id);
        }
    }
    ids.sort_unstable();

    let width = ids.iter().map(|id| id.len()).max().unwrap_or(0);
    for id in ids {
        let status = match suite.registry.get(id) {
            None => "no adapter",
            Some(_) if suite.config.is_disabled(id) => "disabled",
            Some(engine) if engine.is_available() => "available",
            Some(_) => "not available",
        };
        let extensions = if suite.loader.has_engine_dir(id) {
            format!("{} extension tests", suite.loader.engine_cases(id)?.len())
        } else {
            "no extension tests".to_string()
        };
        println!("{id:<width$}  {status:<13}  {extensions}");
    }
    Ok(())
}

// =============================================================================
// Single engine
// =============================================================================

fn run_single(cli: &Cli, suite: &Suite, id: &str) -> Result<ExitCode> {
    let Some(engine) = suite.registry.get(id) else {
        let known: Vec<&str> = suite.registry.ids().collect();
        eprintln!("Unknown engine '{id}'. Known engines: {}", known.join(", "));
        println!("Engine not available.");
        return Ok(ExitCode::FAILURE);
    };
    if !engine.is_available() {
        println!("Engine not available.");
        return Ok(ExitCode::FAILURE);
    }

    let mut cases = suite.loader.base_cases()?;
    cases.extend(suite.loader.engine_cases(id)?);

    let started = Instant::now();
    if cli.json {
        let run = run_corpus(&cases, engine, &suite.options);
        let entry = ReportEntry {
            corpus: "all",
            run: &run,
        };
        write_json(io::stdout().lock(), &[entry], started.elapsed())?;
        println!();
        return Ok(ExitCode::SUCCESS);
    }

    let mut reporter =
        DetailReporter::new(StandardStream::stdout(suite.color)).with_diff(cli.diff);
    let run = run_corpus_observed(&cases, engine, &suite.options, &mut reporter);
    reporter.write_stats(&run.summary);
    reporter.finish()?;
    Ok(ExitCode::SUCCESS)
}

// =============================================================================
// All engines
// =============================================================================

fn run_all(cli: &Cli, suite: &Suite) -> Result<ExitCode> {
    let started = Instant::now();
    let enabled: Vec<&dyn Engine> = suite
        .registry
        .ids()
        .filter(|id| cli.all || !suite.config.is_disabled(id))
        .filter_map(|id| suite.registry.get(id))
        .collect();
    let (available, unavailable): (Vec<&dyn Engine>, Vec<&dyn Engine>) =
        enabled.into_iter().partition(|engine| engine.is_available());

    let say = |text: &str| {
        if !cli.json {
            println!("{text}");
        }
    };

    let mut newline = false;
    if !cli.all && !suite.config.run_all_disable.is_empty() {
        say(&format!(
            "Engines disabled by configuration: {}",
            suite.config.run_all_disable.join(", ")
        ));
        newline = true;
    }
    if !unavailable.is_empty() {
        let ids: Vec<&str> = unavailable.iter().map(|engine| engine.id()).collect();
        say(&format!("Enabled engines not available:     {}", ids.join(", ")));
        newline = true;
    }
    if newline {
        say("");
    }

    if available.is_empty() {
        say("No engines are enabled. Install some or enable them in mdtest.toml");
        if cli.json {
            write_json(io::stdout().lock(), &[], started.elapsed())?;
            println!();
        }
        return Ok(ExitCode::SUCCESS);
    }

    let width = available.iter().map(|engine| engine.id().len()).max().unwrap_or(0);

    let base = suite.loader.base_cases()?;
    let base_jobs: Vec<EngineJob<'_>> = available
        .iter()
        .map(|&engine| EngineJob {
            engine,
            cases: base.clone(),
        })
        .collect();
    let base_runs = summarize(cli, suite, &base_jobs, width)?;

    say("\nExtensions:\n");
    let extension_jobs = available
        .iter()
        .map(|&engine| -> Result<EngineJob<'_>> {
            Ok(EngineJob {
                engine,
                cases: suite.loader.engine_cases(engine.id())?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let extension_runs = summarize(cli, suite, &extension_jobs, width)?;

    let combined = base_runs
        .iter()
        .zip(&extension_runs)
        .map(|(base, extensions)| combine(base, extensions))
        .collect::<Result<Vec<_>>>()?;

    if cli.json {
        let entries: Vec<ReportEntry<'_>> = [
            ("base", &base_runs),
            ("extensions", &extension_runs),
            ("combined", &combined),
        ]
        .into_iter()
        .flat_map(|(corpus, runs)| runs.iter().map(move |run| ReportEntry { corpus, run }))
        .collect();
        write_json(io::stdout().lock(), &entries, started.elapsed())?;
        println!();
        return Ok(ExitCode::SUCCESS);
    }

    say("\nCombined:\n");
    let mut reporter = SummaryReporter::new(StandardStream::stdout(suite.color));
    for run in &combined {
        reporter.begin_row(&run.summary.engine_id, width);
        reporter.end_row(&run.summary);
    }
    reporter.finish()?;
    Ok(ExitCode::SUCCESS)
}

fn combine(base: &CorpusRun, extensions: &CorpusRun) -> Result<CorpusRun> {
    let summary = base.summary.merge(&extensions.summary)?;
    let failures = base
        .failures
        .iter()
        .chain(&extensions.failures)
        .cloned()
        .collect();
    Ok(CorpusRun { summary, failures })
}

/// Runs every job, printing one summary row per engine unless in JSON mode.
fn summarize(
    cli: &Cli,
    suite: &Suite,
    jobs: &[EngineJob<'_>],
    width: usize,
) -> Result<Vec<CorpusRun>> {
    if cli.json {
        return Ok(if cli.parallel {
            run_engines_parallel(jobs, &suite.options)
        } else {
            jobs.iter()
                .map(|job| run_corpus(&job.cases, job.engine, &suite.options))
                .collect()
        });
    }

    if cli.parallel {
        let writer = BufferWriter::stdout(suite.color);
        let ansi = writer.buffer().supports_color();
        let results = run_engines_parallel_observed(jobs, &suite.options, |job| {
            let buffer = if ansi { Buffer::ansi() } else { Buffer::no_color() };
            let mut reporter = SummaryReporter::new(buffer);
            reporter.begin_row(job.engine.id(), width);
            reporter
        });

        let mut runs = Vec::with_capacity(results.len());
        for (run, mut reporter) in results {
            reporter.end_row(&run.summary);
            writer.print(&reporter.finish()?)?;
            runs.push(run);
        }
        return Ok(runs);
    }

    let mut reporter = SummaryReporter::new(StandardStream::stdout(suite.color));
    let runs = jobs
        .iter()
        .map(|job| {
            reporter.begin_row(job.engine.id(), width);
            let run = run_corpus_observed(&job.cases, job.engine, &suite.options, &mut reporter);
            reporter.end_row(&run.summary);
            run
        })
        .collect();
    reporter.finish()?;
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdtest::{ComparisonResult, RunSummary, TestCase};

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["run-tests", "pandoc", "--only", "2", "--filter", "link"])
            .unwrap();
        assert_eq!(cli.engine.as_deref(), Some("pandoc"));
        assert_eq!(cli.only, Some(2));
        assert_eq!(cli.filter.as_deref(), Some("link"));
        assert_eq!(cli.fixtures, PathBuf::from("fixtures"));
    }

    #[test]
    fn test_only_rejects_zero() {
        assert!(Cli::try_parse_from(["run-tests", "--only", "0"]).is_err());
    }

    #[test]
    fn test_combine_sums() {
        let case = TestCase::new("a", "a", "<p>a</p>");
        let failure = ComparisonResult::compare(&case, "x", "<p>b</p>".into(), None);
        let base = CorpusRun {
            summary: RunSummary {
                total: 2,
                errors: 1,
                ..RunSummary::new("x")
            },
            failures: vec![failure.clone()],
        };
        let extensions = CorpusRun {
            summary: RunSummary {
                total: 1,
                ..RunSummary::new("x")
            },
            failures: Vec::new(),
        };
        let combined = combine(&base, &extensions).unwrap();
        assert_eq!(combined.summary.total, 3);
        assert_eq!(combined.summary.errors, 1);
        assert_eq!(combined.failures, vec![failure]);
    }
}
