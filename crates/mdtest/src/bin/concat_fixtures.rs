//! Concatenate fixtures into one markdown file.
//!
//! ```bash
//! # Every test as "# name", input, "---", expected output -> all.tmp.md
//! concat-fixtures
//!
//! # Every markdown input under the fixtures tree -> inputs.tmp.md
//! concat-fixtures --inputs-only
//! ```

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use mdtest::concat::{ALL_OUTPUT_FILE, INPUTS_OUTPUT_FILE, concat_all, concat_inputs};
use mdtest::config::DEFAULT_CONFIG_FILE;
use mdtest::{CorpusLoader, SuiteConfig};

/// Concatenate test fixtures into a single markdown file.
#[derive(Parser, Debug, Clone)]
#[command(name = "concat-fixtures", author, version, about)]
struct Cli {
    /// Only concatenate markdown inputs, with their relative paths as headings
    #[arg(long)]
    inputs_only: bool,

    /// Fixtures directory
    #[arg(long, value_name = "DIR", default_value = "fixtures", env = "MDTEST_FIXTURES")]
    fixtures: PathBuf,

    /// Output file [default: all.tmp.md, or inputs.tmp.md with --inputs-only]
    #[arg(long, short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = SuiteConfig::load_or_default(cli.fixtures.join(DEFAULT_CONFIG_FILE))?;
    let loader = CorpusLoader::new(&cli.fixtures).with_encoding(config.encoding);

    let default_output = if cli.inputs_only {
        INPUTS_OUTPUT_FILE
    } else {
        ALL_OUTPUT_FILE
    };
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(default_output));

    let file = File::create(&output)
        .with_context(|| format!("cannot create {}", output.display()))?;
    let mut out = BufWriter::new(file);

    let written = if cli.inputs_only {
        concat_inputs(&loader, &mut out)?
    } else {
        concat_all(&loader, &mut out)?
    };

    tracing::info!(count = written, output = %output.display(), "Fixtures concatenated");
    Ok(())
}
