#![forbid(unsafe_code)]
// Allow pedantic lints for early-stage API ergonomics.
#![allow(clippy::nursery)]
#![allow(clippy::pedantic)]

//! # mdtest
//!
//! A cross-engine markdown test suite runner.
//!
//! Each test is a markdown input with the HTML it should render to. The
//! runner feeds inputs to markdown engines, canonicalizes both the engine's
//! HTML and the expected HTML with [`html_canon`], and counts the tests whose
//! canonical forms differ.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mdtest::prelude::*;
//!
//! let config = SuiteConfig::load_or_default("fixtures/mdtest.toml")?;
//! let registry = EngineRegistry::from_config(&config)?;
//! let loader = CorpusLoader::new("fixtures").with_encoding(config.encoding);
//!
//! if let Some(pandoc) = registry.get("pandoc") {
//!     let run = run_corpus(&loader.base_cases()?, pandoc, &RunOptions::new());
//!     println!("{} errors out of {}", run.summary.errors, run.summary.total);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod concat;
pub mod config;
pub mod corpus;
pub mod diff;
pub mod encoding;
pub mod engine;
pub mod harness;
pub mod report;

pub use config::{ConfigError, SuiteConfig};
pub use corpus::{CorpusLoader, FixtureError, TestCase};
pub use encoding::{EncodingError, TextEncoding};
pub use engine::{CommandEngine, Engine, EngineError, EngineRegistry, RemoteEngine};
pub use harness::{
    ComparisonResult, CorpusRun, EngineJob, HarnessError, RunObserver, RunOptions, RunSummary,
    run_corpus, run_corpus_observed, run_engines_parallel, run_engines_parallel_observed,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::SuiteConfig;
    pub use crate::corpus::{CorpusLoader, TestCase};
    pub use crate::engine::{Engine, EngineRegistry};
    pub use crate::harness::{
        CorpusRun, RunObserver, RunOptions, RunSummary, run_corpus, run_corpus_observed,
    };
}
