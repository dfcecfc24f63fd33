//! Comparison and aggregation.
//!
//! [`run_corpus`] drives test cases through one engine, canonicalizes both
//! sides with [`html_canon::canonicalize`] and counts mismatches. Engine
//! failures never abort a run: they become sentinel output that fails the
//! comparison like any other mismatch.

use std::borrow::Borrow;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::corpus::TestCase;
use crate::diff::Diff;
use crate::engine::Engine;

/// Errors from combining run results.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HarnessError {
    /// Summaries of different engines cannot be merged.
    #[error("cannot merge summaries of engines '{left}' and '{right}'")]
    EngineMismatch { left: String, right: String },
}

/// Case selection for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Only cases whose id contains this substring.
    pub id_filter: Option<String>,
    /// Only the k-th (1-based) case among those passing the filter.
    pub only: Option<usize>,
}

impl RunOptions {
    /// Creates options selecting every case.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the run to ids containing `filter`.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.id_filter = Some(filter.into());
        self
    }

    /// Restricts the run to the k-th selected case.
    pub fn with_only(mut self, k: usize) -> Self {
        self.only = Some(k);
        self
    }

    /// Whether a case id passes the substring filter.
    pub fn matches(&self, id: &str) -> bool {
        self.id_filter
            .as_deref()
            .is_none_or(|filter| id.contains(filter))
    }
}

/// Outcome of one case on one engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonResult {
    pub test_id: String,
    pub engine_id: String,
    pub passed: bool,
    pub raw_actual: String,
    pub raw_expected: String,
    pub canonical_actual: String,
    pub canonical_expected: String,
    /// Set when the engine failed and `raw_actual` is sentinel text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_error: Option<String>,
}

impl ComparisonResult {
    /// Canonicalizes both sides of a case and compares them.
    pub fn compare(
        case: &TestCase,
        engine_id: &str,
        raw_actual: String,
        engine_error: Option<String>,
    ) -> Self {
        let canonical_actual = html_canon::canonicalize(&raw_actual);
        let canonical_expected = html_canon::canonicalize(&case.expected_output);
        Self {
            test_id: case.id.clone(),
            engine_id: engine_id.to_string(),
            passed: canonical_actual == canonical_expected,
            raw_actual,
            raw_expected: case.expected_output.clone(),
            canonical_actual,
            canonical_expected,
            engine_error,
        }
    }

    /// Diff of the canonical forms.
    pub fn diff(&self) -> Diff {
        Diff::between(&self.canonical_expected, &self.canonical_actual)
    }
}

/// Aggregate counts for one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub engine_id: String,
    /// Cases the engine was invoked for.
    pub total: usize,
    /// Cases whose canonical forms differed.
    pub errors: usize,
    /// Cases selected by the filter but not invoked because of `only`.
    pub skipped: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Creates an empty summary.
    pub fn new(engine_id: impl Into<String>) -> Self {
        Self {
            engine_id: engine_id.into(),
            total: 0,
            errors: 0,
            skipped: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Cases that passed.
    pub fn passed(&self) -> usize {
        self.total - self.errors
    }

    /// Error percentage, truncated. Zero for an empty run.
    pub fn percent(&self) -> usize {
        if self.total == 0 {
            0
        } else {
            self.errors * 100 / self.total
        }
    }

    /// Field-wise sum of two summaries of the same engine.
    pub fn merge(&self, other: &Self) -> Result<Self, HarnessError> {
        if self.engine_id != other.engine_id {
            return Err(HarnessError::EngineMismatch {
                left: self.engine_id.clone(),
                right: other.engine_id.clone(),
            });
        }
        Ok(Self {
            engine_id: self.engine_id.clone(),
            total: self.total + other.total,
            errors: self.errors + other.errors,
            skipped: self.skipped + other.skipped,
            elapsed: self.elapsed + other.elapsed,
        })
    }
}

/// Receives per-case outcomes in case order while a run progresses.
pub trait RunObserver {
    /// Called after a case passed.
    fn on_pass(&mut self, _case: &TestCase, _result: &ComparisonResult) {}

    /// Called after a case failed.
    fn on_fail(&mut self, _case: &TestCase, _result: &ComparisonResult) {}

    /// Called for a case skipped by [`RunOptions::only`].
    fn on_skip(&mut self, _case: &TestCase) {}
}

impl RunObserver for () {}

/// Summary and failure records of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusRun {
    pub summary: RunSummary,
    pub failures: Vec<ComparisonResult>,
}

/// Runs `cases` through `engine`.
pub fn run_corpus<I>(cases: I, engine: &dyn Engine, options: &RunOptions) -> CorpusRun
where
    I: IntoIterator,
    I::Item: Borrow<TestCase>,
{
    run_corpus_observed(cases, engine, options, &mut ())
}

/// Runs `cases` through `engine`, reporting each outcome to `observer`.
pub fn run_corpus_observed<I, O>(
    cases: I,
    engine: &dyn Engine,
    options: &RunOptions,
    observer: &mut O,
) -> CorpusRun
where
    I: IntoIterator,
    I::Item: Borrow<TestCase>,
    O: RunObserver + ?Sized,
{
    let start = Instant::now();
    let mut summary = RunSummary::new(engine.id());
    let mut failures = Vec::new();
    let mut position = 0;

    for case in cases {
        let case = case.borrow();
        if !options.matches(&case.id) {
            continue;
        }
        position += 1;
        if options.only.is_some_and(|k| k != position) {
            summary.skipped += 1;
            observer.on_skip(case);
            continue;
        }

        summary.total += 1;
        let (raw_actual, engine_error) = match engine.render(&case.input) {
            Ok(output) => (output, None),
            Err(e) => {
                warn!(engine = engine.id(), test = %case.id, error = %e, "Engine failed");
                (e.sentinel(), Some(e.to_string()))
            }
        };

        let result = ComparisonResult::compare(case, engine.id(), raw_actual, engine_error);
        debug!(engine = engine.id(), test = %case.id, passed = result.passed, "Case compared");
        if result.passed {
            observer.on_pass(case, &result);
        } else {
            summary.errors += 1;
            observer.on_fail(case, &result);
            failures.push(result);
        }
    }

    summary.elapsed = start.elapsed();
    info!(
        engine = %summary.engine_id,
        total = summary.total,
        errors = summary.errors,
        skipped = summary.skipped,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "Run finished"
    );

    CorpusRun { summary, failures }
}

/// One engine and the cases to run through it.
pub struct EngineJob<'a> {
    pub engine: &'a dyn Engine,
    pub cases: Vec<TestCase>,
}

/// Runs independent engines on rayon workers. Results come back in job
/// order; each engine's cases still run sequentially.
pub fn run_engines_parallel(jobs: &[EngineJob<'_>], options: &RunOptions) -> Vec<CorpusRun> {
    run_engines_parallel_observed(jobs, options, |_| ())
        .into_iter()
        .map(|(run, ())| run)
        .collect()
}

/// Like [`run_engines_parallel`], with one observer per job.
///
/// Observers must not share an output stream; buffer per job and print the
/// buffers in order afterwards.
pub fn run_engines_parallel_observed<O, F>(
    jobs: &[EngineJob<'_>],
    options: &RunOptions,
    make_observer: F,
) -> Vec<(CorpusRun, O)>
where
    O: RunObserver + Send,
    F: Fn(&EngineJob<'_>) -> O + Sync,
{
    jobs.par_iter()
        .map(|job| {
            let mut observer = make_observer(job);
            let run = run_corpus_observed(&job.cases, job.engine, options, &mut observer);
            (run, observer)
        })
        .collect()
}
