//! Console and JSON reports.
//!
//! Reporters are [`RunObserver`]s writing to any [`WriteColor`], so the same
//! code prints to a terminal, to an in-memory buffer for parallel runs, and to
//! a plain `Vec<u8>` in tests. Observer callbacks cannot fail; the first I/O
//! error is kept and returned by `finish`.

use std::io::{self, Write};
use std::time::Duration;

use serde::Serialize;
use termcolor::{Color, ColorSpec, WriteColor};

use crate::corpus::TestCase;
use crate::harness::{ComparisonResult, CorpusRun, RunObserver, RunSummary};

const RULE_WIDTH: usize = 70;
const HALF_RULE_WIDTH: usize = 35;

fn write_colored<W: WriteColor>(
    out: &mut W,
    color: Color,
    bold: bool,
    text: &str,
) -> io::Result<()> {
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(color)).set_bold(bold);
    out.set_color(&spec)?;
    write!(out, "{text}")?;
    out.reset()
}

/// One row per engine: name, a progress cell per case, then timing and
/// counts.
///
/// ```text
/// pandoc        |  F  F | 0.42s    5    2  40%
/// ```
pub struct SummaryReporter<W: WriteColor> {
    out: W,
    error: Option<io::Error>,
}

impl<W: WriteColor> SummaryReporter<W> {
    /// Creates a reporter writing to `out`.
    pub fn new(out: W) -> Self {
        Self { out, error: None }
    }

    fn record(&mut self, result: io::Result<()>) {
        if let Err(e) = result {
            self.error.get_or_insert(e);
        }
    }

    /// Starts the row of an engine, padding its name to `width`.
    pub fn begin_row(&mut self, engine_id: &str, width: usize) {
        let result = write!(self.out, "{engine_id:<width$} |").and_then(|()| self.out.flush());
        self.record(result);
    }

    /// Ends the row with the run's timing and counts.
    pub fn end_row(&mut self, summary: &RunSummary) {
        let result = self.write_tail(summary);
        self.record(result);
    }

    fn write_tail(&mut self, summary: &RunSummary) -> io::Result<()> {
        write!(
            self.out,
            "| {:>6.2}s {:4} ",
            summary.elapsed.as_secs_f64(),
            summary.total
        )?;
        let errors = format!("{:4}", summary.errors);
        if summary.errors > 0 {
            write_colored(&mut self.out, Color::Red, false, &errors)?;
        } else {
            write!(self.out, "{errors}")?;
        }
        writeln!(self.out, " {:>3}%", summary.percent())?;
        self.out.flush()
    }

    /// Returns the writer, or the first error hit while writing.
    pub fn finish(self) -> io::Result<W> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.out),
        }
    }
}

impl<W: WriteColor> RunObserver for SummaryReporter<W> {
    fn on_pass(&mut self, _case: &TestCase, _result: &ComparisonResult) {
        let result = write!(self.out, " ").and_then(|()| self.out.flush());
        self.record(result);
    }

    fn on_fail(&mut self, _case: &TestCase, _result: &ComparisonResult) {
        let result =
            write_colored(&mut self.out, Color::Red, true, "F").and_then(|()| self.out.flush());
        self.record(result);
    }
}

/// Dot per passing case and a full block per failure.
pub struct DetailReporter<W: WriteColor> {
    out: W,
    show_diff: bool,
    error: Option<io::Error>,
}

impl<W: WriteColor> DetailReporter<W> {
    /// Creates a reporter writing to `out`.
    pub fn new(out: W) -> Self {
        Self {
            out,
            show_diff: false,
            error: None,
        }
    }

    /// Also prints a unified diff of the canonical forms per failure.
    pub fn with_diff(mut self, show_diff: bool) -> Self {
        self.show_diff = show_diff;
        self
    }

    fn record(&mut self, result: io::Result<()>) {
        if let Err(e) = result {
            self.error.get_or_insert(e);
        }
    }

    fn write_failure(&mut self, case: &TestCase, result: &ComparisonResult) -> io::Result<()> {
        let rule = "=".repeat(RULE_WIDTH);
        let half = "-".repeat(HALF_RULE_WIDTH);

        writeln!(self.out)?;
        write_colored(&mut self.out, Color::Yellow, true, &format!("# {}", case.id))?;
        writeln!(self.out)?;
        writeln!(self.out, "{rule}")?;
        writeln!(self.out)?;
        writeln!(self.out, "{}", case.input)?;
        writeln!(self.out)?;
        if let Some(error) = &result.engine_error {
            write_colored(&mut self.out, Color::Red, false, &format!("engine error: {error}"))?;
            writeln!(self.out)?;
            writeln!(self.out)?;
        }
        writeln!(self.out, "{half} output:")?;
        writeln!(self.out)?;
        writeln!(self.out, "{}", result.canonical_actual)?;
        writeln!(self.out)?;
        writeln!(self.out, "{half} expected:")?;
        writeln!(self.out)?;
        writeln!(self.out, "{}", result.canonical_expected)?;
        writeln!(self.out)?;
        if self.show_diff {
            let diff = result.diff();
            writeln!(self.out, "{half} diff:")?;
            writeln!(self.out)?;
            if !diff.inline_diff.is_empty() {
                writeln!(self.out, "{}", diff.inline_diff)?;
            }
            for line in diff.unified_diff.lines() {
                match line.chars().next() {
                    Some('-') => write_colored(&mut self.out, Color::Red, false, line)?,
                    Some('+') => write_colored(&mut self.out, Color::Green, false, line)?,
                    _ => write!(self.out, "{line}")?,
                }
                writeln!(self.out)?;
            }
            writeln!(self.out)?;
        }
        writeln!(self.out, "{rule}")?;
        writeln!(self.out)?;
        self.out.flush()
    }

    /// Writes the closing statistics block.
    pub fn write_stats(&mut self, summary: &RunSummary) {
        let result = write_stats(&mut self.out, summary);
        self.record(result);
    }

    /// Returns the writer, or the first error hit while writing.
    pub fn finish(self) -> io::Result<W> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.out),
        }
    }
}

impl<W: WriteColor> RunObserver for DetailReporter<W> {
    fn on_pass(&mut self, _case: &TestCase, _result: &ComparisonResult) {
        let result = write!(self.out, ".").and_then(|()| self.out.flush());
        self.record(result);
    }

    fn on_fail(&mut self, case: &TestCase, result: &ComparisonResult) {
        let written = self.write_failure(case, result);
        self.record(written);
    }
}

/// Writes the labelled totals printed after a single-engine run.
pub fn write_stats<W: Write>(out: &mut W, summary: &RunSummary) -> io::Result<()> {
    let labels = ["wall time", "total tests", "errors", "error percent"];
    let width = labels.iter().map(|label| label.len()).max().unwrap_or(0) + 2;
    writeln!(out)?;
    writeln!(out, "{:<width$}{:.2}s", labels[0], summary.elapsed.as_secs_f64())?;
    writeln!(out, "{:<width$}{}", labels[1], summary.total)?;
    writeln!(out, "{:<width$}{}", labels[2], summary.errors)?;
    writeln!(out, "{:<width$}{}%", labels[3], summary.percent())?;
    if summary.skipped > 0 {
        writeln!(out, "{:<width$}{}", "skipped", summary.skipped)?;
    }
    Ok(())
}

/// One run in a JSON report.
#[derive(Debug, Clone, Copy)]
pub struct ReportEntry<'a> {
    /// Which corpus the run covered: `base`, `extensions` or `combined`.
    pub corpus: &'a str,
    pub run: &'a CorpusRun,
}

#[derive(Serialize)]
struct JsonRun<'a> {
    engine_id: &'a str,
    corpus: &'a str,
    total: usize,
    errors: usize,
    skipped: usize,
    percent: usize,
    elapsed_secs: f64,
    failures: &'a [ComparisonResult],
}

#[derive(Serialize)]
struct JsonReport<'a> {
    runs: Vec<JsonRun<'a>>,
    elapsed_secs: f64,
}

/// Writes runs as pretty-printed JSON.
pub fn write_json<W: Write>(
    out: W,
    entries: &[ReportEntry<'_>],
    wall: Duration,
) -> io::Result<()> {
    let runs = entries
        .iter()
        .map(|entry| {
            let summary = &entry.run.summary;
            JsonRun {
                engine_id: &summary.engine_id,
                corpus: entry.corpus,
                total: summary.total,
                errors: summary.errors,
                skipped: summary.skipped,
                percent: summary.percent(),
                elapsed_secs: summary.elapsed.as_secs_f64(),
                failures: &entry.run.failures,
            }
        })
        .collect();

    let report = JsonReport {
        runs,
        elapsed_secs: wall.as_secs_f64(),
    };
    serde_json::to_writer_pretty(out, &report)?;
    Ok(())
}
