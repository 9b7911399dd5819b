//! `replay run`: Execute a test batch and report verdicts.

use crate::config::{CliConfig, CoverageMode};
use crate::output::{self, StyledOutput};
use anyhow::Context;
use clap::ValueEnum;
use replay_engine::{
    BatchReport, CoverageVerifier, Executor, ExpectedCoverage, NoCoverage, Stmt, TestBatch, TestDescription,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use termcolor::Color;
use tracing::debug;

/// Output format of `replay run`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Reporter {
    /// Colored per-test listing and summary
    Pretty,
    /// One JSON document on stdout
    Json,
}

/// Arguments for the run command.
pub struct RunArgs {
    pub file: PathBuf,
    pub config: Option<PathBuf>,
    pub policy: Option<String>,
    pub jobs: Option<usize>,
    pub coverage: bool,
    pub reporter: Reporter,
    pub color: String,
}

pub fn execute(args: RunArgs) -> anyhow::Result<()> {
    let config = CliConfig::load(args.config.as_deref())?.with_overrides(
        args.policy.as_deref(),
        args.jobs,
        args.coverage,
    )?;

    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let batch = TestBatch::from_json(&text).with_context(|| format!("invalid test batch {}", args.file.display()))?;
    debug!(file = %args.file.display(), tests = batch.tests.len(), ?config, "loaded batch");

    let registry = Arc::new(replay_samples::registry().context("failed to load sample module")?);
    let coverage: Arc<dyn CoverageVerifier> = match config.coverage {
        CoverageMode::None => Arc::new(NoCoverage),
        CoverageMode::Expected => Arc::new(ExpectedCoverage),
    };
    let executor = Executor::new(registry)
        .with_options(config.executor.clone())
        .with_coverage(coverage);

    let start = Instant::now();
    let report = executor.run_batch(&batch);
    let duration_secs = start.elapsed().as_secs_f64();

    match args.reporter {
        Reporter::Json => print_json(&batch, &report, duration_secs)?,
        Reporter::Pretty => {
            let mut out = StyledOutput::new(output::resolve_color_choice(Some(&args.color)));
            print_default(&mut out, &batch, &report);
            print_summary(&mut out, &report, duration_secs);
            out.flush();
        }
    }

    if !report.verdict.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Short label for a test: its index and callee
fn label(index: usize, test: &TestDescription) -> String {
    let callee = match &test.call {
        Stmt::InstanceMethodCall { method, .. }
        | Stmt::StaticMethodCall { method, .. }
        | Stmt::ConstructorCall { method, .. } => method.name.as_str(),
        other => other.kind_name(),
    };
    format!("#{} {}", index + 1, callee)
}

// ── Default Reporter ─────────────────────────────────────────────────────

fn print_default(out: &mut StyledOutput, batch: &TestBatch, report: &BatchReport) {
    out.bold(&batch.method.to_string());
    out.newline();

    for (i, (test, outcome)) in batch.tests.iter().zip(&report.outcomes).enumerate() {
        match outcome.verdict.reason() {
            None => {
                out.write_styled("   ✓ ", Some(Color::Green), false);
                out.write_styled(&label(i, test), Some(Color::Green), false);
                out.newline();
            }
            Some(reason) => {
                out.write_styled("   ✗ ", Some(Color::Red), true);
                out.write_styled(&label(i, test), Some(Color::Red), true);
                out.newline();
                for line in reason.lines() {
                    out.plain("       ");
                    out.plain(line);
                    out.newline();
                }
            }
        }
    }
}

fn print_summary(out: &mut StyledOutput, report: &BatchReport, duration_secs: f64) {
    out.newline();
    out.dim("──────────────────────────────────────────");
    out.newline();

    out.bold("Tests:  ");
    if report.failed() > 0 {
        out.error(&format!("{} failed", report.failed()));
        out.plain(", ");
    }
    if report.passed() > 0 {
        out.success(&format!("{} passed", report.passed()));
        out.plain(", ");
    }
    out.bold(&format!("{} total", report.outcomes.len()));
    out.newline();

    out.bold("Time:   ");
    out.dim(&format!("{:.2}s", duration_secs));
    out.newline();

    out.bold("Batch:  ");
    match report.verdict.reason() {
        None => out.pass_badge(),
        Some(reason) => {
            out.fail_badge();
            // Test failures were already listed above
            if report.failed() == 0 {
                out.plain(" ");
                out.info(reason);
            }
        }
    }
    out.newline();
}

// ── JSON Reporter ────────────────────────────────────────────────────────

fn print_json(batch: &TestBatch, report: &BatchReport, duration_secs: f64) -> anyhow::Result<()> {
    let tests: Vec<serde_json::Value> = batch
        .tests
        .iter()
        .zip(&report.outcomes)
        .enumerate()
        .map(|(i, (test, outcome))| {
            serde_json::json!({
                "name": label(i, test),
                "status": if outcome.verdict.is_success() { "passed" } else { "failed" },
                "reason": outcome.verdict.reason(),
            })
        })
        .collect();
    let summary = serde_json::json!({
        "method": batch.method.to_string(),
        "tests": tests,
        "passed": report.passed(),
        "failed": report.failed(),
        "success": report.verdict.is_success(),
        "reason": report.verdict.reason(),
        "duration_secs": duration_secs,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
