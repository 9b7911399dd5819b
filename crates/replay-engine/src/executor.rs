//! Test execution
//!
//! For each test: resolve it against a fresh heap, invoke the callee with a
//! per-invocation trace, and compare the outcome with the expectation. A
//! batch fails if any test fails, with the failure reasons joined by
//! newlines; otherwise the coverage verifier decides.
//!
//! Batches can run on a pool of scoped worker threads. Tests share only the
//! read-only registry, so results are identical to a sequential run and are
//! reported in input order.

use crate::compare::structurally_equal;
use crate::coverage::{CoverageVerifier, ExecutionTrace, NoCoverage};
use crate::heap::Heap;
use crate::invoke::{CallContext, Thrown};
use crate::registry::TypeRegistry;
use crate::resolver::{Expected, ResolvedTest, TestResolver};
use crate::stmt::{TestBatch, TestDescription};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// Options
// ============================================================================

/// How a thrown exception is matched against an expected one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExceptionPolicy {
    /// Runtime types must be identical; message and stack are ignored
    #[default]
    RuntimeType,
    /// The exception objects must be structurally equal
    Structural,
}

/// Executor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExecutorOptions {
    /// Exception matching
    pub exception_policy: ExceptionPolicy,
    /// Worker threads for batches; 0 uses every core
    pub jobs: usize,
    /// Turn callee panics into test failures instead of unwinding
    pub catch_panics: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            exception_policy: ExceptionPolicy::RuntimeType,
            jobs: 1,
            catch_panics: true,
        }
    }
}

impl ExecutorOptions {
    /// Set the exception policy
    pub fn with_exception_policy(mut self, policy: ExceptionPolicy) -> Self {
        self.exception_policy = policy;
        self
    }

    /// Set the worker count
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Effective worker count
    pub fn workers(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get()
        } else {
            self.jobs
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of a test or batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Passed
    Success,
    /// Failed with a human-readable reason
    Fail {
        /// Failure description
        reason: String,
    },
}

impl Verdict {
    /// Failed verdict
    pub fn fail(reason: impl Into<String>) -> Self {
        Verdict::Fail { reason: reason.into() }
    }

    /// Whether the verdict is a pass
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success)
    }

    /// Failure reason, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            Verdict::Success => None,
            Verdict::Fail { reason } => Some(reason),
        }
    }
}

/// Result of one test
#[derive(Debug, Clone)]
pub struct TestOutcome {
    /// Pass or fail
    pub verdict: Verdict,
    /// Coverage trace, when the callee was invoked
    pub trace: Option<ExecutionTrace>,
}

impl TestOutcome {
    fn internal(reason: String) -> Self {
        Self {
            verdict: Verdict::fail(format!("Internal error occurred:\n{}", reason)),
            trace: None,
        }
    }
}

/// Result of a batch
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Per-test outcomes in input order
    pub outcomes: Vec<TestOutcome>,
    /// Overall verdict
    pub verdict: Verdict,
}

impl BatchReport {
    /// Number of passing tests
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.verdict.is_success()).count()
    }

    /// Number of failing tests
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(&format!("\n  caused by: {}", cause));
        source = cause.source();
    }
    message
}

// ============================================================================
// Executor
// ============================================================================

/// Runs test descriptions against a registry
pub struct Executor {
    registry: Arc<TypeRegistry>,
    options: ExecutorOptions,
    coverage: Arc<dyn CoverageVerifier>,
}

impl Executor {
    /// Executor with default options and no coverage check
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            options: ExecutorOptions::default(),
            coverage: Arc::new(NoCoverage),
        }
    }

    /// Replace the options
    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the coverage verifier
    pub fn with_coverage(mut self, coverage: Arc<dyn CoverageVerifier>) -> Self {
        self.coverage = coverage;
        self
    }

    /// Registry in use
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Options in use
    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Resolve and run one test
    pub fn run_test(&self, test: &TestDescription) -> TestOutcome {
        // Setup may invoke nested calls, so it runs under the same guard
        let resolved = match self.guarded(|| TestResolver::new(&self.registry).resolve(test)) {
            Ok(resolved) => resolved,
            Err(message) => {
                warn!(panic = %message, "test setup panicked");
                return TestOutcome::internal(format!("test setup panicked: {}", message));
            }
        };
        match resolved {
            Ok(resolved) => self.run_resolved(resolved),
            Err(err) => {
                warn!(error = %err, "test resolution failed");
                TestOutcome::internal(error_chain(&err))
            }
        }
    }

    /// Run an already-resolved test
    pub fn run_resolved(&self, resolved: ResolvedTest) -> TestOutcome {
        let ResolvedTest {
            method,
            receiver,
            args,
            expected,
            mut heap,
            ..
        } = resolved;
        let mut trace = ExecutionTrace::new(&method);

        let result = {
            let mut ctx = CallContext::new(&self.registry, &mut heap, &mut trace);
            self.guarded(|| ctx.invoke(&method, receiver.as_ref(), &args))
        };

        let result = match result {
            Ok(result) => result,
            Err(message) => {
                warn!(method = %method, panic = %message, "callee panicked");
                return TestOutcome::internal(format!("{} panicked: {}", method, message));
            }
        };

        let result = match result {
            Ok(value) if method.is_ctor => Ok(receiver.unwrap_or(value)),
            other => other,
        };
        let verdict = self.judge(&heap, &expected, result);
        match verdict.reason() {
            Some(reason) => warn!(method = %method, reason, "test failed"),
            None => debug!(method = %method, "test passed"),
        }
        TestOutcome {
            verdict,
            trace: Some(trace),
        }
    }

    /// Run `f`, turning a panic into its message when panics are caught
    fn guarded<T>(&self, f: impl FnOnce() -> T) -> Result<T, String> {
        if self.options.catch_panics {
            panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
        } else {
            Ok(f())
        }
    }

    fn judge(&self, heap: &Heap, expected: &Expected, actual: Result<Value, Thrown>) -> Verdict {
        let registry = &*self.registry;
        let render = |v: &Value| v.display(registry, heap).to_string();
        match (expected, actual) {
            (Expected::Value(e), Ok(a)) => {
                if structurally_equal(registry, heap, e, &a) {
                    Verdict::Success
                } else {
                    Verdict::fail(format!(
                        "Symbolic result is not equal to actual, expected {}, actual {}",
                        render(e),
                        render(&a)
                    ))
                }
            }
            (Expected::Value(e), Err(thrown)) => {
                let exception = Value::Ref(thrown.exception);
                Verdict::fail(format!(
                    "Expected {}, but the call threw {}",
                    render(e),
                    render(&exception)
                ))
            }
            (Expected::Exception { ty, .. }, Ok(a)) => Verdict::fail(format!(
                "Expected exception {}, but the call returned {}",
                registry.type_name(*ty),
                render(&a)
            )),
            (Expected::Exception { ty, instance }, Err(thrown)) => {
                let exception = Value::Ref(thrown.exception);
                let equal = match self.options.exception_policy {
                    ExceptionPolicy::RuntimeType => registry.type_of(heap, &exception) == Some(*ty),
                    ExceptionPolicy::Structural => structurally_equal(registry, heap, instance, &exception),
                };
                if equal {
                    Verdict::Success
                } else {
                    Verdict::fail(format!(
                        "Symbolic result is not equal to actual, expected {}, actual {}",
                        render(instance),
                        render(&exception)
                    ))
                }
            }
        }
    }

    /// Run every test of a batch, then verify coverage if all passed
    pub fn run_batch(&self, batch: &TestBatch) -> BatchReport {
        let method = self.registry.resolve_method(&batch.method);
        let outcomes = self.run_all(&batch.tests);

        let failures: Vec<&str> = outcomes.iter().filter_map(|o| o.verdict.reason()).collect();
        let verdict = if !failures.is_empty() {
            Verdict::fail(failures.join("\n"))
        } else {
            match method {
                Ok(method) => {
                    let traces: Vec<ExecutionTrace> = outcomes.iter().filter_map(|o| o.trace.clone()).collect();
                    match self.coverage.verify(&method, &traces) {
                        Ok(()) => Verdict::Success,
                        Err(reason) => Verdict::fail(reason),
                    }
                }
                Err(err) => Verdict::fail(format!("Internal error occurred:\n{}", err)),
            }
        };

        info!(
            method = %batch.method,
            tests = outcomes.len(),
            failed = outcomes.iter().filter(|o| !o.verdict.is_success()).count(),
            success = verdict.is_success(),
            "batch finished"
        );
        BatchReport { outcomes, verdict }
    }

    fn run_all(&self, tests: &[TestDescription]) -> Vec<TestOutcome> {
        let workers = self.options.workers().min(tests.len());
        if workers <= 1 {
            return tests.iter().map(|t| self.run_test(t)).collect();
        }

        let (work_tx, work_rx) = crossbeam::channel::unbounded::<usize>();
        let (done_tx, done_rx) = crossbeam::channel::unbounded::<(usize, TestOutcome)>();
        for i in 0..tests.len() {
            let _ = work_tx.send(i);
        }
        drop(work_tx);

        let scope = crossbeam::thread::scope(|s| {
            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let done_tx = done_tx.clone();
                s.spawn(move |_| {
                    for i in work_rx.iter() {
                        let outcome = self.run_test(&tests[i]);
                        if done_tx.send((i, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(done_tx);

        let mut slots: Vec<Option<TestOutcome>> = vec![None; tests.len()];
        for (i, outcome) in done_rx.iter() {
            slots[i] = Some(outcome);
        }
        if let Err(payload) = scope {
            warn!(panic = %panic_message(payload.as_ref()), "worker thread panicked");
        }
        slots
            .into_iter()
            .map(|o| o.unwrap_or_else(|| TestOutcome::internal("worker thread terminated".to_string())))
            .collect()
    }
}
