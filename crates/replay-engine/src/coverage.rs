//! Coverage probes and batch-level coverage verification
//!
//! Method bodies report probe hits through
//! [`CallContext::hit`](crate::invoke::CallContext::hit). Each invocation
//! owns its [`ExecutionTrace`], so concurrent tests never share
//! instrumentation state.

use crate::registry::MethodDef;
use replay_types::TypeId;
use rustc_hash::FxHashSet;

/// Identity of a method across modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodKey {
    /// Declaring type
    pub declaring: TypeId,
    /// Method token
    pub token: u32,
}

impl From<&MethodDef> for MethodKey {
    fn from(m: &MethodDef) -> Self {
        Self {
            declaring: m.declaring,
            token: m.token,
        }
    }
}

/// One probe hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoverageHit {
    /// Method that reported the hit
    pub method: MethodKey,
    /// Probe offset inside the method
    pub offset: u32,
}

/// Instrumentation state of a single invocation
#[derive(Debug, Clone)]
pub struct ExecutionTrace {
    /// Method the test explores
    pub entry: Option<MethodKey>,
    /// Logical thread id reported to the callee
    pub thread_id: u32,
    hits: FxHashSet<CoverageHit>,
}

impl ExecutionTrace {
    /// Trace for an invocation whose entry point is `method`
    pub fn new(method: &MethodDef) -> Self {
        Self {
            entry: Some(MethodKey::from(method)),
            thread_id: 0,
            hits: FxHashSet::default(),
        }
    }

    /// Trace with no entry point (nested calls during test setup)
    pub fn detached() -> Self {
        Self {
            entry: None,
            thread_id: 0,
            hits: FxHashSet::default(),
        }
    }

    /// Record a probe hit; repeated hits of one probe are kept once
    pub fn record(&mut self, method: MethodKey, offset: u32) {
        self.hits.insert(CoverageHit { method, offset });
    }

    /// Distinct hits, unordered
    pub fn hits(&self) -> impl Iterator<Item = &CoverageHit> + '_ {
        self.hits.iter()
    }

    /// Distinct offsets hit inside the entry method
    pub fn entry_offsets(&self) -> FxHashSet<u32> {
        match self.entry {
            Some(entry) => self
                .hits
                .iter()
                .filter(|h| h.method == entry)
                .map(|h| h.offset)
                .collect(),
            None => FxHashSet::default(),
        }
    }
}

/// Post-batch coverage check, run only when every test passed
pub trait CoverageVerifier: Send + Sync {
    /// `Ok` when coverage is acceptable, otherwise a failure message
    fn verify(&self, method: &MethodDef, traces: &[ExecutionTrace]) -> Result<(), String>;
}

/// Accepts any coverage
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCoverage;

impl CoverageVerifier for NoCoverage {
    fn verify(&self, _method: &MethodDef, _traces: &[ExecutionTrace]) -> Result<(), String> {
        Ok(())
    }
}

/// Compares distinct entry-method probes against the method's declared
/// expected coverage
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpectedCoverage;

impl CoverageVerifier for ExpectedCoverage {
    fn verify(&self, method: &MethodDef, traces: &[ExecutionTrace]) -> Result<(), String> {
        let expected = method
            .expected_coverage
            .ok_or_else(|| format!("Method {} does not declare expected coverage", method))?;
        let mut offsets = FxHashSet::default();
        for trace in traces {
            offsets.extend(trace.entry_offsets());
        }
        if offsets.len() == expected {
            Ok(())
        } else {
            Err(format!(
                "Actual coverage of {} is {} probes, expected {}",
                method.full_name,
                offsets.len(),
                expected
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_offsets_ignore_other_methods() {
        let entry = MethodKey {
            declaring: TypeId(1),
            token: 0x0600_0001,
        };
        let other = MethodKey {
            declaring: TypeId(1),
            token: 0x0600_0002,
        };
        let mut trace = ExecutionTrace {
            entry: Some(entry),
            thread_id: 0,
            hits: FxHashSet::default(),
        };
        trace.record(entry, 0);
        trace.record(other, 1);
        trace.record(entry, 0);
        trace.record(entry, 4);
        assert_eq!(trace.hits().count(), 3);
        let offsets = trace.entry_offsets();
        assert_eq!(offsets.len(), 2);
        assert!(offsets.contains(&4));
    }

    #[test]
    fn test_detached_trace_has_no_entry_offsets() {
        let mut trace = ExecutionTrace::detached();
        trace.record(
            MethodKey {
                declaring: TypeId(0),
                token: 1,
            },
            3,
        );
        assert!(trace.entry_offsets().is_empty());
    }

    #[test]
    fn test_hot_loop_hits_are_stored_once() {
        let entry = MethodKey {
            declaring: TypeId(2),
            token: 0x0600_0003,
        };
        let mut trace = ExecutionTrace::detached();
        trace.entry = Some(entry);
        for _ in 0..100_000 {
            trace.record(entry, 8);
            trace.record(entry, 12);
        }
        assert_eq!(trace.hits().count(), 2);
        assert_eq!(trace.entry_offsets().len(), 2);
    }
}
