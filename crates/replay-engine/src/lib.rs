//! Replay Execution Engine
//!
//! Replays generated test descriptions against a registered implementation:
//! - **Registry**: types, fields, and methods resolved by descriptor (`registry` module)
//! - **Resolver**: statements to live values on a per-test heap (`resolver` module)
//! - **Codec**: byte-level encoding of value types (`codec` module)
//! - **Comparer**: structural equality over cyclic graphs (`compare` module)
//! - **Executor**: invocation, verdicts, and batches (`executor` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use replay_engine::{Executor, TestBatch, TypeRegistry};
//! use std::sync::Arc;
//!
//! let mut builder = TypeRegistry::builder();
//! // ... register modules ...
//! let registry = Arc::new(builder.build());
//!
//! let batch = TestBatch::from_json(&json)?;
//! let report = Executor::new(registry).run_batch(&batch);
//! assert!(report.verdict.is_success());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Values and object references
pub mod value;

/// Per-test object arena
pub mod heap;

/// Type/member registry and module builder
pub mod registry;

/// Byte-level value codec
pub mod codec;

/// Test statement wire model
pub mod stmt;

/// Object graph resolution
pub mod resolver;

/// Structural equality
pub mod compare;

/// Method invocation context
pub mod invoke;

/// Coverage traces and verification
pub mod coverage;

/// Test and batch execution
pub mod executor;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{CodecError, Fragment, ValueCodec};
pub use compare::{structurally_equal, ObjectComparer};
pub use coverage::{CoverageHit, CoverageVerifier, ExecutionTrace, ExpectedCoverage, MethodKey, NoCoverage};
pub use executor::{BatchReport, ExceptionPolicy, Executor, ExecutorOptions, TestOutcome, Verdict};
pub use heap::{Array, Heap, HeapError, HeapObject, Object};
pub use invoke::{CallContext, Thrown};
pub use registry::{
    InstanceField, MethodDef, ModuleBuilder, RegistryBuilder, RegistryError, TypeRegistry, WellKnown,
    CORE_LIBRARY,
};
pub use resolver::{Expected, InstanceTable, ResolveError, ResolvedTest, TestResolver};
pub use stmt::{Address, ByteSlice, Stmt, TestBatch, TestDescription};
pub use value::{ObjRef, StructValue, Value};

pub use replay_types;
