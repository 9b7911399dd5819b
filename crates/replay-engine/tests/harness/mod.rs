//! Shared helpers for the engine integration tests
//!
//! Test descriptions are built against the `Samples` module.

#![allow(dead_code)]

use replay_engine::{
    Address, ByteSlice, ExceptionPolicy, Executor, ExecutorOptions, Stmt, TestDescription, TypeRegistry, Verdict,
    CORE_LIBRARY,
};
use replay_samples::SAMPLES_MODULE;
use replay_types::{FieldDescriptor, MethodDescriptor, TypeDescriptor};
use std::sync::Arc;

// ============================================================================
// Descriptors
// ============================================================================

pub fn registry() -> Arc<TypeRegistry> {
    Arc::new(replay_samples::registry().expect("sample module registers"))
}

pub fn samples(name: &str) -> TypeDescriptor {
    TypeDescriptor::named(SAMPLES_MODULE, format!("Samples.{}", name))
}

pub fn core(name: &str) -> TypeDescriptor {
    TypeDescriptor::named(CORE_LIBRARY, format!("System.{}", name))
}

pub fn int_long_pair() -> TypeDescriptor {
    samples("Pair`2").with_args(vec![core("Int32"), core("Int64")])
}

pub fn math(name: &str) -> MethodDescriptor {
    MethodDescriptor::new(samples("Math"), name)
}

pub fn field(ty: TypeDescriptor, name: &str) -> FieldDescriptor {
    FieldDescriptor::new(ty, name)
}

// ============================================================================
// Statements
// ============================================================================

pub fn int(value: i32) -> Stmt {
    Stmt::int32(value)
}

pub fn long(value: i64) -> Stmt {
    Stmt::Int64 { value, ty: None }
}

pub fn string(value: &str) -> Stmt {
    Stmt::String {
        value: value.to_string(),
    }
}

pub fn color(value: u8) -> Stmt {
    Stmt::UInt8 {
        value,
        ty: Some(samples("Color")),
    }
}

pub fn new_object(ty: TypeDescriptor, address: Address) -> Stmt {
    Stmt::NewObject { ty, address }
}

pub fn new_int_array(size: usize, address: Address) -> Stmt {
    Stmt::NewArray {
        element_type: core("Int32"),
        size,
        address,
    }
}

pub fn cyclic(address: Address) -> Stmt {
    Stmt::CyclicReference { address }
}

pub fn set_field(instance: Stmt, field: FieldDescriptor, value: Stmt) -> Stmt {
    Stmt::SetObjectField {
        instance: Box::new(instance),
        field,
        value: Box::new(value),
    }
}

pub fn set_index(instance: Stmt, index: i64, value: Stmt) -> Stmt {
    Stmt::SetArrayIndex {
        instance: Box::new(instance),
        index,
        value: Box::new(value),
    }
}

pub fn call_static(method: MethodDescriptor, args: Vec<Stmt>) -> Stmt {
    Stmt::StaticMethodCall { method, args }
}

pub fn call_instance(method: MethodDescriptor, instance: Stmt, args: Vec<Stmt>) -> Stmt {
    Stmt::InstanceMethodCall {
        method,
        instance: Box::new(instance),
        args,
    }
}

pub fn point_bytes(x: i32, y: i32) -> Stmt {
    Stmt::ByteSliceCombine {
        ty: samples("Point"),
        slices: vec![
            ByteSlice {
                value: int(x),
                start: 0,
                end: 4,
            },
            ByteSlice {
                value: int(y),
                start: 4,
                end: 8,
            },
        ],
    }
}

/// Arrange statements filling an `int[]` bound to `address`
pub fn int_array(address: Address, values: &[i32]) -> Vec<Stmt> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| set_index(new_int_array(values.len(), address), i as i64, int(*v)))
        .collect()
}

/// Arrange statements for a `Samples.Node` chain bound to consecutive
/// addresses starting at `first`
pub fn node_chain(first: Address, values: &[i32]) -> Vec<Stmt> {
    let mut stmts = Vec::new();
    for (i, v) in values.iter().enumerate() {
        let address = first + i as Address;
        stmts.push(set_field(
            new_object(samples("Node"), address),
            field(samples("Node"), "value"),
            int(*v),
        ));
        if i + 1 < values.len() {
            stmts.push(set_field(
                new_object(samples("Node"), address),
                field(samples("Node"), "next"),
                new_object(samples("Node"), address + 1),
            ));
        }
    }
    stmts
}

pub fn test(arrange: Vec<Stmt>, call: Stmt, expected: Stmt) -> TestDescription {
    TestDescription { arrange, call, expected }
}

// ============================================================================
// Running
// ============================================================================

pub fn run(test: &TestDescription) -> Verdict {
    Executor::new(registry()).run_test(test).verdict
}

pub fn run_with(policy: ExceptionPolicy, test: &TestDescription) -> Verdict {
    Executor::new(registry())
        .with_options(ExecutorOptions::default().with_exception_policy(policy))
        .run_test(test)
        .verdict
}

pub fn expect_success(test: &TestDescription) {
    let verdict = run(test);
    assert!(verdict.is_success(), "expected success, got {:?}", verdict);
}

pub fn expect_fail(test: &TestDescription) -> String {
    match run(test) {
        Verdict::Fail { reason } => reason,
        Verdict::Success => panic!("expected failure for {:?}", test.call),
    }
}
