//! Structural equality of object graphs
//!
//! Two values are equal when they have the same runtime type and equal
//! contents, recursively. Scalars, strings, pointers, enums, and type handles
//! are compared as leaves. Arrays compare shape (rank, lengths, lower bounds)
//! and then elements in order. Objects compare every instance field except
//! delegate-typed fields and fields whose name contains `threadid`.
//!
//! Cycles are handled coinductively: a pair of references already under
//! comparison is assumed equal, so `a.next = a` equals `b.next = b`.

use crate::heap::{Heap, HeapObject};
use crate::registry::{InstanceField, TypeRegistry};
use crate::value::{ObjRef, Value};
use replay_types::{TypeId, TypeKind, TypeSource};
use rustc_hash::FxHashSet;
use tracing::trace;

/// Graph comparer over one heap
pub struct ObjectComparer<'a> {
    registry: &'a TypeRegistry,
    heap: &'a Heap,
    comparing: FxHashSet<(ObjRef, ObjRef)>,
}

impl<'a> ObjectComparer<'a> {
    /// Create a comparer
    pub fn new(registry: &'a TypeRegistry, heap: &'a Heap) -> Self {
        Self {
            registry,
            heap,
            comparing: FxHashSet::default(),
        }
    }

    /// Compare `expected` with `actual`; state is reset afterwards
    pub fn equals(&mut self, expected: &Value, actual: &Value) -> bool {
        let equal = self.compare(expected, actual);
        self.comparing.clear();
        equal
    }

    fn compare(&mut self, expected: &Value, actual: &Value) -> bool {
        match (expected.is_null(), actual.is_null()) {
            (true, true) => return true,
            (true, false) | (false, true) => return false,
            (false, false) => {}
        }

        let expected_ty = self.registry.type_of(self.heap, expected);
        if expected_ty != self.registry.type_of(self.heap, actual) {
            return false;
        }

        if let (Value::Ref(e), Value::Ref(a)) = (expected, actual) {
            if e == a {
                return true;
            }
            if !self.comparing.insert((*e, *a)) {
                trace!(expected = %e, actual = %a, "revisiting pair, assuming equal");
                return true;
            }
        }

        let heap = self.heap;
        match (expected, actual) {
            (Value::Ref(e), Value::Ref(a)) => match (heap.get(*e), heap.get(*a)) {
                (Ok(HeapObject::Array(ea)), Ok(HeapObject::Array(aa))) => {
                    if ea.rank() != aa.rank() || ea.lengths != aa.lengths || ea.lower_bounds != aa.lower_bounds {
                        return false;
                    }
                    ea.elements
                        .iter()
                        .zip(&aa.elements)
                        .all(|(x, y)| self.compare(x, y))
                }
                (Ok(HeapObject::Object(eo)), Ok(HeapObject::Object(ao))) => {
                    self.fields_equal(eo.ty, &eo.fields, &ao.fields)
                }
                _ => false,
            },
            (Value::Struct(e), Value::Struct(a)) => self.fields_equal(e.ty, &e.fields, &a.fields),
            // Boxed and inline instances of the same struct type
            (Value::Struct(s), Value::Ref(r)) | (Value::Ref(r), Value::Struct(s)) => match heap.object(*r) {
                Ok(obj) => self.fields_equal(s.ty, &s.fields, &obj.fields),
                Err(_) => false,
            },
            (e, a) => leaf_equal(e, a),
        }
    }

    fn fields_equal(&mut self, ty: TypeId, expected: &[Value], actual: &[Value]) -> bool {
        let Ok(fields) = self.registry.instance_fields(ty) else {
            return false;
        };
        if expected.len() != actual.len() {
            return false;
        }
        for field in fields.iter() {
            if self.is_ignored(field) {
                continue;
            }
            let equal = match (expected.get(field.slot), actual.get(field.slot)) {
                (Some(e), Some(a)) => self.compare(e, a),
                _ => false,
            };
            if !equal {
                return false;
            }
        }
        true
    }

    fn is_ignored(&self, field: &InstanceField) -> bool {
        if field.name.to_ascii_lowercase().contains("threadid") {
            return true;
        }
        self.registry
            .type_def(field.ty)
            .is_some_and(|d| d.kind == TypeKind::Delegate)
    }
}

fn float_eq_f32(a: f32, b: f32) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

fn float_eq_f64(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

fn leaf_equal(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::F32(a), Value::F32(b)) => float_eq_f32(*a, *b),
        (Value::F64(a), Value::F64(b)) => float_eq_f64(*a, *b),
        (a, b) => a == b,
    }
}

/// Compare two values with a fresh comparer
pub fn structurally_equal(registry: &TypeRegistry, heap: &Heap, expected: &Value, actual: &Value) -> bool {
    ObjectComparer::new(registry, heap).equals(expected, actual)
}
