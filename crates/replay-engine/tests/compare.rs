//! Structural equality over sample object graphs

use replay_engine::{structurally_equal, Heap, ObjRef, ObjectComparer, StructValue, TypeRegistry, Value};
use replay_samples::SampleTypes;
use replay_types::{PrimitiveKind, TypeId};

struct Fixture {
    registry: TypeRegistry,
    types: SampleTypes,
    heap: Heap,
}

impl Fixture {
    fn new() -> Self {
        let mut builder = TypeRegistry::builder();
        let types = replay_samples::register(&mut builder).unwrap();
        Self {
            registry: builder.build(),
            types,
            heap: Heap::new(),
        }
    }

    fn slot(&self, ty: TypeId, name: &str) -> usize {
        self.registry
            .instance_fields(ty)
            .unwrap()
            .iter()
            .find(|f| f.name == name)
            .unwrap()
            .slot
    }

    fn object(&mut self, ty: TypeId) -> ObjRef {
        self.heap.alloc_object(&self.registry, ty).unwrap()
    }

    fn set(&mut self, target: ObjRef, name: &str, value: Value) {
        let ty = self.heap.get(target).unwrap().ty();
        let slot = self.slot(ty, name);
        self.heap.object_mut(target).unwrap().set_field(slot, value).unwrap();
    }

    fn node(&mut self, value: i32, next: Option<ObjRef>) -> ObjRef {
        let node = self.object(self.types.node);
        self.set(node, "value", Value::I32(value));
        if let Some(next) = next {
            self.set(node, "next", Value::Ref(next));
        }
        node
    }

    fn list(&mut self, values: &[i32]) -> ObjRef {
        let mut next = None;
        for v in values.iter().rev() {
            next = Some(self.node(*v, next));
        }
        next.unwrap()
    }

    fn ints(&mut self, lengths: &[usize], values: &[i32]) -> ObjRef {
        let int = self.registry.well_known().primitive(PrimitiveKind::I32);
        let r = self.heap.alloc_array(&self.registry, int, lengths).unwrap();
        for (i, v) in values.iter().enumerate() {
            self.heap.array_mut(r).unwrap().set(i as i64, Value::I32(*v)).unwrap();
        }
        r
    }

    fn eq(&self, a: &Value, b: &Value) -> bool {
        structurally_equal(&self.registry, &self.heap, a, b)
    }

    fn eq_refs(&self, a: ObjRef, b: ObjRef) -> bool {
        self.eq(&Value::Ref(a), &Value::Ref(b))
    }
}

// ============================================================================
// Nulls and leaves
// ============================================================================

#[test]
fn test_nulls() {
    let mut f = Fixture::new();
    let node = f.node(1, None);
    assert!(f.eq(&Value::Null, &Value::Null));
    assert!(f.eq(&Value::Null, &Value::NoValue));
    assert!(!f.eq(&Value::Null, &Value::Ref(node)));
    assert!(!f.eq(&Value::Ref(node), &Value::Null));
}

#[test]
fn test_leaf_types_must_match() {
    let f = Fixture::new();
    assert!(f.eq(&Value::I32(1), &Value::I32(1)));
    assert!(!f.eq(&Value::I32(1), &Value::I64(1)));
    assert!(!f.eq(&Value::I32(1), &Value::I32(2)));
    assert!(f.eq(&Value::string("a"), &Value::string("a")));
    assert!(!f.eq(&Value::string("a"), &Value::Null));
}

#[test]
fn test_nan_equals_nan() {
    let f = Fixture::new();
    assert!(f.eq(&Value::F64(f64::NAN), &Value::F64(f64::NAN)));
    assert!(f.eq(&Value::F32(f32::NAN), &Value::F32(f32::NAN)));
    assert!(!f.eq(&Value::F64(f64::NAN), &Value::F64(0.0)));
}

#[test]
fn test_enums_compare_type_and_bits() {
    let f = Fixture::new();
    let red = Value::enum_of(f.types.color, PrimitiveKind::U8, 0);
    let green = Value::enum_of(f.types.color, PrimitiveKind::U8, 1);
    assert!(f.eq(&red, &red.clone()));
    assert!(!f.eq(&red, &green));
    assert!(!f.eq(&red, &Value::U8(0)));
}

// ============================================================================
// Objects
// ============================================================================

#[test]
fn test_equal_lists() {
    let mut f = Fixture::new();
    let a = f.list(&[1, 2, 3]);
    let b = f.list(&[1, 2, 3]);
    assert!(f.eq_refs(a, b));
}

#[test]
fn test_lists_differing_in_tail() {
    let mut f = Fixture::new();
    let a = f.list(&[1, 2, 3]);
    let b = f.list(&[1, 2, 4]);
    let c = f.list(&[1, 2]);
    assert!(!f.eq_refs(a, b));
    assert!(!f.eq_refs(a, c));
}

#[test]
fn test_self_cycles_are_equal() {
    let mut f = Fixture::new();
    let a = f.node(1, None);
    f.set(a, "next", Value::Ref(a));
    let b = f.node(1, None);
    f.set(b, "next", Value::Ref(b));
    assert!(f.eq_refs(a, b));
}

#[test]
fn test_cycles_with_different_values() {
    let mut f = Fixture::new();
    let a = f.node(1, None);
    f.set(a, "next", Value::Ref(a));
    let b1 = f.node(1, None);
    let b2 = f.node(2, Some(b1));
    f.set(b1, "next", Value::Ref(b2));
    assert!(!f.eq_refs(a, b1));
}

#[test]
fn test_bisimilar_cycles_are_equal() {
    let mut f = Fixture::new();
    let a = f.node(7, None);
    f.set(a, "next", Value::Ref(a));
    let b1 = f.node(7, None);
    let b2 = f.node(7, Some(b1));
    f.set(b1, "next", Value::Ref(b2));
    assert!(f.eq_refs(a, b1));
}

#[test]
fn test_reflexive() {
    let mut f = Fixture::new();
    let list = f.list(&[3, 1, 4]);
    let cycle = f.node(1, None);
    f.set(cycle, "next", Value::Ref(cycle));
    let array = f.ints(&[3], &[1, 2, 3]);
    for value in [
        Value::Ref(list),
        Value::Ref(cycle),
        Value::Ref(array),
        Value::string("s"),
        Value::F64(f64::NAN),
    ] {
        assert!(f.eq(&value, &value.clone()), "{:?}", value);
    }
}

#[test]
fn test_different_classes() {
    let mut f = Fixture::new();
    let node = f.object(f.types.node);
    let counter = f.object(f.types.counter);
    assert!(!f.eq_refs(node, counter));
}

#[test]
fn test_skips_delegates_and_thread_ids() {
    let mut f = Fixture::new();
    // Any reference will do, the field is skipped by type
    let callback = f.node(0, None);
    let a = f.object(f.types.counter);
    f.set(a, "count", Value::I32(2));
    f.set(a, "managedThreadId", Value::I32(1));
    let b = f.object(f.types.counter);
    f.set(b, "count", Value::I32(2));
    f.set(b, "managedThreadId", Value::I32(9));
    f.set(b, "onChange", Value::Ref(callback));
    assert!(f.eq_refs(a, b));

    f.set(b, "label", Value::string("b"));
    assert!(!f.eq_refs(a, b));
}

#[test]
fn test_exception_message_and_stack() {
    let mut f = Fixture::new();
    let ty = f.registry.well_known().divide_by_zero;
    let a = f.object(ty);
    let b = f.object(ty);
    assert!(f.eq_refs(a, b));
    f.set(b, "stack_trace", Value::string("   at Samples.Math.Divide"));
    assert!(!f.eq_refs(a, b));
}

// ============================================================================
// Arrays
// ============================================================================

#[test]
fn test_arrays() {
    let mut f = Fixture::new();
    let a = f.ints(&[3], &[1, 2, 3]);
    let b = f.ints(&[3], &[1, 2, 3]);
    let shorter = f.ints(&[2], &[1, 2]);
    let different = f.ints(&[3], &[1, 2, 4]);
    assert!(f.eq_refs(a, b));
    assert!(!f.eq_refs(a, shorter));
    assert!(!f.eq_refs(a, different));
}

#[test]
fn test_array_rank_and_dimensions() {
    let mut f = Fixture::new();
    let flat = f.ints(&[4], &[1, 2, 3, 4]);
    let square = f.ints(&[2, 2], &[1, 2, 3, 4]);
    let square2 = f.ints(&[2, 2], &[1, 2, 3, 4]);
    let wide = f.ints(&[1, 4], &[1, 2, 3, 4]);
    assert!(!f.eq_refs(flat, square));
    assert!(f.eq_refs(square, square2));
    assert!(!f.eq_refs(square, wide));
}

#[test]
fn test_array_lower_bounds() {
    let mut f = Fixture::new();
    let a = f.ints(&[2, 2], &[1, 2, 3, 4]);
    let b = f.ints(&[2, 2], &[1, 2, 3, 4]);
    f.heap.array_mut(b).unwrap().lower_bounds = vec![1, 0];
    assert!(!f.eq_refs(a, b));
}

#[test]
fn test_arrays_of_cyclic_nodes() {
    let mut f = Fixture::new();
    let a = f.node(1, None);
    f.set(a, "next", Value::Ref(a));
    let b = f.node(1, None);
    f.set(b, "next", Value::Ref(b));
    let xs = f.heap.alloc_array(&f.registry, f.types.node, &[2]).unwrap();
    let ys = f.heap.alloc_array(&f.registry, f.types.node, &[2]).unwrap();
    for (arr, node) in [(xs, a), (ys, b)] {
        f.heap.array_mut(arr).unwrap().set(0, Value::Ref(node)).unwrap();
        f.heap.array_mut(arr).unwrap().set(1, Value::Ref(node)).unwrap();
    }
    assert!(f.eq_refs(xs, ys));
}

// ============================================================================
// Structs
// ============================================================================

#[test]
fn test_boxed_and_inline_struct() {
    let mut f = Fixture::new();
    let point = f.types.point;
    let boxed = f.object(point);
    f.set(boxed, "x", Value::I32(1));
    f.set(boxed, "y", Value::I32(2));
    let inline = Value::Struct(Box::new(StructValue {
        ty: point,
        fields: vec![Value::I32(1), Value::I32(2)],
    }));
    assert!(f.eq(&inline, &Value::Ref(boxed)));
    assert!(f.eq(&Value::Ref(boxed), &inline));

    let other = Value::Struct(Box::new(StructValue {
        ty: point,
        fields: vec![Value::I32(1), Value::I32(3)],
    }));
    assert!(!f.eq(&inline, &other));
}

#[test]
fn test_comparer_state_resets_between_calls() {
    let mut f = Fixture::new();
    let a = f.node(1, None);
    f.set(a, "next", Value::Ref(a));
    let b = f.node(1, None);
    f.set(b, "next", Value::Ref(b));
    let c = f.node(2, None);
    f.set(c, "next", Value::Ref(c));

    let mut comparer = ObjectComparer::new(&f.registry, &f.heap);
    assert!(comparer.equals(&Value::Ref(a), &Value::Ref(b)));
    assert!(!comparer.equals(&Value::Ref(a), &Value::Ref(c)));
    assert!(comparer.equals(&Value::Ref(a), &Value::Ref(b)));
}
