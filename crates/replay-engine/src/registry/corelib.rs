//! Core library types
//!
//! Every registry starts with these. Descriptors name them under
//! [`CORE_LIBRARY`] by their usual fully-qualified names.

use super::builder::Draft;
use super::WellKnown;
use replay_types::{FieldType, PrimitiveKind, TypeId, TypeKind};

/// Module identity of the core library
pub const CORE_LIBRARY: &str = "System.Private.CoreLib";

pub(super) fn register(draft: &mut Draft) -> WellKnown {
    let m = CORE_LIBRARY;

    let mut primitives = [TypeId(0); PrimitiveKind::ALL.len()];
    for (slot, kind) in primitives.iter_mut().zip(PrimitiveKind::ALL) {
        *slot = draft.declare(m, kind.type_name(), TypeKind::Primitive(kind), 0);
    }
    let bool_ty = primitives[PrimitiveKind::Bool as usize];

    let object = draft.declare(m, "System.Object", TypeKind::Object, 0);
    let string = draft.declare(m, "System.String", TypeKind::String, 0);
    let void = draft.declare(m, "System.Void", TypeKind::Void, 0);
    let type_handle = draft.declare(m, "System.Type", TypeKind::TypeHandle, 0);
    let pointer = draft.declare(m, "System.Reflection.Pointer", TypeKind::Pointer, 0);
    let delegate = draft.declare(m, "System.Delegate", TypeKind::Delegate, 0);

    let nullable = draft.declare(m, "System.Nullable`1", TypeKind::Struct, 1);
    draft.add_field(nullable, "hasValue", FieldType::Concrete(bool_ty), false);
    draft.add_field(nullable, "value", FieldType::Param(0), false);
    draft.nullable = Some(nullable);

    let exception = draft.declare(m, "System.Exception", TypeKind::Class { parent: None }, 0);
    draft.mark_exception(exception);
    draft.add_field(exception, "message", FieldType::Concrete(string), false);
    draft.add_field(exception, "stack_trace", FieldType::Concrete(string), false);

    let class = |parent: TypeId| TypeKind::Class { parent: Some(parent) };
    let system = draft.declare(m, "System.SystemException", class(exception), 0);
    let arithmetic = draft.declare(m, "System.ArithmeticException", class(system), 0);
    let divide_by_zero = draft.declare(m, "System.DivideByZeroException", class(arithmetic), 0);
    let overflow = draft.declare(m, "System.OverflowException", class(arithmetic), 0);
    let null_reference = draft.declare(m, "System.NullReferenceException", class(system), 0);
    let index_out_of_range = draft.declare(m, "System.IndexOutOfRangeException", class(system), 0);
    let invalid_operation = draft.declare(m, "System.InvalidOperationException", class(system), 0);
    let argument = draft.declare(m, "System.ArgumentException", class(system), 0);

    WellKnown {
        primitives,
        object,
        string,
        void,
        type_handle,
        pointer,
        delegate,
        nullable,
        exception,
        arithmetic,
        divide_by_zero,
        overflow,
        null_reference,
        index_out_of_range,
        invalid_operation,
        argument,
    }
}
