//! Byte layout of value types
//!
//! The layout is sequential with natural alignment: each field is placed at
//! the next offset aligned to its own alignment, and the total size is
//! rounded up to the largest field alignment. Reference-typed fields and
//! pointer-sized scalars occupy [`POINTER_SIZE`] bytes. The same algorithm is
//! used for encoding and decoding, so the codec is self-consistent even where
//! it does not match a native ABI.

use crate::error::LayoutError;
use crate::ty::{FieldType, TypeDef, TypeId, TypeKind, POINTER_SIZE};
use std::sync::Arc;

/// Lookup of type definitions by id
pub trait TypeSource {
    /// Definition for `id`, if known
    fn type_def(&self, id: TypeId) -> Option<Arc<TypeDef>>;
}

/// Placement of one instance field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    /// Position of the field among the type's instance fields
    pub slot: usize,
    /// Field name
    pub name: String,
    /// Concrete field type
    pub ty: TypeId,
    /// Byte offset from the start of the value
    pub offset: usize,
    /// Byte width of the field
    pub size: usize,
}

/// Computed layout of a type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Total byte width
    pub size: usize,
    /// Alignment requirement
    pub align: usize,
    /// Field placements (structs only)
    pub fields: Vec<FieldLayout>,
    /// Offset of the payload of a `Nullable<T>`; the flag byte is at 0
    pub value_offset: Option<usize>,
}

impl Layout {
    fn scalar(size: usize) -> Self {
        Self {
            size,
            align: size.max(1),
            fields: Vec::new(),
            value_offset: None,
        }
    }
}

fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) / align * align
}

/// Compute the layout of `ty`
pub fn compute_layout<S: TypeSource + ?Sized>(source: &S, ty: TypeId) -> Result<Layout, LayoutError> {
    let mut stack = Vec::new();
    layout_of(source, ty, &mut stack)
}

fn layout_of<S: TypeSource + ?Sized>(
    source: &S,
    ty: TypeId,
    stack: &mut Vec<Arc<TypeDef>>,
) -> Result<Layout, LayoutError> {
    let def = source.type_def(ty).ok_or(LayoutError::UnknownType(ty.0))?;
    if def.is_generic_definition() {
        return Err(LayoutError::OpenGeneric { name: def.name.clone() });
    }

    match def.kind {
        TypeKind::Primitive(kind) => Ok(Layout::scalar(kind.size())),
        TypeKind::Enum { underlying } => Ok(Layout::scalar(underlying.size())),
        TypeKind::Void => Err(LayoutError::NoLayout { name: def.name.clone() }),
        TypeKind::String
        | TypeKind::Object
        | TypeKind::TypeHandle
        | TypeKind::Pointer
        | TypeKind::Delegate
        | TypeKind::Class { .. }
        | TypeKind::Array { .. } => Ok(Layout::scalar(POINTER_SIZE)),
        TypeKind::Nullable { inner } => {
            let payload = layout_of(source, inner, stack)?;
            let offset = payload.align;
            Ok(Layout {
                size: align_up(offset + payload.size, payload.align),
                align: payload.align,
                fields: Vec::new(),
                value_offset: Some(offset),
            })
        }
        TypeKind::Struct => {
            if stack.iter().any(|d| d.id == def.id) {
                let mut cycle: Vec<&str> = stack.iter().map(|d| d.name.as_str()).collect();
                cycle.push(&def.name);
                return Err(LayoutError::CircularLayout { cycle: cycle.join(" -> ") });
            }
            stack.push(Arc::clone(&def));

            let mut fields = Vec::new();
            let mut cursor = 0usize;
            let mut align = 1usize;
            for (slot, field) in def.instance_fields().enumerate() {
                let field_ty = match field.ty {
                    FieldType::Concrete(id) => id,
                    FieldType::Param(_) => {
                        return Err(LayoutError::OpenGeneric { name: def.name.clone() });
                    }
                };
                let inner = layout_of(source, field_ty, stack)?;
                let offset = align_up(cursor, inner.align);
                fields.push(FieldLayout {
                    slot,
                    name: field.name.clone(),
                    ty: field_ty,
                    offset,
                    size: inner.size,
                });
                cursor = offset + inner.size;
                align = align.max(inner.align);
            }

            stack.pop();
            Ok(Layout {
                size: align_up(cursor.max(1), align),
                align,
                fields,
                value_offset: None,
            })
        }
    }
}
