//! Runtime values
//!
//! A [`Value`] is anything that can sit in an argument, a field, or an array
//! slot. Scalars and strings are stored inline, value-type instances are
//! stored inline as [`StructValue`], and reference-type instances live in the
//! per-test [`Heap`](crate::heap::Heap) and are addressed by [`ObjRef`].

use crate::heap::{Heap, HeapObject};
use crate::registry::TypeRegistry;
use replay_types::{PrimitiveKind, TypeId};
use std::fmt;
use std::sync::Arc;

/// Handle to an object in a [`Heap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(pub(crate) u32);

impl ObjRef {
    /// Arena index of the object
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Unboxed value-type instance
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    /// Struct (or generic struct instantiation) type
    pub ty: TypeId,
    /// Instance fields in declaration order
    pub fields: Vec<Value>,
}

/// A runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null reference
    Null,
    /// Empty `Nullable<T>`
    NoValue,
    /// Boolean
    Bool(bool),
    /// UTF-16 code unit
    Char(u16),
    /// Signed 8-bit
    I8(i8),
    /// Signed 16-bit
    I16(i16),
    /// Signed 32-bit
    I32(i32),
    /// Signed 64-bit
    I64(i64),
    /// Unsigned 8-bit
    U8(u8),
    /// Unsigned 16-bit
    U16(u16),
    /// Unsigned 32-bit
    U32(u32),
    /// Unsigned 64-bit
    U64(u64),
    /// Single precision float
    F32(f32),
    /// Double precision float
    F64(f64),
    /// Signed native int
    IntPtr(i64),
    /// Unsigned native int
    UIntPtr(u64),
    /// Unmanaged pointer
    Pointer(u64),
    /// Immutable string
    Str(Arc<str>),
    /// Enum value; `bits` holds the underlying integer masked to its width
    Enum {
        /// Enum type
        ty: TypeId,
        /// Underlying bits
        bits: u64,
    },
    /// Inline value-type instance
    Struct(Box<StructValue>),
    /// Reference to a heap object
    Ref(ObjRef),
    /// Runtime type handle
    Type(TypeId),
}

fn mask(kind: PrimitiveKind, bits: u64) -> u64 {
    match kind.size() {
        8 => bits,
        n => bits & ((1u64 << (n * 8)) - 1),
    }
}

impl Value {
    /// Build a string value
    pub fn string(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    /// Null-like values have no runtime type
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null | Value::NoValue)
    }

    /// Primitive kind of an inline scalar
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        Some(match self {
            Value::Bool(_) => PrimitiveKind::Bool,
            Value::Char(_) => PrimitiveKind::Char,
            Value::I8(_) => PrimitiveKind::I8,
            Value::I16(_) => PrimitiveKind::I16,
            Value::I32(_) => PrimitiveKind::I32,
            Value::I64(_) => PrimitiveKind::I64,
            Value::U8(_) => PrimitiveKind::U8,
            Value::U16(_) => PrimitiveKind::U16,
            Value::U32(_) => PrimitiveKind::U32,
            Value::U64(_) => PrimitiveKind::U64,
            Value::F32(_) => PrimitiveKind::F32,
            Value::F64(_) => PrimitiveKind::F64,
            Value::IntPtr(_) => PrimitiveKind::IntPtr,
            Value::UIntPtr(_) => PrimitiveKind::UIntPtr,
            _ => return None,
        })
    }

    /// Raw little-endian bits of a scalar, truncated to the kind's width
    pub fn to_bits(&self) -> Option<u64> {
        let (kind, raw) = match *self {
            Value::Bool(b) => (PrimitiveKind::Bool, b as u64),
            Value::Char(c) => (PrimitiveKind::Char, c as u64),
            Value::I8(v) => (PrimitiveKind::I8, v as u64),
            Value::I16(v) => (PrimitiveKind::I16, v as u64),
            Value::I32(v) => (PrimitiveKind::I32, v as u64),
            Value::I64(v) => (PrimitiveKind::I64, v as u64),
            Value::U8(v) => (PrimitiveKind::U8, v as u64),
            Value::U16(v) => (PrimitiveKind::U16, v as u64),
            Value::U32(v) => (PrimitiveKind::U32, v as u64),
            Value::U64(v) => (PrimitiveKind::U64, v),
            Value::F32(v) => (PrimitiveKind::F32, v.to_bits() as u64),
            Value::F64(v) => (PrimitiveKind::F64, v.to_bits()),
            Value::IntPtr(v) => (PrimitiveKind::IntPtr, v as u64),
            Value::UIntPtr(v) => (PrimitiveKind::UIntPtr, v),
            _ => return None,
        };
        Some(mask(kind, raw))
    }

    /// Rebuild a scalar of `kind` from raw bits, sign-extending where needed
    pub fn from_bits(kind: PrimitiveKind, bits: u64) -> Self {
        let bits = mask(kind, bits);
        match kind {
            PrimitiveKind::Bool => Value::Bool(bits != 0),
            PrimitiveKind::Char => Value::Char(bits as u16),
            PrimitiveKind::I8 => Value::I8(bits as u8 as i8),
            PrimitiveKind::I16 => Value::I16(bits as u16 as i16),
            PrimitiveKind::I32 => Value::I32(bits as u32 as i32),
            PrimitiveKind::I64 => Value::I64(bits as i64),
            PrimitiveKind::U8 => Value::U8(bits as u8),
            PrimitiveKind::U16 => Value::U16(bits as u16),
            PrimitiveKind::U32 => Value::U32(bits as u32),
            PrimitiveKind::U64 => Value::U64(bits),
            PrimitiveKind::F32 => Value::F32(f32::from_bits(bits as u32)),
            PrimitiveKind::F64 => Value::F64(f64::from_bits(bits)),
            PrimitiveKind::IntPtr => {
                let shift = 64 - kind.size() * 8;
                Value::IntPtr(((bits << shift) as i64) >> shift)
            }
            PrimitiveKind::UIntPtr => Value::UIntPtr(bits),
        }
    }

    /// Enum value of `ty` from an integer constant of its underlying kind
    pub fn enum_of(ty: TypeId, underlying: PrimitiveKind, bits: u64) -> Self {
        Value::Enum {
            ty,
            bits: mask(underlying, bits),
        }
    }

    /// Heap reference, if any
    pub fn as_obj(&self) -> Option<ObjRef> {
        match self {
            Value::Ref(r) => Some(*r),
            _ => None,
        }
    }

    /// 32-bit integer payload
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// 64-bit integer payload, widening smaller signed integers
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::I8(v) => Some(v as i64),
            Value::I16(v) => Some(v as i64),
            Value::I32(v) => Some(v as i64),
            Value::I64(v) => Some(v),
            Value::IntPtr(v) => Some(v),
            _ => None,
        }
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// String payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value with type names and heap contents resolved
    pub fn display<'a>(&'a self, registry: &'a TypeRegistry, heap: &'a Heap) -> ValueDisplay<'a> {
        ValueDisplay {
            value: self,
            registry,
            heap,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

/// Display adapter produced by [`Value::display`]
///
/// Objects are printed one level deep; nested references print as
/// `TypeName@index` so cyclic graphs terminate.
pub struct ValueDisplay<'a> {
    value: &'a Value,
    registry: &'a TypeRegistry,
    heap: &'a Heap,
}

impl ValueDisplay<'_> {
    fn type_name(&self, ty: TypeId) -> String {
        self.registry.type_name(ty)
    }

    fn shallow(&self, f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
        match value {
            Value::Ref(r) => match self.heap.get(*r) {
                Ok(obj) => write!(f, "{}{}", self.type_name(obj.ty()), r),
                Err(_) => write!(f, "<dangling {}>", r),
            },
            Value::Struct(s) => write!(f, "{} {{..}}", self.type_name(s.ty)),
            other => write!(f, "{}", other.display(self.registry, self.heap)),
        }
    }
}

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Null => write!(f, "null"),
            Value::NoValue => write!(f, "null (no value)"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Char(c) => match char::from_u32(*c as u32) {
                Some(ch) => write!(f, "'{}'", ch),
                None => write!(f, "'\\u{{{:04x}}}'", c),
            },
            Value::I8(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U8(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::IntPtr(v) => write!(f, "{}", v),
            Value::UIntPtr(v) => write!(f, "{}", v),
            Value::Pointer(p) => write!(f, "{:#x}", p),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Enum { ty, bits } => write!(f, "{}({})", self.type_name(*ty), bits),
            Value::Type(ty) => write!(f, "typeof({})", self.type_name(*ty)),
            Value::Struct(s) => {
                write!(f, "{} {{ ", self.type_name(s.ty))?;
                for (i, field) in s.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    self.shallow(f, field)?;
                }
                write!(f, " }}")
            }
            Value::Ref(r) => match self.heap.get(*r) {
                Ok(HeapObject::Object(obj)) => {
                    write!(f, "{}{} {{ ", self.type_name(obj.ty), r)?;
                    for (i, field) in obj.fields.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        self.shallow(f, field)?;
                    }
                    write!(f, " }}")
                }
                Ok(HeapObject::Array(arr)) => {
                    write!(f, "{}{} [", self.type_name(arr.ty), r)?;
                    for (i, elem) in arr.elements.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        self.shallow(f, elem)?;
                    }
                    write!(f, "]")
                }
                Err(_) => write!(f, "<dangling {}>", r),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_round_trip_sign_extension() {
        let v = Value::I8(-3);
        let bits = v.to_bits().unwrap();
        assert_eq!(bits, 0xfd);
        assert_eq!(Value::from_bits(PrimitiveKind::I8, bits), v);
        assert_eq!(Value::from_bits(PrimitiveKind::IntPtr, u64::MAX), Value::IntPtr(-1));
    }

    #[test]
    fn test_from_bits_truncates() {
        assert_eq!(Value::from_bits(PrimitiveKind::U8, 0x1ff), Value::U8(0xff));
        assert_eq!(Value::from_bits(PrimitiveKind::Bool, 2), Value::Bool(true));
    }

    #[test]
    fn test_enum_bits_are_masked() {
        let ty = TypeId(3);
        assert_eq!(
            Value::enum_of(ty, PrimitiveKind::U8, u64::MAX),
            Value::Enum { ty, bits: 0xff }
        );
    }

    #[test]
    fn test_null_like() {
        assert!(Value::Null.is_null());
        assert!(Value::NoValue.is_null());
        assert!(!Value::I32(0).is_null());
        assert_eq!(Value::I32(7).primitive_kind(), Some(PrimitiveKind::I32));
        assert_eq!(Value::string("x").primitive_kind(), None);
    }
}
