//! Raw byte codec for value-type instances
//!
//! Scalars are little-endian at their natural width. Enums use their
//! underlying kind. Structs place each field at its layout offset.
//! `Nullable<T>` is a flag byte at offset 0 followed by the payload at the
//! layout's value offset. A reference-typed slot can only be encoded or
//! decoded when null (all zero bytes).
//!
//! [`ValueCodec::combine`] builds a value-type instance by splicing the byte
//! encodings of several values into one buffer, which is how the generator
//! describes unions and reinterpreted memory.

use crate::heap::{Heap, HeapObject};
use crate::registry::TypeRegistry;
use crate::value::{StructValue, Value};
use replay_types::{LayoutError, TypeDef, TypeId, TypeKind, POINTER_SIZE};
use thiserror::Error;

/// Codec errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Value kind has no byte representation
    #[error("Unsupported value for byte conversion: {0}")]
    Unsupported(String),

    /// Value does not match the requested type
    #[error("Cannot encode {actual} as {expected}")]
    TypeMismatch {
        /// Requested type
        expected: String,
        /// Runtime type of the value
        actual: String,
    },

    /// Byte count does not match the type's width
    #[error("Layout mismatch for {ty}: expected {expected} bytes, got {actual}")]
    LayoutMismatch {
        /// Target type
        ty: String,
        /// Width of the type
        expected: usize,
        /// Bytes supplied
        actual: usize,
    },

    /// Fragment range does not fit the target or its own encoding
    #[error("Fragment [{start}, {end}) does not fit {ty} ({width} bytes, fragment encodes {available})")]
    FragmentRange {
        /// Target type
        ty: String,
        /// Inclusive start offset
        start: usize,
        /// Exclusive end offset
        end: usize,
        /// Width of the target
        width: usize,
        /// Bytes produced by the fragment's value
        available: usize,
    },

    /// Non-zero bytes where a reference is expected
    #[error("Non-zero bytes for reference type {0}; only null references can be decoded")]
    NonZeroReference(String),

    /// Layout could not be computed
    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),
}

/// A value spliced into `[start, end)` of a combined instance
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Value whose encoding supplies the bytes
    pub value: Value,
    /// Inclusive start offset in the target
    pub start: usize,
    /// Exclusive end offset in the target
    pub end: usize,
}

/// Byte codec bound to a registry and the heap holding boxed operands
pub struct ValueCodec<'a> {
    registry: &'a TypeRegistry,
    heap: &'a Heap,
}

fn read_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}

impl<'a> ValueCodec<'a> {
    /// Create a codec
    pub fn new(registry: &'a TypeRegistry, heap: &'a Heap) -> Self {
        Self { registry, heap }
    }

    fn def(&self, ty: TypeId) -> Result<std::sync::Arc<TypeDef>, CodecError> {
        self.registry
            .def(ty)
            .map_err(|_| CodecError::Layout(LayoutError::UnknownType(ty.0)))
    }

    fn mismatch(&self, value: &Value, ty: &TypeDef) -> CodecError {
        CodecError::TypeMismatch {
            expected: ty.name.clone(),
            actual: match self.registry.type_of(self.heap, value) {
                Some(t) => self.registry.type_name(t),
                None => "null".to_string(),
            },
        }
    }

    /// Byte width of `ty`
    pub fn width(&self, ty: TypeId) -> Result<usize, CodecError> {
        Ok(self.registry.layout(ty)?.size)
    }

    /// Encode a value using its runtime type; null encodes as a zero pointer
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        match value {
            Value::Null => Ok(vec![0; POINTER_SIZE]),
            Value::NoValue => Err(CodecError::Unsupported(
                "empty nullable without a declared type".to_string(),
            )),
            _ => match self.registry.type_of(self.heap, value) {
                Some(ty) => self.encode_as(value, ty),
                None => Err(CodecError::Unsupported(format!("{:?}", value))),
            },
        }
    }

    /// Encode a value as an instance of `ty`
    pub fn encode_as(&self, value: &Value, ty: TypeId) -> Result<Vec<u8>, CodecError> {
        let mut buf = vec![0u8; self.width(ty)?];
        self.write(value, ty, &mut buf)?;
        Ok(buf)
    }

    fn write(&self, value: &Value, ty: TypeId, out: &mut [u8]) -> Result<(), CodecError> {
        let def = self.def(ty)?;
        match def.kind {
            TypeKind::Primitive(kind) => {
                if value.primitive_kind() != Some(kind) {
                    return Err(self.mismatch(value, &def));
                }
                let bits = value.to_bits().unwrap_or(0);
                out.copy_from_slice(&bits.to_le_bytes()[..kind.size()]);
                Ok(())
            }
            TypeKind::Enum { underlying } => {
                let bits = match value {
                    Value::Enum { ty: t, bits } if *t == ty => *bits,
                    v if v.primitive_kind() == Some(underlying) => v.to_bits().unwrap_or(0),
                    v => return Err(self.mismatch(v, &def)),
                };
                out.copy_from_slice(&bits.to_le_bytes()[..underlying.size()]);
                Ok(())
            }
            TypeKind::Nullable { inner } => {
                if value.is_null() {
                    return Ok(());
                }
                let layout = self.registry.layout(ty)?;
                let offset = layout.value_offset.unwrap_or(0);
                let width = self.width(inner)?;
                out[0] = 1;
                self.write(value, inner, &mut out[offset..offset + width])
            }
            TypeKind::Struct => {
                let fields: &[Value] = match value {
                    Value::Struct(s) if s.ty == ty => &s.fields,
                    Value::Ref(r) => match self.heap.get(*r) {
                        Ok(HeapObject::Object(obj)) if obj.ty == ty => &obj.fields,
                        _ => return Err(self.mismatch(value, &def)),
                    },
                    _ => return Err(self.mismatch(value, &def)),
                };
                let layout = self.registry.layout(ty)?;
                for field in &layout.fields {
                    let Some(v) = fields.get(field.slot) else {
                        return Err(self.mismatch(value, &def));
                    };
                    self.write(v, field.ty, &mut out[field.offset..field.offset + field.size])?;
                }
                Ok(())
            }
            TypeKind::Pointer => match value {
                Value::Null => Ok(()),
                Value::Pointer(p) => {
                    out.copy_from_slice(&p.to_le_bytes()[..POINTER_SIZE]);
                    Ok(())
                }
                v => Err(self.mismatch(v, &def)),
            },
            TypeKind::Void => Err(CodecError::Unsupported(def.name.clone())),
            _ => {
                if value.is_null() {
                    Ok(())
                } else {
                    Err(CodecError::Unsupported(format!(
                        "live reference of type {}",
                        def.name
                    )))
                }
            }
        }
    }

    /// Decode `bytes` as an instance of `ty`
    pub fn decode(&self, bytes: &[u8], ty: TypeId) -> Result<Value, CodecError> {
        let width = self.width(ty)?;
        if bytes.len() != width {
            return Err(CodecError::LayoutMismatch {
                ty: self.registry.type_name(ty),
                expected: width,
                actual: bytes.len(),
            });
        }
        self.read(bytes, ty)
    }

    fn read(&self, bytes: &[u8], ty: TypeId) -> Result<Value, CodecError> {
        let def = self.def(ty)?;
        match def.kind {
            TypeKind::Primitive(kind) => Ok(Value::from_bits(kind, read_le(bytes))),
            TypeKind::Enum { underlying } => Ok(Value::enum_of(ty, underlying, read_le(bytes))),
            TypeKind::Nullable { inner } => {
                if bytes[0] == 0 {
                    return Ok(Value::NoValue);
                }
                let layout = self.registry.layout(ty)?;
                let offset = layout.value_offset.unwrap_or(0);
                let width = self.width(inner)?;
                self.read(&bytes[offset..offset + width], inner)
            }
            TypeKind::Struct => {
                let layout = self.registry.layout(ty)?;
                let fields = layout
                    .fields
                    .iter()
                    .map(|f| self.read(&bytes[f.offset..f.offset + f.size], f.ty))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Struct(Box::new(StructValue { ty, fields })))
            }
            TypeKind::Pointer => Ok(Value::Pointer(read_le(bytes))),
            TypeKind::Void => Err(CodecError::Unsupported(def.name.clone())),
            _ => {
                if bytes.iter().all(|b| *b == 0) {
                    Ok(Value::Null)
                } else {
                    Err(CodecError::NonZeroReference(def.name.clone()))
                }
            }
        }
    }

    /// Build an instance of `ty` from byte fragments
    ///
    /// The target buffer starts zeroed. Each fragment's value is encoded by
    /// its runtime type and the first `end - start` bytes of that encoding
    /// are copied to `[start, end)`. Later fragments overwrite earlier ones
    /// where they overlap.
    pub fn combine(&self, ty: TypeId, fragments: &[Fragment]) -> Result<Value, CodecError> {
        let width = self.width(ty)?;
        let mut buf = vec![0u8; width];
        for fragment in fragments {
            let bytes = self.encode(&fragment.value)?;
            let Fragment { start, end, .. } = *fragment;
            if start > end || end > width || end - start > bytes.len() {
                return Err(CodecError::FragmentRange {
                    ty: self.registry.type_name(ty),
                    start,
                    end,
                    width,
                    available: bytes.len(),
                });
            }
            buf[start..end].copy_from_slice(&bytes[..end - start]);
        }
        self.decode(&buf, ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_types::PrimitiveKind;

    struct Fixture {
        registry: TypeRegistry,
        point: TypeId,
        color: TypeId,
        holder: TypeId,
    }

    fn fixture() -> Fixture {
        let mut builder = TypeRegistry::builder();
        let mut m = builder.module("Test");
        let int = m.primitive(PrimitiveKind::I32);
        let long = m.primitive(PrimitiveKind::I64);
        let point = m.struct_type("Test.Point");
        m.field(point, "x", int);
        m.field(point, "y", long);
        let color = m.enum_type("Test.Color", PrimitiveKind::I16);
        let node = m.class("Test.Node", None);
        let holder = m.struct_type("Test.Holder");
        m.field(holder, "flag", m.primitive(PrimitiveKind::Bool));
        m.field(holder, "node", node);
        Fixture {
            registry: builder.build(),
            point,
            color,
            holder,
        }
    }

    #[test]
    fn test_scalar_little_endian() {
        let f = fixture();
        let heap = Heap::new();
        let codec = ValueCodec::new(&f.registry, &heap);
        assert_eq!(codec.encode(&Value::I32(0x0102_0304)).unwrap(), vec![4, 3, 2, 1]);
        assert_eq!(codec.encode(&Value::Char(0x41)).unwrap(), vec![0x41, 0]);
        assert_eq!(codec.encode(&Value::Bool(true)).unwrap(), vec![1]);
        let int = f.registry.well_known().primitive(PrimitiveKind::I32);
        assert_eq!(codec.decode(&[0xff, 0xff, 0xff, 0xff], int).unwrap(), Value::I32(-1));
    }

    #[test]
    fn test_enum_uses_underlying_width() {
        let f = fixture();
        let heap = Heap::new();
        let codec = ValueCodec::new(&f.registry, &heap);
        let v = Value::Enum { ty: f.color, bits: 0x0201 };
        assert_eq!(codec.encode(&v).unwrap(), vec![1, 2]);
        assert_eq!(codec.decode(&[1, 2], f.color).unwrap(), v);
    }

    #[test]
    fn test_struct_fields_at_offsets() {
        let f = fixture();
        let heap = Heap::new();
        let codec = ValueCodec::new(&f.registry, &heap);
        let p = Value::Struct(Box::new(StructValue {
            ty: f.point,
            fields: vec![Value::I32(7), Value::I64(-2)],
        }));
        let bytes = codec.encode(&p).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[0..4], &[7, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(&bytes[8..16], &(-2i64).to_le_bytes());
        assert_eq!(codec.decode(&bytes, f.point).unwrap(), p);
    }

    #[test]
    fn test_reference_fields_decode_only_when_zero() {
        let f = fixture();
        let heap = Heap::new();
        let codec = ValueCodec::new(&f.registry, &heap);
        let width = codec.width(f.holder).unwrap();
        let mut bytes = vec![0u8; width];
        bytes[0] = 1;
        let decoded = codec.decode(&bytes, f.holder).unwrap();
        match decoded {
            Value::Struct(s) => assert_eq!(s.fields, vec![Value::Bool(true), Value::Null]),
            other => panic!("expected struct, got {:?}", other),
        }
        bytes[POINTER_SIZE] = 9;
        assert!(matches!(
            codec.decode(&bytes, f.holder),
            Err(CodecError::NonZeroReference(_))
        ));
    }

    #[test]
    fn test_decode_checks_width() {
        let f = fixture();
        let heap = Heap::new();
        let codec = ValueCodec::new(&f.registry, &heap);
        assert!(matches!(
            codec.decode(&[0; 3], f.point),
            Err(CodecError::LayoutMismatch { expected: 16, actual: 3, .. })
        ));
    }

    #[test]
    fn test_nullable_flag_controls_payload() {
        let f = fixture();
        let heap = Heap::new();
        let codec = ValueCodec::new(&f.registry, &heap);
        let int = f.registry.well_known().primitive(PrimitiveKind::I32);
        let nullable = f.registry.nullable_of(int).unwrap();
        assert_eq!(codec.encode_as(&Value::I32(5), nullable).unwrap(), vec![1, 0, 0, 0, 5, 0, 0, 0]);
        assert_eq!(codec.encode_as(&Value::NoValue, nullable).unwrap(), vec![0; 8]);
        // Payload ignored when the flag is clear
        assert_eq!(codec.decode(&[0, 0, 0, 0, 9, 9, 9, 9], nullable).unwrap(), Value::NoValue);
        assert_eq!(codec.decode(&[1, 0, 0, 0, 9, 0, 0, 0], nullable).unwrap(), Value::I32(9));
    }

    #[test]
    fn test_combine_splices_fragments() {
        let f = fixture();
        let heap = Heap::new();
        let codec = ValueCodec::new(&f.registry, &heap);
        let fragments = [
            Fragment {
                value: Value::I64(-2),
                start: 8,
                end: 16,
            },
            Fragment {
                value: Value::I32(7),
                start: 0,
                end: 4,
            },
        ];
        let combined = codec.combine(f.point, &fragments).unwrap();
        let expected = Value::Struct(Box::new(StructValue {
            ty: f.point,
            fields: vec![Value::I32(7), Value::I64(-2)],
        }));
        assert_eq!(combined, expected);

        let mut reversed = fragments.to_vec();
        reversed.reverse();
        assert_eq!(codec.combine(f.point, &reversed).unwrap(), expected);
    }

    #[test]
    fn test_combine_rejects_bad_ranges() {
        let f = fixture();
        let heap = Heap::new();
        let codec = ValueCodec::new(&f.registry, &heap);
        let too_wide = Fragment {
            value: Value::I32(1),
            start: 0,
            end: 8,
        };
        assert!(matches!(
            codec.combine(f.point, &[too_wide]),
            Err(CodecError::FragmentRange { available: 4, .. })
        ));
        let past_end = Fragment {
            value: Value::I64(1),
            start: 12,
            end: 20,
        };
        assert!(codec.combine(f.point, &[past_end]).is_err());
    }
}
