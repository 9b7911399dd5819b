//! Core type definitions for the Replay runtime model

use std::fmt;

/// Width of pointer-sized values (native ints, references, unmanaged pointers)
pub const POINTER_SIZE: usize = std::mem::size_of::<usize>();

/// Unique identifier for a type in the registry's type table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    /// Create a type id from a table index
    pub const fn new(index: u32) -> Self {
        TypeId(index)
    }

    /// Table index of this type
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// Primitive scalar types with a fixed byte width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// 1-byte boolean
    Bool,
    /// 2-byte UTF-16 code unit
    Char,
    /// Signed 8-bit integer
    I8,
    /// Signed 16-bit integer
    I16,
    /// Signed 32-bit integer
    I32,
    /// Signed 64-bit integer
    I64,
    /// Unsigned 8-bit integer
    U8,
    /// Unsigned 16-bit integer
    U16,
    /// Unsigned 32-bit integer
    U32,
    /// Unsigned 64-bit integer
    U64,
    /// IEEE 754 single precision
    F32,
    /// IEEE 754 double precision
    F64,
    /// Signed pointer-sized integer
    IntPtr,
    /// Unsigned pointer-sized integer
    UIntPtr,
}

impl PrimitiveKind {
    /// Every primitive kind, in core-library declaration order
    pub const ALL: [PrimitiveKind; 14] = [
        PrimitiveKind::Bool,
        PrimitiveKind::Char,
        PrimitiveKind::I8,
        PrimitiveKind::I16,
        PrimitiveKind::I32,
        PrimitiveKind::I64,
        PrimitiveKind::U8,
        PrimitiveKind::U16,
        PrimitiveKind::U32,
        PrimitiveKind::U64,
        PrimitiveKind::F32,
        PrimitiveKind::F64,
        PrimitiveKind::IntPtr,
        PrimitiveKind::UIntPtr,
    ];

    /// Byte width of the kind on this platform
    pub const fn size(self) -> usize {
        match self {
            PrimitiveKind::Bool | PrimitiveKind::I8 | PrimitiveKind::U8 => 1,
            PrimitiveKind::Char | PrimitiveKind::I16 | PrimitiveKind::U16 => 2,
            PrimitiveKind::I32 | PrimitiveKind::U32 | PrimitiveKind::F32 => 4,
            PrimitiveKind::I64 | PrimitiveKind::U64 | PrimitiveKind::F64 => 8,
            PrimitiveKind::IntPtr | PrimitiveKind::UIntPtr => POINTER_SIZE,
        }
    }

    /// Whether the kind can serve as an enum's underlying type
    pub const fn is_integer(self) -> bool {
        !matches!(
            self,
            PrimitiveKind::Bool | PrimitiveKind::Char | PrimitiveKind::F32 | PrimitiveKind::F64
        )
    }

    /// Whether integer values of this kind are sign-extended
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            PrimitiveKind::I8
                | PrimitiveKind::I16
                | PrimitiveKind::I32
                | PrimitiveKind::I64
                | PrimitiveKind::IntPtr
        )
    }

    /// Fully-qualified core-library name
    pub const fn type_name(self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "System.Boolean",
            PrimitiveKind::Char => "System.Char",
            PrimitiveKind::I8 => "System.SByte",
            PrimitiveKind::I16 => "System.Int16",
            PrimitiveKind::I32 => "System.Int32",
            PrimitiveKind::I64 => "System.Int64",
            PrimitiveKind::U8 => "System.Byte",
            PrimitiveKind::U16 => "System.UInt16",
            PrimitiveKind::U32 => "System.UInt32",
            PrimitiveKind::U64 => "System.UInt64",
            PrimitiveKind::F32 => "System.Single",
            PrimitiveKind::F64 => "System.Double",
            PrimitiveKind::IntPtr => "System.IntPtr",
            PrimitiveKind::UIntPtr => "System.UIntPtr",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Field type as written in a (possibly generic) type definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// A concrete type
    Concrete(TypeId),
    /// The n-th generic parameter of the declaring definition
    Param(u16),
}

impl FieldType {
    /// Concrete type id, if the field is not generic
    pub fn concrete(self) -> Option<TypeId> {
        match self {
            FieldType::Concrete(id) => Some(id),
            FieldType::Param(_) => None,
        }
    }
}

/// Field definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Metadata token
    pub token: u32,
    /// Declared field type
    pub ty: FieldType,
    /// Static fields are not part of instance state
    pub is_static: bool,
}

impl FieldDef {
    /// Create an instance field
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            token: 0,
            ty,
            is_static: false,
        }
    }
}

/// Shape of a runtime type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Fixed-width scalar
    Primitive(PrimitiveKind),
    /// Immutable string (reference type, compared by value)
    String,
    /// Root reference type
    Object,
    /// Return type of methods without a result
    Void,
    /// Runtime type handle (`System.Type`)
    TypeHandle,
    /// Unmanaged pointer, boxed as an opaque handle
    Pointer,
    /// Callback reference type
    Delegate,
    /// Enumeration backed by an integer kind
    Enum {
        /// Underlying integer kind
        underlying: PrimitiveKind,
    },
    /// User value type with sequential layout
    Struct,
    /// User reference type
    Class {
        /// Base class, if any
        parent: Option<TypeId>,
    },
    /// Array of `element` with the given rank
    Array {
        /// Element type
        element: TypeId,
        /// Number of dimensions
        rank: u8,
    },
    /// `Nullable<inner>`
    Nullable {
        /// Wrapped value type
        inner: TypeId,
    },
}

/// Runtime type definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    /// Id in the owning registry
    pub id: TypeId,
    /// Declaring module (assembly identity)
    pub module: String,
    /// Fully-qualified name
    pub name: String,
    /// Metadata token (0 for synthesized types)
    pub token: u32,
    /// Shape of the type
    pub kind: TypeKind,
    /// Declared fields (instance and static)
    pub fields: Vec<FieldDef>,
    /// Number of generic parameters (non-zero for open definitions)
    pub generic_params: u16,
    /// Generic arguments of an instantiation
    pub generic_args: Vec<TypeId>,
    /// Generic definition this type instantiates
    pub definition: Option<TypeId>,
    /// Whether the type is (or derives from) the exception root
    pub exception: bool,
}

impl TypeDef {
    /// Create a non-generic type definition with no fields
    pub fn new(id: TypeId, module: impl Into<String>, name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            id,
            module: module.into(),
            name: name.into(),
            token: 0,
            kind,
            fields: Vec::new(),
            generic_params: 0,
            generic_args: Vec::new(),
            definition: None,
            exception: false,
        }
    }

    /// Value types are copied on assignment
    pub fn is_value_type(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Primitive(_) | TypeKind::Enum { .. } | TypeKind::Struct | TypeKind::Nullable { .. }
        )
    }

    /// Reference types are null-able and heap allocated
    pub fn is_reference_type(&self) -> bool {
        !self.is_value_type() && !matches!(self.kind, TypeKind::Void | TypeKind::Pointer)
    }

    /// Open generic definitions cannot be instantiated as values
    pub fn is_generic_definition(&self) -> bool {
        self.generic_params > 0 && self.definition.is_none()
    }

    /// Instance fields declared directly on this type
    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !f.is_static)
    }

    /// Parent class, if any
    pub fn parent(&self) -> Option<TypeId> {
        match self.kind {
            TypeKind::Class { parent } => parent,
            _ => None,
        }
    }
}

impl fmt::Display for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
