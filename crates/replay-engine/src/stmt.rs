//! Wire model of generated tests
//!
//! A test is a list of arrange statements, a call statement, and an expected
//! result statement. Statements are a JSON enum tagged by `kind`; nested
//! statements form expression trees. Heap objects are identified by integer
//! addresses that are meaningful only inside one test.

use replay_types::{FieldDescriptor, MethodDescriptor, TypeDescriptor};
use serde::{Deserialize, Serialize};

/// Heap object identity inside one test description
pub type Address = i64;

/// Statement or expression node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all_fields = "camelCase")]
pub enum Stmt {
    /// Boolean constant
    Bool {
        /// Value
        value: bool,
        /// Declared type (enum types turn the constant into an enum value)
        #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
        ty: Option<TypeDescriptor>,
    },
    /// UTF-16 code unit constant
    Char {
        /// Value
        value: u16,
        /// Declared type
        #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
        ty: Option<TypeDescriptor>,
    },
    /// Signed 8-bit constant
    Int8 {
        /// Value
        value: i8,
        /// Declared type
        #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
        ty: Option<TypeDescriptor>,
    },
    /// Signed 16-bit constant
    Int16 {
        /// Value
        value: i16,
        /// Declared type
        #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
        ty: Option<TypeDescriptor>,
    },
    /// Signed 32-bit constant
    Int32 {
        /// Value
        value: i32,
        /// Declared type
        #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
        ty: Option<TypeDescriptor>,
    },
    /// Signed 64-bit constant
    Int64 {
        /// Value
        value: i64,
        /// Declared type
        #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
        ty: Option<TypeDescriptor>,
    },
    /// Unsigned 8-bit constant
    UInt8 {
        /// Value
        value: u8,
        /// Declared type
        #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
        ty: Option<TypeDescriptor>,
    },
    /// Unsigned 16-bit constant
    UInt16 {
        /// Value
        value: u16,
        /// Declared type
        #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
        ty: Option<TypeDescriptor>,
    },
    /// Unsigned 32-bit constant
    UInt32 {
        /// Value
        value: u32,
        /// Declared type
        #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
        ty: Option<TypeDescriptor>,
    },
    /// Unsigned 64-bit constant
    UInt64 {
        /// Value
        value: u64,
        /// Declared type
        #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
        ty: Option<TypeDescriptor>,
    },
    /// Single precision constant
    Float {
        /// Value
        value: f32,
    },
    /// Double precision constant
    Double {
        /// Value
        value: f64,
    },
    /// String constant
    String {
        /// Value
        value: String,
    },
    /// Null reference (or empty nullable)
    Null {
        /// Declared type, informational
        #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
        ty: Option<TypeDescriptor>,
    },
    /// Zero-initialized array bound to `address`
    NewArray {
        /// Element type
        element_type: TypeDescriptor,
        /// Element count
        size: usize,
        /// Heap identity
        address: Address,
    },
    /// Default-initialized instance bound to `address`
    NewObject {
        /// Instance type
        #[serde(rename = "type")]
        ty: TypeDescriptor,
        /// Heap identity
        address: Address,
    },
    /// Assign an instance field
    SetObjectField {
        /// Target instance
        instance: Box<Stmt>,
        /// Field to assign
        field: FieldDescriptor,
        /// Assigned value
        value: Box<Stmt>,
    },
    /// Assign an array element
    SetArrayIndex {
        /// Target array
        instance: Box<Stmt>,
        /// Flat element index
        index: i64,
        /// Assigned value
        value: Box<Stmt>,
    },
    /// Instance method call; `instance` is the receiver
    InstanceMethodCall {
        /// Callee
        method: MethodDescriptor,
        /// Receiver
        instance: Box<Stmt>,
        /// Arguments
        #[serde(default)]
        args: Vec<Stmt>,
    },
    /// Static method call (an instance callee takes its receiver from `args[0]`)
    StaticMethodCall {
        /// Callee
        method: MethodDescriptor,
        /// Arguments
        #[serde(default)]
        args: Vec<Stmt>,
    },
    /// Constructor call on a fresh instance
    ConstructorCall {
        /// Constructor
        method: MethodDescriptor,
        /// Arguments
        #[serde(default)]
        args: Vec<Stmt>,
    },
    /// Runtime type handle
    TypeInstance {
        /// Type
        #[serde(rename = "type")]
        ty: TypeDescriptor,
    },
    /// Reference to an already-bound address
    CyclicReference {
        /// Heap identity
        address: Address,
    },
    /// Value-type instance spliced from byte fragments
    ByteSliceCombine {
        /// Target value type
        #[serde(rename = "type")]
        ty: TypeDescriptor,
        /// Fragments in application order
        slices: Vec<ByteSlice>,
    },
}

/// One fragment of a [`Stmt::ByteSliceCombine`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ByteSlice {
    /// Value whose encoding supplies the bytes
    pub value: Stmt,
    /// Inclusive start offset
    pub start: usize,
    /// Exclusive end offset
    pub end: usize,
}

impl Stmt {
    /// Wire name of the statement kind
    pub fn kind_name(&self) -> &'static str {
        match self {
            Stmt::Bool { .. } => "Bool",
            Stmt::Char { .. } => "Char",
            Stmt::Int8 { .. } => "Int8",
            Stmt::Int16 { .. } => "Int16",
            Stmt::Int32 { .. } => "Int32",
            Stmt::Int64 { .. } => "Int64",
            Stmt::UInt8 { .. } => "UInt8",
            Stmt::UInt16 { .. } => "UInt16",
            Stmt::UInt32 { .. } => "UInt32",
            Stmt::UInt64 { .. } => "UInt64",
            Stmt::Float { .. } => "Float",
            Stmt::Double { .. } => "Double",
            Stmt::String { .. } => "String",
            Stmt::Null { .. } => "Null",
            Stmt::NewArray { .. } => "NewArray",
            Stmt::NewObject { .. } => "NewObject",
            Stmt::SetObjectField { .. } => "SetObjectField",
            Stmt::SetArrayIndex { .. } => "SetArrayIndex",
            Stmt::InstanceMethodCall { .. } => "InstanceMethodCall",
            Stmt::StaticMethodCall { .. } => "StaticMethodCall",
            Stmt::ConstructorCall { .. } => "ConstructorCall",
            Stmt::TypeInstance { .. } => "TypeInstance",
            Stmt::CyclicReference { .. } => "CyclicReference",
            Stmt::ByteSliceCombine { .. } => "ByteSliceCombine",
        }
    }

    /// 32-bit integer constant without a declared type
    pub fn int32(value: i32) -> Self {
        Stmt::Int32 { value, ty: None }
    }

    /// Untyped null
    pub fn null() -> Self {
        Stmt::Null { ty: None }
    }
}

/// One generated test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDescription {
    /// Heap-building statements, run in order
    #[serde(default)]
    pub arrange: Vec<Stmt>,
    /// Call under test
    pub call: Stmt,
    /// Expected return value or exception instance
    pub expected: Stmt,
}

/// All tests generated for one explored method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestBatch {
    /// Explored method, used for coverage verification
    pub method: MethodDescriptor,
    /// Tests in report order
    pub tests: Vec<TestDescription>,
}

impl TestBatch {
    /// Parse a batch from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize a batch to pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
