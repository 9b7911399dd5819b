//! Type registry
//!
//! The registry is the runtime's view of the loaded modules: every type,
//! field, and method a test description can name. It resolves descriptors to
//! live handles and caches the answers, creates array and generic
//! instantiations on demand, and knows how values are typed, defaulted, and
//! assigned.
//!
//! A registry is built once with [`TypeRegistry::builder`] and then shared
//! read-only between worker threads; the only mutation after construction is
//! appending synthesized types (arrays, instantiations) and filling caches.

mod builder;
mod corelib;
mod method;

pub use builder::{ModuleBuilder, RegistryBuilder};
pub use corelib::CORE_LIBRARY;
pub use method::{MethodBody, MethodBuilder, MethodDef, CTOR_NAME};

use crate::heap::{Heap, HeapObject};
use crate::value::{StructValue, Value};
use builder::ModuleIndex;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use replay_types::{
    compute_layout, FieldDescriptor, FieldType, Layout, LayoutError, MethodDescriptor, PrimitiveKind,
    TypeDef, TypeDescriptor, TypeId, TypeKey, TypeKind, TypeSource,
};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

// ============================================================================
// Errors
// ============================================================================

/// Resolution and typing errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No module with this identity is loaded
    #[error("Unknown module: {0}")]
    UnknownModule(String),

    /// Descriptor names no type in its module
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// Type id is not in the table
    #[error("Unknown type id: {0}")]
    UnknownTypeId(u32),

    /// No method matches name (and signature, when given)
    #[error("Unknown method: {ty}::{name}{}", signature.as_deref().unwrap_or(""))]
    UnknownMethod {
        /// Declaring type as written in the descriptor
        ty: String,
        /// Method name
        name: String,
        /// Requested signature
        signature: Option<String>,
    },

    /// No instance field with this name
    #[error("Unknown field: {ty}.{name}")]
    UnknownField {
        /// Declaring type as written in the descriptor
        ty: String,
        /// Field name
        name: String,
    },

    /// Field exists but its type differs from the descriptor
    #[error("Field {field} has type {actual}, descriptor says {expected}")]
    FieldTypeMismatch {
        /// Field name
        field: String,
        /// Type named by the descriptor
        expected: String,
        /// Declared field type
        actual: String,
    },

    /// Wrong number of generic arguments
    #[error("Generic type {ty} expects {expected} arguments, got {actual}")]
    GenericArity {
        /// Generic definition
        ty: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        actual: usize,
    },

    /// Generic arguments supplied to a non-generic type
    #[error("Type {0} is not a generic definition")]
    NotGeneric(String),

    /// Type cannot be created as an instance
    #[error("Cannot instantiate {ty}: {reason}")]
    NotInstantiable {
        /// Type name
        ty: String,
        /// Why not
        reason: String,
    },

    /// Value is not assignable to the slot type
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Slot type
        expected: String,
        /// Runtime type of the value
        actual: String,
    },

    /// Layout could not be computed
    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),
}

// ============================================================================
// Well-known types
// ============================================================================

/// Ids of the core-library types
#[derive(Debug, Clone)]
pub struct WellKnown {
    primitives: [TypeId; PrimitiveKind::ALL.len()],
    /// `System.Object`
    pub object: TypeId,
    /// `System.String`
    pub string: TypeId,
    /// `System.Void`
    pub void: TypeId,
    /// `System.Type`
    pub type_handle: TypeId,
    /// `System.Reflection.Pointer`
    pub pointer: TypeId,
    /// `System.Delegate`
    pub delegate: TypeId,
    /// `System.Nullable`1` definition
    pub nullable: TypeId,
    /// `System.Exception`
    pub exception: TypeId,
    /// `System.ArithmeticException`
    pub arithmetic: TypeId,
    /// `System.DivideByZeroException`
    pub divide_by_zero: TypeId,
    /// `System.OverflowException`
    pub overflow: TypeId,
    /// `System.NullReferenceException`
    pub null_reference: TypeId,
    /// `System.IndexOutOfRangeException`
    pub index_out_of_range: TypeId,
    /// `System.InvalidOperationException`
    pub invalid_operation: TypeId,
    /// `System.ArgumentException`
    pub argument: TypeId,
}

impl WellKnown {
    /// Core-library type of a primitive kind
    pub fn primitive(&self, kind: PrimitiveKind) -> TypeId {
        self.primitives[kind as usize]
    }
}

/// Instance field with its position in the flattened field list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceField {
    /// Field name
    pub name: String,
    /// Concrete field type
    pub ty: TypeId,
    /// Type that declares the field
    pub declaring: TypeId,
    /// Index into an instance's field vector
    pub slot: usize,
}

// ============================================================================
// Shared definition helpers
// ============================================================================

pub(crate) fn array_def(id: TypeId, element: &TypeDef, rank: u8) -> TypeDef {
    let suffix = if rank <= 1 {
        "[]".to_string()
    } else {
        format!("[{}]", ",".repeat(rank as usize - 1))
    };
    TypeDef::new(
        id,
        element.module.clone(),
        format!("{}{}", element.name, suffix),
        TypeKind::Array {
            element: element.id,
            rank: rank.max(1),
        },
    )
}

pub(crate) fn instantiate_def(
    def: &TypeDef,
    id: TypeId,
    args: &[TypeId],
    arg_names: &[String],
    nullable: bool,
) -> Result<TypeDef, RegistryError> {
    if !def.is_generic_definition() {
        return Err(RegistryError::NotGeneric(def.name.clone()));
    }
    if args.len() != def.generic_params as usize {
        return Err(RegistryError::GenericArity {
            ty: def.name.clone(),
            expected: def.generic_params as usize,
            actual: args.len(),
        });
    }

    let mut inst = def.clone();
    inst.id = id;
    inst.name = format!("{}[{}]", def.name, arg_names.join(","));
    inst.definition = Some(def.id);
    inst.generic_args = args.to_vec();
    for field in &mut inst.fields {
        if let FieldType::Param(i) = field.ty {
            if let Some(arg) = args.get(i as usize) {
                field.ty = FieldType::Concrete(*arg);
            }
        }
    }
    if nullable {
        inst.kind = TypeKind::Nullable { inner: args[0] };
    }
    Ok(inst)
}

// ============================================================================
// Registry
// ============================================================================

/// Loaded types and methods with resolution caches
pub struct TypeRegistry {
    types: RwLock<Vec<Arc<TypeDef>>>,
    modules: FxHashMap<String, ModuleIndex>,
    methods: FxHashMap<TypeId, Vec<Arc<MethodDef>>>,
    well_known: WellKnown,
    arrays: DashMap<(TypeId, u8), TypeId>,
    instantiations: DashMap<(TypeId, Vec<TypeId>), TypeId>,
    resolved_types: DashMap<TypeDescriptor, TypeId>,
    resolved_methods: DashMap<MethodDescriptor, Arc<MethodDef>>,
    resolved_fields: DashMap<FieldDescriptor, InstanceField>,
    fields: DashMap<TypeId, Arc<[InstanceField]>>,
    layouts: DashMap<TypeId, Arc<Layout>>,
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.types.read().len())
            .field("modules", &self.modules.len())
            .field("methods", &self.methods.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

impl TypeRegistry {
    /// Start building a registry (core library included)
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub(crate) fn from_parts(
        types: Vec<TypeDef>,
        modules: FxHashMap<String, ModuleIndex>,
        methods: FxHashMap<TypeId, Vec<Arc<MethodDef>>>,
        arrays: FxHashMap<(TypeId, u8), TypeId>,
        instantiations: FxHashMap<(TypeId, Vec<TypeId>), TypeId>,
        well_known: WellKnown,
    ) -> Self {
        Self {
            types: RwLock::new(types.into_iter().map(Arc::new).collect()),
            modules,
            methods,
            well_known,
            arrays: arrays.into_iter().collect(),
            instantiations: instantiations.into_iter().collect(),
            resolved_types: DashMap::new(),
            resolved_methods: DashMap::new(),
            resolved_fields: DashMap::new(),
            fields: DashMap::new(),
            layouts: DashMap::new(),
        }
    }

    /// Core-library type ids
    pub fn well_known(&self) -> &WellKnown {
        &self.well_known
    }

    /// Definition of `ty`
    pub fn def(&self, ty: TypeId) -> Result<Arc<TypeDef>, RegistryError> {
        self.type_def(ty).ok_or(RegistryError::UnknownTypeId(ty.0))
    }

    /// Name of `ty`, or its id when unknown
    pub fn type_name(&self, ty: TypeId) -> String {
        self.type_def(ty)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| ty.to_string())
    }

    /// Snapshot of every type currently in the table
    pub fn types(&self) -> Vec<Arc<TypeDef>> {
        self.types.read().clone()
    }

    /// Names of the loaded modules
    pub fn module_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Methods declared directly on `ty` (or its generic definition)
    pub fn methods_of(&self, ty: TypeId) -> &[Arc<MethodDef>] {
        let owner = self
            .type_def(ty)
            .and_then(|d| d.definition)
            .unwrap_or(ty);
        self.methods.get(&owner).map(Vec::as_slice).unwrap_or(&[])
    }

    fn push_type(&self, make: impl FnOnce(TypeId) -> TypeDef) -> TypeId {
        let mut types = self.types.write();
        let id = TypeId(types.len() as u32);
        types.push(Arc::new(make(id)));
        id
    }

    // ------------------------------------------------------------------------
    // Descriptor resolution
    // ------------------------------------------------------------------------

    /// Resolve a type descriptor, instantiating generics as needed
    pub fn resolve_type(&self, desc: &TypeDescriptor) -> Result<TypeId, RegistryError> {
        if let Some(id) = self.resolved_types.get(desc) {
            return Ok(*id);
        }

        let module = self
            .modules
            .get(&desc.asm)
            .ok_or_else(|| RegistryError::UnknownModule(desc.asm.clone()))?;
        let base = match &desc.key {
            TypeKey::Token(token) => module.by_token.get(token),
            TypeKey::Name(name) => module.by_name.get(name),
        }
        .copied()
        .ok_or_else(|| RegistryError::UnknownType(desc.to_string()))?;

        let id = if desc.generic_args.is_empty() {
            base
        } else {
            let args = desc
                .generic_args
                .iter()
                .map(|arg| self.resolve_type(arg))
                .collect::<Result<Vec<_>, _>>()?;
            self.instantiate(base, &args)?
        };

        trace!(descriptor = %desc, ty = id.0, "resolved type");
        self.resolved_types.insert(desc.clone(), id);
        Ok(id)
    }

    /// Resolve a method descriptor
    ///
    /// With a signature, only an exact signature match is accepted. Without
    /// one, the first method with the requested name wins, searching the
    /// declaring type before its base classes.
    pub fn resolve_method(&self, desc: &MethodDescriptor) -> Result<Arc<MethodDef>, RegistryError> {
        if let Some(m) = self.resolved_methods.get(desc) {
            return Ok(Arc::clone(&m));
        }

        let decl = self.resolve_type(&desc.decl_type)?;
        let mut current = Some(decl);
        while let Some(ty) = current {
            let def = self.def(ty)?;
            let named: Vec<&Arc<MethodDef>> = self
                .methods_of(ty)
                .iter()
                .filter(|m| m.name == desc.name)
                .collect();
            let found = match &desc.signature {
                Some(sig) => named.iter().find(|m| &m.signature == sig).copied(),
                None => {
                    if named.len() > 1 {
                        debug!(
                            method = %desc,
                            overloads = named.len(),
                            "no signature given, taking first overload"
                        );
                    }
                    named.first().copied()
                }
            };
            if let Some(method) = found {
                self.resolved_methods.insert(desc.clone(), Arc::clone(method));
                return Ok(Arc::clone(method));
            }
            current = def.parent();
        }

        Err(RegistryError::UnknownMethod {
            ty: desc.decl_type.to_string(),
            name: desc.name.clone(),
            signature: desc.signature.clone(),
        })
    }

    /// Resolve a field descriptor to an instance field slot
    pub fn resolve_field(&self, desc: &FieldDescriptor) -> Result<InstanceField, RegistryError> {
        if let Some(f) = self.resolved_fields.get(desc) {
            return Ok(f.clone());
        }

        let decl = self.resolve_type(&desc.decl_type)?;
        let fields = self.instance_fields(decl)?;
        let field = fields
            .iter()
            .rev()
            .find(|f| f.name == desc.name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownField {
                ty: desc.decl_type.to_string(),
                name: desc.name.clone(),
            })?;

        if let Some(expected) = &desc.field_type {
            let expected = self.resolve_type(expected)?;
            if expected != field.ty {
                return Err(RegistryError::FieldTypeMismatch {
                    field: desc.to_string(),
                    expected: self.type_name(expected),
                    actual: self.type_name(field.ty),
                });
            }
        }

        self.resolved_fields.insert(desc.clone(), field.clone());
        Ok(field)
    }

    // ------------------------------------------------------------------------
    // Synthesized types
    // ------------------------------------------------------------------------

    /// Array type over `element` with `rank` dimensions
    pub fn array_of(&self, element: TypeId, rank: u8) -> Result<TypeId, RegistryError> {
        if let Some(id) = self.arrays.get(&(element, rank)) {
            return Ok(*id);
        }
        let element_def = self.def(element)?;
        let id = match self.arrays.entry((element, rank)) {
            Entry::Occupied(e) => *e.get(),
            Entry::Vacant(e) => {
                let id = self.push_type(|id| array_def(id, &element_def, rank));
                e.insert(id);
                id
            }
        };
        Ok(id)
    }

    /// Closed instantiation of a generic definition
    pub fn instantiate(&self, definition: TypeId, args: &[TypeId]) -> Result<TypeId, RegistryError> {
        let key = (definition, args.to_vec());
        if let Some(id) = self.instantiations.get(&key) {
            return Ok(*id);
        }

        let def = self.def(definition)?;
        let names = args
            .iter()
            .map(|a| self.def(*a).map(|d| d.name.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let nullable = definition == self.well_known.nullable;
        let template = instantiate_def(&def, TypeId(0), args, &names, nullable)?;

        let id = match self.instantiations.entry(key) {
            Entry::Occupied(e) => *e.get(),
            Entry::Vacant(e) => {
                let id = self.push_type(|id| TypeDef { id, ..template });
                e.insert(id);
                debug!(definition = %def.name, ty = id.0, "instantiated generic type");
                id
            }
        };
        Ok(id)
    }

    /// `Nullable<inner>`
    pub fn nullable_of(&self, inner: TypeId) -> Result<TypeId, RegistryError> {
        self.instantiate(self.well_known.nullable, &[inner])
    }

    // ------------------------------------------------------------------------
    // Type relations
    // ------------------------------------------------------------------------

    /// Whether `ty` is the exception root or derives from it
    pub fn is_exception(&self, ty: TypeId) -> bool {
        self.type_def(ty).is_some_and(|d| d.exception)
    }

    /// Whether `ty` equals `ancestor` or derives from it
    pub fn is_subclass(&self, ty: TypeId, ancestor: TypeId) -> bool {
        let mut current = Some(ty);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.type_def(id).and_then(|d| d.parent());
        }
        false
    }

    /// Instance fields of `ty`, base-class fields first
    pub fn instance_fields(&self, ty: TypeId) -> Result<Arc<[InstanceField]>, RegistryError> {
        if let Some(fields) = self.fields.get(&ty) {
            return Ok(Arc::clone(&fields));
        }

        let mut chain = Vec::new();
        let mut current = Some(ty);
        while let Some(id) = current {
            let def = self.def(id)?;
            current = def.parent();
            chain.push(def);
        }

        let mut fields = Vec::new();
        for def in chain.iter().rev() {
            for field in def.instance_fields() {
                let field_ty = field.ty.concrete().ok_or_else(|| RegistryError::NotInstantiable {
                    ty: def.name.clone(),
                    reason: format!("field '{}' has an open generic type", field.name),
                })?;
                fields.push(InstanceField {
                    name: field.name.clone(),
                    ty: field_ty,
                    declaring: def.id,
                    slot: fields.len(),
                });
            }
        }

        let fields: Arc<[InstanceField]> = fields.into();
        self.fields.insert(ty, Arc::clone(&fields));
        Ok(fields)
    }

    /// Byte layout of `ty`
    pub fn layout(&self, ty: TypeId) -> Result<Arc<Layout>, LayoutError> {
        if let Some(layout) = self.layouts.get(&ty) {
            return Ok(Arc::clone(&layout));
        }
        let layout = Arc::new(compute_layout(self, ty)?);
        self.layouts.insert(ty, Arc::clone(&layout));
        Ok(layout)
    }

    // ------------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------------

    /// Runtime type of a value; `None` for null
    pub fn type_of(&self, heap: &Heap, value: &Value) -> Option<TypeId> {
        match value {
            Value::Null | Value::NoValue => None,
            Value::Str(_) => Some(self.well_known.string),
            Value::Pointer(_) => Some(self.well_known.pointer),
            Value::Type(_) => Some(self.well_known.type_handle),
            Value::Enum { ty, .. } => Some(*ty),
            Value::Struct(s) => Some(s.ty),
            Value::Ref(r) => heap.get(*r).ok().map(HeapObject::ty),
            scalar => scalar.primitive_kind().map(|k| self.well_known.primitive(k)),
        }
    }

    /// Default value stored in a fresh slot of type `ty`
    pub fn default_value(&self, ty: TypeId) -> Result<Value, RegistryError> {
        let def = self.def(ty)?;
        Ok(match def.kind {
            TypeKind::Primitive(kind) => Value::from_bits(kind, 0),
            TypeKind::Enum { .. } => Value::Enum { ty, bits: 0 },
            TypeKind::Nullable { .. } => Value::NoValue,
            TypeKind::Pointer => Value::Pointer(0),
            TypeKind::Struct => {
                // Rejects open generics and self-containing structs
                self.layout(ty)?;
                let fields = self
                    .instance_fields(ty)?
                    .iter()
                    .map(|f| self.default_value(f.ty))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::Struct(Box::new(StructValue { ty, fields }))
            }
            _ => Value::Null,
        })
    }

    /// Convert `value` for storage in a slot of type `slot`
    ///
    /// Boxed structs are unboxed into struct slots, null becomes the empty
    /// nullable, integers of an enum's underlying kind become enum values.
    /// Anything else must already have a runtime type assignable to the slot.
    pub fn coerce(&self, heap: &Heap, value: Value, slot: TypeId) -> Result<Value, RegistryError> {
        let def = self.def(slot)?;
        let mismatch = |value: &Value| RegistryError::TypeMismatch {
            expected: def.name.clone(),
            actual: match self.type_of(heap, value) {
                Some(ty) => self.type_name(ty),
                None => "null".to_string(),
            },
        };

        match def.kind {
            TypeKind::Void => Err(mismatch(&value)),
            TypeKind::Nullable { inner } => {
                if value.is_null() {
                    Ok(Value::NoValue)
                } else {
                    self.coerce(heap, value, inner)
                }
            }
            TypeKind::Pointer => match value {
                Value::Pointer(_) => Ok(value),
                Value::Null => Ok(Value::Pointer(0)),
                Value::IntPtr(p) => Ok(Value::Pointer(p as u64)),
                Value::UIntPtr(p) => Ok(Value::Pointer(p)),
                other => Err(mismatch(&other)),
            },
            _ if def.is_value_type() => {
                if let (TypeKind::Enum { underlying }, Some(kind)) = (def.kind, value.primitive_kind()) {
                    if kind == underlying {
                        let bits = value.to_bits().unwrap_or(0);
                        return Ok(Value::enum_of(slot, underlying, bits));
                    }
                }
                if let (TypeKind::Struct, Value::Ref(r)) = (def.kind, &value) {
                    if let Ok(HeapObject::Object(obj)) = heap.get(*r) {
                        if obj.ty == slot {
                            return Ok(Value::Struct(Box::new(StructValue {
                                ty: slot,
                                fields: obj.fields.clone(),
                            })));
                        }
                    }
                }
                if self.type_of(heap, &value) == Some(slot) {
                    Ok(value)
                } else {
                    Err(mismatch(&value))
                }
            }
            _ => {
                if value.is_null() {
                    return Ok(Value::Null);
                }
                if def.kind == TypeKind::Object {
                    return Ok(value);
                }
                match self.type_of(heap, &value) {
                    Some(actual) if self.is_subclass(actual, slot) => Ok(value),
                    _ => Err(mismatch(&value)),
                }
            }
        }
    }
}

impl TypeSource for TypeRegistry {
    fn type_def(&self, id: TypeId) -> Option<Arc<TypeDef>> {
        self.types.read().get(id.index()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        let mut builder = TypeRegistry::builder();
        let mut m = builder.module("Test");
        let int = m.primitive(PrimitiveKind::I32);
        let long = m.primitive(PrimitiveKind::I64);

        let node = m.class("Test.Node", None);
        m.field(node, "next", node);
        m.field(node, "value", int);

        let derived = m.class("Test.Derived", Some(node));
        m.field(derived, "extra", long);

        let pair = m.generic_struct("Test.Pair`2", 2);
        m.generic_field(pair, "first", 0);
        m.generic_field(pair, "second", 1);

        let color = m.enum_type("Test.Color", PrimitiveKind::U8);
        let _ = color;

        let math = m.class("Test.Math", None);
        m.method(math, "Max").param(int).param(int).returns(int).body(|_, _, a| Ok(a[0].clone()));
        m.method(math, "Max").param(long).param(long).returns(long).body(|_, _, a| Ok(a[1].clone()));
        builder.build()
    }

    #[test]
    fn test_resolve_by_name_and_token_agree() {
        let reg = registry();
        let by_name = reg
            .resolve_type(&TypeDescriptor::named("Test", "Test.Node"))
            .unwrap();
        let token = reg.def(by_name).unwrap().token;
        assert_eq!(token, 0x0200_0002);
        let by_token = reg.resolve_type(&TypeDescriptor::token("Test", token)).unwrap();
        assert_eq!(by_name, by_token);
    }

    #[test]
    fn test_unknown_module_and_type() {
        let reg = registry();
        assert_eq!(
            reg.resolve_type(&TypeDescriptor::named("Nope", "X")),
            Err(RegistryError::UnknownModule("Nope".into()))
        );
        assert!(matches!(
            reg.resolve_type(&TypeDescriptor::named("Test", "Test.Missing")),
            Err(RegistryError::UnknownType(_))
        ));
    }

    #[test]
    fn test_core_library_primitives_resolve() {
        let reg = registry();
        let int = reg
            .resolve_type(&TypeDescriptor::named(CORE_LIBRARY, "System.Int32"))
            .unwrap();
        assert_eq!(int, reg.well_known().primitive(PrimitiveKind::I32));
    }

    #[test]
    fn test_generic_instantiation_is_cached() {
        let reg = registry();
        let int = TypeDescriptor::named(CORE_LIBRARY, "System.Int32");
        let long = TypeDescriptor::named(CORE_LIBRARY, "System.Int64");
        let desc = TypeDescriptor::named("Test", "Test.Pair`2").with_args(vec![int, long]);
        let a = reg.resolve_type(&desc).unwrap();
        let b = reg.resolve_type(&desc).unwrap();
        assert_eq!(a, b);

        let def = reg.def(a).unwrap();
        assert_eq!(def.name, "Test.Pair`2[System.Int32,System.Int64]");
        let fields = reg.instance_fields(a).unwrap();
        assert_eq!(fields[1].ty, reg.well_known().primitive(PrimitiveKind::I64));
        assert_eq!(reg.layout(a).unwrap().size, 16);
    }

    #[test]
    fn test_generic_arity_checked() {
        let reg = registry();
        let int = TypeDescriptor::named(CORE_LIBRARY, "System.Int32");
        let desc = TypeDescriptor::named("Test", "Test.Pair`2").with_args(vec![int.clone()]);
        assert!(matches!(
            reg.resolve_type(&desc),
            Err(RegistryError::GenericArity { expected: 2, actual: 1, .. })
        ));
        let desc = TypeDescriptor::named("Test", "Test.Node").with_args(vec![int]);
        assert!(matches!(reg.resolve_type(&desc), Err(RegistryError::NotGeneric(_))));
    }

    #[test]
    fn test_inherited_fields_come_first() {
        let reg = registry();
        let derived = reg
            .resolve_type(&TypeDescriptor::named("Test", "Test.Derived"))
            .unwrap();
        let names: Vec<_> = reg
            .instance_fields(derived)
            .unwrap()
            .iter()
            .map(|f| f.name.clone())
            .collect();
        assert_eq!(names, vec!["next", "value", "extra"]);

        let field = reg
            .resolve_field(&FieldDescriptor::new(TypeDescriptor::named("Test", "Test.Derived"), "value"))
            .unwrap();
        assert_eq!(field.slot, 1);
    }

    #[test]
    fn test_field_type_is_checked() {
        let reg = registry();
        let mut desc = FieldDescriptor::new(TypeDescriptor::named("Test", "Test.Node"), "value");
        desc.field_type = Some(TypeDescriptor::named(CORE_LIBRARY, "System.Int64"));
        assert!(matches!(
            reg.resolve_field(&desc),
            Err(RegistryError::FieldTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_overload_selection() {
        let reg = registry();
        let math = TypeDescriptor::named("Test", "Test.Math");
        let first = reg.resolve_method(&MethodDescriptor::new(math.clone(), "Max")).unwrap();
        assert_eq!(first.signature, "(System.Int32, System.Int32)");

        let long = reg
            .resolve_method(&MethodDescriptor::new(math.clone(), "Max").with_signature("(System.Int64, System.Int64)"))
            .unwrap();
        assert_eq!(long.params[0], reg.well_known().primitive(PrimitiveKind::I64));

        assert!(matches!(
            reg.resolve_method(&MethodDescriptor::new(math, "Max").with_signature("(System.Byte)")),
            Err(RegistryError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn test_coerce_rules() {
        let reg = registry();
        let heap = Heap::new();
        let wk = reg.well_known();
        let int = wk.primitive(PrimitiveKind::I32);
        let color = reg
            .resolve_type(&TypeDescriptor::named("Test", "Test.Color"))
            .unwrap();
        let node = reg
            .resolve_type(&TypeDescriptor::named("Test", "Test.Node"))
            .unwrap();
        let nullable_int = reg.nullable_of(int).unwrap();

        assert_eq!(reg.coerce(&heap, Value::I32(1), int), Ok(Value::I32(1)));
        assert!(reg.coerce(&heap, Value::I64(1), int).is_err());
        assert!(reg.coerce(&heap, Value::Null, int).is_err());
        assert_eq!(
            reg.coerce(&heap, Value::U8(2), color),
            Ok(Value::Enum { ty: color, bits: 2 })
        );
        assert_eq!(reg.coerce(&heap, Value::Null, nullable_int), Ok(Value::NoValue));
        assert_eq!(reg.coerce(&heap, Value::I32(4), nullable_int), Ok(Value::I32(4)));
        assert_eq!(reg.coerce(&heap, Value::Null, node), Ok(Value::Null));
        assert!(reg.coerce(&heap, Value::string("x"), node).is_err());
        assert_eq!(reg.coerce(&heap, Value::I32(3), wk.object), Ok(Value::I32(3)));
    }

    #[test]
    fn test_derived_instance_assignable_to_base() {
        let reg = registry();
        let mut heap = Heap::new();
        let node = reg
            .resolve_type(&TypeDescriptor::named("Test", "Test.Node"))
            .unwrap();
        let derived = reg
            .resolve_type(&TypeDescriptor::named("Test", "Test.Derived"))
            .unwrap();
        let d = heap.alloc_object(&reg, derived).unwrap();
        let n = heap.alloc_object(&reg, node).unwrap();
        assert!(reg.coerce(&heap, Value::Ref(d), node).is_ok());
        assert!(reg.coerce(&heap, Value::Ref(n), derived).is_err());
    }

    #[test]
    fn test_exception_hierarchy() {
        let reg = registry();
        let wk = reg.well_known();
        assert!(reg.is_exception(wk.divide_by_zero));
        assert!(reg.is_subclass(wk.divide_by_zero, wk.arithmetic));
        assert!(!reg.is_exception(wk.string));
        let fields = reg.instance_fields(wk.divide_by_zero).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "message");
    }

    #[test]
    fn test_array_types_are_cached() {
        let reg = registry();
        let int = reg.well_known().primitive(PrimitiveKind::I32);
        let a = reg.array_of(int, 1).unwrap();
        assert_eq!(reg.array_of(int, 1).unwrap(), a);
        assert_eq!(reg.def(a).unwrap().name, "System.Int32[]");
        let b = reg.array_of(int, 2).unwrap();
        assert_eq!(reg.def(b).unwrap().name, "System.Int32[,]");
    }
}
