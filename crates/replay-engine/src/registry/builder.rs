//! Registry construction
//!
//! Types are declared first and given fields afterwards, so mutually
//! referencing types (a node pointing at itself, a pair of classes pointing at
//! each other) can be described without forward declarations.

use super::corelib;
use super::method::{MethodBody, MethodBuilder, MethodDef, PendingMethod, CTOR_NAME};
use super::{array_def, instantiate_def, RegistryError, TypeRegistry, WellKnown};
use replay_types::{FieldDef, FieldType, PrimitiveKind, TypeDef, TypeId, TypeKind};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

const TYPE_TABLE: u32 = 0x02;
const FIELD_TABLE: u32 = 0x04;
const METHOD_TABLE: u32 = 0x06;

/// Per-module lookup tables and token counters
#[derive(Debug, Default)]
pub(crate) struct ModuleIndex {
    pub(crate) by_token: FxHashMap<u32, TypeId>,
    pub(crate) by_name: FxHashMap<String, TypeId>,
    next_type: u32,
    next_field: u32,
    next_method: u32,
}

impl ModuleIndex {
    fn new() -> Self {
        // Row 1 of the type table is the module pseudo-type
        Self {
            next_type: 1,
            ..Self::default()
        }
    }

    fn next(counter: &mut u32, table: u32) -> u32 {
        *counter += 1;
        (table << 24) | *counter
    }
}

/// Mutable tables shared by the builder front-ends
#[derive(Default)]
pub(crate) struct Draft {
    pub(crate) types: Vec<TypeDef>,
    pub(crate) modules: FxHashMap<String, ModuleIndex>,
    methods: Vec<(PendingMethod, u32, MethodBody)>,
    pub(crate) arrays: FxHashMap<(TypeId, u8), TypeId>,
    pub(crate) instantiations: FxHashMap<(TypeId, Vec<TypeId>), TypeId>,
    pub(crate) nullable: Option<TypeId>,
}

impl Draft {
    fn module_index(&mut self, module: &str) -> &mut ModuleIndex {
        self.modules
            .entry(module.to_string())
            .or_insert_with(ModuleIndex::new)
    }

    pub(crate) fn declare(&mut self, module: &str, name: &str, kind: TypeKind, generic_params: u16) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        let index = self.module_index(module);
        let token = ModuleIndex::next(&mut index.next_type, TYPE_TABLE);
        index.by_token.insert(token, id);
        index.by_name.insert(name.to_string(), id);

        let mut def = TypeDef::new(id, module, name, kind);
        def.token = token;
        def.generic_params = generic_params;
        if let TypeKind::Class { parent: Some(parent) } = kind {
            def.exception = self.types.get(parent.index()).is_some_and(|p| p.exception);
        }
        self.types.push(def);
        id
    }

    pub(crate) fn mark_exception(&mut self, ty: TypeId) {
        if let Some(def) = self.types.get_mut(ty.index()) {
            def.exception = true;
        }
    }

    pub(crate) fn add_field(&mut self, ty: TypeId, name: &str, field_ty: FieldType, is_static: bool) -> u32 {
        let Some(module) = self.types.get(ty.index()).map(|d| d.module.clone()) else {
            return 0;
        };
        let token = ModuleIndex::next(&mut self.module_index(&module).next_field, FIELD_TABLE);
        let mut field = FieldDef::new(name, field_ty);
        field.token = token;
        field.is_static = is_static;
        if let Some(def) = self.types.get_mut(ty.index()) {
            def.fields.push(field);
        }
        token
    }

    pub(crate) fn array_of(&mut self, element: TypeId, rank: u8) -> Result<TypeId, RegistryError> {
        if let Some(id) = self.arrays.get(&(element, rank)) {
            return Ok(*id);
        }
        let element_def = self
            .types
            .get(element.index())
            .ok_or(RegistryError::UnknownTypeId(element.0))?;
        let id = TypeId(self.types.len() as u32);
        let def = array_def(id, element_def, rank);
        self.types.push(def);
        self.arrays.insert((element, rank), id);
        Ok(id)
    }

    pub(crate) fn instantiate(&mut self, definition: TypeId, args: &[TypeId]) -> Result<TypeId, RegistryError> {
        let key = (definition, args.to_vec());
        if let Some(id) = self.instantiations.get(&key) {
            return Ok(*id);
        }
        let def = self
            .types
            .get(definition.index())
            .ok_or(RegistryError::UnknownTypeId(definition.0))?;
        let names = args
            .iter()
            .map(|a| {
                self.types
                    .get(a.index())
                    .map(|d| d.name.clone())
                    .ok_or(RegistryError::UnknownTypeId(a.0))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let id = TypeId(self.types.len() as u32);
        let inst = instantiate_def(def, id, args, &names, self.nullable == Some(definition))?;
        self.types.push(inst);
        self.instantiations.insert(key, id);
        Ok(id)
    }

    pub(crate) fn push_method(&mut self, method: PendingMethod, body: MethodBody) -> u32 {
        let token = ModuleIndex::next(&mut self.module_index(&method.module).next_method, METHOD_TABLE);
        self.methods.push((method, token, body));
        token
    }
}

/// Builder for [`TypeRegistry`]
///
/// The core library is registered on construction; user modules are added
/// through [`RegistryBuilder::module`].
pub struct RegistryBuilder {
    draft: Draft,
    well_known: WellKnown,
}

impl RegistryBuilder {
    /// Create a builder holding only the core library
    pub fn new() -> Self {
        let mut draft = Draft::default();
        let well_known = corelib::register(&mut draft);
        Self { draft, well_known }
    }

    /// Core-library type ids
    pub fn well_known(&self) -> &WellKnown {
        &self.well_known
    }

    /// Open (or reopen) a module for declarations
    pub fn module(&mut self, name: &str) -> ModuleBuilder<'_> {
        self.draft.module_index(name);
        ModuleBuilder {
            draft: &mut self.draft,
            well_known: &self.well_known,
            module: name.to_string(),
        }
    }

    /// Freeze the declared types and methods
    pub fn build(self) -> TypeRegistry {
        let Draft {
            types,
            modules,
            methods,
            arrays,
            instantiations,
            ..
        } = self.draft;

        let type_name = |id: TypeId| types.get(id.index()).map(|d| d.name.as_str()).unwrap_or("?");
        let method_count = methods.len();
        let mut by_type: FxHashMap<TypeId, Vec<Arc<MethodDef>>> = FxHashMap::default();
        for (pending, token, body) in methods {
            let signature = pending.signature.unwrap_or_else(|| {
                let params: Vec<&str> = pending.params.iter().map(|p| type_name(*p)).collect();
                format!("({})", params.join(", "))
            });
            let def = MethodDef {
                full_name: format!("{}.{}", type_name(pending.declaring), pending.name),
                name: pending.name,
                token,
                declaring: pending.declaring,
                signature,
                params: pending.params,
                ret: pending.ret,
                is_static: pending.is_static,
                is_ctor: pending.is_ctor,
                expected_coverage: pending.expected_coverage,
                body,
            };
            by_type.entry(def.declaring).or_default().push(Arc::new(def));
        }

        debug!(
            types = types.len(),
            methods = method_count,
            modules = modules.len(),
            "type registry built"
        );
        TypeRegistry::from_parts(types, modules, by_type, arrays, instantiations, self.well_known)
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Declarations scoped to one module
pub struct ModuleBuilder<'b> {
    draft: &'b mut Draft,
    well_known: &'b WellKnown,
    module: String,
}

impl<'b> ModuleBuilder<'b> {
    /// Core-library type ids
    pub fn well_known(&self) -> &WellKnown {
        self.well_known
    }

    /// Core-library primitive type
    pub fn primitive(&self, kind: PrimitiveKind) -> TypeId {
        self.well_known.primitive(kind)
    }

    /// Declare a class
    pub fn class(&mut self, name: &str, parent: Option<TypeId>) -> TypeId {
        self.draft.declare(&self.module, name, TypeKind::Class { parent }, 0)
    }

    /// Declare a generic class definition with `params` type parameters
    pub fn generic_class(&mut self, name: &str, params: u16) -> TypeId {
        self.draft
            .declare(&self.module, name, TypeKind::Class { parent: None }, params)
    }

    /// Declare a struct
    pub fn struct_type(&mut self, name: &str) -> TypeId {
        self.draft.declare(&self.module, name, TypeKind::Struct, 0)
    }

    /// Declare a generic struct definition with `params` type parameters
    pub fn generic_struct(&mut self, name: &str, params: u16) -> TypeId {
        self.draft.declare(&self.module, name, TypeKind::Struct, params)
    }

    /// Declare an enum over an integer kind
    pub fn enum_type(&mut self, name: &str, underlying: PrimitiveKind) -> TypeId {
        self.draft
            .declare(&self.module, name, TypeKind::Enum { underlying }, 0)
    }

    /// Declare a delegate type
    pub fn delegate(&mut self, name: &str) -> TypeId {
        self.draft.declare(&self.module, name, TypeKind::Delegate, 0)
    }

    /// Add an instance field of a concrete type
    pub fn field(&mut self, owner: TypeId, name: &str, ty: TypeId) -> u32 {
        self.draft
            .add_field(owner, name, FieldType::Concrete(ty), false)
    }

    /// Add an instance field typed by a generic parameter of `owner`
    pub fn generic_field(&mut self, owner: TypeId, name: &str, param: u16) -> u32 {
        self.draft.add_field(owner, name, FieldType::Param(param), false)
    }

    /// Add a static field (not part of instance state)
    pub fn static_field(&mut self, owner: TypeId, name: &str, ty: TypeId) -> u32 {
        self.draft
            .add_field(owner, name, FieldType::Concrete(ty), true)
    }

    /// Array type over `element`
    pub fn array_of(&mut self, element: TypeId, rank: u8) -> Result<TypeId, RegistryError> {
        self.draft.array_of(element, rank)
    }

    /// Closed instantiation of a generic definition
    pub fn instantiate(&mut self, definition: TypeId, args: &[TypeId]) -> Result<TypeId, RegistryError> {
        self.draft.instantiate(definition, args)
    }

    /// `Nullable<inner>`
    pub fn nullable_of(&mut self, inner: TypeId) -> Result<TypeId, RegistryError> {
        self.draft.instantiate(self.well_known.nullable, &[inner])
    }

    /// Start declaring a static method returning void
    pub fn method(&mut self, declaring: TypeId, name: &str) -> MethodBuilder<'_> {
        let pending = PendingMethod {
            name: name.to_string(),
            module: self.module.clone(),
            declaring,
            signature: None,
            params: Vec::new(),
            ret: self.well_known.void,
            is_static: true,
            is_ctor: false,
            expected_coverage: None,
        };
        MethodBuilder::new(self.draft, pending)
    }

    /// Start declaring an instance constructor
    pub fn constructor(&mut self, declaring: TypeId) -> MethodBuilder<'_> {
        let pending = PendingMethod {
            name: CTOR_NAME.to_string(),
            module: self.module.clone(),
            declaring,
            signature: None,
            params: Vec::new(),
            ret: self.well_known.void,
            is_static: false,
            is_ctor: true,
            expected_coverage: None,
        };
        MethodBuilder::new(self.draft, pending)
    }
}
