//! Per-test object arena
//!
//! Every test owns one [`Heap`]. Objects are never freed while the test runs;
//! the whole arena is dropped with the test. Cycles are plain index cycles.

use crate::registry::{RegistryError, TypeRegistry};
use crate::value::{ObjRef, Value};
use replay_types::{TypeId, TypeKind};
use thiserror::Error;

/// Largest element count a single array may hold
pub const MAX_ARRAY_ELEMENTS: usize = 1 << 24;

/// Heap access errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HeapError {
    /// Reference does not point into this heap
    #[error("Dangling object reference @{0}")]
    Dangling(u32),

    /// Expected an object, found an array
    #[error("Object @{0} is not a class or boxed struct instance")]
    NotAnObject(u32),

    /// Expected an array, found an object
    #[error("Object @{0} is not an array")]
    NotAnArray(u32),

    /// Array index outside the declared bounds
    #[error("Array index {index} out of bounds (length: {length})")]
    IndexOutOfRange {
        /// Requested index
        index: i64,
        /// Total element count
        length: usize,
    },

    /// Field slot outside the object's field list
    #[error("Field index {slot} out of bounds (object has {count} fields)")]
    FieldOutOfRange {
        /// Requested slot
        slot: usize,
        /// Field count
        count: usize,
    },
}

/// Class instance or boxed struct
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    /// Runtime type
    pub ty: TypeId,
    /// Instance fields, parent fields first
    pub fields: Vec<Value>,
}

impl Object {
    /// Get a field value by slot
    pub fn get_field(&self, slot: usize) -> Option<&Value> {
        self.fields.get(slot)
    }

    /// Set a field value by slot
    pub fn set_field(&mut self, slot: usize, value: Value) -> Result<(), HeapError> {
        let count = self.fields.len();
        match self.fields.get_mut(slot) {
            Some(f) => {
                *f = value;
                Ok(())
            }
            None => Err(HeapError::FieldOutOfRange { slot, count }),
        }
    }
}

/// Array instance of any rank
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    /// Array type
    pub ty: TypeId,
    /// Element type
    pub element: TypeId,
    /// Length of each dimension
    pub lengths: Vec<usize>,
    /// Lower bound of each dimension
    pub lower_bounds: Vec<i64>,
    /// Elements in row-major order
    pub elements: Vec<Value>,
}

impl Array {
    /// Number of dimensions
    pub fn rank(&self) -> usize {
        self.lengths.len()
    }

    /// Total element count
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Check if the array has no elements
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Element at a flat index
    pub fn get(&self, index: i64) -> Result<&Value, HeapError> {
        let length = self.elements.len();
        usize::try_from(index)
            .ok()
            .and_then(|i| self.elements.get(i))
            .ok_or(HeapError::IndexOutOfRange { index, length })
    }

    /// Replace the element at a flat index
    pub fn set(&mut self, index: i64, value: Value) -> Result<(), HeapError> {
        let length = self.elements.len();
        match usize::try_from(index).ok().and_then(|i| self.elements.get_mut(i)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(HeapError::IndexOutOfRange { index, length }),
        }
    }
}

/// Anything stored in the heap
#[derive(Debug, Clone, PartialEq)]
pub enum HeapObject {
    /// Class instance or boxed struct
    Object(Object),
    /// Array
    Array(Array),
}

impl HeapObject {
    /// Runtime type of the object
    pub fn ty(&self) -> TypeId {
        match self {
            HeapObject::Object(o) => o.ty,
            HeapObject::Array(a) => a.ty,
        }
    }
}

/// Object arena
#[derive(Debug, Default, Clone)]
pub struct Heap {
    objects: Vec<HeapObject>,
}

impl Heap {
    /// Create an empty heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if nothing has been allocated
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Move an object into the arena
    pub fn alloc(&mut self, object: HeapObject) -> ObjRef {
        let r = ObjRef(self.objects.len() as u32);
        self.objects.push(object);
        r
    }

    /// Allocate a default-initialized instance of a class or struct
    ///
    /// Struct instances allocated here are boxed; assigning them into a
    /// value-typed slot copies them out again.
    pub fn alloc_object(&mut self, registry: &TypeRegistry, ty: TypeId) -> Result<ObjRef, RegistryError> {
        let def = registry.def(ty)?;
        if def.is_generic_definition() {
            return Err(RegistryError::NotInstantiable {
                ty: def.name.clone(),
                reason: "open generic definition".to_string(),
            });
        }
        match def.kind {
            TypeKind::Class { .. } | TypeKind::Struct | TypeKind::Object => {}
            _ => {
                return Err(RegistryError::NotInstantiable {
                    ty: def.name.clone(),
                    reason: "not a class or struct".to_string(),
                })
            }
        }
        let fields = registry
            .instance_fields(ty)?
            .iter()
            .map(|f| registry.default_value(f.ty))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.alloc(HeapObject::Object(Object { ty, fields })))
    }

    /// Allocate a zero-based array of `element` with the given dimension lengths
    pub fn alloc_array(
        &mut self,
        registry: &TypeRegistry,
        element: TypeId,
        lengths: &[usize],
    ) -> Result<ObjRef, RegistryError> {
        let rank = lengths.len().max(1) as u8;
        let ty = registry.array_of(element, rank)?;
        let fill = registry.default_value(element)?;
        let lengths = if lengths.is_empty() { vec![0] } else { lengths.to_vec() };
        let too_large = |reason: String| RegistryError::NotInstantiable {
            ty: registry.type_name(ty),
            reason,
        };
        let total = lengths
            .iter()
            .try_fold(1usize, |acc, len| acc.checked_mul(*len))
            .ok_or_else(|| too_large(format!("element count {:?} overflows", lengths)))?;
        if total > MAX_ARRAY_ELEMENTS {
            return Err(too_large(format!(
                "{} elements exceeds the limit of {}",
                total, MAX_ARRAY_ELEMENTS
            )));
        }
        let mut elements = Vec::new();
        elements
            .try_reserve_exact(total)
            .map_err(|e| too_large(e.to_string()))?;
        elements.resize(total, fill);
        Ok(self.alloc(HeapObject::Array(Array {
            ty,
            element,
            lower_bounds: vec![0; lengths.len()],
            lengths,
            elements,
        })))
    }

    /// Look up an object
    pub fn get(&self, r: ObjRef) -> Result<&HeapObject, HeapError> {
        self.objects.get(r.index()).ok_or(HeapError::Dangling(r.0))
    }

    /// Look up an object mutably
    pub fn get_mut(&mut self, r: ObjRef) -> Result<&mut HeapObject, HeapError> {
        self.objects.get_mut(r.index()).ok_or(HeapError::Dangling(r.0))
    }

    /// Look up a class instance or boxed struct
    pub fn object(&self, r: ObjRef) -> Result<&Object, HeapError> {
        match self.get(r)? {
            HeapObject::Object(o) => Ok(o),
            HeapObject::Array(_) => Err(HeapError::NotAnObject(r.0)),
        }
    }

    /// Look up a class instance or boxed struct mutably
    pub fn object_mut(&mut self, r: ObjRef) -> Result<&mut Object, HeapError> {
        match self.get_mut(r)? {
            HeapObject::Object(o) => Ok(o),
            HeapObject::Array(_) => Err(HeapError::NotAnObject(r.0)),
        }
    }

    /// Look up an array
    pub fn array(&self, r: ObjRef) -> Result<&Array, HeapError> {
        match self.get(r)? {
            HeapObject::Array(a) => Ok(a),
            HeapObject::Object(_) => Err(HeapError::NotAnArray(r.0)),
        }
    }

    /// Look up an array mutably
    pub fn array_mut(&mut self, r: ObjRef) -> Result<&mut Array, HeapError> {
        match self.get_mut(r)? {
            HeapObject::Array(a) => Ok(a),
            HeapObject::Object(_) => Err(HeapError::NotAnArray(r.0)),
        }
    }
}
