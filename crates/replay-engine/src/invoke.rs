//! Invocation context handed to method bodies
//!
//! A [`CallContext`] ties together the registry, the test's heap, and the
//! invocation's coverage trace. Exceptions are ordinary heap objects; a body
//! throws by returning `Err(Thrown)`.

use crate::coverage::{ExecutionTrace, MethodKey};
use crate::heap::{Heap, HeapObject, Object};
use crate::registry::{MethodDef, TypeRegistry};
use crate::value::{ObjRef, Value};
use replay_types::TypeId;
use std::sync::Arc;
use tracing::trace;

/// Exception raised by a callee
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thrown {
    /// Exception object in the test heap
    pub exception: ObjRef,
}

/// Execution state for one invocation and its nested calls
pub struct CallContext<'a> {
    registry: &'a TypeRegistry,
    heap: &'a mut Heap,
    trace: &'a mut ExecutionTrace,
    frames: Vec<Arc<MethodDef>>,
}

impl<'a> CallContext<'a> {
    /// Create a context over a test heap and trace
    pub fn new(registry: &'a TypeRegistry, heap: &'a mut Heap, trace: &'a mut ExecutionTrace) -> Self {
        Self {
            registry,
            heap,
            trace,
            frames: Vec::new(),
        }
    }

    /// Registry the callee's types live in
    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    /// Test heap
    pub fn heap(&self) -> &Heap {
        &*self.heap
    }

    /// Test heap, mutably
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut *self.heap
    }

    /// Coverage trace of this invocation
    pub fn trace(&self) -> &ExecutionTrace {
        &*self.trace
    }

    /// Logical thread id of the invocation
    pub fn thread_id(&self) -> u32 {
        self.trace.thread_id
    }

    /// Record a coverage probe in the currently executing method
    pub fn hit(&mut self, offset: u32) {
        if let Some(frame) = self.frames.last() {
            self.trace.record(MethodKey::from(frame.as_ref()), offset);
        }
    }

    /// Call `method`; instance methods require a non-null receiver
    pub fn invoke(
        &mut self,
        method: &Arc<MethodDef>,
        receiver: Option<&Value>,
        args: &[Value],
    ) -> Result<Value, Thrown> {
        if !method.is_static && receiver.map_or(true, Value::is_null) {
            let ty = self.registry.well_known().null_reference;
            return Err(self.throw(ty, "Object reference not set to an instance of an object."));
        }
        self.frames.push(Arc::clone(method));
        let result = method.call(self, receiver, args);
        self.frames.pop();
        result
    }

    /// Allocate an exception of type `ty` carrying `message` and the current
    /// call stack
    pub fn throw(&mut self, ty: TypeId, message: &str) -> Thrown {
        let stack: Vec<String> = self
            .frames
            .iter()
            .rev()
            .map(|m| format!("   at {}", m))
            .collect();
        let exception = match self.heap.alloc_object(self.registry, ty) {
            Ok(r) => r,
            Err(err) => {
                trace!(ty = %self.registry.type_name(ty), %err, "exception allocated without fields");
                self.heap.alloc(HeapObject::Object(Object {
                    ty,
                    fields: Vec::new(),
                }))
            }
        };
        let target = Value::Ref(exception);
        let fields = [
            ("message", Value::string(message)),
            ("stack_trace", Value::string(&stack.join("\n"))),
        ];
        for (name, value) in fields {
            if self.store(&target, name, value).is_none() {
                trace!(ty = %self.registry.type_name(ty), field = name, "exception field not stored");
            }
        }
        Thrown { exception }
    }

    fn invalid(&mut self, message: String) -> Thrown {
        let ty = self.registry.well_known().invalid_operation;
        self.throw(ty, &message)
    }

    fn null_reference(&mut self) -> Thrown {
        let ty = self.registry.well_known().null_reference;
        self.throw(ty, "Object reference not set to an instance of an object.")
    }

    fn slot_of(&self, ty: TypeId, name: &str) -> Option<usize> {
        let fields = self.registry.instance_fields(ty).ok()?;
        fields.iter().rev().find(|f| f.name == name).map(|f| f.slot)
    }

    fn store(&mut self, target: &Value, name: &str, value: Value) -> Option<()> {
        let r = target.as_obj()?;
        let ty = self.heap.get(r).ok()?.ty();
        let slot = self.slot_of(ty, name)?;
        self.heap.object_mut(r).ok()?.set_field(slot, value).ok()
    }

    /// Read a named field of an object or inline struct
    pub fn field(&mut self, target: &Value, name: &str) -> Result<Value, Thrown> {
        match target {
            Value::Null | Value::NoValue => Err(self.null_reference()),
            Value::Struct(s) => match self.slot_of(s.ty, name).and_then(|slot| s.fields.get(slot)) {
                Some(v) => Ok(v.clone()),
                None => Err(self.invalid(format!("no field '{}'", name))),
            },
            Value::Ref(r) => {
                let found = self.heap.object(*r).ok().and_then(|obj| {
                    let slot = self.slot_of(obj.ty, name)?;
                    obj.get_field(slot).cloned()
                });
                match found {
                    Some(v) => Ok(v),
                    None => Err(self.invalid(format!("no field '{}'", name))),
                }
            }
            _ => Err(self.invalid(format!("value has no field '{}'", name))),
        }
    }

    /// Write a named field of a heap object, coercing to the field type
    pub fn set_field(&mut self, target: &Value, name: &str, value: Value) -> Result<(), Thrown> {
        let r = match target {
            Value::Null | Value::NoValue => return Err(self.null_reference()),
            Value::Ref(r) => *r,
            _ => return Err(self.invalid(format!("cannot assign field '{}' of an unboxed value", name))),
        };
        let ty = match self.heap.get(r) {
            Ok(obj) => obj.ty(),
            Err(e) => return Err(self.invalid(e.to_string())),
        };
        let field = self
            .registry
            .instance_fields(ty)
            .ok()
            .and_then(|fields| fields.iter().rev().find(|f| f.name == name).cloned());
        let Some(field) = field else {
            return Err(self.invalid(format!("no field '{}'", name)));
        };
        let value = match self.registry.coerce(self.heap, value, field.ty) {
            Ok(v) => v,
            Err(e) => return Err(self.invalid(e.to_string())),
        };
        match self.heap.object_mut(r).map(|obj| obj.set_field(field.slot, value)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) | Err(e) => Err(self.invalid(e.to_string())),
        }
    }

    /// Copy out the elements of an array
    pub fn array_elements(&mut self, target: &Value) -> Result<Vec<Value>, Thrown> {
        match target {
            Value::Null | Value::NoValue => Err(self.null_reference()),
            Value::Ref(r) => match self.heap.array(*r) {
                Ok(arr) => Ok(arr.elements.clone()),
                Err(e) => Err(self.invalid(e.to_string())),
            },
            _ => Err(self.invalid("value is not an array".to_string())),
        }
    }

    /// Allocate a default-initialized class instance
    pub fn new_object(&mut self, ty: TypeId) -> Result<Value, Thrown> {
        match self.heap.alloc_object(self.registry, ty) {
            Ok(r) => Ok(Value::Ref(r)),
            Err(e) => Err(self.invalid(e.to_string())),
        }
    }

    /// Allocate a one-dimensional array holding `values`
    pub fn new_array(&mut self, element: TypeId, values: Vec<Value>) -> Result<Value, Thrown> {
        let r = match self.heap.alloc_array(self.registry, element, &[values.len()]) {
            Ok(r) => r,
            Err(e) => return Err(self.invalid(e.to_string())),
        };
        for (i, v) in values.into_iter().enumerate() {
            let stored = match self.registry.coerce(self.heap, v, element) {
                Ok(v) => v,
                Err(e) => return Err(self.invalid(e.to_string())),
            };
            if let Err(e) = self.heap.array_mut(r).and_then(|a| a.set(i as i64, stored)) {
                return Err(self.invalid(e.to_string()));
            }
        }
        Ok(Value::Ref(r))
    }
}
