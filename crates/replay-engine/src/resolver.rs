//! Test resolution
//!
//! Turns a [`TestDescription`] into live values: runs the arrange statements
//! against a fresh heap, evaluates the call's arguments, splits off the
//! receiver, and classifies the expected result. Addresses are bound the
//! first time a `NewObject`/`NewArray` statement is evaluated; later
//! statements with the same address (or a `CyclicReference`) yield the same
//! instance, which is how self-referencing graphs are expressed.

use crate::codec::{CodecError, Fragment, ValueCodec};
use crate::coverage::ExecutionTrace;
use crate::heap::{Heap, HeapError, HeapObject};
use crate::invoke::CallContext;
use crate::registry::{MethodDef, RegistryError, TypeRegistry};
use crate::stmt::{Address, Stmt, TestDescription};
use crate::value::{ObjRef, Value};
use replay_types::{TypeDescriptor, TypeId, TypeKind};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Fatal resolution errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// Type, method, or field resolution failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Byte-slice combination failed
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Heap access failed
    #[error(transparent)]
    Heap(#[from] HeapError),

    /// Address referenced before any statement bound it
    #[error("Address {0} is not bound to an instance")]
    UnboundAddress(Address),

    /// Statement kind not valid in this position
    #[error("Unexpected {kind} statement in {position}")]
    UnexpectedStatement {
        /// Statement kind
        kind: &'static str,
        /// Where it appeared
        position: &'static str,
    },

    /// Statement expected to produce an instance produced something else
    #[error("{kind} statement does not produce a heap instance")]
    NotAnInstance {
        /// Statement kind
        kind: &'static str,
    },

    /// Field assigned on an instance of an unrelated type
    #[error("Field {field} is not declared on {ty} or its base types")]
    FieldOwner {
        /// Field name
        field: String,
        /// Instance type
        ty: String,
    },

    /// Wrong argument count for the callee
    #[error("Method {method} expects {expected} arguments, got {actual}")]
    ArgumentCount {
        /// Callee
        method: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied count
        actual: usize,
    },

    /// Instance callee without a receiver argument
    #[error("Instance method {0} called without a receiver")]
    MissingReceiver(String),

    /// A call nested inside test setup threw
    #[error("Call to {method} during test setup threw {exception}")]
    SetupCallThrew {
        /// Callee
        method: String,
        /// Exception type
        exception: String,
    },
}

/// Address to instance bindings of one test
#[derive(Debug, Default, Clone)]
pub struct InstanceTable {
    bindings: FxHashMap<Address, ObjRef>,
}

impl InstanceTable {
    /// Instance bound to `address`
    pub fn get(&self, address: Address) -> Option<ObjRef> {
        self.bindings.get(&address).copied()
    }

    /// Number of bound addresses
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if nothing is bound
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn bind(&mut self, address: Address, r: ObjRef) {
        self.bindings.insert(address, r);
    }
}

/// Expected outcome of the call under test
#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    /// Normal return of this value
    Value(Value),
    /// Exception of `ty`, described by `instance`
    Exception {
        /// Exception type
        ty: TypeId,
        /// Expected exception object
        instance: Value,
    },
}

/// A test with every statement resolved to live values
#[derive(Debug)]
pub struct ResolvedTest {
    /// Callee
    pub method: Arc<MethodDef>,
    /// Receiver, for instance methods and constructors
    pub receiver: Option<Value>,
    /// Arguments, coerced to the parameter types
    pub args: Vec<Value>,
    /// Expected outcome
    pub expected: Expected,
    /// Heap holding every arranged instance
    pub heap: Heap,
    /// Address bindings
    pub instances: InstanceTable,
}

/// Resolves one test description against a registry
pub struct TestResolver<'r> {
    registry: &'r TypeRegistry,
    heap: Heap,
    instances: InstanceTable,
}

impl<'r> TestResolver<'r> {
    /// Create a resolver with an empty heap
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            heap: Heap::new(),
            instances: InstanceTable::default(),
        }
    }

    /// Heap built so far
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Address bindings made so far
    pub fn instances(&self) -> &InstanceTable {
        &self.instances
    }

    /// Resolve a whole test
    pub fn resolve(mut self, test: &TestDescription) -> Result<ResolvedTest, ResolveError> {
        for stmt in &test.arrange {
            self.arrange(stmt)?;
        }
        let (method, receiver, args) = self.call(&test.call)?;
        let expected = self.expected(&test.expected)?;
        trace!(
            method = %method,
            objects = self.heap.len(),
            addresses = self.instances.len(),
            "resolved test"
        );
        Ok(ResolvedTest {
            method,
            receiver,
            args,
            expected,
            heap: self.heap,
            instances: self.instances,
        })
    }

    /// Execute one arrange statement
    pub fn arrange(&mut self, stmt: &Stmt) -> Result<(), ResolveError> {
        trace!(kind = stmt.kind_name(), "arrange");
        match stmt {
            Stmt::SetObjectField { instance, field, value } => {
                let target = self.instance(instance)?;
                let value = self.evaluate(value)?;
                let field = self.registry.resolve_field(field)?;
                let obj_ty = self.heap.object(target)?.ty;
                if !self.registry.is_subclass(obj_ty, field.declaring) {
                    return Err(ResolveError::FieldOwner {
                        field: field.name,
                        ty: self.registry.type_name(obj_ty),
                    });
                }
                let value = self.registry.coerce(&self.heap, value, field.ty)?;
                self.heap.object_mut(target)?.set_field(field.slot, value)?;
                Ok(())
            }
            Stmt::SetArrayIndex { instance, index, value } => {
                let target = self.instance(instance)?;
                let value = self.evaluate(value)?;
                let element = self.heap.array(target)?.element;
                let value = self.registry.coerce(&self.heap, value, element)?;
                self.heap.array_mut(target)?.set(*index, value)?;
                Ok(())
            }
            Stmt::NewObject { .. } | Stmt::NewArray { .. } => self.instance(stmt).map(|_| ()),
            other => Err(ResolveError::UnexpectedStatement {
                kind: other.kind_name(),
                position: "arrange",
            }),
        }
    }

    /// Resolve a statement that must denote a heap instance
    fn instance(&mut self, stmt: &Stmt) -> Result<ObjRef, ResolveError> {
        match stmt {
            Stmt::NewObject { ty, address } => {
                if let Some(r) = self.instances.get(*address) {
                    return Ok(r);
                }
                let ty = self.registry.resolve_type(ty)?;
                let r = self.heap.alloc_object(self.registry, ty)?;
                self.instances.bind(*address, r);
                Ok(r)
            }
            Stmt::NewArray {
                element_type,
                size,
                address,
            } => {
                if let Some(r) = self.instances.get(*address) {
                    return Ok(r);
                }
                let element = self.registry.resolve_type(element_type)?;
                let r = self.heap.alloc_array(self.registry, element, &[*size])?;
                self.instances.bind(*address, r);
                Ok(r)
            }
            Stmt::CyclicReference { address } => self
                .instances
                .get(*address)
                .ok_or(ResolveError::UnboundAddress(*address)),
            other => match self.evaluate(other)? {
                Value::Ref(r) => Ok(r),
                _ => Err(ResolveError::NotAnInstance {
                    kind: other.kind_name(),
                }),
            },
        }
    }

    fn constant(&self, value: Value, ty: &Option<TypeDescriptor>) -> Result<Value, ResolveError> {
        let Some(desc) = ty else {
            return Ok(value);
        };
        let ty = self.registry.resolve_type(desc)?;
        let def = self.registry.def(ty)?;
        let TypeKind::Enum { underlying } = def.kind else {
            return Ok(value);
        };
        match (value.primitive_kind(), value.to_bits()) {
            (Some(kind), Some(bits)) if kind == underlying => Ok(Value::enum_of(ty, underlying, bits)),
            (kind, _) => Err(RegistryError::TypeMismatch {
                expected: def.name.clone(),
                actual: kind.map_or("non-integer constant", |k| k.type_name()).to_string(),
            }
            .into()),
        }
    }

    /// Evaluate an expression statement to a value
    pub fn evaluate(&mut self, stmt: &Stmt) -> Result<Value, ResolveError> {
        match stmt {
            Stmt::Bool { value, ty } => self.constant(Value::Bool(*value), ty),
            Stmt::Char { value, ty } => self.constant(Value::Char(*value), ty),
            Stmt::Int8 { value, ty } => self.constant(Value::I8(*value), ty),
            Stmt::Int16 { value, ty } => self.constant(Value::I16(*value), ty),
            Stmt::Int32 { value, ty } => self.constant(Value::I32(*value), ty),
            Stmt::Int64 { value, ty } => self.constant(Value::I64(*value), ty),
            Stmt::UInt8 { value, ty } => self.constant(Value::U8(*value), ty),
            Stmt::UInt16 { value, ty } => self.constant(Value::U16(*value), ty),
            Stmt::UInt32 { value, ty } => self.constant(Value::U32(*value), ty),
            Stmt::UInt64 { value, ty } => self.constant(Value::U64(*value), ty),
            Stmt::Float { value } => Ok(Value::F32(*value)),
            Stmt::Double { value } => Ok(Value::F64(*value)),
            Stmt::String { value } => Ok(Value::string(value)),
            Stmt::Null { .. } => Ok(Value::Null),
            Stmt::NewObject { .. } | Stmt::NewArray { .. } | Stmt::CyclicReference { .. } => {
                Ok(Value::Ref(self.instance(stmt)?))
            }
            Stmt::TypeInstance { ty } => Ok(Value::Type(self.registry.resolve_type(ty)?)),
            Stmt::ByteSliceCombine { ty, slices } => {
                let ty = self.registry.resolve_type(ty)?;
                let fragments = slices
                    .iter()
                    .map(|s| {
                        Ok(Fragment {
                            value: self.evaluate(&s.value)?,
                            start: s.start,
                            end: s.end,
                        })
                    })
                    .collect::<Result<Vec<_>, ResolveError>>()?;
                Ok(ValueCodec::new(self.registry, &self.heap).combine(ty, &fragments)?)
            }
            Stmt::InstanceMethodCall { .. } | Stmt::StaticMethodCall { .. } | Stmt::ConstructorCall { .. } => {
                self.nested_call(stmt)
            }
            Stmt::SetObjectField { .. } | Stmt::SetArrayIndex { .. } => Err(ResolveError::UnexpectedStatement {
                kind: stmt.kind_name(),
                position: "expression",
            }),
        }
    }

    /// Resolve a call statement to callee, receiver, and coerced arguments
    fn call(&mut self, stmt: &Stmt) -> Result<(Arc<MethodDef>, Option<Value>, Vec<Value>), ResolveError> {
        let (desc, receiver_stmt, arg_stmts) = match stmt {
            Stmt::InstanceMethodCall { method, instance, args } => (method, Some(instance.as_ref()), args),
            Stmt::StaticMethodCall { method, args } | Stmt::ConstructorCall { method, args } => (method, None, args),
            other => {
                return Err(ResolveError::UnexpectedStatement {
                    kind: other.kind_name(),
                    position: "call",
                })
            }
        };
        let method = self.registry.resolve_method(desc)?;

        let mut values = Vec::with_capacity(arg_stmts.len() + 1);
        if let Some(receiver) = receiver_stmt {
            values.push(self.evaluate(receiver)?);
        }
        for arg in arg_stmts {
            values.push(self.evaluate(arg)?);
        }

        let receiver = if method.is_ctor {
            if receiver_stmt.is_some() {
                values.remove(0);
            }
            let r = self.heap.alloc_object(self.registry, method.declaring)?;
            Some(Value::Ref(r))
        } else if method.is_static {
            if receiver_stmt.is_some() {
                values.remove(0);
            }
            None
        } else {
            if values.is_empty() {
                return Err(ResolveError::MissingReceiver(method.to_string()));
            }
            Some(values.remove(0))
        };

        if values.len() != method.params.len() {
            return Err(ResolveError::ArgumentCount {
                method: method.to_string(),
                expected: method.params.len(),
                actual: values.len(),
            });
        }
        let args = values
            .into_iter()
            .zip(&method.params)
            .map(|(v, ty)| self.registry.coerce(&self.heap, v, *ty))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((method, receiver, args))
    }

    fn nested_call(&mut self, stmt: &Stmt) -> Result<Value, ResolveError> {
        let (method, receiver, args) = self.call(stmt)?;
        let mut trace = ExecutionTrace::detached();
        let result = {
            let mut ctx = CallContext::new(self.registry, &mut self.heap, &mut trace);
            ctx.invoke(&method, receiver.as_ref(), &args)
        };
        match result {
            Ok(value) if method.is_ctor => Ok(receiver.unwrap_or(value)),
            Ok(value) => Ok(value),
            Err(thrown) => {
                let exception = self
                    .heap
                    .get(thrown.exception)
                    .map(|o| self.registry.type_name(o.ty()))
                    .unwrap_or_else(|_| "unknown exception".to_string());
                Err(ResolveError::SetupCallThrew {
                    method: method.to_string(),
                    exception,
                })
            }
        }
    }

    fn expected(&mut self, stmt: &Stmt) -> Result<Expected, ResolveError> {
        let value = self.evaluate(stmt)?;
        if let Value::Ref(r) = value {
            if let Ok(HeapObject::Object(obj)) = self.heap.get(r) {
                if self.registry.is_exception(obj.ty) {
                    return Ok(Expected::Exception {
                        ty: obj.ty,
                        instance: value,
                    });
                }
            }
        }
        Ok(Expected::Value(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_types::{FieldDescriptor, MethodDescriptor, PrimitiveKind};

    fn registry() -> TypeRegistry {
        let mut builder = TypeRegistry::builder();
        let mut m = builder.module("T");
        let int = m.primitive(PrimitiveKind::I32);
        let node = m.class("T.Node", None);
        m.field(node, "next", node);
        m.field(node, "value", int);
        m.enum_type("T.Shade", PrimitiveKind::U8);
        let util = m.class("T.Util", None);
        m.method(util, "Id").param(int).returns(int).body(|_, _, a| Ok(a[0].clone()));
        m.method(util, "Boom").returns(int).body(|ctx, _, _| {
            let ty = ctx.registry().well_known().invalid_operation;
            Err(ctx.throw(ty, "boom"))
        });
        builder.build()
    }

    fn node_ty() -> TypeDescriptor {
        TypeDescriptor::named("T", "T.Node")
    }

    fn new_node(address: Address) -> Stmt {
        Stmt::NewObject {
            ty: node_ty(),
            address,
        }
    }

    fn set(instance: Stmt, field: &str, value: Stmt) -> Stmt {
        Stmt::SetObjectField {
            instance: Box::new(instance),
            field: FieldDescriptor::new(node_ty(), field),
            value: Box::new(value),
        }
    }

    #[test]
    fn test_same_address_is_same_instance() {
        let reg = registry();
        let mut resolver = TestResolver::new(&reg);
        let a = resolver.evaluate(&new_node(1)).unwrap();
        let b = resolver.evaluate(&new_node(1)).unwrap();
        assert_eq!(a, b);
        assert_eq!(resolver.heap().len(), 1);
    }

    #[test]
    fn test_self_cycle() {
        let reg = registry();
        let mut resolver = TestResolver::new(&reg);
        resolver
            .arrange(&set(new_node(1), "next", Stmt::CyclicReference { address: 1 }))
            .unwrap();
        let r = resolver.instances().get(1).unwrap();
        assert_eq!(resolver.heap().object(r).unwrap().fields[0], Value::Ref(r));
    }

    #[test]
    fn test_unbound_cyclic_reference_is_fatal() {
        let reg = registry();
        let mut resolver = TestResolver::new(&reg);
        assert_eq!(
            resolver.evaluate(&Stmt::CyclicReference { address: 4 }),
            Err(ResolveError::UnboundAddress(4))
        );
    }

    #[test]
    fn test_setter_as_expression_is_fatal() {
        let reg = registry();
        let mut resolver = TestResolver::new(&reg);
        let err = resolver
            .evaluate(&set(new_node(1), "value", Stmt::int32(1)))
            .unwrap_err();
        assert!(matches!(err, ResolveError::UnexpectedStatement { position: "expression", .. }));
        assert!(matches!(
            resolver.arrange(&Stmt::int32(1)),
            Err(ResolveError::UnexpectedStatement { position: "arrange", .. })
        ));
    }

    #[test]
    fn test_field_value_type_checked() {
        let reg = registry();
        let mut resolver = TestResolver::new(&reg);
        let err = resolver
            .arrange(&set(new_node(1), "value", Stmt::String { value: "x".into() }))
            .unwrap_err();
        assert!(matches!(err, ResolveError::Registry(RegistryError::TypeMismatch { .. })));
    }

    #[test]
    fn test_nested_call_result_is_used() {
        let reg = registry();
        let mut resolver = TestResolver::new(&reg);
        let call = Stmt::StaticMethodCall {
            method: MethodDescriptor::new(TypeDescriptor::named("T", "T.Util"), "Id"),
            args: vec![Stmt::int32(5)],
        };
        assert_eq!(resolver.evaluate(&call).unwrap(), Value::I32(5));

        let boom = Stmt::StaticMethodCall {
            method: MethodDescriptor::new(TypeDescriptor::named("T", "T.Util"), "Boom"),
            args: vec![],
        };
        assert!(matches!(
            resolver.evaluate(&boom),
            Err(ResolveError::SetupCallThrew { .. })
        ));
    }

    #[test]
    fn test_argument_count_checked() {
        let reg = registry();
        let test = TestDescription {
            arrange: vec![],
            call: Stmt::StaticMethodCall {
                method: MethodDescriptor::new(TypeDescriptor::named("T", "T.Util"), "Id"),
                args: vec![],
            },
            expected: Stmt::int32(0),
        };
        assert!(matches!(
            TestResolver::new(&reg).resolve(&test),
            Err(ResolveError::ArgumentCount { expected: 1, actual: 0, .. })
        ));
    }

    #[test]
    fn test_exception_expected_is_classified() {
        let reg = registry();
        let test = TestDescription {
            arrange: vec![],
            call: Stmt::StaticMethodCall {
                method: MethodDescriptor::new(TypeDescriptor::named("T", "T.Util"), "Boom"),
                args: vec![],
            },
            expected: Stmt::NewObject {
                ty: TypeDescriptor::named(crate::registry::CORE_LIBRARY, "System.InvalidOperationException"),
                address: 9,
            },
        };
        let resolved = TestResolver::new(&reg).resolve(&test).unwrap();
        assert!(matches!(
            resolved.expected,
            Expected::Exception { ty, .. } if ty == reg.well_known().invalid_operation
        ));
    }

    #[test]
    fn test_typed_constant_becomes_enum_only_at_underlying_width() {
        let reg = registry();
        let mut resolver = TestResolver::new(&reg);
        let shade = Some(TypeDescriptor::named("T", "T.Shade"));
        let narrow = resolver
            .evaluate(&Stmt::UInt8 { value: 2, ty: shade.clone() })
            .unwrap();
        assert!(matches!(narrow, Value::Enum { bits: 2, .. }));

        let wide = resolver.evaluate(&Stmt::Int32 { value: 300, ty: shade });
        assert!(matches!(
            wide,
            Err(ResolveError::Registry(RegistryError::TypeMismatch { .. }))
        ));
    }
}
