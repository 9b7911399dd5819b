//! Callable methods
//!
//! Method bodies are native closures registered by the module that owns the
//! declaring type. They receive the invocation context, the receiver for
//! instance methods, and the already-coerced arguments.

use super::builder::Draft;
use crate::invoke::{CallContext, Thrown};
use crate::value::Value;
use replay_types::TypeId;
use std::fmt;
use std::sync::Arc;

/// Native method body
pub type MethodBody =
    Arc<dyn Fn(&mut CallContext<'_>, Option<&Value>, &[Value]) -> Result<Value, Thrown> + Send + Sync>;

/// Name used for instance constructors
pub const CTOR_NAME: &str = ".ctor";

/// Method definition
#[derive(Clone)]
pub struct MethodDef {
    /// Simple name (`.ctor` for constructors)
    pub name: String,
    /// `Type.Name`, used in stack traces and reports
    pub full_name: String,
    /// Metadata token
    pub token: u32,
    /// Declaring type (generic definition for methods of generic types)
    pub declaring: TypeId,
    /// Overload signature, `(System.Int32, System.Int32)` unless set explicitly
    pub signature: String,
    /// Parameter types, receiver excluded
    pub params: Vec<TypeId>,
    /// Return type
    pub ret: TypeId,
    /// Static methods take no receiver
    pub is_static: bool,
    /// Instance constructor
    pub is_ctor: bool,
    /// Expected number of distinct coverage probes hit across a test batch
    pub expected_coverage: Option<usize>,
    pub(crate) body: MethodBody,
}

impl MethodDef {
    /// Run the body without frame bookkeeping; use [`CallContext::invoke`]
    pub(crate) fn call(
        &self,
        ctx: &mut CallContext<'_>,
        receiver: Option<&Value>,
        args: &[Value],
    ) -> Result<Value, Thrown> {
        (self.body)(ctx, receiver, args)
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("full_name", &self.full_name)
            .field("signature", &self.signature)
            .field("token", &format_args!("{:#010x}", self.token))
            .field("is_static", &self.is_static)
            .field("is_ctor", &self.is_ctor)
            .finish()
    }
}

impl fmt::Display for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.full_name, self.signature)
    }
}

/// Fluent method declaration, finished by [`MethodBuilder::body`]
pub struct MethodBuilder<'m> {
    draft: &'m mut Draft,
    def: PendingMethod,
}

pub(crate) struct PendingMethod {
    pub(crate) name: String,
    pub(crate) module: String,
    pub(crate) declaring: TypeId,
    pub(crate) signature: Option<String>,
    pub(crate) params: Vec<TypeId>,
    pub(crate) ret: TypeId,
    pub(crate) is_static: bool,
    pub(crate) is_ctor: bool,
    pub(crate) expected_coverage: Option<usize>,
}

impl<'m> MethodBuilder<'m> {
    pub(crate) fn new(draft: &'m mut Draft, def: PendingMethod) -> Self {
        Self { draft, def }
    }

    /// Append a parameter
    pub fn param(mut self, ty: TypeId) -> Self {
        self.def.params.push(ty);
        self
    }

    /// Set the return type (void by default)
    pub fn returns(mut self, ty: TypeId) -> Self {
        self.def.ret = ty;
        self
    }

    /// Make this an instance method
    pub fn instance(mut self) -> Self {
        self.def.is_static = false;
        self
    }

    /// Override the derived overload signature
    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.def.signature = Some(signature.into());
        self
    }

    /// Declare how many distinct coverage probes a full batch should hit
    pub fn expected_coverage(mut self, probes: usize) -> Self {
        self.def.expected_coverage = Some(probes);
        self
    }

    /// Attach the body and register the method, returning its token
    pub fn body<F>(self, f: F) -> u32
    where
        F: Fn(&mut CallContext<'_>, Option<&Value>, &[Value]) -> Result<Value, Thrown> + Send + Sync + 'static,
    {
        self.draft.push_method(self.def, Arc::new(f))
    }
}
