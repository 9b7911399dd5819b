//! Replay Type System
//!
//! Serializable descriptors, the runtime type model, and the byte layout
//! algorithm shared by the value codec.

#![warn(missing_docs)]

pub mod descriptor;
pub mod error;
pub mod layout;
pub mod ty;

pub use descriptor::{FieldDescriptor, MethodDescriptor, TypeDescriptor, TypeKey};
pub use error::LayoutError;
pub use layout::{compute_layout, FieldLayout, Layout, TypeSource};
pub use ty::{FieldDef, FieldType, PrimitiveKind, TypeDef, TypeId, TypeKind, POINTER_SIZE};
