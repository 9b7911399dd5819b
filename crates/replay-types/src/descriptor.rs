//! Serializable type, method, and field descriptors
//!
//! Descriptors are how a test description names live types and members.
//! A type is identified by its module (assembly identity) plus either a
//! metadata token or a fully-qualified name, plus generic arguments.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key identifying a type inside its module
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeKey {
    /// Stable metadata token
    Token(u32),
    /// Fully-qualified type name
    Name(String),
}

/// Descriptor sufficient to re-resolve a live type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescriptor {
    /// Declaring module identity
    pub asm: String,
    /// Token or name inside the module
    #[serde(flatten)]
    pub key: TypeKey,
    /// Generic arguments (empty for non-generic types)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generic_args: Vec<TypeDescriptor>,
}

impl TypeDescriptor {
    /// Descriptor by fully-qualified name
    pub fn named(asm: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            asm: asm.into(),
            key: TypeKey::Name(name.into()),
            generic_args: Vec::new(),
        }
    }

    /// Descriptor by metadata token
    pub fn token(asm: impl Into<String>, token: u32) -> Self {
        Self {
            asm: asm.into(),
            key: TypeKey::Token(token),
            generic_args: Vec::new(),
        }
    }

    /// Attach generic arguments
    pub fn with_args(mut self, args: Vec<TypeDescriptor>) -> Self {
        self.generic_args = args;
        self
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            TypeKey::Token(token) => write!(f, "{}!{:#010x}", self.asm, token)?,
            TypeKey::Name(name) => write!(f, "{}!{}", self.asm, name)?,
        }
        if !self.generic_args.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.generic_args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

/// Descriptor of a method
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDescriptor {
    /// Declaring type
    pub decl_type: TypeDescriptor,
    /// Method name
    pub name: String,
    /// Signature used to pick an overload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl MethodDescriptor {
    /// Descriptor without a signature (first name match wins)
    pub fn new(decl_type: TypeDescriptor, name: impl Into<String>) -> Self {
        Self {
            decl_type,
            name: name.into(),
            signature: None,
        }
    }

    /// Pin the descriptor to one overload
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.decl_type, self.name)?;
        if let Some(sig) = &self.signature {
            write!(f, "{}", sig)?;
        }
        Ok(())
    }
}

/// Descriptor of an instance field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    /// Declaring type
    pub decl_type: TypeDescriptor,
    /// Field name
    pub name: String,
    /// Declared field type, checked when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<TypeDescriptor>,
}

impl FieldDescriptor {
    /// Descriptor by declaring type and name
    pub fn new(decl_type: TypeDescriptor, name: impl Into<String>) -> Self {
        Self {
            decl_type,
            name: name.into(),
            field_type: None,
        }
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.decl_type, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_json_shape() {
        let desc = TypeDescriptor::token("Samples", 0x0200_0002);
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json, serde_json::json!({ "asm": "Samples", "token": 33554434 }));

        let parsed: TypeDescriptor =
            serde_json::from_str(r#"{ "asm": "Samples", "name": "Samples.Node" }"#).unwrap();
        assert_eq!(parsed, TypeDescriptor::named("Samples", "Samples.Node"));
    }

    #[test]
    fn test_generic_args_parse() {
        let parsed: TypeDescriptor = serde_json::from_str(
            r#"{
                "asm": "Samples",
                "name": "Samples.Pair`2",
                "genericArgs": [
                    { "asm": "System.Private.CoreLib", "name": "System.Int32" },
                    { "asm": "System.Private.CoreLib", "name": "System.Int64" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.generic_args.len(), 2);
        assert_eq!(
            parsed.to_string(),
            "Samples!Samples.Pair`2<System.Private.CoreLib!System.Int32, System.Private.CoreLib!System.Int64>"
        );
    }

    #[test]
    fn test_descriptor_equality_includes_args() {
        let int = TypeDescriptor::named("System.Private.CoreLib", "System.Int32");
        let a = TypeDescriptor::named("Samples", "Samples.Box`1").with_args(vec![int.clone()]);
        let b = TypeDescriptor::named("Samples", "Samples.Box`1");
        assert_ne!(a, b);
        assert_eq!(a, TypeDescriptor::named("Samples", "Samples.Box`1").with_args(vec![int]));
    }

    #[test]
    fn test_method_descriptor_signature_optional() {
        let parsed: MethodDescriptor = serde_json::from_str(
            r#"{ "declType": { "asm": "Samples", "name": "Samples.Math" }, "name": "Sum" }"#,
        )
        .unwrap();
        assert!(parsed.signature.is_none());
        assert_eq!(parsed.to_string(), "Samples!Samples.Math::Sum");
    }
}
