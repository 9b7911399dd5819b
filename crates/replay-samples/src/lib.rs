//! Replay Samples
//!
//! A small module under test, registered natively: arithmetic with
//! exceptions and coverage probes, a linked list, a generic struct, an enum,
//! overloads, and a class with fields the comparer skips.

#![warn(missing_docs)]

mod methods;
mod types;

pub use types::SampleTypes;

use replay_engine::{RegistryBuilder, RegistryError, TypeRegistry};

/// Module (assembly) name of the samples
pub const SAMPLES_MODULE: &str = "Samples";

/// Register the sample module into `builder`
pub fn register(builder: &mut RegistryBuilder) -> Result<SampleTypes, RegistryError> {
    let mut module = builder.module(SAMPLES_MODULE);
    let types = types::declare(&mut module)?;
    methods::define(&mut module, &types);
    Ok(types)
}

/// Registry holding the core library and the sample module
pub fn registry() -> Result<TypeRegistry, RegistryError> {
    let mut builder = TypeRegistry::builder();
    register(&mut builder)?;
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_types::{MethodDescriptor, TypeDescriptor};

    fn math() -> TypeDescriptor {
        TypeDescriptor::named(SAMPLES_MODULE, "Samples.Math")
    }

    #[test]
    fn test_registry_builds() {
        let registry = registry().unwrap();
        assert!(registry.module_names().contains(&SAMPLES_MODULE));
        let sum = registry.resolve_method(&MethodDescriptor::new(math(), "Sum")).unwrap();
        assert_eq!(sum.signature, "(System.Int32[])");
        assert_eq!(sum.expected_coverage, Some(3));
    }

    #[test]
    fn test_overloads_pinned_by_signature() {
        let registry = registry().unwrap();
        let first = registry.resolve_method(&MethodDescriptor::new(math(), "Max")).unwrap();
        let long = registry
            .resolve_method(&MethodDescriptor::new(math(), "Max").with_signature("(System.Int64, System.Int64)"))
            .unwrap();
        assert_eq!(first.signature, "(System.Int32, System.Int32)");
        assert_ne!(first.token, long.token);
    }

    #[test]
    fn test_generic_pair_instantiation_is_shared() {
        let mut builder = TypeRegistry::builder();
        let types = register(&mut builder).unwrap();
        let registry = builder.build();
        let desc = TypeDescriptor::named(SAMPLES_MODULE, "Samples.Pair`2").with_args(vec![
            TypeDescriptor::named("System.Private.CoreLib", "System.Int32"),
            TypeDescriptor::named("System.Private.CoreLib", "System.Int64"),
        ]);
        assert_eq!(registry.resolve_type(&desc).unwrap(), types.int_long_pair);
    }

    #[test]
    fn test_validation_exception_is_exception() {
        let mut builder = TypeRegistry::builder();
        let types = register(&mut builder).unwrap();
        let registry = builder.build();
        assert!(registry.is_exception(types.validation_exception));
        assert!(!registry.is_exception(types.counter));
    }
}
