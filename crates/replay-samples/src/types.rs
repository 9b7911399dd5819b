//! Sample type declarations

use replay_engine::{ModuleBuilder, RegistryError};
use replay_types::{PrimitiveKind, TypeId};

/// Ids of the sample module's types
#[derive(Debug, Clone)]
pub struct SampleTypes {
    /// `Samples.Math`, static helpers
    pub math: TypeId,
    /// `Samples.Node`, singly linked list cell
    pub node: TypeId,
    /// `Samples.Point`, two-int struct
    pub point: TypeId,
    /// `Samples.Pair`2` generic struct definition
    pub pair: TypeId,
    /// `Samples.Pair`2[System.Int32,System.Int64]`
    pub int_long_pair: TypeId,
    /// `Samples.Color`, byte-backed enum
    pub color: TypeId,
    /// `Samples.Callback` delegate
    pub callback: TypeId,
    /// `Samples.Counter`, class with a delegate and a thread-id field
    pub counter: TypeId,
    /// `Samples.ValidationException`
    pub validation_exception: TypeId,
    /// `System.Int32[]`
    pub int_array: TypeId,
    /// `System.Nullable`1[System.Int32]`
    pub nullable_int: TypeId,
}

pub(crate) fn declare(module: &mut ModuleBuilder<'_>) -> Result<SampleTypes, RegistryError> {
    let int = module.primitive(PrimitiveKind::I32);
    let long = module.primitive(PrimitiveKind::I64);
    let object = module.well_known().object;
    let string = module.well_known().string;
    let argument = module.well_known().argument;

    let math = module.class("Samples.Math", Some(object));
    let node = module.class("Samples.Node", Some(object));
    let point = module.struct_type("Samples.Point");
    let pair = module.generic_struct("Samples.Pair`2", 2);
    let color = module.enum_type("Samples.Color", PrimitiveKind::U8);
    let callback = module.delegate("Samples.Callback");
    let counter = module.class("Samples.Counter", Some(object));
    let validation_exception = module.class("Samples.ValidationException", Some(argument));

    module.field(node, "value", int);
    module.field(node, "next", node);

    module.field(point, "x", int);
    module.field(point, "y", int);

    module.generic_field(pair, "first", 0);
    module.generic_field(pair, "second", 1);

    module.field(counter, "count", int);
    module.field(counter, "label", string);
    module.field(counter, "onChange", callback);
    module.field(counter, "managedThreadId", int);
    module.static_field(counter, "instances", int);

    module.field(validation_exception, "parameter", string);

    // Instantiations snapshot the definition's fields, so they come last
    let int_long_pair = module.instantiate(pair, &[int, long])?;
    let int_array = module.array_of(int, 1)?;
    let nullable_int = module.nullable_of(int)?;

    Ok(SampleTypes {
        math,
        node,
        point,
        pair,
        int_long_pair,
        color,
        callback,
        counter,
        validation_exception,
        int_array,
        nullable_int,
    })
}
