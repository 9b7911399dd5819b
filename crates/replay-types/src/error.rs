//! Type layout errors

use thiserror::Error;

/// Errors that can occur while computing the byte layout of a type
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LayoutError {
    /// Type id not present in the type source
    #[error("Unknown type id: {0}")]
    UnknownType(u32),

    /// Open generic definition (or unsubstituted parameter) has no layout
    #[error("Open generic type has no layout: {name}")]
    OpenGeneric {
        /// Type name
        name: String,
    },

    /// Type that never occupies storage (e.g. void)
    #[error("Type has no byte layout: {name}")]
    NoLayout {
        /// Type name
        name: String,
    },

    /// A value type that contains itself
    #[error("Circular value type layout detected: {cycle}")]
    CircularLayout {
        /// Description of the cycle
        cycle: String,
    },
}
