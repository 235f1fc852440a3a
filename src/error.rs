//! Error types for model construction and weight loading.
//!
//! All fallible paths in this crate are setup-time paths: building a
//! layer chain, parsing a model document, copying weights into a layer.
//! The streaming `forward` entry points never return errors.

use thiserror::Error;

/// Errors produced while assembling a model or loading weights into it.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A weight array does not match the dimensions the layer declared.
    #[error("{layer}: {what} has wrong shape (expected {expected}, found {found})")]
    ShapeMismatch {
        layer: &'static str,
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// Adjacent layers disagree about the width of the frame between them.
    #[error("layer \"{layer}\" expects {found} inputs but the previous layer produces {expected}")]
    ChainMismatch {
        layer: &'static str,
        expected: usize,
        found: usize,
    },

    /// The model document names a layer type this engine does not know.
    #[error("unknown layer type \"{0}\"")]
    UnknownLayerType(String),

    /// The model document names an activation this engine does not know.
    #[error("unknown activation \"{0}\"")]
    UnknownActivation(String),

    /// A required field is absent from a layer descriptor.
    #[error("layer descriptor is missing field \"{0}\"")]
    MissingField(&'static str),

    /// A weights payload is not the nested numeric array the layer expects.
    #[error("malformed weights payload: {0}")]
    BadWeights(String),

    /// Channel grouping that does not evenly divide the channel counts.
    #[error("groups ({groups}) must evenly divide input ({in_size}) and output ({out_size}) channels")]
    BadGrouping {
        groups: usize,
        in_size: usize,
        out_size: usize,
    },

    /// The document parsed but describes no layers.
    #[error("model document contains no layers")]
    EmptyModel,

    /// The document is not valid JSON for the expected schema.
    #[error("model document is not valid: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the loading paths.
pub type Result<V> = std::result::Result<V, ModelError>;
