//! QG-007: Generation error taxonomy.
//!
//! Every variant is fatal to one schema's generation only. Whether a failure
//! stops a batch is decided by [`FailurePolicy`](super::types::FailurePolicy).

use crate::render::RenderError;
use std::path::PathBuf;
use thiserror::Error;

/// Convenient result type for the compilation pipeline.
pub type GenResult<T> = Result<T, GenerationError>;

/// Any failure that aborts one schema's generation.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    /// Renderer failure, surfaced unchanged. Nothing is written.
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A reference that does not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("schema '{schema}': operation '{operation}' not found in catalog")]
    UnknownOperation { schema: String, operation: String },

    #[error("schema '{schema}': output type is missing")]
    MissingOutputType { schema: String },

    #[error("schema '{schema}': output type '{type_name}' not found in catalog")]
    UnknownOutputType { schema: String, type_name: String },

    #[error("schema '{schema}': '{operation}' shares parameter '{path}' before any group binds it")]
    UnboundSharedParam {
        schema: String,
        operation: String,
        path: String,
    },

    #[error("schema '{schema}': '{operation}' shares '{path}' but '{root}' has no field '{field}'")]
    UnknownSharedField {
        schema: String,
        operation: String,
        path: String,
        root: String,
        field: String,
    },
}

/// A type or naming shape the plan cannot be built around.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("schema '{schema}': output type '{type_name}' is not a composite type")]
    NotComposite { schema: String, type_name: String },

    #[error("schema '{schema}': output type '{type_name}' is wrapped in indirection twice")]
    DoubleIndirection { schema: String, type_name: String },

    #[error("schema '{schema}': operation '{operation}' has an unanalyzable signature: {reason}")]
    UnanalyzableOperation {
        schema: String,
        operation: String,
        reason: String,
    },

    #[error("schema '{schema}': parameter '{field}' bound as {existing} and {incoming}")]
    ConflictingParam {
        schema: String,
        field: String,
        existing: String,
        incoming: String,
    },

    #[error("schema '{schema}': result name '{name}' of '{operation}' is already taken")]
    ResultNameConflict {
        schema: String,
        operation: String,
        name: String,
    },

    #[error("schema '{schema}': parameter name '{name}' of '{operation}' is reserved in generated code")]
    ReservedParamName {
        schema: String,
        operation: String,
        name: String,
    },

    #[error("schema '{schema}': invalid shared parameter path '{path}'")]
    InvalidParamPath { schema: String, path: String },
}
