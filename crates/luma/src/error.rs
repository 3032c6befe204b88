//! Errors raised by conversions.

use crate::backend::BackendError;
use crate::bytecode::LoadError;
use crate::stage::Stage;
use crate::vm::RuntimeError;
use luma_syntax::{MissingCapture, NoBranchMatched, ReadError, RenderError};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The destination stage does not come after the source stage.
    #[error("cannot convert from {from} to {to}: {to} does not come after {from}")]
    StageOrder { from: Stage, to: Stage },

    /// The payload is not at the stage a converter expects.
    #[error("{converter} expects a {expected} payload, found {found}")]
    ShapeMismatch {
        converter: String,
        expected: Stage,
        found: Stage,
    },

    #[error("cannot read {path:?}: {source}")]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backend unavailable: {reason}")]
    BackendUnavailable { reason: String },

    #[error(transparent)]
    NoBranchMatched(#[from] NoBranchMatched),

    #[error(transparent)]
    MissingCapture(#[from] MissingCapture),

    /// A pipeline was built with a gap in the stage chain.
    #[error("no converter registered from {from} to {to}")]
    MissingConverter { from: Stage, to: Stage },

    /// An atomic converter skips or reverses stages.
    #[error("{converter} is not an adjacent-stage converter ({from} to {to})")]
    NonAdjacent {
        converter: String,
        from: Stage,
        to: Stage,
    },

    #[error("unknown conversion `{0}`")]
    UnknownConversion(String),

    #[error("syntax error in {name}: {source}")]
    Syntax {
        name: String,
        #[source]
        source: ReadError,
    },

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl From<RenderError> for Error {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::NoBranchMatched(err) => Error::NoBranchMatched(err),
            RenderError::MissingCapture(err) => Error::MissingCapture(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
