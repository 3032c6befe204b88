//! Traits for source readers and writers.

use crate::pattern::{MissingCapture, NoBranchMatched};
use crate::tree::Block;

/// Error that can occur when reading source text into a tree.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReadError {
    #[error("line {line}: {message}")]
    Lex { line: u32, message: String },

    #[error("line {line}: {message}")]
    Parse { line: u32, message: String },

    #[error("unsupported syntax: {0}")]
    Unsupported(String),
}

impl ReadError {
    /// Line the error was reported at, if known.
    pub fn line(&self) -> Option<u32> {
        match self {
            ReadError::Lex { line, .. } | ReadError::Parse { line, .. } => Some(*line),
            ReadError::Unsupported(_) => None,
        }
    }
}

/// Error that can occur when rendering a tree back to text.
///
/// Both variants indicate a defect in a rendering rule table, never a
/// property of the input tree: trees the rules cannot express fall back to the
/// debug form instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    NoBranchMatched(#[from] NoBranchMatched),

    #[error(transparent)]
    MissingCapture(#[from] MissingCapture),
}

/// A reader parses source text into a tree.
pub trait Reader: Send + Sync {
    /// Language identifier (e.g., "lua").
    fn language(&self) -> &'static str;

    /// File extensions this reader handles.
    fn extensions(&self) -> &'static [&'static str];

    /// Parse source text into a block.
    fn read(&self, source: &str) -> Result<Block, ReadError>;
}

/// A writer renders a tree as source text.
pub trait Writer: Send + Sync {
    /// Language identifier (e.g., "lua").
    fn language(&self) -> &'static str;

    /// File extension for output (e.g., "lua").
    fn extension(&self) -> &'static str;

    /// Render a block as source text.
    fn write(&self, block: &Block) -> Result<String, RenderError>;
}
