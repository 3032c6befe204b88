//! Intermediate low-level form produced by a backend.

use luma_syntax::Block;
use serde::{Deserialize, Serialize};

/// A compiled function prototype.
///
/// The main chunk of a program is a vararg prototype with no parameters. The
/// body keeps the checked tree; nested functions stay inline as `Function`
/// nodes and become prototypes of their own when the runtime closes over them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proto {
    /// Diagnostic chunk name, e.g. `@script.lua` or `=(source)`.
    pub source: String,
    pub params: Vec<String>,
    pub is_vararg: bool,
    pub body: Block,
}

impl Proto {
    /// The main prototype of a chunk.
    pub fn main(source: impl Into<String>, body: Block) -> Self {
        Self {
            source: source.into(),
            params: Vec::new(),
            is_vararg: true,
            body,
        }
    }
}
