//! The fixed stage vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A representation a program can be held in, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Path of a source file.
    Srcfile,
    /// Source text.
    Src,
    /// Token stream.
    Lexstream,
    /// Syntax tree.
    Ast,
    /// Intermediate low-level form. Backend only.
    Proto,
    /// Binary dump. Backend only.
    Bytecode,
    /// Executable value.
    Function,
}

impl Stage {
    /// Every stage, in order.
    pub const ALL: [Stage; 7] = [
        Stage::Srcfile,
        Stage::Src,
        Stage::Lexstream,
        Stage::Ast,
        Stage::Proto,
        Stage::Bytecode,
        Stage::Function,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Srcfile => "srcfile",
            Stage::Src => "src",
            Stage::Lexstream => "lexstream",
            Stage::Ast => "ast",
            Stage::Proto => "proto",
            Stage::Bytecode => "bytecode",
            Stage::Function => "function",
        }
    }

    /// Position in the stage order.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The stage right after this one, if any.
    pub fn next(self) -> Option<Stage> {
        Stage::ALL.get(self.index() + 1).copied()
    }

    /// Whether reaching this stage from the previous one needs the backend.
    pub fn is_backend_gated(self) -> bool {
        matches!(self, Stage::Proto | Stage::Bytecode)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown stage name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage `{0}`")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

/// Name of the conversion between two stages, e.g. `src_to_ast`.
pub fn conversion_name(from: Stage, to: Stage) -> String {
    format!("{from}_to_{to}")
}
