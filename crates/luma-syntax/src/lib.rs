//! Lua syntax trees and their textual forms.
//!
//! `luma-syntax` holds everything between source text and the tagged tree:
//! the tokenizer, the baseline Lua 5.2 parser, a structural pattern matcher
//! and the writer that turns trees back into idiomatic source.
//!
//! # Architecture
//!
//! ```text
//!  source ──lex──> TokenStream ──parse──> Block (tree.rs)
//!                                           │
//!        <──── LuaWriter (output/lua.rs) ───┘
//!               │
//!               ├─ pattern.rs     sugar recognition
//!               └─ precedence.rs  parenthesization
//! ```
//!
//! # Example
//!
//! ```
//! use luma_syntax::{LuaWriter, read_lua};
//!
//! let block = read_lua("x.y = function(self) return self end").unwrap();
//! let text = LuaWriter::emit(&block).unwrap();
//! assert_eq!(text, "function x:y ()\n   return self\nend");
//! ```
//!
//! Rendering is the inverse of parsing: for any tree the parser produces,
//! reading the rendered text yields a structurally equal tree.

pub mod dump;
pub mod lexer;
pub mod literal;
pub mod parser;
pub mod pattern;
pub mod precedence;
pub mod structure_eq;
pub mod traits;
pub mod tree;

pub mod input;
pub mod output;

// Re-exports: tree types
pub use dump::dump;
pub use structure_eq::StructureEq;
pub use tree::{Block, Node, Span, Tag, Term};

// Re-exports: tokens and parsing
pub use lexer::{Token, TokenKind, TokenStream, lex};
pub use parser::parse;

// Re-exports: patterns
pub use pattern::{
    Alternative, Captures, MissingCapture, NoBranchMatched, Outcome, Pattern, Sub,
    eval_alternatives, matches,
};

// Re-exports: traits
pub use traits::{ReadError, Reader, RenderError, Writer};

// Re-exports: built-in readers
#[cfg(feature = "read-lua")]
pub use input::{LUA_READER, LuaReader, read_lua};

// Re-exports: built-in writers
#[cfg(feature = "write-lua")]
pub use output::LuaWriter;
#[cfg(feature = "write-lua")]
pub use output::lua::LuaWriterImpl;
