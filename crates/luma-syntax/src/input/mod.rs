//! Input readers - parse source text into trees.

#[cfg(feature = "read-lua")]
pub mod lua;

#[cfg(feature = "read-lua")]
pub use lua::{LUA_READER, LuaReader, read_lua};
