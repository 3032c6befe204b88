//! Output writers - render trees as source text.

#[cfg(feature = "write-lua")]
pub mod lua;

#[cfg(feature = "write-lua")]
pub use lua::{DEFAULT_INDENT, LUA_WRITER, LuaWriter, LuaWriterImpl};
