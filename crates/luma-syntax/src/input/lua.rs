//! Lua reader built on the baseline tokenizer and parser.

use crate::lexer::lex;
use crate::parser::parse;
use crate::traits::{ReadError, Reader};
use crate::tree::Block;

/// Static instance of the Lua reader.
pub static LUA_READER: LuaReader = LuaReader;

/// Lua 5.2 reader.
pub struct LuaReader;

impl Reader for LuaReader {
    fn language(&self) -> &'static str {
        "lua"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["lua"]
    }

    fn read(&self, source: &str) -> Result<Block, ReadError> {
        read_lua(source)
    }
}

/// Parse Lua source into a block.
pub fn read_lua(source: &str) -> Result<Block, ReadError> {
    let tokens = lex(source)?;
    parse(&tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Tag;

    #[test]
    fn test_read_simple_chunk() {
        let block = read_lua("local x = 1\nprint(x)").unwrap();
        assert_eq!(block.len(), 2);
        assert_eq!(block[0].tag(), Some(&Tag::Local));
        assert_eq!(block[1].tag(), Some(&Tag::Call));
    }

    #[test]
    fn test_reader_trait() {
        assert_eq!(LUA_READER.language(), "lua");
        assert_eq!(LUA_READER.extensions(), &["lua"]);
        assert!(LUA_READER.read("return").is_ok());
    }

    #[test]
    fn test_lex_errors_propagate() {
        let err = read_lua("x = \"open").unwrap_err();
        assert!(matches!(err, ReadError::Lex { line: 1, .. }));
    }

    #[test]
    fn test_empty_source() {
        assert!(read_lua("").unwrap().is_empty());
        assert!(read_lua("-- only a comment\n").unwrap().is_empty());
    }
}
