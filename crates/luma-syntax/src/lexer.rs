//! Tokenizer for plain Lua 5.2 source.

use crate::traits::ReadError;
use crate::tree::Span;
use std::fmt;

/// Token kinds. Literal tokens carry their decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Number(f64),
    Str(String),

    // Keywords
    And,
    Break,
    Do,
    Else,
    Elseif,
    End,
    False,
    For,
    Function,
    Goto,
    If,
    In,
    Local,
    Nil,
    Not,
    Or,
    Repeat,
    Return,
    Then,
    True,
    Until,
    While,

    // Operators and punctuation
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Hash,
    EqEq,
    NotEq,
    LtEq,
    GtEq,
    Lt,
    Gt,
    Assign,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    DoubleColon,
    Semicolon,
    Colon,
    Comma,
    Dot,
    Concat,
    Ellipsis,

    Eof,
}

impl TokenKind {
    pub fn from_keyword(word: &str) -> Option<Self> {
        let kind = match word {
            "and" => TokenKind::And,
            "break" => TokenKind::Break,
            "do" => TokenKind::Do,
            "else" => TokenKind::Else,
            "elseif" => TokenKind::Elseif,
            "end" => TokenKind::End,
            "false" => TokenKind::False,
            "for" => TokenKind::For,
            "function" => TokenKind::Function,
            "goto" => TokenKind::Goto,
            "if" => TokenKind::If,
            "in" => TokenKind::In,
            "local" => TokenKind::Local,
            "nil" => TokenKind::Nil,
            "not" => TokenKind::Not,
            "or" => TokenKind::Or,
            "repeat" => TokenKind::Repeat,
            "return" => TokenKind::Return,
            "then" => TokenKind::Then,
            "true" => TokenKind::True,
            "until" => TokenKind::Until,
            "while" => TokenKind::While,
            _ => return None,
        };
        Some(kind)
    }

    /// Fixed spelling of keyword and punctuation tokens.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Name(_) => "<name>",
            TokenKind::Number(_) => "<number>",
            TokenKind::Str(_) => "<string>",
            TokenKind::And => "and",
            TokenKind::Break => "break",
            TokenKind::Do => "do",
            TokenKind::Else => "else",
            TokenKind::Elseif => "elseif",
            TokenKind::End => "end",
            TokenKind::False => "false",
            TokenKind::For => "for",
            TokenKind::Function => "function",
            TokenKind::Goto => "goto",
            TokenKind::If => "if",
            TokenKind::In => "in",
            TokenKind::Local => "local",
            TokenKind::Nil => "nil",
            TokenKind::Not => "not",
            TokenKind::Or => "or",
            TokenKind::Repeat => "repeat",
            TokenKind::Return => "return",
            TokenKind::Then => "then",
            TokenKind::True => "true",
            TokenKind::Until => "until",
            TokenKind::While => "while",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Caret => "^",
            TokenKind::Hash => "#",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "~=",
            TokenKind::LtEq => "<=",
            TokenKind::GtEq => ">=",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::Assign => "=",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::DoubleColon => "::",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::Concat => "..",
            TokenKind::Ellipsis => "...",
            TokenKind::Eof => "<eof>",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Name(name) => write!(f, "'{name}'"),
            TokenKind::Number(n) => write!(f, "'{}'", crate::literal::format_number(*n)),
            TokenKind::Str(s) => write!(f, "{}", crate::literal::quote_string(s)),
            TokenKind::Eof => f.write_str("<eof>"),
            other => write!(f, "'{}'", other.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Tokens of one source text, always terminated by [`TokenKind::Eof`].
#[derive(Debug, Clone, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            let end = tokens.last().map(|t| t.span).unwrap_or_default();
            tokens.push(Token {
                kind: TokenKind::Eof,
                span: Span::new(end.end, end.end, end.line.max(1)),
            });
        }
        Self { tokens }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Number of tokens, including the trailing `Eof`.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.len() <= 1
    }

    pub fn kinds(&self) -> impl Iterator<Item = &TokenKind> {
        self.tokens.iter().map(|t| &t.kind)
    }
}

/// Tokenize `source`.
pub fn lex(source: &str) -> Result<TokenStream, ReadError> {
    Lexer::new(source).tokenize()
}

struct Lexer<'src> {
    source: &'src [u8],
    pos: usize,
    line: u32,
}

impl<'src> Lexer<'src> {
    fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    fn tokenize(mut self) -> Result<TokenStream, ReadError> {
        let mut tokens = Vec::new();

        // Shebang line
        if self.source.first() == Some(&b'#') {
            while self.peek().is_some_and(|b| b != b'\n') {
                self.pos += 1;
            }
        }

        loop {
            self.skip_trivia()?;
            let start = self.pos;
            let line = self.line;
            let Some(ch) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    span: Span::new(start, start, line),
                });
                break;
            };
            let kind = self.scan(ch)?;
            tokens.push(Token {
                kind,
                span: Span::new(start, self.pos, line),
            });
        }

        Ok(TokenStream { tokens })
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn error(&self, message: impl Into<String>) -> ReadError {
        ReadError::Lex {
            line: self.line,
            message: message.into(),
        }
    }

    fn skip_trivia(&mut self) -> Result<(), ReadError> {
        loop {
            match self.peek() {
                Some(b'\n') => {
                    self.line += 1;
                    self.pos += 1;
                }
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'-') if self.peek_at(1) == Some(b'-') => {
                    self.pos += 2;
                    if let Some(level) = self.long_bracket_level() {
                        self.read_long_bracket(level, "comment")?;
                    } else {
                        while self.peek().is_some_and(|b| b != b'\n') {
                            self.pos += 1;
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// If a long bracket `[==[` opens at the cursor, its level.
    fn long_bracket_level(&self) -> Option<usize> {
        if self.peek() != Some(b'[') {
            return None;
        }
        let mut level = 0;
        while self.peek_at(1 + level) == Some(b'=') {
            level += 1;
        }
        (self.peek_at(1 + level) == Some(b'[')).then_some(level)
    }

    /// Consume a long bracket of `level` starting at the cursor and return its
    /// contents.
    fn read_long_bracket(&mut self, level: usize, what: &str) -> Result<Vec<u8>, ReadError> {
        let open_line = self.line;
        self.pos += level + 2;

        // A newline right after the opening bracket is not part of the contents
        match (self.peek(), self.peek_at(1)) {
            (Some(b'\r'), Some(b'\n')) | (Some(b'\n'), Some(b'\r')) => {
                self.pos += 2;
                self.line += 1;
            }
            (Some(b'\n' | b'\r'), _) => {
                self.pos += 1;
                self.line += 1;
            }
            _ => {}
        }

        let mut contents = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(ReadError::Lex {
                        line: open_line,
                        message: format!("unfinished long {what}"),
                    });
                }
                Some(b']') if self.closes_long_bracket(level) => {
                    self.pos += level + 2;
                    return Ok(contents);
                }
                Some(b) => {
                    if b == b'\n' {
                        self.line += 1;
                    }
                    contents.push(b);
                    self.pos += 1;
                }
            }
        }
    }

    fn closes_long_bracket(&self, level: usize) -> bool {
        (1..=level).all(|i| self.peek_at(i) == Some(b'=')) && self.peek_at(level + 1) == Some(b']')
    }

    fn scan(&mut self, ch: u8) -> Result<TokenKind, ReadError> {
        if ch.is_ascii_alphabetic() || ch == b'_' {
            return Ok(self.scan_name());
        }
        if ch.is_ascii_digit() || (ch == b'.' && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()))
        {
            return self.scan_number();
        }

        let two = self.peek_at(1);
        let (kind, width) = match ch {
            b'"' | b'\'' => return self.scan_short_string(ch),
            b'[' => match self.long_bracket_level() {
                Some(level) => {
                    let bytes = self.read_long_bracket(level, "string")?;
                    return self.decode_string(bytes).map(TokenKind::Str);
                }
                None => (TokenKind::LBracket, 1),
            },
            b'.' if two == Some(b'.') && self.peek_at(2) == Some(b'.') => (TokenKind::Ellipsis, 3),
            b'.' if two == Some(b'.') => (TokenKind::Concat, 2),
            b'.' => (TokenKind::Dot, 1),
            b'=' if two == Some(b'=') => (TokenKind::EqEq, 2),
            b'=' => (TokenKind::Assign, 1),
            b'<' if two == Some(b'=') => (TokenKind::LtEq, 2),
            b'<' => (TokenKind::Lt, 1),
            b'>' if two == Some(b'=') => (TokenKind::GtEq, 2),
            b'>' => (TokenKind::Gt, 1),
            b'~' if two == Some(b'=') => (TokenKind::NotEq, 2),
            b':' if two == Some(b':') => (TokenKind::DoubleColon, 2),
            b':' => (TokenKind::Colon, 1),
            b'+' => (TokenKind::Plus, 1),
            b'-' => (TokenKind::Minus, 1),
            b'*' => (TokenKind::Star, 1),
            b'/' => (TokenKind::Slash, 1),
            b'%' => (TokenKind::Percent, 1),
            b'^' => (TokenKind::Caret, 1),
            b'#' => (TokenKind::Hash, 1),
            b'(' => (TokenKind::LParen, 1),
            b')' => (TokenKind::RParen, 1),
            b'{' => (TokenKind::LBrace, 1),
            b'}' => (TokenKind::RBrace, 1),
            b']' => (TokenKind::RBracket, 1),
            b';' => (TokenKind::Semicolon, 1),
            b',' => (TokenKind::Comma, 1),
            other => {
                let shown = if other.is_ascii_graphic() {
                    format!("'{}'", other as char)
                } else {
                    format!("byte 0x{other:02x}")
                };
                return Err(self.error(format!("unexpected symbol {shown}")));
            }
        };
        self.pos += width;
        Ok(kind)
    }

    fn scan_name(&mut self) -> TokenKind {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.pos += 1;
        }
        // Only ASCII bytes were consumed
        let word = String::from_utf8_lossy(&self.source[start..self.pos]);
        TokenKind::from_keyword(&word).unwrap_or_else(|| TokenKind::Name(word.into_owned()))
    }

    fn scan_number(&mut self) -> Result<TokenKind, ReadError> {
        let start = self.pos;
        let value = if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.pos += 2;
            self.scan_hex_number()?
        } else {
            self.scan_decimal_number(start)?
        };
        if self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.')
        {
            while self
                .peek()
                .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.')
            {
                self.pos += 1;
            }
            let text = String::from_utf8_lossy(&self.source[start..self.pos]);
            return Err(self.error(format!("malformed number near '{text}'")));
        }
        Ok(TokenKind::Number(value))
    }

    fn scan_decimal_number(&mut self, start: usize) -> Result<f64, ReadError> {
        self.skip_digits(|b| b.is_ascii_digit());
        if self.peek() == Some(b'.') {
            self.pos += 1;
            self.skip_digits(|b| b.is_ascii_digit());
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            self.skip_digits(|b| b.is_ascii_digit());
        }
        let text = String::from_utf8_lossy(&self.source[start..self.pos]);
        text.parse::<f64>()
            .map_err(|_| self.error(format!("malformed number near '{text}'")))
    }

    fn scan_hex_number(&mut self) -> Result<f64, ReadError> {
        let mut mantissa = 0.0f64;
        let mut exponent: i32 = 0;
        let mut any_digit = false;

        while let Some(d) = self.peek().and_then(hex_value) {
            mantissa = mantissa * 16.0 + f64::from(d);
            any_digit = true;
            self.pos += 1;
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            while let Some(d) = self.peek().and_then(hex_value) {
                mantissa = mantissa * 16.0 + f64::from(d);
                exponent -= 4;
                any_digit = true;
                self.pos += 1;
            }
        }
        if !any_digit {
            return Err(self.error("malformed number near '0x'"));
        }
        if matches!(self.peek(), Some(b'p' | b'P')) {
            self.pos += 1;
            let negative = match self.peek() {
                Some(b'-') => {
                    self.pos += 1;
                    true
                }
                Some(b'+') => {
                    self.pos += 1;
                    false
                }
                _ => false,
            };
            let digits_start = self.pos;
            let mut value: i32 = 0;
            while let Some(b) = self.peek().filter(u8::is_ascii_digit) {
                value = value.saturating_mul(10).saturating_add(i32::from(b - b'0'));
                self.pos += 1;
            }
            if self.pos == digits_start {
                return Err(self.error("malformed number: missing exponent digits"));
            }
            exponent = exponent.saturating_add(if negative { -value } else { value });
        }
        Ok(mantissa * 2f64.powi(exponent))
    }

    fn skip_digits(&mut self, accept: impl Fn(u8) -> bool) {
        while self.peek().is_some_and(&accept) {
            self.pos += 1;
        }
    }

    fn scan_short_string(&mut self, delimiter: u8) -> Result<TokenKind, ReadError> {
        self.pos += 1;
        let mut bytes = Vec::new();
        loop {
            match self.peek() {
                None | Some(b'\n') | Some(b'\r') => return Err(self.error("unfinished string")),
                Some(b) if b == delimiter => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    self.scan_escape(&mut bytes)?;
                }
                Some(b) => {
                    bytes.push(b);
                    self.pos += 1;
                }
            }
        }
        self.decode_string(bytes).map(TokenKind::Str)
    }

    fn scan_escape(&mut self, bytes: &mut Vec<u8>) -> Result<(), ReadError> {
        let Some(b) = self.peek() else {
            return Err(self.error("unfinished string"));
        };
        self.pos += 1;
        let byte = match b {
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0b,
            b'\\' => b'\\',
            b'"' => b'"',
            b'\'' => b'\'',
            b'\n' | b'\r' => {
                // Escaped line break; `\r\n` and `\n\r` count as one
                if matches!((b, self.peek()), (b'\n', Some(b'\r')) | (b'\r', Some(b'\n'))) {
                    self.pos += 1;
                }
                self.line += 1;
                b'\n'
            }
            b'x' => {
                let hi = self.peek().and_then(hex_value);
                let lo = self.peek_at(1).and_then(hex_value);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        self.pos += 2;
                        hi * 16 + lo
                    }
                    _ => return Err(self.error("hexadecimal digit expected in escape")),
                }
            }
            b'z' => {
                while let Some(w) = self.peek().filter(u8::is_ascii_whitespace) {
                    if w == b'\n' {
                        self.line += 1;
                    }
                    self.pos += 1;
                }
                return Ok(());
            }
            b'0'..=b'9' => {
                let mut value = u32::from(b - b'0');
                for _ in 0..2 {
                    match self.peek().filter(u8::is_ascii_digit) {
                        Some(d) => {
                            value = value * 10 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        None => break,
                    }
                }
                u8::try_from(value).map_err(|_| self.error("decimal escape too large"))?
            }
            other => {
                return Err(self.error(format!(
                    "invalid escape sequence '\\{}'",
                    other.escape_ascii()
                )));
            }
        };
        bytes.push(byte);
        Ok(())
    }

    fn decode_string(&self, bytes: Vec<u8>) -> Result<String, ReadError> {
        String::from_utf8(bytes).map_err(|_| self.error("string literal is not valid UTF-8"))
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).unwrap().kinds().cloned().collect()
    }

    #[test]
    fn test_keywords_and_names() {
        assert_eq!(
            kinds("local x = nil"),
            vec![
                TokenKind::Local,
                TokenKind::Name("x".into()),
                TokenKind::Assign,
                TokenKind::Nil,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators_longest_match() {
        assert_eq!(
            kinds("a ~= b .. c ... :: <= >= == ="),
            vec![
                TokenKind::Name("a".into()),
                TokenKind::NotEq,
                TokenKind::Name("b".into()),
                TokenKind::Concat,
                TokenKind::Name("c".into()),
                TokenKind::Ellipsis,
                TokenKind::DoubleColon,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::EqEq,
                TokenKind::Assign,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("3 3.0 3.1416 314.16e-2 0.31416E1 0xff 0x0.1E 0xA23p-4 .5"),
            vec![
                TokenKind::Number(3.0),
                TokenKind::Number(3.0),
                TokenKind::Number(3.1416),
                TokenKind::Number(3.1416),
                TokenKind::Number(3.1416),
                TokenKind::Number(255.0),
                TokenKind::Number(0.1171875),
                TokenKind::Number(162.1875),
                TokenKind::Number(0.5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_malformed_number() {
        let err = lex("x = 3abc").unwrap_err();
        assert!(err.to_string().contains("malformed number"));
    }

    #[test]
    fn test_short_string_escapes() {
        assert_eq!(
            kinds(r#""a\tb\n" 'it\'s' "\65\066\x43" "x\z
                   y""#),
            vec![
                TokenKind::Str("a\tb\n".into()),
                TokenKind::Str("it's".into()),
                TokenKind::Str("ABC".into()),
                TokenKind::Str("xy".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_long_strings() {
        assert_eq!(
            kinds("[[\nfirst\nsecond]] [==[a]]b]==]"),
            vec![
                TokenKind::Str("first\nsecond".into()),
                TokenKind::Str("a]]b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let stream = lex("-- line\nx --[[ long\ncomment ]] y --[==[ ]] ]==]").unwrap();
        let kinds: Vec<_> = stream.kinds().cloned().collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Name("x".into()),
                TokenKind::Name("y".into()),
                TokenKind::Eof,
            ]
        );
        assert_eq!(stream.tokens()[0].span.line, 2);
        assert_eq!(stream.tokens()[1].span.line, 3);
    }

    #[test]
    fn test_shebang_is_skipped() {
        assert_eq!(
            kinds("#!/usr/bin/env lua\nreturn"),
            vec![TokenKind::Return, TokenKind::Eof]
        );
    }

    #[test]
    fn test_unfinished_string() {
        let err = lex("x = 'abc\ny'").unwrap_err();
        assert_eq!(
            err,
            ReadError::Lex {
                line: 1,
                message: "unfinished string".into()
            }
        );
    }

    #[test]
    fn test_unfinished_long_comment_reports_opening_line() {
        let err = lex("\n--[[ never\nclosed").unwrap_err();
        assert_eq!(
            err,
            ReadError::Lex {
                line: 2,
                message: "unfinished long comment".into()
            }
        );
    }

    #[test]
    fn test_invalid_utf8_string() {
        let err = lex(r#"s = "\255""#).unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn test_unexpected_symbol() {
        let err = lex("a = b ! c").unwrap_err();
        assert!(err.to_string().contains("unexpected symbol '!'"));
    }

    #[test]
    fn test_spans() {
        let stream = lex("ab  cd").unwrap();
        assert_eq!(stream.tokens()[1].span, Span::new(4, 6, 1));
        assert_eq!(stream.len(), 3);
        assert!(!stream.is_empty());
        assert!(lex("  -- nothing").unwrap().is_empty());
    }
}
