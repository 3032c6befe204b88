//! Runtime values and tables.

use super::interp::{Runtime, Scope};
use super::RuntimeError;
use crate::proto::Proto;
use luma_syntax::{Token, TokenKind, lex};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub type TableRef = Rc<RefCell<Table>>;

/// Signature of a builtin function.
pub type NativeFn = fn(&mut Runtime<'_>, Vec<Value>) -> Result<Vec<Value>, RuntimeError>;

/// A runtime value. Tables and functions have reference semantics.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Table(TableRef),
    Function(Rc<Callable>),
}

/// Something that can be called.
pub enum Callable {
    Closure(Closure),
    Native(Native),
}

/// A Lua function closed over its defining scope.
pub struct Closure {
    pub(crate) proto: Rc<Proto>,
    pub(crate) env: Rc<Scope>,
}

/// A builtin.
pub struct Native {
    pub name: &'static str,
    pub(crate) func: NativeFn,
}

impl Value {
    pub fn str(value: &str) -> Self {
        Value::Str(Rc::from(value))
    }

    pub fn table(table: Table) -> Self {
        Value::Table(Rc::new(RefCell::new(table)))
    }

    pub(crate) fn native(name: &'static str, func: NativeFn) -> Self {
        Value::Function(Rc::new(Callable::Native(Native { name, func })))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Only `nil` and `false` are false.
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Numeric value, converting numeric strings.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Str(s) => str_to_number(s),
            _ => None,
        }
    }

    /// String value for concatenation: strings as-is, numbers formatted.
    pub fn to_text(&self) -> Option<Rc<str>> {
        match self {
            Value::Str(s) => Some(Rc::clone(s)),
            Value::Number(n) => Some(Rc::from(number_to_string(*n))),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Primitive equality: numbers and strings by value, everything else by
    /// identity.
    pub fn raw_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.raw_equal(other)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::str(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Rc::from(value))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&number_to_string(*n)),
            Value::Str(s) => f.write_str(s),
            Value::Table(t) => write!(f, "table: {:p}", Rc::as_ptr(t)),
            Value::Function(c) => match c.as_ref() {
                Callable::Native(native) => write!(f, "builtin: {}", native.name),
                Callable::Closure(_) => write!(f, "function: {:p}", Rc::as_ptr(c)),
            },
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            other => fmt::Display::fmt(other, f),
        }
    }
}

/// `%.14g` formatting, as Lua prints numbers.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let sci = format!("{n:.13e}");
    let Some((mantissa, exponent)) = sci.split_once('e') else {
        return sci;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return sci;
    };
    if !(-4..14).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{sign}{:02}",
            trim_fraction(mantissa),
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (13 - exponent) as usize;
        trim_fraction(&format!("{n:.decimals$}")).to_string()
    }
}

fn trim_fraction(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}

/// Parse a numeric string the way the tokenizer reads numerals, with an
/// optional sign and surrounding whitespace.
pub fn str_to_number(text: &str) -> Option<f64> {
    let text = text.trim();
    let stream = lex(text).ok()?;
    match stream.tokens() {
        [
            Token {
                kind: TokenKind::Number(n),
                span,
            },
            _,
        ] if span.start == 0 && span.end == text.len() => Some(*n),
        [
            sign,
            Token {
                kind: TokenKind::Number(n),
                span,
            },
            _,
        ] if sign.span.start == 0 && sign.span.end == span.start && span.end == text.len() => {
            match sign.kind {
                TokenKind::Minus => Some(-n),
                TokenKind::Plus => Some(*n),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Hashable identity of a table key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Bool(bool),
    Number(u64),
    Str(Rc<str>),
    Ref(usize),
}

impl Key {
    fn of(value: &Value) -> Result<Key, RuntimeError> {
        Ok(match value {
            Value::Nil => return Err(RuntimeError::new("table index is nil")),
            Value::Bool(b) => Key::Bool(*b),
            Value::Number(n) if n.is_nan() => {
                return Err(RuntimeError::new("table index is NaN"));
            }
            // -0 and 0 are the same key
            Value::Number(n) => Key::Number((n + 0.0).to_bits()),
            Value::Str(s) => Key::Str(Rc::clone(s)),
            Value::Table(t) => Key::Ref(Rc::as_ptr(t) as *const () as usize),
            Value::Function(c) => Key::Ref(Rc::as_ptr(c) as *const () as usize),
        })
    }
}

/// An associative array.
///
/// Entries keep insertion order; assigning `nil` leaves a tombstone so a
/// traversal with [`Table::next`] survives clearing fields. The entry holds
/// the key value, which keeps identity keys alive.
#[derive(Default)]
pub struct Table {
    entries: Vec<(Value, Value)>,
    index: HashMap<Key, usize>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sequence `{ v1, v2, ... }`.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let mut table = Table::new();
        for (i, value) in values.into_iter().enumerate() {
            table.set_int(i + 1, value);
        }
        table
    }

    pub fn get(&self, key: &Value) -> Value {
        match Key::of(key) {
            Ok(key) => self.lookup(&key),
            Err(_) => Value::Nil,
        }
    }

    pub fn get_str(&self, key: &str) -> Value {
        self.lookup(&Key::Str(Rc::from(key)))
    }

    pub fn get_int(&self, i: usize) -> Value {
        self.lookup(&Key::Number((i as f64).to_bits()))
    }

    fn lookup(&self, key: &Key) -> Value {
        self.index
            .get(key)
            .map(|&slot| self.entries[slot].1.clone())
            .unwrap_or_default()
    }

    pub fn set(&mut self, key: Value, value: Value) -> Result<(), RuntimeError> {
        let hashed = Key::of(&key)?;
        let key = match key {
            Value::Number(n) => Value::Number(n + 0.0),
            other => other,
        };
        self.insert(hashed, key, value);
        Ok(())
    }

    pub fn set_str(&mut self, key: &str, value: Value) {
        let key: Rc<str> = Rc::from(key);
        self.insert(Key::Str(Rc::clone(&key)), Value::Str(key), value);
    }

    pub fn set_int(&mut self, i: usize, value: Value) {
        let n = i as f64;
        self.insert(Key::Number(n.to_bits()), Value::Number(n), value);
    }

    fn insert(&mut self, hashed: Key, key: Value, value: Value) {
        match self.index.get(&hashed) {
            Some(&slot) => self.entries[slot].1 = value,
            None if value.is_nil() => {}
            None => {
                self.index.insert(hashed, self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    /// Border: the count of consecutive non-nil integer keys from 1.
    pub fn len(&self) -> usize {
        let mut n = 0;
        while !self.get_int(n + 1).is_nil() {
            n += 1;
        }
        n
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|(_, v)| v.is_nil())
    }

    /// Entry after `key` in traversal order; `nil` starts the traversal.
    pub fn next(&self, key: &Value) -> Result<Option<(Value, Value)>, RuntimeError> {
        let start = match key {
            Value::Nil => 0,
            key => match self.index.get(&Key::of(key)?) {
                Some(&slot) => slot + 1,
                None => return Err(RuntimeError::new("invalid key to 'next'")),
            },
        };
        Ok(self.entries[start..]
            .iter()
            .find(|(_, v)| !v.is_nil())
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_format() {
        assert_eq!(number_to_string(1.0), "1");
        assert_eq!(number_to_string(-7.0), "-7");
        assert_eq!(number_to_string(0.1), "0.1");
        assert_eq!(number_to_string(0.1 + 0.2), "0.3");
        assert_eq!(number_to_string(3.5), "3.5");
        assert_eq!(number_to_string(1e14 - 1.0), "99999999999999");
        assert_eq!(number_to_string(1e15), "1e+15");
        assert_eq!(number_to_string(1e20), "1e+20");
        assert_eq!(number_to_string(2f64.powi(53)), "9.007199254741e+15");
        assert_eq!(number_to_string(1.5e-7), "1.5e-07");
        assert_eq!(number_to_string(0.0001), "0.0001");
        assert_eq!(number_to_string(f64::INFINITY), "inf");
        assert_eq!(number_to_string(-0.0), "-0");
    }

    #[test]
    fn test_str_to_number() {
        assert_eq!(str_to_number("10"), Some(10.0));
        assert_eq!(str_to_number("  0x10  "), Some(16.0));
        assert_eq!(str_to_number("-2.5"), Some(-2.5));
        assert_eq!(str_to_number("1e3"), Some(1000.0));
        assert_eq!(str_to_number(""), None);
        assert_eq!(str_to_number("1 2"), None);
        assert_eq!(str_to_number("- 1"), None);
        assert_eq!(str_to_number("1 -- one"), None);
        assert_eq!(str_to_number("abc"), None);
    }

    #[test]
    fn test_table_keys_normalize() {
        let mut t = Table::new();
        t.set(Value::Number(-0.0), Value::str("zero")).unwrap();
        assert_eq!(t.get(&Value::Number(0.0)), Value::str("zero"));
        t.set(Value::Number(1.0), Value::Bool(true)).unwrap();
        assert_eq!(t.get_int(1), Value::Bool(true));
        assert!(t.set(Value::Nil, Value::Nil).is_err());
        assert!(t.set(Value::Number(f64::NAN), Value::Nil).is_err());
    }

    #[test]
    fn test_table_length_is_border() {
        let t = Table::from_values([1.0, 2.0, 3.0].map(Value::Number));
        assert_eq!(t.len(), 3);
        let mut t = t;
        t.set_int(2, Value::Nil);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_next_skips_tombstones() {
        let mut t = Table::new();
        t.set_str("a", Value::Number(1.0));
        t.set_str("b", Value::Number(2.0));
        t.set_str("c", Value::Number(3.0));
        t.set_str("b", Value::Nil);

        let mut seen = Vec::new();
        let mut key = Value::Nil;
        while let Some((k, _)) = t.next(&key).unwrap() {
            seen.push(k.to_string());
            key = k;
        }
        assert_eq!(seen, ["a", "c"]);
        assert!(t.next(&Value::str("zzz")).is_err());
    }

    #[test]
    fn test_identity_keys() {
        let a = Value::table(Table::new());
        let b = Value::table(Table::new());
        let mut t = Table::new();
        t.set(a.clone(), Value::Number(1.0)).unwrap();
        assert_eq!(t.get(&a), Value::Number(1.0));
        assert_eq!(t.get(&b), Value::Nil);
    }
}
