//! Global builtin functions.

use super::RuntimeError;
use super::interp::Runtime;
use super::value::{Table, TableRef, Value};

type Result<T> = std::result::Result<T, RuntimeError>;

/// Most values a single `unpack` call may return.
const MAX_UNPACK: i64 = 1_000_000;

pub(crate) fn install(globals: &mut Table) {
    globals.set_str("_VERSION", Value::str("Lua 5.2"));
    globals.set_str("print", Value::native("print", print));
    globals.set_str("type", Value::native("type", type_of));
    globals.set_str("tostring", Value::native("tostring", tostring));
    globals.set_str("tonumber", Value::native("tonumber", tonumber));
    globals.set_str("ipairs", Value::native("ipairs", ipairs));
    globals.set_str("pairs", Value::native("pairs", pairs));
    globals.set_str("next", Value::native("next", next));
    globals.set_str("select", Value::native("select", select));
    globals.set_str("error", Value::native("error", error));
    globals.set_str("assert", Value::native("assert", assert));
    globals.set_str("rawequal", Value::native("rawequal", rawequal));
    globals.set_str("rawget", Value::native("rawget", rawget));
    globals.set_str("rawset", Value::native("rawset", rawset));
    globals.set_str("unpack", Value::native("unpack", unpack));
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

fn bad_argument(n: usize, function: &str, problem: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::new(format!("bad argument #{n} to '{function}' ({problem})"))
}

fn check_any(args: &[Value], i: usize, function: &str) -> Result<Value> {
    args.get(i)
        .cloned()
        .ok_or_else(|| bad_argument(i + 1, function, "value expected"))
}

fn check_table(args: &[Value], i: usize, function: &str) -> Result<TableRef> {
    match args.get(i) {
        Some(Value::Table(t)) => Ok(t.clone()),
        other => Err(bad_argument(
            i + 1,
            function,
            format!(
                "table expected, got {}",
                other.map_or("no value", Value::type_name)
            ),
        )),
    }
}

/// Integer argument; `default` when absent or nil.
fn check_int(args: &[Value], i: usize, function: &str, default: Option<i64>) -> Result<i64> {
    match (args.get(i), default) {
        (None | Some(Value::Nil), Some(default)) => Ok(default),
        (Some(value), _) => match value.to_number() {
            Some(n) => Ok(n.floor() as i64),
            None => Err(bad_argument(
                i + 1,
                function,
                format!("number expected, got {}", value.type_name()),
            )),
        },
        (None, None) => Err(bad_argument(i + 1, function, "number expected, got no value")),
    }
}

fn print(rt: &mut Runtime<'_>, args: Vec<Value>) -> Result<Vec<Value>> {
    let line = args
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join("\t");
    rt.write_line(&line)?;
    Ok(Vec::new())
}

fn type_of(_: &mut Runtime<'_>, args: Vec<Value>) -> Result<Vec<Value>> {
    let value = check_any(&args, 0, "type")?;
    Ok(vec![Value::str(value.type_name())])
}

fn tostring(_: &mut Runtime<'_>, args: Vec<Value>) -> Result<Vec<Value>> {
    let value = check_any(&args, 0, "tostring")?;
    Ok(vec![Value::from(value.to_string())])
}

fn tonumber(_: &mut Runtime<'_>, args: Vec<Value>) -> Result<Vec<Value>> {
    let value = check_any(&args, 0, "tonumber")?;
    if matches!(args.get(1), None | Some(Value::Nil)) {
        return Ok(vec![value.to_number().map_or(Value::Nil, Value::Number)]);
    }
    let base = check_int(&args, 1, "tonumber", None)?;
    if !(2..=36).contains(&base) {
        return Err(bad_argument(2, "tonumber", "base out of range"));
    }
    let Some(text) = value.to_text() else {
        return Err(bad_argument(
            1,
            "tonumber",
            format!("string expected, got {}", value.type_name()),
        ));
    };
    Ok(vec![
        parse_in_base(&text, base as u32).map_or(Value::Nil, Value::Number),
    ])
}

fn parse_in_base(text: &str, base: u32) -> Option<f64> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if digits.is_empty() {
        return None;
    }
    let mut n = 0.0;
    for c in digits.chars() {
        n = n * f64::from(base) + f64::from(c.to_digit(base)?);
    }
    Some(if negative { -n } else { n })
}

fn ipairs(_: &mut Runtime<'_>, args: Vec<Value>) -> Result<Vec<Value>> {
    let table = check_table(&args, 0, "ipairs")?;
    Ok(vec![
        Value::native("ipairs_iterator", ipairs_iterator),
        Value::Table(table),
        Value::Number(0.0),
    ])
}

fn ipairs_iterator(_: &mut Runtime<'_>, args: Vec<Value>) -> Result<Vec<Value>> {
    let table = check_table(&args, 0, "ipairs")?;
    let i = check_int(&args, 1, "ipairs", Some(0))? + 1;
    let value = table.borrow().get(&Value::Number(i as f64));
    Ok(if value.is_nil() {
        vec![Value::Nil]
    } else {
        vec![Value::Number(i as f64), value]
    })
}

fn pairs(_: &mut Runtime<'_>, args: Vec<Value>) -> Result<Vec<Value>> {
    let table = check_table(&args, 0, "pairs")?;
    Ok(vec![
        Value::native("next", next),
        Value::Table(table),
        Value::Nil,
    ])
}

fn next(_: &mut Runtime<'_>, args: Vec<Value>) -> Result<Vec<Value>> {
    let table = check_table(&args, 0, "next")?;
    let entry = table.borrow().next(&arg(&args, 1))?;
    Ok(match entry {
        Some((key, value)) => vec![key, value],
        None => vec![Value::Nil],
    })
}

fn select(_: &mut Runtime<'_>, mut args: Vec<Value>) -> Result<Vec<Value>> {
    if matches!(args.first(), Some(Value::Str(s)) if &**s == "#") {
        return Ok(vec![Value::Number((args.len() - 1) as f64)]);
    }
    let n = check_int(&args, 0, "select", None)?;
    let count = args.len() as i64 - 1;
    let start = if n < 0 && n >= -count {
        count + n + 1
    } else if n > 0 {
        n.min(count + 1)
    } else {
        return Err(bad_argument(1, "select", "index out of range"));
    };
    Ok(args.split_off(start as usize))
}

fn error(rt: &mut Runtime<'_>, args: Vec<Value>) -> Result<Vec<Value>> {
    let message = arg(&args, 0);
    let level = check_int(&args, 1, "error", Some(1))?;
    Err(match message {
        Value::Str(text) if level > 0 => RuntimeError::Error(format!("{} {text}", rt.location())),
        other => RuntimeError::Error(other.to_string()),
    })
}

fn assert(_: &mut Runtime<'_>, args: Vec<Value>) -> Result<Vec<Value>> {
    let value = check_any(&args, 0, "assert")?;
    if value.truthy() {
        return Ok(args);
    }
    Err(match args.get(1) {
        Some(message) if !message.is_nil() => RuntimeError::Error(message.to_string()),
        _ => RuntimeError::Error("assertion failed!".to_string()),
    })
}

fn rawequal(_: &mut Runtime<'_>, args: Vec<Value>) -> Result<Vec<Value>> {
    let a = check_any(&args, 0, "rawequal")?;
    let b = check_any(&args, 1, "rawequal")?;
    Ok(vec![Value::Bool(a.raw_equal(&b))])
}

fn rawget(_: &mut Runtime<'_>, args: Vec<Value>) -> Result<Vec<Value>> {
    let table = check_table(&args, 0, "rawget")?;
    let value = table.borrow().get(&arg(&args, 1));
    Ok(vec![value])
}

fn rawset(_: &mut Runtime<'_>, args: Vec<Value>) -> Result<Vec<Value>> {
    let table = check_table(&args, 0, "rawset")?;
    table.borrow_mut().set(arg(&args, 1), arg(&args, 2))?;
    Ok(vec![Value::Table(table)])
}

fn unpack(_: &mut Runtime<'_>, args: Vec<Value>) -> Result<Vec<Value>> {
    let table = check_table(&args, 0, "unpack")?;
    let table = table.borrow();
    let first = check_int(&args, 1, "unpack", Some(1))?;
    let last = check_int(&args, 2, "unpack", Some(table.len() as i64))?;
    if first > last {
        return Ok(Vec::new());
    }
    let count = last
        .checked_sub(first)
        .and_then(|n| n.checked_add(1))
        .filter(|&n| n <= MAX_UNPACK)
        .ok_or_else(|| RuntimeError::new("too many results to unpack"))?;
    Ok((0..count)
        .map(|i| table.get(&Value::Number((first + i) as f64)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_in_base() {
        assert_eq!(parse_in_base("ff", 16), Some(255.0));
        assert_eq!(parse_in_base(" -101 ", 2), Some(-5.0));
        assert_eq!(parse_in_base("zz", 36), Some(1295.0));
        assert_eq!(parse_in_base("8", 8), None);
        assert_eq!(parse_in_base("", 10), None);
    }

    #[test]
    fn test_install_registers_builtins() {
        let mut globals = Table::new();
        install(&mut globals);
        for name in ["print", "type", "pairs", "ipairs", "select", "unpack"] {
            assert_eq!(globals.get_str(name).type_name(), "function", "{name}");
        }
        assert_eq!(globals.get_str("_VERSION"), Value::str("Lua 5.2"));
    }
}
