//! Textual forms of names, strings and numbers.

use std::fmt::Write;

/// Reserved words of the surface language.
pub const KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in",
    "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

/// Whether `name` can be written as a plain identifier.
pub fn is_ident(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !is_keyword(name)
}

/// Double-quoted string literal that reads back to exactly `value`.
pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => {
                // `\0` followed by a digit would read as a longer decimal escape
                if chars.peek().is_some_and(|d| d.is_ascii_digit()) {
                    out.push_str("\\000");
                } else {
                    out.push_str("\\0");
                }
            }
            c if c.is_ascii_control() => {
                let _ = write!(out, "\\{:03}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Largest magnitude below which integral values print without a fraction.
const EXACT_INTEGER_LIMIT: f64 = 9_007_199_254_740_992.0; // 2^53

/// Deterministic, round-trip-safe number text.
///
/// - integral values with magnitude below 2^53 print as integers (`42`, `-7`);
/// - other finite values print the shortest decimal that reads back to the
///   same `f64`, in positional form inside `[1e-4, 1e16)` and exponent form
///   (`1.5e-7`, `1e300`) outside it;
/// - infinities print as `1e999` / `-1e999` and NaN as `(0/0)`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "(0/0)".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "1e999" } else { "-1e999" }.to_string();
    }
    if n.fract() == 0.0 && n.abs() < EXACT_INTEGER_LIMIT {
        if n == 0.0 && n.is_sign_negative() {
            return "-0".to_string();
        }
        return format!("{}", n as i64);
    }
    let magnitude = n.abs();
    if (1e-4..1e16).contains(&magnitude) {
        format!("{n}")
    } else {
        format!("{n:e}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_ident() {
        assert!(is_ident("x"));
        assert!(is_ident("_private1"));
        assert!(!is_ident("1x"));
        assert!(!is_ident("a b"));
        assert!(!is_ident(""));
        assert!(!is_ident("end"));
        assert!(!is_ident("café"));
    }

    #[test]
    fn test_quote_string_escapes() {
        assert_eq!(quote_string("plain"), "\"plain\"");
        assert_eq!(quote_string("a\"b"), "\"a\\\"b\"");
        assert_eq!(quote_string("line\nbreak"), "\"line\\nbreak\"");
        assert_eq!(quote_string("back\\slash"), "\"back\\\\slash\"");
        assert_eq!(quote_string("\u{1}"), "\"\\001\"");
        assert_eq!(quote_string("\u{0}7"), "\"\\0007\"");
    }

    #[test]
    fn test_format_integers() {
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-7.0), "-7");
        assert_eq!(format_number(1e15), "1000000000000000");
    }

    #[test]
    fn test_format_fractions() {
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(0.1), "0.1");
        assert_eq!(format_number(3.25), "3.25");
    }

    #[test]
    fn test_format_exponents() {
        assert_eq!(format_number(1.5e-7), "1.5e-7");
        assert_eq!(format_number(1e300), "1e300");
    }

    #[test]
    fn test_format_specials() {
        assert_eq!(format_number(f64::INFINITY), "1e999");
        assert_eq!(format_number(f64::NEG_INFINITY), "-1e999");
        assert_eq!(format_number(f64::NAN), "(0/0)");
    }

    #[test]
    fn test_format_round_trips() {
        for n in [0.1, 2.5e-5, 123456.789, 1e20, 6.02214076e23, 9007199254740993.0] {
            let text = format_number(n);
            assert_eq!(text.parse::<f64>().unwrap(), n, "{text}");
        }
    }
}
