//! Literal-decoding helpers backing the external lexer: escape-sequence
//! resolution for string literals and numeric literal parsing.

use crate::error::RiposteError;
use crate::value::Value;

/// Resolve the escape sequences of a quoted string literal's body.
/// Recognized: \a \b \f \n \r \t \v \\ \" \' \<space> \<newline>, one to
/// three octal digits, \x with one or two hex digits, and \u with one to
/// four hex digits. Anything else is a compile error.
pub fn unescape(s: &str) -> Result<String, RiposteError> {
    if !s.contains('\\') {
        return Ok(s.to_string());
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(esc) = chars.next() else {
            return Err(RiposteError::compile(format!(
                "trailing backslash in \"{s}\""
            )));
        };
        match esc {
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0C'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\x0B'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            ' ' => out.push(' '),
            '\n' => out.push('\n'),
            'x' => {
                let code = take_digits(&mut chars, 2, 16);
                if code.is_empty() {
                    return Err(RiposteError::compile(format!(
                        "unrecognized hex escape in \"{s}\""
                    )));
                }
                let n = u32::from_str_radix(&code, 16).expect("validated hex digits");
                out.push(char_from(n, s)?);
            }
            'u' => {
                let code = take_digits(&mut chars, 4, 16);
                if code.is_empty() {
                    return Err(RiposteError::compile(format!(
                        "unrecognized multibyte escape in \"{s}\""
                    )));
                }
                let n = u32::from_str_radix(&code, 16).expect("validated hex digits");
                out.push(char_from(n, s)?);
            }
            '0'..='7' => {
                let mut code = String::from(esc);
                code.push_str(&take_digits(&mut chars, 2, 8));
                let n = u32::from_str_radix(&code, 8).expect("validated octal digits");
                out.push(char_from(n, s)?);
            }
            other => {
                return Err(RiposteError::compile(format!(
                    "unrecognized escape '\\{other}' in \"{s}\""
                )));
            }
        }
    }
    Ok(out)
}

fn take_digits(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    max: usize,
    radix: u32,
) -> String {
    let mut out = String::new();
    while out.len() < max {
        match chars.peek() {
            Some(c) if c.is_digit(radix) => out.push(chars.next().unwrap()),
            _ => break,
        }
    }
    out
}

fn char_from(n: u32, literal: &str) -> Result<char, RiposteError> {
    char::from_u32(n).ok_or_else(|| {
        RiposteError::compile(format!("escape out of range in \"{literal}\""))
    })
}

/// Parse a numeric literal: decimal with optional exponent, 0x-prefixed
/// hex, and a trailing `L` integer suffix. A trailing `i` (complex) is
/// rejected as unsupported.
pub fn parse_number(s: &str) -> Result<Value, RiposteError> {
    if let Some(body) = s.strip_suffix('i') {
        if !body.is_empty() {
            return Err(RiposteError::compile(format!(
                "complex literal '{s}' is not supported"
            )));
        }
    }
    let (body, integer) = match s.strip_suffix('L') {
        Some(body) => (body, true),
        None => (s, false),
    };

    let parsed: Option<f64> = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok().map(|n| n as f64)
    } else {
        body.parse::<f64>().ok()
    };
    let Some(d) = parsed else {
        return Err(RiposteError::compile(format!("malformed number '{s}'")));
    };

    if integer {
        if d.fract() != 0.0 {
            return Err(RiposteError::compile(format!(
                "integer literal '{s}' has a fractional part"
            )));
        }
        Ok(Value::integer(d as i64))
    } else {
        Ok(Value::double(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_string_passthrough() {
        assert_eq!(unescape("hello").unwrap(), "hello");
    }

    #[test]
    fn test_simple_escapes() {
        assert_eq!(unescape("a\\nb\\tc").unwrap(), "a\nb\tc");
        assert_eq!(unescape("\\\"quoted\\\"").unwrap(), "\"quoted\"");
        assert_eq!(unescape("back\\\\slash").unwrap(), "back\\slash");
    }

    #[test]
    fn test_numeric_escapes() {
        assert_eq!(unescape("\\x41").unwrap(), "A");
        assert_eq!(unescape("\\101").unwrap(), "A");
        assert_eq!(unescape("\\u03b1").unwrap(), "α");
        assert_eq!(unescape("\\x4!").unwrap(), "\x04!");
    }

    #[test]
    fn test_unknown_escape_is_compile_error() {
        assert!(matches!(
            unescape("\\q"),
            Err(RiposteError::Compile(_))
        ));
        assert!(unescape("\\xZZ").is_err());
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse_number("1.5").unwrap(), Value::double(1.5));
        assert_eq!(parse_number("1e3").unwrap(), Value::double(1000.0));
        assert_eq!(parse_number("3L").unwrap(), Value::integer(3));
        assert_eq!(parse_number("0x1F").unwrap(), Value::double(31.0));
        assert_eq!(parse_number("0x10L").unwrap(), Value::integer(16));
        assert!(parse_number("2i").is_err());
        assert!(parse_number("abc").is_err());
    }
}
