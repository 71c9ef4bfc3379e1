//! Runtime values.
//!
//! [`Value`] is what macro arguments coerce into, what the variable store holds and what the evaluator
//! produces. Conversions follow the loose, script-like rules story authors expect: `"" == 0`, `"3" * 2 == 6`,
//! empty strings are falsy, and so on.

use std::fmt;

/// Link descriptor produced from `[[...]]` macro arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkArg {
    /// Passage title or URL.
    pub link: String,
    /// Link text (equal to `link` when the markup had no separate text component).
    pub text: String,
    /// Number of components the markup carried (1 = link only, 2 = text and link).
    pub count: u8,
    /// Whether `link` points outside the story.
    pub external: bool,
    /// Desugared setter code, if the markup had a `][setter]` component.
    pub setter: Option<String>,
}

/// Image descriptor produced from `[img[...]]` macro arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageArg {
    pub source: String,
    pub title: Option<String>,
    pub align: Option<Align>,
    /// Source text when `source` named a passage tagged as an image.
    pub passage: Option<String>,
    pub link: Option<String>,
    pub external: bool,
    pub setter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

impl Align {
    pub fn as_str(self) -> &'static str {
        match self {
            Align::Left => "left",
            Align::Right => "right",
        }
    }
}

/// A dynamically typed value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Link(Box<LinkArg>),
    Image(Box<ImageArg>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Truthiness as used by conditionals.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Link(_) | Value::Image(_) => true,
        }
    }

    /// Name reported by the `typeof` operator.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Null | Value::Link(_) | Value::Image(_) => "object",
        }
    }

    /// Numeric conversion; `NaN` when the value has no numeric reading.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::Str(s) => {
                if s.trim().is_empty() {
                    0.0
                } else {
                    parse_number(s).unwrap_or(f64::NAN)
                }
            }
            Value::Link(_) | Value::Image(_) => f64::NAN,
        }
    }

    /// Returns the string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Str(s) => f.write_str(s),
            Value::Link(link) => f.write_str(&link.text),
            Value::Image(image) => f.write_str(&image.source),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Formats a number the way script output does: integers without a fraction, `NaN`, `Infinity`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Parses a numeric literal with script `Number()` rules.
///
/// Accepts surrounding whitespace, decimal and exponent forms, a leading sign, `Infinity`, and `0x`/`0o`/`0b`
/// prefixed integers. Returns `None` for anything else, including the empty string.
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (sign, unsigned) = match s.as_bytes()[0] {
        b'-' => (-1.0, &s[1..]),
        b'+' => (1.0, &s[1..]),
        _ => (1.0, s),
    };

    if unsigned == "Infinity" {
        return Some(sign * f64::INFINITY);
    }

    let radix = match unsigned.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        // Prefixed forms never take a sign.
        if unsigned.len() != s.len() {
            return None;
        }
        let digits = &unsigned[2..];
        if digits.is_empty() {
            return None;
        }
        // Folded as f64 so wide literals lose precision instead of overflowing.
        return digits
            .chars()
            .try_fold(0.0_f64, |acc, c| c.to_digit(radix).map(|d| acc * f64::from(radix) + f64::from(d)));
    }

    if !regex!(r"^(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?$").is_match(unsigned) {
        return None;
    }
    unsigned.parse::<f64>().ok().map(|n| sign * n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_number_follows_script_rules() {
        let cases: Vec<(&str, Option<f64>)> = vec![
            ("42", Some(42.0)),
            (" 42 ", Some(42.0)),
            ("-1.5", Some(-1.5)),
            (".5", Some(0.5)),
            ("5.", Some(5.0)),
            ("1e3", Some(1000.0)),
            ("0x1F", Some(31.0)),
            ("0b101", Some(5.0)),
            ("-Infinity", Some(f64::NEG_INFINITY)),
            ("", None),
            ("12px", None),
            ("-0x1", None),
            ("abc", None),
            ("1.2.3", None),
            ("0x+1", None),
            ("0x", None),
            ("0b102", None),
            ("0xFFFFFFFFFFFFFFFFFF", Some(4.722366482869645e21)),
        ];

        for (input, expected) in cases {
            assert_eq!(parse_number(input), expected, "input {input:?}");
        }
    }

    #[test]
    fn truthiness_and_display() {
        assert!(!Value::str("").is_truthy());
        assert!(Value::str("0").is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(0.25).to_string(), "0.25");
        assert_eq!(Value::Number(-0.0).to_string(), "0");
        assert_eq!(Value::Null.type_name(), "object");
    }

    #[test]
    fn to_number_conversions() {
        assert_eq!(Value::str(" 7 ").to_number(), 7.0);
        assert_eq!(Value::str("").to_number(), 0.0);
        assert!(Value::str("seven").to_number().is_nan());
        assert_eq!(Value::Bool(true).to_number(), 1.0);
        assert!(Value::Undefined.to_number().is_nan());
    }
}
