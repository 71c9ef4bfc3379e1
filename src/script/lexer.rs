//! Tokenizer for desugared expressions.
//!
//! Input is the output of [`desugar`](crate::markup::desugar), so keyword operators (`to`, `eq`, `and`, ...)
//! have already become punctuation. Only `typeof`, `true`, `false`, `null` and `undefined` remain as words.

use crate::error::EvalError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Number(f64),
    Str(String),
    /// Raw backquoted template text, without the backquotes.
    Template(String),
    Ident(String),
    Punct(&'static str),
    Eof,
}

// Longest first, so that `===` wins over `==` and `=`.
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "...", "==", "!=", "<=", ">=", "&&", "||", "+=", "-=", "*=", "/=", "%=", "??", "(", ")", "[", "]",
    "{", "}", ",", ";", ".", "?", ":", "+", "-", "*", "/", "%", "!", "<", ">", "=",
];

pub(crate) fn tokenize(code: &str) -> Result<Vec<Tok>, EvalError> {
    let mut toks = Vec::new();
    let bytes = code.as_bytes();
    let mut pos = 0;

    'outer: while pos < code.len() {
        let rest = &code[pos..];
        let Some(ch) = rest.chars().next() else { break };

        if ch.is_whitespace() {
            pos += ch.len_utf8();
            continue;
        }

        if ch.is_ascii_digit() || (ch == '.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)) {
            let m = regex!(r"^(?:0[xX][0-9a-fA-F]+|0[bB][01]+|0[oO][0-7]+|(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?)")
                .find(rest)
                .ok_or_else(|| EvalError::Syntax(format!("invalid number at {pos}")))?;
            let value = crate::value::parse_number(m.as_str())
                .ok_or_else(|| EvalError::Syntax(format!("invalid number \"{}\"", m.as_str())))?;
            toks.push(Tok::Number(value));
            pos += m.end();
            continue;
        }

        if ch == '"' || ch == '\'' {
            let (text, len) = read_string(rest, ch)?;
            toks.push(Tok::Str(text));
            pos += len;
            continue;
        }

        if ch == '`' {
            let end = find_template_end(rest).ok_or_else(|| EvalError::Syntax("unterminated template literal".into()))?;
            toks.push(Tok::Template(rest[1..end].to_string()));
            pos += end + 1;
            continue;
        }

        if ch == '$' || ch == '_' || ch.is_alphabetic() {
            let len = rest.find(|c: char| !(c == '$' || c == '_' || c.is_alphanumeric())).unwrap_or(rest.len());
            toks.push(Tok::Ident(rest[..len].to_string()));
            pos += len;
            continue;
        }

        for punct in PUNCTUATORS {
            if rest.starts_with(punct) {
                toks.push(Tok::Punct(punct));
                pos += punct.len();
                continue 'outer;
            }
        }

        return Err(EvalError::Syntax(format!("unexpected character '{ch}'")));
    }

    toks.push(Tok::Eof);
    Ok(toks)
}

/// Reads a quoted string starting at `src[0]`; returns the unescaped text and the consumed length.
fn read_string(src: &str, quote: char) -> Result<(String, usize), EvalError> {
    let mut out = String::new();
    let mut chars = src.char_indices().skip(1);

    while let Some((idx, ch)) = chars.next() {
        match ch {
            c if c == quote => return Ok((out, idx + 1)),
            '\\' => match chars.next() {
                Some((_, esc)) => out.push_str(&unescape_char(esc, &mut chars)),
                None => break,
            },
            '\n' => break,
            c => out.push(c),
        }
    }

    Err(EvalError::Syntax("unterminated string literal".into()))
}

fn unescape_char(esc: char, rest: &mut impl Iterator<Item = (usize, char)>) -> String {
    match esc {
        'n' => "\n".into(),
        't' => "\t".into(),
        'r' => "\r".into(),
        '0' => "\0".into(),
        'u' => {
            let hex: String = rest.take(4).map(|(_, c)| c).collect();
            u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32).map(String::from).unwrap_or(hex)
        }
        other => other.to_string(),
    }
}

/// Byte offset of the closing backquote of a template starting at `src[0]`.
fn find_template_end(src: &str) -> Option<usize> {
    let mut escaped = false;
    for (idx, ch) in src.char_indices().skip(1) {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '`' => return Some(idx),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_desugared_assignment() {
        let toks = tokenize("State.variables.gold += 10").unwrap();
        assert_eq!(
            toks,
            vec![
                Tok::Ident("State".into()),
                Tok::Punct("."),
                Tok::Ident("variables".into()),
                Tok::Punct("."),
                Tok::Ident("gold".into()),
                Tok::Punct("+="),
                Tok::Number(10.0),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn strings_resolve_escapes() {
        let toks = tokenize(r#""a\"b" 'c\nd'"#).unwrap();
        assert_eq!(toks[0], Tok::Str("a\"b".into()));
        assert_eq!(toks[1], Tok::Str("c\nd".into()));
    }

    #[test]
    fn strict_operators_win_over_loose_ones() {
        let toks = tokenize("a !== b").unwrap();
        assert_eq!(toks[1], Tok::Punct("!=="));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(tokenize("'abc").is_err());
    }
}
