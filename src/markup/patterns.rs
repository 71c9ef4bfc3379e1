//! Shared pattern fragments.
//!
//! Fragments are plain strings so grammar rules can splice them into larger patterns. None of them contain
//! capturing groups, which keeps them safe to use inside a profile's combined alternation.

use once_cell::sync::Lazy;
use regex::Regex;

/// Whitespace other than line terminators.
pub const SPACE_NO_TERMINATOR: &str = r"[\x20\f\t\v\u{00a0}\u{1680}\u{180e}\u{2000}-\u{200a}\u{202f}\u{205f}\u{3000}\u{feff}]";

/// Letters accepted in inline CSS names, class names and ids.
pub const ANY_LETTER: &str = r"[0-9A-Z_a-z\-\u{00c0}-\u{00d6}\u{00d8}-\u{00f6}\u{00f8}-\u{00ff}\u{0150}\u{0170}\u{0151}\u{0171}]";

pub const IDENTIFIER: &str = r"[$A-Z_a-z][$0-9A-Z_a-z]*";

/// A sigiled story or temporary variable: `$gold`, `_i`.
pub const VARIABLE: &str = r"[$_][$A-Z_a-z][$0-9A-Z_a-z]*";

pub const MACRO_NAME: &str = r"[A-Za-z][\w-]*|[=-]";

pub const HTML_TAG_NAME: &str = r"[A-Za-z][0-9A-Za-z]*(?:-[0-9A-Za-z._-]*)?";

pub const URL: &str = r#"(?:file|https?|mailto|ftp|javascript|irc|news|data):[^\s'"]+"#;

/// `style(value):` | `style:value;` | `#id.class;`
pub static INLINE_CSS: Lazy<Regex> = Lazy::new(|| {
    let tw_style = format!(r"({ANY_LETTER}+)\(([^\)\|\n]+)\):");
    let css_style = format!(r"{SPACE_NO_TERMINATOR}*({ANY_LETTER}+){SPACE_NO_TERMINATOR}*:([^;\|\n]+);");
    let id_or_class = format!(r"{SPACE_NO_TERMINATOR}*((?:[#.]{ANY_LETTER}+{SPACE_NO_TERMINATOR}*)+);");
    Regex::new(&format!("^(?:{tw_style}|{css_style}|{id_or_class})")).unwrap()
});

/// Matches a whole string that starts with a variable reference (`$gold`, `$gold.count`).
pub static VARIABLE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(&format!("^{VARIABLE}")).unwrap());

pub static MACRO_NAME_EXACT: Lazy<Regex> = Lazy::new(|| Regex::new(&format!("^(?:{MACRO_NAME})$")).unwrap());

pub static URL_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(&format!("(?i)^{URL}")).unwrap());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_have_no_capture_groups() {
        for fragment in [SPACE_NO_TERMINATOR, ANY_LETTER, IDENTIFIER, VARIABLE, MACRO_NAME, HTML_TAG_NAME, URL] {
            let re = Regex::new(fragment).unwrap();
            assert_eq!(re.captures_len(), 1, "fragment {fragment}");
        }
    }

    #[test]
    fn macro_names() {
        for ok in ["if", "else-if", "a_b", "=", "-"] {
            assert!(MACRO_NAME_EXACT.is_match(ok), "{ok}");
        }
        for bad in ["1x", "", "=x", "$x", "a b"] {
            assert!(!MACRO_NAME_EXACT.is_match(bad), "{bad}");
        }
    }

    #[test]
    fn inline_css_forms() {
        let caps = INLINE_CSS.captures("color:red;text").unwrap();
        assert_eq!(&caps[3], "color");
        assert_eq!(&caps[4], "red");

        let caps = INLINE_CSS.captures("#hero.big;").unwrap();
        assert_eq!(&caps[5], "#hero.big");
    }
}
