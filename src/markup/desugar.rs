//! Keyword and sigil desugaring.
//!
//! Story authors write expressions like `$gold gte 10 and not _done`. Before evaluation the code is rewritten
//! into general expression syntax:
//!
//! ```text
//! $gold gte 10 and not _done
//! State.variables.gold >= 10 && ! State.temporary.done
//! ```
//!
//! The pass is a single left-to-right scan over one alternation. Quoted strings and operator runs are
//! skipped untouched; only barewords are candidates for replacement. Backquoted template runs are rewritten
//! inside their `${...}` groups only, one level deep.

/// Rewrites keyword operators and variable sigils in `code`.
pub fn desugar(code: &str) -> String {
    desugar_with(code, true)
}

fn replacement(token: &str) -> Option<&'static str> {
    Some(match token {
        "$" => "State.variables.",
        "_" => "State.temporary.",
        "to" => "=",
        "eq" => "==",
        "neq" => "!=",
        "is" => "===",
        "isnot" => "!==",
        "gt" => ">",
        "gte" => ">=",
        "lt" => "<",
        "lte" => "<=",
        "and" => "&&",
        "or" => "||",
        "not" => "!",
        "def" => "\"undefined\" !== typeof",
        "ndef" => "\"undefined\" === typeof",
        _ => return None,
    })
}

fn desugar_with(code: &str, templates: bool) -> String {
    // 1 = empty quotes, 2 = double quoted, 3 = single quoted, 4 = template, 5 = operators, 6 = spread,
    // 7 = bareword
    let re = regex!(
        r#"(""|''|``)|("(?:\\.|[^"\\])+")|('(?:\\.|[^'\\])+')|(`(?:\\.|[^`\\])+`)|([=+\-*/%<>&|^~!?:,;()\[\]{}]+)|(\.\.\.)|([^"'`=+\-*/%<>&|^~!?:,;()\[\]{}\s]+)"#
    );

    let mut out = String::with_capacity(code.len());
    let mut copied = 0;
    let mut pos = 0;

    while let Some(caps) = re.captures_at(code, pos) {
        let Some(whole) = caps.get(0) else { break };
        pos = whole.end();

        if let Some(template) = caps.get(4) {
            if templates {
                out.push_str(&code[copied..template.start()]);
                out.push_str(&desugar_template(template.as_str()));
                copied = template.end();
            }
            continue;
        }

        let Some(word) = caps.get(7) else { continue };
        let mut token = word.as_str();
        let mut token_end = word.end();

        if token == "$" || token == "_" {
            continue;
        } else if super::patterns::VARIABLE_PREFIX.is_match(token) {
            // Only the sigil is replaced; the rest of the bareword stays.
            token = &token[..1];
            token_end = word.start() + 1;
        } else if token == "is" {
            if let Some(not) = regex!(r"^\s+not\b").find(&code[pos..]) {
                token = "isnot";
                token_end = pos + not.end();
                pos = token_end;
            }
        }

        if let Some(rep) = replacement(token) {
            out.push_str(&code[copied..word.start()]);
            out.push_str(rep);
            copied = token_end;
        }
    }

    out.push_str(&code[copied..]);
    out
}

/// Desugars the contents of every `${...}` group of a backquoted run (backquotes included).
fn desugar_template(template: &str) -> String {
    let bytes = template.as_bytes();
    let mut out = String::with_capacity(template.len());
    let mut copied = 0;
    let mut i = 0;

    while i + 1 < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] != b'$' || bytes[i + 1] != b'{' {
            i += 1;
            continue;
        }

        let open = i + 2;
        let mut depth = 1;
        let mut j = open;
        while j < bytes.len() {
            match bytes[j] {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            j += 1;
        }
        if depth != 0 {
            // Unbalanced group: leave the remainder for the evaluator to reject.
            break;
        }

        out.push_str(&template[copied..open]);
        out.push_str(&desugar_with(&template[open..j], false));
        copied = j;
        i = j + 1;
    }

    out.push_str(&template[copied..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_and_sigils() {
        let cases: Vec<(&str, &str)> = vec![
            ("$gold to 5", "State.variables.gold = 5"),
            ("_i lt 3", "State.temporary.i < 3"),
            ("$a eq $b", "State.variables.a == State.variables.b"),
            ("$a neq 1 or not $b", "State.variables.a != 1 || ! State.variables.b"),
            ("$a is 1 and $b gte 2", "State.variables.a === 1 && State.variables.b >= 2"),
            ("def $key", "\"undefined\" !== typeof State.variables.key"),
            ("ndef _t", "\"undefined\" === typeof State.temporary.t"),
            ("$a isnot $b", "State.variables.a !== State.variables.b"),
            ("$inv.length gt 0", "State.variables.inv.length > 0"),
        ];

        for (input, expected) in cases {
            assert_eq!(desugar(input), expected, "input {input:?}");
        }
    }

    #[test]
    fn is_not_merges_into_isnot() {
        assert_eq!(desugar("$a is not $b"), "State.variables.a !== State.variables.b");
        assert_eq!(desugar("$a is notable"), "State.variables.a === notable");
    }

    #[test]
    fn quoted_strings_are_untouched() {
        assert_eq!(desugar(r#""to be or not to be""#), r#""to be or not to be""#);
        assert_eq!(desugar(r#"$x to 'and $y'"#), r#"State.variables.x = 'and $y'"#);
        assert_eq!(desugar(r#""" to ''"#), r#""" = ''"#);
    }

    #[test]
    fn bare_sigils_are_left_alone() {
        assert_eq!(desugar("$ to _"), "$ = _");
    }

    #[test]
    fn spread_is_not_a_bareword() {
        assert_eq!(desugar("...$args"), "...State.variables.args");
    }

    #[test]
    fn template_interpolations_are_desugared_one_level() {
        assert_eq!(desugar("`Gold: ${$gold}`"), "`Gold: ${State.variables.gold}`");
        assert_eq!(desugar("`${ $a is 1 }` to $b"), "`${ State.variables.a === 1 }` = State.variables.b");
        // Text outside interpolation groups is not code.
        assert_eq!(desugar("`$gold and more`"), "`$gold and more`");
        assert_eq!(desugar(r"`\${$gold}`"), r"`\${$gold}`");
    }

    #[test]
    fn idempotent_on_already_desugared_code() {
        for input in ["$x to $y + 1", "_i lt 10 and def $k", "`n=${$n}`"] {
            let once = desugar(input);
            assert_eq!(desugar(&once), once, "input {input:?}");
        }
    }
}
