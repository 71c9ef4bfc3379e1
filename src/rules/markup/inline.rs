use crate::markup::inline_css;
use crate::markup::patterns::{IDENTIFIER, SPACE_NO_TERMINATOR, VARIABLE};
use crate::{GrammarRule, ProfileSet, Value};

use super::lookahead_at;

/// Rule handing every `<<` to the macro dispatcher.
pub(super) fn macro_call() -> GrammarRule {
    rule! {
        name: "macro",
        pattern: "<<",
        profiles: ProfileSet::CORE,
        handler: |w, _r| { crate::engine::dispatch(w) }
    }
}

/// Rule matching the character-pair formatting spans and `{{{inline code}}}`.
pub(super) fn format_by_char() -> GrammarRule {
    rule! {
        name: "formatByChar",
        pattern: r"''|//|__|\^\^|~~|==|\{\{\{",
        profiles: ProfileSet::CORE,
        lookahead: r"(?s)\{\{\{(.*?)\}\}\}",
        handler: |w, r| {
            let (tag, terminator) = match w.match_text() {
                "''" => ("strong", "''"),
                "//" => ("em", "//"),
                "__" => ("u", "__"),
                "^^" => ("sup", r"\^\^"),
                "~~" => ("sub", "~~"),
                "==" => ("s", "=="),
                _ => {
                    let Some(lookahead) = r.lookahead.as_ref() else { return Ok(()) };
                    if let Some(caps) = lookahead_at(lookahead, w.source(), w.match_start) {
                        let out = w.output();
                        let code = w.doc().create_element(out, "code");
                        w.doc().append_text(code, caps.get(1).map_or("", |m| m.as_str()));
                        w.next_match = caps.get(0).map_or(w.next_match, |m| m.end());
                    }
                    return Ok(());
                }
            };

            let out = w.output();
            let el = w.doc().create_element(out, tag);
            w.sub_wikify(el, Some(terminator), None)
        }
    }
}

/// Rule matching `@@css;text@@` styled spans (or `div`s when the styling is followed by a line break).
pub(super) fn custom_style() -> GrammarRule {
    rule! {
        name: "customStyle",
        pattern: "@@",
        profiles: ProfileSet::CORE,
        terminator: "@@",
        handler: |w, r| {
            let source = w.source();
            let mut pos = w.next_match;
            let css = inline_css(source, &mut pos);
            w.next_match = pos;

            let block = regex!(r"\A\s*\n").find(&source[pos..]);
            let out = w.output();
            let el = w.doc().create_element(out, if block.is_some() { "div" } else { "span" });
            if css.is_empty() {
                w.doc().add_class(el, "marked");
            } else {
                css.apply(w.doc(), el);
            }

            match block {
                Some(newlines) => {
                    w.next_match += newlines.end();
                    w.sub_wikify(el, Some(r"\n?@@"), None)
                }
                None => w.sub_wikify(el, r.terminator, None),
            }
        }
    }
}

/// Rule matching `"""verbatim"""` and `<nowiki>verbatim</nowiki>`.
pub(super) fn verbatim_text() -> GrammarRule {
    rule! {
        name: "verbatimText",
        pattern: r#""{3}|<[Nn][Oo][Ww][Ii][Kk][Ii]>"#,
        profiles: ProfileSet::CORE,
        lookahead: r#"(?s)(?:"{3}(.*?)"{3})|(?:<[Nn][Oo][Ww][Ii][Kk][Ii]>(.*?)</[Nn][Oo][Ww][Ii][Kk][Ii]>)"#,
        handler: |w, r| {
            let Some(lookahead) = r.lookahead.as_ref() else { return Ok(()) };
            let Some(caps) = lookahead_at(lookahead, w.source(), w.match_start) else { return Ok(()) };

            let text = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            w.next_match = caps.get(0).map_or(w.next_match, |m| m.end());

            let out = w.output();
            let span = w.doc().create_element(out, "span");
            w.doc().add_class(span, "verbatim");
            w.doc().append_text(span, text);
            Ok(())
        }
    }
}

pub(super) fn horizontal_rule() -> GrammarRule {
    rule! {
        name: "horizontalRule",
        pattern: r"^----+$\n?|<[Hh][Rr]\s*/?>\n?",
        profiles: ProfileSet::CORE,
        handler: |w, _r| {
            let out = w.output();
            w.doc().create_element(out, "hr");
            Ok(())
        }
    }
}

pub(super) fn emdash() -> GrammarRule {
    rule! {
        name: "emdash",
        pattern: "--",
        profiles: ProfileSet::CORE,
        handler: |w, _r| {
            let out = w.output();
            w.doc().append_text(out, "\u{2014}");
            Ok(())
        }
    }
}

/// `$$` is an escaped dollar sign.
pub(super) fn double_dollar_sign() -> GrammarRule {
    rule! {
        name: "doubleDollarSign",
        pattern: r"\$\$",
        profiles: ProfileSet::CORE,
        handler: |w, _r| {
            let out = w.output();
            w.doc().append_text(out, "$");
            Ok(())
        }
    }
}

/// Rule printing `$var`, `$var.prop`, `$var[0]`, `$var["key"]` and `$var[$key]` in running text.
///
/// Unset variables (`undefined` or `null`) are printed as the source text; anything else is wikified.
pub(super) fn naked_variable() -> GrammarRule {
    let pattern = format!(
        r#"{VARIABLE}(?:(?:\.{IDENTIFIER})|(?:\[\d+\])|(?:\["(?:\\.|[^"\\])+"\])|(?:\['(?:\\.|[^'\\])+'\])|(?:\[{VARIABLE}\]))*"#
    );

    rule! {
        name: "nakedVariable",
        pattern: pattern,
        profiles: ProfileSet::CORE,
        handler: |w, _r| {
            let text = w.match_text();
            let out = w.output();
            match w.engine().evaluate(text) {
                Ok(Value::Undefined | Value::Null) | Err(_) => {
                    w.doc().append_text(out, text);
                    Ok(())
                }
                Ok(value) => w.wikify_into(out, &value.to_string()),
            }
        }
    }
}

/// Rule dropping `/% %/`, `/* */` and `<!-- -->` comments.
pub(super) fn comment_by_block() -> GrammarRule {
    rule! {
        name: "commentByBlock",
        pattern: r"(?:/(?:%|\*))|(?:<!--)",
        profiles: ProfileSet::CORE,
        lookahead: r"(?s)(?:/%.*?%/)|(?:/\*.*?\*/)|(?:<!--.*?-->)",
        handler: |w, r| {
            let Some(lookahead) = r.lookahead.as_ref() else { return Ok(()) };
            if let Some(caps) = lookahead_at(lookahead, w.source(), w.match_start) {
                w.next_match = caps.get(0).map_or(w.next_match, |m| m.end());
            }
            Ok(())
        }
    }
}

/// Rule joining lines around a `\`: the backslash and the line break are both dropped.
pub(super) fn line_continuation() -> GrammarRule {
    // Order matters: end of line, start of line, end of input, start of input.
    let pattern = format!(
        r"\\{SPACE_NO_TERMINATOR}*\n|\n{SPACE_NO_TERMINATOR}*\\|\n?\\{SPACE_NO_TERMINATOR}*$|^{SPACE_NO_TERMINATOR}*\\\n?"
    );

    rule! {
        name: "lineContinuation",
        pattern: pattern,
        profiles: ProfileSet::CORE,
        handler: |w, _r| {
            w.next_match = w.match_start + w.match_length;
            Ok(())
        }
    }
}

pub(super) fn line_break() -> GrammarRule {
    rule! {
        name: "lineBreak",
        pattern: r"\n|<[Bb][Rr]\s*/?>",
        profiles: ProfileSet::CORE,
        handler: |w, _r| {
            if !w.options().nobr {
                let out = w.output();
                w.doc().create_element(out, "br");
            }
            Ok(())
        }
    }
}

/// Rule passing HTML character references (`&amp;`, `&#8212;`, combining sequences) through as markup.
pub(super) fn html_character_reference() -> GrammarRule {
    rule! {
        name: "htmlCharacterReference",
        pattern: r"(?:(?:&#?[0-9A-Za-z]{2,8};|.)(?:&#?(?:x0*(?:3[0-6][0-9A-Fa-f]|1D[C-Fc-f][0-9A-Fa-f]|20[D-Fd-f][0-9A-Fa-f]|FE2[0-9A-Fa-f])|0*(?:76[89]|7[7-9][0-9]|8[0-7][0-9]|761[6-9]|76[2-7][0-9]|84[0-3][0-9]|844[0-7]|6505[6-9]|6506[0-9]|6507[0-1]));)+|&#?[0-9A-Za-z]{2,8};)",
        profiles: ProfileSet::CORE,
        handler: |w, _r| {
            let out = w.output();
            let text = w.match_text();
            w.doc().append_markup(out, text);
            Ok(())
        }
    }
}
