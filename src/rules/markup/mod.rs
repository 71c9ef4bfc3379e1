//! Built-in grammar rules.
//!
//! Registration order is significant: among rules matching at the same offset the earlier one wins, so
//! block constructs come before the inline ones that share a prefix (`<<<` before `<<`), and `htmlTag`
//! comes after every rule handling a tag-like construct of its own.

mod block;
mod html;
mod inline;
mod links;

#[cfg(test)]
mod tests;

use crate::{GrammarRule, Wikifier};
use regex::{Captures, Regex};

pub fn get() -> Vec<GrammarRule> {
    vec![
        block::quote_by_block(),
        block::quote_by_line(),
        inline::macro_call(),
        links::link(),
        links::url_link(),
        links::image(),
        block::monospaced_by_block(),
        inline::format_by_char(),
        inline::custom_style(),
        inline::verbatim_text(),
        inline::horizontal_rule(),
        inline::emdash(),
        inline::double_dollar_sign(),
        inline::naked_variable(),
        block::heading(),
        block::list(),
        inline::comment_by_block(),
        inline::line_continuation(),
        inline::line_break(),
        inline::html_character_reference(),
        html::verbatim_html(),
        html::html_tag(),
    ]
}

/// Runs a rule's lookahead at `pos`; only a match starting exactly there counts.
pub(super) fn lookahead_at<'s>(re: &Regex, source: &'s str, pos: usize) -> Option<Captures<'s>> {
    re.captures_at(source, pos).filter(|caps| caps.get(0).is_some_and(|m| m.start() == pos))
}

/// Block rules only apply at the start of a block. Elsewhere the match is emitted as text and this
/// returns false.
pub(super) fn require_block_context(w: &mut Wikifier<'_>) -> bool {
    let out = w.output();
    if w.document().has_block_context(out) {
        return true;
    }
    let text = w.match_text();
    w.doc().append_text(out, text);
    false
}
