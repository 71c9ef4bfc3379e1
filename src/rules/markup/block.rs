use crate::{GrammarRule, NodeId, ProfileSet};

use super::{lookahead_at, require_block_context};

/// Rule matching `<<<` fenced block quotes.
pub(super) fn quote_by_block() -> GrammarRule {
    rule! {
        name: "quoteByBlock",
        pattern: r"^<<<\n",
        profiles: ProfileSet::BLOCK,
        terminator: r"^<<<\n",
        handler: |w, r| {
            if !require_block_context(w) {
                return Ok(());
            }
            let out = w.output();
            let quote = w.doc().create_element(out, "blockquote");
            w.sub_wikify(quote, r.terminator, None)
        }
    }
}

/// Rule matching runs of `>`-prefixed lines; the prefix length is the nesting level.
pub(super) fn quote_by_line() -> GrammarRule {
    rule! {
        name: "quoteByLine",
        pattern: "^>+",
        profiles: ProfileSet::BLOCK,
        lookahead: r"(?m)^>+",
        terminator: r"\n",
        handler: |w, r| {
            if !require_block_context(w) {
                return Ok(());
            }
            let Some(lookahead) = r.lookahead.as_ref() else { return Ok(()) };

            let out = w.output();
            let mut stack: Vec<NodeId> = vec![out];
            let mut level = 0;
            let mut new_level = w.match_length;

            loop {
                if new_level > level {
                    for _ in level..new_level {
                        let parent = top(&stack, out);
                        let quote = w.doc().create_element(parent, "blockquote");
                        stack.push(quote);
                    }
                } else if new_level < level {
                    stack.truncate(new_level + 1);
                }

                level = new_level;
                let dest = top(&stack, out);
                w.sub_wikify(dest, r.terminator, None)?;
                w.doc().create_element(dest, "br");

                match lookahead_at(lookahead, w.source(), w.next_match) {
                    Some(caps) => {
                        new_level = caps.get(0).map_or(0, |m| m.len());
                        w.next_match += new_level;
                    }
                    None => break,
                }
            }
            Ok(())
        }
    }
}

/// Rule matching `{{{` fenced code blocks.
pub(super) fn monospaced_by_block() -> GrammarRule {
    rule! {
        name: "monospacedByBlock",
        pattern: r"^\{\{\{\n",
        profiles: ProfileSet::BLOCK,
        lookahead: r"(?m)^\{\{\{\n((?:^[^\n]*\n)+?)(^\}\}\}$\n?)",
        handler: |w, r| {
            let Some(lookahead) = r.lookahead.as_ref() else { return Ok(()) };
            let Some(caps) = lookahead_at(lookahead, w.source(), w.match_start) else { return Ok(()) };

            let code_text = caps.get(1).map_or("", |m| m.as_str());
            let end = caps.get(0).map_or(w.next_match, |m| m.end());

            let out = w.output();
            let doc = w.doc();
            let pre = doc.create_element(out, "pre");
            let code = doc.create_element(pre, "code");
            doc.append_text(code, code_text);
            w.next_match = end;
            Ok(())
        }
    }
}

/// Rule matching `!` headings (`!` through `!!!!!!`).
pub(super) fn heading() -> GrammarRule {
    rule! {
        name: "heading",
        pattern: "^!{1,6}",
        profiles: ProfileSet::BLOCK,
        terminator: r"\n",
        handler: |w, r| {
            if !require_block_context(w) {
                return Ok(());
            }
            let out = w.output();
            let tag = format!("h{}", w.match_length);
            let heading = w.doc().create_element(out, &tag);
            w.sub_wikify(heading, r.terminator, None)
        }
    }
}

/// Rule matching `*` (unordered) and `#` (ordered) list items, nested by prefix length.
pub(super) fn list() -> GrammarRule {
    rule! {
        name: "list",
        pattern: r"^(?:(?:\*+)|(?:#+))",
        profiles: ProfileSet::BLOCK,
        lookahead: r"(?m)^(?:(\*+)|(#+))",
        terminator: r"\n",
        handler: |w, r| {
            if !require_block_context(w) {
                return Ok(());
            }
            let Some(lookahead) = r.lookahead.as_ref() else { return Ok(()) };

            w.next_match = w.match_start;
            let out = w.output();
            let mut stack: Vec<NodeId> = vec![out];
            let mut cur_type: Option<&str> = None;
            let mut level = 0;

            while let Some(caps) = lookahead_at(lookahead, w.source(), w.next_match) {
                let new_type = if caps.get(2).is_some() { "ol" } else { "ul" };
                let new_level = caps.get(0).map_or(0, |m| m.len());
                w.next_match += new_level;

                if new_level > level {
                    for _ in level..new_level {
                        let parent = top(&stack, out);
                        let list = w.doc().create_element(parent, new_type);
                        stack.push(list);
                    }
                } else if new_level < level {
                    stack.truncate(new_level + 1);
                } else if cur_type != Some(new_type) {
                    stack.pop();
                    let parent = top(&stack, out);
                    let list = w.doc().create_element(parent, new_type);
                    stack.push(list);
                }

                level = new_level;
                cur_type = Some(new_type);
                let parent = top(&stack, out);
                let item = w.doc().create_element(parent, "li");
                w.sub_wikify(item, r.terminator, None)?;
            }
            Ok(())
        }
    }
}

fn top(stack: &[NodeId], fallback: NodeId) -> NodeId {
    stack.last().copied().unwrap_or(fallback)
}
