use crate::markup::patterns::HTML_TAG_NAME;
use crate::markup::{desugar, eval_passage_id};
use crate::{Engine, GrammarRule, NodeId, OptionOverrides, ProfileSet, Wikifier};
use once_cell::sync::Lazy;
use regex::Regex;
use std::rc::Rc;

use super::lookahead_at;

const MEDIA_TAGS: &[&str] = &["audio", "img", "source", "track", "video"];

/// Containers whose line breaks are layout, not content.
const NOBR_TAGS: &[&str] = &[
    "audio", "colgroup", "datalist", "dl", "figure", "meter", "ol", "optgroup", "picture", "progress", "ruby", "select",
    "table", "tbody", "tfoot", "thead", "tr", "ul", "video",
];

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "menuitem", "meta", "param", "source",
    "track", "wbr",
];

static TAG_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(&format!("^<({HTML_TAG_NAME})")).unwrap());

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\x00-\x1F\x7F-\x9F\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#).unwrap()
});

/// Rule passing `<html>...</html>` through untouched.
pub(super) fn verbatim_html() -> GrammarRule {
    rule! {
        name: "verbatimHtml",
        pattern: "<[Hh][Tt][Mm][Ll]>",
        profiles: ProfileSet::CORE,
        lookahead: r"(?s)<[Hh][Tt][Mm][Ll]>(.*?)</[Hh][Tt][Mm][Ll]>",
        handler: |w, r| {
            let Some(lookahead) = r.lookahead.as_ref() else { return Ok(()) };
            let Some(caps) = lookahead_at(lookahead, w.source(), w.match_start) else { return Ok(()) };

            w.next_match = caps.get(0).map_or(w.next_match, |m| m.end());
            let out = w.output();
            w.doc().append_markup(out, caps.get(1).map_or("", |m| m.as_str()));
            Ok(())
        }
    }
}

/// Rule matching HTML elements: attributes, evaluation directives (`@attr`, `sc-eval:attr`), `data-passage`
/// links and media transclusion. Non-void elements wikify their contents up to the closing tag.
///
/// Must be registered after every rule that handles a tag-like construct of its own.
pub(super) fn html_tag() -> GrammarRule {
    let pattern = format!(
        r#"<{HTML_TAG_NAME}(?:\s+[^\x00-\x1F\x7F-\x9F\s"'>/=]+(?:\s*=\s*(?:"[^"]*?"|'[^']*?'|[^\s"'=<>`]+))?)*\s*/?>"#
    );

    rule! {
        name: "htmlTag",
        pattern: pattern,
        profiles: ProfileSet::CORE,
        handler: |w, _r| {
            let matched = w.match_text();
            let Some(name) = TAG_NAME.captures(matched).and_then(|caps| caps.get(1)) else { return Ok(()) };
            let tag = name.as_str();
            let tag_name = tag.to_ascii_lowercase();
            let is_void = VOID_TAGS.contains(&tag_name.as_str()) || matched.ends_with("/>");
            let is_nobr = NOBR_TAGS.contains(&tag_name.as_str());

            let engine = w.engine();
            let out = w.output();
            let shown = format!("{matched}\u{2026}");

            let terminator = (!is_void).then(|| format!(r"</{tag_name}\s*>"));
            if let Some(terminator) = &terminator {
                let re = engine.terminator_regex(terminator, true)?;
                if re.find_at(w.source(), w.match_start).is_none() {
                    w.error(out, &format!("cannot find a closing tag for HTML <{tag}>"), &shown);
                    return Ok(());
                }
            }

            let attrs = match attributes(engine, &matched[name.end()..]) {
                Ok(attrs) => attrs,
                Err(message) => {
                    w.error(out, &format!("<{tag_name}>: {message}"), &shown);
                    return Ok(());
                }
            };

            let el = w.doc().create_element(out, &tag_name);
            for (name, value) in &attrs {
                w.doc().set_attr(el, name, value);
            }
            if w.document().attr(el, "data-passage").is_some() {
                process_data_passage(w, el, &tag_name);
            }

            if let Some(terminator) = terminator {
                let local = OptionOverrides { ignore_terminator_case: Some(true), ..Default::default() };
                engine.push_options(OptionOverrides { nobr: Some(is_nobr), ..Default::default() });
                let result = w.sub_wikify(el, Some(&terminator), Some(&local));
                engine.pop_options();
                result?;
            }
            Ok(())
        }
    }
}

/// Parses the attribute list of a start tag, resolving evaluation directives.
fn attributes(engine: &Engine, source: &str) -> Result<Vec<(String, String)>, String> {
    let mut attrs: Vec<(String, String)> = Vec::new();

    for caps in ATTRIBUTE.captures_iter(source) {
        let Some(name) = caps.get(1) else { continue };
        let name = name.as_str().to_ascii_lowercase();
        let value = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4)).map_or("", |m| m.as_str());

        match name.strip_prefix('@').or_else(|| name.strip_prefix("sc-eval:")) {
            Some("data-setter") => {
                return Err(format!("evaluation directive is not allowed on the data-setter attribute: \"{name}\""));
            }
            Some(target) => {
                let result = engine
                    .evaluate(value)
                    .map_err(|err| format!("bad evaluation from attribute directive \"{name}\": {err}"))?;
                upsert(&mut attrs, target, result.to_string());
            }
            None => upsert(&mut attrs, &name, value.to_string()),
        }
    }

    Ok(attrs)
}

fn upsert(attrs: &mut Vec<(String, String)>, name: &str, value: String) {
    match attrs.iter_mut().find(|(n, _)| n == name) {
        Some(slot) => slot.1 = value,
        None => attrs.push((name.to_string(), value)),
    }
}

/// Media elements transclude a tagged passage as their source; anything else becomes a passage link.
fn process_data_passage(w: &mut Wikifier<'_>, el: NodeId, tag_name: &str) {
    let engine = w.engine();
    let out = w.output();
    let Some(raw) = w.document().attr(el, "data-passage").map(str::to_string) else { return };

    let passage = eval_passage_id(engine, &raw);
    if passage != raw {
        w.doc().set_attr(el, "data-passage", &passage);
    }
    if passage.is_empty() {
        return;
    }

    if MEDIA_TAGS.contains(&tag_name) {
        if passage.starts_with("data:") {
            return;
        }
        let Some(media) = engine.story().get(&passage) else { return };

        let parent = w.document().tag(out).map(str::to_string);
        let (twine_tag, attr) = match tag_name {
            "audio" | "video" => (format!("Twine.{tag_name}"), "src"),
            "img" => ("Twine.image".to_string(), "src"),
            "track" => ("Twine.vtt".to_string(), "src"),
            _ => match parent.as_deref() {
                Some("picture") => ("Twine.image".to_string(), "srcset"),
                Some(parent @ ("audio" | "video")) => (format!("Twine.{parent}"), "src"),
                _ => return,
            },
        };
        if media.has_tag(&twine_tag) {
            w.doc().set_attr(el, attr, media.text.trim());
        }
        return;
    }

    let setter = w.document().attr(el, "data-setter").map(str::trim).filter(|s| !s.is_empty()).map(desugar);
    let doc = w.doc();
    doc.add_class(el, if engine.story().has(&passage) { "link-internal" } else { "link-broken" });
    if let Some(code) = setter {
        doc.set_action(el, Rc::new(engine.shadow_setter(code)));
    }
}
