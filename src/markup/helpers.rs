//! Helpers shared by the link/image grammar rules and the argument coercer.

use super::patterns::{INLINE_CSS, URL_PREFIX};
use crate::engine::ShadowCallback;
use crate::output::{Document, NodeId};
use crate::state::Passage;
use crate::{Engine, Value};
use std::rc::Rc;

/// Evaluates `text` as an expression and returns the result when it is a non-blank string or a number;
/// otherwise (including on evaluation failure) returns `text` unchanged.
pub fn eval_text(engine: &Engine, text: &str) -> String {
    match engine.evaluate(text) {
        Ok(Value::Str(s)) if !s.trim().is_empty() => s,
        Ok(value @ Value::Number(_)) => value.to_string(),
        _ => text.to_string(),
    }
}

/// A passage title that exists is used verbatim; anything else is evaluated with [`eval_text`].
pub fn eval_passage_id(engine: &Engine, passage: &str) -> String {
    if engine.story().has(passage) { passage.to_string() } else { eval_text(engine, passage) }
}

/// Whether `link` points outside the story: not a passage, and either URL-shaped or containing one of
/// `/ . ? #`.
pub fn is_external_link(engine: &Engine, link: &str) -> bool {
    if engine.story().has(link) {
        return false;
    }
    URL_PREFIX.is_match(link) || link.contains(['/', '.', '?', '#'])
}

/// The passage behind `source` when it is an image passage (tagged `Twine.image`).
pub fn image_passage<'e>(engine: &'e Engine, source: &str) -> Option<&'e Passage> {
    if source.starts_with("data:") {
        return None;
    }
    engine.story().get(source).filter(|passage| passage.has_tag("Twine.image"))
}

/// Appends `<a data-passage=..>` with `link-internal` (or `link-broken` when the passage is missing).
pub fn create_internal_link(
    engine: &Engine,
    doc: &mut Document,
    parent: NodeId,
    passage: &str,
    text: Option<&str>,
    action: Option<ShadowCallback>,
) -> NodeId {
    let link = doc.create_element(parent, "a");
    doc.set_attr(link, "data-passage", passage);
    doc.add_class(link, if engine.story().has(passage) { "link-internal" } else { "link-broken" });

    if let Some(text) = text.filter(|t| !t.is_empty()) {
        doc.append_text(link, text);
    }
    if let Some(action) = action {
        doc.set_action(link, Rc::new(action));
    }
    link
}

pub fn create_external_link(doc: &mut Document, parent: NodeId, url: &str, text: Option<&str>) -> NodeId {
    let link = doc.create_element(parent, "a");
    doc.set_attr(link, "target", "_blank");
    doc.add_class(link, "link-external");
    doc.set_attr(link, "href", url);
    doc.set_attr(link, "tabindex", "0");
    if let Some(text) = text {
        doc.append_text(link, text);
    }
    link
}

/// Styling collected from a run of inline CSS directives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineCss {
    pub classes: Vec<String>,
    pub id: Option<String>,
    /// `(property, value)` pairs in source order.
    pub styles: Vec<(String, String)>,
}

impl InlineCss {
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.id.is_none() && self.styles.is_empty()
    }

    /// Applies the collected classes, id and styles to an element.
    pub fn apply(&self, doc: &mut Document, el: NodeId) {
        for class in &self.classes {
            doc.add_class(el, class);
        }
        if let Some(id) = &self.id {
            doc.set_attr(el, "id", id);
        }
        if !self.styles.is_empty() {
            let style: Vec<String> = self.styles.iter().map(|(k, v)| format!("{k}:{v}")).collect();
            doc.set_attr(el, "style", &style.join(";"));
        }
    }
}

/// Reads consecutive inline CSS directives at `*pos`, advancing `*pos` past them.
pub fn inline_css(source: &str, pos: &mut usize) -> InlineCss {
    let id_or_class = regex!(r"([#.])([0-9A-Z_a-z\-\x{00c0}-\x{00d6}\x{00d8}-\x{00f6}\x{00f8}-\x{00ff}]+)");
    let mut css = InlineCss::default();
    while let Some(caps) = INLINE_CSS.captures(&source[*pos..]) {
        let Some(whole) = caps.get(0) else { break };
        if whole.is_empty() {
            break;
        }

        if let (Some(name), Some(value)) = (caps.get(1), caps.get(2)) {
            css.styles.push((name.as_str().to_string(), value.as_str().trim().to_string()));
        } else if let (Some(name), Some(value)) = (caps.get(3), caps.get(4)) {
            css.styles.push((name.as_str().to_string(), value.as_str().trim().to_string()));
        } else if let Some(selectors) = caps.get(5) {
            for sel in id_or_class.captures_iter(selectors.as_str()) {
                if &sel[1] == "." {
                    css.classes.push(sel[2].to_string());
                } else {
                    css.id = Some(sel[2].to_string());
                }
            }
        }

        *pos += whole.end();
    }
    css
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Story;

    fn engine() -> Engine {
        let story: Story = [Passage::new("Cave", "dark"), Passage::new("cat.png", "data:xyz").with_tags(&["Twine.image"])]
            .into_iter()
            .collect();
        Engine::builder().story(story).build().unwrap()
    }

    #[test]
    fn external_link_detection() {
        let engine = engine();
        assert!(!is_external_link(&engine, "Cave"));
        assert!(is_external_link(&engine, "https://example.com"));
        assert!(is_external_link(&engine, "HTTP://EXAMPLE.COM"));
        assert!(is_external_link(&engine, "notes.txt"));
        assert!(!is_external_link(&engine, "Forest"));
    }

    #[test]
    fn eval_text_falls_back_to_the_input() {
        let engine = engine();
        engine.set_variable("$name", Value::str("Mira"));
        assert_eq!(eval_text(&engine, "$name"), "Mira");
        assert_eq!(eval_text(&engine, "1 + 2"), "3");
        assert_eq!(eval_text(&engine, "Go north"), "Go north");
        assert_eq!(eval_passage_id(&engine, "Cave"), "Cave");
    }

    #[test]
    fn image_passages_need_the_tag() {
        let engine = engine();
        assert_eq!(image_passage(&engine, "cat.png").map(|p| p.text.as_str()), Some("data:xyz"));
        assert!(image_passage(&engine, "Cave").is_none());
    }

    #[test]
    fn inline_css_reads_every_directive() {
        let src = "color:red;#hero.big.loud;font-weight(bold):rest";
        let mut pos = 0;
        let css = inline_css(src, &mut pos);
        assert_eq!(&src[pos..], "rest");
        assert_eq!(css.id.as_deref(), Some("hero"));
        assert_eq!(css.classes, vec!["big", "loud"]);
        assert_eq!(
            css.styles,
            vec![("color".to_string(), "red".to_string()), ("font-weight".to_string(), "bold".to_string())]
        );
    }

    #[test]
    fn inline_css_without_directives_is_empty() {
        let mut pos = 0;
        assert!(inline_css("plain", &mut pos).is_empty());
        assert_eq!(pos, 0);
    }
}
