use crate::markup::patterns::URL;
use crate::markup::{
    create_external_link, create_internal_link, desugar, eval_passage_id, eval_text, image_passage, is_external_link,
    parse_square_bracketed,
};
use crate::{GrammarRule, ProfileSet};

/// Rule matching `[[Text|Passage][$setter]]` links.
pub(super) fn link() -> GrammarRule {
    rule! {
        name: "link",
        pattern: r"\[\[[^\[]",
        profiles: ProfileSet::CORE,
        handler: |w, _r| {
            let Ok(markup) = parse_square_bracketed(w.source(), w.match_start) else {
                let out = w.output();
                w.output_text(out, w.match_start, w.next_match);
                return Ok(());
            };
            w.next_match = markup.pos;

            let engine = w.engine();
            let link = eval_passage_id(engine, markup.link.as_deref().unwrap_or_default());
            let text = match markup.text.as_deref() {
                Some(text) => eval_text(engine, text),
                None => link.clone(),
            };
            let action = markup.setter.as_deref().map(|setter| engine.shadow_setter(desugar(setter)));

            let out = w.output();
            if markup.force_internal || !is_external_link(engine, &link) {
                create_internal_link(engine, w.doc(), out, &link, Some(text.as_str()), action);
            } else {
                create_external_link(w.doc(), out, &link, Some(text.as_str()));
            }
            Ok(())
        }
    }
}

/// Rule turning bare URLs into external links.
pub(super) fn url_link() -> GrammarRule {
    rule! {
        name: "urlLink",
        pattern: URL,
        profiles: ProfileSet::CORE,
        handler: |w, _r| {
            let url = w.match_text();
            let out = w.output();
            create_external_link(w.doc(), out, url, Some(url));
            Ok(())
        }
    }
}

/// Rule matching `[img[Title|Source][Link][$setter]]` images, optionally aligned with `[<img[` / `[>img[`.
pub(super) fn image() -> GrammarRule {
    rule! {
        name: "image",
        pattern: r"\[[<>]?[Ii][Mm][Gg]\[",
        profiles: ProfileSet::CORE,
        handler: |w, _r| {
            let Ok(markup) = parse_square_bracketed(w.source(), w.match_start) else {
                let out = w.output();
                w.output_text(out, w.match_start, w.next_match);
                return Ok(());
            };
            w.next_match = markup.pos;

            let engine = w.engine();
            let action = markup.setter.as_deref().map(|setter| engine.shadow_setter(desugar(setter)));
            let mut parent = w.output();

            if let Some(link) = markup.link.as_deref() {
                let link = eval_passage_id(engine, link);
                parent = if markup.force_internal || !is_external_link(engine, &link) {
                    create_internal_link(engine, w.doc(), parent, &link, None, action)
                } else {
                    create_external_link(w.doc(), parent, &link, None)
                };
                w.doc().add_class(parent, "link-image");
            }

            let mut source = eval_passage_id(engine, markup.source.as_deref().unwrap_or_default());
            let doc = w.doc();
            let img = doc.create_element(parent, "img");
            if let Some(passage) = image_passage(engine, &source) {
                doc.set_attr(img, "data-passage", &passage.title);
                source = passage.text.trim().to_string();
            }
            doc.set_attr(img, "src", &source);

            if let Some(title) = markup.text.as_deref() {
                doc.set_attr(img, "title", &eval_text(engine, title));
            }
            if let Some(align) = markup.align {
                doc.set_attr(img, "align", align.as_str());
            }
            Ok(())
        }
    }
}
