use crate::error::{RegistryError, Result};
use crate::{Engine, MacroCall, MacroDefinition, OptionOverrides, ProfileName, Value};
use std::rc::Rc;

pub(super) fn register(engine: &Engine) -> Result<(), RegistryError> {
    engine.register_macro(&["link", "button"], MacroDefinition::new(link).with_tags(&[]).asynchronous())?;
    Ok(())
}

/// `<<link "text" "Passage">>body<</link>>` and `<<button>>`: an activatable element whose action wikifies
/// the body with the variables shadowed at creation time.
fn link(call: &mut MacroCall<'_, '_>) -> Result<()> {
    let name = call.name().to_string();
    if call.args().is_empty() {
        return call.error(format!("no {name} text specified"));
    }

    let engine = call.engine();
    let output = call.output();
    let args = call.args().to_vec();
    let el = call.doc().create_element(output, if name == "button" { "button" } else { "a" });

    let passage = match &args[0] {
        Value::Image(image) => {
            let doc = call.doc();
            doc.add_class(el, "link-image");
            let img = doc.create_element(el, "img");
            doc.set_attr(img, "src", &image.source);
            if let Some(source_passage) = &image.passage {
                doc.set_attr(img, "data-passage", source_passage);
            }
            if let Some(title) = &image.title {
                doc.set_attr(img, "title", title);
            }
            if let Some(align) = image.align {
                doc.set_attr(img, "align", align.as_str());
            }
            image.link.clone()
        }
        Value::Link(link) => {
            call.doc().append_text(el, &link.text);
            Some(link.link.clone())
        }
        text => {
            engine.push_options(OptionOverrides { profile: Some(ProfileName::Core), ..Default::default() });
            let result = call.wikify(el, &text.to_string());
            engine.pop_options();
            result?;
            args.get(1).map(Value::to_string)
        }
    };

    let doc = call.doc();
    doc.add_class(el, &format!("macro-{name}"));
    match passage {
        Some(passage) => {
            doc.set_attr(el, "data-passage", &passage);
            doc.add_class(el, if engine.story().has(&passage) { "link-internal" } else { "link-broken" });
        }
        None => doc.add_class(el, "link-internal"),
    }

    let contents = call.payload().first().map(|clause| clause.contents.trim().to_string()).unwrap_or_default();
    let action = call.create_shadow_wrapper(move |engine| {
        if !contents.is_empty() {
            engine.wikify_eval(&contents)?;
        }
        Ok(())
    });
    call.doc().set_action(el, Rc::new(action));
    Ok(())
}
