use crate::error::{RegistryError, Result};
use crate::{Engine, MacroCall, MacroDefinition, SkipArgs, Value};

pub(super) fn register(engine: &Engine) -> Result<(), RegistryError> {
    engine.register_macro(&["print", "=", "-"], MacroDefinition::new(print).skip_args(SkipArgs::All))?;
    engine.register_macro(&["nobr"], MacroDefinition::new(nobr).skip_args(SkipArgs::All).with_tags(&[]))?;
    engine.register_macro(&["silently"], MacroDefinition::new(silently).skip_args(SkipArgs::All).with_tags(&[]))?;
    Ok(())
}

/// `<<print expr>>` and `<<= expr>>` wikify the result; `<<- expr>>` outputs it as plain text.
fn print(call: &mut MacroCall<'_, '_>) -> Result<()> {
    let code = call.args().full.clone();
    if code.trim().is_empty() {
        return call.error("no expression specified");
    }

    let value = match call.engine().evaluate_desugared(&code) {
        Ok(value) => value,
        Err(err) => return call.error(format!("bad evaluation: {err}")),
    };
    if matches!(value, Value::Undefined | Value::Null) {
        return Ok(());
    }

    let output = call.output();
    let text = value.to_string();
    if call.display_name() == "-" {
        call.doc().append_text(output, &text);
        Ok(())
    } else {
        call.wikify(output, &text)
    }
}

/// `<<nobr>>`: line breaks inside the body collapse to single spaces.
fn nobr(call: &mut MacroCall<'_, '_>) -> Result<()> {
    let contents = call.payload().first().map(|clause| clause.contents.clone()).unwrap_or_default();
    let collapsed = regex!(r"\n+").replace_all(contents.trim_matches('\n'), " ");

    let output = call.output();
    call.wikify(output, &collapsed)
}

/// `<<silently>>`: runs the body for its side effects and discards the output. Errors in the body still
/// surface as a single error of this call.
fn silently(call: &mut MacroCall<'_, '_>) -> Result<()> {
    let contents = call.payload().first().map(|clause| clause.contents.clone()).unwrap_or_default();

    let scratch = call.doc().create_fragment();
    call.wikify(scratch, contents.trim())?;

    let errors = call.doc().errors(scratch);
    if errors.is_empty() {
        return Ok(());
    }
    let plural = if errors.len() == 1 { "" } else { "s" };
    call.error(format!("error{plural} within contents ({})", errors.join("; ")))
}

#[cfg(test)]
mod tests {
    use crate::{Engine, Value};

    #[test]
    fn print_variants() {
        let engine = Engine::with_defaults().unwrap();
        engine.set_variable("$name", Value::str("''Ann''"));

        let doc = engine.wikify("<<print $name>> <<= 1 + 1>> <<- $name>>").unwrap();
        assert_eq!(doc.to_html(doc.root()), "<strong>Ann</strong> 2 ''Ann''");
    }

    #[test]
    fn print_skips_undefined_and_reports_failures() {
        let engine = Engine::with_defaults().unwrap();
        let doc = engine.wikify("[<<print $missing>>]<<print>>").unwrap();

        assert_eq!(doc.text_content(doc.root()), "[]");
        assert_eq!(doc.errors(doc.root()), vec!["<<print>>: no expression specified"]);
    }

    #[test]
    fn nobr_collapses_line_breaks() {
        let engine = Engine::with_defaults().unwrap();
        let doc = engine.wikify("<<nobr>>\na\n\nb\nc\n<</nobr>>").unwrap();
        assert_eq!(doc.to_html(doc.root()), "a b c");
    }

    #[test]
    fn silently_discards_output_but_keeps_effects() {
        let engine = Engine::with_defaults().unwrap();
        let doc = engine.wikify("<<silently>>\n<<set $a to 3>>hidden $a\n<</silently>>$a").unwrap();

        assert_eq!(doc.to_html(doc.root()), "3");
        assert_eq!(engine.variable("$a"), Some(Value::Number(3.0)));
    }

    #[test]
    fn silently_reports_body_errors() {
        let engine = Engine::with_defaults().unwrap();
        let doc = engine.wikify("<<silently>><<nope>><<print>><</silently>>").unwrap();
        let errors = doc.errors(doc.root());

        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("<<silently>>: errors within contents ("), "{}", errors[0]);
    }
}
