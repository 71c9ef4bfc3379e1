use crate::error::{RegistryError, Result};
use crate::markup::patterns::{IDENTIFIER, VARIABLE};
use crate::{Engine, MacroCall, MacroDefinition, SkipArgs, Value};
use once_cell::sync::Lazy;
use regex::Regex;

static STORE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"State\.(variables|temporary)\.({IDENTIFIER})")).unwrap());

static VARIABLE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(VARIABLE).unwrap());

pub(super) fn register(engine: &Engine) -> Result<(), RegistryError> {
    engine.register_macro(&["set"], MacroDefinition::new(set).skip_args(SkipArgs::All))?;
    engine.alias_macro("run", "set")?;
    engine.register_macro(&["unset"], MacroDefinition::new(unset).skip_args(SkipArgs::All))?;
    engine.register_macro(&["capture"], MacroDefinition::new(capture).skip_args(SkipArgs::All).with_tags(&[]))?;
    Ok(())
}

/// `<<set $gold to 5>>`: evaluates the whole argument string.
fn set(call: &mut MacroCall<'_, '_>) -> Result<()> {
    let code = call.args().full.clone();
    if code.trim().is_empty() {
        return call.error("no expression specified");
    }
    match call.engine().evaluate_desugared(&code) {
        Ok(_) => Ok(()),
        Err(err) => call.error(format!("bad evaluation: {err}")),
    }
}

/// `<<unset $a, _b>>`
fn unset(call: &mut MacroCall<'_, '_>) -> Result<()> {
    let code = call.args().full.clone();
    if code.trim().is_empty() {
        return call.error("no story/temporary variable list specified");
    }

    let engine = call.engine();
    for caps in STORE_PATH.captures_iter(&code) {
        let sigil = if &caps[1] == "variables" { '$' } else { '_' };
        engine.remove_variable(&format!("{sigil}{}", &caps[2]));
    }
    Ok(())
}

/// `<<capture _i $x>>...<</capture>>`: shadows the listed variables for callbacks created in the body and
/// restores their values afterwards.
fn capture(call: &mut MacroCall<'_, '_>) -> Result<()> {
    let raw = call.args().raw.clone();
    if raw.trim().is_empty() {
        return call.error("no story/temporary variable list specified");
    }

    let engine = call.engine();
    let names: Vec<&str> = VARIABLE_NAME.find_iter(&raw).map(|m| m.as_str()).collect();
    let cache: Vec<(String, Option<Value>)> =
        names.iter().map(|name| (name.to_string(), engine.variable(name))).collect();
    call.add_shadow(&names)?;

    let contents = call.payload().first().map(|clause| clause.contents.clone()).unwrap_or_default();
    let output = call.output();
    let result = call.wikify(output, &contents);

    for (name, value) in cache {
        match value {
            Some(value) => engine.set_variable(&name, value),
            None => {
                engine.remove_variable(&name);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use crate::{Engine, Value};

    #[test]
    fn set_and_run_share_a_definition() {
        let engine = Engine::with_defaults().unwrap();
        let doc = engine.wikify("<<set $a to 2>><<run $a += 3>><<set _t to $a * 2>>").unwrap();

        assert!(doc.errors(doc.root()).is_empty());
        assert_eq!(engine.variable("$a"), Some(Value::Number(5.0)));
        assert_eq!(engine.variable("_t"), Some(Value::Number(10.0)));
    }

    #[test]
    fn set_reports_bad_expressions_inline() {
        let engine = Engine::with_defaults().unwrap();
        let doc = engine.wikify("<<set>><<set $a to>>").unwrap();
        let errors = doc.errors(doc.root());

        assert_eq!(errors[0], "<<set>>: no expression specified");
        assert!(errors[1].starts_with("<<set>>: bad evaluation: "), "{}", errors[1]);
    }

    #[test]
    fn unset_removes_both_namespaces() {
        let engine = Engine::with_defaults().unwrap();
        engine.set_variable("$a", Value::Number(1.0));
        engine.set_variable("_b", Value::Number(2.0));
        engine.set_variable("$c", Value::Number(3.0));

        engine.wikify("<<unset $a, _b>>").unwrap();

        assert_eq!(engine.variable("$a"), None);
        assert_eq!(engine.variable("_b"), None);
        assert_eq!(engine.variable("$c"), Some(Value::Number(3.0)));
    }

    #[test]
    fn capture_restores_values_after_the_body() {
        let engine = Engine::with_defaults().unwrap();
        engine.set_variable("$x", Value::Number(1.0));

        let doc = engine.wikify("<<capture $x _new>><<set $x to 9>><<set _new to 1>>$x<</capture>> $x").unwrap();

        assert_eq!(doc.text_content(doc.root()), "9 1");
        assert_eq!(engine.variable("$x"), Some(Value::Number(1.0)));
        assert_eq!(engine.variable("_new"), None);
    }
}
