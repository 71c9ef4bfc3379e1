use crate::error::{RegistryError, Result};
use crate::{Engine, MacroCall, MacroDefinition, ScanAbort, SkipArgs};

pub(super) fn register(engine: &Engine) -> Result<(), RegistryError> {
    engine.register_macro(&["if"], MacroDefinition::new(if_else).skip_args(SkipArgs::All).with_tags(&["elseif", "else"]))?;
    engine.register_macro(&["for"], MacroDefinition::new(for_loop).skip_args(SkipArgs::All).with_tags(&[]))?;
    engine.register_macro(&["break", "continue"], MacroDefinition::new(break_continue).skip_args(SkipArgs::All))?;
    Ok(())
}

/// `<<if>>`, `<<elseif>>` and `<<else>>`: validates every clause, then wikifies the first that passes.
fn if_else(call: &mut MacroCall<'_, '_>) -> Result<()> {
    let ctx = call.context();
    let clauses = ctx.payload.as_deref().unwrap_or_default();
    let numbered = |i: usize| if i > 0 { format!(" (#{i})") } else { String::new() };

    for (i, clause) in clauses.iter().enumerate() {
        if clause.name == "else" {
            if !clause.args.raw.is_empty() {
                if regex!(r"(?i)^\s*if\b").is_match(&clause.args.raw) {
                    return call.error(format!(
                        "whitespace is not allowed between the \"else\" and \"if\" in <<elseif>> clause{}",
                        numbered(i)
                    ));
                }
                return call.error(format!(
                    "<<else>> does not accept a conditional expression (perhaps you meant to use <<elseif>>), \
                     invalid: {}",
                    clause.args.raw
                ));
            }
            if i + 1 != clauses.len() {
                return call.error("<<else>> must be the final clause");
            }
        } else if clause.args.full.trim().is_empty() {
            return call.error(format!(
                "no conditional expression specified for <<{}>> clause{}",
                clause.name,
                numbered(i)
            ));
        } else if regex!(r"[^!=&^|<>*/%+-]=[^=>]").is_match(&clause.args.full) {
            return call.error(format!(
                "assignment operator found within <<{}>> clause{} (perhaps you meant to use an equality operator: \
                 ==, ===, eq, is), invalid: {}",
                clause.name,
                numbered(i),
                clause.args.raw
            ));
        }
    }

    let engine = call.engine();
    for (i, clause) in clauses.iter().enumerate() {
        let passed = clause.name == "else"
            || match engine.evaluate_desugared(&clause.args.full) {
                Ok(value) => value.is_truthy(),
                Err(err) => {
                    let name = if i == 0 { "if" } else { "elseif" };
                    return call.error(format!("bad conditional expression in <<{name}>> clause{}: {err}", numbered(i)));
                }
            };

        if passed {
            let output = call.output();
            return call.wikify(output, &clause.contents);
        }
    }
    Ok(())
}

/// Clears the loop signal however the loop exits.
struct LoopSignalReset<'e>(&'e Engine);

impl Drop for LoopSignalReset<'_> {
    fn drop(&mut self) {
        self.0.take_abort();
    }
}

/// `<<for>>` in its conditional (`<<for $i lt 3>>`), three-part (`<<for _i to 0; _i lt 3; _i += 1>>`) and
/// empty (loop until `<<break>>`) forms.
fn for_loop(call: &mut MacroCall<'_, '_>) -> Result<()> {
    let args = call.args().full.trim().to_string();
    let body = call.payload().first().map(|clause| clause.contents.clone()).unwrap_or_default();
    let body = body.strip_suffix('\n').unwrap_or(&body).to_string();

    let (init, condition, post) = if args.is_empty() {
        (None, None, None)
    } else if !args.contains(';') {
        if regex!(r"^\S+\s+range\s+\S").is_match(&args) {
            return call.error("invalid syntax, the range form is not supported");
        }
        if regex!(r"(?i)^\S+\s+in\s+\S+").is_match(&args) {
            return call.error("invalid syntax, for\u{2026}in is not supported");
        }
        if regex!(r"(?i)^\S+\s+of\s+\S+").is_match(&args) {
            return call.error("invalid syntax, for\u{2026}of is not supported");
        }
        (None, Some(args.clone()), None)
    } else {
        let Some(parts) = regex!(r"^([^;]*?)\s*;\s*([^;]*?)\s*;\s*([^;]*?)$").captures(&args) else {
            return call.error("invalid 3-part conditional form syntax, format: [init] ; [condition] ; [post]");
        };
        let part = |i: usize| Some(parts[i].trim().to_string()).filter(|p| !p.is_empty());
        (part(1), part(2), part(3))
    };

    let engine = call.engine();
    let max_iterations = engine.config().max_loop_iterations;
    engine.take_abort();
    let _reset = LoopSignalReset(engine);

    if let Some(init) = &init {
        if let Err(err) = engine.evaluate_desugared(init) {
            return call.error(format!("bad init expression: {err}"));
        }
    }

    let output = call.output();
    let mut iterations = 0;
    loop {
        if let Some(condition) = &condition {
            match engine.evaluate_desugared(condition) {
                Ok(value) if value.is_truthy() => {}
                Ok(_) => break,
                Err(err) => return call.error(format!("bad conditional expression: {err}")),
            }
        }

        iterations += 1;
        if iterations > max_iterations {
            return call.error(format!("exceeded configured maximum loop iterations ({max_iterations})"));
        }

        let text = if iterations == 1 { body.strip_prefix('\n').unwrap_or(&body) } else { body.as_str() };
        call.wikify(output, text)?;

        if engine.take_abort() == Some(ScanAbort::Break) {
            break;
        }

        if let Some(post) = &post {
            if let Err(err) = engine.evaluate_desugared(post) {
                return call.error(format!("bad post expression: {err}"));
            }
        }
    }
    Ok(())
}

/// `<<break>>` and `<<continue>>` signal the enclosing `<<for>>` through the scan abort signal.
fn break_continue(call: &mut MacroCall<'_, '_>) -> Result<()> {
    if !call.context().context_some(|ctx| ctx.name == "for") {
        return call.error("must only be used in conjunction with its parent macro <<for>>");
    }
    let signal = if call.name() == "continue" { ScanAbort::Continue } else { ScanAbort::Break };
    tracing::trace!(?signal, "loop signal");
    call.engine().signal_abort(signal);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{Config, Engine, Value};

    fn render(engine: &Engine, source: &str) -> String {
        let doc = engine.wikify(source).unwrap();
        doc.to_html(doc.root())
    }

    #[test]
    fn first_passing_clause_wins() {
        let engine = Engine::with_defaults().unwrap();
        let source = "<<if $n eq 1>>one<<elseif $n gt 1>>many<<else>>none<</if>>";

        engine.set_variable("$n", Value::Number(1.0));
        assert_eq!(render(&engine, source), "one");
        engine.set_variable("$n", Value::Number(7.0));
        assert_eq!(render(&engine, source), "many");
        engine.set_variable("$n", Value::Number(0.0));
        assert_eq!(render(&engine, source), "none");
    }

    #[test]
    fn clause_validation() {
        let engine = Engine::with_defaults().unwrap();
        let cases = [
            ("<<if true>>a<<else>>b<<elseif true>>c<</if>>", "<<if>>: <<else>> must be the final clause"),
            ("<<if>>a<</if>>", "<<if>>: no conditional expression specified for <<if>> clause"),
            ("<<if true>>a<<else if true>>b<</if>>", "<<if>>: whitespace is not allowed between the \"else\" and \"if\" in <<elseif>> clause (#1)"),
        ];
        for (source, expected) in cases {
            let doc = engine.wikify(source).unwrap();
            assert_eq!(doc.errors(doc.root()), vec![expected.to_string()], "{source}");
        }

        let doc = engine.wikify("<<if $a = 1>>x<</if>>").unwrap();
        assert!(doc.errors(doc.root())[0].contains("assignment operator found within <<if>> clause"));
    }

    #[test]
    fn three_part_loop() {
        let engine = Engine::with_defaults().unwrap();
        assert_eq!(render(&engine, "<<for _i to 0; _i lt 3; _i += 1>>[_i]<</for>>"), "[0][1][2]");
        assert_eq!(engine.abort_signal(), None);
    }

    #[test]
    fn break_and_continue() {
        let engine = Engine::with_defaults().unwrap();
        let source = "<<for _i to 0; _i lt 10; _i += 1>><<if _i eq 1>><<continue>><</if>>_i<<if _i gte 3>><<break>><</if>>,<</for>>";
        assert_eq!(render(&engine, source), "0,2,3");
    }

    #[test]
    fn loop_limit_is_reported() {
        let engine = Engine::builder().config(Config { max_loop_iterations: 5, ..Config::default() }).build().unwrap();
        let doc = engine.wikify("<<for>>x<</for>>").unwrap();
        assert_eq!(doc.text_content(doc.root()), "xxxxx");
        assert_eq!(doc.errors(doc.root()), vec!["<<for>>: exceeded configured maximum loop iterations (5)"]);
    }

    #[test]
    fn break_outside_a_loop() {
        let engine = Engine::with_defaults().unwrap();
        let doc = engine.wikify("<<break>>").unwrap();
        assert_eq!(doc.errors(doc.root()), vec!["<<break>>: must only be used in conjunction with its parent macro <<for>>"]);
    }
}
