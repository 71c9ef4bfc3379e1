//! Macro definitions, the name-keyed registry and call dispatch.
//!
//! The `macro` grammar rule hands every `<<` it sees to [`dispatch`]:
//!
//! ```text
//! "<<if $a>>X<<else>>Y<</if>>"
//!    │
//!    ├─ match_open_tag        name "if", args "$a"
//!    ├─ registry lookup       alias → canonical name, or unknown / orphan child tag error
//!    ├─ match_body            (only for macros with child tags) payload clauses
//!    ├─ create_args           typed arguments of the first clause
//!    ├─ push context          InvocationContext { parent: current, .. }
//!    └─ handler(MacroCall)    errors other than registry errors become inline markers
//! ```

use super::context::InvocationContext;
use super::parser::Wikifier;
use super::tag_matcher::{OpenTag, PayloadClause, match_body, match_open_tag};
use crate::error::{Error, MarkupError, RegistryError, Result};
use crate::markup::patterns::MACRO_NAME_EXACT;
use crate::markup::{ArgList, create_args};
use crate::output::{Document, NodeId};
use crate::{Engine, ShadowCallback, Value};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

pub type MacroHandler = Box<dyn Fn(&mut MacroCall<'_, '_>) -> Result<()>>;

/// Which clauses skip argument parsing. Skipped clauses still get `raw` and `full` text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SkipArgs {
    #[default]
    None,
    All,
    Tags(Vec<String>),
}

impl SkipArgs {
    pub fn skips(&self, tag: &str) -> bool {
        match self {
            SkipArgs::None => false,
            SkipArgs::All => true,
            SkipArgs::Tags(tags) => tags.iter().any(|t| t == tag),
        }
    }
}

/// A registered macro.
pub struct MacroDefinition {
    handler: MacroHandler,
    /// `Some` for container macros: the child tags that split the body. `Some(vec![])` is a container
    /// without child clauses.
    pub child_tags: Option<Vec<String>>,
    pub skip_args: SkipArgs,
    /// Marks macros whose handlers set up deferred work.
    pub is_async: bool,
    data: RefCell<HashMap<String, Value>>,
}

impl MacroDefinition {
    pub fn new(handler: impl Fn(&mut MacroCall<'_, '_>) -> Result<()> + 'static) -> Self {
        Self::from_handler(Box::new(handler))
    }

    /// Wraps an already boxed handler, e.g. one picked from a table at runtime.
    pub fn from_handler(handler: MacroHandler) -> Self {
        MacroDefinition {
            handler,
            child_tags: None,
            skip_args: SkipArgs::None,
            is_async: false,
            data: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.child_tags = Some(tags.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn skip_args(mut self, skip: SkipArgs) -> Self {
        self.skip_args = skip;
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    pub fn is_container(&self) -> bool {
        self.child_tags.is_some()
    }

    /// Per-definition data that persists across calls.
    pub fn data(&self) -> &RefCell<HashMap<String, Value>> {
        &self.data
    }
}

impl std::fmt::Debug for MacroDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacroDefinition")
            .field("child_tags", &self.child_tags)
            .field("skip_args", &self.skip_args)
            .field("is_async", &self.is_async)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
struct MacroEntry {
    definition: Rc<MacroDefinition>,
    alias_of: Option<String>,
}

/// Registered macros plus the map from closing and child tags to the macros that own them.
#[derive(Debug, Default)]
pub struct MacroRegistry {
    macros: HashMap<String, MacroEntry>,
    tags: HashMap<String, Vec<String>>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one definition under every name in `names`.
    ///
    /// All names are checked before anything is registered.
    pub fn add(&mut self, names: &[&str], definition: MacroDefinition) -> Result<(), RegistryError> {
        for (i, name) in names.iter().enumerate() {
            self.check_free(name)?;
            if names[..i].contains(name) {
                return Err(RegistryError::Duplicate { kind: "macro", name: name.to_string() });
            }
        }

        let definition = Rc::new(definition);
        for name in names {
            self.macros
                .insert(name.to_string(), MacroEntry { definition: Rc::clone(&definition), alias_of: None });
            if let Some(child_tags) = &definition.child_tags {
                self.register_tags(name, child_tags);
            }
        }
        Ok(())
    }

    /// Registers `name` as another name for `target`.
    pub fn alias(&mut self, name: &str, target: &str) -> Result<(), RegistryError> {
        self.check_free(name)?;
        let Some(entry) = self.macros.get(target) else {
            return Err(RegistryError::UnknownAliasTarget(target.to_string()));
        };
        let canonical = entry.alias_of.clone().unwrap_or_else(|| target.to_string());
        let definition = Rc::clone(&entry.definition);

        if let Some(child_tags) = &definition.child_tags {
            self.register_tags(name, child_tags);
        }
        self.macros.insert(name.to_string(), MacroEntry { definition, alias_of: Some(canonical) });
        Ok(())
    }

    /// Removes a macro and the tags it owns. Child tags cannot be removed on their own.
    pub fn delete(&mut self, name: &str) -> Result<bool, RegistryError> {
        if self.macros.remove(name).is_some() {
            self.unregister_tags(name);
            return Ok(true);
        }
        if let Some(parents) = self.tags.get(name) {
            return Err(RegistryError::ChildTagClash { tag: name.to_string(), parents: parents.join(">>, <<") });
        }
        Ok(false)
    }

    pub fn has(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Rc<MacroDefinition>> {
        self.macros.get(name).map(|entry| Rc::clone(&entry.definition))
    }

    /// Looks a macro up and returns its canonical name alongside the definition.
    pub fn resolve(&self, name: &str) -> Option<(String, Rc<MacroDefinition>)> {
        let entry = self.macros.get(name)?;
        let canonical = entry.alias_of.clone().unwrap_or_else(|| name.to_string());
        Some((canonical, Rc::clone(&entry.definition)))
    }

    /// Macros owning `tag` as a closing or child tag, sorted.
    pub fn tag_parents(&self, tag: &str) -> Option<&[String]> {
        self.tags.get(tag).map(Vec::as_slice)
    }

    pub fn names(&self) -> BTreeSet<&str> {
        self.macros.keys().map(String::as_str).collect()
    }

    fn check_free(&self, name: &str) -> Result<(), RegistryError> {
        if !MACRO_NAME_EXACT.is_match(name) {
            return Err(RegistryError::InvalidMacroName(name.to_string()));
        }
        if self.macros.contains_key(name) {
            return Err(RegistryError::Duplicate { kind: "macro", name: name.to_string() });
        }
        if let Some(parents) = self.tags.get(name) {
            return Err(RegistryError::ChildTagClash { tag: name.to_string(), parents: parents.join(">>, <<") });
        }
        Ok(())
    }

    fn register_tags(&mut self, parent: &str, child_tags: &[String]) {
        let closing = [format!("/{parent}"), format!("end{parent}")];
        for tag in closing.iter().chain(child_tags) {
            let parents = self.tags.entry(tag.clone()).or_default();
            if !parents.iter().any(|p| p == parent) {
                parents.push(parent.to_string());
                parents.sort();
            }
        }
    }

    fn unregister_tags(&mut self, parent: &str) {
        self.tags.retain(|_, parents| {
            parents.retain(|p| p != parent);
            !parents.is_empty()
        });
    }
}

// --- Calls -------------------------------------------------------------------

/// What a macro handler sees: the scan state it was called from plus its own invocation context.
pub struct MacroCall<'w, 'a> {
    wikifier: &'w mut Wikifier<'a>,
    context: Rc<InvocationContext>,
}

impl<'w, 'a> MacroCall<'w, 'a> {
    pub fn engine(&self) -> &'a Engine {
        self.wikifier.engine()
    }

    /// Canonical macro name.
    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn display_name(&self) -> &str {
        &self.context.display_name
    }

    pub fn args(&self) -> &ArgList {
        &self.context.args
    }

    /// Body clauses; empty for macros without child tags.
    pub fn payload(&self) -> &[PayloadClause] {
        self.context.payload.as_deref().unwrap_or(&[])
    }

    pub fn context(&self) -> Rc<InvocationContext> {
        Rc::clone(&self.context)
    }

    pub fn definition(&self) -> &MacroDefinition {
        &self.context.definition
    }

    /// The node this call writes into.
    pub fn output(&self) -> NodeId {
        self.context.output
    }

    pub fn doc(&mut self) -> &mut Document {
        self.wikifier.doc()
    }

    pub fn wikifier(&mut self) -> &mut Wikifier<'a> {
        &mut *self.wikifier
    }

    /// Appends an inline `<<name>>: message` error for this call and returns `Ok`.
    pub fn error(&mut self, message: impl std::fmt::Display) -> Result<()> {
        let message = format!("<<{}>>: {message}", self.context.display_name);
        let output = self.context.output;
        self.wikifier.error(output, &message, &self.context.source);
        Ok(())
    }

    /// Wikifies `source` into `dest` in a nested scan.
    pub fn wikify(&mut self, dest: NodeId, source: &str) -> Result<()> {
        self.wikifier.wikify_into(dest, source)
    }

    /// Shadows `names` for callbacks created below this call. A bad name fails the call, not the wikify.
    pub fn add_shadow<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        self.context.add_shadow(names).map_err(|err| Error::handler(err.to_string()))
    }

    /// Wraps `thunk` so it runs with the shadowed variables of this call and its ancestors.
    pub fn create_shadow_wrapper(&self, thunk: impl Fn(&Engine) -> Result<()> + 'static) -> ShadowCallback {
        let names = self.context.collect_shadow_names();
        self.engine().wrap_with_shadow(names.into_iter().collect(), thunk)
    }
}

/// Handler of the `macro` grammar rule.
pub(crate) fn dispatch(w: &mut Wikifier<'_>) -> Result<()> {
    let source = w.source();
    let match_start = w.match_start;

    let Some(tag) = match_open_tag(source, match_start) else {
        w.output_text(w.output(), match_start, w.next_match);
        return Ok(());
    };
    w.next_match = tag.end;

    match invoke(w, &tag) {
        Ok(()) => Ok(()),
        Err(err @ Error::Registry(_)) => Err(err),
        Err(err) => {
            let message = MarkupError::MacroExecution { name: tag.name.to_string(), message: err.to_string() };
            let end = w.next_match.max(tag.end);
            w.error(w.output(), &message.to_string(), &source[match_start..end]);
            Ok(())
        }
    }
}

fn invoke(w: &mut Wikifier<'_>, tag: &OpenTag<'_>) -> Result<()> {
    let engine = w.engine();
    let source = w.source();

    let Some((name, definition)) = engine.resolve_macro(tag.name) else {
        let err = match engine.tag_parents(tag.name) {
            Some(parents) => MarkupError::OrphanChildTag { tag: tag.name.to_string(), parents },
            None => MarkupError::UnknownMacro(tag.name.to_string()),
        };
        w.error(w.output(), &err.to_string(), tag.source);
        return Ok(());
    };

    let payload = match &definition.child_tags {
        None => None,
        Some(child_tags) => {
            let make_args = |clause: &str, raw: &str| create_args(engine, raw, definition.skip_args.skips(clause));
            match match_body(source, tag, Some(child_tags.as_slice()), make_args) {
                Ok((payload, end)) => {
                    w.next_match = end;
                    Some(payload)
                }
                Err(err @ MarkupError::UnclosedMacro(_)) => {
                    let shown = format!("{}\u{2026}", tag.source);
                    w.error(w.output(), &err.to_string(), &shown);
                    return Ok(());
                }
                Err(err @ MarkupError::MalformedMacroTag { resume_at, .. }) => {
                    w.next_match = resume_at;
                    return Err(err.into());
                }
                Err(err) => return Err(err.into()),
            }
        }
    };

    let args = match payload.as_ref().and_then(|clauses| clauses.first()) {
        Some(first) => first.args.clone(),
        None => create_args(engine, tag.args, definition.skip_args.skips(&name))?,
    };

    let context = Rc::new(InvocationContext {
        display_name: tag.name.to_string(),
        name,
        definition: Rc::clone(&definition),
        args,
        payload,
        source: source[tag.start..w.next_match].to_string(),
        parent: engine.current_context(),
        output: w.output(),
        shadows: RefCell::new(BTreeSet::new()),
    });

    tracing::debug!(
        name = %context.name,
        args = %context.args.raw,
        clauses = context.payload.as_ref().map_or(0, Vec::len),
        is_async = definition.is_async,
        "invoking macro"
    );
    engine.record_macro_call(&context.name);

    let _guard = engine.enter_context(Some(Rc::clone(&context)));
    let mut call = MacroCall { wikifier: w, context };
    (definition.handler)(&mut call)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> MacroDefinition {
        MacroDefinition::new(|_| Ok(()))
    }

    #[test]
    fn boxed_handlers_register_from_the_crate_root() {
        fn shout(call: &mut MacroCall<'_, '_>) -> Result<()> {
            let output = call.output();
            call.doc().append_text(output, "HEY");
            Ok(())
        }

        let handler: crate::MacroHandler = Box::new(shout);
        let engine = crate::Engine::with_defaults().unwrap();
        engine.register_macro(&["shout"], crate::MacroDefinition::from_handler(handler)).unwrap();

        let doc = engine.wikify("<<shout>>!").unwrap();
        assert_eq!(doc.to_html(doc.root()), "HEY!");
    }

    #[test]
    fn names_are_validated_and_unique() {
        let mut reg = MacroRegistry::new();
        reg.add(&["print", "="], noop()).unwrap();

        assert!(matches!(reg.add(&["print"], noop()), Err(RegistryError::Duplicate { .. })));
        assert!(matches!(reg.add(&["1up"], noop()), Err(RegistryError::InvalidMacroName(_))));
        assert!(matches!(reg.add(&["a", "a"], noop()), Err(RegistryError::Duplicate { .. })));
        assert!(!reg.has("a"));
        assert!(Rc::ptr_eq(&reg.get("print").unwrap(), &reg.get("=").unwrap()));
    }

    #[test]
    fn containers_register_closing_and_child_tags() {
        let mut reg = MacroRegistry::new();
        reg.add(&["if"], noop().with_tags(&["elseif", "else"])).unwrap();
        reg.add(&["switch"], noop().with_tags(&["case", "default"])).unwrap();
        reg.add(&["pick"], noop().with_tags(&["case"])).unwrap();

        for tag in ["/if", "endif", "elseif", "else"] {
            assert_eq!(reg.tag_parents(tag), Some(&["if".to_string()][..]), "{tag}");
        }
        assert_eq!(reg.tag_parents("case").unwrap(), ["pick", "switch"]);

        match reg.add(&["else"], noop()) {
            Err(RegistryError::ChildTagClash { tag, parents }) => {
                assert_eq!(tag, "else");
                assert_eq!(parents, "if");
            }
            other => panic!("expected a child tag clash, got {other:?}"),
        }
    }

    #[test]
    fn delete_unregisters_owned_tags() {
        let mut reg = MacroRegistry::new();
        reg.add(&["switch"], noop().with_tags(&["case"])).unwrap();
        reg.add(&["pick"], noop().with_tags(&["case"])).unwrap();

        assert!(matches!(reg.delete("case"), Err(RegistryError::ChildTagClash { .. })));
        assert_eq!(reg.delete("switch"), Ok(true));
        assert_eq!(reg.tag_parents("case").unwrap(), ["pick"]);
        assert!(reg.tag_parents("/switch").is_none());
        assert_eq!(reg.delete("switch"), Ok(false));
    }

    #[test]
    fn aliases_resolve_to_the_canonical_name() {
        let mut reg = MacroRegistry::new();
        reg.add(&["print"], noop()).unwrap();
        reg.alias("say", "print").unwrap();
        reg.alias("speak", "say").unwrap();

        assert_eq!(reg.resolve("speak").map(|(name, _)| name), Some("print".to_string()));
        assert_eq!(reg.resolve("print").map(|(name, _)| name), Some("print".to_string()));
        assert_eq!(reg.alias("x", "missing"), Err(RegistryError::UnknownAliasTarget("missing".into())));
    }

    #[test]
    fn skip_args_policy() {
        assert!(!SkipArgs::None.skips("if"));
        assert!(SkipArgs::All.skips("anything"));
        let tags = SkipArgs::Tags(vec!["if".into(), "elseif".into()]);
        assert!(tags.skips("elseif"));
        assert!(!tags.skips("else"));
    }

    #[test]
    fn instance_data_persists() {
        let def = noop();
        def.data().borrow_mut().insert("count".into(), Value::Number(1.0));
        assert_eq!(def.data().borrow().get("count"), Some(&Value::Number(1.0)));
    }
}
