//! Markup interpretation engine.
//!
//! This module is the *public entry point* for turning passage markup into output. The engine is split
//! into focused submodules under `src/engine/`; the types handlers need are re-exported here.
//!
//! ## How the parts work together
//!
//! ```text
//! grammar rules ──┐
//!                 │  ParserRegistry::compile          (compiled_rules.rs)
//!                 └──────────────┬──────────────
//!                                │ Profile { rules, (?m)(r1)|(r2)|... }
//!                                v
//! source ───────────────> Wikifier::sub_wikify        (parser.rs)
//!                          - nearest rule vs. terminator
//!                          - emit text between matches
//!                          - call the winning rule's handler
//!                                │ "<<"
//!                                v
//!                          dispatch                   (macro_registry.rs)
//!                          - match_open_tag / match_body (tag_matcher.rs)
//!                          - create_args              (markup::args)
//!                          - push InvocationContext   (context.rs)
//!                          - MacroDefinition handler
//!                                │
//!                                v
//!                           Document (output tree), ShadowCallbacks for later
//! ```
//!
//! ## Responsibilities by module
//!
//! - `compiled_rules.rs`: the ordered grammar rule list and the per-profile combined patterns.
//! - `parser.rs`: the scan loop ([`Wikifier`]) that all grammar rules run inside of.
//! - `tag_matcher.rs`: `<<name args>>` recognition and body clause splitting.
//! - `macro_registry.rs`: macro definitions, aliases, child tag bookkeeping and call dispatch.
//! - `context.rs`: the invocation context chain and shadowed deferred callbacks.
//! - `metrics.rs`: rule hit and macro call counters for `wikify_verbose`.
//!
//! ## Process state
//!
//! The engine owns all state that outlives a single call: the current context pointer, the option stack,
//! the abort signal and the nesting depth. Every piece of it is restored by a guard or by the scan loop
//! itself, so a failing handler leaves the engine as it found it. The engine is single-threaded (`!Sync`)
//! and registries are expected to be populated before the first wikify.
//!
//! ## Debugging
//!
//! Everything interesting is logged through `tracing`: profile compilation and macro dispatch at `debug`,
//! individual rule matches and shadow application at `trace`.

#[path = "engine/compiled_rules.rs"]
mod compiled_rules;
#[path = "engine/context.rs"]
mod context;
#[path = "engine/macro_registry.rs"]
mod macro_registry;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/parser.rs"]
mod parser;
#[path = "engine/tag_matcher.rs"]
mod tag_matcher;

pub use compiled_rules::{ParserRegistry, Profile, ProfileName, ProfileSet};
pub use context::{ContextGuard, InvocationContext, ShadowCallback};
pub use macro_registry::{MacroCall, MacroDefinition, MacroHandler, MacroRegistry, SkipArgs};
pub use metrics::ScanMetrics;
pub use parser::Wikifier;
pub use tag_matcher::{OpenTag, PayloadClause, match_body, match_open_tag};

pub(crate) use macro_registry::dispatch;

use crate::api::{Config, OptionOverrides, Options};
use crate::error::{Error, EvalError, MarkupError, RegistryError, Result};
use crate::markup::desugar;
use crate::output::{Document, NodeId};
use crate::script::{Evaluator, ScriptEvaluator};
use crate::state::{PassageStore, Story, VariableStore, Variables};
use crate::{GrammarRule, Value};
use regex::Regex;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

/// Signal set by loop macros to unwind the scans below them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanAbort {
    Break,
    Continue,
}

/// The markup engine: registries, collaborators and process state.
pub struct Engine {
    config: Config,
    parsers: RefCell<ParserRegistry>,
    macros: RefCell<MacroRegistry>,
    vars: RefCell<Box<dyn VariableStore>>,
    evaluator: Box<dyn Evaluator>,
    story: Box<dyn PassageStore>,
    context: RefCell<Option<Rc<InvocationContext>>>,
    abort: Cell<Option<ScanAbort>>,
    option_stack: RefCell<Vec<OptionOverrides>>,
    terminators: RefCell<HashMap<(String, bool), Regex>>,
    metrics: RefCell<ScanMetrics>,
    depth: Cell<usize>,
}

/// Builder for an [`Engine`] with custom collaborators.
pub struct EngineBuilder {
    config: Config,
    story: Box<dyn PassageStore>,
    store: Box<dyn VariableStore>,
    evaluator: Box<dyn Evaluator>,
    builtins: bool,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        EngineBuilder {
            config: Config::default(),
            story: Box::new(Story::new()),
            store: Box::new(Variables::new()),
            evaluator: Box::new(ScriptEvaluator::new()),
            builtins: true,
        }
    }
}

impl EngineBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn story(mut self, story: impl PassageStore + 'static) -> Self {
        self.story = Box::new(story);
        self
    }

    pub fn store(mut self, store: impl VariableStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Box::new(evaluator);
        self
    }

    /// Skips registering the built-in grammar rules and macros.
    pub fn bare(mut self) -> Self {
        self.builtins = false;
        self
    }

    pub fn build(self) -> Result<Engine, RegistryError> {
        let builtins = self.builtins;
        let engine = self.assemble();
        if builtins {
            crate::rules::register_builtins(&engine)?;
        }
        Ok(engine)
    }

    fn assemble(self) -> Engine {
        Engine {
            config: self.config,
            parsers: RefCell::new(ParserRegistry::new()),
            macros: RefCell::new(MacroRegistry::new()),
            vars: RefCell::new(self.store),
            evaluator: self.evaluator,
            story: self.story,
            context: RefCell::new(None),
            abort: Cell::new(None),
            option_stack: RefCell::new(Vec::new()),
            terminators: RefCell::new(HashMap::new()),
            metrics: RefCell::new(ScanMetrics::default()),
            depth: Cell::new(0),
        }
    }
}

impl Engine {
    /// An engine with in-memory collaborators and no rules or macros registered.
    pub fn new(config: Config) -> Self {
        EngineBuilder { config, ..EngineBuilder::default() }.assemble()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// In-memory collaborators plus every built-in grammar rule and macro.
    pub fn with_defaults() -> Result<Self, RegistryError> {
        Self::builder().build()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn story(&self) -> &dyn PassageStore {
        self.story.as_ref()
    }

    // --- Variables and evaluation ---------------------------------------------

    pub fn variable(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name)
    }

    pub fn set_variable(&self, name: &str, value: Value) {
        self.vars.borrow_mut().set(name, value);
    }

    pub fn remove_variable(&self, name: &str) -> Option<Value> {
        self.vars.borrow_mut().remove(name)
    }

    /// Desugars `code` and evaluates it.
    pub fn evaluate(&self, code: &str) -> Result<Value, EvalError> {
        self.evaluate_desugared(&desugar(code))
    }

    /// Evaluates code that is already in the evaluator's dialect.
    pub fn evaluate_desugared(&self, code: &str) -> Result<Value, EvalError> {
        let mut vars = self.vars.borrow_mut();
        self.evaluator.evaluate(code, vars.as_mut())
    }

    // --- Grammar rules --------------------------------------------------------

    pub fn register_grammar_rule(&self, rule: GrammarRule) -> Result<(), RegistryError> {
        tracing::debug!(name = %rule.name, pattern = %rule.pattern, "registering grammar rule");
        self.parsers.borrow_mut().register(rule)
    }

    pub fn unregister_grammar_rule(&self, name: &str) -> bool {
        self.parsers.borrow_mut().unregister(name).is_some()
    }

    pub fn has_grammar_rule(&self, name: &str) -> bool {
        self.parsers.borrow().has(name)
    }

    pub fn grammar_rule_names(&self) -> Vec<String> {
        self.parsers.borrow().names().map(str::to_string).collect()
    }

    pub fn compile_profile(&self, name: ProfileName) -> Result<Rc<Profile>, RegistryError> {
        self.parsers.borrow_mut().compile(name)
    }

    /// Drops compiled profiles so rule changes take effect.
    pub fn invalidate_profiles(&self) {
        self.parsers.borrow_mut().invalidate();
    }

    pub(crate) fn terminator_regex(&self, pattern: &str, ignore_case: bool) -> Result<Regex> {
        let key = (pattern.to_string(), ignore_case);
        if let Some(re) = self.terminators.borrow().get(&key) {
            return Ok(re.clone());
        }
        let re = parser::compile_terminator(pattern, ignore_case)?;
        self.terminators.borrow_mut().insert(key, re.clone());
        Ok(re)
    }

    // --- Macros ---------------------------------------------------------------

    pub fn register_macro(&self, names: &[&str], definition: MacroDefinition) -> Result<(), RegistryError> {
        tracing::debug!(?names, "registering macro");
        self.macros.borrow_mut().add(names, definition)
    }

    pub fn alias_macro(&self, name: &str, target: &str) -> Result<(), RegistryError> {
        self.macros.borrow_mut().alias(name, target)
    }

    pub fn has_macro(&self, name: &str) -> bool {
        self.macros.borrow().has(name)
    }

    pub fn get_macro(&self, name: &str) -> Option<Rc<MacroDefinition>> {
        self.macros.borrow().get(name)
    }

    /// Returns whether a macro was removed. Removing a child tag is an error.
    pub fn unregister_macro(&self, name: &str) -> Result<bool, RegistryError> {
        self.macros.borrow_mut().delete(name)
    }

    /// Macros that own `tag` as a closing or child tag.
    pub fn tag_parents(&self, tag: &str) -> Option<Vec<String>> {
        self.macros.borrow().tag_parents(tag).map(<[String]>::to_vec)
    }

    pub(crate) fn resolve_macro(&self, name: &str) -> Option<(String, Rc<MacroDefinition>)> {
        self.macros.borrow().resolve(name)
    }

    // --- Wikify ---------------------------------------------------------------

    /// Wikifies `source` into a fresh document. Markup problems become inline error markers.
    pub fn wikify(&self, source: &str) -> Result<Document> {
        let mut doc = Document::new();
        let root = doc.root();
        self.wikify_into(&mut doc, root, source)?;
        Ok(doc)
    }

    /// Wikifies `source`, appending to `dest` in an existing document.
    pub fn wikify_into(&self, doc: &mut Document, dest: NodeId, source: &str) -> Result<()> {
        self.run_wikifier(doc, dest, source, self.default_options())
    }

    /// Strict variant of [`wikify`](Self::wikify): inline error markers are collected into [`Error::Wikify`].
    pub fn wikify_eval(&self, source: &str) -> Result<Document> {
        let doc = self.wikify(source)?;
        let errors = doc.errors(doc.root());
        if errors.is_empty() { Ok(doc) } else { Err(Error::Wikify { errors }) }
    }

    /// Wikifies with fresh metrics and returns them alongside the document.
    pub fn wikify_verbose(&self, source: &str) -> Result<(Document, ScanMetrics)> {
        self.metrics.replace(ScanMetrics::default());
        let start = Instant::now();
        let doc = self.wikify(source)?;
        let mut metrics = self.take_metrics();
        metrics.total = start.elapsed();
        Ok((doc, metrics))
    }

    pub(crate) fn default_options(&self) -> Options {
        Options { nobr: self.config.nobr, ..Options::default() }
    }

    pub(crate) fn run_wikifier(
        &self,
        doc: &mut Document,
        dest: NodeId,
        source: &str,
        options: Options,
    ) -> Result<()> {
        let depth = self.depth.get() + 1;
        if depth > self.config.max_call_depth {
            let message = MarkupError::CallDepth(self.config.max_call_depth).to_string();
            tracing::debug!(depth, "wikify nesting limit reached");
            self.record_error();
            doc.append_error(dest, &message, source);
            return Ok(());
        }
        if depth == 1 {
            self.abort.set(None);
        }

        let _depth = DepthGuard::enter(&self.depth);
        self.metrics.borrow_mut().record_depth(depth);

        let mut w = Wikifier::new(self, doc, source, options, dest);
        w.sub_wikify(dest, None, None)
    }

    // --- Abort signal ---------------------------------------------------------

    pub fn signal_abort(&self, signal: ScanAbort) {
        self.abort.set(Some(signal));
    }

    pub fn abort_signal(&self) -> Option<ScanAbort> {
        self.abort.get()
    }

    /// Clears the signal, returning it.
    pub fn take_abort(&self) -> Option<ScanAbort> {
        self.abort.take()
    }

    // --- Contexts and shadows -------------------------------------------------

    pub fn current_context(&self) -> Option<Rc<InvocationContext>> {
        self.context.borrow().clone()
    }

    /// Makes `context` current until the returned guard is dropped.
    pub fn enter_context(&self, context: Option<Rc<InvocationContext>>) -> ContextGuard<'_> {
        let previous = self.context.replace(context);
        ContextGuard { engine: self, previous }
    }

    /// Shadows `names` in the current macro context.
    pub fn add_shadow<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        let Some(context) = self.current_context() else {
            return Err(Error::handler("cannot shadow variables outside of a macro call"));
        };
        context.add_shadow(names)?;
        Ok(())
    }

    /// Shadow names of the current context and its ancestors, sorted.
    pub fn collect_shadow_names(&self) -> Vec<String> {
        self.current_context().map(|ctx| ctx.collect_shadow_names().into_iter().collect()).unwrap_or_default()
    }

    /// Wraps `thunk` with a snapshot of `names` taken now, bound to the current context.
    pub fn wrap_with_shadow(
        &self,
        names: Vec<String>,
        thunk: impl Fn(&Engine) -> Result<()> + 'static,
    ) -> ShadowCallback {
        ShadowCallback::new(self, names, Box::new(thunk))
    }

    /// Callback that evaluates already desugared setter `code` under the current shadow names.
    pub fn shadow_setter(&self, code: String) -> ShadowCallback {
        self.wrap_with_shadow(self.collect_shadow_names(), move |engine| {
            engine.evaluate_desugared(&code)?;
            Ok(())
        })
    }

    // --- Options --------------------------------------------------------------

    /// Pushes overrides applied to every scan until popped.
    pub fn push_options(&self, overrides: OptionOverrides) {
        self.option_stack.borrow_mut().push(overrides);
    }

    pub fn pop_options(&self) -> Option<OptionOverrides> {
        self.option_stack.borrow_mut().pop()
    }

    /// The option stack merged bottom to top.
    pub fn option_overrides(&self) -> OptionOverrides {
        self.option_stack.borrow().iter().fold(OptionOverrides::default(), |acc, o| acc.merged(o))
    }

    // --- Metrics --------------------------------------------------------------

    pub(crate) fn record_rule_hit(&self, name: &str) {
        self.metrics.borrow_mut().record_rule(name);
    }

    pub(crate) fn record_macro_call(&self, name: &str) {
        self.metrics.borrow_mut().record_macro(name);
    }

    pub(crate) fn record_scan(&self) {
        self.metrics.borrow_mut().scans += 1;
    }

    pub(crate) fn record_error(&self) {
        self.metrics.borrow_mut().errors += 1;
    }

    /// Returns the metrics collected so far and resets them.
    pub fn take_metrics(&self) -> ScanMetrics {
        self.metrics.take()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("grammar_rules", &self.parsers.borrow().len())
            .field("macros", &self.macros.borrow().names().len())
            .field("depth", &self.depth.get())
            .finish_non_exhaustive()
    }
}

struct DepthGuard<'a>(&'a Cell<usize>);

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        DepthGuard(depth)
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_stack_merges_top_down() {
        let engine = Engine::new(Config::default());
        engine.push_options(OptionOverrides { nobr: Some(true), ..Default::default() });
        engine.push_options(OptionOverrides { profile: Some(ProfileName::Core), ..Default::default() });

        let merged = engine.option_overrides();
        assert_eq!(merged.nobr, Some(true));
        assert_eq!(merged.profile, Some(ProfileName::Core));

        engine.pop_options();
        engine.pop_options();
        assert_eq!(engine.option_overrides(), OptionOverrides::default());
    }

    #[test]
    fn runaway_nesting_becomes_an_inline_error() {
        let engine = Engine::new(Config { max_call_depth: 5, ..Config::default() });
        engine
            .register_grammar_rule(GrammarRule::new("again", "again", |w, _| {
                let out = w.output();
                w.wikify_into(out, "again")
            }))
            .unwrap();

        let doc = engine.wikify("again").unwrap();
        assert_eq!(doc.errors(doc.root()), vec!["maximum markup nesting depth (5) exceeded"]);
        assert_eq!(engine.depth.get(), 0);
    }

    #[test]
    fn strict_wikify_collects_errors() {
        let engine = Engine::with_defaults().unwrap();
        match engine.wikify_eval("a <<nope>> b <<nada>>") {
            Err(Error::Wikify { errors }) => {
                assert_eq!(errors, vec!["macro <<nope>> does not exist", "macro <<nada>> does not exist"]);
            }
            other => panic!("expected collected errors, got {other:?}"),
        }
        assert!(engine.wikify_eval("fine").is_ok());
    }

    #[test]
    fn verbose_wikify_reports_metrics() {
        let engine = Engine::with_defaults().unwrap();
        let (_, metrics) = engine.wikify_verbose("''a'' <<set $x to 1>>").unwrap();
        assert_eq!(metrics.rule_hits.get("formatByChar"), Some(&1));
        assert_eq!(metrics.macro_calls.get("set"), Some(&1));
        assert_eq!(metrics.max_depth, 1);
        assert_eq!(engine.take_metrics(), ScanMetrics::default());
    }

    #[test]
    fn shadow_outside_a_macro_fails() {
        let engine = Engine::new(Config::default());
        assert!(engine.add_shadow(&["$x"]).is_err());
        assert!(engine.collect_shadow_names().is_empty());
    }

    #[test]
    fn shadow_setter_runs_under_the_snapshot() {
        let engine = Engine::with_defaults().unwrap();
        engine.set_variable("$gold", Value::Number(5.0));
        let setter = engine.shadow_setter(desugar("$gold += 1"));
        setter.call(&engine).unwrap();
        assert_eq!(engine.variable("$gold"), Some(Value::Number(6.0)));
    }

    #[test]
    fn evaluation_goes_through_the_desugarer() {
        let engine = Engine::with_defaults().unwrap();
        engine.set_variable("$a", Value::Number(2.0));
        assert_eq!(engine.evaluate("$a gt 1 and not false"), Ok(Value::Bool(true)));
        assert!(engine.evaluate_desugared("$a gt 1").is_err());
    }
}
