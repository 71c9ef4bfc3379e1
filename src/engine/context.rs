//! Invocation contexts and shadowed deferred callbacks.
//!
//! Every macro call pushes an [`InvocationContext`] whose `parent` is the context that was current when the
//! call started, so the chain mirrors the macro nesting:
//!
//! ```text
//! <<for _i to 0; _i lt 3; _i++>>        ctx(for)   shadows {}
//!   <<capture _i>>                       ctx(capture) shadows {_i}  parent → for
//!     <<link "Pick">>...<</link>>        ctx(link)  parent → capture
//! ```
//!
//! A callback created inside `<<link>>` wraps the union of shadow names along the chain (`_i`) with the
//! values they had at wrap time. Invoking it later overlays those values, runs the body, writes back what
//! the body changed and restores the live bindings. Restoration happens in `Drop`, so an error or a panic
//! in the body cannot leave the store or the context pointer modified.

use super::macro_registry::MacroDefinition;
use super::tag_matcher::PayloadClause;
use crate::error::{RegistryError, Result};
use crate::markup::ArgList;
use crate::output::NodeId;
use crate::state::is_variable_name;
use crate::{Engine, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

/// One macro call: what was called, with which arguments, from where.
pub struct InvocationContext {
    /// Canonical macro name (the alias target when called through an alias).
    pub name: String,
    /// Name as written in the source.
    pub display_name: String,
    pub definition: Rc<MacroDefinition>,
    pub args: ArgList,
    pub payload: Option<Vec<PayloadClause>>,
    /// The full source of the call, tags and body included.
    pub source: String,
    pub parent: Option<Rc<InvocationContext>>,
    /// Output node the macro writes into.
    pub output: NodeId,
    pub(crate) shadows: RefCell<BTreeSet<String>>,
}

impl InvocationContext {
    /// Enclosing contexts, innermost first. Does not include `self`.
    pub fn ancestors(&self) -> impl Iterator<Item = &InvocationContext> {
        std::iter::successors(self.parent.as_deref(), |ctx| ctx.parent.as_deref())
    }

    pub fn context_find(&self, pred: impl Fn(&InvocationContext) -> bool) -> Option<&InvocationContext> {
        self.ancestors().find(|ctx| pred(ctx))
    }

    pub fn context_some(&self, pred: impl Fn(&InvocationContext) -> bool) -> bool {
        self.ancestors().any(|ctx| pred(ctx))
    }

    pub fn context_filter(&self, pred: impl Fn(&InvocationContext) -> bool) -> Vec<&InvocationContext> {
        self.ancestors().filter(|ctx| pred(ctx)).collect()
    }

    /// Records variable names to shadow in callbacks created below this context.
    ///
    /// Every name is validated before any is recorded.
    pub fn add_shadow<S: AsRef<str>>(&self, names: &[S]) -> Result<(), RegistryError> {
        if let Some(bad) = names.iter().map(AsRef::as_ref).find(|n| !is_variable_name(n)) {
            return Err(RegistryError::InvalidShadowName(bad.to_string()));
        }
        let mut shadows = self.shadows.borrow_mut();
        shadows.extend(names.iter().map(|n| n.as_ref().to_string()));
        Ok(())
    }

    pub fn shadows(&self) -> Vec<String> {
        self.shadows.borrow().iter().cloned().collect()
    }

    /// Shadow names of this context and all of its ancestors.
    pub fn collect_shadow_names(&self) -> BTreeSet<String> {
        let mut names = self.shadows.borrow().clone();
        for ctx in self.ancestors() {
            names.extend(ctx.shadows.borrow().iter().cloned());
        }
        names
    }
}

impl std::fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationContext")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .field("args", &self.args.raw)
            .field("source", &self.source)
            .field("parent", &self.parent.as_ref().map(|p| p.name.as_str()))
            .field("shadows", &self.shadows.borrow())
            .finish()
    }
}

/// Restores the engine's current context pointer when dropped.
#[must_use = "the previous context is restored when the guard is dropped"]
pub struct ContextGuard<'e> {
    pub(super) engine: &'e Engine,
    pub(super) previous: Option<Rc<InvocationContext>>,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        *self.engine.context.borrow_mut() = self.previous.take();
    }
}

/// A deferred callback that runs with the variable values captured when it was created.
pub struct ShadowCallback {
    context: Option<Rc<InvocationContext>>,
    snapshot: RefCell<BTreeMap<String, Option<Value>>>,
    thunk: Box<dyn Fn(&Engine) -> Result<()>>,
}

impl ShadowCallback {
    pub(crate) fn new(
        engine: &Engine,
        names: impl IntoIterator<Item = String>,
        thunk: Box<dyn Fn(&Engine) -> Result<()>>,
    ) -> Self {
        let snapshot = names.into_iter().map(|name| {
            let value = engine.variable(&name);
            (name, value)
        });
        ShadowCallback { context: engine.current_context(), snapshot: RefCell::new(snapshot.collect()), thunk }
    }

    /// Names covered by the snapshot.
    pub fn names(&self) -> Vec<String> {
        self.snapshot.borrow().keys().cloned().collect()
    }

    /// The value the next call will see for `name`; `None` when it is unbound or not shadowed.
    pub fn shadowed_value(&self, name: &str) -> Option<Value> {
        self.snapshot.borrow().get(name).cloned().flatten()
    }

    pub fn call(&self, engine: &Engine) -> Result<()> {
        let saved: Vec<(String, Option<Value>)> =
            self.snapshot.borrow().keys().map(|name| (name.clone(), engine.variable(name))).collect();

        tracing::trace!(names = ?saved.iter().map(|(n, _)| n).collect::<Vec<_>>(), "applying shadow snapshot");
        for (name, value) in self.snapshot.borrow().iter() {
            rebind(engine, name, value.clone());
        }

        let _restore = ShadowRestore { engine, snapshot: &self.snapshot, saved };
        let _context = engine.enter_context(self.context.clone());
        (self.thunk)(engine)
    }
}

impl std::fmt::Debug for ShadowCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowCallback")
            .field("context", &self.context.as_ref().map(|c| c.name.as_str()))
            .field("snapshot", &self.snapshot.borrow())
            .finish_non_exhaustive()
    }
}

/// Writes the values left by the thunk back into the snapshot, then restores the live bindings.
struct ShadowRestore<'a> {
    engine: &'a Engine,
    snapshot: &'a RefCell<BTreeMap<String, Option<Value>>>,
    saved: Vec<(String, Option<Value>)>,
}

impl Drop for ShadowRestore<'_> {
    fn drop(&mut self) {
        let mut snapshot = self.snapshot.borrow_mut();
        for (name, live) in self.saved.drain(..) {
            snapshot.insert(name.clone(), self.engine.variable(&name));
            rebind(self.engine, &name, live);
        }
    }
}

fn rebind(engine: &Engine, name: &str, value: Option<Value>) {
    match value {
        Some(value) => engine.set_variable(name, value),
        None => {
            engine.remove_variable(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MacroDefinition;
    use std::cell::Cell;

    fn context(engine: &Engine, name: &str) -> Rc<InvocationContext> {
        Rc::new(InvocationContext {
            name: name.into(),
            display_name: name.into(),
            definition: Rc::new(MacroDefinition::new(|_| Ok(()))),
            args: ArgList::default(),
            payload: None,
            source: format!("<<{name}>>"),
            parent: engine.current_context(),
            output: crate::Document::new().root(),
            shadows: RefCell::new(BTreeSet::new()),
        })
    }

    #[test]
    fn shadow_round_trip() {
        let engine = Engine::builder().build().unwrap();
        engine.set_variable("$x", Value::Number(1.0));

        let seen = Rc::new(Cell::new(0.0));
        let seen_in = Rc::clone(&seen);
        let callback = engine.wrap_with_shadow(vec!["$x".into()], move |engine| {
            seen_in.set(engine.variable("$x").map_or(f64::NAN, |v| v.to_number()));
            Ok(())
        });

        engine.set_variable("$x", Value::Number(2.0));
        callback.call(&engine).unwrap();

        assert_eq!(seen.get(), 1.0);
        assert_eq!(engine.variable("$x"), Some(Value::Number(2.0)));
    }

    #[test]
    fn snapshot_keeps_changes_between_calls() {
        let engine = Engine::builder().build().unwrap();
        engine.set_variable("_n", Value::Number(0.0));
        let callback = engine.wrap_with_shadow(vec!["_n".into()], |engine| {
            let n = engine.variable("_n").map_or(0.0, |v| v.to_number());
            engine.set_variable("_n", Value::Number(n + 1.0));
            Ok(())
        });
        engine.remove_variable("_n");

        callback.call(&engine).unwrap();
        callback.call(&engine).unwrap();

        assert_eq!(callback.shadowed_value("_n"), Some(Value::Number(2.0)));
        assert_eq!(engine.variable("_n"), None);
    }

    #[test]
    fn failing_thunk_still_restores() {
        let engine = Engine::builder().build().unwrap();
        engine.set_variable("$x", Value::str("captured"));
        let callback = engine.wrap_with_shadow(vec!["$x".into(), "$unbound".into()], |engine| {
            engine.set_variable("$unbound", Value::Bool(true));
            Err(crate::Error::handler("boom"))
        });
        engine.set_variable("$x", Value::str("live"));

        assert!(callback.call(&engine).is_err());
        assert_eq!(engine.variable("$x"), Some(Value::str("live")));
        assert_eq!(engine.variable("$unbound"), None);
        assert!(engine.current_context().is_none());
    }

    #[test]
    fn guard_restores_previous_context() {
        let engine = Engine::builder().build().unwrap();
        let outer = context(&engine, "outer");
        {
            let _outer = engine.enter_context(Some(Rc::clone(&outer)));
            let inner = context(&engine, "inner");
            {
                let _inner = engine.enter_context(Some(Rc::clone(&inner)));
                assert_eq!(engine.current_context().unwrap().name, "inner");
            }
            assert_eq!(engine.current_context().unwrap().name, "outer");
        }
        assert!(engine.current_context().is_none());
    }

    #[test]
    fn shadow_names_union_the_chain() {
        let engine = Engine::builder().build().unwrap();
        let outer = context(&engine, "for");
        outer.add_shadow(&["_i"]).unwrap();
        let _guard = engine.enter_context(Some(Rc::clone(&outer)));
        let inner = context(&engine, "capture");
        inner.add_shadow(&["$a", "_j"]).unwrap();

        let names: Vec<String> = inner.collect_shadow_names().into_iter().collect();
        assert_eq!(names, vec!["$a", "_i", "_j"]);
        assert!(inner.context_some(|c| c.name == "for"));
        assert!(inner.context_find(|c| c.name == "capture").is_none());
        assert_eq!(inner.context_filter(|_| true).len(), 1);
    }

    #[test]
    fn invalid_shadow_names_are_rejected() {
        let engine = Engine::builder().build().unwrap();
        let ctx = context(&engine, "capture");
        assert_eq!(ctx.add_shadow(&["$ok", "nope"]), Err(RegistryError::InvalidShadowName("nope".into())));
        assert!(ctx.shadows().is_empty());
    }
}
