//! Everything `EngineBuilder::build` registers unless the builder is `bare()`.

pub(crate) mod macros;
pub(crate) mod markup;

use crate::Engine;
use crate::error::RegistryError;

pub(crate) fn register_builtins(engine: &Engine) -> Result<(), RegistryError> {
    let rules = markup::get();
    tracing::debug!(count = rules.len(), "registering built-in grammar rules");
    for rule in rules {
        engine.register_grammar_rule(rule)?;
    }
    macros::register(engine)
}
