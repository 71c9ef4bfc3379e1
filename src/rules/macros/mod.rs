//! Built-in macros.
//!
//! Each submodule registers a related group; names, aliases and child tags are fixed here, so a host that
//! registers its own macro under one of these names gets a duplicate error from `Engine::build`.

mod control;
mod links;
mod output;
mod variables;

use crate::Engine;
use crate::error::RegistryError;

pub(super) fn register(engine: &Engine) -> Result<(), RegistryError> {
    variables::register(engine)?;
    control::register(engine)?;
    output::register(engine)?;
    links::register(engine)?;
    Ok(())
}
