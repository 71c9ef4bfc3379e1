extern crate self as storymark;

use regex::Regex;

#[macro_use]
mod macros;
mod api;
mod engine;
mod error;
pub mod markup;
pub mod output;
mod rules;
pub mod script;
pub mod state;
mod value;

pub use api::{
    Config, OptionOverrides, Options, RuleHit, WikifyDetails, WikifyResult, WikifyResultVerbose, wikify, wikify_verbose,
    wikify_verbose_with, wikify_with,
};
pub use engine::{
    ContextGuard, Engine, EngineBuilder, InvocationContext, MacroCall, MacroDefinition, MacroHandler, OpenTag,
    PayloadClause, Profile, ProfileName, ProfileSet, ScanAbort, ScanMetrics, ShadowCallback, SkipArgs, Wikifier,
    match_body, match_open_tag,
};
pub use error::{Error, EvalError, LexError, MarkupError, RegistryError, Result};
pub use output::{Document, NodeId, NodeKind};
pub use script::{Evaluator, ScriptEvaluator};
pub use state::{Passage, PassageStore, Story, VariableStore, Variables};
pub use value::{Align, ImageArg, LinkArg, Value};

// --- Grammar rules -----------------------------------------------------------

/// Callback invoked when a rule's fragment wins a scan position.
///
/// On entry `Wikifier::match_start`/`match_length` describe the match and `next_match` points at its end;
/// the handler consumes whatever it needs and leaves `next_match` at the resume position.
pub type RuleHandler = Box<dyn Fn(&mut Wikifier<'_>, &GrammarRule) -> Result<()>>;

/// A named markup rule: a capture-free match fragment plus the handler that consumes the match.
///
/// Built-in rules are declared with the `rule!` macro; hosts can also construct them with
/// [`GrammarRule::new`] and register them through [`Engine::register_grammar_rule`].
pub struct GrammarRule {
    pub name: String,
    /// Regex fragment tried at every scan position. Must not contain capturing groups.
    pub pattern: String,
    /// Profiles the rule belongs to; empty means every profile.
    pub profiles: ProfileSet,
    /// Secondary pattern some handlers run at the match start to read the full construct.
    pub lookahead: Option<Regex>,
    /// Closing pattern the handler hands to `sub_wikify`, for rules that wrap nested markup.
    pub terminator: Option<&'static str>,
    pub handler: RuleHandler,
}

impl GrammarRule {
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        handler: impl Fn(&mut Wikifier<'_>, &GrammarRule) -> Result<()> + 'static,
    ) -> Self {
        GrammarRule {
            name: name.into(),
            pattern: pattern.into(),
            profiles: ProfileSet::empty(),
            lookahead: None,
            terminator: None,
            handler: Box::new(handler),
        }
    }

    pub fn with_profiles(mut self, profiles: ProfileSet) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_lookahead(mut self, lookahead: Regex) -> Self {
        self.lookahead = Some(lookahead);
        self
    }

    pub fn with_terminator(mut self, terminator: &'static str) -> Self {
        self.terminator = Some(terminator);
        self
    }
}

impl std::fmt::Debug for GrammarRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrammarRule")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .field("profiles", &self.profiles)
            .field("terminator", &self.terminator)
            .field("handler", &"<function>")
            .finish()
    }
}
