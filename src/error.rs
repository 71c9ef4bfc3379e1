//! Error types.
//!
//! Errors fall into two families:
//!
//! - **Recoverable markup errors** ([`MarkupError`]): problems in authored passage text. The scan loop turns
//!   them into inline error nodes at the offending location and keeps going.
//! - **Registry errors** ([`RegistryError`]): programmer errors made while registering grammar rules or
//!   macros. These are returned to the caller and never rendered.
//!
//! [`Error`] is the crate-wide union returned by the public API and by macro handlers.

use thiserror::Error;

/// Errors raised by the literal and square-bracket lexers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated {0}")]
    Unterminated(String),

    #[error("malformed {0}")]
    Malformed(String),

    #[error("unexpected right square bracket \"]\"")]
    UnexpectedBracket,

    #[error("unexpected character(s) \"{rest}\" (pos: {pos})")]
    TrailingInput { rest: String, pos: usize },
}

/// Recoverable problems found in passage markup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarkupError {
    #[error("unable to parse macro argument \"{raw}\": unterminated {what}")]
    UnterminatedLiteral { raw: String, what: String },

    #[error("malformed closing tag: \"{tag}\"")]
    MalformedMacroTag {
        tag: String,
        /// Offset just past the malformed tag's name, where scanning resumes.
        resume_at: usize,
    },

    #[error("cannot find a closing tag for macro <<{0}>>")]
    UnclosedMacro(String),

    #[error("macro <<{0}>> does not exist")]
    UnknownMacro(String),

    #[error("child tag <<{tag}>> was found outside of a call to its parent macro{}", parent_list(.parents))]
    OrphanChildTag { tag: String, parents: Vec<String> },

    #[error("bad evaluation of expression \"{expr}\": {message}")]
    ExpressionEvaluation { expr: String, message: String },

    #[error("unable to parse macro argument \"{raw}\": {message}")]
    ArgumentParse { raw: String, message: String },

    #[error("cannot execute macro <<{name}>>: {message}")]
    MacroExecution { name: String, message: String },

    #[error("maximum markup nesting depth ({0}) exceeded")]
    CallDepth(usize),
}

fn parent_list(parents: &[String]) -> String {
    match parents.len() {
        0 => String::new(),
        1 => format!(" <<{}>>", parents[0]),
        _ => {
            let names: Vec<String> = parents.iter().map(|p| format!("<<{p}>>")).collect();
            format!(" {}", names.join(" or "))
        }
    }
}

/// Errors raised while registering grammar rules and macros.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{kind} \"{name}\" is already registered")]
    Duplicate { kind: &'static str, name: String },

    #[error("grammar rule \"{name}\" has an invalid match fragment: {reason}")]
    InvalidRule { name: String, reason: String },

    #[error("invalid macro name \"{0}\"")]
    InvalidMacroName(String),

    #[error("cannot use tag \"{tag}\": it is a child tag of <<{parents}>>")]
    ChildTagClash { tag: String, parents: String },

    #[error("cannot alias <<{0}>>: no such macro")]
    UnknownAliasTarget(String),

    #[error("invalid variable name \"{0}\"")]
    InvalidShadowName(String),
}

/// Failures reported by an [`Evaluator`](crate::Evaluator).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("{0} is not defined")]
    Reference(String),

    #[error("type error: {0}")]
    Type(String),
}

/// Crate-wide error type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Markup(#[from] MarkupError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Lex(#[from] LexError),

    /// Free-form failure raised by a macro or grammar rule handler.
    #[error("{0}")]
    Handler(String),

    /// Aggregated inline errors, returned by the strict wikify entry point.
    #[error("{}", .errors.join("; "))]
    Wikify { errors: Vec<String> },
}

impl Error {
    /// Shorthand for a handler failure with a message.
    pub fn handler(message: impl Into<String>) -> Self {
        Error::Handler(message.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orphan_child_tag_lists_parents() {
        let one = MarkupError::OrphanChildTag { tag: "else".into(), parents: vec!["if".into()] };
        assert_eq!(one.to_string(), "child tag <<else>> was found outside of a call to its parent macro <<if>>");

        let two = MarkupError::OrphanChildTag { tag: "case".into(), parents: vec!["switch".into(), "pick".into()] };
        assert!(two.to_string().ends_with("<<switch>> or <<pick>>"));
    }

    #[test]
    fn wikify_error_joins_messages() {
        let err = Error::Wikify { errors: vec!["a".into(), "b".into()] };
        assert_eq!(err.to_string(), "a; b");
    }
}
