//! Markup-level building blocks used by the scan loop and the grammar rules.
//!
//! ```text
//! "<<link [[Go|Cave][$seen to true]]>>"
//!          │
//!          ├─ args.rs       argument lexer + coercion        → Value::Link(LinkArg)
//!          │    └─ brackets.rs   [[...]] / [img[...]] lexer
//!          │    └─ lexer.rs      shared state-function lexer
//!          ├─ desugar.rs    `$seen to true` → `State.variables.seen = true`
//!          ├─ helpers.rs    link text / passage evaluation, inline CSS
//!          └─ patterns.rs   shared regex fragments
//! ```
//!
//! Nothing here touches the output tree directly except the link helpers; lexers report failures as values
//! and the calling rule decides how to surface them.

#[path = "markup/args.rs"]
mod args;
#[path = "markup/brackets.rs"]
mod brackets;
#[path = "markup/desugar.rs"]
mod desugar;
#[path = "markup/helpers.rs"]
mod helpers;
#[path = "markup/lexer.rs"]
mod lexer;
#[path = "markup/patterns.rs"]
pub(crate) mod patterns;

pub use args::{ArgList, create_args, parse_args};
pub use brackets::{SquareBracketMarkup, parse_square_bracketed};
pub use desugar::desugar;
pub use helpers::{
    InlineCss, create_external_link, create_internal_link, eval_passage_id, eval_text, image_passage, inline_css,
    is_external_link,
};
