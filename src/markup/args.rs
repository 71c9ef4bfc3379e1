//! Macro argument lexing and coercion.
//!
//! A raw argument string is split into tokens by a small state machine and each token is coerced into a
//! [`Value`]:
//!
//! ```text
//! <<link [[Go|Cave]] `$gold * 2` "a \"quoted\" word" $name 42 true>>
//!        └ SquareBracket  └ Expression  └ String        └ Bareword (x3)
//! ```
//!
//! | token           | coercion                                                               |
//! |-----------------|------------------------------------------------------------------------|
//! | `$name`, `_tmp` | current value from the variable store                                  |
//! | `setup.x`       | evaluated                                                              |
//! | `null` ... `NaN`| the literal value                                                      |
//! | numeric         | number, when it parses as one                                          |
//! | other barewords | string                                                                 |
//! | `` `expr` ``    | evaluated expression, `undefined` when empty                           |
//! | `"..."`, `'...'`| string with escapes resolved                                           |
//! | `[[...]]`       | [`LinkArg`], `[img[...]]` [`ImageArg`]                                 |

use super::brackets::{parse_square_bracketed, slurp_quote};
use super::desugar::desugar;
use super::helpers::{eval_passage_id, eval_text, image_passage, is_external_link};
use super::lexer::{Lexer, StateFn};
use super::patterns::VARIABLE_PREFIX;
use crate::error::{LexError, MarkupError};
use crate::value::{ImageArg, LinkArg, parse_number};
use crate::{Engine, Value};
use std::ops::Deref;

/// Coerced macro arguments plus the raw and desugared argument text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgList {
    values: Vec<Value>,
    /// The argument text exactly as written.
    pub raw: String,
    /// The argument text after desugaring, for macros that evaluate it as a single expression.
    pub full: String,
}

impl ArgList {
    pub fn new(values: Vec<Value>, raw: &str) -> Self {
        ArgList { values, raw: raw.to_string(), full: desugar(raw) }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl Deref for ArgList {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        &self.values
    }
}

/// Builds the argument list for one macro tag. With `skip` set the string is not lexed at all and only the
/// raw and desugared text are kept.
pub fn create_args(engine: &Engine, raw: &str, skip: bool) -> Result<ArgList, MarkupError> {
    let values = if skip { Vec::new() } else { parse_args(engine, raw)? };
    Ok(ArgList::new(values, raw))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Item {
    Error,
    Bareword,
    Expression,
    String,
    SquareBracket,
}

type State<'a> = Option<StateFn<'a, Item, ()>>;
type ArgLexer<'a> = Lexer<'a, Item, ()>;

fn lex_space<'a>(lexer: &mut ArgLexer<'a>) -> State<'a> {
    let offset = lexer.source[lexer.pos..].find(|c: char| !c.is_whitespace())?;
    if offset != 0 {
        lexer.pos += offset;
        lexer.ignore();
    }

    let next: fn(&mut ArgLexer<'a>) -> State<'a> = match lexer.next() {
        Some('`') => lex_expression as fn(&mut ArgLexer<'a>) -> State<'a>,
        Some('"') => lex_double_quote as fn(&mut ArgLexer<'a>) -> State<'a>,
        Some('\'') => lex_single_quote as fn(&mut ArgLexer<'a>) -> State<'a>,
        Some('[') => lex_square_bracket as fn(&mut ArgLexer<'a>) -> State<'a>,
        _ => lex_bareword as fn(&mut ArgLexer<'a>) -> State<'a>,
    };
    Some(StateFn(next))
}

fn lex_expression<'a>(lexer: &mut ArgLexer<'a>) -> State<'a> {
    if !slurp_quote(lexer, '`') {
        return lexer.error(Item::Error, "unterminated backquote expression");
    }
    lexer.emit(Item::Expression);
    Some(StateFn(lex_space))
}

fn lex_double_quote<'a>(lexer: &mut ArgLexer<'a>) -> State<'a> {
    if !slurp_quote(lexer, '"') {
        return lexer.error(Item::Error, "unterminated double quoted string");
    }
    lexer.emit(Item::String);
    Some(StateFn(lex_space))
}

fn lex_single_quote<'a>(lexer: &mut ArgLexer<'a>) -> State<'a> {
    if !slurp_quote(lexer, '\'') {
        return lexer.error(Item::Error, "unterminated single quoted string");
    }
    lexer.emit(Item::String);
    Some(StateFn(lex_space))
}

fn lex_square_bracket<'a>(lexer: &mut ArgLexer<'a>) -> State<'a> {
    const IMG_META: &str = "<>IiMmGg";

    let what = if lexer.accept(IMG_META) {
        lexer.accept_run(IMG_META);
        "image"
    } else {
        "link"
    };

    if !lexer.accept("[") {
        return lexer.error(Item::Error, format!("malformed {what} markup"));
    }

    // Both opening brackets.
    lexer.depth = 2;

    loop {
        match lexer.next() {
            Some('\\') => match lexer.next() {
                None | Some('\n') => return lexer.error(Item::Error, format!("unterminated {what} markup")),
                Some(_) => {}
            },
            None | Some('\n') => return lexer.error(Item::Error, format!("unterminated {what} markup")),
            Some('[') => lexer.depth += 1,
            Some(']') => {
                lexer.depth -= 1;
                if lexer.depth < 0 {
                    return lexer.error(Item::Error, "unexpected right square bracket \"]\"");
                }
                if lexer.depth == 1 {
                    if lexer.next() == Some(']') {
                        lexer.depth -= 1;
                        break;
                    }
                    lexer.backup();
                }
            }
            Some(_) => {}
        }
    }

    lexer.emit(Item::SquareBracket);
    Some(StateFn(lex_space))
}

fn lex_bareword<'a>(lexer: &mut ArgLexer<'a>) -> State<'a> {
    match lexer.source[lexer.pos..].find(char::is_whitespace) {
        Some(offset) => {
            lexer.pos += offset;
            lexer.emit(Item::Bareword);
            Some(StateFn(lex_space))
        }
        None => {
            lexer.pos = lexer.source.len();
            lexer.emit(Item::Bareword);
            None
        }
    }
}

/// Lexes and coerces every argument in `raw`.
pub fn parse_args(engine: &Engine, raw: &str) -> Result<Vec<Value>, MarkupError> {
    let mut lexer = Lexer::new(raw, ());
    let items = lexer.run(StateFn(lex_space));
    let mut args = Vec::with_capacity(items.len());

    for item in items {
        let text = item.text;
        let value = match item.kind {
            Item::Error => {
                let message = item.message.clone().unwrap_or_default();
                return Err(match message.strip_prefix("unterminated ") {
                    Some(what) => MarkupError::UnterminatedLiteral { raw: text.to_string(), what: what.to_string() },
                    None => MarkupError::ArgumentParse { raw: text.to_string(), message },
                });
            }
            Item::Bareword => coerce_bareword(engine, text)?,
            Item::Expression => {
                let expr = text[1..text.len() - 1].trim();
                if expr.is_empty() {
                    Value::Undefined
                } else {
                    // Parenthesized so an object-literal-looking expression is not read as a block.
                    engine.evaluate(&format!("({expr})")).map_err(|err| MarkupError::ExpressionEvaluation {
                        expr: expr.to_string(),
                        message: err.to_string(),
                    })?
                }
            }
            Item::String => engine.evaluate_desugared(text).map_err(|err| MarkupError::ArgumentParse {
                raw: text.to_string(),
                message: err.to_string(),
            })?,
            Item::SquareBracket => coerce_square_bracket(engine, text)?,
        };
        args.push(value);
    }

    Ok(args)
}

fn coerce_bareword(engine: &Engine, text: &str) -> Result<Value, MarkupError> {
    if VARIABLE_PREFIX.is_match(text) {
        return engine
            .evaluate(text)
            .map_err(|err| MarkupError::ArgumentParse { raw: text.to_string(), message: err.to_string() });
    }

    if regex!(r"^(?:settings|setup)[.\[]").is_match(text) {
        return engine
            .evaluate(text)
            .map_err(|err| MarkupError::ArgumentParse { raw: text.to_string(), message: err.to_string() });
    }

    Ok(match text {
        "null" => Value::Null,
        "undefined" => Value::Undefined,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "NaN" => Value::Number(f64::NAN),
        _ => match parse_number(text) {
            Some(n) => Value::Number(n),
            None => Value::str(text),
        },
    })
}

fn coerce_square_bracket(engine: &Engine, text: &str) -> Result<Value, MarkupError> {
    let parse_error = |err: LexError| MarkupError::ArgumentParse { raw: text.to_string(), message: err.to_string() };

    let markup = parse_square_bracketed(text, 0).map_err(parse_error)?;
    if markup.pos < text.len() {
        return Err(parse_error(LexError::TrailingInput { rest: text[markup.pos..].to_string(), pos: markup.pos }));
    }

    let setter = markup.setter.as_deref().map(desugar);

    if markup.is_link {
        let link = eval_passage_id(engine, markup.link.as_deref().unwrap_or_default());
        let text = match markup.text.as_deref() {
            Some(text) => eval_text(engine, text),
            None => link.clone(),
        };
        let external = !markup.force_internal && is_external_link(engine, &link);
        let count = if markup.text.is_some() { 2 } else { 1 };
        return Ok(Value::Link(Box::new(LinkArg { link, text, count, external, setter })));
    }

    let mut source = eval_passage_id(engine, markup.source.as_deref().unwrap_or_default());
    let mut passage = None;
    if let Some(image) = image_passage(engine, &source) {
        passage = Some(image.title.clone());
        source = image.text.clone();
    }

    let link = markup.link.as_deref().map(|link| eval_passage_id(engine, link));
    let external = link.as_deref().is_some_and(|link| !markup.force_internal && is_external_link(engine, link));

    Ok(Value::Image(Box::new(ImageArg {
        source,
        title: markup.text.as_deref().map(|text| eval_text(engine, text)),
        align: markup.align,
        passage,
        link,
        external,
        setter,
    })))
}
