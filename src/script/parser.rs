//! Pratt parser for desugared expressions.
//!
//! Precedence levels (low to high):
//!  1. Sequence (`,` and `;`)
//!  2. Assignment (`=`, `+=`, `-=`, `*=`, `/=`, `%=`), right-associative
//!  3. Ternary (`? :`)
//!  4. Nullish coalescing (`??`)
//!  5. Logical OR (`||`)
//!  6. Logical AND (`&&`)
//!  7. Equality (`==`, `!=`, `===`, `!==`)
//!  8. Relational (`<`, `<=`, `>`, `>=`)
//!  9. Additive (`+`, `-`)
//! 10. Multiplicative (`*`, `/`, `%`)
//! 11. Unary prefix (`!`, `-`, `+`, `typeof`)
//! 12. Member access (`.`, `[]`)

use super::lexer::Tok;
use crate::Value;
use crate::error::EvalError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Lit(Value),
    Ident(String),
    Member { object: Box<Expr>, property: Box<Expr> },
    Template(Vec<TemplatePart>),
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Logical { op: LogicalOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Ternary { cond: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
    Assign { op: Option<BinaryOp>, target: Box<Expr>, value: Box<Expr> },
    Sequence(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TemplatePart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicalOp {
    And,
    Or,
    Nullish,
}

/// Binding powers (left, right). Higher binds tighter.
#[derive(Debug, Clone, Copy)]
struct Bp(u8, u8);

const BP_SEQ: Bp = Bp(1, 2);
const BP_ASSIGN: Bp = Bp(4, 3);
const BP_TERNARY: Bp = Bp(6, 5);
const BP_NULLISH: Bp = Bp(7, 8);
const BP_LOR: Bp = Bp(9, 10);
const BP_LAND: Bp = Bp(11, 12);
const BP_EQ: Bp = Bp(13, 14);
const BP_REL: Bp = Bp(15, 16);
const BP_ADD: Bp = Bp(17, 18);
const BP_MUL: Bp = Bp(19, 20);
const BP_PREFIX: u8 = 21;
const BP_MEMBER: u8 = 23;

pub(crate) struct Parser {
    toks: Vec<Tok>,
    pos: usize,
}

impl Parser {
    pub(crate) fn new(toks: Vec<Tok>) -> Self {
        Parser { toks, pos: 0 }
    }

    /// Parses the whole token stream as one (possibly sequenced) expression.
    pub(crate) fn parse_program(mut self) -> Result<Expr, EvalError> {
        if self.peek() == &Tok::Eof {
            return Ok(Expr::Lit(Value::Undefined));
        }
        let expr = self.parse_bp(0)?;
        match self.peek() {
            Tok::Eof => Ok(expr),
            tok => Err(EvalError::Syntax(format!("unexpected token {}", describe(tok)))),
        }
    }

    fn peek(&self) -> &Tok {
        self.toks.get(self.pos).unwrap_or(&Tok::Eof)
    }

    fn bump(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.toks.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, punct: &'static str) -> Result<(), EvalError> {
        match self.bump() {
            Tok::Punct(p) if p == punct => Ok(()),
            tok => Err(EvalError::Syntax(format!("expected '{punct}', found {}", describe(&tok)))),
        }
    }

    fn parse_bp(&mut self, min_bp: u8) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let Tok::Punct(op) = *self.peek() else { break };

            match op {
                "." if BP_MEMBER >= min_bp => {
                    self.bump();
                    let property = match self.bump() {
                        Tok::Ident(name) => name,
                        tok => return Err(EvalError::Syntax(format!("expected property name, found {}", describe(&tok)))),
                    };
                    lhs = Expr::Member { object: Box::new(lhs), property: Box::new(Expr::Lit(Value::Str(property))) };
                    continue;
                }
                "[" if BP_MEMBER >= min_bp => {
                    self.bump();
                    let property = self.parse_bp(0)?;
                    self.expect("]")?;
                    lhs = Expr::Member { object: Box::new(lhs), property: Box::new(property) };
                    continue;
                }
                "(" => return Err(EvalError::Type("function calls are not supported".into())),
                _ => {}
            }

            if let Some(bp) = assign_bp(op) {
                if bp.0 < min_bp {
                    break;
                }
                self.bump();
                let value = self.parse_bp(bp.1)?;
                lhs = Expr::Assign { op: compound_op(op), target: Box::new(lhs), value: Box::new(value) };
                continue;
            }

            if op == "?" {
                if BP_TERNARY.0 < min_bp {
                    break;
                }
                self.bump();
                let then = self.parse_bp(BP_ASSIGN.1)?;
                self.expect(":")?;
                let otherwise = self.parse_bp(BP_TERNARY.1)?;
                lhs = Expr::Ternary { cond: Box::new(lhs), then: Box::new(then), otherwise: Box::new(otherwise) };
                continue;
            }

            if op == "," || op == ";" {
                if BP_SEQ.0 < min_bp {
                    break;
                }
                self.bump();
                // Trailing separators are allowed: `a = 1;`
                if matches!(self.peek(), Tok::Eof | Tok::Punct(")") | Tok::Punct("]")) {
                    continue;
                }
                let rhs = self.parse_bp(BP_SEQ.1)?;
                lhs = match lhs {
                    Expr::Sequence(mut items) => {
                        items.push(rhs);
                        Expr::Sequence(items)
                    }
                    other => Expr::Sequence(vec![other, rhs]),
                };
                continue;
            }

            if let Some((logical, bp)) = logical_op(op) {
                if bp.0 < min_bp {
                    break;
                }
                self.bump();
                let rhs = self.parse_bp(bp.1)?;
                lhs = Expr::Logical { op: logical, lhs: Box::new(lhs), rhs: Box::new(rhs) };
                continue;
            }

            if let Some((binary, bp)) = binary_op(op) {
                if bp.0 < min_bp {
                    break;
                }
                self.bump();
                let rhs = self.parse_bp(bp.1)?;
                lhs = Expr::Binary { op: binary, lhs: Box::new(lhs), rhs: Box::new(rhs) };
                continue;
            }

            break;
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, EvalError> {
        match self.bump() {
            Tok::Number(n) => Ok(Expr::Lit(Value::Number(n))),
            Tok::Str(s) => Ok(Expr::Lit(Value::Str(s))),
            Tok::Template(raw) => parse_template(&raw),
            Tok::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Lit(Value::Bool(true)),
                "false" => Expr::Lit(Value::Bool(false)),
                "null" => Expr::Lit(Value::Null),
                "undefined" => Expr::Lit(Value::Undefined),
                "NaN" => Expr::Lit(Value::Number(f64::NAN)),
                "Infinity" => Expr::Lit(Value::Number(f64::INFINITY)),
                "typeof" => {
                    let operand = self.parse_bp(BP_PREFIX)?;
                    Expr::Unary { op: UnaryOp::TypeOf, operand: Box::new(operand) }
                }
                _ => Expr::Ident(name),
            }),
            Tok::Punct("(") => {
                let inner = self.parse_bp(0)?;
                self.expect(")")?;
                Ok(inner)
            }
            Tok::Punct(op @ ("!" | "-" | "+")) => {
                let operand = self.parse_bp(BP_PREFIX)?;
                let op = match op {
                    "!" => UnaryOp::Not,
                    "-" => UnaryOp::Neg,
                    _ => UnaryOp::Plus,
                };
                Ok(Expr::Unary { op, operand: Box::new(operand) })
            }
            tok => Err(EvalError::Syntax(format!("unexpected token {}", describe(&tok)))),
        }
    }
}

fn assign_bp(op: &str) -> Option<Bp> {
    matches!(op, "=" | "+=" | "-=" | "*=" | "/=" | "%=").then_some(BP_ASSIGN)
}

fn compound_op(op: &str) -> Option<BinaryOp> {
    match op {
        "+=" => Some(BinaryOp::Add),
        "-=" => Some(BinaryOp::Sub),
        "*=" => Some(BinaryOp::Mul),
        "/=" => Some(BinaryOp::Div),
        "%=" => Some(BinaryOp::Rem),
        _ => None,
    }
}

fn logical_op(op: &str) -> Option<(LogicalOp, Bp)> {
    match op {
        "&&" => Some((LogicalOp::And, BP_LAND)),
        "||" => Some((LogicalOp::Or, BP_LOR)),
        "??" => Some((LogicalOp::Nullish, BP_NULLISH)),
        _ => None,
    }
}

fn binary_op(op: &str) -> Option<(BinaryOp, Bp)> {
    let pair = match op {
        "+" => (BinaryOp::Add, BP_ADD),
        "-" => (BinaryOp::Sub, BP_ADD),
        "*" => (BinaryOp::Mul, BP_MUL),
        "/" => (BinaryOp::Div, BP_MUL),
        "%" => (BinaryOp::Rem, BP_MUL),
        "==" => (BinaryOp::Eq, BP_EQ),
        "!=" => (BinaryOp::NotEq, BP_EQ),
        "===" => (BinaryOp::StrictEq, BP_EQ),
        "!==" => (BinaryOp::StrictNotEq, BP_EQ),
        "<" => (BinaryOp::Lt, BP_REL),
        "<=" => (BinaryOp::LtEq, BP_REL),
        ">" => (BinaryOp::Gt, BP_REL),
        ">=" => (BinaryOp::GtEq, BP_REL),
        _ => return None,
    };
    Some(pair)
}

/// Splits template text into literal runs and `${...}` expressions.
fn parse_template(raw: &str) -> Result<Expr, EvalError> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut chars = raw.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        match ch {
            '\\' => {
                if let Some((_, esc)) = chars.next() {
                    text.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                }
            }
            '$' if chars.peek().is_some_and(|&(_, c)| c == '{') => {
                chars.next();
                let start = idx + 2;
                let mut depth = 1;
                let mut end = None;
                for (j, c) in chars.by_ref() {
                    match c {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                end = Some(j);
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                let end = end.ok_or_else(|| EvalError::Syntax("unterminated template interpolation".into()))?;
                if !text.is_empty() {
                    parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                }
                let toks = super::lexer::tokenize(&raw[start..end])?;
                parts.push(TemplatePart::Expr(Parser::new(toks).parse_program()?));
            }
            c => text.push(c),
        }
    }

    if !text.is_empty() {
        parts.push(TemplatePart::Text(text));
    }
    Ok(Expr::Template(parts))
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Number(n) => crate::value::format_number(*n),
        Tok::Str(s) => format!("\"{s}\""),
        Tok::Template(_) => "template literal".to_string(),
        Tok::Ident(name) => name.clone(),
        Tok::Punct(p) => format!("'{p}'"),
        Tok::Eof => "end of input".to_string(),
    }
}
