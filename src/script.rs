//! Expression evaluation.
//!
//! The engine never interprets expressions itself; it hands desugared code to an [`Evaluator`]. Hosts with
//! a real script runtime plug theirs in through [`EngineBuilder::evaluator`](crate::EngineBuilder::evaluator).
//! [`ScriptEvaluator`] is the built-in reference implementation. It understands the dialect the desugarer
//! produces:
//!
//! ```text
//! State.variables.gold += 10        story variable  ($gold)
//! State.temporary.i < 3             temporary       (_i)
//! "undefined" !== typeof State.variables.key
//! setup.difficulty === "hard"       host value registered with ScriptEvaluator::define
//! `You have ${State.variables.gold} coins`
//! ```
//!
//! Function calls, object/array literals and property writes other than story variables are rejected.

#[path = "script/lexer.rs"]
mod lexer;
#[path = "script/parser.rs"]
mod parser;

use crate::error::EvalError;
use crate::state::{VariableStore, is_variable_name};
use crate::Value;
use parser::{BinaryOp, Expr, LogicalOp, Parser, TemplatePart, UnaryOp};
use std::collections::BTreeMap;

/// Evaluates desugared expression code against a variable store.
pub trait Evaluator {
    fn evaluate(&self, code: &str, vars: &mut dyn VariableStore) -> Result<Value, EvalError>;
}

/// Built-in evaluator for the desugared expression dialect.
#[derive(Debug, Clone, Default)]
pub struct ScriptEvaluator {
    /// Host values reachable as `setup.*` / `settings.*`, keyed by their dotted path.
    globals: BTreeMap<String, Value>,
}

impl ScriptEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a host value under a dotted path such as `setup.difficulty`.
    pub fn define(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.globals.insert(path.to_string(), value.into());
        self
    }
}

impl Evaluator for ScriptEvaluator {
    fn evaluate(&self, code: &str, vars: &mut dyn VariableStore) -> Result<Value, EvalError> {
        let toks = lexer::tokenize(code)?;
        let expr = Parser::new(toks).parse_program()?;
        tracing::trace!(code, "evaluating expression");
        Interp { globals: &self.globals, vars }.eval(&expr)
    }
}

/// Where a member chain points.
enum Place {
    Variable(String),
    Global(String),
}

struct Interp<'a> {
    globals: &'a BTreeMap<String, Value>,
    vars: &'a mut dyn VariableStore,
}

impl Interp<'_> {
    fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Lit(value) => Ok(value.clone()),
            Expr::Ident(_) | Expr::Member { .. } => self.read(expr),
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => out.push_str(text),
                        TemplatePart::Expr(inner) => out.push_str(&self.eval(inner)?.to_string()),
                    }
                }
                Ok(Value::Str(out))
            }
            Expr::Unary { op: UnaryOp::TypeOf, operand } => {
                // `typeof` on an undeclared name is "undefined", not an error.
                let value = match self.read(operand) {
                    Err(EvalError::Reference(_)) => Value::Undefined,
                    other => other?,
                };
                Ok(Value::str(value.type_name()))
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus | UnaryOp::TypeOf => Value::Number(value.to_number()),
                })
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                Ok(binary(*op, &lhs, &rhs))
            }
            Expr::Logical { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let short = match op {
                    LogicalOp::And => !lhs.is_truthy(),
                    LogicalOp::Or => lhs.is_truthy(),
                    LogicalOp::Nullish => !matches!(lhs, Value::Undefined | Value::Null),
                };
                if short { Ok(lhs) } else { self.eval(rhs) }
            }
            Expr::Ternary { cond, then, otherwise } => {
                if self.eval(cond)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Assign { op, target, value } => {
                let place = self.place(target)?;
                let mut value = self.eval(value)?;
                if let Some(op) = op {
                    let current = self.read(target)?;
                    value = binary(*op, &current, &value);
                }
                match place {
                    Place::Variable(name) => self.vars.set(&name, value.clone()),
                    Place::Global(path) => return Err(EvalError::Type(format!("cannot assign to {path}"))),
                }
                Ok(value)
            }
            Expr::Sequence(items) => {
                let mut last = Value::Undefined;
                for item in items {
                    last = self.eval(item)?;
                }
                Ok(last)
            }
        }
    }

    /// Reads an identifier or member chain.
    fn read(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Ident(name) => {
                if is_variable_name(name) {
                    return Ok(self.vars.get(name).unwrap_or_default());
                }
                match name.as_str() {
                    "State" | "setup" | "settings" => Err(EvalError::Type(format!("{name} is not a value"))),
                    _ => Err(EvalError::Reference(name.clone())),
                }
            }
            Expr::Member { object, property } => {
                if let Ok(place) = self.place(expr) {
                    return Ok(match place {
                        Place::Variable(name) => self.vars.get(&name).unwrap_or_default(),
                        Place::Global(path) => self.globals.get(&path).cloned().unwrap_or_default(),
                    });
                }
                let object = self.eval(object)?;
                let property = self.eval(property)?.to_string();
                property_of(&object, &property)
            }
            other => self.eval(other),
        }
    }

    /// Resolves a member chain rooted at `State.variables`, `State.temporary`, `setup` or `settings`.
    fn place(&mut self, expr: &Expr) -> Result<Place, EvalError> {
        let mut path = Vec::new();
        self.flatten(expr, &mut path)?;

        match path.as_slice() {
            [root, ns, name] if root == "State" && ns == "variables" => Ok(Place::Variable(format!("${name}"))),
            [root, ns, name] if root == "State" && ns == "temporary" => Ok(Place::Variable(format!("_{name}"))),
            [single] if is_variable_name(single) => Ok(Place::Variable(single.clone())),
            [root, ..] if path.len() > 1 && (root == "setup" || root == "settings") => Ok(Place::Global(path.join("."))),
            _ => Err(EvalError::Syntax(format!("invalid reference {}", path.join(".")))),
        }
    }

    fn flatten(&mut self, expr: &Expr, path: &mut Vec<String>) -> Result<(), EvalError> {
        match expr {
            Expr::Ident(name) => {
                path.push(name.clone());
                Ok(())
            }
            Expr::Member { object, property } => {
                self.flatten(object, path)?;
                let key = match property.as_ref() {
                    Expr::Lit(value) => value.to_string(),
                    computed => self.eval(computed)?.to_string(),
                };
                path.push(key);
                Ok(())
            }
            _ => Err(EvalError::Syntax("invalid assignment target".into())),
        }
    }
}

fn property_of(object: &Value, property: &str) -> Result<Value, EvalError> {
    match (object, property) {
        (Value::Str(s), "length") => Ok(Value::Number(s.chars().count() as f64)),
        (Value::Undefined | Value::Null, _) => {
            Err(EvalError::Type(format!("cannot read property \"{property}\" of {object}")))
        }
        (Value::Link(link), "link") => Ok(Value::str(link.link.clone())),
        (Value::Link(link), "text") => Ok(Value::str(link.text.clone())),
        (Value::Image(image), "source") => Ok(Value::str(image.source.clone())),
        _ => Ok(Value::Undefined),
    }
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    match op {
        BinaryOp::Add => match (lhs, rhs) {
            (Value::Str(_), _) | (_, Value::Str(_)) => Value::Str(format!("{lhs}{rhs}")),
            _ => Value::Number(lhs.to_number() + rhs.to_number()),
        },
        BinaryOp::Sub => Value::Number(lhs.to_number() - rhs.to_number()),
        BinaryOp::Mul => Value::Number(lhs.to_number() * rhs.to_number()),
        BinaryOp::Div => Value::Number(lhs.to_number() / rhs.to_number()),
        BinaryOp::Rem => Value::Number(lhs.to_number() % rhs.to_number()),
        BinaryOp::Eq => Value::Bool(loose_eq(lhs, rhs)),
        BinaryOp::NotEq => Value::Bool(!loose_eq(lhs, rhs)),
        BinaryOp::StrictEq => Value::Bool(strict_eq(lhs, rhs)),
        BinaryOp::StrictNotEq => Value::Bool(!strict_eq(lhs, rhs)),
        BinaryOp::Lt => Value::Bool(compare(lhs, rhs).is_some_and(|o| o.is_lt())),
        BinaryOp::LtEq => Value::Bool(compare(lhs, rhs).is_some_and(|o| o.is_le())),
        BinaryOp::Gt => Value::Bool(compare(lhs, rhs).is_some_and(|o| o.is_gt())),
        BinaryOp::GtEq => Value::Bool(compare(lhs, rhs).is_some_and(|o| o.is_ge())),
    }
}

fn strict_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a == b,
        _ => lhs == rhs,
    }
}

fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Number(_) | Value::Str(_) | Value::Bool(_), Value::Number(_) | Value::Str(_) | Value::Bool(_)) => {
            lhs.to_number() == rhs.to_number()
        }
        _ => lhs == rhs,
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Option<std::cmp::Ordering> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => lhs.to_number().partial_cmp(&rhs.to_number()),
    }
}
