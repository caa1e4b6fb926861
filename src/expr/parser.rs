//! Parser for the expression DSL.
//!
//! The raw string is split on the literal separators ` && ` / ` || `
//! first (no precedence between them; a string containing both splits on
//! ` && `), then each part is parsed as a single predicate call by the
//! pest grammar. A single leading `!( ... )` negates the entire
//! remainder.

use pest::Parser;
use pest_derive::Parser;

use super::{Expr, Predicate};

#[derive(Parser)]
#[grammar = "expr/grammar.pest"]
struct PredicateParser;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("empty expression")]
    Empty,
    #[error("parse error: {0}")]
    Syntax(String),
    #[error("unknown predicate '{0}'")]
    UnknownPredicate(String),
    #[error("predicate '{name}': {message}")]
    Arguments { name: String, message: String },
}

impl From<pest::error::Error<Rule>> for ExprError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        ExprError::Syntax(err.to_string())
    }
}

/// Parse a whole DSL expression into its AST.
pub fn parse(dsl: &str) -> Result<Expr, ExprError> {
    let trimmed = dsl.trim();
    if trimmed.is_empty() {
        return Err(ExprError::Empty);
    }

    // Single leading negation wrapping the entire expression.
    if let Some(inner) = trimmed.strip_prefix("!(").and_then(|rest| rest.strip_suffix(')')) {
        return Ok(Expr::Not {
            inner: Box::new(parse(inner)?),
        });
    }

    if trimmed.contains(" && ") {
        let parts = trimmed
            .split(" && ")
            .map(parse_predicate)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Expr::All { parts });
    }

    if trimmed.contains(" || ") {
        let parts = trimmed
            .split(" || ")
            .map(parse_predicate)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Expr::Any { parts });
    }

    Ok(Expr::Single {
        pred: parse_predicate(trimmed)?,
    })
}

/* ===================== Predicate Builder ===================== */

/// Argument of a predicate call, after the grammar has shaped it.
enum Arg {
    /// `answer(ref)`, a question reference.
    Reference(String),
    /// A bare or quoted literal.
    Text(String),
    /// `[a, b, c]`
    List(Vec<String>),
}

fn parse_predicate(source: &str) -> Result<Predicate, ExprError> {
    let source = source.trim();
    let mut pairs = PredicateParser::parse(Rule::predicate, source)?;

    let predicate = pairs
        .next()
        .ok_or_else(|| ExprError::Syntax(format!("no predicate in '{source}'")))?;
    let call = predicate
        .into_inner()
        .find(|p| p.as_rule() == Rule::call)
        .ok_or_else(|| ExprError::Syntax(format!("no call in '{source}'")))?;

    let mut inner = call.into_inner();
    let func = inner
        .next()
        .ok_or_else(|| ExprError::Syntax(format!("no function name in '{source}'")))?
        .as_str()
        .to_string();

    let args: Vec<Arg> = match inner.next() {
        Some(list) => list.into_inner().map(build_arg).collect::<Result<_, _>>()?,
        None => Vec::new(),
    };

    build_predicate(&func, args)
}

fn build_arg(pair: pest::iterators::Pair<Rule>) -> Result<Arg, ExprError> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| ExprError::Syntax("empty argument".to_string()))?;

    match inner.as_rule() {
        Rule::answer_ref => {
            let reference = inner
                .into_inner()
                .find(|p| p.as_rule() == Rule::reference)
                .and_then(|r| r.into_inner().next())
                .map(literal_text)
                .ok_or_else(|| ExprError::Syntax("answer() without a reference".to_string()))?;
            Ok(Arg::Reference(reference))
        }
        Rule::array => {
            let values = inner.into_inner().map(literal_text).collect();
            Ok(Arg::List(values))
        }
        Rule::literal => {
            let text = inner
                .into_inner()
                .next()
                .map(literal_text)
                .ok_or_else(|| ExprError::Syntax("empty literal".to_string()))?;
            Ok(Arg::Text(text))
        }
        rule => Err(ExprError::Syntax(format!("unexpected argument: {rule:?}"))),
    }
}

/// Text of a `string` or `bare` pair, with quotes stripped.
fn literal_text(pair: pest::iterators::Pair<Rule>) -> String {
    let raw = pair.as_str();
    match pair.as_rule() {
        Rule::string if raw.len() >= 2 => raw[1..raw.len() - 1].to_string(),
        _ => raw.to_string(),
    }
}

fn build_predicate(func: &str, args: Vec<Arg>) -> Result<Predicate, ExprError> {
    let arity = |n: usize| -> Result<(), ExprError> {
        if args.len() == n {
            Ok(())
        } else {
            Err(ExprError::Arguments {
                name: func.to_string(),
                message: format!("expected {n} argument(s), got {}", args.len()),
            })
        }
    };

    let pred = match func {
        "equals" => {
            arity(2)?;
            Predicate::Equals {
                reference: want_reference(func, &args[0])?,
                value: want_text(func, &args[1])?,
            }
        }
        "notEquals" => {
            arity(2)?;
            Predicate::NotEquals {
                reference: want_reference(func, &args[0])?,
                value: want_text(func, &args[1])?,
            }
        }
        "anySelected" => {
            arity(2)?;
            Predicate::AnySelected {
                reference: want_reference(func, &args[0])?,
                values: want_list(func, &args[1])?,
            }
        }
        "allSelected" => {
            arity(2)?;
            Predicate::AllSelected {
                reference: want_reference(func, &args[0])?,
                values: want_list(func, &args[1])?,
            }
        }
        "noneSelected" => {
            arity(2)?;
            Predicate::NoneSelected {
                reference: want_reference(func, &args[0])?,
                values: want_list(func, &args[1])?,
            }
        }
        "contains" => {
            arity(2)?;
            Predicate::Contains {
                reference: want_reference(func, &args[0])?,
                value: want_text(func, &args[1])?,
            }
        }
        "startsWith" => {
            arity(2)?;
            Predicate::StartsWith {
                reference: want_reference(func, &args[0])?,
                value: want_text(func, &args[1])?,
            }
        }
        "greaterThan" => {
            arity(2)?;
            Predicate::GreaterThan {
                reference: want_reference(func, &args[0])?,
                value: want_number(func, &args[1])?,
            }
        }
        "lessThan" => {
            arity(2)?;
            Predicate::LessThan {
                reference: want_reference(func, &args[0])?,
                value: want_number(func, &args[1])?,
            }
        }
        "isEmpty" => {
            arity(1)?;
            Predicate::IsEmpty {
                reference: want_reference(func, &args[0])?,
            }
        }
        "notEmpty" => {
            arity(1)?;
            Predicate::NotEmpty {
                reference: want_reference(func, &args[0])?,
            }
        }
        other => return Err(ExprError::UnknownPredicate(other.to_string())),
    };

    Ok(pred)
}

/// A reference position accepts both `answer(ref)` and a bare `ref`; the
/// set predicates conventionally use the bare form.
fn want_reference(func: &str, arg: &Arg) -> Result<String, ExprError> {
    match arg {
        Arg::Reference(r) | Arg::Text(r) => Ok(r.clone()),
        Arg::List(_) => Err(ExprError::Arguments {
            name: func.to_string(),
            message: "expected a question reference, got a list".to_string(),
        }),
    }
}

fn want_text(func: &str, arg: &Arg) -> Result<String, ExprError> {
    match arg {
        Arg::Text(t) => Ok(t.clone()),
        Arg::Reference(_) => Err(ExprError::Arguments {
            name: func.to_string(),
            message: "expected a value, got answer()".to_string(),
        }),
        Arg::List(_) => Err(ExprError::Arguments {
            name: func.to_string(),
            message: "expected a value, got a list".to_string(),
        }),
    }
}

fn want_list(func: &str, arg: &Arg) -> Result<Vec<String>, ExprError> {
    match arg {
        Arg::List(values) => Ok(values.clone()),
        // A single value is accepted as a one-element list.
        Arg::Text(t) => Ok(vec![t.clone()]),
        Arg::Reference(_) => Err(ExprError::Arguments {
            name: func.to_string(),
            message: "expected a value list, got answer()".to_string(),
        }),
    }
}

fn want_number(func: &str, arg: &Arg) -> Result<f64, ExprError> {
    let text = want_text(func, arg)?;
    text.parse::<f64>().map_err(|_| ExprError::Arguments {
        name: func.to_string(),
        message: format!("'{text}' is not a number"),
    })
}
