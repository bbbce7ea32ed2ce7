//! Evaluation of expression trees against the builtin function table
//!
//! The environment is closed: the only callable names are the builtins
//! listed in [`Builtin`], and the only outside state an expression can read
//! is the set of already registered placements.

use super::parser::Expr;
use crate::country::CountrySet;
use crate::rules::{Annotation, NodeFilter, TagFilter};
use placement_core::{ExpressionError, NodeId, PlacementId};
use std::fmt;
use tracing::warn;

/// Read access to placements registered so far.
pub trait PlacementLookup {
    /// Filter registered under `id`, if any
    fn registered(&self, id: PlacementId) -> Option<&NodeFilter>;
}

/// Runtime value of an expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Integer literal
    Int(i64),
    /// String literal, or `empty()`
    Str(String),
    /// Byte string literal
    Bytes(Vec<u8>),
    /// Marker produced by `notEmpty()`
    NotEmpty,
    /// Node filter
    Filter(NodeFilter),
    /// Produced by `annotation(key, value)`
    Annotation(Annotation),
}

impl Value {
    /// Type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::NotEmpty => "notEmpty()",
            Value::Filter(_) => "filter",
            Value::Annotation(_) => "annotation",
        }
    }
}

/// The builtin functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `country(token, ...)`
    Country,
    /// `placement(id)`
    Placement,
    /// `all(filter, ...)`
    All,
    /// `tag(signer, key, value)`
    Tag,
    /// `annotated(filter, annotation, ...)`
    Annotated,
    /// `annotation(key, value)`
    Annotation,
    /// `exclude(filter)`
    Exclude,
    /// `empty()`
    Empty,
    /// `notEmpty()`
    NotEmpty,
}

impl Builtin {
    /// Every builtin with the name it is called by.
    pub const TABLE: [(&'static str, Builtin); 9] = [
        ("country", Builtin::Country),
        ("placement", Builtin::Placement),
        ("all", Builtin::All),
        ("tag", Builtin::Tag),
        ("annotated", Builtin::Annotated),
        ("annotation", Builtin::Annotation),
        ("exclude", Builtin::Exclude),
        ("empty", Builtin::Empty),
        ("notEmpty", Builtin::NotEmpty),
    ];

    /// Look up a builtin by name (case-sensitive).
    pub fn lookup(name: &str) -> Option<Builtin> {
        Self::TABLE
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, builtin)| *builtin)
    }

    /// Name the builtin is called by.
    pub fn name(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(_, b)| *b == self)
            .map(|(n, _)| *n)
            .unwrap_or("?")
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Evaluates expressions, resolving `placement(id)` through `placements`.
pub struct Evaluator<'a, L: PlacementLookup + ?Sized> {
    placements: &'a L,
}

impl<'a, L: PlacementLookup + ?Sized> Evaluator<'a, L> {
    /// Create an evaluator reading references from `placements`
    pub fn new(placements: &'a L) -> Self {
        Self { placements }
    }

    /// Evaluate an expression that must produce a filter.
    pub fn filter(&self, expr: &Expr) -> Result<NodeFilter, ExpressionError> {
        match self.eval(expr)? {
            Value::Filter(filter) => Ok(filter),
            other => Err(ExpressionError::NotAFilter {
                actual: other.type_name().to_string(),
            }),
        }
    }

    /// Evaluate an expression to a value.
    pub fn eval(&self, expr: &Expr) -> Result<Value, ExpressionError> {
        match expr {
            Expr::Int(value) => Ok(Value::Int(*value)),
            Expr::Str(value) => Ok(Value::Str(value.clone())),
            Expr::Bytes(value) => Ok(Value::Bytes(value.clone())),
            Expr::And(operands) => {
                let values = operands
                    .iter()
                    .map(|operand| self.eval(operand))
                    .collect::<Result<Vec<_>, _>>()?;
                if let Some(i) = values.iter().position(|v| !matches!(v, Value::Filter(_))) {
                    // the left side of a failing && is everything before it
                    let (left, right) = if i == 0 {
                        (values[0].type_name(), values.get(1).map_or("filter", Value::type_name))
                    } else {
                        ("filter", values[i].type_name())
                    };
                    return Err(ExpressionError::AndOperand {
                        left: left.to_string(),
                        right: right.to_string(),
                    });
                }
                let filters = values.into_iter().filter_map(|value| match value {
                    Value::Filter(filter) => Some(filter),
                    _ => None,
                });
                Ok(Value::Filter(NodeFilter::all(filters)))
            }
            Expr::Call { name, args, .. } => {
                let builtin = Builtin::lookup(name).ok_or_else(|| {
                    ExpressionError::UnknownFunction { name: name.clone() }
                })?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(builtin, args)
            }
        }
    }

    fn call(&self, builtin: Builtin, args: Vec<Value>) -> Result<Value, ExpressionError> {
        match builtin {
            Builtin::Country => {
                if args.is_empty() {
                    return Err(arity(builtin, "at least 1", 0));
                }
                let tokens = args
                    .into_iter()
                    .enumerate()
                    .map(|(i, arg)| match arg {
                        Value::Str(token) => Ok(token),
                        other => Err(type_error(builtin, i, "string", &other)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let countries = CountrySet::from_tokens(&tokens)?;
                Ok(Value::Filter(NodeFilter::country(countries)))
            }
            Builtin::Placement => {
                let [arg] = exactly::<1>(builtin, args)?;
                let raw = match arg {
                    Value::Int(raw) => raw,
                    other => return Err(type_error(builtin, 0, "integer", &other)),
                };
                let id = u16::try_from(raw)
                    .map(PlacementId::new)
                    .map_err(|_| ExpressionError::InvalidPlacementReference { value: raw })?;
                let filter = match self.placements.registered(id) {
                    Some(filter) => filter.clone(),
                    None => {
                        warn!(placement = %id, "placement() refers to an unregistered placement; resolving to deny-all");
                        NodeFilter::DenyAll
                    }
                };
                Ok(Value::Filter(filter))
            }
            Builtin::All => {
                let filters = args
                    .into_iter()
                    .enumerate()
                    .map(|(i, arg)| match arg {
                        Value::Filter(filter) => Ok(filter),
                        other => Err(type_error(builtin, i, "filter", &other)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Filter(NodeFilter::all(filters)))
            }
            Builtin::Tag => {
                let [node_id, key, value] = exactly::<3>(builtin, args)?;
                let node_id = match node_id {
                    Value::Str(text) => text.parse::<NodeId>().map_err(|e| {
                        ExpressionError::InvalidNodeId {
                            value: e.value,
                            reason: e.reason,
                        }
                    })?,
                    other => return Err(type_error(builtin, 0, "string", &other)),
                };
                let key = match key {
                    Value::Str(key) => key,
                    other => return Err(type_error(builtin, 1, "string", &other)),
                };
                let filter = match value {
                    Value::Str(text) => TagFilter::equal(node_id, key, text),
                    Value::Bytes(bytes) => TagFilter::equal(node_id, key, bytes),
                    Value::NotEmpty => TagFilter::not_empty(node_id, key),
                    other => {
                        return Err(type_error(builtin, 2, "string, bytes or notEmpty()", &other))
                    }
                };
                Ok(Value::Filter(NodeFilter::Tag(filter)))
            }
            Builtin::Annotated => {
                let mut args = args.into_iter();
                let filter = match args.next() {
                    Some(Value::Filter(filter)) => filter,
                    Some(other) => return Err(type_error(builtin, 0, "filter", &other)),
                    None => return Err(arity(builtin, "at least 1", 0)),
                };
                let annotations = args
                    .enumerate()
                    .map(|(i, arg)| match arg {
                        Value::Annotation(annotation) => Ok(annotation),
                        other => Err(type_error(builtin, i + 1, "annotation", &other)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Filter(filter.annotated(annotations)))
            }
            Builtin::Annotation => match exactly::<2>(builtin, args)? {
                [Value::Str(key), Value::Str(value)] => {
                    Ok(Value::Annotation(Annotation::new(key, value)))
                }
                [Value::Str(_), other] => Err(type_error(builtin, 1, "string", &other)),
                [other, _] => Err(type_error(builtin, 0, "string", &other)),
            },
            Builtin::Exclude => match exactly::<1>(builtin, args)? {
                [Value::Filter(filter)] => Ok(Value::Filter(filter.exclude())),
                [other] => Err(type_error(builtin, 0, "filter", &other)),
            },
            Builtin::Empty => {
                exactly::<0>(builtin, args)?;
                Ok(Value::Str(String::new()))
            }
            Builtin::NotEmpty => {
                exactly::<0>(builtin, args)?;
                Ok(Value::NotEmpty)
            }
        }
    }
}

fn exactly<const N: usize>(
    builtin: Builtin,
    args: Vec<Value>,
) -> Result<[Value; N], ExpressionError> {
    let actual = args.len();
    args.try_into()
        .map_err(|_| arity(builtin, &N.to_string(), actual))
}

fn arity(builtin: Builtin, expected: &str, actual: usize) -> ExpressionError {
    ExpressionError::Arity {
        function: builtin.name().to_string(),
        expected: expected.to_string(),
        actual,
    }
}

fn type_error(builtin: Builtin, index: usize, expected: &str, actual: &Value) -> ExpressionError {
    ExpressionError::argument_type(builtin.name(), index + 1, expected, actual.type_name())
}
