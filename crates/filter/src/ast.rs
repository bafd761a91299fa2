use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operators of the filter language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Membership in a parenthesized list: `status=in.(a,b)`.
    In,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Neq => "neq",
            CompareOp::Gt => "gt",
            CompareOp::Gte => "gte",
            CompareOp::Lt => "lt",
            CompareOp::Lte => "lte",
            CompareOp::In => "in",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        Some(match s {
            "eq" => CompareOp::Eq,
            "neq" => CompareOp::Neq,
            "gt" => CompareOp::Gt,
            "gte" => CompareOp::Gte,
            "lt" => CompareOp::Lt,
            "lte" => CompareOp::Lte,
            "in" => CompareOp::In,
            _ => return None,
        })
    }
}

/// One `column=op.value` comparison. The column is a dotted path; the value
/// is a typed JSON literal (`In` carries an array).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub column: Vec<String>,
    pub op: CompareOp,
    pub value: Value,
}

/// A parsed subscription filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Cmp(Comparison),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    /// The common case: a single column-equals-value filter.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Cmp(Comparison {
            column: column.into().split('.').map(str::to_string).collect(),
            op: CompareOp::Eq,
            value: value.into(),
        })
    }
}

impl fmt::Display for Filter {
    /// Render back to wire form; `parse(filter.to_string())` round-trips.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Cmp(cmp) => {
                write!(f, "{}={}.", cmp.column.join("."), cmp.op.as_str())?;
                match (&cmp.op, &cmp.value) {
                    (CompareOp::In, Value::Array(items)) => {
                        f.write_str("(")?;
                        for (i, item) in items.iter().enumerate() {
                            if i > 0 {
                                f.write_str(",")?;
                            }
                            write_literal(f, item)?;
                        }
                        f.write_str(")")
                    }
                    (_, value) => write_literal(f, value),
                }
            }
            Filter::And(parts) => write_compound(f, "and", parts),
            Filter::Or(parts) => write_compound(f, "or", parts),
        }
    }
}

fn write_compound(f: &mut fmt::Formatter<'_>, name: &str, parts: &[Filter]) -> fmt::Result {
    write!(f, "{name}(")?;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{part}")?;
    }
    f.write_str(")")
}

fn write_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => {
            if needs_quoting(s) {
                write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
            } else {
                f.write_str(s)
            }
        }
        other => write!(f, "{other}"),
    }
}

/// Bare strings that would re-parse as another type, or that contain
/// syntax characters, must be quoted on the wire.
fn needs_quoting(s: &str) -> bool {
    s.is_empty()
        || s.contains([',', '(', ')', '"', '=', ' '])
        || s.parse::<f64>().is_ok()
        || matches!(s, "true" | "false" | "null")
}
