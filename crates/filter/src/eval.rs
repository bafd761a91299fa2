//! In-memory filter evaluation against JSON rows.
//!
//! Evaluation never fails: missing columns read as null, and ordered
//! comparisons across mismatched types are simply false. A change event for
//! a malformed row must not take down the feed.

use serde_json::Value;

use crate::ast::{CompareOp, Comparison, Filter};

impl Filter {
    /// Evaluate this filter against a row rendered as a JSON object.
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Filter::Cmp(cmp) => eval_comparison(cmp, row),
            Filter::And(parts) => parts.iter().all(|p| p.matches(row)),
            Filter::Or(parts) => parts.iter().any(|p| p.matches(row)),
        }
    }
}

fn eval_comparison(cmp: &Comparison, row: &Value) -> bool {
    let actual = lookup(row, &cmp.column);
    match cmp.op {
        CompareOp::Eq => values_equal(actual, &cmp.value),
        CompareOp::Neq => !values_equal(actual, &cmp.value),
        CompareOp::Gt => ordered(actual, &cmp.value, |o| o == std::cmp::Ordering::Greater),
        CompareOp::Gte => ordered(actual, &cmp.value, |o| o != std::cmp::Ordering::Less),
        CompareOp::Lt => ordered(actual, &cmp.value, |o| o == std::cmp::Ordering::Less),
        CompareOp::Lte => ordered(actual, &cmp.value, |o| o != std::cmp::Ordering::Greater),
        CompareOp::In => match &cmp.value {
            Value::Array(items) => items.iter().any(|item| values_equal(actual, item)),
            _ => false,
        },
    }
}

fn lookup<'a>(row: &'a Value, path: &[String]) -> &'a Value {
    let mut current = row;
    for segment in path {
        current = match current.get(segment.as_str()) {
            Some(v) => v,
            None => return &Value::Null,
        };
    }
    current
}

/// Equality with numeric normalization: `1` equals `1.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn ordered<F>(a: &Value, b: &Value, check: F) -> bool
where
    F: Fn(std::cmp::Ordering) -> bool,
{
    let ordering = match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => match x.partial_cmp(&y) {
                Some(o) => o,
                None => return false,
            },
            _ => return false,
        },
    };
    check(ordering)
}

#[cfg(test)]
mod tests {
    use crate::parse::parse;
    use serde_json::json;

    #[test]
    fn eq_matches() {
        let filter = parse("room_id=eq.a").unwrap();
        assert!(filter.matches(&json!({"room_id": "a"})));
        assert!(!filter.matches(&json!({"room_id": "b"})));
    }

    #[test]
    fn missing_column_reads_null() {
        let filter = parse("deleted=eq.null").unwrap();
        assert!(filter.matches(&json!({"body": "hi"})));

        let filter = parse("room_id=eq.a").unwrap();
        assert!(!filter.matches(&json!({"body": "hi"})));
    }

    #[test]
    fn numeric_equality_normalizes() {
        let filter = parse("count=eq.1").unwrap();
        assert!(filter.matches(&json!({"count": 1.0})));
    }

    #[test]
    fn ordered_comparisons() {
        let filter = parse("age=gte.21").unwrap();
        assert!(filter.matches(&json!({"age": 21})));
        assert!(filter.matches(&json!({"age": 30.5})));
        assert!(!filter.matches(&json!({"age": 20})));
        // Mismatched types are false, not an error.
        assert!(!filter.matches(&json!({"age": "twenty"})));
    }

    #[test]
    fn string_ordering_is_lexical() {
        let filter = parse("name=lt.m").unwrap();
        assert!(filter.matches(&json!({"name": "ada"})));
        assert!(!filter.matches(&json!({"name": "zoe"})));
    }

    #[test]
    fn in_membership() {
        let filter = parse("status=in.(online,away)").unwrap();
        assert!(filter.matches(&json!({"status": "away"})));
        assert!(!filter.matches(&json!({"status": "offline"})));
    }

    #[test]
    fn compound_and_or() {
        let filter = parse("and(room_id=eq.a,or(kind=eq.text,kind=eq.image))").unwrap();
        assert!(filter.matches(&json!({"room_id": "a", "kind": "image"})));
        assert!(!filter.matches(&json!({"room_id": "a", "kind": "audio"})));
        assert!(!filter.matches(&json!({"room_id": "b", "kind": "text"})));
    }

    #[test]
    fn dotted_column_traverses() {
        let filter = parse("author.id=eq.u1").unwrap();
        assert!(filter.matches(&json!({"author": {"id": "u1"}})));
        assert!(!filter.matches(&json!({"author": {"id": "u2"}})));
        assert!(!filter.matches(&json!({"author": "u1"})));
    }
}
