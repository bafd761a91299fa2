use serde_json::Value;

use crate::ast::{CompareOp, Comparison, Filter};

/// Parser error types, positioned in the input string.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("empty filter")]
    Empty,
    #[error("unexpected end of filter")]
    UnexpectedEnd,
    #[error("expected '{expected}' at position {pos}")]
    Expected { expected: char, pos: usize },
    #[error("empty column name at position {pos}")]
    EmptyColumn { pos: usize },
    #[error("unknown operator '{op}' at position {pos}")]
    UnknownOperator { op: String, pos: usize },
    #[error("missing value at position {pos}")]
    MissingValue { pos: usize },
    #[error("empty {kind}() group at position {pos}")]
    EmptyGroup { kind: &'static str, pos: usize },
    #[error("unterminated string starting at position {pos}")]
    UnterminatedString { pos: usize },
    #[error("trailing input at position {pos}")]
    TrailingInput { pos: usize },
}

/// Parse a filter string into an AST.
pub fn parse(input: &str) -> Result<Filter, ParseError> {
    let mut cursor = Cursor::new(input);
    cursor.skip_ws();
    if cursor.at_end() {
        return Err(ParseError::Empty);
    }
    let filter = cursor.parse_filter()?;
    cursor.skip_ws();
    if !cursor.at_end() {
        return Err(ParseError::TrailingInput { pos: cursor.pos });
    }
    Ok(filter)
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), ParseError> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(_) => Err(ParseError::Expected {
                expected,
                pos: self.pos - 1,
            }),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn parse_filter(&mut self) -> Result<Filter, ParseError> {
        self.skip_ws();
        if let Some(kind) = self.peek_group() {
            return self.parse_group(kind);
        }
        self.parse_comparison().map(Filter::Cmp)
    }

    /// Detect `and(` / `or(` without consuming anything.
    fn peek_group(&self) -> Option<&'static str> {
        for kind in ["and", "or"] {
            let end = self.pos + kind.len();
            if self.chars.len() > end
                && self.chars[self.pos..end].iter().collect::<String>() == kind
                && self.chars[end] == '('
            {
                return Some(if kind == "and" { "and" } else { "or" });
            }
        }
        None
    }

    fn parse_group(&mut self, kind: &'static str) -> Result<Filter, ParseError> {
        let start = self.pos;
        self.pos += kind.len();
        self.expect('(')?;
        self.skip_ws();
        if self.peek() == Some(')') {
            return Err(ParseError::EmptyGroup { kind, pos: start });
        }

        let mut parts = vec![self.parse_filter()?];
        loop {
            self.skip_ws();
            match self.bump() {
                Some(',') => parts.push(self.parse_filter()?),
                Some(')') => break,
                Some(_) => {
                    return Err(ParseError::Expected {
                        expected: ')',
                        pos: self.pos - 1,
                    })
                }
                None => return Err(ParseError::UnexpectedEnd),
            }
        }

        Ok(match kind {
            "and" => Filter::And(parts),
            _ => Filter::Or(parts),
        })
    }

    fn parse_comparison(&mut self) -> Result<Comparison, ParseError> {
        let column_start = self.pos;
        let mut raw_column = String::new();
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || matches!(c, '_' | '-' | '.')) {
            raw_column.push(self.bump().unwrap_or_default());
        }
        if raw_column.is_empty() || raw_column.split('.').any(str::is_empty) {
            return Err(ParseError::EmptyColumn { pos: column_start });
        }

        self.expect('=')?;

        let op_start = self.pos;
        let mut op_name = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_alphabetic()) {
            op_name.push(self.bump().unwrap_or_default());
        }
        let op = CompareOp::from_str_opt(&op_name).ok_or(ParseError::UnknownOperator {
            op: op_name,
            pos: op_start,
        })?;
        self.expect('.')?;

        let value = if op == CompareOp::In {
            Value::Array(self.parse_list()?)
        } else {
            self.parse_scalar()?
        };

        Ok(Comparison {
            column: raw_column.split('.').map(str::to_string).collect(),
            op,
            value,
        })
    }

    fn parse_list(&mut self) -> Result<Vec<Value>, ParseError> {
        self.expect('(')?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(')') {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            items.push(self.parse_scalar()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(')') => return Ok(items),
                Some(_) => {
                    return Err(ParseError::Expected {
                        expected: ')',
                        pos: self.pos - 1,
                    })
                }
                None => return Err(ParseError::UnexpectedEnd),
            }
        }
    }

    fn parse_scalar(&mut self) -> Result<Value, ParseError> {
        self.skip_ws();
        match self.peek() {
            Some('"') => self.parse_quoted(),
            Some(_) => self.parse_bare(),
            None => Err(ParseError::MissingValue { pos: self.pos }),
        }
    }

    fn parse_quoted(&mut self) -> Result<Value, ParseError> {
        let start = self.pos;
        self.pos += 1; // opening quote
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(Value::String(out)),
                Some('\\') => match self.bump() {
                    Some(c) => out.push(c),
                    None => return Err(ParseError::UnterminatedString { pos: start }),
                },
                Some(c) => out.push(c),
                None => return Err(ParseError::UnterminatedString { pos: start }),
            }
        }
    }

    /// A bare token runs to the next `,`, `)` or end of input and is typed
    /// by content: integer, float, bool, null, else string.
    fn parse_bare(&mut self) -> Result<Value, ParseError> {
        let start = self.pos;
        let mut raw = String::new();
        while matches!(self.peek(), Some(c) if c != ',' && c != ')') {
            raw.push(self.bump().unwrap_or_default());
        }
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ParseError::MissingValue { pos: start });
        }
        Ok(type_bare(raw))
    }
}

fn type_bare(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}
