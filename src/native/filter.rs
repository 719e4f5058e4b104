//! Attribute filters for vector table queries.
//!
//! Supports a single comparison, `<column> <op> <literal>`, with operators
//! `= != <> < <= > >=`. Literals are numbers, quoted strings, or bare words.

use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

// Two-character operators first so `<=` is not read as `<`.
const OPERATORS: [(&str, CompareOp); 7] = [
    (">=", CompareOp::Ge),
    ("<=", CompareOp::Le),
    ("!=", CompareOp::Ne),
    ("<>", CompareOp::Ne),
    ("=", CompareOp::Eq),
    ("<", CompareOp::Lt),
    (">", CompareOp::Gt),
];

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: CompareOp,
    pub literal: Literal,
}

impl Filter {
    pub fn parse(expr: &str) -> Result<Self, String> {
        let (pos, token, op) = OPERATORS
            .iter()
            .filter_map(|(token, op)| expr.find(token).map(|pos| (pos, *token, *op)))
            .min_by_key(|(pos, token, _)| (*pos, std::cmp::Reverse(token.len())))
            .ok_or_else(|| format!("no comparison operator in filter '{}'", expr))?;

        let column = expr[..pos].trim();
        if column.is_empty() || !column.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(format!("invalid column name in filter '{}'", expr));
        }

        let raw = expr[pos + token.len()..].trim();
        if raw.is_empty() {
            return Err(format!("missing value in filter '{}'", expr));
        }

        Ok(Self {
            column: column.to_string(),
            op,
            literal: parse_literal(raw),
        })
    }

    /// Evaluate against a cell value. Nulls never match.
    pub fn matches(&self, value: &Value) -> bool {
        let ordering = match (&self.literal, value) {
            (_, Value::Null) => return false,
            (Literal::Number(n), Value::Number(v)) => v.as_f64().and_then(|v| v.partial_cmp(n)),
            (Literal::Number(n), Value::String(s)) => {
                s.trim().parse::<f64>().ok().and_then(|v| v.partial_cmp(n))
            }
            (Literal::Text(t), Value::String(s)) => Some(s.as_str().cmp(t.as_str())),
            (Literal::Text(t), other) => Some(other.to_string().cmp(t)),
            (Literal::Number(_), _) => None,
        };

        let Some(ordering) = ordering else {
            return false;
        };
        match self.op {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

fn parse_literal(raw: &str) -> Literal {
    for quote in ['\'', '"'] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return Literal::Text(raw[1..raw.len() - 1].to_string());
        }
    }
    match raw.parse::<f64>() {
        Ok(n) => Literal::Number(n),
        Err(_) => Literal::Text(raw.to_string()),
    }
}
