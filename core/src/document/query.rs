//! Field queries over JSON documents.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// `field <operator> value`. Several queries combine with AND.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldQuery {
    pub field: String,
    pub operator: QueryOperator,
    pub value: Value,
}

impl FieldQuery {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator: QueryOperator::Eq,
            value: value.into(),
        }
    }

    /// True when `document` satisfies this query. A missing field or a
    /// value of a different kind never matches, not even for `Ne`.
    pub fn matches(&self, document: &Map<String, Value>) -> bool {
        let Some(actual) = document.get(&self.field) else {
            return false;
        };
        let Some(ordering) = compare(actual, &self.value) else {
            return false;
        };
        match self.operator {
            QueryOperator::Eq => ordering == Ordering::Equal,
            QueryOperator::Ne => ordering != Ordering::Equal,
            QueryOperator::Lt => ordering == Ordering::Less,
            QueryOperator::Le => ordering != Ordering::Greater,
            QueryOperator::Gt => ordering == Ordering::Greater,
            QueryOperator::Ge => ordering != Ordering::Less,
        }
    }
}

// Numbers compare numerically whatever their JSON representation, so
// `123` and `123.0` are equal.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}
