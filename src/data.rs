//! Cell values and rows flowing through the pipeline.
//!
//! Columns are config-driven and heterogeneous, so a [`Row`] is an
//! insertion-ordered map from field name to an optional [`Value`]. `None`
//! is a null cell (for example a decoded field without a mapping).

use std::{cmp::Ordering, fmt};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub type Cell = Option<Value>;

pub type Row = IndexMap<String, Cell>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
        }
    }

    /// Numeric interpretation of the value; strings are parsed leniently.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => parse_number(s),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Collapses whole floats into integers.
    pub fn from_number(value: f64) -> Self {
        if value.fract() == 0.0 && value.is_finite() && value.abs() < i64::MAX as f64 {
            Value::Integer(value as i64)
        } else {
            Value::Float(value)
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

pub fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Total order over cells: nulls first, then numbers, then strings.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparableValue<'a>(pub Option<&'a Value>);

impl Eq for ComparableValue<'_> {}

impl Ord for ComparableValue<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0, other.0) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(left), Some(right)) => compare_values(left, right),
        }
    }
}

impl PartialOrd for ComparableValue<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::String(_), _) => Ordering::Greater,
        (_, Value::String(_)) => Ordering::Less,
        (a, b) => {
            let a = a.as_f64().unwrap_or_default();
            let b = b.as_f64().unwrap_or_default();
            a.total_cmp(&b)
        }
    }
}

/// Builds a row from parallel header and value slices; raw values stay strings.
pub fn row_from_record<'a, I>(headers: &[String], values: I) -> Row
where
    I: IntoIterator<Item = &'a str>,
{
    let mut row = Row::with_capacity(headers.len());
    let mut values = values.into_iter();
    for header in headers {
        let cell = values.next().map(Value::from);
        row.insert(header.clone(), cell);
    }
    row
}

pub fn cell_display(cell: &Cell) -> String {
    cell.as_ref().map(Value::as_display).unwrap_or_default()
}
