use anyhow::{Result, anyhow};

use crate::data::{ComparableValue, Row, Value, parse_number};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Eq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone)]
pub struct FilterCondition {
    pub column: String,
    pub operator: ComparisonOperator,
    pub raw_value: String,
}

pub fn parse_filters(filters: &[String]) -> Result<Vec<FilterCondition>> {
    filters.iter().map(|f| parse_filter(f)).collect()
}

fn parse_filter(filter: &str) -> Result<FilterCondition> {
    let trimmed = filter.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Empty filter expression"));
    }

    let lowered = trimmed.to_ascii_lowercase();
    for (needle, op) in [
        (" contains ", ComparisonOperator::Contains),
        (" startswith ", ComparisonOperator::StartsWith),
        (" endswith ", ComparisonOperator::EndsWith),
    ] {
        if let Some(idx) = lowered.find(needle) {
            let (left, right_with_space) = trimmed.split_at(idx);
            let right = right_with_space[needle.len()..].trim();
            return Ok(FilterCondition {
                column: left.trim().to_string(),
                operator: op,
                raw_value: unquote(right).to_string(),
            });
        }
    }

    for (needle, op) in [
        ("!=", ComparisonOperator::NotEq),
        (">=", ComparisonOperator::Ge),
        ("<=", ComparisonOperator::Le),
        ("=", ComparisonOperator::Eq),
        (">", ComparisonOperator::Gt),
        ("<", ComparisonOperator::Lt),
    ] {
        if let Some(idx) = trimmed.find(needle) {
            let left = trimmed[..idx].trim();
            if left.is_empty() {
                return Err(anyhow!("Filter '{trimmed}' is missing a column"));
            }
            let right = trimmed[idx + needle.len()..].trim();
            return Ok(FilterCondition {
                column: left.to_string(),
                operator: op,
                raw_value: unquote(right).to_string(),
            });
        }
    }

    Err(anyhow!("Failed to parse filter expression '{trimmed}'"))
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}

impl FilterCondition {
    pub fn matches(&self, row: &Row) -> bool {
        let cell = row.get(&self.column).and_then(Option::as_ref);
        use ComparisonOperator::*;
        match self.operator {
            Contains | StartsWith | EndsWith => {
                let haystack = cell.map(Value::as_display).unwrap_or_default();
                let needle = self.raw_value.as_str();
                match self.operator {
                    Contains => haystack.contains(needle),
                    StartsWith => haystack.starts_with(needle),
                    _ => haystack.ends_with(needle),
                }
            }
            Eq | NotEq | Gt | Ge | Lt | Le => {
                let rhs = if self.raw_value.is_empty() {
                    None
                } else if parse_number(&self.raw_value).is_some()
                    && cell.and_then(Value::as_f64).is_some()
                {
                    parse_number(&self.raw_value).map(Value::Float)
                } else {
                    Some(Value::String(self.raw_value.clone()))
                };
                let lhs = match (cell, &rhs) {
                    (Some(value), Some(Value::Float(_))) => value.as_f64().map(Value::Float),
                    (Some(value), Some(Value::String(_))) => Some(Value::String(value.as_display())),
                    (Some(value), _) if value.as_display().is_empty() => None,
                    (Some(value), _) => Some(value.clone()),
                    (None, _) => None,
                };
                let ord = ComparableValue(lhs.as_ref()).cmp(&ComparableValue(rhs.as_ref()));
                match self.operator {
                    Eq => ord.is_eq(),
                    NotEq => ord.is_ne(),
                    Gt => ord.is_gt(),
                    Ge => ord.is_ge(),
                    Lt => ord.is_lt(),
                    _ => ord.is_le(),
                }
            }
        }
    }
}

pub fn evaluate_conditions(conditions: &[FilterCondition], row: &Row) -> bool {
    conditions.iter().all(|condition| condition.matches(row))
}
