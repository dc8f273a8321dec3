/// Branch condition operators and evaluation
///
/// A branch holds an ordered list of AND-groups. The branch is true iff at least
/// one group has all of its predicates true. Values are compared after template
/// resolution, so evaluation here is pure.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single comparison predicate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchCondition {
    #[serde(default)]
    pub first_value: Value,
    /// Ignored by single-value operators (EXISTS, BOOLEAN_IS_TRUE, LIST_IS_EMPTY...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_value: Option<Value>,
    pub operator: BranchOperator,
    /// Text comparisons are case-insensitive unless this is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BranchOperator {
    TextContains,
    TextDoesNotContain,
    TextExactlyMatches,
    TextDoesNotExactlyMatch,
    #[serde(rename = "TEXT_START_WITH")]
    TextStartsWith,
    TextDoesNotStartWith,
    TextEndsWith,
    TextDoesNotEndWith,
    NumberIsGreaterThan,
    NumberIsLessThan,
    NumberIsEqualTo,
    BooleanIsTrue,
    BooleanIsFalse,
    Exists,
    DoesNotExist,
    ListContains,
    ListDoesNotContain,
    ListIsEmpty,
    ListIsNotEmpty,
    DateIsBefore,
    DateIsEqual,
    DateIsAfter,
}

/// Evaluate OR-of-ANDs with left-to-right short-circuit
///
/// An empty group list is false.
pub fn evaluate_conditions(groups: &[Vec<BranchCondition>]) -> bool {
    groups
        .iter()
        .any(|group| group.iter().all(BranchCondition::evaluate))
}

impl BranchCondition {
    /// Evaluate this predicate against its (already resolved) values
    pub fn evaluate(&self) -> bool {
        let case_sensitive = self.case_sensitive.unwrap_or(false);
        let first = &self.first_value;
        let second = self.second_value.as_ref().unwrap_or(&Value::Null);

        match self.operator {
            BranchOperator::TextContains => {
                text_pair(first, second, case_sensitive, |a, b| a.contains(b))
            }
            BranchOperator::TextDoesNotContain => {
                !text_pair(first, second, case_sensitive, |a, b| a.contains(b))
            }
            BranchOperator::TextExactlyMatches => text_pair(first, second, case_sensitive, |a, b| a == b),
            BranchOperator::TextDoesNotExactlyMatch => {
                !text_pair(first, second, case_sensitive, |a, b| a == b)
            }
            BranchOperator::TextStartsWith => {
                text_pair(first, second, case_sensitive, |a, b| a.starts_with(b))
            }
            BranchOperator::TextDoesNotStartWith => {
                !text_pair(first, second, case_sensitive, |a, b| a.starts_with(b))
            }
            BranchOperator::TextEndsWith => {
                text_pair(first, second, case_sensitive, |a, b| a.ends_with(b))
            }
            BranchOperator::TextDoesNotEndWith => {
                !text_pair(first, second, case_sensitive, |a, b| a.ends_with(b))
            }
            BranchOperator::NumberIsGreaterThan => number_pair(first, second, |a, b| a > b),
            BranchOperator::NumberIsLessThan => number_pair(first, second, |a, b| a < b),
            BranchOperator::NumberIsEqualTo => number_pair(first, second, |a, b| a == b),
            BranchOperator::BooleanIsTrue => as_bool(first) == Some(true),
            BranchOperator::BooleanIsFalse => as_bool(first) == Some(false),
            BranchOperator::Exists => exists(first),
            BranchOperator::DoesNotExist => !exists(first),
            BranchOperator::ListContains => list_contains(first, second, case_sensitive),
            BranchOperator::ListDoesNotContain => !list_contains(first, second, case_sensitive),
            BranchOperator::ListIsEmpty => as_list(first).is_some_and(|items| items.is_empty()),
            BranchOperator::ListIsNotEmpty => as_list(first).is_some_and(|items| !items.is_empty()),
            BranchOperator::DateIsBefore => date_pair(first, second, |a, b| a < b),
            BranchOperator::DateIsEqual => date_pair(first, second, |a, b| a == b),
            BranchOperator::DateIsAfter => date_pair(first, second, |a, b| a > b),
        }
    }
}

/// Render a value as comparison text (strings as-is, null as empty, rest as JSON)
fn as_text(value: &Value, case_sensitive: bool) -> String {
    let text = match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if case_sensitive {
        text
    } else {
        text.to_lowercase()
    }
}

fn text_pair(first: &Value, second: &Value, case_sensitive: bool, op: impl Fn(&str, &str) -> bool) -> bool {
    op(&as_text(first, case_sensitive), &as_text(second, case_sensitive))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn number_pair(first: &Value, second: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (as_number(first), as_number(second)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn exists(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Arrays as-is; strings holding a JSON array are accepted too
fn as_list(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

fn list_contains(list: &Value, needle: &Value, case_sensitive: bool) -> bool {
    let needle = as_text(needle, case_sensitive);
    as_list(list).is_some_and(|items| items.iter().any(|item| as_text(item, case_sensitive) == needle))
}

/// Parse RFC 3339 timestamps, naive date-times and plain dates as UTC
pub(crate) fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn date_pair(first: &Value, second: &Value, op: impl Fn(DateTime<Utc>, DateTime<Utc>) -> bool) -> bool {
    match (parse_date(first), parse_date(second)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}
