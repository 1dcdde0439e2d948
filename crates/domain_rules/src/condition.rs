//! Condition trees and the pure condition evaluator
//!
//! Evaluation is a total function: any structurally malformed condition
//! (missing field, empty composite, wrong `NOT` arity, literal of the wrong
//! shape) reports "not matched, confidence 0" instead of erroring, so one
//! bad rule never aborts evaluation of a rule set.

use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use core_kernel::{Context, Value};

/// Declared type used to coerce both operands before comparing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Number,
    Boolean,
    Date,
}

/// Comparison operator for simple conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    NotContains,
    In,
    NotIn,
    Matches,
    DateBefore,
    DateAfter,
    AgeGreaterThan,
    AgeLessThan,
    IsNull,
    IsNotNull,
}

/// Logical operator for composite conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

/// A boolean condition tree evaluated against a context
///
/// # Invariants
///
/// `Not` must have exactly one child; `And`/`Or` must have at least one.
/// Violations are reported at evaluation time as non-matches, never as
/// construction errors, because rules arrive from external storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    /// A single field comparison
    Simple {
        /// Dot-notation path into the context
        field: String,
        operator: ComparisonOperator,
        /// Literal operand
        value: Value,
        /// Type both operands are coerced to before comparing
        data_type: DataType,
    },
    /// A logical combination of sub-conditions
    Composite {
        operator: LogicalOperator,
        conditions: Vec<RuleCondition>,
    },
}

impl RuleCondition {
    /// Convenience constructor for a simple condition
    pub fn simple(
        field: impl Into<String>,
        operator: ComparisonOperator,
        value: impl Into<Value>,
        data_type: DataType,
    ) -> Self {
        RuleCondition::Simple {
            field: field.into(),
            operator,
            value: value.into(),
            data_type,
        }
    }

    /// Convenience constructor for `AND`
    pub fn all(conditions: Vec<RuleCondition>) -> Self {
        RuleCondition::Composite {
            operator: LogicalOperator::And,
            conditions,
        }
    }

    /// Convenience constructor for `OR`
    pub fn any(conditions: Vec<RuleCondition>) -> Self {
        RuleCondition::Composite {
            operator: LogicalOperator::Or,
            conditions,
        }
    }

    /// Convenience constructor for `NOT`
    pub fn negate(condition: RuleCondition) -> Self {
        RuleCondition::Composite {
            operator: LogicalOperator::Not,
            conditions: vec![condition],
        }
    }
}

/// Result of evaluating a condition
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionOutcome {
    /// Whether the condition matched
    pub matched: bool,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    /// Human-readable account of the decision
    pub explanation: String,
}

impl ConditionOutcome {
    fn matched(confidence: f64, explanation: impl Into<String>) -> Self {
        Self {
            matched: true,
            confidence: confidence.clamp(0.0, 1.0),
            explanation: explanation.into(),
        }
    }

    fn no_match(explanation: impl Into<String>) -> Self {
        Self {
            matched: false,
            confidence: 0.0,
            explanation: explanation.into(),
        }
    }

    fn malformed(explanation: impl Into<String>) -> Self {
        Self {
            matched: false,
            confidence: 0.0,
            explanation: explanation.into(),
        }
    }
}

/// Evaluates a condition tree against a context
///
/// Pure and total: no I/O, no panics, no errors.
pub fn evaluate(condition: &RuleCondition, context: &Context) -> ConditionOutcome {
    match condition {
        RuleCondition::Simple {
            field,
            operator,
            value,
            data_type,
        } => evaluate_simple(field, *operator, value, *data_type, context),
        RuleCondition::Composite {
            operator,
            conditions,
        } => evaluate_composite(*operator, conditions, context),
    }
}

fn evaluate_simple(
    field: &str,
    operator: ComparisonOperator,
    literal: &Value,
    data_type: DataType,
    context: &Context,
) -> ConditionOutcome {
    if field.trim().is_empty() {
        return ConditionOutcome::malformed("simple condition has no field");
    }

    // An explicit null in the context counts as unresolved.
    let resolved = context.resolve(field).filter(|v| !v.is_null());

    match operator {
        ComparisonOperator::IsNull => {
            if resolved.is_none() {
                ConditionOutcome::matched(1.0, format!("{field} is null"))
            } else {
                ConditionOutcome::no_match(format!("{field} is present"))
            }
        }
        ComparisonOperator::IsNotNull => {
            if resolved.is_some() {
                ConditionOutcome::matched(1.0, format!("{field} is present"))
            } else {
                ConditionOutcome::no_match(format!("{field} is null"))
            }
        }
        _ => {
            let Some(actual) = resolved else {
                return ConditionOutcome::no_match(format!("{field} is unresolved"));
            };
            compare(field, actual, operator, literal, data_type)
        }
    }
}

fn compare(
    field: &str,
    actual: &Value,
    operator: ComparisonOperator,
    literal: &Value,
    data_type: DataType,
) -> ConditionOutcome {
    match operator {
        ComparisonOperator::Equals => ordered(field, actual, literal, data_type, "==", |o| {
            o == Ordering::Equal
        }),
        ComparisonOperator::NotEquals => ordered(field, actual, literal, data_type, "!=", |o| {
            o != Ordering::Equal
        }),
        ComparisonOperator::GreaterThan => ordered(field, actual, literal, data_type, ">", |o| {
            o == Ordering::Greater
        }),
        ComparisonOperator::GreaterThanOrEqual => {
            ordered(field, actual, literal, data_type, ">=", |o| {
                o != Ordering::Less
            })
        }
        ComparisonOperator::LessThan => ordered(field, actual, literal, data_type, "<", |o| {
            o == Ordering::Less
        }),
        ComparisonOperator::LessThanOrEqual => {
            ordered(field, actual, literal, data_type, "<=", |o| {
                o != Ordering::Greater
            })
        }
        ComparisonOperator::Contains => substring(field, actual, literal, false),
        ComparisonOperator::NotContains => substring(field, actual, literal, true),
        ComparisonOperator::In => membership(field, actual, literal, data_type, false),
        ComparisonOperator::NotIn => membership(field, actual, literal, data_type, true),
        ComparisonOperator::Matches => regex_match(field, actual, literal),
        ComparisonOperator::DateBefore => date_compare(field, actual, literal, Ordering::Less),
        ComparisonOperator::DateAfter => date_compare(field, actual, literal, Ordering::Greater),
        ComparisonOperator::AgeGreaterThan => age_compare(field, actual, literal, Ordering::Greater),
        ComparisonOperator::AgeLessThan => age_compare(field, actual, literal, Ordering::Less),
        ComparisonOperator::IsNull | ComparisonOperator::IsNotNull => {
            unreachable!("null checks handled before resolution")
        }
    }
}

/// Coerces both operands per the declared data type and compares them
fn ordered(
    field: &str,
    actual: &Value,
    literal: &Value,
    data_type: DataType,
    symbol: &str,
    accept: impl Fn(Ordering) -> bool,
) -> ConditionOutcome {
    let ordering = match data_type {
        DataType::Number => match (actual.coerce_number(), literal.coerce_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
        DataType::String => Some(actual.coerce_string().cmp(&literal.coerce_string())),
        DataType::Boolean => match (actual.coerce_bool(), literal.coerce_bool()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => None,
        },
        DataType::Date => match (actual.coerce_date(), literal.coerce_date()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => None,
        },
    };

    match ordering {
        Some(ordering) if accept(ordering) => ConditionOutcome::matched(
            1.0,
            format!(
                "{field} ({}) {symbol} {}",
                actual.coerce_string(),
                literal.coerce_string()
            ),
        ),
        Some(_) => ConditionOutcome::no_match(format!(
            "{field} ({}) not {symbol} {}",
            actual.coerce_string(),
            literal.coerce_string()
        )),
        None => ConditionOutcome::no_match(format!(
            "{field}: operands not comparable as {data_type:?}"
        )),
    }
}

fn substring(field: &str, actual: &Value, literal: &Value, negate: bool) -> ConditionOutcome {
    let haystack = actual.coerce_string();
    let needle = literal.coerce_string();
    let contains = haystack.contains(&needle);
    let matched = contains != negate;

    if matched {
        ConditionOutcome::matched(
            1.0,
            format!(
                "{field} {} '{needle}'",
                if contains { "contains" } else { "does not contain" }
            ),
        )
    } else {
        ConditionOutcome::no_match(format!(
            "{field} {} '{needle}'",
            if contains { "contains" } else { "does not contain" }
        ))
    }
}

fn membership(
    field: &str,
    actual: &Value,
    literal: &Value,
    data_type: DataType,
    negate: bool,
) -> ConditionOutcome {
    let Some(candidates) = literal.as_list() else {
        return ConditionOutcome::malformed(format!(
            "{field}: membership literal is not an array"
        ));
    };

    let found = candidates.iter().any(|candidate| {
        ordered(field, actual, candidate, data_type, "==", |o| {
            o == Ordering::Equal
        })
        .matched
    });
    let matched = found != negate;

    if matched {
        ConditionOutcome::matched(
            1.0,
            format!(
                "{field} ({}) {} the candidate set",
                actual.coerce_string(),
                if found { "is in" } else { "is not in" }
            ),
        )
    } else {
        ConditionOutcome::no_match(format!(
            "{field} ({}) {} the candidate set",
            actual.coerce_string(),
            if found { "is in" } else { "is not in" }
        ))
    }
}

fn regex_match(field: &str, actual: &Value, literal: &Value) -> ConditionOutcome {
    let pattern = literal.coerce_string();
    // An invalid pattern is a non-match, never an error.
    let Ok(regex) = Regex::new(&pattern) else {
        return ConditionOutcome::no_match(format!("{field}: invalid pattern '{pattern}'"));
    };

    let subject = actual.coerce_string();
    if regex.is_match(&subject) {
        ConditionOutcome::matched(1.0, format!("{field} matches /{pattern}/"))
    } else {
        ConditionOutcome::no_match(format!("{field} does not match /{pattern}/"))
    }
}

fn date_compare(
    field: &str,
    actual: &Value,
    literal: &Value,
    accept: Ordering,
) -> ConditionOutcome {
    match (actual.coerce_date(), literal.coerce_date()) {
        (Some(a), Some(b)) => {
            let word = if accept == Ordering::Less {
                "before"
            } else {
                "after"
            };
            if a.cmp(&b) == accept {
                ConditionOutcome::matched(1.0, format!("{field} is {word} {}", b.to_rfc3339()))
            } else {
                ConditionOutcome::no_match(format!("{field} is not {word} {}", b.to_rfc3339()))
            }
        }
        _ => ConditionOutcome::no_match(format!("{field}: operands not comparable as dates")),
    }
}

fn age_compare(
    field: &str,
    actual: &Value,
    literal: &Value,
    accept: Ordering,
) -> ConditionOutcome {
    let Some(birth) = actual.coerce_date() else {
        return ConditionOutcome::no_match(format!("{field} is not a birth date"));
    };
    let Some(threshold) = literal.coerce_number() else {
        return ConditionOutcome::no_match(format!("{field}: age threshold is not a number"));
    };

    let age = age_in_years(birth, Utc::now());
    let word = if accept == Ordering::Greater {
        "over"
    } else {
        "under"
    };
    if (age as f64).partial_cmp(&threshold) == Some(accept) {
        ConditionOutcome::matched(1.0, format!("{field}: age {age} is {word} {threshold}"))
    } else {
        ConditionOutcome::no_match(format!("{field}: age {age} is not {word} {threshold}"))
    }
}

/// Completed years between a birth date and a reference instant
///
/// Calendar-correct: the age increments on the birthday, not after a fixed
/// number of elapsed days.
pub fn age_in_years(birth: DateTime<Utc>, at: DateTime<Utc>) -> i32 {
    let birth = birth.date_naive();
    let at = at.date_naive();

    let mut age = at.year() - birth.year();
    if (at.month(), at.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

fn evaluate_composite(
    operator: LogicalOperator,
    conditions: &[RuleCondition],
    context: &Context,
) -> ConditionOutcome {
    match operator {
        LogicalOperator::Not => {
            if conditions.len() != 1 {
                return ConditionOutcome::malformed(format!(
                    "NOT requires exactly one child, got {}",
                    conditions.len()
                ));
            }
            let inner = evaluate(&conditions[0], context);
            ConditionOutcome {
                matched: !inner.matched,
                confidence: inner.confidence,
                explanation: format!("NOT({})", inner.explanation),
            }
        }
        LogicalOperator::And => {
            if conditions.is_empty() {
                return ConditionOutcome::malformed("AND has no children");
            }
            let outcomes: Vec<ConditionOutcome> =
                conditions.iter().map(|c| evaluate(c, context)).collect();
            let matched = outcomes.iter().all(|o| o.matched);
            let confidence = outcomes
                .iter()
                .map(|o| o.confidence)
                .fold(f64::INFINITY, f64::min);
            ConditionOutcome {
                matched,
                confidence: if matched { confidence } else { 0.0 },
                explanation: format!(
                    "AND: {}/{} children matched",
                    outcomes.iter().filter(|o| o.matched).count(),
                    outcomes.len()
                ),
            }
        }
        LogicalOperator::Or => {
            if conditions.is_empty() {
                return ConditionOutcome::malformed("OR has no children");
            }
            let outcomes: Vec<ConditionOutcome> =
                conditions.iter().map(|c| evaluate(c, context)).collect();
            let matched = outcomes.iter().any(|o| o.matched);
            let confidence = outcomes
                .iter()
                .filter(|o| o.matched)
                .map(|o| o.confidence)
                .fold(0.0, f64::max);
            ConditionOutcome {
                matched,
                confidence,
                explanation: format!(
                    "OR: {}/{} children matched",
                    outcomes.iter().filter(|o| o.matched).count(),
                    outcomes.len()
                ),
            }
        }
    }
}
