//! Condition evaluation for workflow transitions.
//!
//! Evaluation is forgiving: a missing field reads as the zero value of the
//! comparison value's type, and type mismatches evaluate to `false` rather
//! than failing the transition.

use std::cmp::Ordering;

use serde_json::Value;

use crate::definition::{Condition, Operator, Step, StepKind, Transition};

use super::state::InstanceData;

/// Condition evaluator for workflow transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// Create a new condition evaluator.
    pub fn new() -> Self {
        Self
    }

    /// Evaluate an optional condition. No condition is always satisfied.
    pub fn evaluate(&self, condition: Option<&Condition>, data: &InstanceData) -> bool {
        let condition = match condition {
            Some(c) => c,
            None => return true,
        };

        let zero = zero_value(condition.op, &condition.value);
        let actual = match data.get(&condition.field) {
            Some(Value::Null) | None => &zero,
            Some(v) => v,
        };
        let expected = &condition.value;

        match condition.op {
            Operator::Equals => loose_eq(actual, expected),
            Operator::NotEquals => !loose_eq(actual, expected),
            Operator::GreaterThan => compare_numbers(actual, expected) == Some(Ordering::Greater),
            Operator::LessThan => compare_numbers(actual, expected) == Some(Ordering::Less),
            Operator::Contains => match actual {
                Value::Array(items) => items.iter().any(|item| loose_eq(item, expected)),
                _ => as_text(actual).contains(&as_text(expected)),
            },
        }
    }

    /// Evaluate transition logic for a step.
    ///
    /// Returns the transitions that fire, in declared order. `otherwise`
    /// transitions fire only when no other transition did. End steps never
    /// transition.
    pub fn evaluate_next<'a>(&self, step: &'a Step, data: &InstanceData) -> Vec<&'a Transition> {
        if step.kind == StepKind::End {
            return Vec::new();
        }

        let mut fired: Vec<&Transition> = step
            .transitions
            .iter()
            .filter(|t| !t.otherwise && self.evaluate(t.when.as_ref(), data))
            .collect();

        if fired.is_empty() {
            fired.extend(step.transitions.iter().filter(|t| t.otherwise));
        }

        fired
    }
}

/// Zero value matching the type of the comparison value. Ordering
/// operators compare numerically, so a numeric string gets a numeric zero.
fn zero_value(op: Operator, like: &Value) -> Value {
    let ordering = matches!(op, Operator::GreaterThan | Operator::LessThan);
    match like {
        Value::Number(_) => Value::from(0),
        Value::String(_) if ordering && as_number(like).is_some() => Value::from(0),
        Value::Bool(_) => Value::Bool(false),
        _ => Value::String(String::new()),
    }
}

/// Numeric reading of a value; numeric strings count.
fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// Exact integer reading of a value; integral numeric strings count.
fn as_integer(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from)),
        Value::String(s) => s.trim().parse::<i128>().ok(),
        _ => None,
    }
}

/// Numeric ordering of two values. Integers compare exactly, anything
/// else as `f64`.
fn compare_numbers(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_integer(a), as_integer(b)) {
        return Some(x.cmp(&y));
    }
    as_number(a)?.partial_cmp(&as_number(b)?)
}

/// Text representation used for equality and substring checks.
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Numbers compare numerically, everything else as text.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match compare_numbers(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => as_text(a) == as_text(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> InstanceData {
        match value {
            Value::Object(map) => map,
            _ => InstanceData::new(),
        }
    }

    fn cond(field: &str, op: Operator, value: Value) -> Condition {
        Condition::new(field, op, value)
    }

    #[test]
    fn test_no_condition_is_true() {
        let evaluator = ConditionEvaluator::new();
        assert!(evaluator.evaluate(None, &InstanceData::new()));
    }

    #[test]
    fn test_numeric_comparisons() {
        let evaluator = ConditionEvaluator::new();
        let ctx = data(json!({"amount": 500, "limit": "1000"}));

        assert!(!evaluator.evaluate(Some(&cond("amount", Operator::GreaterThan, json!(1000))), &ctx));
        assert!(evaluator.evaluate(Some(&cond("amount", Operator::LessThan, json!(1000))), &ctx));
        assert!(evaluator.evaluate(Some(&cond("limit", Operator::GreaterThan, json!(999.5))), &ctx));
        assert!(evaluator.evaluate(Some(&cond("amount", Operator::Equals, json!("500.0"))), &ctx));
    }

    #[test]
    fn test_non_numeric_ordering_is_false() {
        let evaluator = ConditionEvaluator::new();
        let ctx = data(json!({"name": "alice"}));

        assert!(!evaluator.evaluate(Some(&cond("name", Operator::GreaterThan, json!(1))), &ctx));
        assert!(!evaluator.evaluate(Some(&cond("name", Operator::LessThan, json!("zzz"))), &ctx));
    }

    #[test]
    fn test_text_equality() {
        let evaluator = ConditionEvaluator::new();
        let ctx = data(json!({"status": "approved", "urgent": true}));

        assert!(evaluator.evaluate(Some(&cond("status", Operator::Equals, json!("approved"))), &ctx));
        assert!(evaluator.evaluate(Some(&cond("status", Operator::NotEquals, json!("rejected"))), &ctx));
        assert!(evaluator.evaluate(Some(&cond("urgent", Operator::Equals, json!("true"))), &ctx));
    }

    #[test]
    fn test_missing_field_reads_as_zero_value() {
        let evaluator = ConditionEvaluator::new();
        let ctx = InstanceData::new();

        assert!(evaluator.evaluate(Some(&cond("amount", Operator::Equals, json!(0))), &ctx));
        assert!(evaluator.evaluate(Some(&cond("note", Operator::Equals, json!(""))), &ctx));
        assert!(evaluator.evaluate(Some(&cond("flag", Operator::Equals, json!(false))), &ctx));
        assert!(evaluator.evaluate(Some(&cond("amount", Operator::LessThan, json!(1))), &ctx));
        assert!(!evaluator.evaluate(Some(&cond("note", Operator::Contains, json!("x"))), &ctx));
    }

    #[test]
    fn test_explicit_null_behaves_like_missing() {
        let evaluator = ConditionEvaluator::new();
        let ctx = data(json!({"amount": null}));
        assert!(evaluator.evaluate(Some(&cond("amount", Operator::Equals, json!(0))), &ctx));
    }

    #[test]
    fn test_contains() {
        let evaluator = ConditionEvaluator::new();
        let ctx = data(json!({"title": "Urgent: laptop", "tags": ["it", "hardware"], "code": 12345}));

        assert!(evaluator.evaluate(Some(&cond("title", Operator::Contains, json!("laptop"))), &ctx));
        assert!(!evaluator.evaluate(Some(&cond("title", Operator::Contains, json!("phone"))), &ctx));
        assert!(evaluator.evaluate(Some(&cond("tags", Operator::Contains, json!("it"))), &ctx));
        assert!(evaluator.evaluate(Some(&cond("code", Operator::Contains, json!(234))), &ctx));
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let evaluator = ConditionEvaluator::new();
        let ctx = data(json!({"amount": 1500}));
        let c = cond("amount", Operator::GreaterThan, json!(1000));
        let first = evaluator.evaluate(Some(&c), &ctx);
        for _ in 0..10 {
            assert_eq!(evaluator.evaluate(Some(&c), &ctx), first);
        }
    }

    #[test]
    fn test_evaluate_next_with_otherwise() {
        let evaluator = ConditionEvaluator::new();
        let step = Step::new("check_amount", StepKind::Gateway)
            .with_transition(Transition::when(
                "approval",
                cond("amount", Operator::GreaterThan, json!(1000)),
            ))
            .with_transition(Transition::otherwise("end"));

        let low = evaluator.evaluate_next(&step, &data(json!({"amount": 500})));
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].to, "end");

        let high = evaluator.evaluate_next(&step, &data(json!({"amount": 5000})));
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].to, "approval");
    }

    #[test]
    fn test_evaluate_next_fans_out_in_order() {
        let evaluator = ConditionEvaluator::new();
        let step = Step::new("split", StepKind::Task)
            .with_transition(Transition::to("legal"))
            .with_transition(Transition::to("finance"));

        let fired = evaluator.evaluate_next(&step, &InstanceData::new());
        let targets: Vec<&str> = fired.iter().map(|t| t.to.as_str()).collect();
        assert_eq!(targets, vec!["legal", "finance"]);
    }

    #[test]
    fn test_end_step_never_transitions() {
        let evaluator = ConditionEvaluator::new();
        let step = Step::new("end", StepKind::End).with_transition(Transition::to("again"));
        assert!(evaluator.evaluate_next(&step, &InstanceData::new()).is_empty());
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        let evaluator = ConditionEvaluator::new();
        let ctx = data(json!({"id": 9007199254740993u64, "ref": "9007199254740993"}));

        assert!(!evaluator.evaluate(Some(&cond("id", Operator::Equals, json!(9007199254740992u64))), &ctx));
        assert!(evaluator.evaluate(Some(&cond("id", Operator::Equals, json!(9007199254740993u64))), &ctx));
        assert!(evaluator.evaluate(Some(&cond("id", Operator::NotEquals, json!(9007199254740992u64))), &ctx));
        assert!(evaluator.evaluate(Some(&cond("id", Operator::GreaterThan, json!(9007199254740992u64))), &ctx));
        assert!(evaluator.evaluate(Some(&cond("ref", Operator::Equals, json!(9007199254740993u64))), &ctx));
        assert!(evaluator.evaluate(Some(&cond("id", Operator::LessThan, json!(u64::MAX))), &ctx));
    }

    #[test]
    fn test_missing_field_orders_as_numeric_zero_against_numeric_string() {
        let evaluator = ConditionEvaluator::new();
        let ctx = InstanceData::new();

        assert!(evaluator.evaluate(Some(&cond("balance", Operator::GreaterThan, json!("-5"))), &ctx));
        assert!(evaluator.evaluate(Some(&cond("balance", Operator::LessThan, json!("2.5"))), &ctx));
        assert!(!evaluator.evaluate(Some(&cond("balance", Operator::GreaterThan, json!("abc"))), &ctx));
        assert!(!evaluator.evaluate(Some(&cond("balance", Operator::Equals, json!("0"))), &ctx));
    }
}
