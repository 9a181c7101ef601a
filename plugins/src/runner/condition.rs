use async_trait::async_trait;
use serde_json::Value;
use taskflow_core::error::NodeError;
use taskflow_core::executor::{NodeContext, NodeRunner};
use taskflow_core::workflow::Node;

use super::refs::{resolve_operand, value_to_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    Contains,
    NotEmpty,
}

impl Operator {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" | "==" => Some(Self::Eq),
            "ne" | "!=" => Some(Self::Ne),
            "gt" | ">" => Some(Self::Gt),
            "lt" | "<" => Some(Self::Lt),
            "gte" | ">=" => Some(Self::Gte),
            "lte" | "<=" => Some(Self::Lte),
            "contains" => Some(Self::Contains),
            "not_empty" => Some(Self::NotEmpty),
            _ => None,
        }
    }

    /// Operators that ignore the right operand
    fn is_unary(self) -> bool {
        matches!(self, Self::NotEmpty)
    }
}

/// Compares `data.left` against `data.right` and returns a boolean.
///
/// Operands are literals or whole-string `{{node.output}}` references.
#[derive(Debug, Default)]
pub struct ConditionRunner;

#[async_trait]
impl NodeRunner for ConditionRunner {
    fn name(&self) -> &str {
        "condition"
    }

    async fn run_node(&self, node: &Node, ctx: &NodeContext) -> Result<Value, NodeError> {
        let op_name = node
            .data
            .get("operator")
            .and_then(Value::as_str)
            .unwrap_or("eq");
        let op = Operator::parse(op_name).ok_or_else(|| {
            NodeError::InvalidPayload(format!("unknown condition operator '{op_name}'"))
        })?;

        let left = node.data.get("left").ok_or_else(|| {
            NodeError::InvalidPayload(format!("condition '{}' has no data.left", node.id))
        })?;
        let left = resolve_operand(left, &ctx.view)?;

        let right = if op.is_unary() {
            Value::Null
        } else {
            let right = node.data.get("right").ok_or_else(|| {
                NodeError::InvalidPayload(format!("condition '{}' has no data.right", node.id))
            })?;
            resolve_operand(right, &ctx.view)?
        };

        Ok(Value::Bool(evaluate(op, &left, &right)))
    }
}

pub fn evaluate(op: Operator, left: &Value, right: &Value) -> bool {
    match op {
        Operator::Eq => values_equal(left, right),
        Operator::Ne => !values_equal(left, right),
        Operator::Gt => compare_numbers(left, right, |a, b| a > b),
        Operator::Lt => compare_numbers(left, right, |a, b| a < b),
        Operator::Gte => compare_numbers(left, right, |a, b| a >= b),
        Operator::Lte => compare_numbers(left, right, |a, b| a <= b),
        Operator::Contains => match left {
            Value::Array(items) => items.iter().any(|item| values_equal(item, right)),
            Value::Object(map) => map.contains_key(&value_to_text(right)),
            other => value_to_text(other).contains(&value_to_text(right)),
        },
        Operator::NotEmpty => match left {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            _ => true,
        },
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        _ => a == b || value_to_text(a) == value_to_text(b),
    }
}

fn compare_numbers(a: &Value, b: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => cmp(x, y),
        _ => false,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
