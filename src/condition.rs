//! Comparison expressions for branch steps
//!
//! A condition is a single binary comparison. It arrives either as one
//! inline expression string ("${cpu} >= 80") or as separate left/right
//! operand fields with the operator between them. Operands are compared
//! numerically when both sides parse as numbers, otherwise as strings.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workflow::IfStep;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConditionError {
    #[error("Expression '{0}' contains no comparison operator")]
    MissingOperator(String),
    #[error("Expression '{0}' has an empty operand")]
    EmptyOperand(String),
    #[error("Unknown comparison operator '{0}'")]
    UnknownOperator(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
}

impl Comparator {
    pub fn parse(text: &str) -> Result<Self, ConditionError> {
        match text.trim() {
            "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            ">=" => Ok(Self::Ge),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            "<" => Ok(Self::Lt),
            other => Err(ConditionError::UnknownOperator(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Lt => "<",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed comparison with unresolved operand text.
///
/// Operands may still contain `${name}` placeholders; the interpreter
/// resolves them against the live scope before calling [`Condition::holds`].
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub left: String,
    pub op: Comparator,
    pub right: String,
}

impl Condition {
    /// Parse an inline expression like `"5 > 3"` or `"${env} == prod"`.
    ///
    /// Two-character operators are matched before their one-character
    /// prefixes so `>=` never splits as `>` followed by a stray `=`.
    pub fn from_expression(expr: &str) -> Result<Self, ConditionError> {
        const OPERATORS: [&str; 6] = ["==", "!=", ">=", "<=", ">", "<"];
        for op_text in OPERATORS {
            if let Some(pos) = expr.find(op_text) {
                let left = expr[..pos].trim();
                let right = expr[pos + op_text.len()..].trim();
                if left.is_empty() || right.is_empty() {
                    return Err(ConditionError::EmptyOperand(expr.to_string()));
                }
                return Ok(Self {
                    left: left.to_string(),
                    op: Comparator::parse(op_text)?,
                    right: right.to_string(),
                });
            }
        }
        Err(ConditionError::MissingOperator(expr.to_string()))
    }

    /// Resolve the condition an if step declares.
    ///
    /// `conditionValue` wins when present. Otherwise the left/right operand
    /// fields pair with the expression field as the operator; if both
    /// operand fields are empty the expression field holds the whole
    /// comparison inline.
    pub fn from_if_step(step: &IfStep) -> Result<Self, ConditionError> {
        if let Some(expr) = &step.condition_value {
            return Self::from_expression(expr);
        }
        if !step.ifcondition_left_value.trim().is_empty()
            || !step.ifcondition_right_value.trim().is_empty()
        {
            return Self::from_parts(
                &step.ifcondition_left_value,
                &step.ifcondition_expression,
                &step.ifcondition_right_value,
            );
        }
        Self::from_expression(&step.ifcondition_expression)
    }

    /// Build from separate operand fields and an operator token.
    pub fn from_parts(left: &str, op: &str, right: &str) -> Result<Self, ConditionError> {
        let left = left.trim();
        let right = right.trim();
        if left.is_empty() || right.is_empty() {
            return Err(ConditionError::EmptyOperand(format!(
                "{} {} {}",
                left, op, right
            )));
        }
        Ok(Self {
            left: left.to_string(),
            op: Comparator::parse(op)?,
            right: right.to_string(),
        })
    }

    /// Evaluate with fully resolved operand text.
    ///
    /// Both sides numeric compares as f64; anything else falls back to
    /// lexicographic string comparison, so "10" < "9" as strings but not
    /// as numbers.
    pub fn holds(&self, left: &str, right: &str) -> bool {
        if let (Ok(l), Ok(r)) = (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
            return match self.op {
                Comparator::Eq => l == r,
                Comparator::Ne => l != r,
                Comparator::Ge => l >= r,
                Comparator::Le => l <= r,
                Comparator::Gt => l > r,
                Comparator::Lt => l < r,
            };
        }
        let (l, r) = (left.trim(), right.trim());
        match self.op {
            Comparator::Eq => l == r,
            Comparator::Ne => l != r,
            Comparator::Ge => l >= r,
            Comparator::Le => l <= r,
            Comparator::Gt => l > r,
            Comparator::Lt => l < r,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.op, self.right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inline_expression() {
        let cond = Condition::from_expression("5 > 3").unwrap();
        assert_eq!(cond.left, "5");
        assert_eq!(cond.op, Comparator::Gt);
        assert_eq!(cond.right, "3");
        assert!(cond.holds("5", "3"));
    }

    #[test]
    fn two_char_operators_win_over_prefixes() {
        let cond = Condition::from_expression("${cpu} >= 80").unwrap();
        assert_eq!(cond.op, Comparator::Ge);
        assert_eq!(cond.left, "${cpu}");
        assert_eq!(cond.right, "80");
    }

    #[test]
    fn numeric_comparison_when_both_sides_numeric() {
        let cond = Condition::from_expression("10 > 9").unwrap();
        assert!(cond.holds("10", "9"));
        // Same operands compared as strings would invert
        assert!(!cond.holds("10x", "9x") || "10x" > "9x");
    }

    #[test]
    fn string_comparison_fallback() {
        let cond = Condition::from_parts("east", "==", "west").unwrap();
        assert!(!cond.holds("east", "west"));
        assert!(cond.holds("west", "west"));
    }

    #[test]
    fn mixed_operands_compare_as_strings() {
        let cond = Condition::from_parts("a", "!=", "1").unwrap();
        assert!(cond.holds("abc", "1"));
    }

    #[test]
    fn rejects_missing_operator() {
        let err = Condition::from_expression("no operator here").unwrap_err();
        assert!(matches!(err, ConditionError::MissingOperator(_)));
    }

    #[test]
    fn rejects_empty_operand() {
        let err = Condition::from_expression(">= 5").unwrap_err();
        assert!(matches!(err, ConditionError::EmptyOperand(_)));
        let err = Condition::from_parts("x", "<", "").unwrap_err();
        assert!(matches!(err, ConditionError::EmptyOperand(_)));
    }

    #[test]
    fn if_step_resolution_order() {
        use crate::workflow::StepMeta;

        let mut step = IfStep {
            meta: StepMeta::default(),
            condition_value: None,
            ifcondition_left_value: String::new(),
            ifcondition_right_value: String::new(),
            ifcondition_expression: "${cpu} >= 80".to_string(),
        };
        // Empty operand fields: the expression field is the whole comparison
        let cond = Condition::from_if_step(&step).unwrap();
        assert_eq!(cond.left, "${cpu}");
        assert_eq!(cond.op, Comparator::Ge);

        // Operand fields present: the expression field is the operator
        step.ifcondition_left_value = "5".to_string();
        step.ifcondition_right_value = "3".to_string();
        step.ifcondition_expression = ">".to_string();
        let cond = Condition::from_if_step(&step).unwrap();
        assert_eq!(cond.op, Comparator::Gt);

        // conditionValue wins over everything
        step.condition_value = Some("1 == 2".to_string());
        let cond = Condition::from_if_step(&step).unwrap();
        assert_eq!(cond.op, Comparator::Eq);
    }

    #[test]
    fn whitespace_is_trimmed() {
        let cond = Condition::from_expression("  7  ==  7.0  ").unwrap();
        assert!(cond.holds("7", "7.0"));
    }
}
