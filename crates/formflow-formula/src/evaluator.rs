//! Formula evaluator
//!
//! Tree-walking interpreter over [`FormulaExpr`].

use crate::ast::{ArithmeticOperator, ComparisonOperator, FormulaExpr};
use crate::error::{FormulaError, FormulaResult};
use crate::functions::{get_function_registry, FunctionImpl};
use chrono::{DateTime, Utc};
use formflow_core::{FieldMap, FormData, Value};
use std::cmp::Ordering;

/// Context for formula evaluation
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// Current field values, keyed by field id or title
    pub form_data: &'a FormData,
    /// Field metadata, keyed by field id
    pub field_map: &'a FieldMap,
    /// Evaluation instant, used by NOW() and TODAY()
    pub now: DateTime<Utc>,
}

impl<'a> EvaluationContext<'a> {
    /// Create a new evaluation context at the current instant
    pub fn new(form_data: &'a FormData, field_map: &'a FieldMap) -> Self {
        Self {
            form_data,
            field_map,
            now: Utc::now(),
        }
    }

    /// Pin the evaluation instant
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Resolve a field reference.
    ///
    /// The name is looked up directly in the form data first. Failing that, the
    /// field map is searched for a field whose id, title or name matches, and the
    /// form data is re-indexed by that field's identifiers. Unresolved names are
    /// null rather than an error.
    pub fn get_field_value(&self, name: &str) -> Value {
        if let Some(value) = self.form_data.get(name) {
            return value.clone();
        }

        let meta = self
            .field_map
            .get(name)
            .filter(|meta| meta.matches(name))
            .or_else(|| self.field_map.values().find(|meta| meta.matches(name)));

        if let Some(meta) = meta {
            let keys = [Some(&meta.id), Some(&meta.title), meta.name.as_ref()];
            for key in keys.into_iter().flatten() {
                if let Some(value) = self.form_data.get(key.as_str()) {
                    return value.clone();
                }
            }
        }

        Value::Null
    }
}

/// Evaluate a formula expression
pub fn evaluate(expr: &FormulaExpr, ctx: &EvaluationContext) -> FormulaResult<Value> {
    match expr {
        FormulaExpr::Literal(value) => Ok(value.clone()),

        FormulaExpr::FieldReference { name } => Ok(ctx.get_field_value(name)),

        FormulaExpr::BinaryOperation { op, left, right } => {
            let l = evaluate(left, ctx)?.to_number();
            let r = evaluate(right, ctx)?.to_number();
            evaluate_arithmetic(*op, l, r)
        }

        FormulaExpr::ComparisonOperation { op, left, right } => {
            let l = evaluate(left, ctx)?;
            let r = evaluate(right, ctx)?;
            Ok(Value::Boolean(evaluate_comparison(*op, &l, &r)))
        }

        FormulaExpr::FunctionCall { name, args } => evaluate_function(name, args, ctx),
    }
}

fn evaluate_arithmetic(op: ArithmeticOperator, l: f64, r: f64) -> FormulaResult<Value> {
    let result = match op {
        ArithmeticOperator::Add => l + r,
        ArithmeticOperator::Subtract => l - r,
        ArithmeticOperator::Multiply => l * r,
        ArithmeticOperator::Divide => {
            if r == 0.0 {
                return Err(FormulaError::Evaluation("Division by zero".into()));
            }
            l / r
        }
    };
    Ok(Value::Number(result))
}

/// Apply a comparison operator. `<>` is exactly the negation of `=`.
pub fn evaluate_comparison(op: ComparisonOperator, left: &Value, right: &Value) -> bool {
    let ordering = compare_values(left, right);
    match op {
        ComparisonOperator::Equal => ordering == Some(Ordering::Equal),
        ComparisonOperator::NotEqual => ordering != Some(Ordering::Equal),
        ComparisonOperator::LessThan => ordering == Some(Ordering::Less),
        ComparisonOperator::LessEqual => {
            matches!(ordering, Some(Ordering::Less | Ordering::Equal))
        }
        ComparisonOperator::GreaterThan => ordering == Some(Ordering::Greater),
        ComparisonOperator::GreaterEqual => {
            matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
        }
    }
}

/// Compare two values.
///
/// Numbers and numeric-looking text compare numerically. A boolean compared with
/// anything compares as `TRUE`/`FALSE` text ignoring case; everything else
/// compares as text, case-sensitively. `None` means unordered (NaN).
fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(l), Some(r)) = (left.as_numeric(), right.as_numeric()) {
        return l.partial_cmp(&r);
    }

    if matches!(left, Value::Boolean(_)) || matches!(right, Value::Boolean(_)) {
        let l = left.to_text().to_uppercase();
        let r = right.to_text().to_uppercase();
        return Some(l.cmp(&r));
    }

    Some(left.to_text().cmp(&right.to_text()))
}

/// Evaluate a function call
fn evaluate_function(
    name: &str,
    args: &[FormulaExpr],
    ctx: &EvaluationContext,
) -> FormulaResult<Value> {
    let func = get_function_registry()
        .get(name)
        .ok_or_else(|| FormulaError::UnknownFunction(name.to_string()))?;

    func.check_arity(args.len())?;

    match func.implementation {
        FunctionImpl::Lazy(implementation) => implementation(args, ctx),
        FunctionImpl::Eager(implementation) => {
            let mut evaluated_args = Vec::with_capacity(args.len());
            for arg in args {
                evaluated_args.push(evaluate(arg, ctx)?);
            }
            implementation(&evaluated_args, ctx)
        }
    }
}
