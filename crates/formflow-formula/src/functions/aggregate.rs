//! Aggregate and rounding functions
//!
//! Missing or non-numeric arguments count as 0, so `SUM([A],[B])` still
//! produces a number while a field is unanswered.

use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use formflow_core::Value;

fn numbers(args: &[Value]) -> impl Iterator<Item = f64> + '_ {
    args.iter().map(Value::to_number)
}

/// SUM(value, ...)
pub fn fn_sum(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::Number(numbers(args).sum()))
}

/// AVG(value, ...) - 0 when called without arguments
pub fn fn_avg(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    if args.is_empty() {
        return Ok(Value::Number(0.0));
    }
    let total: f64 = numbers(args).sum();
    Ok(Value::Number(total / args.len() as f64))
}

/// MIN(value, ...) - 0 when called without arguments
pub fn fn_min(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::Number(numbers(args).reduce(f64::min).unwrap_or(0.0)))
}

/// MAX(value, ...) - 0 when called without arguments
pub fn fn_max(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::Number(numbers(args).reduce(f64::max).unwrap_or(0.0)))
}

/// COUNT(value, ...) - number of non-blank arguments
pub fn fn_count(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    let count = args.iter().filter(|v| !v.is_blank()).count();
    Ok(Value::Number(count as f64))
}

/// ROUND(number, [num_digits]) - round half away from zero
pub fn fn_round(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    let number = args[0].to_number();
    let num_digits = args.get(1).map_or(0, |v| v.to_number() as i32);
    Ok(Value::Number(round_half_away(number, num_digits)))
}

/// ABS(number)
pub fn fn_abs(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::Number(args[0].to_number().abs()))
}

pub(crate) fn round_half_away(number: f64, num_digits: i32) -> f64 {
    // For negative digits, we round to the left of the decimal point
    let multiplier = 10_f64.powi(num_digits);
    if number >= 0.0 {
        (number * multiplier + 0.5).floor() / multiplier
    } else {
        (number * multiplier - 0.5).ceil() / multiplier
    }
}
