//! Text functions

use crate::error::FormulaResult;
use crate::evaluator::EvaluationContext;
use formflow_core::Value;

/// CONTAINS(haystack, needle) - case-sensitive substring test
pub fn fn_contains(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    let haystack = args[0].to_text();
    let needle = args[1].to_text();
    Ok(Value::Boolean(haystack.contains(needle.as_str())))
}

/// LEN(text) - length in characters
pub fn fn_len(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::Number(args[0].to_text().chars().count() as f64))
}

/// UPPER(text)
pub fn fn_upper(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::Text(args[0].to_text().to_uppercase()))
}

/// LOWER(text)
pub fn fn_lower(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::Text(args[0].to_text().to_lowercase()))
}

/// TRIM(text)
pub fn fn_trim(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::Text(args[0].to_text().trim().to_string()))
}

/// CONCAT(value, ...)
pub fn fn_concat(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::Text(args.iter().map(Value::to_text).collect()))
}
