//! Logical functions
//!
//! IF, AND and OR receive their argument expressions unevaluated so that only
//! the branches that decide the result are evaluated.

use crate::ast::FormulaExpr;
use crate::error::FormulaResult;
use crate::evaluator::{evaluate, EvaluationContext};
use formflow_core::Value;

/// IF(condition, if_true, [if_false])
pub fn fn_if(args: &[FormulaExpr], ctx: &EvaluationContext) -> FormulaResult<Value> {
    let condition = evaluate(&args[0], ctx)?;

    if condition.to_bool() {
        evaluate(&args[1], ctx)
    } else {
        match args.get(2) {
            Some(if_false) => evaluate(if_false, ctx),
            None => Ok(Value::Boolean(false)),
        }
    }
}

/// AND(value, ...) - stops at the first falsy argument
pub fn fn_and(args: &[FormulaExpr], ctx: &EvaluationContext) -> FormulaResult<Value> {
    for arg in args {
        if !evaluate(arg, ctx)?.to_bool() {
            return Ok(Value::Boolean(false));
        }
    }
    Ok(Value::Boolean(true))
}

/// OR(value, ...) - stops at the first truthy argument
pub fn fn_or(args: &[FormulaExpr], ctx: &EvaluationContext) -> FormulaResult<Value> {
    for arg in args {
        if evaluate(arg, ctx)?.to_bool() {
            return Ok(Value::Boolean(true));
        }
    }
    Ok(Value::Boolean(false))
}

/// NOT function
pub fn fn_not(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::Boolean(!args[0].to_bool()))
}

/// ISBLANK(value) - null or whitespace-only text
pub fn fn_isblank(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::Boolean(args[0].is_blank()))
}

/// ISNOTBLANK(value)
pub fn fn_isnotblank(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::Boolean(!args[0].is_blank()))
}

#[cfg(test)]
mod tests {
    use crate::evaluator::{evaluate, EvaluationContext};
    use crate::parser::parse_formula;
    use formflow_core::{FieldMap, FormData, Value};

    fn eval(formula: &str, data: &FormData) -> Value {
        let fields = FieldMap::new();
        let ast = parse_formula(formula).unwrap();
        evaluate(&ast, &EvaluationContext::new(data, &fields)).unwrap()
    }

    #[test]
    fn test_if_selects_branch() {
        let mut data = FormData::new();
        data.insert("Age".into(), Value::from(16));
        assert_eq!(
            eval("IF([Age]>=18,\"adult\",\"minor\")", &data),
            Value::text("minor")
        );
        assert_eq!(eval("IF(1>2,\"x\")", &data), Value::Boolean(false));
    }

    #[test]
    fn test_if_skips_untaken_branch() {
        let mut data = FormData::new();
        data.insert("Qty".into(), Value::from(0));
        // [Total]/[Qty] would fail with division by zero if evaluated
        assert_eq!(eval("IF([Qty]>0,[Total]/[Qty],0)", &data), Value::Number(0.0));
    }

    #[test]
    fn test_and_or_not() {
        let mut data = FormData::new();
        data.insert("Status".into(), Value::text("Complete"));
        data.insert("Amount".into(), Value::from(150));

        assert_eq!(
            eval("AND([Status]=\"Complete\",[Amount]>100)", &data),
            Value::Boolean(true)
        );
        assert_eq!(eval("AND(TRUE, 0)", &data), Value::Boolean(false));
        assert_eq!(eval("OR(\"\", [Missing], 1)", &data), Value::Boolean(true));
        assert_eq!(eval("OR(FALSE, 0)", &data), Value::Boolean(false));
        assert_eq!(eval("NOT([Missing])", &data), Value::Boolean(true));
    }

    #[test]
    fn test_blank_checks() {
        let mut data = FormData::new();
        data.insert("Name".into(), Value::text("  "));
        assert_eq!(eval("ISBLANK([Name])", &data), Value::Boolean(true));
        assert_eq!(eval("ISBLANK([Nope])", &data), Value::Boolean(true));
        assert_eq!(eval("ISNOTBLANK(0)", &data), Value::Boolean(true));
    }
}
