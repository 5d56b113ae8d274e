//! Formula engine facade
//!
//! [`FormulaEngine`] is what hosts talk to: it owns the compiled formula cache
//! and turns every failure of an author-supplied formula into a safe result
//! instead of an error.

use crate::cache::FormulaCache;
use crate::error::FormulaResult;
use crate::evaluator::{evaluate, EvaluationContext};
use crate::lexer::field_references;
use crate::macros::expand_formula_text;
use crate::parser::parse_formula;
use chrono::{DateTime, Utc};
use formflow_core::{FieldMap, FormData, Value};
use log::warn;

/// Formula engine
///
/// One engine per open form; engines share nothing.
///
/// # Example
/// ```rust
/// use formflow_core::{FieldMap, FormData, Value};
/// use formflow_formula::FormulaEngine;
///
/// let mut engine = FormulaEngine::new();
/// let mut data = FormData::new();
/// data.insert("Age".into(), Value::from(16));
///
/// let result = engine.evaluate(
///     Some(r#"IF([Age]>=18,"adult","minor")"#),
///     &data,
///     &FieldMap::new(),
/// );
/// assert_eq!(result, Value::text("minor"));
/// ```
#[derive(Debug, Default)]
pub struct FormulaEngine {
    cache: FormulaCache,
}

/// A missing or blank formula means "no condition"
fn is_blank_formula(formula: Option<&str>) -> bool {
    formula.map_or(true, |f| f.trim().is_empty())
}

impl FormulaEngine {
    /// Create a new engine with an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate a formula. Never fails.
    ///
    /// A missing or blank formula yields `TRUE`; any syntax, unknown-function
    /// or runtime failure is logged and yields `FALSE`.
    pub fn evaluate(&mut self, formula: Option<&str>, form_data: &FormData, field_map: &FieldMap) -> Value {
        self.evaluate_at(formula, form_data, field_map, Utc::now())
    }

    /// [`evaluate`](Self::evaluate) with a fixed evaluation instant
    pub fn evaluate_at(
        &mut self,
        formula: Option<&str>,
        form_data: &FormData,
        field_map: &FieldMap,
        now: DateTime<Utc>,
    ) -> Value {
        let Some(formula) = formula.filter(|_| !is_blank_formula(formula)) else {
            return Value::Boolean(true);
        };

        match self.try_evaluate_at(formula, form_data, field_map, now) {
            Ok(value) => value,
            Err(e) => {
                warn!("formula {:?} failed: {}", formula, e);
                Value::Boolean(false)
            }
        }
    }

    /// Evaluate a formula as a condition (visibility, requiredness, completion)
    pub fn evaluate_condition(
        &mut self,
        formula: Option<&str>,
        form_data: &FormData,
        field_map: &FieldMap,
    ) -> bool {
        self.evaluate(formula, form_data, field_map).to_bool()
    }

    /// Evaluate a formula, reporting failures
    pub fn try_evaluate(
        &mut self,
        formula: &str,
        form_data: &FormData,
        field_map: &FieldMap,
    ) -> FormulaResult<Value> {
        self.try_evaluate_at(formula, form_data, field_map, Utc::now())
    }

    /// [`try_evaluate`](Self::try_evaluate) with a fixed evaluation instant
    pub fn try_evaluate_at(
        &mut self,
        formula: &str,
        form_data: &FormData,
        field_map: &FieldMap,
        now: DateTime<Utc>,
    ) -> FormulaResult<Value> {
        let compiled = self.cache.get_compiled(formula)?;
        // Macro functions are evaluated as builtins against this context,
        // so a cached AST never carries a stale aggregate or date
        let ctx = EvaluationContext::new(form_data, field_map).at(now);
        evaluate(&compiled.ast, &ctx)
    }

    /// Check a formula's syntax, reporting the first error with its position.
    /// A missing or blank formula is valid.
    pub fn check(&self, formula: Option<&str>) -> FormulaResult<()> {
        match formula {
            Some(f) if !is_blank_formula(formula) => parse_formula(f).map(|_| ()),
            _ => Ok(()),
        }
    }

    /// Does a formula tokenize and parse? A missing or blank formula is valid.
    pub fn is_valid(&self, formula: Option<&str>) -> bool {
        self.check(formula).is_ok()
    }

    /// Distinct field names referenced by a formula, in order of appearance.
    /// A formula that does not tokenize references nothing.
    pub fn get_dependencies(&self, formula: &str) -> Vec<String> {
        field_references(formula).unwrap_or_else(|e| {
            warn!("cannot extract dependencies from {:?}: {}", formula, e);
            Vec::new()
        })
    }

    /// Expand macro calls against the given data, returning formula text.
    /// Calls that cannot be computed for this data are left as written.
    pub fn expand(
        &self,
        formula: &str,
        form_data: &FormData,
        field_map: &FieldMap,
        now: DateTime<Utc>,
    ) -> FormulaResult<String> {
        let ctx = EvaluationContext::new(form_data, field_map).at(now);
        expand_formula_text(formula, &ctx)
    }

    /// Number of cached compiled formulas
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}
