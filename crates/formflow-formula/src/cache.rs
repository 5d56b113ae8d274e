//! Compiled formula cache

use crate::ast::FormulaExpr;
use crate::error::FormulaResult;
use crate::macros::contains_macros;
use crate::parser::parse_formula;
use ahash::AHashMap;
use log::debug;
use std::sync::Arc;

/// A parsed formula
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFormula {
    /// Exact source text the AST was built from
    pub source: String,
    /// Parsed expression
    pub ast: FormulaExpr,
    /// The formula calls macro functions, so its value depends on the data
    /// and the clock even though the AST itself is reused
    pub has_macros: bool,
}

/// Memoizes compiled ASTs keyed by exact source text.
///
/// Entries are never evicted; the cache is bounded by the number of distinct
/// formulas authored for a form. Parse failures are not cached.
#[derive(Debug, Default)]
pub struct FormulaCache {
    entries: AHashMap<String, Arc<CompiledFormula>>,
}

impl FormulaCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `source`, or return the previously compiled formula for the
    /// same text. Repeated calls return the same `Arc`.
    pub fn get_compiled(&mut self, source: &str) -> FormulaResult<Arc<CompiledFormula>> {
        if let Some(compiled) = self.entries.get(source) {
            return Ok(Arc::clone(compiled));
        }

        debug!("compiling formula {:?}", source);
        let ast = parse_formula(source)?;
        let compiled = Arc::new(CompiledFormula {
            source: source.to_string(),
            has_macros: contains_macros(&ast),
            ast,
        });
        self.entries.insert(source.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Is `source` already compiled?
    pub fn contains(&self, source: &str) -> bool {
        self.entries.contains_key(source)
    }

    /// Number of cached formulas
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every cached formula
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
