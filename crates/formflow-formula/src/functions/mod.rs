//! Built-in formula functions

pub mod aggregate;
pub mod date;
pub mod logical;
pub mod text;

use crate::ast::FormulaExpr;
use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::EvaluationContext;
use formflow_core::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Immutable builtin table (lazily initialized)
static FUNCTION_REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();

pub(crate) fn get_function_registry() -> &'static FunctionRegistry {
    FUNCTION_REGISTRY.get_or_init(FunctionRegistry::new)
}

/// Is `name` (uppercase) a builtin function keyword?
pub fn is_keyword(name: &str) -> bool {
    get_function_registry().get(name).is_some()
}

/// Implementation over already evaluated arguments
pub type EagerFn = fn(&[Value], &EvaluationContext) -> FormulaResult<Value>;

/// Implementation that decides which argument expressions to evaluate
pub type LazyFn = fn(&[FormulaExpr], &EvaluationContext) -> FormulaResult<Value>;

/// Function implementation
#[derive(Clone, Copy)]
pub enum FunctionImpl {
    Eager(EagerFn),
    Lazy(LazyFn),
}

/// Function definition
pub struct FunctionDef {
    /// Function name (uppercase)
    pub name: &'static str,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    /// Implementation
    pub implementation: FunctionImpl,
}

impl FunctionDef {
    fn eager(name: &'static str, min_args: usize, max_args: Option<usize>, f: EagerFn) -> Self {
        Self {
            name,
            min_args,
            max_args,
            implementation: FunctionImpl::Eager(f),
        }
    }

    fn lazy(name: &'static str, min_args: usize, max_args: Option<usize>, f: LazyFn) -> Self {
        Self {
            name,
            min_args,
            max_args,
            implementation: FunctionImpl::Lazy(f),
        }
    }

    /// Check an argument count against this function's arity
    pub fn check_arity(&self, actual: usize) -> FormulaResult<()> {
        if actual < self.min_args {
            return Err(FormulaError::ArgumentCount {
                function: self.name.to_string(),
                expected: format!("at least {}", self.min_args),
                actual,
            });
        }

        if let Some(max) = self.max_args {
            if actual > max {
                return Err(FormulaError::ArgumentCount {
                    function: self.name.to_string(),
                    expected: format!("at most {}", max),
                    actual,
                });
            }
        }

        Ok(())
    }
}

/// Function registry
pub struct FunctionRegistry {
    functions: HashMap<&'static str, FunctionDef>,
}

impl FunctionRegistry {
    /// Create a new registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };

        registry.register_logical_functions();
        registry.register_text_functions();
        registry.register_aggregate_functions();
        registry.register_date_functions();

        registry
    }

    /// Look up a function by (uppercase) name
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name)
    }

    /// Register a function
    pub fn register(&mut self, def: FunctionDef) {
        self.functions.insert(def.name, def);
    }

    fn register_logical_functions(&mut self) {
        self.register(FunctionDef::lazy("IF", 2, Some(3), logical::fn_if));
        self.register(FunctionDef::lazy("AND", 1, None, logical::fn_and));
        self.register(FunctionDef::lazy("OR", 1, None, logical::fn_or));
        self.register(FunctionDef::eager("NOT", 1, Some(1), logical::fn_not));
        self.register(FunctionDef::eager("ISBLANK", 1, Some(1), logical::fn_isblank));
        self.register(FunctionDef::eager("ISNOTBLANK", 1, Some(1), logical::fn_isnotblank));
    }

    fn register_text_functions(&mut self) {
        self.register(FunctionDef::eager("CONTAINS", 2, Some(2), text::fn_contains));
        self.register(FunctionDef::eager("LEN", 1, Some(1), text::fn_len));
        self.register(FunctionDef::eager("UPPER", 1, Some(1), text::fn_upper));
        self.register(FunctionDef::eager("LOWER", 1, Some(1), text::fn_lower));
        self.register(FunctionDef::eager("TRIM", 1, Some(1), text::fn_trim));
        self.register(FunctionDef::eager("CONCAT", 1, None, text::fn_concat));
    }

    fn register_aggregate_functions(&mut self) {
        self.register(FunctionDef::eager("SUM", 0, None, aggregate::fn_sum));
        self.register(FunctionDef::eager("AVG", 0, None, aggregate::fn_avg));
        self.register(FunctionDef::eager("MIN", 0, None, aggregate::fn_min));
        self.register(FunctionDef::eager("MAX", 0, None, aggregate::fn_max));
        self.register(FunctionDef::eager("COUNT", 0, None, aggregate::fn_count));
        self.register(FunctionDef::eager("ROUND", 1, Some(2), aggregate::fn_round));
        self.register(FunctionDef::eager("ABS", 1, Some(1), aggregate::fn_abs));
    }

    fn register_date_functions(&mut self) {
        self.register(FunctionDef::eager("NOW", 0, Some(0), date::fn_now));
        self.register(FunctionDef::eager("TODAY", 0, Some(0), date::fn_today));
        self.register(FunctionDef::eager("DATEDIFF", 2, Some(3), date::fn_datediff));
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
