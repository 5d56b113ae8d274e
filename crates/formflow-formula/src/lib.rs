//! # formflow-formula
//!
//! Formula language for formflow forms.
//!
//! This crate provides:
//! - Tokenizing and parsing (text → AST) with positioned syntax errors
//! - Evaluation (AST → value) over a builtin function table
//! - A macro preprocessor for aggregate and date functions
//! - A compiled formula cache
//! - Dependency tracking for recalculation chains
//!
//! ## Example
//!
//! ```rust
//! use formflow_core::{FieldMap, FormData, Value};
//! use formflow_formula::FormulaEngine;
//!
//! let mut engine = FormulaEngine::new();
//! let mut data = FormData::new();
//! data.insert("Status".into(), Value::from("Complete"));
//! data.insert("Amount".into(), Value::from(150));
//!
//! let formula = r#"AND([Status]="Complete",[Amount]>100)"#;
//! assert_eq!(engine.evaluate(Some(formula), &data, &FieldMap::new()), Value::Boolean(true));
//! assert_eq!(engine.get_dependencies(formula), vec!["Status", "Amount"]);
//! ```

pub mod ast;
pub mod cache;
pub mod dependency;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod macros;
pub mod parser;

pub use ast::{ArithmeticOperator, ComparisonOperator, FormulaExpr};
pub use cache::{CompiledFormula, FormulaCache};
pub use dependency::{DependencyGraph, NodeKey};
pub use engine::FormulaEngine;
pub use error::{FormulaError, FormulaResult};
pub use evaluator::{evaluate, EvaluationContext};
pub use lexer::{field_references, tokenize, Token, TokenKind};
pub use parser::parse_formula;
