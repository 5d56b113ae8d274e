//! Formula Abstract Syntax Tree types

use formflow_core::Value;

/// Formula expression AST
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaExpr {
    /// `[Name]` reference to a form field
    FieldReference { name: String },

    /// Literal value (string, number or boolean)
    Literal(Value),

    /// Arithmetic operation
    BinaryOperation {
        op: ArithmeticOperator,
        left: Box<FormulaExpr>,
        right: Box<FormulaExpr>,
    },

    /// Comparison, always producing a boolean
    ComparisonOperation {
        op: ComparisonOperator,
        left: Box<FormulaExpr>,
        right: Box<FormulaExpr>,
    },

    /// Function call; `name` is uppercase
    FunctionCall { name: String, args: Vec<FormulaExpr> },
}

impl FormulaExpr {
    pub fn field(name: impl Into<String>) -> Self {
        FormulaExpr::FieldReference { name: name.into() }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        FormulaExpr::Literal(value.into())
    }

    /// Does any call in this tree satisfy `pred`?
    pub fn any_call(&self, pred: &dyn Fn(&str) -> bool) -> bool {
        match self {
            FormulaExpr::FunctionCall { name, args } => {
                pred(name) || args.iter().any(|arg| arg.any_call(pred))
            }
            FormulaExpr::BinaryOperation { left, right, .. }
            | FormulaExpr::ComparisonOperation { left, right, .. } => {
                left.any_call(pred) || right.any_call(pred)
            }
            FormulaExpr::FieldReference { .. } | FormulaExpr::Literal(_) => false,
        }
    }
}

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithmeticOperator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Self::Add),
            "-" => Some(Self::Subtract),
            "*" => Some(Self::Multiply),
            "/" => Some(Self::Divide),
            _ => None,
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
}

impl ComparisonOperator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(Self::Equal),
            "<>" => Some(Self::NotEqual),
            "<" => Some(Self::LessThan),
            "<=" => Some(Self::LessEqual),
            ">" => Some(Self::GreaterThan),
            ">=" => Some(Self::GreaterEqual),
            _ => None,
        }
    }
}
