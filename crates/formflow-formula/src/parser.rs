//! Formula parser
//!
//! A recursive descent parser over the token stream produced by
//! [`tokenize`](crate::lexer::tokenize), with precedence (loosest first):
//! comparisons, additive, multiplicative, atoms.

use crate::ast::{ArithmeticOperator, ComparisonOperator, FormulaExpr};
use crate::error::{FormulaError, FormulaResult};
use crate::lexer::{tokenize, Token, TokenKind};
use formflow_core::Value;

/// Deepest nesting of parentheses, calls and prefix minus a formula may use
pub const MAX_NESTING_DEPTH: usize = 256;

/// Parse a formula string into an AST
///
/// # Example
/// ```rust
/// use formflow_formula::parse_formula;
///
/// let ast = parse_formula("1+2").unwrap();
/// let ast = parse_formula("IF(AND([A]>0,NOT([B])),\"Yes\",\"No\")").unwrap();
/// ```
pub fn parse_formula(formula: &str) -> FormulaResult<FormulaExpr> {
    let tokens = tokenize(formula)?;
    parse_tokens(&tokens)
}

/// Parse an already tokenized formula. The slice must end with an EOF token.
pub fn parse_tokens(tokens: &[Token]) -> FormulaResult<FormulaExpr> {
    let mut parser = FormulaParser::new(tokens);

    if parser.current().is(TokenKind::Eof) {
        return Err(FormulaError::syntax("Empty formula", parser.current().position));
    }

    let expr = parser.parse_expression()?;

    // Make sure we consumed all input
    let trailing = parser.current();
    if !trailing.is(TokenKind::Eof) {
        return Err(FormulaError::syntax(
            format!("Unexpected '{}' after expression", trailing.value),
            trailing.position,
        ));
    }

    Ok(expr)
}

/// Formula parser
struct FormulaParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
    eof: Token,
}

impl<'a> FormulaParser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        let end = tokens.last().map_or(0, |t| t.position);
        Self {
            tokens,
            pos: 0,
            depth: 0,
            eof: Token::eof(end),
        }
    }

    // === Token access ===

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn consume(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> FormulaResult<Token> {
        if self.current().is(kind) {
            Ok(self.consume())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &str) -> FormulaError {
        let token = self.current();
        let found = if token.is(TokenKind::Eof) {
            "end of formula".to_string()
        } else {
            format!("'{}'", token.value)
        };
        FormulaError::syntax(format!("Expected {}, found {}", expected, found), token.position)
    }

    fn current_operator(&self) -> Option<&str> {
        let token = self.current();
        token.is(TokenKind::Operator).then_some(token.value.as_str())
    }

    /// Run `parse` one nesting level deeper, failing past [`MAX_NESTING_DEPTH`]
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> FormulaResult<T>) -> FormulaResult<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(FormulaError::syntax(
                format!("Formula nested deeper than {} levels", MAX_NESTING_DEPTH),
                self.current().position,
            ));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn arithmetic_operator(&self, allowed: &[ArithmeticOperator]) -> Option<ArithmeticOperator> {
        self.current_operator()
            .and_then(ArithmeticOperator::from_symbol)
            .filter(|op| allowed.contains(op))
    }

    // === Expression parsing with precedence ===

    fn parse_expression(&mut self) -> FormulaResult<FormulaExpr> {
        self.nested(Self::parse_comparison)
    }

    fn parse_comparison(&mut self) -> FormulaResult<FormulaExpr> {
        let mut left = self.parse_additive()?;

        while let Some(op) = self.current_operator().and_then(ComparisonOperator::from_symbol) {
            self.consume();
            let right = self.parse_additive()?;
            left = FormulaExpr::ComparisonOperation {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> FormulaResult<FormulaExpr> {
        let mut left = self.parse_multiplicative()?;

        while let Some(op) =
            self.arithmetic_operator(&[ArithmeticOperator::Add, ArithmeticOperator::Subtract])
        {
            self.consume();
            let right = self.parse_multiplicative()?;
            left = FormulaExpr::BinaryOperation {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> FormulaResult<FormulaExpr> {
        let mut left = self.parse_atom()?;

        while let Some(op) =
            self.arithmetic_operator(&[ArithmeticOperator::Multiply, ArithmeticOperator::Divide])
        {
            self.consume();
            let right = self.parse_atom()?;
            left = FormulaExpr::BinaryOperation {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_atom(&mut self) -> FormulaResult<FormulaExpr> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Field => {
                self.consume();
                Ok(FormulaExpr::FieldReference { name: token.value })
            }

            TokenKind::String => {
                self.consume();
                Ok(FormulaExpr::Literal(Value::Text(token.value)))
            }

            TokenKind::Number => {
                self.consume();
                let n: f64 = token.value.parse().map_err(|_| {
                    FormulaError::syntax(format!("Invalid number '{}'", token.value), token.position)
                })?;
                Ok(FormulaExpr::Literal(Value::Number(n)))
            }

            TokenKind::Boolean => {
                self.consume();
                Ok(FormulaExpr::Literal(Value::Boolean(token.value == "TRUE")))
            }

            TokenKind::Function => {
                self.consume();
                self.parse_function_call(token.value)
            }

            TokenKind::LParen => {
                self.consume();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }

            // Prefix minus on a non-literal operand: 0 - operand
            TokenKind::Operator if token.value == "-" => {
                self.consume();
                let operand = self.nested(Self::parse_atom)?;
                Ok(FormulaExpr::BinaryOperation {
                    op: ArithmeticOperator::Subtract,
                    left: Box::new(FormulaExpr::Literal(Value::Number(0.0))),
                    right: Box::new(operand),
                })
            }

            _ => Err(self.unexpected("a value")),
        }
    }

    fn parse_function_call(&mut self, name: String) -> FormulaResult<FormulaExpr> {
        self.expect(TokenKind::LParen, &format!("'(' after {}", name))?;

        let mut args = Vec::new();

        // Parse arguments, each a full sub-expression
        if !self.current().is(TokenKind::RParen) {
            args.push(self.parse_argument()?);

            while self.current().is(TokenKind::Comma) {
                self.consume();
                args.push(self.parse_argument()?);
            }
        }

        self.expect(TokenKind::RParen, "',' or ')'")?;

        Ok(FormulaExpr::FunctionCall { name, args })
    }

    fn parse_argument(&mut self) -> FormulaResult<FormulaExpr> {
        if matches!(self.current().kind, TokenKind::Comma | TokenKind::RParen) {
            return Err(FormulaError::syntax(
                "Empty function argument",
                self.current().position,
            ));
        }
        self.parse_expression()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse_formula("42").unwrap(), FormulaExpr::literal(42.0));
        assert_eq!(parse_formula("-3.5").unwrap(), FormulaExpr::literal(-3.5));
        assert_eq!(parse_formula("\"Hello\"").unwrap(), FormulaExpr::literal("Hello"));
        assert_eq!(parse_formula("true").unwrap(), FormulaExpr::literal(true));
    }

    #[test]
    fn test_parse_precedence() {
        // Should parse as 1+(2*3)
        let ast = parse_formula("1+2*3").unwrap();
        if let FormulaExpr::BinaryOperation { op, left, right } = ast {
            assert_eq!(op, ArithmeticOperator::Add);
            assert_eq!(*left, FormulaExpr::literal(1.0));
            assert!(matches!(
                *right,
                FormulaExpr::BinaryOperation {
                    op: ArithmeticOperator::Multiply,
                    ..
                }
            ));
        } else {
            panic!("Expected BinaryOperation");
        }

        // Comparison binds loosest
        let ast = parse_formula("[A]+1>=[B]*2").unwrap();
        assert!(matches!(
            ast,
            FormulaExpr::ComparisonOperation {
                op: ComparisonOperator::GreaterEqual,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_parentheses() {
        let ast = parse_formula("([A]+1)*3").unwrap();
        if let FormulaExpr::BinaryOperation { op, left, .. } = ast {
            assert_eq!(op, ArithmeticOperator::Multiply);
            assert!(matches!(
                *left,
                FormulaExpr::BinaryOperation {
                    op: ArithmeticOperator::Add,
                    ..
                }
            ));
        } else {
            panic!("Expected BinaryOperation");
        }
    }

    #[test]
    fn test_parse_nested_function() {
        let ast = parse_formula("IF(AND([A]>0, NOT([B])), FALSE, TRUE)").unwrap();
        if let FormulaExpr::FunctionCall { name, args } = ast {
            assert_eq!(name, "IF");
            assert_eq!(args.len(), 3);
            assert!(matches!(&args[0], FormulaExpr::FunctionCall { name, .. } if name == "AND"));
        } else {
            panic!("Expected FunctionCall");
        }
    }

    #[test]
    fn test_parse_zero_argument_call() {
        let ast = parse_formula("TODAY()").unwrap();
        assert_eq!(
            ast,
            FormulaExpr::FunctionCall {
                name: "TODAY".into(),
                args: vec![]
            }
        );
    }

    #[test]
    fn test_parse_unary_minus_on_field() {
        let ast = parse_formula("-[A]").unwrap();
        assert_eq!(
            ast,
            FormulaExpr::BinaryOperation {
                op: ArithmeticOperator::Subtract,
                left: Box::new(FormulaExpr::literal(0.0)),
                right: Box::new(FormulaExpr::field("A")),
            }
        );
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse_formula("").is_err());
        assert!(parse_formula("(1+2").is_err());
        assert!(parse_formula("1+2)").is_err());
        assert!(parse_formula("AND(1,,2)").is_err());
        assert!(parse_formula("AND(1,)").is_err());
        assert!(parse_formula("1 2").is_err());
        assert!(parse_formula("[A] >").is_err());
        assert!(parse_formula("NOW").is_err());

        let err = parse_formula("[A] = = 1").unwrap_err();
        assert_eq!(err.position(), Some(6));
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |open: &str, close: &str, levels: usize| {
            format!("{}1{}", open.repeat(levels), close.repeat(levels))
        };

        assert_eq!(parse_formula(&nested("(", ")", 50)).unwrap(), FormulaExpr::literal(1.0));
        assert!(parse_formula(&nested("ABS(", ")", 100)).is_ok());

        for formula in [
            nested("(", ")", 20_000),
            nested("ABS(", ")", 20_000),
            nested("-", "", 20_000),
        ] {
            let err = parse_formula(&formula).unwrap_err();
            assert!(matches!(err, FormulaError::Syntax { .. }), "{}", err);
        }
    }

    #[test]
    fn test_left_associative_arithmetic() {
        // 8-2-1 is (8-2)-1
        let ast = parse_formula("8-2-1").unwrap();
        assert_eq!(
            ast,
            FormulaExpr::BinaryOperation {
                op: ArithmeticOperator::Subtract,
                left: Box::new(FormulaExpr::BinaryOperation {
                    op: ArithmeticOperator::Subtract,
                    left: Box::new(FormulaExpr::literal(8.0)),
                    right: Box::new(FormulaExpr::literal(2.0)),
                }),
                right: Box::new(FormulaExpr::literal(1.0)),
            }
        );
        assert!(matches!(
            parse_formula("8/2*3").unwrap(),
            FormulaExpr::BinaryOperation {
                op: ArithmeticOperator::Multiply,
                ..
            }
        ));
    }
}
