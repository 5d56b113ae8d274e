//! Macro preprocessor
//!
//! Aggregate and date functions (`SUM`, `AVG`, `MIN`, `MAX`, `COUNT`, `ROUND`,
//! `NOW`, `TODAY`, `DATEDIFF`) can be expanded in place: each call is replaced
//! by a literal token holding its value for the current form data and instant.
//! Evaluation does not go through this pass; the same functions run as ordinary
//! builtins there, so `IF`/`AND`/`OR` short-circuiting applies to them.
//!
//! The rewrite works on the token stream, not on raw text. Call extents are
//! found by counting parentheses over tokens, so parentheses inside string
//! literals or field names cannot confuse it, and every argument is evaluated
//! as a full sub-expression (macros nested in arguments are expanded first).
//!
//! A call whose value cannot be computed for the current data (division by
//! zero in an untaken branch, say) is left in the output unexpanded.
//!
//! Expanded output depends on the data and the clock, so it must never be
//! cached; see [`FormulaEngine::expand`](crate::FormulaEngine::expand).

use crate::ast::FormulaExpr;
use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::{evaluate, EvaluationContext};
use crate::functions::{get_function_registry, FunctionImpl};
use crate::lexer::{tokenize, Token, TokenKind};
use crate::parser::parse_tokens;
use formflow_core::Value;
use log::debug;

/// Functions handled by the preprocessor
pub const MACRO_FUNCTIONS: &[&str] = &[
    "SUM", "AVG", "MIN", "MAX", "COUNT", "ROUND", "NOW", "TODAY", "DATEDIFF",
];

/// Is `name` (uppercase) expanded by the preprocessor?
pub fn is_macro(name: &str) -> bool {
    MACRO_FUNCTIONS.contains(&name)
}

/// Does a parsed formula contain any macro call?
pub fn contains_macros(expr: &FormulaExpr) -> bool {
    expr.any_call(&|name| is_macro(name))
}

/// Expand every macro call in `tokens`, returning the rewritten stream.
fn expand_macros(tokens: &[Token], ctx: &EvaluationContext) -> FormulaResult<Vec<Token>> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];
        let is_call = token.is(TokenKind::Function)
            && is_macro(&token.value)
            && tokens.get(i + 1).map_or(false, |t| t.is(TokenKind::LParen));

        if !is_call {
            out.push(token.clone());
            i += 1;
            continue;
        }

        let close = matching_paren(tokens, i + 1)?;
        let arguments = split_arguments(&tokens[i + 2..close], tokens[close].position)?;
        let value = arguments
            .into_iter()
            .map(|argument| evaluate_fragment(argument, ctx))
            .collect::<FormulaResult<Vec<_>>>()
            .and_then(|values| apply_macro(&token.value, &values, ctx));

        match value {
            Ok(value) => out.push(literal_token(value, token.position)),
            Err(FormulaError::Evaluation(message)) => {
                debug!("Leaving {} unexpanded: {}", token.value, message);
                out.extend_from_slice(&tokens[i..=close]);
            }
            Err(e) => return Err(e),
        }
        i = close + 1;
    }

    Ok(out)
}

/// Expand macros in formula text and render the result back to formula text.
///
/// Useful for showing authors what a formula evaluates against.
pub fn expand_formula_text(formula: &str, ctx: &EvaluationContext) -> FormulaResult<String> {
    let tokens = tokenize(formula)?;
    parse_tokens(&tokens)?;
    let tokens = expand_macros(&tokens, ctx)?;
    Ok(render_tokens(&tokens))
}

/// Render tokens as formula text
pub fn render_tokens(tokens: &[Token]) -> String {
    let mut text = String::new();
    for token in tokens {
        match token.kind {
            TokenKind::Field => {
                text.push('[');
                text.push_str(&token.value);
                text.push(']');
            }
            TokenKind::String => {
                text.push('"');
                text.push_str(&token.value.replace('"', "\"\""));
                text.push('"');
            }
            TokenKind::Eof => {}
            _ => text.push_str(&token.value),
        }
    }
    text
}

fn apply_macro(name: &str, args: &[Value], ctx: &EvaluationContext) -> FormulaResult<Value> {
    let def = get_function_registry()
        .get(name)
        .ok_or_else(|| FormulaError::UnknownFunction(name.to_string()))?;
    def.check_arity(args.len())?;

    match def.implementation {
        FunctionImpl::Eager(implementation) => implementation(args, ctx),
        FunctionImpl::Lazy(_) => Err(FormulaError::Evaluation(format!(
            "{} cannot be expanded as a macro",
            name
        ))),
    }
}

/// Evaluate a token fragment (one macro argument) as a sub-expression
fn evaluate_fragment(fragment: &[Token], ctx: &EvaluationContext) -> FormulaResult<Value> {
    let mut tokens = expand_macros(fragment, ctx)?;
    let end = tokens.last().map_or(0, |t| t.position);
    tokens.push(Token::eof(end));
    let ast = parse_tokens(&tokens)?;
    evaluate(&ast, ctx)
}

/// Index of the `)` matching the `(` at `open`
fn matching_paren(tokens: &[Token], open: usize) -> FormulaResult<usize> {
    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate().skip(open) {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Ok(idx);
                }
            }
            _ => {}
        }
    }
    Err(FormulaError::syntax("Unmatched '('", tokens[open].position))
}

/// Split the tokens between a call's parentheses at top-level commas
fn split_arguments(inner: &[Token], close_position: usize) -> FormulaResult<Vec<&[Token]>> {
    if inner.is_empty() {
        return Ok(Vec::new());
    }

    let mut arguments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (idx, token) in inner.iter().enumerate() {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            TokenKind::Comma if depth == 0 => {
                if idx == start {
                    return Err(FormulaError::syntax("Empty function argument", token.position));
                }
                arguments.push(&inner[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }

    if start == inner.len() {
        return Err(FormulaError::syntax("Empty function argument", close_position));
    }
    arguments.push(&inner[start..]);
    Ok(arguments)
}

fn literal_token(value: Value, position: usize) -> Token {
    match value {
        Value::Number(n) => Token::number(n, position),
        Value::Boolean(b) => Token::boolean(b, position),
        Value::Text(s) => Token::string(s, position),
        Value::Null => Token::string("", position),
    }
}
