//! Arithmetic expression tool.
//!
//! Grammar (right-associative `^`, binding tighter than unary minus):
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := unary (('*' | '/') unary)*
//! unary  := '-' unary | power
//! power  := atom ('^' unary)?
//! atom   := number | '(' expr ')'
//! ```

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_arguments, Tool, ToolError};

/// Evaluates arithmetic over `f64`
#[derive(Debug, Clone, Copy, Default)]
pub struct Calculator;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CalculatorArgs {
    expression: String,
}

#[async_trait]
impl Tool for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression with + - * / ^ and parentheses"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Expression to evaluate, e.g. (2 + 3) * 4"
                }
            },
            "required": ["expression"]
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: CalculatorArgs = parse_arguments(self.name(), arguments)?;
        let result = evaluate(&args.expression)?;
        Ok(json!({ "expression": args.expression, "result": result }))
    }
}

/// Evaluate an expression
pub(crate) fn evaluate(expression: &str) -> anyhow::Result<f64> {
    let mut parser = Parser {
        tokens: tokenize(expression)?,
        pos: 0,
    };
    if parser.tokens.is_empty() {
        bail!("empty expression");
    }
    let value = parser.expr()?;
    if let Some(token) = parser.peek() {
        bail!("unexpected {token:?} at token {}", parser.pos);
    }
    if !value.is_finite() {
        bail!("result is not a finite number");
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Op(char),
    Open,
    Close,
}

fn tokenize(input: &str) -> anyhow::Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = &input[start..end];
                let number = literal
                    .parse()
                    .map_err(|_| anyhow!("invalid number {literal:?}"))?;
                tokens.push(Token::Number(number));
            }
            '+' | '-' | '*' | '/' | '^' => {
                tokens.push(Token::Op(c));
                chars.next();
            }
            '(' => {
                tokens.push(Token::Open);
                chars.next();
            }
            ')' => {
                tokens.push(Token::Close);
                chars.next();
            }
            other => bail!("unexpected character {other:?}"),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> anyhow::Result<f64> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.bump();
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> anyhow::Result<f64> {
        let mut value = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            self.bump();
            let rhs = self.unary()?;
            if op == '*' {
                value *= rhs;
            } else {
                if rhs == 0.0 {
                    bail!("division by zero");
                }
                value /= rhs;
            }
        }
        Ok(value)
    }

    fn unary(&mut self) -> anyhow::Result<f64> {
        if self.peek() == Some(Token::Op('-')) {
            self.bump();
            return Ok(-self.unary()?);
        }
        self.power()
    }

    fn power(&mut self) -> anyhow::Result<f64> {
        let base = self.atom()?;
        if self.peek() == Some(Token::Op('^')) {
            self.bump();
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> anyhow::Result<f64> {
        match self.bump() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Open) => {
                let value = self.expr()?;
                match self.bump() {
                    Some(Token::Close) => Ok(value),
                    _ => bail!("missing closing parenthesis"),
                }
            }
            Some(token) => bail!("unexpected {token:?}"),
            None => bail!("unexpected end of expression"),
        }
    }
}
