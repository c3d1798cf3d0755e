//! # Custom Formula
//!
//! A tiny arithmetic language for `custom_formula` rules:
//!
//! ```text
//!   expr    := term   (('+' | '-') term)*
//!   term    := factor (('*' | '/') factor)*
//!   factor  := number | variable | '(' expr ')' | '-' factor
//!   variable:= gross | net | products | services | expenses
//!            | displacement | cost | percent
//! ```
//!
//! Money variables are in major units (`gross` of 120.00 reads as `120`),
//! `percent` is the rule value as a percentage (`8.5`), and the result is
//! read back as money in major units. Arithmetic is fixed point with six
//! decimal places; nothing here touches floating point.
//!
//! ```rust
//! use tally_core::formula::{evaluate_formula, FormulaVars};
//! use tally_core::{Money, Rate};
//!
//! let vars = FormulaVars {
//!     gross: Money::from_cents(100_000),
//!     percent: Rate::from_bps(1_000),
//!     ..Default::default()
//! };
//! let amount = evaluate_formula("gross * percent / 100", &vars).unwrap();
//! assert_eq!(amount.cents(), 10_000);
//! ```

use thiserror::Error;

use crate::money::{round_div, Money};
use crate::rate::Rate;

/// Fixed-point scale: six decimal places.
const SCALE: i128 = 1_000_000;

/// Longest formula accepted by the rule editor.
pub const MAX_FORMULA_LENGTH: usize = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormulaError {
    #[error("formula is empty")]
    Empty,

    #[error("formula is longer than {} characters", MAX_FORMULA_LENGTH)]
    TooLong,

    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,
}

/// Values bound to the formula variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormulaVars {
    pub gross: Money,
    pub net: Money,
    pub products: Money,
    pub services: Money,
    pub expenses: Money,
    pub displacement: Money,
    pub cost: Money,
    pub percent: Rate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variable {
    Gross,
    Net,
    Products,
    Services,
    Expenses,
    Displacement,
    Cost,
    Percent,
}

impl Variable {
    fn lookup(name: &str) -> Option<Variable> {
        Some(match name {
            "gross" => Variable::Gross,
            "net" => Variable::Net,
            "products" => Variable::Products,
            "services" => Variable::Services,
            "expenses" => Variable::Expenses,
            "displacement" => Variable::Displacement,
            "cost" => Variable::Cost,
            "percent" => Variable::Percent,
            _ => return None,
        })
    }

    fn value(&self, vars: &FormulaVars) -> i128 {
        // cents and bps are both hundredths of the unit the formula sees
        let hundredths = match self {
            Variable::Gross => vars.gross.cents(),
            Variable::Net => vars.net.cents(),
            Variable::Products => vars.products.cents(),
            Variable::Services => vars.services.cents(),
            Variable::Expenses => vars.expenses.cents(),
            Variable::Displacement => vars.displacement.cents(),
            Variable::Cost => vars.cost.cents(),
            Variable::Percent => vars.percent.bps(),
        };
        hundredths as i128 * (SCALE / 100)
    }
}

// =============================================================================
// Tokenizer
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Number(i128),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, FormulaError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            c if c.is_whitespace() => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                tokens.push(Token::Number(parse_number(&literal)?));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(FormulaError::UnexpectedChar {
                    ch: other,
                    position: i,
                })
            }
        }
    }

    Ok(tokens)
}

/// Parses a decimal literal into fixed point. Digits past the sixth
/// decimal place are dropped.
fn parse_number(literal: &str) -> Result<i128, FormulaError> {
    let bad = || FormulaError::Syntax(format!("invalid number '{literal}'"));

    let (int_part, frac_part) = match literal.split_once('.') {
        Some((i, f)) => (i, f),
        None => (literal, ""),
    };
    if frac_part.contains('.') || (int_part.is_empty() && frac_part.is_empty()) {
        return Err(bad());
    }

    let int_value: i128 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|_| bad())?
    };

    let mut frac_value: i128 = 0;
    let mut place = SCALE / 10;
    for digit in frac_part.chars().take(6) {
        let d = digit.to_digit(10).ok_or_else(bad)? as i128;
        frac_value += d * place;
        place /= 10;
    }

    int_value
        .checked_mul(SCALE)
        .and_then(|v| v.checked_add(frac_value))
        .ok_or(FormulaError::Overflow)
}

// =============================================================================
// Parser
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// A parsed formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    root: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Number(i128),
    Var(Variable),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expression(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.factor()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn factor(&mut self) -> Result<Expr, FormulaError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Ident(name)) => Variable::lookup(&name)
                .map(Expr::Var)
                .ok_or(FormulaError::UnknownVariable(name)),
            Some(Token::Minus) => Ok(Expr::Neg(Box::new(self.factor()?))),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(FormulaError::Syntax("missing ')'".to_string())),
                }
            }
            Some(other) => Err(FormulaError::Syntax(format!("unexpected {other:?}"))),
            None => Err(FormulaError::Syntax("unexpected end of formula".to_string())),
        }
    }
}

impl Formula {
    /// Parses a formula without evaluating it.
    pub fn parse(input: &str) -> Result<Formula, FormulaError> {
        if input.trim().is_empty() {
            return Err(FormulaError::Empty);
        }
        if input.len() > MAX_FORMULA_LENGTH {
            return Err(FormulaError::TooLong);
        }

        let mut parser = Parser {
            tokens: tokenize(&input.to_ascii_lowercase())?,
            pos: 0,
        };
        let root = parser.expression()?;
        if let Some(extra) = parser.peek() {
            return Err(FormulaError::Syntax(format!("unexpected {extra:?}")));
        }
        Ok(Formula { root })
    }

    /// Evaluates the formula and rounds the result to the cent.
    pub fn evaluate(&self, vars: &FormulaVars) -> Result<Money, FormulaError> {
        let value = eval(&self.root, vars)?;
        let cents = round_div(value, SCALE / 100);
        i64::try_from(cents)
            .map(Money::from_cents)
            .map_err(|_| FormulaError::Overflow)
    }
}

fn eval(expr: &Expr, vars: &FormulaVars) -> Result<i128, FormulaError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Var(v) => Ok(v.value(vars)),
        Expr::Neg(inner) => eval(inner, vars)?
            .checked_neg()
            .ok_or(FormulaError::Overflow),
        Expr::Binary(op, l, r) => {
            let a = eval(l, vars)?;
            let b = eval(r, vars)?;
            match op {
                BinOp::Add => a.checked_add(b).ok_or(FormulaError::Overflow),
                BinOp::Sub => a.checked_sub(b).ok_or(FormulaError::Overflow),
                BinOp::Mul => a
                    .checked_mul(b)
                    .map(|p| round_div(p, SCALE))
                    .ok_or(FormulaError::Overflow),
                BinOp::Div => {
                    if b == 0 {
                        return Err(FormulaError::DivisionByZero);
                    }
                    a.checked_mul(SCALE)
                        .map(|n| round_div(n, b))
                        .ok_or(FormulaError::Overflow)
                }
            }
        }
    }
}

/// Parses and evaluates in one step.
pub fn evaluate_formula(input: &str, vars: &FormulaVars) -> Result<Money, FormulaError> {
    Formula::parse(input)?.evaluate(vars)
}
