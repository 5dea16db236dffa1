// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::error::{ExpressionError, ExpressionResult};
use crate::expression::lexer::{is_keyword, Token};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    FloorDivide,
    Modulo,
    Power,
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    And,
    Or,
}
impl BinaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::FloorDivide => "//",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Power => "**",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::Greater => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::Less => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
        }
    }
    fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Or => PREC_OR,
            BinaryOperator::And => PREC_AND,
            BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::Greater
            | BinaryOperator::GreaterEqual
            | BinaryOperator::Less
            | BinaryOperator::LessEqual => PREC_COMPARISON,
            BinaryOperator::Add | BinaryOperator::Subtract => PREC_ADDITIVE,
            BinaryOperator::Multiply
            | BinaryOperator::Divide
            | BinaryOperator::FloorDivide
            | BinaryOperator::Modulo => PREC_MULTIPLICATIVE,
            BinaryOperator::Power => PREC_POWER,
        }
    }
}

/// The fixed function table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    Round,
    Pow,
    Sqrt,
    Log,
    Exp,
    Sum,
    Mean,
    Min,
    Max,
}
impl Function {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "abs" => Some(Function::Abs),
            "round" => Some(Function::Round),
            "pow" => Some(Function::Pow),
            "sqrt" => Some(Function::Sqrt),
            "log" => Some(Function::Log),
            "exp" => Some(Function::Exp),
            "sum" => Some(Function::Sum),
            "mean" => Some(Function::Mean),
            "min" => Some(Function::Min),
            "max" => Some(Function::Max),
            _ => None,
        }
    }
    pub fn name(&self) -> &'static str {
        match self {
            Function::Abs => "abs",
            Function::Round => "round",
            Function::Pow => "pow",
            Function::Sqrt => "sqrt",
            Function::Log => "log",
            Function::Exp => "exp",
            Function::Sum => "sum",
            Function::Mean => "mean",
            Function::Min => "min",
            Function::Max => "max",
        }
    }
    fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Function::Abs | Function::Sqrt | Function::Exp | Function::Sum | Function::Mean => {
                (1, Some(1))
            }
            Function::Round | Function::Log => (1, Some(2)),
            Function::Pow => (2, Some(2)),
            Function::Min | Function::Max => (1, None),
        }
    }
    fn check_arity(&self, found: usize) -> ExpressionResult<()> {
        let (min, max) = self.arity();
        if found >= min && max.map_or(true, |max| found <= max) {
            return Ok(());
        }
        let expected = match max {
            Some(max) if max == min => min.to_string(),
            Some(max) => format!("{min} to {max}"),
            None => format!("at least {min}"),
        };
        Err(ExpressionError::Arity {
            name: self.name().to_string(),
            expected,
            found,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    ColumnRef(String),
    NumericLiteral(f64),
    Unary {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    FunctionCall {
        function: Function,
        args: Vec<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
}

const PREC_CONDITIONAL: u8 = 1;
const PREC_OR: u8 = 2;
const PREC_AND: u8 = 3;
const PREC_NOT: u8 = 4;
const PREC_COMPARISON: u8 = 5;
const PREC_ADDITIVE: u8 = 6;
const PREC_MULTIPLICATIVE: u8 = 7;
const PREC_UNARY: u8 = 8;
const PREC_POWER: u8 = 9;
const PREC_ATOM: u8 = 10;

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Expr::ColumnRef(_) | Expr::FunctionCall { .. } => PREC_ATOM,
            Expr::NumericLiteral(v) if *v < 0.0 => PREC_UNARY,
            Expr::NumericLiteral(_) => PREC_ATOM,
            Expr::Unary {
                op: UnaryOperator::Not,
                ..
            } => PREC_NOT,
            Expr::Unary { .. } => PREC_UNARY,
            Expr::BinaryOp { op, .. } => op.precedence(),
            Expr::Conditional { .. } => PREC_CONDITIONAL,
        }
    }
    /// Column names in first-use order.
    pub fn columns(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_columns(&mut names);
        names
    }
    fn collect_columns<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::ColumnRef(name) => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Expr::NumericLiteral(_) => {}
            Expr::Unary { operand, .. } => operand.collect_columns(names),
            Expr::BinaryOp { left, right, .. } => {
                left.collect_columns(names);
                right.collect_columns(names);
            }
            Expr::FunctionCall { args, .. } => {
                for arg in args {
                    arg.collect_columns(names);
                }
            }
            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                then_branch.collect_columns(names);
                condition.collect_columns(names);
                else_branch.collect_columns(names);
            }
        }
    }
    fn write_with(&self, f: &mut fmt::Formatter<'_>, min_precedence: u8) -> fmt::Result {
        let parenthesise = self.precedence() < min_precedence;
        if parenthesise {
            f.write_str("(")?;
        }
        match self {
            Expr::ColumnRef(name) => {
                if is_plain_identifier(name) {
                    f.write_str(name)?;
                } else {
                    write!(f, "`{name}`")?;
                }
            }
            Expr::NumericLiteral(v) => write!(f, "{v}")?,
            Expr::Unary { op, operand } => match op {
                UnaryOperator::Not => {
                    f.write_str("not ")?;
                    operand.write_with(f, PREC_NOT)?;
                }
                UnaryOperator::Negate | UnaryOperator::Plus => {
                    f.write_str(if *op == UnaryOperator::Negate { "-" } else { "+" })?;
                    operand.write_with(f, PREC_UNARY)?;
                }
            },
            Expr::BinaryOp { op, left, right } => {
                let precedence = op.precedence();
                let (left_min, right_min) = match op {
                    BinaryOperator::Power => (PREC_ATOM, PREC_UNARY),
                    _ if precedence == PREC_COMPARISON => (precedence + 1, precedence + 1),
                    _ => (precedence, precedence + 1),
                };
                left.write_with(f, left_min)?;
                write!(f, " {} ", op.symbol())?;
                right.write_with(f, right_min)?;
            }
            Expr::FunctionCall { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    arg.write_with(f, PREC_CONDITIONAL)?;
                }
                f.write_str(")")?;
            }
            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                then_branch.write_with(f, PREC_OR)?;
                f.write_str(" if ")?;
                condition.write_with(f, PREC_OR)?;
                f.write_str(" else ")?;
                else_branch.write_with(f, PREC_CONDITIONAL)?;
            }
        }
        if parenthesise {
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// Canonical rendering: single spaces around binary operators and only the
/// parentheses precedence requires.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_with(f, PREC_CONDITIONAL)
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    starts_ok && chars.all(|c| c.is_alphanumeric() || c == '_') && !is_keyword(name)
}

pub fn parse(tokens: &[Token]) -> ExpressionResult<Expr> {
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.conditional()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(ExpressionError::UnexpectedToken {
            token: token.to_string(),
        }),
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}
impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }
    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }
    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
    fn expect(&mut self, expected: &Token) -> ExpressionResult<()> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(ExpressionError::UnexpectedToken {
                token: token.to_string(),
            }),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }

    fn conditional(&mut self) -> ExpressionResult<Expr> {
        let then_branch = self.or()?;
        if !self.eat(&Token::If) {
            return Ok(then_branch);
        }
        let condition = self.or()?;
        self.expect(&Token::Else)?;
        let else_branch = self.conditional()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }
    fn or(&mut self) -> ExpressionResult<Expr> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            left = binary(BinaryOperator::Or, left, right);
        }
        Ok(left)
    }
    fn and(&mut self) -> ExpressionResult<Expr> {
        let mut left = self.not()?;
        while self.eat(&Token::And) {
            let right = self.not()?;
            left = binary(BinaryOperator::And, left, right);
        }
        Ok(left)
    }
    fn not(&mut self) -> ExpressionResult<Expr> {
        if self.eat(&Token::Not) {
            let operand = self.not()?;
            return Ok(Expr::Unary {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }
    /// Comparisons do not chain.
    fn comparison(&mut self) -> ExpressionResult<Expr> {
        let left = self.additive()?;
        let op = match self.peek() {
            Some(Token::Equal) => BinaryOperator::Equal,
            Some(Token::NotEqual) => BinaryOperator::NotEqual,
            Some(Token::Greater) => BinaryOperator::Greater,
            Some(Token::GreaterEqual) => BinaryOperator::GreaterEqual,
            Some(Token::Less) => BinaryOperator::Less,
            Some(Token::LessEqual) => BinaryOperator::LessEqual,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.additive()?;
        Ok(binary(op, left, right))
    }
    fn additive(&mut self) -> ExpressionResult<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOperator::Add,
                Some(Token::Minus) => BinaryOperator::Subtract,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
    }
    fn multiplicative(&mut self) -> ExpressionResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOperator::Multiply,
                Some(Token::Slash) => BinaryOperator::Divide,
                Some(Token::DoubleSlash) => BinaryOperator::FloorDivide,
                Some(Token::Percent) => BinaryOperator::Modulo,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = binary(op, left, right);
        }
    }
    fn unary(&mut self) -> ExpressionResult<Expr> {
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOperator::Negate,
            Some(Token::Plus) => UnaryOperator::Plus,
            _ => return self.power(),
        };
        self.pos += 1;
        let operand = self.unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }
    fn power(&mut self) -> ExpressionResult<Expr> {
        let base = self.primary()?;
        if self.eat(&Token::Power) {
            let exponent = self.unary()?;
            return Ok(binary(BinaryOperator::Power, base, exponent));
        }
        Ok(base)
    }
    fn primary(&mut self) -> ExpressionResult<Expr> {
        let token = self.advance().ok_or(ExpressionError::UnexpectedEnd)?;
        match token {
            Token::Number(v) => Ok(Expr::NumericLiteral(*v)),
            Token::True => Ok(Expr::NumericLiteral(1.0)),
            Token::False => Ok(Expr::NumericLiteral(0.0)),
            Token::Quoted(name) => Ok(Expr::ColumnRef(name.clone())),
            Token::Identifier(name) if self.peek() == Some(&Token::LeftParen) => {
                self.pos += 1;
                let function = Function::lookup(name)
                    .ok_or_else(|| ExpressionError::UnknownFunction { name: name.clone() })?;
                let args = self.arguments()?;
                function.check_arity(args.len())?;
                Ok(Expr::FunctionCall { function, args })
            }
            Token::Identifier(name) => Ok(Expr::ColumnRef(name.clone())),
            Token::LeftParen => {
                let inner = self.conditional()?;
                self.expect(&Token::RightParen)?;
                Ok(inner)
            }
            other => Err(ExpressionError::UnexpectedToken {
                token: other.to_string(),
            }),
        }
    }
    fn arguments(&mut self) -> ExpressionResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat(&Token::RightParen) {
            return Ok(args);
        }
        loop {
            args.push(self.conditional()?);
            if self.eat(&Token::RightParen) {
                return Ok(args);
            }
            self.expect(&Token::Comma)?;
        }
    }
}

fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
