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
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Identifier(String),
    /// Backtick-quoted column name.
    Quoted(String),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    Power,
    LeftParen,
    RightParen,
    Comma,
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    And,
    Or,
    Not,
    If,
    Else,
    True,
    False,
}
impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(v) => write!(f, "{v}"),
            Token::Identifier(name) => write!(f, "{name}"),
            Token::Quoted(name) => write!(f, "`{name}`"),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::DoubleSlash => f.write_str("//"),
            Token::Percent => f.write_str("%"),
            Token::Power => f.write_str("**"),
            Token::LeftParen => f.write_str("("),
            Token::RightParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
            Token::Equal => f.write_str("=="),
            Token::NotEqual => f.write_str("!="),
            Token::Greater => f.write_str(">"),
            Token::GreaterEqual => f.write_str(">="),
            Token::Less => f.write_str("<"),
            Token::LessEqual => f.write_str("<="),
            Token::And => f.write_str("and"),
            Token::Or => f.write_str("or"),
            Token::Not => f.write_str("not"),
            Token::If => f.write_str("if"),
            Token::Else => f.write_str("else"),
            Token::True => f.write_str("true"),
            Token::False => f.write_str("false"),
        }
    }
}

fn keyword(word: &str) -> Option<Token> {
    match word {
        "and" => Some(Token::And),
        "or" => Some(Token::Or),
        "not" => Some(Token::Not),
        "if" => Some(Token::If),
        "else" => Some(Token::Else),
        "true" | "True" => Some(Token::True),
        "false" | "False" => Some(Token::False),
        _ => None,
    }
}

pub fn is_keyword(word: &str) -> bool {
    keyword(word).is_some()
}

pub fn tokenize(formula: &str) -> ExpressionResult<Vec<Token>> {
    let chars: Vec<char> = formula.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < chars.len() {
        let ch = chars[pos];
        if ch.is_whitespace() {
            pos += 1;
            continue;
        }
        if ch.is_ascii_digit() || (ch == '.' && chars.get(pos + 1).is_some_and(char::is_ascii_digit)) {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                pos += 1;
            }
            if pos < chars.len() && matches!(chars[pos], 'e' | 'E') {
                let mut look = pos + 1;
                if look < chars.len() && matches!(chars[look], '+' | '-') {
                    look += 1;
                }
                if look < chars.len() && chars[look].is_ascii_digit() {
                    pos = look;
                    while pos < chars.len() && chars[pos].is_ascii_digit() {
                        pos += 1;
                    }
                }
            }
            let text: String = chars[start..pos].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| ExpressionError::InvalidNumber { text: text.clone() })?;
            tokens.push(Token::Number(value));
            continue;
        }
        if ch.is_alphabetic() || ch == '_' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            let word: String = chars[start..pos].iter().collect();
            tokens.push(keyword(&word).unwrap_or(Token::Identifier(word)));
            continue;
        }
        if ch == '`' {
            let start = pos;
            pos += 1;
            let name_start = pos;
            while pos < chars.len() && chars[pos] != '`' {
                pos += 1;
            }
            if pos >= chars.len() {
                return Err(ExpressionError::UnterminatedQuote { position: start });
            }
            tokens.push(Token::Quoted(chars[name_start..pos].iter().collect()));
            pos += 1;
            continue;
        }
        let next = chars.get(pos + 1).copied();
        let (token, width) = match (ch, next) {
            ('*', Some('*')) => (Token::Power, 2),
            ('/', Some('/')) => (Token::DoubleSlash, 2),
            ('=', Some('=')) => (Token::Equal, 2),
            ('!', Some('=')) => (Token::NotEqual, 2),
            ('>', Some('=')) => (Token::GreaterEqual, 2),
            ('<', Some('=')) => (Token::LessEqual, 2),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('(', _) => (Token::LeftParen, 1),
            (')', _) => (Token::RightParen, 1),
            (',', _) => (Token::Comma, 1),
            ('>', _) => (Token::Greater, 1),
            ('<', _) => (Token::Less, 1),
            _ => return Err(ExpressionError::UnexpectedCharacter { ch, position: pos }),
        };
        tokens.push(token);
        pos += width;
    }
    Ok(tokens)
}

/// Names the formula uses as columns: identifiers and quoted names not
/// immediately followed by `(`.
pub fn column_references(tokens: &[Token]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        let name = match token {
            Token::Identifier(name) if tokens.get(i + 1) != Some(&Token::LeftParen) => name,
            Token::Quoted(name) => name,
            _ => continue,
        };
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_arithmetic_and_keywords() {
        let tokens = tokenize("units_sold*unit_price if x >= 1.5e2 else -3").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("units_sold".into()),
                Token::Star,
                Token::Identifier("unit_price".into()),
                Token::If,
                Token::Identifier("x".into()),
                Token::GreaterEqual,
                Token::Number(150.0),
                Token::Else,
                Token::Minus,
                Token::Number(3.0),
            ]
        );
    }

    #[test]
    fn reads_quoted_column_names() {
        let tokens = tokenize("`unit price` ** 2 // 3").unwrap();
        assert_eq!(tokens[0], Token::Quoted("unit price".into()));
        assert_eq!(tokens[1], Token::Power);
        assert_eq!(tokens[3], Token::DoubleSlash);
        assert_eq!(
            tokenize("`open").unwrap_err(),
            ExpressionError::UnterminatedQuote { position: 0 }
        );
    }

    #[test]
    fn rejects_unknown_characters() {
        assert_eq!(
            tokenize("a $ b").unwrap_err(),
            ExpressionError::UnexpectedCharacter { ch: '$', position: 2 }
        );
        assert!(tokenize("x.real").is_err());
    }

    #[test]
    fn function_names_are_not_column_references() {
        let tokens = tokenize("round(revenue / units, 2) + `unit price` + revenue").unwrap();
        assert_eq!(
            column_references(&tokens),
            vec!["revenue".to_string(), "units".into(), "unit price".into()]
        );
    }
}
