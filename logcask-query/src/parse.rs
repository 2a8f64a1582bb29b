// Copyright 2025 LogCask contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Minimal query parser
//!
//! Parses the `column: value` subset the CLI needs into the shared AST:
//! `AND` / `OR` / `NOT` combinators, parentheses, quoted values with
//! backslash escapes, and bare values. The full query language lives in
//! the search front-end; this parser exists so filter tooling can accept
//! a query string on its own.

use logcask_core::{LogCaskError, Result};

use crate::ast::{Expression, FilterExpr, Literal};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    And,
    Or,
    Not,
    LParen,
    RParen,
    Colon,
    /// Bare or quoted word; the flag records quoting so values like "5"
    /// can stay strings
    Word(String, bool),
}

struct Tokenizer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.input.get(self.pos) {
            match c {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.pos += 1;
                }
                b'(' => {
                    tokens.push(Token::LParen);
                    self.pos += 1;
                }
                b')' => {
                    tokens.push(Token::RParen);
                    self.pos += 1;
                }
                b':' => {
                    tokens.push(Token::Colon);
                    self.pos += 1;
                }
                b'"' => tokens.push(self.quoted()?),
                _ => tokens.push(self.bare()),
            }
        }
        Ok(tokens)
    }

    fn quoted(&mut self) -> Result<Token> {
        self.pos += 1;
        let mut value = Vec::new();
        loop {
            match self.input.get(self.pos) {
                None => {
                    return Err(LogCaskError::InvalidArgument(
                        "unterminated quoted string in query".into(),
                    ))
                }
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(Token::Word(
                        String::from_utf8_lossy(&value).into_owned(),
                        true,
                    ));
                }
                Some(b'\\') => {
                    // Keep the escape; term extraction unescapes later
                    value.push(b'\\');
                    self.pos += 1;
                    if let Some(&next) = self.input.get(self.pos) {
                        value.push(next);
                        self.pos += 1;
                    }
                }
                Some(&c) => {
                    value.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn bare(&mut self) -> Token {
        let start = self.pos;
        while let Some(&c) = self.input.get(self.pos) {
            if matches!(c, b' ' | b'\t' | b'\r' | b'\n' | b'(' | b')' | b':' | b'"') {
                break;
            }
            self.pos += 1;
        }
        let word = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        match word.to_ascii_uppercase().as_str() {
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            _ => Token::Word(word, false),
        }
    }
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
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            other => Err(LogCaskError::InvalidArgument(format!(
                "expected {expected:?}, found {other:?}"
            ))),
        }
    }

    /// or_expr := and_expr (OR and_expr)*
    fn or_expr(&mut self) -> Result<Expression> {
        let mut children = vec![self.and_expr()?];
        while self.peek() == Some(&Token::Or) {
            self.next();
            children.push(self.and_expr()?);
        }
        Ok(if children.len() == 1 {
            children.pop().expect("non-empty")
        } else {
            Expression::or(children)
        })
    }

    /// and_expr := unary (AND unary)*
    fn and_expr(&mut self) -> Result<Expression> {
        let mut children = vec![self.unary()?];
        while self.peek() == Some(&Token::And) {
            self.next();
            children.push(self.unary()?);
        }
        Ok(if children.len() == 1 {
            children.pop().expect("non-empty")
        } else {
            Expression::and(children)
        })
    }

    /// unary := NOT unary | '(' or_expr ')' | leaf
    fn unary(&mut self) -> Result<Expression> {
        match self.peek() {
            Some(Token::Not) => {
                self.next();
                Ok(self.unary()?.invert())
            }
            Some(Token::LParen) => {
                self.next();
                let expr = self.or_expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            _ => self.leaf(),
        }
    }

    /// leaf := word ':' word
    fn leaf(&mut self) -> Result<Expression> {
        let column = match self.next() {
            Some(Token::Word(name, _)) => name,
            other => {
                return Err(LogCaskError::InvalidArgument(format!(
                    "expected a column name, found {other:?}"
                )))
            }
        };
        self.expect(&Token::Colon)?;
        let (value, quoted) = match self.next() {
            Some(Token::Word(value, quoted)) => (value, quoted),
            other => {
                return Err(LogCaskError::InvalidArgument(format!(
                    "expected a value for column '{column}', found {other:?}"
                )))
            }
        };

        // Bare integers are integer literals; quoting forces a string
        let literal = if !quoted {
            value
                .parse::<i64>()
                .map(Literal::Int)
                .unwrap_or(Literal::VarString(value))
        } else {
            Literal::VarString(value)
        };

        Ok(Expression::filter(FilterExpr::eq(column, literal)))
    }
}

/// Parses a query string into the shared AST.
pub fn parse_query(query: &str) -> Result<Expression> {
    let tokens = Tokenizer::new(query).tokenize()?;
    if tokens.is_empty() {
        return Err(LogCaskError::InvalidArgument("empty query".into()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or_expr()?;
    if parser.peek().is_some() {
        return Err(LogCaskError::InvalidArgument(format!(
            "unexpected trailing token {:?}",
            parser.peek()
        )));
    }
    Ok(expr)
}
