//! Parser for calculated-measure formula templates.
//!
//! A calculated measure is declared as a string template such as
//! `"{activeCount} / NULLIF({count}, 0) * 100"`: arithmetic over other
//! measures of the same cube, referenced by short name inside `{}`. This is
//! parsed exactly once, at registration, into a `CalcAst` — never
//! re-parsed or interpolated at query time. Unknown function names are
//! rejected here, not downstream; this is the whitelist boundary the
//! templated-measure re-architecture note calls for.
//!
//! Lexer/parser shape (char-by-char `Lexer`, recursive-descent `Parser`)
//! mirrors the teacher's `expr_parser::{Lexer, FormulaParser}`, generalized
//! for brace-delimited measure references instead of bare identifiers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    MeasureRef(String),
    Ident(String),
    Number(f64),
    StringLit(String),
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_ident(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn read_number(&mut self) -> Result<f64, CoreError> {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() || c == '.' {
                self.advance();
            } else {
                break;
            }
        }
        let s = &self.input[start..self.pos];
        s.parse::<f64>().map_err(|_| CoreError::Other(anyhow::anyhow!("invalid number in formula: {s}")))
    }

    fn read_string(&mut self) -> Result<String, CoreError> {
        let quote = self.advance().unwrap();
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c == quote {
                let s = self.input[start..self.pos].to_string();
                self.advance();
                return Ok(s);
            }
            self.advance();
        }
        Err(CoreError::Other(anyhow::anyhow!("unterminated string in formula")))
    }

    fn read_measure_ref(&mut self) -> Result<String, CoreError> {
        self.advance(); // consume '{'
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c == '}' {
                let name = self.input[start..self.pos].to_string();
                self.advance();
                return Ok(name);
            }
            self.advance();
        }
        Err(CoreError::Other(anyhow::anyhow!("unterminated measure reference '{{' in formula")))
    }

    fn next_token(&mut self) -> Result<Option<Token>, CoreError> {
        self.skip_whitespace();
        let c = match self.peek_char() {
            Some(c) => c,
            None => return Ok(None),
        };
        let token = match c {
            '{' => Token::MeasureRef(self.read_measure_ref()?),
            '(' => {
                self.advance();
                Token::LParen
            }
            ')' => {
                self.advance();
                Token::RParen
            }
            ',' => {
                self.advance();
                Token::Comma
            }
            '+' => {
                self.advance();
                Token::Plus
            }
            '-' => {
                self.advance();
                Token::Minus
            }
            '*' => {
                self.advance();
                Token::Star
            }
            '/' => {
                self.advance();
                Token::Slash
            }
            '\'' | '"' => Token::StringLit(self.read_string()?),
            c if c.is_ascii_digit() => Token::Number(self.read_number()?),
            c if c.is_ascii_alphabetic() || c == '_' => Token::Ident(self.read_ident()),
            _ => {
                return Err(CoreError::Other(anyhow::anyhow!(
                    "unexpected character '{c}' at position {} in formula",
                    self.pos
                )))
            }
        };
        Ok(Some(token))
    }

    fn tokenize(&mut self) -> Result<Vec<Token>, CoreError> {
        let mut tokens = Vec::new();
        while let Some(tok) = self.next_token()? {
            tokens.push(tok);
        }
        Ok(tokens)
    }
}

/// Whitelisted functions a calculated-measure formula may call. Anything else
/// fails to parse.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CalcFunction {
    Round,
    Coalesce,
    NullIf,
    Abs,
    Greatest,
    Least,
    SafeDivide,
}

fn lookup_function(name: &str) -> Option<CalcFunction> {
    match name.to_ascii_lowercase().as_str() {
        "round" => Some(CalcFunction::Round),
        "coalesce" => Some(CalcFunction::Coalesce),
        "nullif" => Some(CalcFunction::NullIf),
        "abs" => Some(CalcFunction::Abs),
        "greatest" => Some(CalcFunction::Greatest),
        "least" => Some(CalcFunction::Least),
        "safe_divide" => Some(CalcFunction::SafeDivide),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CalcOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// The whitelisted AST a calculated-measure template is parsed into, once, at
/// registration. The query planner walks this and re-emits parameterized SQL
/// against the outer-SELECT aliases; it never re-parses the raw string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum CalcAst {
    MeasureRef { name: String },
    Literal { value: Value },
    Binary { op: CalcOp, left: Box<CalcAst>, right: Box<CalcAst> },
    Call { func: CalcFunction, args: Vec<CalcAst> },
}

impl CalcAst {
    /// Every measure short name this formula references, for cycle detection
    /// and `query/calc-unresolved` validation.
    pub fn referenced_measures(&self, out: &mut Vec<String>) {
        match self {
            CalcAst::MeasureRef { name } => out.push(name.clone()),
            CalcAst::Literal { .. } => {}
            CalcAst::Binary { left, right, .. } => {
                left.referenced_measures(out);
                right.referenced_measures(out);
            }
            CalcAst::Call { args, .. } => {
                for a in args {
                    a.referenced_measures(out);
                }
            }
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    raw: String,
}

impl Parser {
    fn new(raw: String, tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0, raw }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), CoreError> {
        match self.peek() {
            Some(t) if t == expected => {
                self.advance();
                Ok(())
            }
            other => Err(CoreError::Other(anyhow::anyhow!(
                "formula parse error in '{}': expected {expected:?}, found {other:?}",
                self.raw
            ))),
        }
    }

    fn parse(&mut self) -> Result<CalcAst, CoreError> {
        let expr = self.parse_additive()?;
        if self.pos < self.tokens.len() {
            return Err(CoreError::Other(anyhow::anyhow!(
                "formula parse error in '{}': unexpected trailing token {:?}",
                self.raw,
                self.tokens.get(self.pos)
            )));
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> Result<CalcAst, CoreError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => CalcOp::Add,
                Some(Token::Minus) => CalcOp::Subtract,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = CalcAst::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
    }

    fn parse_multiplicative(&mut self) -> Result<CalcAst, CoreError> {
        let mut left = self.parse_primary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => CalcOp::Multiply,
                Some(Token::Slash) => CalcOp::Divide,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_primary()?;
            left = CalcAst::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
    }

    fn parse_primary(&mut self) -> Result<CalcAst, CoreError> {
        match self.peek().cloned() {
            Some(Token::MeasureRef(name)) => {
                self.advance();
                Ok(CalcAst::MeasureRef { name })
            }
            Some(Token::Number(n)) => {
                self.advance();
                let num = serde_json::Number::from_f64(n)
                    .ok_or_else(|| CoreError::Other(anyhow::anyhow!("invalid number in formula: {n}")))?;
                Ok(CalcAst::Literal { value: Value::Number(num) })
            }
            Some(Token::StringLit(s)) => {
                self.advance();
                Ok(CalcAst::Literal { value: Value::String(s) })
            }
            Some(Token::Ident(name)) => {
                self.advance();
                self.expect(&Token::LParen)?;
                let args = self.parse_args()?;
                self.expect(&Token::RParen)?;
                let func = lookup_function(&name).ok_or_else(|| {
                    CoreError::Other(anyhow::anyhow!(
                        "formula '{}' calls unknown or unwhitelisted function '{name}'",
                        self.raw
                    ))
                })?;
                Ok(CalcAst::Call { func, args })
            }
            Some(Token::LParen) => {
                self.advance();
                let expr = self.parse_additive()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            other => Err(CoreError::Other(anyhow::anyhow!(
                "formula parse error in '{}': unexpected token {other:?}",
                self.raw
            ))),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<CalcAst>, CoreError> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            return Ok(args);
        }
        args.push(self.parse_additive()?);
        while let Some(Token::Comma) = self.peek() {
            self.advance();
            args.push(self.parse_additive()?);
        }
        Ok(args)
    }
}

/// Parse a calculated-measure template string into its whitelisted AST.
pub fn parse_calc_formula(raw: &str) -> Result<CalcAst, CoreError> {
    let mut lexer = Lexer::new(raw);
    let tokens = lexer.tokenize()?;
    let mut parser = Parser::new(raw.to_string(), tokens);
    parser.parse()
}
