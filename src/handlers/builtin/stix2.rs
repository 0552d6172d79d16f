//! STIX 2 patterning syntax check.
//!
//! A tokenizer plus recursive-descent parser over the patterning grammar:
//!
//! ```text
//! pattern      := obs_or (FOLLOWEDBY obs_or)*
//! obs_or       := obs_and (OR obs_and)*
//! obs_and      := obs (AND obs)*
//! obs          := '[' cmp_or ']' qualifier* | '(' pattern ')' qualifier*
//! qualifier    := START t'..' STOP t'..' | WITHIN num SECONDS | REPEATS int TIMES
//! cmp_or       := cmp_and (OR cmp_and)*
//! cmp_and      := prop_test (AND prop_test)*
//! prop_test    := path NOT? op literal | path NOT? IN set | EXISTS path | '(' cmp_or ')'
//! ```
//!
//! Comparisons joined by AND inside one observation must share an object type.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

use crate::handlers::registry::ModuleDescriptor;
use crate::handlers::traits::{HandlerError, ModuleHandler};
use crate::handlers::types::{ConfigBag, Fields, HandlerOutput};

const INPUT: &str = "stix2-pattern";

/// Validates STIX 2 patterns; syntax errors are reported as a successful
/// value so the caller sees the reason next to the pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stix2PatternHandler;

impl Stix2PatternHandler {
    pub fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor::new("stix2_pattern_syntax_validator")
            .description("Check the syntax of a STIX 2 pattern")
            .inputs([INPUT])
    }
}

#[async_trait]
impl ModuleHandler for Stix2PatternHandler {
    async fn run(&self, fields: Fields, _config: ConfigBag) -> Result<HandlerOutput, HandlerError> {
        let pattern = fields
            .str(INPUT)
            .ok_or_else(|| HandlerError::MissingInput(INPUT.to_string()))?;

        let verdict = match validate_pattern(pattern) {
            Ok(()) => "Syntax valid".to_string(),
            Err(err) => format!("Syntax error: \n{err}"),
        };
        Ok(HandlerOutput::values(verdict))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{message} (at position {position})")]
pub struct PatternError {
    pub position: usize,
    pub message: String,
}

impl PatternError {
    fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Check `pattern` against the STIX 2 patterning grammar
pub fn validate_pattern(pattern: &str) -> Result<(), PatternError> {
    let tokens = tokenize(pattern)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: pattern.chars().count(),
        depth: 0,
    };
    parser.observation_expressions()?;
    match parser.peek() {
        None => Ok(()),
        Some(token) => Err(PatternError::new(
            parser.position(),
            format!("unexpected {}", token.describe()),
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LBracket,
    RBracket,
    LParen,
    RParen,
    Colon,
    Dot,
    Comma,
    Star,
    Op(CmpOp),
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Binary,
    Hex,
    Timestamp,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::LBracket => "'['".into(),
            Token::RBracket => "']'".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
            Token::Colon => "':'".into(),
            Token::Dot => "'.'".into(),
            Token::Comma => "','".into(),
            Token::Star => "'*'".into(),
            Token::Op(_) => "comparison operator".into(),
            Token::Ident(name) => format!("'{name}'"),
            Token::Str(_) => "string literal".into(),
            Token::Int(_) | Token::Float(_) => "number".into(),
            Token::Bool(_) => "boolean".into(),
            Token::Binary => "binary literal".into(),
            Token::Hex => "hex literal".into(),
            Token::Timestamp => "timestamp literal".into(),
        }
    }

    fn is_literal(&self) -> bool {
        matches!(
            self,
            Token::Str(_)
                | Token::Int(_)
                | Token::Float(_)
                | Token::Bool(_)
                | Token::Binary
                | Token::Hex
                | Token::Timestamp
        )
    }
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, PatternError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let token = match c {
            '[' => single(&mut i, Token::LBracket),
            ']' => single(&mut i, Token::RBracket),
            '(' => single(&mut i, Token::LParen),
            ')' => single(&mut i, Token::RParen),
            ':' => single(&mut i, Token::Colon),
            '.' => single(&mut i, Token::Dot),
            ',' => single(&mut i, Token::Comma),
            '*' => single(&mut i, Token::Star),
            '=' => {
                i += if chars.get(i + 1) == Some(&'=') { 2 } else { 1 };
                Token::Op(CmpOp::Eq)
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                i += 2;
                Token::Op(CmpOp::Neq)
            }
            '<' => match chars.get(i + 1) {
                Some('>') => {
                    i += 2;
                    Token::Op(CmpOp::Neq)
                }
                Some('=') => {
                    i += 2;
                    Token::Op(CmpOp::Le)
                }
                _ => single(&mut i, Token::Op(CmpOp::Lt)),
            },
            '>' => match chars.get(i + 1) {
                Some('=') => {
                    i += 2;
                    Token::Op(CmpOp::Ge)
                }
                _ => single(&mut i, Token::Op(CmpOp::Gt)),
            },
            '\'' => Token::Str(read_quoted(&chars, &mut i)?),
            'b' | 'h' | 't' if chars.get(i + 1) == Some(&'\'') => {
                i += 1;
                let body = read_quoted(&chars, &mut i)?;
                prefixed_literal(c, &body, start)?
            }
            '+' | '-' | '0'..='9' => read_number(&chars, &mut i)?,
            c if c.is_ascii_alphabetic() || c == '_' => {
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '-')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    _ => Token::Ident(word),
                }
            }
            other => {
                return Err(PatternError::new(
                    start,
                    format!("unexpected character '{other}'"),
                ));
            }
        };

        tokens.push((token, start));
    }

    Ok(tokens)
}

fn single(i: &mut usize, token: Token) -> Token {
    *i += 1;
    token
}

/// Reads a single-quoted string starting at the opening quote.
/// Only `\'` and `\\` escapes are allowed.
fn read_quoted(chars: &[char], i: &mut usize) -> Result<String, PatternError> {
    let start = *i;
    *i += 1;
    let mut value = String::new();

    while *i < chars.len() {
        match chars[*i] {
            '\'' => {
                *i += 1;
                return Ok(value);
            }
            '\\' => match chars.get(*i + 1) {
                Some(escaped @ ('\'' | '\\')) => {
                    value.push(*escaped);
                    *i += 2;
                }
                _ => return Err(PatternError::new(*i, "invalid escape sequence")),
            },
            c => {
                value.push(c);
                *i += 1;
            }
        }
    }

    Err(PatternError::new(start, "unterminated string literal"))
}

fn read_number(chars: &[char], i: &mut usize) -> Result<Token, PatternError> {
    let start = *i;
    if matches!(chars[*i], '+' | '-') {
        *i += 1;
    }

    let digits_start = *i;
    while *i < chars.len() && chars[*i].is_ascii_digit() {
        *i += 1;
    }
    if *i == digits_start {
        return Err(PatternError::new(start, "expected digits"));
    }

    let mut is_float = false;
    if chars.get(*i) == Some(&'.') && chars.get(*i + 1).is_some_and(char::is_ascii_digit) {
        is_float = true;
        *i += 1;
        while *i < chars.len() && chars[*i].is_ascii_digit() {
            *i += 1;
        }
    }

    let text: String = chars[start..*i].iter().collect();
    if is_float {
        text.parse()
            .map(Token::Float)
            .map_err(|_| PatternError::new(start, format!("invalid number '{text}'")))
    } else {
        text.parse()
            .map(Token::Int)
            .map_err(|_| PatternError::new(start, format!("invalid number '{text}'")))
    }
}

fn prefixed_literal(prefix: char, body: &str, position: usize) -> Result<Token, PatternError> {
    match prefix {
        'b' => STANDARD
            .decode(body)
            .map(|_| Token::Binary)
            .map_err(|_| PatternError::new(position, "invalid base64 in binary literal")),
        'h' => {
            if body.len() % 2 == 0 && body.chars().all(|c| c.is_ascii_hexdigit()) {
                Ok(Token::Hex)
            } else {
                Err(PatternError::new(position, "invalid hex literal"))
            }
        }
        _ => {
            let valid = body.ends_with('Z')
                && chrono::DateTime::parse_from_rfc3339(body).is_ok();
            if valid {
                Ok(Token::Timestamp)
            } else {
                Err(PatternError::new(
                    position,
                    format!("invalid timestamp '{body}', expected RFC 3339 in UTC"),
                ))
            }
        }
    }
}

/// Deepest `(` or `[` nesting accepted before the parser gives up
const MAX_DEPTH: usize = 128;

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, position)| *position)
            .unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(token, _)| token.clone());
        self.pos += 1;
        token
    }

    fn error(&self, expected: &str) -> PatternError {
        let found = self
            .peek()
            .map(Token::describe)
            .unwrap_or_else(|| "end of pattern".to_string());
        PatternError::new(self.position(), format!("expected {expected}, found {found}"))
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<(), PatternError> {
        if self.peek() == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(expected))
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word == keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), PatternError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(keyword))
        }
    }

    /// Consume an opening token and descend one nesting level
    fn enter(&mut self) -> Result<(), PatternError> {
        if self.depth >= MAX_DEPTH {
            return Err(PatternError::new(
                self.position(),
                "pattern nested too deeply",
            ));
        }
        self.depth += 1;
        self.pos += 1;
        Ok(())
    }

    fn leave(&mut self, token: Token, expected: &str) -> Result<(), PatternError> {
        self.expect(token, expected)?;
        self.depth -= 1;
        Ok(())
    }

    fn observation_expressions(&mut self) -> Result<(), PatternError> {
        self.observation_or()?;
        while self.eat_keyword("FOLLOWEDBY") {
            self.observation_or()?;
        }
        Ok(())
    }

    fn observation_or(&mut self) -> Result<(), PatternError> {
        self.observation_and()?;
        while self.eat_keyword("OR") {
            self.observation_and()?;
        }
        Ok(())
    }

    fn observation_and(&mut self) -> Result<(), PatternError> {
        self.observation()?;
        while self.eat_keyword("AND") {
            self.observation()?;
        }
        Ok(())
    }

    fn observation(&mut self) -> Result<(), PatternError> {
        match self.peek() {
            Some(Token::LBracket) => {
                self.enter()?;
                self.comparison_or()?;
                self.leave(Token::RBracket, "']'")?;
            }
            Some(Token::LParen) => {
                self.enter()?;
                self.observation_expressions()?;
                self.leave(Token::RParen, "')'")?;
            }
            _ => return Err(self.error("'[' or '('")),
        }
        self.qualifiers()
    }

    fn qualifiers(&mut self) -> Result<(), PatternError> {
        loop {
            if self.eat_keyword("START") {
                self.expect(Token::Timestamp, "timestamp literal")?;
                self.expect_keyword("STOP")?;
                self.expect(Token::Timestamp, "timestamp literal")?;
            } else if self.eat_keyword("WITHIN") {
                let position = self.position();
                match self.advance() {
                    Some(Token::Int(n)) if n > 0 => {}
                    Some(Token::Float(n)) if n > 0.0 => {}
                    _ => {
                        return Err(PatternError::new(
                            position,
                            "WITHIN expects a positive number",
                        ));
                    }
                }
                self.expect_keyword("SECONDS")?;
            } else if self.eat_keyword("REPEATS") {
                let position = self.position();
                match self.advance() {
                    Some(Token::Int(n)) if n > 0 => {}
                    _ => {
                        return Err(PatternError::new(
                            position,
                            "REPEATS expects a positive integer",
                        ));
                    }
                }
                self.expect_keyword("TIMES")?;
            } else {
                return Ok(());
            }
        }
    }

    /// Returns the object types referenced, to enforce the AND rule
    fn comparison_or(&mut self) -> Result<Vec<String>, PatternError> {
        let mut types = self.comparison_and()?;
        while self.eat_keyword("OR") {
            types.extend(self.comparison_and()?);
        }
        Ok(types)
    }

    fn comparison_and(&mut self) -> Result<Vec<String>, PatternError> {
        let start = self.position();
        let mut types = self.property_test()?;
        while self.eat_keyword("AND") {
            types.extend(self.property_test()?);
        }

        if let Some(first) = types.first() {
            if types.iter().any(|t| t != first) {
                return Err(PatternError::new(
                    start,
                    "comparisons joined by AND must reference the same object type",
                ));
            }
        }
        Ok(types)
    }

    fn property_test(&mut self) -> Result<Vec<String>, PatternError> {
        if self.peek() == Some(&Token::LParen) {
            self.enter()?;
            let types = self.comparison_or()?;
            self.leave(Token::RParen, "')'")?;
            return Ok(types);
        }

        if self.eat_keyword("EXISTS") {
            return Ok(vec![self.object_path()?]);
        }

        let object_type = self.object_path()?;
        self.eat_keyword("NOT");

        let position = self.position();
        match self.advance() {
            Some(Token::Op(op)) => self.comparison_literal(op)?,
            Some(Token::Ident(word)) => match word.as_str() {
                "IN" => self.set_literal()?,
                "LIKE" | "MATCHES" | "ISSUBSET" | "ISSUPERSET" => {
                    if !matches!(self.advance(), Some(Token::Str(_))) {
                        return Err(PatternError::new(
                            position,
                            format!("{word} expects a string literal"),
                        ));
                    }
                }
                other => {
                    return Err(PatternError::new(
                        position,
                        format!("unknown comparison operator '{other}'"),
                    ));
                }
            },
            _ => {
                self.pos -= 1;
                return Err(self.error("comparison operator"));
            }
        }

        Ok(vec![object_type])
    }

    fn comparison_literal(&mut self, op: CmpOp) -> Result<(), PatternError> {
        let position = self.position();
        match self.advance() {
            Some(Token::Bool(_)) if !matches!(op, CmpOp::Eq | CmpOp::Neq) => Err(
                PatternError::new(position, "booleans cannot be ordered"),
            ),
            Some(token) if token.is_literal() => Ok(()),
            _ => {
                self.pos -= 1;
                Err(self.error("literal"))
            }
        }
    }

    fn set_literal(&mut self) -> Result<(), PatternError> {
        self.expect(Token::LParen, "'('")?;
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(());
        }

        loop {
            match self.advance() {
                Some(token) if token.is_literal() => {}
                _ => {
                    self.pos -= 1;
                    return Err(self.error("literal"));
                }
            }
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(()),
                _ => {
                    self.pos -= 1;
                    return Err(self.error("',' or ')'"));
                }
            }
        }
    }

    /// `type:property(.property|[index])*`, returns the object type
    fn object_path(&mut self) -> Result<String, PatternError> {
        let position = self.position();
        let object_type = match self.advance() {
            Some(Token::Ident(name)) if is_object_type(&name) => name,
            _ => return Err(PatternError::new(position, "expected object type")),
        };

        self.expect(Token::Colon, "':'")?;
        self.path_component()?;

        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    self.path_component()?;
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let position = self.position();
                    match self.advance() {
                        Some(Token::Int(_) | Token::Star) => {}
                        _ => {
                            return Err(PatternError::new(
                                position,
                                "list index must be an integer or '*'",
                            ));
                        }
                    }
                    self.expect(Token::RBracket, "']'")?;
                }
                _ => return Ok(object_type),
            }
        }
    }

    fn path_component(&mut self) -> Result<(), PatternError> {
        let position = self.position();
        match self.advance() {
            Some(Token::Ident(name)) if !name.contains('-') => Ok(()),
            Some(Token::Str(_)) => Ok(()),
            _ => Err(PatternError::new(position, "expected property name")),
        }
    }
}

fn is_object_type(name: &str) -> bool {
    name.chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.ends_with('-')
}
