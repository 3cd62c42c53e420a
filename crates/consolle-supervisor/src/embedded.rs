//! `EmbeddedBackend`: an in-process `Backend` with no child, no PTY, and
//! no watchdog. It cannot run Ruby — that would mean embedding a Ruby
//! interpreter, out of scope for a Rust port — so instead it evaluates a
//! small, self-contained arithmetic/variable expression language. This
//! exists to exercise the `Backend` trait contract (and the `=> <value>`
//! formatting convention) at the speed a "no real console" mode implies,
//! not to emulate IRB semantics.

use crate::backend::{Backend, BackendStatus, EvalSuccess};
use crate::error::EvalError;
use async_trait::async_trait;
use consolle_core::SessionConfig;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Number(f64),
    Bool(bool),
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Let,
    Plus,
    Minus,
    Star,
    Slash,
    Eq,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Not,
    AndAnd,
    OrOr,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
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
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::EqEq);
                i += 2;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::AndAnd);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::OrOr);
                i += 2;
            }
            '"' => {
                let mut s = String::new();
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    s.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(parse_error("unterminated string literal"));
                }
                i += 1;
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| parse_error(&format!("invalid number literal '{text}'")))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if word == "let" {
                    tokens.push(Token::Let);
                } else {
                    tokens.push(Token::Ident(word));
                }
            }
            other => return Err(parse_error(&format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

fn parse_error(message: &str) -> EvalError {
    EvalError::ChildError {
        class_name: "SyntaxError".to_string(),
        message: message.to_string(),
        backtrace: Vec::new(),
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    vars: &'a HashMap<String, Value>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        self.pos += 1;
        tok
    }

    fn parse_or(&mut self) -> Result<Value, EvalError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::OrOr)) {
            self.next();
            let right = self.parse_and()?;
            left = Value::Bool(truthy(&left) || truthy(&right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Value, EvalError> {
        let mut left = self.parse_comparison()?;
        while matches!(self.peek(), Some(Token::AndAnd)) {
            self.next();
            let right = self.parse_comparison()?;
            left = Value::Bool(truthy(&left) && truthy(&right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Value, EvalError> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::EqEq) => Some(Token::EqEq),
            Some(Token::NotEq) => Some(Token::NotEq),
            Some(Token::Lt) => Some(Token::Lt),
            Some(Token::Le) => Some(Token::Le),
            Some(Token::Gt) => Some(Token::Gt),
            Some(Token::Ge) => Some(Token::Ge),
            _ => None,
        };
        let Some(op) = op else { return Ok(left) };
        self.next();
        let right = self.parse_additive()?;
        let result = match op {
            Token::EqEq => left == right,
            Token::NotEq => left != right,
            Token::Lt => numeric(&left)? < numeric(&right)?,
            Token::Le => numeric(&left)? <= numeric(&right)?,
            Token::Gt => numeric(&left)? > numeric(&right)?,
            Token::Ge => numeric(&left)? >= numeric(&right)?,
            _ => unreachable!(),
        };
        Ok(Value::Bool(result))
    }

    fn parse_additive(&mut self) -> Result<Value, EvalError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.next();
                    let right = self.parse_multiplicative()?;
                    left = add(left, right)?;
                }
                Some(Token::Minus) => {
                    self.next();
                    let right = self.parse_multiplicative()?;
                    left = Value::Number(numeric(&left)? - numeric(&right)?);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Value, EvalError> {
        let mut left = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.next();
                    let right = self.parse_unary()?;
                    left = Value::Number(numeric(&left)? * numeric(&right)?);
                }
                Some(Token::Slash) => {
                    self.next();
                    let right = self.parse_unary()?;
                    let divisor = numeric(&right)?;
                    if divisor == 0.0 {
                        return Err(EvalError::ChildError {
                            class_name: "ZeroDivisionError".to_string(),
                            message: "divided by 0".to_string(),
                            backtrace: Vec::new(),
                        });
                    }
                    left = Value::Number(numeric(&left)? / divisor);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Value, EvalError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.next();
                let value = self.parse_unary()?;
                Ok(Value::Number(-numeric(&value)?))
            }
            Some(Token::Not) => {
                self.next();
                let value = self.parse_unary()?;
                Ok(Value::Bool(!truthy(&value)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Value, EvalError> {
        match self.next().cloned() {
            Some(Token::Number(n)) => Ok(Value::Number(n)),
            Some(Token::Str(s)) => Ok(Value::Str(s)),
            Some(Token::Ident(name)) if name == "true" => Ok(Value::Bool(true)),
            Some(Token::Ident(name)) if name == "false" => Ok(Value::Bool(false)),
            Some(Token::Ident(name)) => self
                .vars
                .get(&name)
                .cloned()
                .ok_or_else(|| EvalError::ChildError {
                    class_name: "NameError".to_string(),
                    message: format!("undefined local variable or method '{name}'"),
                    backtrace: Vec::new(),
                }),
            Some(Token::LParen) => {
                let value = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(parse_error("expected closing parenthesis")),
                }
            }
            other => Err(parse_error(&format!("unexpected token {other:?}"))),
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0,
        Value::Str(s) => !s.is_empty(),
    }
}

fn numeric(value: &Value) -> Result<f64, EvalError> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(EvalError::ChildError {
            class_name: "TypeError".to_string(),
            message: format!("{other} is not a number"),
            backtrace: Vec::new(),
        }),
    }
}

fn add(left: Value, right: Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (a, b) => Err(EvalError::ChildError {
            class_name: "TypeError".to_string(),
            message: format!("cannot add {a} and {b}"),
            backtrace: Vec::new(),
        }),
    }
}

fn eval_statement(stmt: &str, vars: &mut HashMap<String, Value>) -> Result<Option<Value>, EvalError> {
    let stmt = stmt.trim();
    if stmt.is_empty() {
        return Ok(None);
    }

    if let Some(rest) = stmt.strip_prefix("let ") {
        let (name, expr) = rest
            .split_once('=')
            .ok_or_else(|| parse_error("`let` requires an '=' assignment"))?;
        let name = name.trim().to_string();
        let tokens = tokenize(expr.trim())?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            vars,
        };
        let value = parser.parse_or()?;
        vars.insert(name, value.clone());
        return Ok(Some(value));
    }

    let tokens = tokenize(stmt)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        vars,
    };
    Ok(Some(parser.parse_or()?))
}

/// In-process backend evaluating a tiny expression language instead of
/// hosting a real Ruby console.
pub struct EmbeddedBackend {
    config: SessionConfig,
    vars: Mutex<HashMap<String, Value>>,
}

impl EmbeddedBackend {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            vars: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Backend for EmbeddedBackend {
    async fn eval(&self, code: &str, _timeout: Option<Duration>) -> Result<EvalSuccess, EvalError> {
        let started = Instant::now();
        let mut vars = self.vars.lock().expect("embedded backend mutex poisoned");
        let mut last = None;
        for stmt in code.split(['\n', ';']) {
            last = eval_statement(stmt, &mut vars)?;
        }
        let output = match last {
            Some(value) => format!("=> {value}"),
            None => "=> nil".to_string(),
        };
        Ok(EvalSuccess {
            output,
            execution_time: started.elapsed(),
            truncated: false,
        })
    }

    async fn status(&self) -> BackendStatus {
        BackendStatus {
            running: true,
            pid: None,
            rails_root: self.config.project_root.clone(),
            rails_env: self.config.environment.clone(),
        }
    }

    async fn restart(&self) -> Result<BackendStatus, EvalError> {
        self.vars
            .lock()
            .expect("embedded backend mutex poisoned")
            .clear();
        Ok(self.status().await)
    }

    async fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config() -> SessionConfig {
        SessionConfig {
            project_root: PathBuf::from("/tmp/project"),
            environment: "development".to_string(),
            launch_command: "bin/rails console".to_string(),
            initial_wait_secs: 15,
            custom_prompt_pattern: None,
            backend: consolle_core::BackendKind::EmbedIrb,
            pre_sigint_enabled: true,
        }
    }

    #[tokio::test]
    async fn evaluates_arithmetic() {
        let backend = EmbeddedBackend::new(config());
        let outcome = backend.eval("1 + 2 * 3", None).await.unwrap();
        assert_eq!(outcome.output, "=> 7");
    }

    #[tokio::test]
    async fn persists_variables_across_statements() {
        let backend = EmbeddedBackend::new(config());
        let outcome = backend.eval("let x = 10; x * 2", None).await.unwrap();
        assert_eq!(outcome.output, "=> 20");
    }

    #[tokio::test]
    async fn reports_zero_division() {
        let backend = EmbeddedBackend::new(config());
        let err = backend.eval("1 / 0", None).await.unwrap_err();
        assert_eq!(err.error_code(), consolle_core::ErrorCode::ZeroDivisionError);
    }

    #[tokio::test]
    async fn reports_undefined_variable() {
        let backend = EmbeddedBackend::new(config());
        let err = backend.eval("undefined_var", None).await.unwrap_err();
        assert_eq!(err.error_code(), consolle_core::ErrorCode::NameError);
    }

    #[tokio::test]
    async fn restart_clears_variables() {
        let backend = EmbeddedBackend::new(config());
        backend.eval("let x = 5", None).await.unwrap();
        backend.restart().await.unwrap();
        let err = backend.eval("x", None).await.unwrap_err();
        assert_eq!(err.error_code(), consolle_core::ErrorCode::NameError);
    }
}
