//! Expression evaluator for script tasks.
//!
//! The language is deliberately tiny:
//! - integer literals with `+ - * / %`, unary minus and parentheses
//! - list literals `[1, 2, 3]` and inclusive ranges `(1..10)`
//! - list methods `sum()`, `sum(init)`, `size()`, `min()`, `max()`
//! - `sleep(ms)`, which blocks the worker thread and yields `null`
//!
//! Scripts are tokenized, parsed into an [`Expr`] tree, then evaluated.

use std::iter::{Enumerate, Peekable};
use std::str::Chars;
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::error::ScriptError;

/// Longest range a script may materialize.
const MAX_RANGE_LEN: u64 = 10_000_000;

/// Deepest nesting of parentheses, lists, arguments and unary minus.
/// Keeps parsing and evaluation well inside a worker thread's stack.
pub const MAX_DEPTH: usize = 128;

/// Parse and evaluate a script, returning its value as JSON.
pub fn evaluate(script: &str) -> Result<JsonValue, ScriptError> {
    if script.trim().is_empty() {
        return Err(ScriptError::Empty);
    }
    let tokens = tokenize(script)?;
    let expr = Parser::new(tokens).parse()?;
    Ok(eval(&expr)?.into_json())
}

// ── Tokens ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Int(i64),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    DotDot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    /// 1-based column of the first character, counted in chars.
    column: usize,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ScriptError> {
    let mut tokens = Vec::new();
    let mut chars: Peekable<Enumerate<Chars<'_>>> = input.chars().enumerate().peekable();

    while let Some((pos, ch)) = chars.next() {
        let column = pos + 1;
        let tok = match ch {
            c if c.is_whitespace() => continue,
            '(' => Tok::LParen,
            ')' => Tok::RParen,
            '[' => Tok::LBracket,
            ']' => Tok::RBracket,
            ',' => Tok::Comma,
            '+' => Tok::Plus,
            '-' => Tok::Minus,
            '*' => Tok::Star,
            '/' => Tok::Slash,
            '%' => Tok::Percent,
            '.' => {
                if chars.peek().map(|(_, c)| *c) == Some('.') {
                    chars.next();
                    Tok::DotDot
                } else {
                    Tok::Dot
                }
            }
            c if c.is_ascii_digit() => {
                let mut digits = String::from(c);
                while let Some((_, d)) = chars.peek().copied().filter(|(_, d)| d.is_ascii_digit()) {
                    digits.push(d);
                    chars.next();
                }
                Tok::Int(digits.parse().map_err(|_| ScriptError::Overflow)?)
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::from(c);
                while let Some((_, d)) = chars
                    .peek()
                    .copied()
                    .filter(|(_, d)| d.is_alphanumeric() || *d == '_')
                {
                    ident.push(d);
                    chars.next();
                }
                Tok::Ident(ident)
            }
            other => {
                return Err(ScriptError::Syntax {
                    column,
                    message: format!("unexpected character '{}'", other),
                })
            }
        };
        tokens.push(Token { tok, column });
    }

    tokens.push(Token {
        tok: Tok::Eof,
        column: input.chars().count() + 1,
    });
    Ok(tokens)
}

// ── Syntax tree ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone)]
enum Expr {
    Int(i64),
    List(Vec<Expr>),
    Range(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    /// Left-associative operator chain, kept flat so long chains do not
    /// deepen the tree.
    Chain { first: Box<Expr>, rest: Vec<(BinOp, Expr)> },
    Call { name: String, args: Vec<Expr> },
    Method { target: Box<Expr>, calls: Vec<MethodCall> },
}

#[derive(Debug, Clone)]
struct MethodCall {
    name: String,
    args: Vec<Expr>,
}

// ── Parser ──────────────────────────────────────────────────────────

/// Recursive-descent parser, one function per precedence level.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn parse(mut self) -> Result<Expr, ScriptError> {
        let expr = self.additive()?;
        match self.peek() {
            Tok::Eof => Ok(expr),
            _ => Err(self.unexpected("end of script")),
        }
    }

    fn peek(&self) -> &Tok {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].tok
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn token(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn unexpected(&self, expected: &str) -> ScriptError {
        let token = self.token();
        let found = match &token.tok {
            Tok::Eof => "end of script".to_string(),
            Tok::Int(n) => n.to_string(),
            Tok::Ident(s) => format!("'{}'", s),
            other => format!("{:?}", other),
        };
        ScriptError::Syntax {
            column: token.column,
            message: format!("expected {}, found {}", expected, found),
        }
    }

    fn expect(&mut self, tok: Tok, expected: &str) -> Result<(), ScriptError> {
        if *self.peek() == tok {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn additive(&mut self) -> Result<Expr, ScriptError> {
        let first = self.multiplicative()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => return Ok(chain(first, rest)),
            };
            self.advance();
            rest.push((op, self.multiplicative()?));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ScriptError> {
        let first = self.unary()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::Percent => BinOp::Rem,
                _ => return Ok(chain(first, rest)),
            };
            self.advance();
            rest.push((op, self.unary()?));
        }
    }

    /// Every nested expression passes through here, so this is where
    /// nesting depth is bounded.
    fn unary(&mut self) -> Result<Expr, ScriptError> {
        if self.depth >= MAX_DEPTH {
            return Err(ScriptError::TooDeep {
                column: self.token().column,
            });
        }
        self.depth += 1;
        let expr = if *self.peek() == Tok::Minus {
            self.advance();
            self.unary().map(|inner| Expr::Neg(Box::new(inner)))
        } else {
            self.postfix()
        };
        self.depth -= 1;
        expr
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let target = self.primary()?;
        let mut calls = Vec::new();
        while *self.peek() == Tok::Dot {
            self.advance();
            let Tok::Ident(name) = self.peek().clone() else {
                return Err(self.unexpected("method name"));
            };
            self.advance();
            let args = self.arguments()?;
            calls.push(MethodCall { name, args });
        }
        Ok(if calls.is_empty() {
            target
        } else {
            Expr::Method {
                target: Box::new(target),
                calls,
            }
        })
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        match self.peek().clone() {
            Tok::Int(n) => {
                self.advance();
                Ok(Expr::Int(n))
            }
            Tok::LParen => {
                self.advance();
                let inner = self.additive()?;
                let expr = if *self.peek() == Tok::DotDot {
                    self.advance();
                    let end = self.additive()?;
                    Expr::Range(Box::new(inner), Box::new(end))
                } else {
                    inner
                };
                self.expect(Tok::RParen, "')'")?;
                Ok(expr)
            }
            Tok::LBracket => {
                self.advance();
                let items = self.separated(Tok::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            Tok::Ident(name) => {
                self.advance();
                let args = self.arguments()?;
                Ok(Expr::Call { name, args })
            }
            _ => Err(self.unexpected("a value")),
        }
    }

    /// `'(' [expr (',' expr)*] ')'`
    fn arguments(&mut self) -> Result<Vec<Expr>, ScriptError> {
        self.expect(Tok::LParen, "'('")?;
        self.separated(Tok::RParen, "')'")
    }

    /// Comma-separated expressions up to and including `close`.
    fn separated(&mut self, close: Tok, expected: &str) -> Result<Vec<Expr>, ScriptError> {
        let mut items = Vec::new();
        if *self.peek() == close {
            self.advance();
            return Ok(items);
        }
        loop {
            items.push(self.additive()?);
            match self.peek() {
                Tok::Comma => {
                    self.advance();
                }
                t if *t == close => {
                    self.advance();
                    return Ok(items);
                }
                _ => return Err(self.unexpected(expected)),
            }
        }
    }
}

fn chain(first: Expr, rest: Vec<(BinOp, Expr)>) -> Expr {
    if rest.is_empty() {
        first
    } else {
        Expr::Chain {
            first: Box::new(first),
            rest,
        }
    }
}

// ── Evaluation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Null,
    Int(i64),
    List(Vec<i64>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "integer",
            Value::List(_) => "list",
        }
    }

    fn into_json(self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Int(n) => JsonValue::from(n),
            Value::List(items) => JsonValue::from(items),
        }
    }

    fn expect_int(self, context: &str) -> Result<i64, ScriptError> {
        match self {
            Value::Int(n) => Ok(n),
            other => Err(ScriptError::Type(format!(
                "{} expects an integer, got {}",
                context,
                other.kind()
            ))),
        }
    }
}

fn eval(expr: &Expr) -> Result<Value, ScriptError> {
    match expr {
        Expr::Int(n) => Ok(Value::Int(*n)),
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item)?.expect_int("list literal"))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Expr::Range(start, end) => {
            let start = eval(start)?.expect_int("range")?;
            let end = eval(end)?.expect_int("range")?;
            range(start, end).map(Value::List)
        }
        Expr::Neg(inner) => {
            let n = eval(inner)?.expect_int("unary '-'")?;
            n.checked_neg().map(Value::Int).ok_or(ScriptError::Overflow)
        }
        Expr::Chain { first, rest } => {
            let mut acc = eval(first)?.expect_int("arithmetic")?;
            for (op, rhs) in rest {
                let rhs = eval(rhs)?.expect_int("arithmetic")?;
                acc = binary(*op, acc, rhs)?;
            }
            Ok(Value::Int(acc))
        }
        Expr::Call { name, args } => call(name, args),
        Expr::Method { target, calls } => {
            let mut value = eval(target)?;
            for call in calls {
                let args = call.args.iter().map(eval).collect::<Result<Vec<_>, _>>()?;
                value = method(value, &call.name, args)?;
            }
            Ok(value)
        }
    }
}

/// Inclusive range; descends when `start > end`.
fn range(start: i64, end: i64) -> Result<Vec<i64>, ScriptError> {
    let len = start.abs_diff(end).saturating_add(1);
    if len > MAX_RANGE_LEN {
        return Err(ScriptError::RangeTooLarge { start, end });
    }
    Ok(if start <= end {
        (start..=end).collect()
    } else {
        (end..=start).rev().collect()
    })
}

fn binary(op: BinOp, lhs: i64, rhs: i64) -> Result<i64, ScriptError> {
    let result = match op {
        BinOp::Add => lhs.checked_add(rhs),
        BinOp::Sub => lhs.checked_sub(rhs),
        BinOp::Mul => lhs.checked_mul(rhs),
        BinOp::Div | BinOp::Rem if rhs == 0 => return Err(ScriptError::DivisionByZero),
        BinOp::Div => lhs.checked_div(rhs),
        BinOp::Rem => lhs.checked_rem(rhs),
    };
    result.ok_or(ScriptError::Overflow)
}

fn call(name: &str, args: &[Expr]) -> Result<Value, ScriptError> {
    match name {
        "sleep" => {
            let [millis] = args else {
                return Err(ScriptError::Arity {
                    name: name.to_string(),
                    expected: "1",
                    got: args.len(),
                });
            };
            let millis = eval(millis)?.expect_int("sleep()")?;
            let millis = u64::try_from(millis)
                .map_err(|_| ScriptError::Type("sleep() expects a non-negative duration".into()))?;
            std::thread::sleep(Duration::from_millis(millis));
            Ok(Value::Null)
        }
        _ => Err(ScriptError::UnknownFunction(name.to_string())),
    }
}

fn method(target: Value, name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
    let items = match target {
        Value::List(items) => items,
        other => {
            return Err(ScriptError::UnknownMethod {
                target: other.kind(),
                method: name.to_string(),
            })
        }
    };

    let arity = |expected: &'static str| ScriptError::Arity {
        name: name.to_string(),
        expected,
        got: args.len(),
    };

    match name {
        "sum" => {
            let init = match args.len() {
                0 => 0,
                1 => args[0].clone().expect_int("sum()")?,
                _ => return Err(arity("0 or 1")),
            };
            items
                .iter()
                .try_fold(init, |acc, n| acc.checked_add(*n))
                .map(Value::Int)
                .ok_or(ScriptError::Overflow)
        }
        "size" | "min" | "max" if !args.is_empty() => Err(arity("0")),
        "size" => Ok(Value::Int(items.len() as i64)),
        "min" => Ok(items.iter().min().map_or(Value::Null, |n| Value::Int(*n))),
        "max" => Ok(items.iter().max().map_or(Value::Null, |n| Value::Int(*n))),
        _ => Err(ScriptError::UnknownMethod {
            target: "list",
            method: name.to_string(),
        }),
    }
}
