use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("empty script")]
    Empty,

    #[error("no script given")]
    MissingScript,

    #[error("syntax error at column {column}: {message}")]
    Syntax { column: usize, message: String },

    #[error("expression nested too deeply at column {column}")]
    TooDeep { column: usize },

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("no method {method}() on {target}")]
    UnknownMethod { target: &'static str, method: String },

    #[error("{name}() takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,

    #[error("range {start}..{end} is too large")]
    RangeTooLarge { start: i64, end: i64 },
}
