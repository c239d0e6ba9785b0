//! Script tasks: units of work described by a one-line expression such as
//! `(1..10).sum()` or `[].sum(100)`.

pub mod error;
pub mod eval;
pub mod task;

pub use error::ScriptError;
pub use eval::evaluate;
pub use task::ScriptTask;
