use std::fmt;

use tracing::trace;

use tasker_core::{Task, TaskError, TaskId, TaskValue};

use crate::error::ScriptError;
use crate::eval::evaluate;

/// A task whose work is a single script expression.
///
/// The script is parsed on every execution, so a malformed script only
/// fails once a worker picks it up. The same goes for a task built
/// without a script.
#[derive(Debug, Clone)]
pub struct ScriptTask {
    id: TaskId,
    script: Option<String>,
}

impl ScriptTask {
    pub fn new(script: impl Into<String>) -> Self {
        Self::from_optional(Some(script.into()))
    }

    pub fn from_optional(script: Option<String>) -> Self {
        Self {
            id: TaskId::next(),
            script,
        }
    }

    /// A task with no script; it fails with [`ScriptError::MissingScript`].
    pub fn missing() -> Self {
        Self::from_optional(None)
    }

    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }
}

impl Task for ScriptTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn execute(&self) -> Result<TaskValue, TaskError> {
        let script = self
            .script
            .as_deref()
            .ok_or_else(|| TaskError::execution(ScriptError::MissingScript))?;
        trace!("Evaluating script {}: {}", self.id, script);
        evaluate(script).map_err(TaskError::execution)
    }

    fn name(&self) -> &str {
        "script"
    }
}

impl fmt::Display for ScriptTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ScriptTask={}]", self.id.as_u64())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use serde_json::json;

    use super::*;

    #[test]
    fn each_task_gets_its_own_id() {
        let a = ScriptTask::new("1");
        let b = ScriptTask::new("1");
        assert_ne!(a.id(), b.id());
        assert!(a.id() < b.id());
    }

    #[test]
    fn display_shows_id() {
        let task = ScriptTask::new("[].sum(1)");
        assert_eq!(task.to_string(), format!("[ScriptTask={}]", task.id().as_u64()));
        assert_eq!(task.script(), Some("[].sum(1)"));
        assert_eq!(task.name(), "script");
    }

    #[test]
    fn executes_script() {
        let task = ScriptTask::new("(1..10).sum()");
        assert_eq!(task.execute().unwrap(), json!(55));
    }

    #[test]
    fn failure_keeps_script_error_as_source() {
        let task = ScriptTask::new("This is going to be an error");
        let err = task.execute().unwrap_err();

        assert!(matches!(err, TaskError::Execution(_)));
        let source = err
            .source()
            .and_then(|s| s.downcast_ref::<ScriptError>())
            .expect("script error preserved");
        assert!(matches!(source, ScriptError::Syntax { .. }));
    }

    #[test]
    fn missing_script_fails_at_execution() {
        let task = ScriptTask::missing();
        assert_eq!(task.script(), None);

        let err = task.execute().unwrap_err();
        let source = err
            .source()
            .and_then(|s| s.downcast_ref::<ScriptError>())
            .expect("script error preserved");
        assert_eq!(*source, ScriptError::MissingScript);

        assert!(ScriptTask::from_optional(None).execute().is_err());
        assert_eq!(
            ScriptTask::from_optional(Some("[].sum(3)".into())).execute().unwrap(),
            json!(3)
        );
    }
}
