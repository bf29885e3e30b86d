use std::future::Future;

use tokio::task::JoinHandle;
use tripwire::{Trigger, Tripwire};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task group is stopped already")]
    Stopped,

    #[error("task {name} failed: {source}")]
    Failed {
        name: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("task {name} panicked or was aborted")]
    Panicked { name: &'static str },
}

/// A set of background tasks bound to one cancellation scope.
///
/// `stop` cancels the scope and waits for every task to finish, so no task
/// is left running once it returns.
pub struct TaskGroup {
    trigger: Trigger,
    tripwire: Tripwire,

    running: Vec<(&'static str, JoinHandle<Result<(), BoxError>>)>,
}

impl TaskGroup {
    /// Create a group whose scope is a child of `parent`.
    pub fn new(parent: &Tripwire, name: impl Into<String>) -> TaskGroup {
        let (trigger, tripwire) = parent.child(name);

        TaskGroup {
            trigger,
            tripwire,
            running: vec![],
        }
    }

    /// Spawn a task onto the current Tokio runtime, `f` receives the tripwire
    /// of this group and the task should return once it resolves.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, f: F) -> Result<(), TaskError>
    where
        F: FnOnce(Tripwire) -> Fut,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        if self.trigger.is_cancelled() {
            return Err(TaskError::Stopped);
        }

        let handle = tokio::spawn(f(self.tripwire.clone()));
        self.running.push((name, handle));

        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.running.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    /// Cancel all tasks, and wait until they are finished. Failures of tasks
    /// are returned, stopping twice is fine.
    pub async fn stop(&mut self) -> Vec<TaskError> {
        self.trigger.cancel();

        let mut errors = vec![];
        for (name, handle) in self.running.drain(..) {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(source)) => errors.push(TaskError::Failed { name, source }),
                Err(_err) => errors.push(TaskError::Panicked { name }),
            }
        }

        errors
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        // tasks cannot be awaited here, but they are told to stop at least
        self.trigger.cancel();
    }
}
