use std::future::Future;

use tokio::task::JoinHandle;

use crate::statsd::SystemCounters;

/// Spawns an instrumented task with an automatically generated [`TaskId`].
///
/// The task is identified by the source location of the macro invocation.
#[macro_export]
macro_rules! spawn {
    ($future:expr) => {{
        static _ID: ::std::sync::OnceLock<String> = ::std::sync::OnceLock::new();
        let id = _ID.get_or_init(|| {
            let caller = *::std::panic::Location::caller();
            format!("{}:{}", caller.file(), caller.line())
        });
        $crate::spawn($crate::TaskId::_from_location(id.as_str()), $future)
    }};
}

/// Spawns a new asynchronous task, returning a [`JoinHandle`] for it.
///
/// This is an instrumented variant of [`tokio::spawn`], which counts created and terminated
/// tasks per [`TaskId`].
pub fn spawn<F>(task_id: TaskId, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    task_id.emit_metric(SystemCounters::TaskCreated);
    tokio::spawn(async move {
        let _guard = TerminationGuard(task_id);
        future.await
    })
}

/// An identifier for tasks spawned by [`spawn()`], used to log metrics.
#[derive(Debug)]
pub struct TaskId {
    id: &'static str,
}

impl TaskId {
    /// Creates a task ID based on the service's name.
    pub fn for_service<S: crate::Service>() -> Self {
        Self { id: S::name() }
    }

    #[doc(hidden)]
    pub fn _from_location(id: &'static str) -> Self {
        Self { id }
    }

    fn emit_metric(&self, metric: SystemCounters) {
        harvest_statsd::metric!(counter(metric) += 1, id = self.id);
    }
}

/// Counts the task as terminated when it completes, panics or is aborted.
struct TerminationGuard(TaskId);

impl Drop for TerminationGuard {
    fn drop(&mut self) {
        self.0.emit_metric(SystemCounters::TaskTerminated);
    }
}
