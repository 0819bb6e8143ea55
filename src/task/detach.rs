use crate::context::Runtime;
use crate::task::Task;

/// Start `task` and release it, logging (rather than fully discarding) any
/// failure it produces.
///
/// This is the public fire-and-forget entry point: it wraps `task` in an
/// internal coroutine that actually `.await`s it -- rather than posting the
/// raw frame -- so the user's task is driven to completion and its result
/// observed, even though nobody is left to receive it.
pub fn spawn_detached(rt: &Runtime, task: Task<()>) {
    let wrapper: Task<()> = Task::new(async move {
        if let Err(err) = task.await {
            tracing::warn!(error = %err, "detached task failed");
        }
        Ok(())
    });
    wrapper.start(rt);
}
