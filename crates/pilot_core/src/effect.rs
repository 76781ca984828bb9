use crate::task::{Task, TaskId};
use crate::view_model::TaskView;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEffect {
    /// Replace the stored record with this one.
    Persist(Task),
    /// Best-effort push to attached UIs.
    Notify(TaskView),
    /// Stop in-flight work of the given task.
    Abort { task_id: TaskId },
}
