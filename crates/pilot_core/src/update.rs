use chrono::{DateTime, Utc};
use pilot_logging::pilot_debug;

use crate::task::{ChatMessage, Role};
use crate::{Task, TaskEffect, TaskMsg, TaskState};

/// Pure update function: applies a message to the task and returns any effects.
///
/// Messages addressed to another task id, or arriving after the task reached a
/// terminal state, leave the record untouched and produce no effects.
pub fn update(mut task: Task, msg: TaskMsg) -> (Task, Vec<TaskEffect>) {
    let mut effects = Vec::new();
    let changed_at = match msg {
        TaskMsg::Start {
            task_id,
            title,
            platform,
            source_url,
            messages,
            at,
        } => {
            if task.state.is_active() {
                effects.push(TaskEffect::Abort {
                    task_id: task.id.clone(),
                });
            }
            task = Task {
                id: task_id,
                platform,
                state: TaskState::Idle,
                progress: 0,
                message: "queued".to_string(),
                title,
                source_url,
                conversation_history: messages,
                ..Task::default()
            };
            at
        }
        TaskMsg::StageChanged {
            task_id,
            stage,
            progress,
            message,
            at,
        } => {
            if !accepts(&task, &task_id) || stage.is_terminal() || stage == TaskState::Idle {
                return (task, effects);
            }
            task.state = stage;
            task.advance_progress(progress);
            task.message = message;
            at
        }
        TaskMsg::Progress {
            task_id,
            progress,
            message,
            at,
        } => {
            if !accepts(&task, &task_id) {
                return (task, effects);
            }
            task.advance_progress(progress);
            task.message = message;
            at
        }
        TaskMsg::SourceExtracted {
            task_id,
            title,
            content,
            source_images,
            at,
        } => {
            if !accepts(&task, &task_id) {
                return (task, effects);
            }
            if task.title.trim().is_empty() {
                if let Some(title) = title {
                    task.title = title;
                }
            }
            task.source_images = source_images;
            task.conversation_history
                .push(ChatMessage::new(Role::User, content));
            at
        }
        TaskMsg::HistorySnapshot {
            task_id,
            history,
            at,
        } => {
            if !accepts(&task, &task_id) {
                return (task, effects);
            }
            task.conversation_history = history;
            at
        }
        TaskMsg::Generated {
            task_id,
            result,
            at,
        } => {
            if !accepts(&task, &task_id) {
                return (task, effects);
            }
            task.result = result;
            at
        }
        TaskMsg::Finished {
            task_id,
            message,
            at,
        } => {
            if !accepts(&task, &task_id) {
                return (task, effects);
            }
            task.state = TaskState::Done;
            task.progress = 100;
            task.message = message;
            at
        }
        TaskMsg::Failed { task_id, error, at } => {
            if !accepts(&task, &task_id) {
                return (task, effects);
            }
            task.state = TaskState::Error;
            task.message = format!("failed: {error}");
            task.error = error;
            at
        }
        TaskMsg::Published { platform, url, at } => {
            let matches = task.state == TaskState::Done
                && task.published_url.is_none()
                && task
                    .platform
                    .as_deref()
                    .is_some_and(|own| own.eq_ignore_ascii_case(&platform));
            if !matches {
                pilot_debug!("ignoring {} publish of {} for task {}", platform, url, task.id);
                return (task, effects);
            }
            task.message = format!("published at {url}");
            task.published_url = Some(url);
            at
        }
        TaskMsg::Cancel { at } => {
            if task.state.is_terminal() || task.id.is_empty() {
                return (task, effects);
            }
            effects.push(TaskEffect::Abort {
                task_id: task.id.clone(),
            });
            task.state = TaskState::Cancelled;
            task.message = "cancelled".to_string();
            at
        }
        TaskMsg::Reset { at } => {
            if task.state.is_active() {
                return (task, effects);
            }
            task = Task::default();
            at
        }
    };

    stamp(&mut task, changed_at);
    effects.push(TaskEffect::Persist(task.clone()));
    effects.push(TaskEffect::Notify(task.view()));
    (task, effects)
}

fn accepts(task: &Task, task_id: &str) -> bool {
    let ok = task.id == task_id && !task.state.is_terminal();
    if !ok {
        pilot_debug!(
            "dropping update for task {} (current {} in {:?})",
            task_id,
            task.id,
            task.state
        );
    }
    ok
}

fn stamp(task: &mut Task, at: DateTime<Utc>) {
    task.updated_at = Some(at);
}
