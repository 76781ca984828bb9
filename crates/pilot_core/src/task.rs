use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::view_model::TaskView;

pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Idle,
    Extracting,
    Generating,
    Refining,
    Publishing,
    Done,
    Error,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Error | TaskState::Cancelled)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal() && self != TaskState::Idle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// The single current job. Only the background orchestrator changes it, and
/// always by replacing the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Task {
    pub id: TaskId,
    pub platform: Option<String>,
    pub state: TaskState,
    pub progress: u8,
    pub message: String,
    pub result: String,
    pub error: String,
    pub conversation_history: Vec<ChatMessage>,
    pub title: String,
    pub source_url: Option<String>,
    pub source_images: Vec<String>,
    /// Permalink reported by the destination page once the article is live.
    pub published_url: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            id: self.id.clone(),
            platform: self.platform.clone(),
            state: self.state,
            progress: self.progress,
            message: self.message.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
            conversation_history: self.conversation_history.clone(),
            title: self.title.clone(),
            source_url: self.source_url.clone(),
            source_images: self.source_images.clone(),
            published_url: self.published_url.clone(),
            is_terminal: self.state.is_terminal(),
        }
    }

    pub(crate) fn advance_progress(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
    }
}
