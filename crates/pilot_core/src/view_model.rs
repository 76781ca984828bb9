use serde::{Deserialize, Serialize};

use crate::task::{ChatMessage, TaskState};

/// Status payload handed to any attached UI.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: String,
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
    pub published_url: Option<String>,
    pub is_terminal: bool,
}
