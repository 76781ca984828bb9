use chrono::{DateTime, Utc};

use crate::task::{ChatMessage, TaskId, TaskState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskMsg {
    /// A new generation/publish job replaces the current record.
    Start {
        task_id: TaskId,
        title: String,
        platform: Option<String>,
        source_url: Option<String>,
        messages: Vec<ChatMessage>,
        at: DateTime<Utc>,
    },
    /// Pipeline moved to another non-terminal stage.
    StageChanged {
        task_id: TaskId,
        stage: TaskState,
        progress: u8,
        message: String,
        at: DateTime<Utc>,
    },
    Progress {
        task_id: TaskId,
        progress: u8,
        message: String,
        at: DateTime<Utc>,
    },
    /// Source page content became available.
    SourceExtracted {
        task_id: TaskId,
        title: Option<String>,
        content: String,
        source_images: Vec<String>,
        at: DateTime<Utc>,
    },
    /// Whole conversation so far, replacing the stored one.
    HistorySnapshot {
        task_id: TaskId,
        history: Vec<ChatMessage>,
        at: DateTime<Utc>,
    },
    Generated {
        task_id: TaskId,
        result: String,
        at: DateTime<Utc>,
    },
    Finished {
        task_id: TaskId,
        message: String,
        at: DateTime<Utc>,
    },
    Failed {
        task_id: TaskId,
        error: String,
        at: DateTime<Utc>,
    },
    /// The destination page confirmed the publish. Only a finished task
    /// for the same platform takes it, and only the first one.
    Published {
        platform: String,
        url: String,
        at: DateTime<Utc>,
    },
    Cancel {
        at: DateTime<Utc>,
    },
    /// Clear a finished task back to `Idle`.
    Reset {
        at: DateTime<Utc>,
    },
}
