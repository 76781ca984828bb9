//! Publish pilot core: page logic over an abstract DOM, the task state
//! machine and debug-channel models. No IO lives here.
pub mod content;
pub mod debug;
mod detector;
pub mod dispatch;
mod dom;
mod effect;
mod eval;
mod fill;
pub mod locator;
mod msg;
mod payload;
pub mod platform;
mod store;
mod task;
mod update;
mod view_model;

pub use detector::{
    published_urls, DetectorPhase, DetectorSettings, MutationBatch, PublishDetection,
    PublishDetector, Trigger, REPORTED_STATUS,
};
pub use dom::{closest_button, is_form_control, Dom, DomEvent, EventKind, NodeId, Rect};
pub use effect::TaskEffect;
pub use eval::evaluate;
pub use fill::{FillCompletion, FillController, FillOutcome, FillPhase, FillSettings};
pub use msg::TaskMsg;
pub use payload::{
    read_payload, sweep_stale_payloads, write_payload, AutoPublishOverride, PayloadRead,
    Preferences, PublishPayload, PAYLOAD_TTL_SECS,
};
pub use platform::PlatformProfile;
pub use store::{
    payload_key, payload_keys, MemoryStore, Storage, StoreError, CURRENT_TASK_KEY,
    PREFERENCES_KEY,
};
pub use task::{ChatMessage, Role, Task, TaskId, TaskState};
pub use update::update;
pub use view_model::TaskView;
