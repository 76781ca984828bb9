//! Background owner of the current task: runs the extract, generate, refine
//! and publish pipeline and is the only writer of the stored task record.

use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use pilot_core::{
    platform, update, write_payload, ChatMessage, PlatformProfile, PublishPayload, Role, Storage,
    Task, TaskEffect, TaskId, TaskMsg, TaskState, TaskView, CURRENT_TASK_KEY,
};
use pilot_logging::{pilot_debug, pilot_error, pilot_info, pilot_warn};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::convert::{markdown_title, markdown_to_html, Converter};
use crate::decode::decode_html;
use crate::extract::Extractor;
use crate::fetch::Fetcher;
use crate::report::{PublishReport, ReportSink};
use crate::session::{lock, SharedStore};
use crate::{system_clock, Clock};

const NOTIFY_CAPACITY: usize = 64;
const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub source_url: Option<String>,
    pub platform: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    #[error("generation cancelled")]
    Cancelled,
    #[error("generation failed: {0}")]
    Failed(String),
}

/// The language-model collaborator. Given the conversation so far, answers
/// with markdown. Must return promptly once `cancel` fires.
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        history: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<String, GenerateError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not open the {platform} editor: {message}")]
pub struct OpenError {
    pub platform: String,
    pub message: String,
}

/// Opens the destination editor once its payload is in storage. Called
/// with the task store locked, so implementations must not touch it.
pub trait PageOpener: Send + Sync {
    fn open(&self, profile: &'static PlatformProfile) -> Result<(), OpenError>;
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("unknown platform {0}")]
    UnknownPlatform(String),
    #[error("orchestrator is not running")]
    Stopped,
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    /// When set, the draft goes through a second pass with this instruction.
    pub refine_prompt: Option<String>,
}

/// Everything the pipeline talks to.
pub struct Collaborators {
    pub store: SharedStore,
    pub fetcher: Arc<dyn Fetcher>,
    pub extractor: Arc<dyn Extractor>,
    pub converter: Arc<dyn Converter>,
    pub generator: Arc<dyn Generator>,
    pub opener: Arc<dyn PageOpener>,
}

enum Command {
    Start { task_id: TaskId, request: StartRequest },
    Cancel,
    Published { platform: String, url: String },
    Shutdown,
}

struct Inner {
    parts: Collaborators,
    settings: OrchestratorSettings,
    clock: Clock,
    notify: broadcast::Sender<TaskView>,
    running: Mutex<Option<(TaskId, CancellationToken)>>,
}

pub struct OrchestratorHandle {
    cmd_tx: mpsc::Sender<Command>,
    inner: Arc<Inner>,
    worker: Option<thread::JoinHandle<()>>,
}

impl OrchestratorHandle {
    pub fn spawn(
        parts: Collaborators,
        settings: OrchestratorSettings,
    ) -> Result<Self, OrchestratorError> {
        Self::spawn_with_clock(parts, settings, system_clock())
    }

    pub fn spawn_with_clock(
        parts: Collaborators,
        settings: OrchestratorSettings,
        clock: Clock,
    ) -> Result<Self, OrchestratorError> {
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        let inner = Arc::new(Inner {
            parts,
            settings,
            clock,
            notify,
            running: Mutex::new(None),
        });
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("pilot-orchestrator")
            .build()?;
        let (cmd_tx, cmd_rx) = mpsc::channel();

        let worker_inner = inner.clone();
        let worker = thread::spawn(move || {
            while let Ok(command) = cmd_rx.recv() {
                match command {
                    Command::Start { task_id, request } => {
                        let cancel = worker_inner.begin(&task_id, &request);
                        let inner = worker_inner.clone();
                        runtime.spawn(async move {
                            inner.run_pipeline(task_id, request, cancel).await;
                        });
                    }
                    Command::Cancel => {
                        let at = (worker_inner.clock)();
                        worker_inner.apply(TaskMsg::Cancel { at });
                    }
                    Command::Published { platform, url } => {
                        let at = (worker_inner.clock)();
                        worker_inner.apply(TaskMsg::Published { platform, url, at });
                    }
                    Command::Shutdown => break,
                }
            }
            if let Some((_, cancel)) = lock(&worker_inner.running).take() {
                cancel.cancel();
            }
            runtime.shutdown_timeout(Duration::from_secs(2));
            pilot_info!("orchestrator stopped");
        });

        Ok(Self {
            cmd_tx,
            inner,
            worker: Some(worker),
        })
    }

    /// Queues a new task; a task still running is cancelled first.
    pub fn start(&self, request: StartRequest) -> Result<TaskId, OrchestratorError> {
        if platform::by_id(&request.platform).is_none() {
            return Err(OrchestratorError::UnknownPlatform(request.platform));
        }
        let task_id = uuid::Uuid::new_v4().to_string();
        self.cmd_tx
            .send(Command::Start {
                task_id: task_id.clone(),
                request,
            })
            .map_err(|_| OrchestratorError::Stopped)?;
        Ok(task_id)
    }

    pub fn cancel(&self) -> Result<(), OrchestratorError> {
        self.cmd_tx
            .send(Command::Cancel)
            .map_err(|_| OrchestratorError::Stopped)
    }

    /// A report sink that records confirmed publishes on the current task.
    pub fn reporter(&self) -> TaskReportSink {
        TaskReportSink {
            cmd_tx: Mutex::new(self.cmd_tx.clone()),
        }
    }

    /// The stored record; an empty store reads as an idle task.
    pub fn status(&self) -> TaskView {
        self.inner.load().view()
    }

    /// For a UI coming (back) to life: what the store holds right now, plus
    /// every change from here on.
    pub fn attach(&self) -> (TaskView, broadcast::Receiver<TaskView>) {
        let rx = self.inner.notify.subscribe();
        (self.status(), rx)
    }

    pub fn shutdown(mut self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                pilot_error!("orchestrator thread panicked");
            }
        }
    }
}

pub struct TaskReportSink {
    cmd_tx: Mutex<mpsc::Sender<Command>>,
}

#[async_trait::async_trait]
impl ReportSink for TaskReportSink {
    async fn report(&self, report: PublishReport) {
        let cmd_tx = lock(&self.cmd_tx);
        for article in report.articles {
            let command = Command::Published {
                platform: report.platform.clone(),
                url: article.url,
            };
            if cmd_tx.send(command).is_err() {
                pilot_warn!("orchestrator gone; {} publish not recorded", report.platform);
                return;
            }
        }
    }
}

enum Step<T> {
    Continue(T),
    Stop,
}

fn read_task(store: &dyn Storage) -> Task {
    match store.get(CURRENT_TASK_KEY) {
        Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|err| {
            pilot_warn!("stored task is unreadable, treating as idle: {}", err);
            Task::default()
        }),
        Ok(None) => Task::default(),
        Err(err) => {
            pilot_warn!("could not read current task: {}", err);
            Task::default()
        }
    }
}

fn write_task(store: &mut dyn Storage, task: &Task) {
    let value = match serde_json::to_value(task) {
        Ok(value) => value,
        Err(err) => {
            pilot_error!("could not encode task {}: {}", task.id, err);
            return;
        }
    };
    if let Err(err) = store.set(CURRENT_TASK_KEY, value) {
        pilot_error!("could not persist task {}: {}", task.id, err);
    }
}

impl Inner {
    fn load(&self) -> Task {
        read_task(&*lock(&self.parts.store))
    }

    /// Runs one message through the reducer and carries out its effects.
    /// The store stays locked from read to write so concurrent messages
    /// never overwrite each other.
    fn apply(&self, msg: TaskMsg) -> Task {
        let mut store = lock(&self.parts.store);
        let (task, aborted) = self.apply_locked(&mut *store, msg);
        drop(store);
        if let Some(task_id) = aborted {
            self.abort(&task_id);
        }
        task
    }

    fn apply_locked(&self, store: &mut dyn Storage, msg: TaskMsg) -> (Task, Option<TaskId>) {
        let (task, effects) = update(read_task(store), msg);
        let mut aborted = None;
        for effect in effects {
            match effect {
                TaskEffect::Persist(record) => write_task(store, &record),
                TaskEffect::Notify(view) => {
                    let _ = self.notify.send(view);
                }
                TaskEffect::Abort { task_id } => aborted = Some(task_id),
            }
        }
        (task, aborted)
    }

    fn abort(&self, task_id: &TaskId) {
        let mut running = lock(&self.running);
        if running.as_ref().is_some_and(|(id, _)| id == task_id) {
            if let Some((_, cancel)) = running.take() {
                pilot_info!("aborting task {}", task_id);
                cancel.cancel();
            }
        }
    }

    fn begin(&self, task_id: &TaskId, request: &StartRequest) -> CancellationToken {
        let at = (self.clock)();
        self.apply(TaskMsg::Start {
            task_id: task_id.clone(),
            title: request.title.clone(),
            platform: Some(request.platform.clone()),
            source_url: request.source_url.clone(),
            messages: request.messages.clone(),
            at,
        });
        let cancel = CancellationToken::new();
        *lock(&self.running) = Some((task_id.clone(), cancel.clone()));
        cancel
    }

    fn stage(&self, task_id: &TaskId, stage: TaskState, progress: u8, message: &str) {
        let at = (self.clock)();
        self.apply(TaskMsg::StageChanged {
            task_id: task_id.clone(),
            stage,
            progress,
            message: message.to_string(),
            at,
        });
    }

    fn fail(&self, task_id: &TaskId, error: String) {
        pilot_warn!("task {} failed: {}", task_id, error);
        let at = (self.clock)();
        self.apply(TaskMsg::Failed {
            task_id: task_id.clone(),
            error,
            at,
        });
    }

    async fn run_pipeline(&self, task_id: TaskId, request: StartRequest, cancel: CancellationToken) {
        pilot_info!("task {} started for {}", task_id, request.platform);
        if let Some(url) = request.source_url.as_deref() {
            if request.messages.is_empty() {
                if let Step::Stop = self.extract(&task_id, url, &cancel).await {
                    return;
                }
            }
        }

        let Step::Continue(draft) = self
            .generate(&task_id, TaskState::Generating, 30, "generating", None, &cancel)
            .await
        else {
            return;
        };
        let mut article = draft;
        if let Some(prompt) = self.settings.refine_prompt.clone() {
            let Step::Continue(refined) = self
                .generate(&task_id, TaskState::Refining, 60, "refining", Some(prompt), &cancel)
                .await
            else {
                return;
            };
            article = refined;
        }

        if cancel.is_cancelled() {
            return;
        }
        self.publish(&task_id, &request.platform, article);
    }

    async fn extract(&self, task_id: &TaskId, url: &str, cancel: &CancellationToken) -> Step<()> {
        self.stage(task_id, TaskState::Extracting, 10, "extracting source page");
        let page = match self.parts.fetcher.fetch(url, cancel).await {
            Ok(page) => page,
            Err(_) if cancel.is_cancelled() => return Step::Stop,
            Err(err) => {
                self.fail(task_id, err.to_string());
                return Step::Stop;
            }
        };
        let decoded = match decode_html(&page.body, page.content_type.as_deref()) {
            Ok(decoded) => decoded,
            Err(err) => {
                self.fail(task_id, err.to_string());
                return Step::Stop;
            }
        };
        let extracted = self
            .parts
            .extractor
            .extract(&decoded.html, Some(&page.url));
        let content = self.parts.converter.to_markdown(&extracted.content_html);
        if content.trim().is_empty() {
            self.fail(task_id, format!("no readable content at {url}"));
            return Step::Stop;
        }
        pilot_debug!(
            "extracted {} chars and {} images from {}",
            content.len(),
            extracted.images.len(),
            url
        );
        let at = (self.clock)();
        self.apply(TaskMsg::SourceExtracted {
            task_id: task_id.clone(),
            title: extracted.title,
            content,
            source_images: extracted.images,
            at,
        });
        Step::Continue(())
    }

    async fn generate(
        &self,
        task_id: &TaskId,
        stage: TaskState,
        progress: u8,
        message: &str,
        instruction: Option<String>,
        cancel: &CancellationToken,
    ) -> Step<String> {
        if cancel.is_cancelled() {
            return Step::Stop;
        }
        self.stage(task_id, stage, progress, message);
        let mut history = self.load().conversation_history;
        if let Some(instruction) = instruction {
            history.push(ChatMessage::new(Role::User, instruction));
        }

        let answer = tokio::select! {
            _ = cancel.cancelled() => Err(GenerateError::Cancelled),
            answer = self.parts.generator.generate(&history, cancel) => answer,
        };
        let answer = match answer {
            Ok(answer) => answer,
            Err(GenerateError::Cancelled) => return Step::Stop,
            Err(err) => {
                self.fail(task_id, err.to_string());
                return Step::Stop;
            }
        };

        history.push(ChatMessage::new(Role::Assistant, answer.clone()));
        let at = (self.clock)();
        self.apply(TaskMsg::HistorySnapshot {
            task_id: task_id.clone(),
            history,
            at,
        });
        self.apply(TaskMsg::Generated {
            task_id: task_id.clone(),
            result: answer.clone(),
            at,
        });
        Step::Continue(answer)
    }

    fn publish(&self, task_id: &TaskId, platform_id: &str, article: String) {
        let Some(profile) = platform::by_id(platform_id) else {
            self.fail(task_id, format!("unknown platform {platform_id}"));
            return;
        };
        self.stage(task_id, TaskState::Publishing, 85, "handing over to the editor");

        // Held until the task is marked done: a cancel either lands before
        // anything is written or after the editor is open.
        let mut store = lock(&self.parts.store);
        let task = read_task(&*store);
        if task.id != *task_id || task.state.is_terminal() {
            return;
        }
        let title = Some(task.title.trim().to_string())
            .filter(|title| !title.is_empty())
            .or_else(|| markdown_title(&article))
            .unwrap_or_else(|| UNTITLED.to_string());
        let now = (self.clock)();
        let mut payload = PublishPayload::new(title, article.clone(), now);
        payload.html_content = Some(markdown_to_html(&article));
        payload.source_url = task.source_url.clone();
        if !task.source_images.is_empty() {
            payload.source_images = Some(task.source_images.clone());
        }

        let handed_over = write_payload(&mut *store, profile.id, &payload)
            .map_err(|err| err.to_string())
            .and_then(|()| self.parts.opener.open(profile).map_err(|err| err.to_string()));
        if let Err(err) = handed_over {
            drop(store);
            self.fail(task_id, err);
            return;
        }

        let at = (self.clock)();
        self.apply_locked(
            &mut *store,
            TaskMsg::Finished {
                task_id: task_id.clone(),
                message: format!("opened the {} editor", profile.name),
                at,
            },
        );
        drop(store);
        pilot_info!("task {} handed to {}", task_id, profile.id);
    }
}
