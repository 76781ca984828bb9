use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use pilot_core::{platform, ChatMessage, Role, Storage, Task, TaskState, CURRENT_TASK_KEY};
use pilot_engine::debug_server::serve;
use pilot_engine::{
    ChannelReportSink, Collaborators, DebugAgent, DebugHub, Html2MdConverter, HttpReportSink,
    JsonFileStore, OrchestratorHandle, OrchestratorSettings, PageDom, PageSession,
    ReadabilityLikeExtractor, ReportSink, ReqwestFetcher, SessionEnd, SharedPage, SharedStore,
    StartRequest,
};
use pilot_logging::{pilot_info, pilot_warn};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::offline::{EditorLauncher, OfflineGenerator};

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("could not start the async runtime")
}

fn open_store(config: &AppConfig) -> Result<SharedStore> {
    let store = JsonFileStore::open(&config.store_dir)
        .with_context(|| format!("could not open store at {:?}", config.store_dir))?;
    let shared: SharedStore = Arc::new(Mutex::new(store));
    Ok(shared)
}

/// Cancels the token on Ctrl-C.
fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            pilot_info!("interrupted, shutting down");
            cancel.cancel();
        }
    });
}

pub(crate) fn serve_debug(config: &AppConfig, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| config.debug_bind.clone());
    runtime()?.block_on(async move {
        let listener = TcpListener::bind(&bind)
            .await
            .with_context(|| format!("could not listen on {bind}"))?;
        let cancel = CancellationToken::new();
        cancel_on_interrupt(cancel.clone());
        serve(listener, Arc::new(DebugHub::new()), cancel).await?;
        Ok(())
    })
}

pub(crate) struct FillArgs {
    pub page: PathBuf,
    pub url: String,
    pub platform: Option<String>,
    pub out: Option<PathBuf>,
    pub debug: bool,
}

pub(crate) fn fill(config: &AppConfig, args: FillArgs) -> Result<()> {
    let html = fs::read_to_string(&args.page)
        .with_context(|| format!("could not read page {:?}", args.page))?;
    let profile = match args.platform.as_deref() {
        Some(id) => platform::by_id(id).ok_or_else(|| anyhow!("unknown platform {id}"))?,
        None => platform::for_url(&args.url)
            .ok_or_else(|| anyhow!("no known editor at {}; pass --platform", args.url))?,
    };
    let page: SharedPage = Arc::new(Mutex::new(PageDom::parse(&html, args.url.as_str())));
    let store = open_store(config)?;

    let outcome = runtime()?.block_on(async {
        let (sink, printer) = match config.report_url.as_deref() {
            Some(endpoint) => {
                let sink: Arc<dyn ReportSink> =
                    Arc::new(HttpReportSink::new(endpoint, config.http_timeout())?);
                (sink, None)
            }
            None => {
                let (tx, mut rx) = mpsc::unbounded_channel();
                let printer = tokio::spawn(async move {
                    while let Some(report) = rx.recv().await {
                        match serde_json::to_string_pretty(&report) {
                            Ok(text) => println!("{text}"),
                            Err(err) => pilot_warn!("could not print report: {}", err),
                        }
                    }
                });
                let sink: Arc<dyn ReportSink> = Arc::new(ChannelReportSink::new(tx));
                (sink, Some(printer))
            }
        };

        let cancel = CancellationToken::new();
        cancel_on_interrupt(cancel.clone());
        let agent_cancel = cancel.child_token();
        let agent = if args.debug {
            let info = json!({
                "version": env!("CARGO_PKG_VERSION"),
                "platform": profile.id,
                "url": args.url,
            });
            let agent = DebugAgent::new(config.agent_settings(), page.clone(), info)?;
            Some(tokio::spawn(agent.run(agent_cancel.clone())))
        } else {
            None
        };

        let session = PageSession::new(profile, config.session_settings(), page.clone(), store, sink);
        let outcome = session.run(cancel).await;

        agent_cancel.cancel();
        if let Some(agent) = agent {
            match agent.await {
                Ok(Ok(exit)) => pilot_info!(
                    "debug agent for {} ran {} commands",
                    exit.code,
                    exit.executed
                ),
                Ok(Err(err)) => pilot_warn!("debug agent failed: {}", err),
                Err(err) => pilot_warn!("debug agent panicked: {}", err),
            }
        }
        // The session has dropped its sink, so the printer drains and stops.
        if let Some(printer) = printer {
            let _ = printer.await;
        }
        anyhow::Ok(outcome)
    })?;

    println!("fill: {:?}", outcome.fill);
    if let Some(completion) = &outcome.completion {
        println!(
            "title filled: {}, body filled: {}",
            completion.title_filled, completion.body_filled
        );
    }
    println!("auto-published: {}", outcome.auto_published);
    match &outcome.end {
        SessionEnd::Reported(detection) => println!("published: {}", detection.url),
        SessionEnd::Cancelled => println!("stopped before a publish was seen"),
        SessionEnd::Expired => println!("no publish seen before the session expired"),
    }

    if let Some(out) = &args.out {
        let html = page
            .lock()
            .map_err(|_| anyhow!("page lock poisoned"))?
            .html();
        write_file(out, &html)?;
    }
    Ok(())
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("could not write {path:?}"))
}

pub(crate) fn status(config: &AppConfig) -> Result<()> {
    let store = JsonFileStore::open(&config.store_dir)?;
    let task: Task = match store.get(CURRENT_TASK_KEY)? {
        Some(value) => serde_json::from_value(value).context("stored task is unreadable")?,
        None => Task::default(),
    };
    println!("{}", serde_json::to_string_pretty(&task.view())?);
    Ok(())
}

pub(crate) struct GenerateArgs {
    pub platform: String,
    pub title: String,
    pub source_url: Option<String>,
    pub messages: Vec<String>,
    pub refine: Option<String>,
}

pub(crate) fn generate(config: &AppConfig, args: GenerateArgs) -> Result<()> {
    if args.messages.is_empty() && args.source_url.is_none() {
        bail!("give at least one --message or a --source-url");
    }
    let parts = Collaborators {
        store: open_store(config)?,
        fetcher: Arc::new(ReqwestFetcher::new(config.fetch.clone())?),
        extractor: Arc::new(ReadabilityLikeExtractor),
        converter: Arc::new(Html2MdConverter),
        generator: Arc::new(OfflineGenerator),
        opener: Arc::new(EditorLauncher),
    };
    let handle = OrchestratorHandle::spawn(
        parts,
        OrchestratorSettings {
            refine_prompt: args.refine,
        },
    )?;

    let (_, mut updates) = handle.attach();
    let task_id = handle.start(StartRequest {
        title: args.title,
        messages: args
            .messages
            .into_iter()
            .map(|text| ChatMessage::new(Role::User, text))
            .collect(),
        source_url: args.source_url,
        platform: args.platform,
    })?;

    loop {
        match updates.blocking_recv() {
            Ok(view) if view.id == task_id => {
                println!("[{:>3}%] {:?}: {}", view.progress, view.state, view.message);
                if view.is_terminal {
                    break;
                }
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }

    let last = handle.status();
    handle.shutdown();
    if last.state == TaskState::Error {
        bail!("task failed: {}", last.error);
    }
    Ok(())
}

pub(crate) fn platforms() {
    for profile in platform::ALL {
        println!("{:<10} {:<8} {}", profile.id, profile.name, profile.editor_url);
    }
}

pub(crate) fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("{path:?} already exists");
    }
    AppConfig::default().save(path)?;
    println!("wrote {path:?}");
    Ok(())
}
