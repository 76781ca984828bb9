//! Publish pilot engine: the in-memory page model, storage, source
//! extraction, the task orchestrator, page sessions and the debug channel.
mod convert;
mod debug_agent;
mod debug_hub;
pub mod debug_server;
mod decode;
mod extract;
mod fetch;
mod orchestrator;
mod page;
mod report;
mod session;
mod store;
mod types;

pub use convert::{markdown_title, markdown_to_html, Converter, Html2MdConverter};
pub use debug_agent::{AgentError, AgentExit, AgentSettings, DebugAgent};
pub use debug_hub::{CommandRecord, DebugHub, HubError};
pub use decode::{decode_html, DecodeError, DecodedHtml};
pub use extract::{ExtractedContent, Extractor, ReadabilityLikeExtractor};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher};
pub use orchestrator::{
    Collaborators, GenerateError, Generator, OpenError, OrchestratorError, OrchestratorHandle,
    OrchestratorSettings, PageOpener, StartRequest, TaskReportSink,
};
pub use page::{PageDom, PageEvent};
pub use report::{article_id, ChannelReportSink, HttpReportSink, PublishReport, ReportSink, ReportedArticle};
pub use session::{PageSession, SessionEnd, SessionOutcome, SessionSettings, SharedPage, SharedStore};
pub use store::{ensure_store_dir, JsonFileStore};
pub use types::{system_clock, Clock, FetchError, FetchedPage};
