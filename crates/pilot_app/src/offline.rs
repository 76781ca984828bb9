//! Collaborators for running the pipeline without a model backend or a
//! browser attached.

use pilot_core::{ChatMessage, PlatformProfile, Role};
use pilot_engine::{GenerateError, Generator, OpenError, PageOpener};
use pilot_logging::pilot_info;
use tokio_util::sync::CancellationToken;

const HEADING_MAX_CHARS: usize = 60;

/// Turns the conversation's user turns into a markdown article: the first
/// line becomes the heading, the rest is kept as paragraphs. Earlier
/// assistant answers are replaced, not appended to.
pub struct OfflineGenerator;

#[async_trait::async_trait]
impl Generator for OfflineGenerator {
    async fn generate(
        &self,
        history: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<String, GenerateError> {
        if cancel.is_cancelled() {
            return Err(GenerateError::Cancelled);
        }
        let text: Vec<&str> = history
            .iter()
            .filter(|m| m.role == Role::User)
            .flat_map(|m| m.content.lines())
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        let Some((first, rest)) = text.split_first() else {
            return Err(GenerateError::Failed("nothing to write about".into()));
        };

        let heading: String = first
            .trim_start_matches('#')
            .trim()
            .chars()
            .take(HEADING_MAX_CHARS)
            .collect();
        let mut article = format!("# {heading}\n");
        for line in rest {
            article.push('\n');
            article.push_str(line);
            article.push('\n');
        }
        Ok(article)
    }
}

/// Logs where the editor would be opened; the payload is already stored.
pub struct EditorLauncher;

impl PageOpener for EditorLauncher {
    fn open(&self, profile: &'static PlatformProfile) -> Result<(), OpenError> {
        pilot_info!("open {} to publish: {}", profile.name, profile.editor_url);
        println!("{}", profile.editor_url);
        Ok(())
    }
}
