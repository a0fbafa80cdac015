//! External collaborator: derives `goal`/`summary` text from a session's
//! original prompt and recent log entries. Only the trait boundary is
//! defined here. Calls are unreliable by design (network + LLM) and must
//! never block a session's mutex.

use async_trait::async_trait;

#[derive(Debug, Clone, Default)]
pub struct SummarizerOutput {
    pub goal: String,
    pub summary: String,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, original_prompt: &str, recent_entries: &[String]) -> SummarizerOutput;
}

/// No external summarizer configured: snapshots publish with empty
/// `goal`/`summary` fields, which is an explicitly supported state.
pub struct NullSummarizer;

#[async_trait]
impl Summarizer for NullSummarizer {
    async fn summarize(&self, _original_prompt: &str, _recent_entries: &[String]) -> SummarizerOutput {
        SummarizerOutput::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_summarizer_returns_empty_fields() {
        let output = NullSummarizer.summarize("build a widget", &[]).await;
        assert!(output.goal.is_empty());
        assert!(output.summary.is_empty());
    }
}
