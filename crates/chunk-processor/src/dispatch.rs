use crate::error::Result;
use crate::prepare::PreparedPrompt;
use async_trait::async_trait;
use corpus_code_chunker::ChunkId;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Model backend that answers one prompt at a time
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send a prompt and return the response text
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Result of sending one prepared prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkOutcome {
    pub chunk_id: ChunkId,
    pub files: Vec<String>,
    pub prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChunkOutcome {
    fn new(prompt: PreparedPrompt, result: anyhow::Result<String>) -> Self {
        let (response, error) = match result {
            Ok(response) => {
                log::info!("Successfully processed chunk {}", prompt.chunk_id);
                (Some(response), None)
            }
            Err(e) => {
                log::warn!("Error processing chunk {}: {e:#}", prompt.chunk_id);
                (None, Some(format!("{e:#}")))
            }
        };

        Self {
            chunk_id: prompt.chunk_id,
            files: prompt.files,
            prompt: prompt.prompt,
            response,
            error,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Send every prompt to `client`, at most `max_concurrent` at a time.
///
/// Failures are recorded on the chunk's outcome and never retried. Outcomes
/// come back in prompt order regardless of completion order.
pub async fn dispatch_prompts(
    prompts: Vec<PreparedPrompt>,
    client: Arc<dyn ModelClient>,
    max_concurrent: usize,
) -> Vec<ChunkOutcome> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let total = prompts.len();

    let handles: Vec<_> = prompts
        .iter()
        .enumerate()
        .map(|(idx, prompt)| {
            let semaphore = Arc::clone(&semaphore);
            let client = Arc::clone(&client);
            let text = prompt.prompt.clone();
            let chunk_id = prompt.chunk_id.clone();

            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    anyhow::bail!("dispatch semaphore closed");
                };
                log::info!("Processing chunk {}/{total}: {chunk_id}", idx + 1);
                client.complete(&text).await
            })
        })
        .collect();

    let mut outcomes = Vec::with_capacity(total);
    for (prompt, handle) in prompts.into_iter().zip(handles) {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(anyhow::anyhow!("model call task failed: {e}")),
        };
        outcomes.push(ChunkOutcome::new(prompt, result));
    }
    outcomes
}

/// Write outcomes as JSON Lines
pub fn write_jsonl<W: Write>(outcomes: &[ChunkOutcome], mut writer: W) -> Result<()> {
    for outcome in outcomes {
        serde_json::to_writer(&mut writer, outcome)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn prompt(seq: usize, text: &str) -> PreparedPrompt {
        PreparedPrompt {
            chunk_id: ChunkId::new("lib.rs", seq),
            files: vec!["lib.rs".to_string()],
            prompt: text.to_string(),
            token_count: 10,
            estimated_response_tokens: 5,
        }
    }

    /// Echoes prompts back, failing on "fail" and tracking peak concurrency
    #[derive(Default)]
    struct EchoClient {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelClient for EchoClient {
        async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            // later prompts finish first
            let delay = 40_u64.saturating_sub(prompt.len() as u64 * 5);
            tokio::time::sleep(Duration::from_millis(delay)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if prompt == "fail" {
                anyhow::bail!("model refused");
            }
            Ok(prompt.to_uppercase())
        }
    }

    #[tokio::test]
    async fn test_outcomes_keep_prompt_order() {
        let client = Arc::new(EchoClient::default());
        let prompts = vec![prompt(0, "a"), prompt(1, "bb"), prompt(2, "ccc")];

        let outcomes = dispatch_prompts(prompts, client, 3).await;
        let responses: Vec<_> = outcomes.iter().map(|o| o.response.as_deref()).collect();
        assert_eq!(responses, vec![Some("A"), Some("BB"), Some("CCC")]);
        assert!(outcomes.iter().all(ChunkOutcome::is_success));
    }

    #[tokio::test]
    async fn test_failures_recorded_per_chunk() {
        let client = Arc::new(EchoClient::default());
        let prompts = vec![prompt(0, "ok"), prompt(1, "fail"), prompt(2, "fine")];

        let outcomes = dispatch_prompts(prompts, client.clone(), 2).await;
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[1].error.as_deref(), Some("model refused"));
        assert_eq!(outcomes[1].response, None);
        assert!(outcomes[0].is_success() && outcomes[2].is_success());
        // no retries
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let client = Arc::new(EchoClient::default());
        let prompts: Vec<_> = (0..8).map(|seq| prompt(seq, "x")).collect();

        let outcomes = dispatch_prompts(prompts, client.clone(), 2).await;
        assert_eq!(outcomes.len(), 8);
        assert!(client.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_no_prompts_no_calls() {
        let client = Arc::new(EchoClient::default());
        assert!(dispatch_prompts(Vec::new(), client.clone(), 3).await.is_empty());
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_jsonl_one_object_per_line() {
        let outcomes = vec![
            ChunkOutcome::new(prompt(0, "a"), Ok("done".to_string())),
            ChunkOutcome::new(prompt(1, "b"), Err(anyhow::anyhow!("timeout"))),
        ];

        let mut buffer = Vec::new();
        write_jsonl(&outcomes, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["response"], "done");
        assert!(first.get("error").is_none());
        assert_eq!(first["chunk_id"]["scope"], "lib.rs");

        let second: ChunkOutcome = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second, outcomes[1]);
    }
}
