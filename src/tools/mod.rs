//! Tool calls: request/response types, the executor seam, and the
//! batch-dispatch policy.

pub mod builtin;
pub mod declarations;
pub mod reminders;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, warn};

pub use declarations::{default_declarations, ToolDeclaration};

/// One model-issued tool call. Several may arrive together in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// The single response sent back for a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallResponse {
    pub id: String,
    pub name: String,
    pub result: String,
}

/// Fallback sent when tool execution fails for any reason. The remote side
/// must always get a reply, or the turn would hang.
pub const TOOL_APOLOGY: &str =
    "Sorry, I encountered an error while trying to do that. Please try again.";

/// External collaborator that actually runs tools.
///
/// Implementations may perform network calls but must stay within a
/// bounded time; failures are contained by the dispatcher.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run a batch and produce one natural-language result string.
    async fn execute(&self, batch: &[ToolCallRequest]) -> anyhow::Result<String>;
}

/// Applies the batching and error-containment contract around a
/// [`ToolExecutor`].
///
/// Exactly one response is produced per batch, addressed with the first
/// request's id and name; the protocol accepts a single response per turn.
#[derive(Clone)]
pub struct ToolDispatcher {
    executor: Arc<dyn ToolExecutor>,
}

impl ToolDispatcher {
    pub fn new(executor: Arc<dyn ToolExecutor>) -> Self {
        Self { executor }
    }

    /// Dispatch a batch. Returns `None` only for an empty batch.
    pub async fn dispatch(&self, batch: &[ToolCallRequest]) -> Option<ToolCallResponse> {
        let first = batch.first()?;
        if batch.len() > 1 {
            warn!(
                "tool batch of {} calls; responding to '{}' only",
                batch.len(),
                first.name
            );
        }
        let result = match self.executor.execute(batch).await {
            Ok(text) => text,
            Err(e) => {
                error!("tool execution failed: {e:#}");
                TOOL_APOLOGY.to_string()
            }
        };
        Some(ToolCallResponse {
            id: first.id.clone(),
            name: first.name.clone(),
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct OkExecutor;

    #[async_trait]
    impl ToolExecutor for OkExecutor {
        async fn execute(&self, batch: &[ToolCallRequest]) -> anyhow::Result<String> {
            Ok(format!("ran {} call(s)", batch.len()))
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl ToolExecutor for FailingExecutor {
        async fn execute(&self, _batch: &[ToolCallRequest]) -> anyhow::Result<String> {
            anyhow::bail!("upstream exploded")
        }
    }

    fn req(id: &str, name: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.into(),
            name: name.into(),
            args: json!({}),
        }
    }

    #[tokio::test]
    async fn batch_of_two_yields_one_response_keyed_by_first() {
        let dispatcher = ToolDispatcher::new(Arc::new(OkExecutor));
        let resp = dispatcher
            .dispatch(&[req("a", "performGoogleSearch"), req("b", "getCurrentTime")])
            .await
            .unwrap();
        assert_eq!(resp.id, "a");
        assert_eq!(resp.name, "performGoogleSearch");
        assert_eq!(resp.result, "ran 2 call(s)");
    }

    #[tokio::test]
    async fn failure_is_contained_as_apology() {
        let dispatcher = ToolDispatcher::new(Arc::new(FailingExecutor));
        let resp = dispatcher.dispatch(&[req("a", "x")]).await.unwrap();
        assert_eq!(resp.result, TOOL_APOLOGY);
    }

    #[tokio::test]
    async fn empty_batch_produces_nothing() {
        let dispatcher = ToolDispatcher::new(Arc::new(OkExecutor));
        assert!(dispatcher.dispatch(&[]).await.is_none());
    }
}
