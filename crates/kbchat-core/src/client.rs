//! HTTP client for the streaming chat endpoint.

use bytes::Bytes;
use futures::Stream;
use kbchat_types::{ChatRequest, LlmConfig, Turn};

use crate::error::ChatError;
use crate::Result;

/// Client for one kbchat server. Cheap to clone; the underlying
/// connection pool is shared.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    server_url: String,
    config: LlmConfig,
    context_length: usize,
}

impl ChatClient {
    /// `server_url` is the base URL of the server, with or without a
    /// trailing slash. `context_length` is the number of exchanges kept
    /// as context per request.
    pub fn new(server_url: impl Into<String>, config: LlmConfig, context_length: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            server_url: server_url.into(),
            config,
            context_length,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/api/v1/rag/chat/stream",
            self.server_url.trim_end_matches('/')
        )
    }

    /// POST the question with trimmed context and return the raw byte
    /// stream of the response body.
    ///
    /// A non-success status is a transport failure; the body is not
    /// consulted for an error payload, errors mid-stream arrive as data
    /// events instead.
    pub async fn open_stream(
        &self,
        message: &str,
        conversation: &[Turn],
    ) -> Result<impl Stream<Item = reqwest::Result<Bytes>> + Unpin + use<>> {
        let request = ChatRequest {
            message: message.to_string(),
            conversation: trim_context(conversation, self.context_length),
            config: self.config.clone(),
        };

        let url = self.endpoint();
        tracing::debug!(
            target: "kbchat::client",
            "POST {} ({} context turns)",
            url,
            request.conversation.len()
        );

        let response = self.http.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Transport(format!(
                "server returned {}",
                status
            )));
        }

        Ok(response.bytes_stream())
    }
}

/// Keep only the most recent turns. One exchange is two turns, so the
/// window is `context_length * 2`.
fn trim_context(turns: &[Turn], context_length: usize) -> Vec<Turn> {
    let keep = context_length.saturating_mul(2);
    let start = turns.len().saturating_sub(keep);
    turns[start..].to_vec()
}
