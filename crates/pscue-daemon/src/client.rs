//! IPC client.
//!
//! Used by the short-lived completer to talk to the long-lived daemon. The
//! server sends the full context list; filtering by the word being
//! completed happens here, on the client side.

use eyre::{Context, Result, eyre};

use pscue_client::settings::Settings;

use crate::protocol::{
    self, CompletionItem, CompletionRequest, CompletionResponse, DebugRequest, DebugRequestType,
    DebugResponse, Frame,
};
use crate::socket;

#[cfg(unix)]
type Stream = tokio::net::UnixStream;
#[cfg(not(unix))]
type Stream = tokio::net::TcpStream;

pub struct CompletionClient {
    stream: Stream,
}

impl CompletionClient {
    /// Connect to the daemon's socket derived from the settings.
    #[cfg(unix)]
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let path = socket::socket_path(settings);
        let stream = Stream::connect(&path).await.wrap_err_with(|| {
            format!("failed to connect to local pscue daemon at {path:?}. Is it running?")
        })?;
        Ok(Self { stream })
    }

    /// Connect to the daemon's loopback port derived from the settings.
    #[cfg(not(unix))]
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let port = settings.tcp_port;
        let stream = Stream::connect(("127.0.0.1", port)).await.wrap_err_with(|| {
            format!("failed to connect to local pscue daemon at 127.0.0.1:{port}. Is it running?")
        })?;
        Ok(Self { stream })
    }

    /// Request completions for the given context.
    pub async fn complete(&mut self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let payload = serde_json::to_vec(request)?;
        protocol::write_frame(&mut self.stream, false, &payload).await?;

        match protocol::read_frame(&mut self.stream).await? {
            Some(Frame::Completion(payload)) => Ok(serde_json::from_slice(&payload)?),
            Some(Frame::Debug(_)) => Err(eyre!("unexpected debug frame")),
            None => Err(eyre!("daemon closed the connection")),
        }
    }

    /// Send a debug request.
    pub async fn debug(&mut self, request: &DebugRequest) -> Result<DebugResponse> {
        let payload = serde_json::to_vec(request)?;
        protocol::write_frame(&mut self.stream, true, &payload).await?;

        match protocol::read_frame(&mut self.stream).await? {
            Some(Frame::Debug(payload)) => Ok(serde_json::from_slice(&payload)?),
            Some(Frame::Completion(_)) => Err(eyre!("unexpected completion frame")),
            None => Err(eyre!("daemon closed the connection")),
        }
    }

    /// Liveness check.
    pub async fn ping(&mut self) -> Result<bool> {
        let response = self
            .debug(&DebugRequest {
                request_type: DebugRequestType::Ping,
                filter: None,
            })
            .await?;
        Ok(response.success)
    }
}

/// Client-side filtering by the word being completed (case-insensitive
/// prefix). The server always returns the full context list.
pub fn filter_completions(items: Vec<CompletionItem>, word: &str) -> Vec<CompletionItem> {
    if word.is_empty() {
        return items;
    }
    let word = word.to_lowercase();
    items
        .into_iter()
        .filter(|item| item.text.to_lowercase().starts_with(&word))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(text: &str) -> CompletionItem {
        CompletionItem {
            text: text.to_string(),
            description: String::new(),
            score: 0.5,
        }
    }

    #[test]
    fn filtering_is_prefix_and_case_insensitive() {
        let items = vec![item("commit"), item("Checkout"), item("push")];
        let filtered = filter_completions(items, "c");
        assert_eq!(filtered.len(), 2);

        let items = vec![item("commit"), item("push")];
        assert_eq!(filter_completions(items, "").len(), 2);
    }
}
