//! Wire protocol.
//!
//! Frames are a 4-byte little-endian payload length followed by UTF-8 JSON.
//! Debug frames carry a leading `b'D'` marker before the length. Frames
//! larger than 1 MiB are rejected and the connection is dropped without a
//! response.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use pscue_client::suggestion::Suggestion;

/// Maximum payload size. Anything larger drops the connection.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Marker byte prefixed to debug frames.
pub const DEBUG_MARKER: u8 = b'D';

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame of {0} bytes exceeds the 1 MiB limit")]
    Oversize(u32),

    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// A raw frame read off the wire.
#[derive(Debug)]
pub enum Frame {
    Completion(Vec<u8>),
    Debug(Vec<u8>),
}

/// Read one frame. `Ok(None)` on clean EOF.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Frame>, ProtocolError> {
    let mut first = [0u8; 1];
    match reader.read_exact(&mut first).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }

    let (debug, len) = if first[0] == DEBUG_MARKER {
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes).await?;
        (true, u32::from_le_bytes(len_bytes))
    } else {
        let mut rest = [0u8; 3];
        reader.read_exact(&mut rest).await?;
        (
            false,
            u32::from_le_bytes([first[0], rest[0], rest[1], rest[2]]),
        )
    };

    if len as usize > MAX_FRAME_SIZE {
        return Err(ProtocolError::Oversize(len));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;

    Ok(Some(if debug {
        Frame::Debug(payload)
    } else {
        Frame::Completion(payload)
    }))
}

/// Write one frame (debug frames get the marker byte).
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    debug: bool,
    payload: &[u8],
) -> Result<(), ProtocolError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::Oversize(payload.len() as u32));
    }
    if debug {
        writer.write_all(&[DEBUG_MARKER]).await?;
    }
    writer.write_all(&(payload.len() as u32).to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

// ============================================================================
// Requests and responses
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub command: String,
    pub command_line: String,
    #[serde(default)]
    pub word_to_complete: String,
    #[serde(default)]
    pub include_dynamic_arguments: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionItem {
    pub text: String,
    pub description: String,
    pub score: f64,
}

impl From<Suggestion> for CompletionItem {
    fn from(suggestion: Suggestion) -> Self {
        Self {
            text: suggestion.text,
            description: suggestion.description,
            score: suggestion.score,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub completions: Vec<CompletionItem>,
    pub cached: bool,
    /// RFC-3339 UTC generation time.
    pub timestamp: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugRequestType {
    Ping,
    Stats,
    Cache,
    Clear,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DebugRequest {
    pub request_type: DebugRequestType,
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct DebugStats {
    pub commands: usize,
    pub arguments: usize,
    pub history_entries: usize,
    pub sequence_transitions: usize,
    pub workflow_transitions: usize,
    pub cache_entries: usize,
    pub cache_hits: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DebugCacheEntry {
    pub key: String,
    pub items: usize,
    pub hits: u64,
    pub age_seconds: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DebugResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<DebugStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_entries: Option<Vec<DebugCacheEntry>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_round_trip() {
        let payload = br#"{"command":"git"}"#;
        let mut wire = Vec::new();
        write_frame(&mut wire, false, payload).await.unwrap();
        // 4-byte little-endian length prefix
        assert_eq!(&wire[..4], &(payload.len() as u32).to_le_bytes());

        let mut cursor = std::io::Cursor::new(wire);
        match read_frame(&mut cursor).await.unwrap().unwrap() {
            Frame::Completion(got) => assert_eq!(got, payload),
            Frame::Debug(_) => panic!("expected completion frame"),
        }
    }

    #[tokio::test]
    async fn debug_frames_carry_marker() {
        let payload = br#"{"request_type":"ping"}"#;
        let mut wire = Vec::new();
        write_frame(&mut wire, true, payload).await.unwrap();
        assert_eq!(wire[0], DEBUG_MARKER);

        let mut cursor = std::io::Cursor::new(wire);
        match read_frame(&mut cursor).await.unwrap().unwrap() {
            Frame::Debug(got) => assert_eq!(got, payload),
            Frame::Completion(_) => panic!("expected debug frame"),
        }
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&(2 * 1024 * 1024u32).to_le_bytes());
        wire.extend_from_slice(&[0u8; 16]);

        let mut cursor = std::io::Cursor::new(wire);
        assert!(matches!(
            read_frame(&mut cursor).await,
            Err(ProtocolError::Oversize(_))
        ));
    }

    #[tokio::test]
    async fn clean_eof_yields_none() {
        let mut cursor = std::io::Cursor::new(Vec::new());
        assert!(read_frame(&mut cursor).await.unwrap().is_none());
    }

    #[test]
    fn debug_request_parses_lowercase_types() {
        let request: DebugRequest =
            serde_json::from_str(r#"{"request_type":"stats","filter":"git"}"#).unwrap();
        assert_eq!(request.request_type, DebugRequestType::Stats);
        assert_eq!(request.filter.as_deref(), Some("git"));
    }
}
