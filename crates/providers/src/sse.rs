//! Shared HTTP plumbing for the two wire protocols: status mapping and the
//! server-sent-events pump that feeds a provider stream.

use futures::{Stream, StreamExt};
use relaychat_core::error::ProviderError;
use relaychat_core::provider::{ChunkReceiver, StreamChunk, StreamDecode};
use tracing::{trace, warn};

/// Decoder for one `data:` payload.
pub(crate) type DecodeFn = fn(&str) -> Result<StreamDecode, ProviderError>;

/// Map a transport failure from reqwest.
pub(crate) fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Turn a non-200 upstream response into the matching [`ProviderError`].
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }

    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ));
    }

    if status != 200 {
        let error_body = response.text().await.unwrap_or_default();
        warn!(provider, status, body = %error_body, "Provider returned error");
        return Err(ProviderError::ApiError {
            status_code: status,
            message: error_body,
        });
    }

    Ok(response)
}

/// Splits a byte stream into SSE `data:` payloads.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network reads survive intact.
#[derive(Debug, Default)]
pub(crate) struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return the `data:` payloads of every completed line.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            if let Some(data) = data_payload(&raw) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Drain a final line that was never newline-terminated.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.buffer);
        data_payload(&raw)
    }
}

fn data_payload(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\n', '\r']);

    // Blank separators, comments, and `event:` lines carry no payload
    line.strip_prefix("data:").map(|data| data.trim().to_string())
}

/// Forward one decoded payload. Returns `false` once the channel is done.
async fn forward(
    provider: &str,
    tx: &tokio::sync::mpsc::Sender<Result<StreamChunk, ProviderError>>,
    data: &str,
    decode: DecodeFn,
) -> bool {
    match decode(data) {
        Ok(StreamDecode::Fragment(text)) => tx.send(Ok(StreamChunk::text(text))).await.is_ok(), // false once the receiver is dropped
        Ok(StreamDecode::Skip) => {
            trace!(provider = %provider, data = %data, "Skipping SSE event");
            true
        }
        Ok(StreamDecode::Terminal) => {
            let _ = tx.send(Ok(StreamChunk::finished())).await;
            false
        }
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

/// Spawn a task that pumps `bytes` through `decode` into a chunk channel.
///
/// The channel ends with a finished chunk on terminal events or on a clean
/// end of the byte stream, and with an `Err` item on any fault.
pub(crate) fn spawn_pump<S, B, E>(provider: String, bytes: S, decode: DecodeFn) -> ChunkReceiver
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    let (tx, rx) = tokio::sync::mpsc::channel(64);

    tokio::spawn(async move {
        let mut byte_stream = bytes;
        let mut lines = SseLineBuffer::new();

        while let Some(chunk_result) = byte_stream.next().await {
            let bytes = match chunk_result {
                Ok(b) => b,
                Err(e) => {
                    let _ = tx
                        .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                        .await;
                    return;
                }
            };

            for data in lines.push(bytes.as_ref()) {
                if !forward(&provider, &tx, &data, decode).await {
                    return;
                }
            }
        }

        if let Some(data) = lines.finish() {
            if !forward(&provider, &tx, &data, decode).await {
                return;
            }
        }

        // Stream ended without a terminal event
        let _ = tx.send(Ok(StreamChunk::finished())).await;
    });

    rx
}
