use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;

use crate::accounting::AccountingManager;

/// A stream wrapper that yields chunks to the caller verbatim while sending
/// copies to a background channel for usage extraction.
struct ShadowStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl Stream for ShadowStream {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                // Ignore send errors: the background accumulator may have
                // already stopped listening, which doesn't affect the
                // caller-facing stream.
                let _ = self.tx.send(chunk.to_vec());
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(std::io::Error::other(e)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Wrap `upstream`'s byte stream for forwarding to the caller, spawning the
/// background task that accounts for `project_id` once the stream closes.
pub fn forward(
    upstream: reqwest::Response,
    project_id: String,
    fallback_estimate: i64,
    accounting: AccountingManager,
) -> axum::body::Body {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let shadow = ShadowStream {
        inner: Box::pin(upstream.bytes_stream()),
        tx,
    };

    tokio::spawn(async move {
        let mut buffer = Vec::new();
        while let Some(chunk) = rx.recv().await {
            buffer.extend_from_slice(&chunk);
        }
        let tokens = parse_terminal_usage(&buffer).unwrap_or(fallback_estimate);
        accounting.schedule(project_id, tokens);
    });

    axum::body::Body::from_stream(shadow)
}

/// Scan SSE `data:` events for the latest `usage.total_tokens` seen.
/// Providers differ on whether usage appears mid-stream or only in the
/// terminal chunk before `[DONE]`; this keeps the last value observed.
fn parse_terminal_usage(buffer: &[u8]) -> Option<i64> {
    let text = String::from_utf8_lossy(buffer);
    let mut total = None;

    for line in text.lines() {
        let line = line.trim();
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == "[DONE]" {
            continue;
        }
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(data) {
            if let Some(tt) = json
                .get("usage")
                .and_then(|u| u.get("total_tokens"))
                .and_then(|v| v.as_i64())
            {
                total = Some(tt);
            }
        }
    }

    total
}
