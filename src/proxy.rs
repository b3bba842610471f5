use crate::config::UpstreamFormat;
use crate::error::{ProxyError, Result, TransportKind};
use crate::logging::{LogEntry, LogLevel, SharedLogger};
use crate::server::AppState;
use crate::translate::request::{to_prompt_request, translate_request};
use crate::translate::response::translate_response;
use crate::translate::streaming::{completion_to_events, error_event, LineBuffer, StreamRelay};
use crate::translate::types::{ChatRequest, ChatResponse};

use bytes::Bytes;
use futures::stream::{self, Stream};
use futures::StreamExt;
use reqwest::StatusCode;
use serde::Serialize;
use std::pin::Pin;
use std::time::Duration;

/// Outcome of proxying a chat request.
pub enum ProxyResult {
    Complete(ChatResponse),
    Stream(SseStream),
}

/// Framed SSE bytes, produced lazily as the client drains them.
pub type SseStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send>>;

/// Forward a chat request to the configured upstream.
///
/// Fails fast with a configuration error before any network I/O when no
/// credential is configured. A non-200 upstream status becomes
/// [`ProxyError::Upstream`] carrying the status and body verbatim.
pub async fn proxy_chat(
    req: &ChatRequest,
    state: &AppState,
    request_id: &str,
) -> Result<ProxyResult> {
    let config = &state.config;
    let api_key = config.require_api_key()?;
    let base_url = config.effective_base_url()?;

    let upstream_req = translate_request(req, &config.defaults, &state.registry);
    let apply_filter = req.disable_reasoning || config.filter.always;

    match config.effective_format() {
        UpstreamFormat::Chat => {
            let url = format!("{base_url}/chat/completions");
            state.logger.request(
                LogLevel::Info,
                "proxy",
                request_id,
                format!(
                    "POST {} model={} stream={} filter={}",
                    url, upstream_req.model, upstream_req.stream, apply_filter
                ),
            );

            // Streams are bounded by the per-read timeout only.
            let deadline = (!upstream_req.stream).then(|| config.request_timeout());
            let response =
                send_upstream(&state.client, &url, api_key, &upstream_req, deadline).await?;

            if upstream_req.stream {
                let relay = relay_stream(
                    response.bytes_stream(),
                    apply_filter,
                    state.logger.clone(),
                    request_id.to_string(),
                );
                return Ok(ProxyResult::Stream(Box::pin(relay)));
            }

            let body = read_json(response).await?;
            Ok(ProxyResult::Complete(translate_response(
                &body,
                &upstream_req.model,
                apply_filter,
            )))
        }
        UpstreamFormat::Prompt => {
            let url = format!("{base_url}/{}", upstream_req.model);
            state.logger.request(
                LogLevel::Info,
                "proxy",
                request_id,
                format!("POST {} (prompt) stream={}", url, upstream_req.stream),
            );

            let prompt = to_prompt_request(&upstream_req);
            let response = send_upstream(
                &state.client,
                &url,
                api_key,
                &prompt,
                Some(config.request_timeout()),
            )
            .await?;
            let body = read_json(response).await?;
            let completion = translate_response(&body, &upstream_req.model, apply_filter);

            if upstream_req.stream {
                let events = completion_to_events(&completion)
                    .into_iter()
                    .map(|event| Ok(Bytes::from(event)));
                return Ok(ProxyResult::Stream(Box::pin(stream::iter(events))));
            }

            Ok(ProxyResult::Complete(completion))
        }
    }
}

async fn send_upstream<T: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &T,
    deadline: Option<Duration>,
) -> Result<reqwest::Response> {
    let mut request = client
        .post(url)
        .bearer_auth(api_key)
        .header("Content-Type", "application/json")
        .json(body);
    if let Some(deadline) = deadline {
        request = request.timeout(deadline);
    }
    let response = request.send().await?;

    let status = response.status();
    if status != StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        return Err(ProxyError::upstream(status.as_u16(), body));
    }

    Ok(response)
}

async fn read_json(response: reqwest::Response) -> Result<serde_json::Value> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        ProxyError::transport(
            TransportKind::Body,
            format!(
                "Upstream returned invalid JSON: {}. Body: {}",
                e,
                truncate(&String::from_utf8_lossy(&bytes), 300)
            ),
        )
    })
}

/// Relay an upstream SSE byte stream line by line.
///
/// Pull-based: upstream bytes are read only when the consumer polls, and
/// dropping the returned stream drops the upstream body with it. A read
/// failure ends the stream with an error event instead of `[DONE]`.
pub fn relay_stream<S, E>(
    byte_stream: S,
    apply_filter: bool,
    logger: SharedLogger,
    request_id: String,
) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send + 'static
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<ProxyError> + Send + 'static,
{
    async_stream::stream! {
        let mut relay = StreamRelay::new(apply_filter);
        let mut lines = LineBuffer::new();
        let mut emitted = 0usize;
        let mut failed = false;

        tokio::pin!(byte_stream);

        'read: while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    let err: ProxyError = e.into();
                    logger.request(LogLevel::Error, "stream", &request_id, format!("Upstream byte stream error: {} ({})", err, err.kind()));
                    emitted += 1;
                    failed = true;
                    yield Ok(Bytes::from(error_event(&err)));
                    break;
                }
            };

            for line in lines.push(&chunk) {
                if let Some(event) = relay.process_line(&line) {
                    emitted += 1;
                    yield Ok(Bytes::from(event));
                }
                if relay.is_finished() {
                    break 'read;
                }
            }
        }

        if !relay.is_finished() && !failed {
            if let Some(event) = lines.finish().and_then(|tail| relay.process_line(&tail)) {
                emitted += 1;
                yield Ok(Bytes::from(event));
            }
        }

        let (level, message) = if relay.is_finished() {
            (LogLevel::Info, "Stream completed")
        } else if failed {
            (LogLevel::Error, "Stream ended by upstream read failure")
        } else {
            (LogLevel::Warn, "Upstream closed without [DONE]")
        };
        logger.log(
            LogEntry::new(level, "stream", message)
                .with_request_id(request_id.as_str())
                .with_context(serde_json::json!({
                    "events": emitted,
                    "raw_passthrough": relay.passthrough_count(),
                })),
        );
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn collect(chunks: Vec<&'static str>, apply_filter: bool) -> Vec<String> {
        let upstream = tokio_stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c.as_bytes()))),
        );
        let relay = relay_stream(upstream, apply_filter, SharedLogger::disabled(), "t".to_string());
        futures::executor::block_on(relay.map(|r| String::from_utf8(r.unwrap().to_vec()).unwrap()).collect())
    }

    #[test]
    fn test_relay_preserves_order_and_count() {
        let out = collect(
            vec![
                "data: {\"choices\":[{\"delta\":{\"content\":\"<think>x</think>y\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\" and z\"}}]}\n\n",
                "data: [DONE]\n\n",
            ],
            true,
        );
        assert_eq!(
            out,
            vec![
                "data: {\"choices\":[{\"delta\":{\"content\":\"y\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\" and z\"}}]}\n\n",
                "data: [DONE]\n\n",
            ]
        );
    }

    #[test]
    fn test_relay_handles_events_split_across_reads() {
        let out = collect(
            vec!["data: {\"choices\":[{\"de", "lta\":{\"content\":\"hi\"}}]}\n", "\ndata: [DO", "NE]\n\n"],
            false,
        );
        assert_eq!(
            out,
            vec!["data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n", "data: [DONE]\n\n"]
        );
    }

    #[test]
    fn test_relay_stops_reading_after_done() {
        let out = collect(
            vec!["data: [DONE]\n\ndata: {\"choices\":[]}\n\n", "data: {\"late\":true}\n\n"],
            false,
        );
        assert_eq!(out, vec!["data: [DONE]\n\n"]);
    }

    #[test]
    fn test_relay_ends_when_upstream_closes_without_done() {
        let out = collect(vec!["data: {\"choices\":[]}\n\n", "data: {\"tail\":1}"], false);
        assert_eq!(out, vec!["data: {\"choices\":[]}\n\n", "data: {\"tail\":1}\n\n"]);
    }

    #[test]
    fn test_relay_ends_with_error_event_on_read_failure() {
        let upstream = tokio_stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"a\":1}\n\ndata: {\"par")),
            Err(ProxyError::transport(TransportKind::Timeout, "operation timed out")),
            Ok(Bytes::from_static(b"data: {\"b\":2}\n\n")),
        ]);
        let relay = relay_stream(upstream, false, SharedLogger::disabled(), "t".to_string());
        let out: Vec<String> = futures::executor::block_on(
            relay
                .map(|r| String::from_utf8(r.unwrap().to_vec()).unwrap())
                .collect(),
        );

        assert_eq!(out.len(), 2);
        assert_eq!(out[0], "data: {\"a\":1}\n\n");
        let payload = out[1]
            .strip_prefix("data: ")
            .and_then(|e| e.strip_suffix("\n\n"))
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(payload).unwrap();
        assert_eq!(body["type"], "upstream_timeout");
        assert_eq!(body["status_code"], 504);
        assert!(!out.iter().any(|e| e.contains("[DONE]")));
    }

    /// Upstream that counts how often it is polled and records when it is dropped.
    struct TrackedUpstream {
        chunks: std::collections::VecDeque<Bytes>,
        polls: Arc<AtomicUsize>,
        dropped: Arc<AtomicBool>,
    }

    impl Stream for TrackedUpstream {
        type Item = std::result::Result<Bytes, ProxyError>;

        fn poll_next(
            mut self: Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Option<Self::Item>> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            std::task::Poll::Ready(self.chunks.pop_front().map(Ok))
        }
    }

    impl Drop for TrackedUpstream {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_relay_reads_on_demand_and_releases_upstream_on_drop() {
        let polls = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicBool::new(false));
        let upstream = TrackedUpstream {
            chunks: (0..5)
                .map(|i| Bytes::from(format!("data: {{\"n\":{i}}}\n\n")))
                .collect(),
            polls: polls.clone(),
            dropped: dropped.clone(),
        };

        let mut relay = Box::pin(relay_stream(
            upstream,
            false,
            SharedLogger::disabled(),
            "t".to_string(),
        ));
        let first = futures::executor::block_on(relay.next()).unwrap().unwrap();
        assert_eq!(first, Bytes::from_static(b"data: {\"n\":0}\n\n"));
        assert_eq!(polls.load(Ordering::SeqCst), 1);
        assert!(!dropped.load(Ordering::SeqCst));

        drop(relay);
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("short", 100), "short");
    }
}
