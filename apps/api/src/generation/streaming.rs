//! Streaming Consumer: drives one provider's chunked output to a validated result.
//!
//! Chunks are appended to a buffer strictly in arrival order. Parse attempts
//! (extract → decode → validate) run between reads, throttled by wall time so
//! a fast stream of tiny chunks doesn't trigger a parse per chunk. A valid
//! parse becomes the provisional result; consumption continues and a later,
//! more complete parse may replace it. Failed parses are expected mid-stream
//! and are swallowed.

use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::trace;

use crate::generation::extractor::extract_candidate;
use crate::generation::validator::Validator;
use crate::models::{AttemptOutcome, StructuredContent};
use crate::providers::{ProviderError, TextStream};

/// Latest best-known-valid payload for a request, observed by streaming
/// responses and by the outer-deadline handler.
pub type Progress = watch::Sender<Option<StructuredContent>>;

#[derive(Debug)]
pub struct StreamReport {
    pub content: StructuredContent,
    pub chunks: usize,
    pub parse_attempts: usize,
    /// 1-based index of the chunk after which a valid payload first appeared.
    pub first_valid_at_chunk: usize,
    /// How many times the provisional result was set or replaced.
    pub updates: usize,
}

#[derive(Debug, Error)]
pub enum StreamFailure {
    #[error("Stream ended after {chunks} chunks without a valid payload")]
    NeverValid { chunks: usize },

    #[error("Stream failed after {chunks} chunks: {source}")]
    Provider {
        chunks: usize,
        #[source]
        source: ProviderError,
    },

    #[error("Deadline elapsed after {chunks} chunks without a valid payload")]
    DeadlineElapsed { chunks: usize },
}

impl StreamFailure {
    pub fn outcome(&self) -> AttemptOutcome {
        match self {
            StreamFailure::NeverValid { .. } => AttemptOutcome::ValidationFailed,
            StreamFailure::Provider {
                source: ProviderError::MalformedResponse(_),
                ..
            } => AttemptOutcome::ValidationFailed,
            StreamFailure::Provider { .. } => AttemptOutcome::NetworkError,
            StreamFailure::DeadlineElapsed { .. } => AttemptOutcome::Timeout,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StreamingConsumer {
    validator: Validator,
    parse_interval: Duration,
}

/// Mutable state of one consumption loop.
struct Accumulator {
    buffer: String,
    provisional: Option<StructuredContent>,
    chunks: usize,
    parse_attempts: usize,
    first_valid_at_chunk: usize,
    updates: usize,
    last_parse: Option<Instant>,
    dirty: bool,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            buffer: String::new(),
            provisional: None,
            chunks: 0,
            parse_attempts: 0,
            first_valid_at_chunk: 0,
            updates: 0,
            last_parse: None,
            dirty: false,
        }
    }

    fn into_report(self) -> Option<StreamReport> {
        let Accumulator {
            provisional,
            chunks,
            parse_attempts,
            first_valid_at_chunk,
            updates,
            ..
        } = self;
        provisional.map(|content| StreamReport {
            content,
            chunks,
            parse_attempts,
            first_valid_at_chunk,
            updates,
        })
    }
}

impl StreamingConsumer {
    pub fn new(validator: Validator, parse_interval: Duration) -> Self {
        Self {
            validator,
            parse_interval,
        }
    }

    /// Consumes `stream` until it ends or `deadline` passes.
    ///
    /// Succeeds with the last valid payload seen. A mid-stream error or the
    /// deadline only fails the attempt if nothing valid was seen before it.
    pub async fn consume(
        &self,
        mut stream: TextStream,
        deadline: Instant,
        progress: Option<&Progress>,
    ) -> Result<StreamReport, StreamFailure> {
        let mut acc = Accumulator::new();

        loop {
            let next = match tokio::time::timeout_at(deadline, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    if acc.dirty {
                        self.attempt_parse(&mut acc, progress);
                    }
                    let chunks = acc.chunks;
                    return acc
                        .into_report()
                        .ok_or(StreamFailure::DeadlineElapsed { chunks });
                }
            };

            match next {
                Some(Ok(chunk)) => {
                    acc.chunks += 1;
                    acc.buffer.push_str(&chunk);
                    acc.dirty = true;

                    let due = acc
                        .last_parse
                        .map(|at| at.elapsed() >= self.parse_interval)
                        .unwrap_or(true);
                    if due {
                        self.attempt_parse(&mut acc, progress);
                    }
                }
                Some(Err(source)) => {
                    if acc.dirty {
                        self.attempt_parse(&mut acc, progress);
                    }
                    let chunks = acc.chunks;
                    return acc
                        .into_report()
                        .ok_or(StreamFailure::Provider { chunks, source });
                }
                None => break,
            }
        }

        if acc.dirty {
            self.attempt_parse(&mut acc, progress);
        }
        let chunks = acc.chunks;
        acc.into_report()
            .ok_or(StreamFailure::NeverValid { chunks })
    }

    fn attempt_parse(&self, acc: &mut Accumulator, progress: Option<&Progress>) {
        acc.parse_attempts += 1;
        acc.last_parse = Some(Instant::now());
        acc.dirty = false;

        let Some(candidate) = extract_candidate(&acc.buffer) else {
            trace!(chunks = acc.chunks, "no complete payload yet");
            return;
        };

        match self.validator.parse(candidate) {
            Ok(content) => {
                if acc.provisional.as_ref() == Some(&content) {
                    return;
                }
                if acc.provisional.is_none() {
                    acc.first_valid_at_chunk = acc.chunks;
                }
                acc.updates += 1;
                if let Some(progress) = progress {
                    progress.send_replace(Some(content.clone()));
                }
                acc.provisional = Some(content);
            }
            Err(e) => trace!(chunks = acc.chunks, "partial payload not valid yet: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;
    use crate::providers::stub::valid_payload;
    use futures::stream;

    fn consumer(interval: Duration) -> StreamingConsumer {
        StreamingConsumer::new(Validator::for_type(ContentType::Plan), interval)
    }

    fn chunked(chunks: Vec<String>) -> TextStream {
        stream::iter(chunks.into_iter().map(Ok)).boxed()
    }

    /// Splits a payload into three chunks; only the last completes the JSON.
    fn three_chunks(payload: &str) -> Vec<String> {
        let a = payload.len() / 3;
        let b = 2 * payload.len() / 3;
        vec![
            payload[..a].to_string(),
            payload[a..b].to_string(),
            payload[b..].to_string(),
        ]
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    #[tokio::test]
    async fn test_success_only_after_completing_chunk() {
        let payload = valid_payload(ContentType::Plan, "Streamed");
        let (tx, rx) = watch::channel(None);

        let report = consumer(Duration::ZERO)
            .consume(chunked(three_chunks(&payload)), far_deadline(), Some(&tx))
            .await
            .unwrap();

        assert_eq!(report.chunks, 3);
        assert_eq!(report.parse_attempts, 3);
        assert_eq!(report.first_valid_at_chunk, 3);
        assert_eq!(report.updates, 1);
        assert_eq!(report.content.title, "Streamed");
        assert_eq!(rx.borrow().as_ref().map(|c| c.title.as_str()), Some("Streamed"));
    }

    #[tokio::test]
    async fn test_throttle_skips_parses_but_final_parse_runs() {
        let payload = valid_payload(ContentType::Plan, "Throttled");

        let report = consumer(Duration::from_secs(3600))
            .consume(chunked(three_chunks(&payload)), far_deadline(), None)
            .await
            .unwrap();

        // First chunk parses immediately, the rest wait for end of stream.
        assert_eq!(report.parse_attempts, 2);
        assert_eq!(report.first_valid_at_chunk, 3);
    }

    #[tokio::test]
    async fn test_growing_payload_updates_provisional() {
        let short = valid_payload(ContentType::Plan, "Short");
        let mut long: serde_json::Value =
            serde_json::from_str(&valid_payload(ContentType::Plan, "Longer title")).unwrap();
        long["questions"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!("One more question"));

        let report = consumer(Duration::ZERO)
            .consume(
                chunked(vec![short, "\n".to_string(), long.to_string()]),
                far_deadline(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(report.updates, 2);
        assert_eq!(report.content.title, "Longer title");
        assert_eq!(report.content.items.len(), 11);
    }

    #[tokio::test]
    async fn test_stream_without_valid_payload_fails() {
        let err = consumer(Duration::ZERO)
            .consume(
                chunked(vec!["{\"sections\": [".to_string(), "oops".to_string()]),
                far_deadline(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StreamFailure::NeverValid { chunks: 2 }));
        assert_eq!(err.outcome(), AttemptOutcome::ValidationFailed);
    }

    #[tokio::test]
    async fn test_invalid_complete_payload_fails() {
        let too_short = serde_json::json!({
            "sections": [{"type": "timeline", "title": "T", "content": "x"}],
            "questions": ["only one"]
        })
        .to_string();
        let err = consumer(Duration::ZERO)
            .consume(chunked(vec![too_short]), far_deadline(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StreamFailure::NeverValid { .. }));
    }

    #[tokio::test]
    async fn test_mid_stream_error_keeps_provisional() {
        let payload = valid_payload(ContentType::Plan, "Kept");
        let stream = stream::iter(vec![
            Ok(payload),
            Err(ProviderError::Network("reset".to_string())),
        ])
        .boxed();

        let report = consumer(Duration::ZERO)
            .consume(stream, far_deadline(), None)
            .await
            .unwrap();
        assert_eq!(report.content.title, "Kept");
    }

    #[tokio::test]
    async fn test_mid_stream_error_without_provisional_fails() {
        let stream = stream::iter(vec![
            Ok("{\"sec".to_string()),
            Err(ProviderError::Network("reset".to_string())),
        ])
        .boxed();

        let err = consumer(Duration::ZERO)
            .consume(stream, far_deadline(), None)
            .await
            .unwrap_err();
        assert_eq!(err.outcome(), AttemptOutcome::NetworkError);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_without_payload_is_timeout() {
        let stream = stream::pending::<Result<String, ProviderError>>().boxed();
        let deadline = Instant::now() + Duration::from_secs(5);

        let err = consumer(Duration::ZERO)
            .consume(stream, deadline, None)
            .await
            .unwrap_err();
        assert_eq!(err.outcome(), AttemptOutcome::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_after_valid_payload_returns_it() {
        let payload = valid_payload(ContentType::Plan, "Early");
        let stream = stream::iter(vec![Ok(payload)])
            .chain(stream::pending())
            .boxed();
        let deadline = Instant::now() + Duration::from_secs(5);

        let report = consumer(Duration::ZERO)
            .consume(stream, deadline, None)
            .await
            .unwrap();
        assert_eq!(report.content.title, "Early");
    }
}
