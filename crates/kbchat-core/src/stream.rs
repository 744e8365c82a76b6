//! The read loop: bytes in, assembled conversation out.
//!
//! One cooperative loop selects between the next body chunk and the
//! watchdog channel. Decoding and event application are synchronous, so
//! data events are applied in exactly the order they were decoded; the
//! watchdog only ever injects an out-of-band cancellation, never a
//! reordering.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use kbchat_types::{StatusToken, StreamEvent};

use crate::assembler::ConversationAssembler;
use crate::decode::LineDecoder;
use crate::protocol::{interpret_line, ParsedLine};
use crate::watchdog::{Watchdog, WatchdogConfig, WatchdogSignal};

/// Terminal state of one transfer. Partial assembler state survives all
/// of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The body ended normally with no error event
    Completed,
    /// The server emitted an error event; the stream was drained anyway
    ProtocolError(String),
    /// The watchdog cancelled a stalled transfer
    LivenessTimeout { idle_secs: u64 },
    /// The underlying read failed
    TransportFailure(String),
}

/// Progress notification delivered to the caller while the loop runs.
#[derive(Debug, Clone)]
pub enum StreamNotice<'a> {
    /// Server phase changed
    Status(StatusToken),
    /// A data event was applied to the assembler
    Event(&'a StreamEvent),
    /// The watchdog's advisory warning fired
    StallWarning { idle_secs: u64 },
}

/// Drive one response body to completion, applying every data event to
/// the assembler in arrival order.
///
/// The caller pushes the user turn before invoking this. `notify` is
/// called synchronously from the loop for live display.
pub async fn consume_stream<S, E>(
    mut body: S,
    assembler: &mut ConversationAssembler,
    watchdog_config: WatchdogConfig,
    mut notify: impl FnMut(StreamNotice<'_>),
) -> StreamOutcome
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut watchdog = Watchdog::spawn(watchdog_config);
    let activity = watchdog.activity();
    let mut decoder = LineDecoder::new();
    let mut protocol_error: Option<String> = None;

    loop {
        tokio::select! {
            chunk = body.next() => match chunk {
                Some(Ok(bytes)) => {
                    activity.touch();
                    for line in decoder.push(&bytes) {
                        match interpret_line(&line) {
                            ParsedLine::Data(event) => {
                                if let StreamEvent::Error(message) = &event {
                                    protocol_error = Some(message.clone());
                                }
                                notify(StreamNotice::Event(&event));
                                assembler.apply(event);
                            }
                            ParsedLine::Status(status) => {
                                tracing::debug!(
                                    target: "kbchat::stream",
                                    "Server status: {:?}",
                                    status
                                );
                                notify(StreamNotice::Status(status));
                            }
                            ParsedLine::Ignored | ParsedLine::Malformed => {}
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(target: "kbchat::stream", "Transport failure: {}", e);
                    assembler.finish();
                    return StreamOutcome::TransportFailure(e.to_string());
                }
                None => {
                    if let Some(tail) = decoder.finish() {
                        tracing::debug!(
                            target: "kbchat::stream",
                            "Dropping unterminated tail ({} bytes)",
                            tail.len()
                        );
                    }
                    assembler.finish();
                    return match protocol_error {
                        Some(message) => StreamOutcome::ProtocolError(message),
                        None => StreamOutcome::Completed,
                    };
                }
            },
            signal = watchdog.recv() => match signal {
                WatchdogSignal::Warned { idle_secs } => {
                    notify(StreamNotice::StallWarning { idle_secs });
                }
                WatchdogSignal::Aborted { idle_secs } => {
                    assembler.mark_aborted();
                    return StreamOutcome::LivenessTimeout { idle_secs };
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::StreamPhase;
    use kbchat_types::TimelineEntry;
    use std::convert::Infallible;
    use std::time::Duration;

    fn body_from(chunks: Vec<&[u8]>) -> impl Stream<Item = Result<Bytes, Infallible>> + Unpin {
        futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect::<Vec<_>>(),
        )
    }

    fn fast_watchdog() -> WatchdogConfig {
        WatchdogConfig {
            warning: Some(Duration::from_secs(5)),
            abort: Duration::from_secs(20),
            poll_interval: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_token_stream() {
        let mut assembler = ConversationAssembler::new();
        assembler.push_user("hi");

        let body = body_from(vec![
            b"data: {\"type\":\"token\",\"data\":\"He\"}\n",
            b"data: {\"type\":\"token\",\"data\":\"llo\"}\n",
            b"data: {\"type\":\"done\",\"data\":{\"tokens\":12}}\n",
        ]);

        let outcome =
            consume_stream(body, &mut assembler, fast_watchdog(), |_| {}).await;

        assert_eq!(outcome, StreamOutcome::Completed);
        let conversation = assembler.conversation();
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation[1].content, "Hello");
        // No sources block existed, so done mutated nothing
        assert!(assembler
            .display_timeline()
            .iter()
            .all(|e| matches!(e, TimelineEntry::Turn(_))));
    }

    #[tokio::test]
    async fn test_chunks_split_mid_line_and_mid_character() {
        let mut assembler = ConversationAssembler::new();
        assembler.push_user("hi");

        let full = "data: {\"type\":\"token\",\"data\":\"知识\"}\n".as_bytes();
        // Splits fall inside the JSON and inside the first three-byte character
        let body = body_from(vec![&full[..10], &full[10..31], &full[31..]]);

        let outcome =
            consume_stream(body, &mut assembler, fast_watchdog(), |_| {}).await;

        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(assembler.conversation()[1].content, "知识");
    }

    #[tokio::test]
    async fn test_status_and_noise_interleaved_with_data() {
        let mut assembler = ConversationAssembler::new();
        assembler.push_user("hi");

        let mut statuses = Vec::new();
        let body = body_from(vec![
            b": connected\n",
            b": chat_engine_created\n",
            b"some stray line\n",
            b"data: {\"type\":\"token\",\"data\":\"ok\"}\n",
            b": heartbeat\n",
            b": completed\n",
        ]);

        let outcome = consume_stream(body, &mut assembler, fast_watchdog(), |notice| {
            if let StreamNotice::Status(status) = notice {
                statuses.push(status);
            }
        })
        .await;

        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(
            statuses,
            vec![
                StatusToken::Connected,
                StatusToken::ChatEngineCreated,
                StatusToken::Heartbeat,
                StatusToken::Completed,
            ]
        );
        assert_eq!(assembler.conversation()[1].content, "ok");
    }

    #[tokio::test]
    async fn test_malformed_line_does_not_abort_stream() {
        let mut assembler = ConversationAssembler::new();
        assembler.push_user("hi");

        let body = body_from(vec![
            b"data: {broken json\n",
            b"data: {\"type\":\"token\",\"data\":\"still here\"}\n",
        ]);

        let outcome =
            consume_stream(body, &mut assembler, fast_watchdog(), |_| {}).await;

        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(assembler.conversation()[1].content, "still here");
    }

    #[tokio::test]
    async fn test_error_event_drains_and_reports() {
        let mut assembler = ConversationAssembler::new();
        assembler.push_user("hi");

        let body = body_from(vec![
            b"data: {\"type\":\"token\",\"data\":\"partial\"}\n",
            b"data: {\"type\":\"error\",\"data\":\"index unavailable\"}\n",
            b"data: {\"type\":\"token\",\"data\":\" answer\"}\n",
        ]);

        let outcome =
            consume_stream(body, &mut assembler, fast_watchdog(), |_| {}).await;

        assert_eq!(
            outcome,
            StreamOutcome::ProtocolError("index unavailable".to_string())
        );
        // Partial content before and after the error is retained
        assert_eq!(assembler.conversation()[1].content, "partial answer");
        assert_eq!(assembler.phase(), StreamPhase::Errored);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_partial_state() {
        let mut assembler = ConversationAssembler::new();
        assembler.push_user("hi");

        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"token\",\"data\":\"part\"}\n")),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )),
        ];
        let body = futures::stream::iter(chunks);

        let outcome =
            consume_stream(body, &mut assembler, fast_watchdog(), |_| {}).await;

        assert!(matches!(outcome, StreamOutcome::TransportFailure(_)));
        assert_eq!(assembler.conversation()[1].content, "part");
    }

    #[tokio::test]
    async fn test_unterminated_tail_is_dropped() {
        let mut assembler = ConversationAssembler::new();
        assembler.push_user("hi");

        let body = body_from(vec![
            b"data: {\"type\":\"token\",\"data\":\"done line\"}\n",
            b"data: {\"type\":\"token\",\"data\":\"never terminated\"}",
        ]);

        let outcome =
            consume_stream(body, &mut assembler, fast_watchdog(), |_| {}).await;

        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(assembler.conversation()[1].content, "done line");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_stream_times_out() {
        let mut assembler = ConversationAssembler::new();
        assembler.push_user("hi");

        // A body that never yields
        let body = futures::stream::pending::<Result<Bytes, Infallible>>();
        let mut warnings = 0;

        let outcome = consume_stream(
            Box::pin(body),
            &mut assembler,
            WatchdogConfig {
                warning: Some(Duration::from_secs(5)),
                abort: Duration::from_secs(20),
                poll_interval: Duration::from_secs(1),
            },
            |notice| {
                if matches!(notice, StreamNotice::StallWarning { .. }) {
                    warnings += 1;
                }
            },
        )
        .await;

        assert!(matches!(outcome, StreamOutcome::LivenessTimeout { idle_secs } if idle_secs >= 20));
        assert_eq!(warnings, 1);
        assert_eq!(assembler.phase(), StreamPhase::Aborted);
    }
}
