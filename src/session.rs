//! One chat session: conversation history, the one-request-at-a-time rule,
//! and the loop that turns stream records into UI events and an artifact.

use crate::client::ApiClient;
use crate::error::{ClientError, SessionError};
use crate::fence::{Artifact, FenceEvent, ParseState};
use crate::protocol::{GenerateRequest, StreamRecord, Turn};
use futures::{Stream, StreamExt};
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// What the caller renders while a generation streams in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    Log(String),
    Status(String),
    CodeStarted,
    CodeDelta(String),
    CodeClosed,
}

pub type GenerationOutcome = Result<Option<Artifact>, ClientError>;

#[derive(Debug, Default)]
pub struct ChatSession {
    history: Vec<Turn>,
    in_flight: bool,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    /// Claims the session for a new request and records the user turn.
    pub fn submit(&mut self, topic: &str) -> Result<GenerateRequest, SessionError> {
        if self.in_flight {
            return Err(SessionError::Busy);
        }
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(SessionError::EmptyTopic);
        }

        self.history.push(Turn::user(topic));
        self.in_flight = true;
        Ok(GenerateRequest {
            topic: topic.to_string(),
            history: self.history.clone(),
        })
    }

    /// Releases the session. Must be called once for every successful `submit`.
    pub fn complete(&mut self, outcome: &GenerationOutcome) {
        self.in_flight = false;
        if let Ok(artifact) = outcome {
            let content = artifact.as_ref().map(Artifact::as_str).unwrap_or_default();
            self.history.push(Turn::assistant(content));
        }
    }

    /// Clears the conversation. Refused while a request is running.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        if self.in_flight {
            return Err(SessionError::Busy);
        }
        self.history.clear();
        Ok(())
    }

    /// Runs one full generation against `client`.
    ///
    /// The session is released whatever the outcome; a refused submission is
    /// returned as the outer error without touching the session.
    pub async fn generate<F, Fut>(
        &mut self,
        client: &ApiClient,
        topic: &str,
        on_event: F,
    ) -> Result<GenerationOutcome, SessionError>
    where
        F: FnMut(GenerationEvent) -> Fut,
        Fut: Future<Output = ()>,
    {
        let request = self.submit(topic)?;
        let outcome = run_request(client, &request, on_event).await;
        self.complete(&outcome);
        Ok(outcome)
    }
}

/// Sends `request` and drives the resulting stream to completion.
pub async fn run_request<F, Fut>(
    client: &ApiClient,
    request: &GenerateRequest,
    on_event: F,
) -> GenerationOutcome
where
    F: FnMut(GenerationEvent) -> Fut,
    Fut: Future<Output = ()>,
{
    let span = info_span!("generation", id = %Uuid::new_v4(), topic = %request.topic);
    async move {
        let records = client.generate(request).await?;
        let outcome = drive(records, on_event).await;
        match &outcome {
            Ok(Some(artifact)) => info!(bytes = artifact.len(), "generation complete"),
            Ok(None) => warn!("generation complete without an artifact"),
            Err(err) => warn!(error = %err, "generation failed"),
        }
        outcome
    }
    .instrument(span)
    .await
}

/// Consumes a record stream, reporting progress through `on_event`.
///
/// Returns the sealed artifact on `Done`. Any failure discards the partial
/// payload. A stream that ends without `Done` counts as a protocol error.
pub async fn drive<S, F, Fut>(records: S, mut on_event: F) -> GenerationOutcome
where
    S: Stream<Item = StreamRecord>,
    F: FnMut(GenerationEvent) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut records = std::pin::pin!(records);
    let mut state = ParseState::new();

    while let Some(record) = records.next().await {
        match record {
            StreamRecord::Log(line) => on_event(GenerationEvent::Log(line)).await,
            StreamRecord::Status(status) => on_event(GenerationEvent::Status(status)).await,
            StreamRecord::Token(token) => {
                for event in state.feed(&token) {
                    let event = match event {
                        FenceEvent::Opened => GenerationEvent::CodeStarted,
                        FenceEvent::Payload(text) => GenerationEvent::CodeDelta(text),
                        FenceEvent::Closed => GenerationEvent::CodeClosed,
                    };
                    on_event(event).await;
                }
            }
            StreamRecord::Done => {
                debug!(bytes = state.accumulated().len(), "received done");
                return Ok(state.finish());
            }
            StreamRecord::Error(failure) => return Err(failure.into()),
        }
    }

    Err(ClientError::Protocol(
        "stream closed before the done marker".to_string(),
    ))
}

/// Writes the artifact for `topic` into `dir` and returns the file path.
pub async fn save_artifact(dir: &Path, topic: &str, artifact: &Artifact) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(Artifact::file_name(topic));
    tokio::fs::write(&path, artifact.as_str()).await?;
    info!(path = %path.display(), "saved artifact");
    Ok(path)
}
