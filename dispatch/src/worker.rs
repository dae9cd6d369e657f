//! Background execution context for the dispatch client.
//!
//! A worker is anything holding a [`WorkerEndpoint`]: it receives
//! [`OutboundMessage`]s and answers with [`WorkerEvent`]s. [`ParseWorker`] is
//! the production implementation and runs the parse engine on its own OS
//! thread.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::parse;
use crate::protocol::{
    BatchRequest, BenchmarkRequest, InboundKind, InboundMessage, OutboundKind, OutboundMessage,
    ParseRequest, WorkerStats,
};

/// Everything a worker can report back to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Message(InboundMessage),
    /// The execution context crashed; every pending request is rejected.
    Failed(String),
}

/// Client side of a worker connection.
#[derive(Debug)]
pub struct WorkerHandle {
    pub(crate) requests: mpsc::UnboundedSender<OutboundMessage>,
    pub(crate) events: mpsc::UnboundedReceiver<WorkerEvent>,
}

/// Worker side of a worker connection.
#[derive(Debug)]
pub struct WorkerEndpoint {
    requests: mpsc::UnboundedReceiver<OutboundMessage>,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl WorkerHandle {
    /// Creates a connected handle/endpoint pair.
    pub fn pair() -> (WorkerHandle, WorkerEndpoint) {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            WorkerHandle {
                requests: requests_tx,
                events: events_rx,
            },
            WorkerEndpoint {
                requests: requests_rx,
                events: events_tx,
            },
        )
    }
}

impl WorkerEndpoint {
    /// Waits for the next request; `None` once the client detached.
    pub async fn recv(&mut self) -> Option<OutboundMessage> {
        self.requests.recv().await
    }

    /// Blocking variant of [`WorkerEndpoint::recv`] for worker threads.
    pub fn blocking_recv(&mut self) -> Option<OutboundMessage> {
        self.requests.blocking_recv()
    }

    /// Returns false once the client stopped listening.
    pub fn send(&self, message: InboundMessage) -> bool {
        self.events.send(WorkerEvent::Message(message)).is_ok()
    }

    /// Reports a context failure to the client.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.events.send(WorkerEvent::Failed(reason.into())).is_ok()
    }
}

/// Background worker answering every request type with the shared parse engine.
#[derive(Debug, Default)]
pub struct ParseWorker {
    stats: WorkerStats,
}

impl ParseWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a worker on a dedicated thread and returns the client handle.
    pub fn spawn() -> io::Result<WorkerHandle> {
        let (handle, endpoint) = WorkerHandle::pair();
        thread::Builder::new()
            .name("simkernel-parse-worker".to_string())
            .spawn(move || run_worker(endpoint))?;
        Ok(handle)
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// Serves requests until the client detaches.
    pub fn serve(&mut self, endpoint: &mut WorkerEndpoint) {
        if !endpoint.send(InboundMessage::new(InboundKind::WorkerReady, "")) {
            return;
        }
        while let Some(request) = endpoint.blocking_recv() {
            let response = self.handle(request);
            if !endpoint.send(response) {
                break;
            }
        }
    }

    /// Answers one request.
    pub fn handle(&mut self, request: OutboundMessage) -> InboundMessage {
        self.stats.messages_processed += 1;
        let OutboundMessage { kind, id, data } = request;

        match kind {
            OutboundKind::Init => InboundMessage::new(InboundKind::InitComplete, id)
                .with_success(true)
                .with_data(json!({"worker": "parse", "thread": current_thread_name()})),
            OutboundKind::ParseJson => match decode_payload::<ParseRequest>(data) {
                Ok(request) => self.parse_one(id, kind, &request.text),
                Err(error) => request_error(id, error),
            },
            OutboundKind::ParseVectorData => match decode_payload::<ParseRequest>(data) {
                Ok(request) => self.parse_one(id, kind, &request.text),
                Err(error) => request_error(id, error),
            },
            OutboundKind::ParseBatch => match decode_payload::<BatchRequest>(data) {
                Ok(request) => self.parse_many(id, &request.texts),
                Err(error) => request_error(id, error),
            },
            OutboundKind::GetStats => match serde_json::to_value(self.stats) {
                Ok(stats) => InboundMessage::new(InboundKind::Stats, id).with_data(stats),
                Err(error) => request_error(id, error.to_string()),
            },
            OutboundKind::Benchmark => match decode_payload::<BenchmarkRequest>(data) {
                Ok(request) => benchmark(id, request),
                Err(error) => request_error(id, error),
            },
        }
    }

    fn parse_one(&mut self, id: String, kind: OutboundKind, text: &str) -> InboundMessage {
        let started_at = Instant::now();
        let parsed = match kind {
            OutboundKind::ParseVectorData => parse::parse_vector_data(text)
                .and_then(|data| serde_json::to_value(data).map_err(Into::into)),
            _ => parse::parse_json(text),
        };
        let elapsed_micros = self.record(started_at, text.len(), 1, parsed.is_ok());

        let metadata = json!({"bytes": text.len(), "parse_micros": elapsed_micros});
        match parsed {
            Ok(value) => InboundMessage::new(kind.completion(), id)
                .with_data(value)
                .with_metadata(metadata),
            Err(failure) => InboundMessage::new(InboundKind::ParseError, id)
                .with_error(failure.to_string())
                .with_metadata(metadata),
        }
    }

    fn parse_many(&mut self, id: String, texts: &[String]) -> InboundMessage {
        let started_at = Instant::now();
        let bytes: usize = texts.iter().map(String::len).sum();
        let parsed = parse::parse_batch(texts);
        let elapsed_micros = self.record(started_at, bytes, texts.len(), parsed.is_ok());

        let metadata = json!({
            "bytes": bytes,
            "documents": texts.len(),
            "parse_micros": elapsed_micros,
        });
        match parsed {
            Ok(values) => InboundMessage::new(InboundKind::BatchComplete, id)
                .with_data(Value::Array(values))
                .with_metadata(metadata),
            Err(failure) => InboundMessage::new(InboundKind::ParseError, id)
                .with_error(failure.to_string())
                .with_metadata(metadata),
        }
    }

    fn record(&mut self, started_at: Instant, bytes: usize, documents: usize, ok: bool) -> u64 {
        let elapsed_micros = u64::try_from(started_at.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.stats.total_parse_micros = self
            .stats
            .total_parse_micros
            .saturating_add(elapsed_micros);
        if ok {
            self.stats.documents_parsed += documents as u64;
            self.stats.bytes_parsed += bytes as u64;
        } else {
            self.stats.parse_errors += 1;
        }
        elapsed_micros
    }
}

fn run_worker(mut endpoint: WorkerEndpoint) {
    let failures = endpoint.events.clone();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        ParseWorker::new().serve(&mut endpoint);
    }));
    if let Err(payload) = outcome {
        let _ = failures.send(WorkerEvent::Failed(panic_message(payload.as_ref())));
    }
}

fn benchmark(id: String, request: BenchmarkRequest) -> InboundMessage {
    let result = parse::run_benchmark(request.iterations, request.size)
        .map_err(|failure| failure.to_string())
        .and_then(|result| serde_json::to_value(result).map_err(|error| error.to_string()));
    match result {
        Ok(value) => InboundMessage::new(InboundKind::BenchmarkComplete, id).with_data(value),
        Err(error) => request_error(id, error),
    }
}

fn decode_payload<T: DeserializeOwned>(data: Option<Value>) -> Result<T, String> {
    let data = data.ok_or_else(|| "request is missing data".to_string())?;
    serde_json::from_value(data).map_err(|error| format!("invalid request data: {error}"))
}

fn request_error(id: String, error: impl Into<String>) -> InboundMessage {
    InboundMessage::new(InboundKind::Error, id).with_error(error)
}

fn current_thread_name() -> String {
    thread::current()
        .name()
        .unwrap_or("unnamed")
        .to_string()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "worker thread panicked".to_string()
}
