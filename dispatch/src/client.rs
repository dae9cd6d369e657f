//! Message-correlated client for the background parse worker.
//!
//! Every request gets a unique id, a pending entry and a timeout. The entry
//! is removed by whichever side resolves it first (response router, timeout,
//! bulk rejection or a dropped caller), so each request resolves exactly once
//! and nothing is left behind in the pending map.
//!
//! Failures of the acceleration path are absorbed: when the worker is missing,
//! crashed or answers with an error, the same operation runs on the calling
//! thread. Timeouts and termination are reported to the caller.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, OnceCell};
use tokio::task::JoinHandle;

use crate::config::DispatchConfig;
use crate::error::{DispatchError, Result};
use crate::parse::{self, ParseFailure};
use crate::protocol::{
    BatchRequest, BenchmarkRequest, BenchmarkResult, InboundKind, InboundMessage, OutboundKind,
    OutboundMessage, ParseRequest, VectorData, WorkerStats,
};
use crate::worker::{ParseWorker, WorkerEvent, WorkerHandle};

static CLIENT_NONCE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Applied to requests that do not set their own timeout.
    pub request_timeout: Duration,
    /// Bound on the `INIT` handshake.
    pub init_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for ClientOptions {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            init_timeout: config.init_timeout(),
        }
    }
}

/// Per-call overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Snapshot returned by [`DispatchClient::get_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub ready: bool,
    pub pending_requests: usize,
    /// Messages posted to the worker, including the `INIT` handshake.
    pub requests_sent: u64,
    pub fallbacks: u64,
    pub timeouts: u64,
    pub late_responses: u64,
    /// Worker-side counters, absent when the worker could not be asked.
    pub worker: Option<WorkerStats>,
}

struct PendingRequest {
    kind: OutboundKind,
    response: oneshot::Sender<Result<InboundMessage>>,
}

#[derive(Default)]
struct Counters {
    requests_sent: AtomicU64,
    fallbacks: AtomicU64,
    timeouts: AtomicU64,
    late_responses: AtomicU64,
}

struct Shared {
    pending: DashMap<String, PendingRequest>,
    requests: Mutex<Option<mpsc::UnboundedSender<OutboundMessage>>>,
    ready: AtomicBool,
    terminated: AtomicBool,
    counters: Counters,
}

impl Shared {
    fn sender(&self) -> Option<mpsc::UnboundedSender<OutboundMessage>> {
        match self.requests.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn detach(&self) -> bool {
        let previous = match self.requests.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        self.ready.store(false, Ordering::Release);
        previous.is_some()
    }

    fn reject_all(&self, make_error: impl Fn() -> DispatchError) -> usize {
        let ids: Vec<String> = self
            .pending
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let mut rejected = 0usize;
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                let _ = pending.response.send(Err(make_error()));
                rejected += 1;
            }
        }
        rejected
    }

    fn route(&self, message: InboundMessage) {
        if message.kind == InboundKind::WorkerReady {
            tracing::debug!("parse worker announced readiness");
            return;
        }

        let Some((id, pending)) = self.pending.remove(&message.id) else {
            let _ = self.counters.late_responses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                id = %message.id,
                kind = ?message.kind,
                "ignoring response for unknown or expired request"
            );
            return;
        };

        let result = if message.kind.is_error() {
            Err(DispatchError::Remote(
                message
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown worker error".to_string()),
            ))
        } else if message.kind != pending.kind.completion() {
            Err(DispatchError::InvalidResponse(format!(
                "expected {:?} for {:?}, got {:?}",
                pending.kind.completion(),
                pending.kind,
                message.kind
            )))
        } else {
            Ok(message)
        };

        if pending.response.send(result).is_err() {
            tracing::debug!(%id, "caller stopped waiting before the response arrived");
        }
    }

    fn fail_context(&self, reason: &str) {
        let had_worker = self.detach();
        let rejected = self.reject_all(|| DispatchError::ContextFailure(reason.to_string()));
        if had_worker {
            tracing::warn!(
                reason,
                rejected,
                "parse worker failed; continuing with calling-thread parsing"
            );
        }
    }
}

/// Removes the pending entry if the caller stops waiting early.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let _ = self.shared.pending.remove(self.id);
    }
}

/// Off-thread parse client with transparent calling-thread fallback.
///
/// The worker is only used when the client is constructed inside a Tokio
/// runtime; otherwise it is detached and every call parses inline. Not
/// reusable after [`DispatchClient::terminate`].
pub struct DispatchClient {
    shared: Arc<Shared>,
    options: ClientOptions,
    init: OnceCell<bool>,
    router: Mutex<Option<JoinHandle<()>>>,
    nonce: u64,
    sequence: AtomicU64,
}

impl DispatchClient {
    /// Creates a client over `worker`; `None` means every call parses inline.
    pub fn new(options: ClientOptions, worker: Option<WorkerHandle>) -> Self {
        let shared = Arc::new(Shared {
            pending: DashMap::new(),
            requests: Mutex::new(None),
            ready: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            counters: Counters::default(),
        });

        let router = match (worker, tokio::runtime::Handle::try_current()) {
            (Some(WorkerHandle { requests, events }), Ok(runtime)) => {
                if let Ok(mut guard) = shared.requests.lock() {
                    *guard = Some(requests);
                }
                Some(runtime.spawn(route_events(Arc::clone(&shared), events)))
            }
            (Some(_), Err(error)) => {
                tracing::warn!(
                    %error,
                    "no tokio runtime to route worker responses; parsing on the calling thread"
                );
                None
            }
            (None, _) => {
                tracing::info!("no parse worker attached; parsing on the calling thread");
                None
            }
        };

        Self {
            shared,
            options,
            init: OnceCell::new(),
            router: Mutex::new(router),
            nonce: CLIENT_NONCE.fetch_add(1, Ordering::Relaxed),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates a client over a freshly spawned [`ParseWorker`].
    ///
    /// A worker thread that cannot be started degrades to inline parsing.
    pub fn spawn(options: ClientOptions) -> Self {
        let worker = match ParseWorker::spawn() {
            Ok(handle) => Some(handle),
            Err(error) => {
                tracing::warn!(%error, "failed to start parse worker thread");
                None
            }
        };
        Self::new(options, worker)
    }

    /// Creates a client from `config`, spawning a worker only when enabled.
    pub fn from_config(config: &DispatchConfig) -> Self {
        let options = ClientOptions::from(config);
        if config.worker_enabled {
            Self::spawn(options)
        } else {
            Self::new(options, None)
        }
    }

    /// Runs the `INIT` handshake once; concurrent callers share the same attempt.
    ///
    /// Returns whether the worker acknowledged successfully.
    pub async fn initialize(&self) -> bool {
        if self.is_terminated() {
            return false;
        }
        *self.init.get_or_init(|| self.handshake()).await && self.is_ready()
    }

    async fn handshake(&self) -> bool {
        match self
            .request(OutboundKind::Init, None, self.options.init_timeout)
            .await
        {
            Ok(message) => {
                let success = message.success.unwrap_or(false);
                if !self.is_terminated() {
                    self.shared.ready.store(success, Ordering::Release);
                }
                if success {
                    tracing::info!(worker = ?message.data, "parse worker initialized");
                } else {
                    tracing::warn!(
                        error = message.error.as_deref().unwrap_or("none"),
                        "parse worker rejected initialization"
                    );
                }
                success
            }
            Err(error) => {
                tracing::warn!(%error, "parse worker initialization failed");
                false
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.load(Ordering::Acquire)
    }

    /// Number of requests still waiting for the worker.
    pub fn pending_len(&self) -> usize {
        self.shared.pending.len()
    }

    pub async fn parse_json(&self, text: &str, options: RequestOptions) -> Result<Value> {
        let payload = to_payload(&ParseRequest {
            text: text.to_string(),
        })?;
        self.offload(OutboundKind::ParseJson, payload, options, || {
            parse::parse_json(text)
        })
        .await
    }

    pub async fn parse_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        options: RequestOptions,
    ) -> Result<Vec<Value>> {
        let payload = to_payload(&BatchRequest {
            texts: texts.iter().map(|text| text.as_ref().to_string()).collect(),
        })?;
        self.offload(OutboundKind::ParseBatch, payload, options, || {
            parse::parse_batch(texts)
        })
        .await
    }

    pub async fn parse_vector_data(
        &self,
        text: &str,
        options: RequestOptions,
    ) -> Result<VectorData> {
        let payload = to_payload(&ParseRequest {
            text: text.to_string(),
        })?;
        self.offload(OutboundKind::ParseVectorData, payload, options, || {
            parse::parse_vector_data(text)
        })
        .await
    }

    pub async fn benchmark(&self, iterations: usize, size: usize) -> Result<BenchmarkResult> {
        let payload = to_payload(&BenchmarkRequest { iterations, size })?;
        self.offload(
            OutboundKind::Benchmark,
            payload,
            RequestOptions::default(),
            || parse::run_benchmark(iterations, size),
        )
        .await
    }

    /// Client counters plus the worker's own statistics when it can be reached.
    pub async fn get_stats(&self) -> Result<DispatchStats> {
        if self.is_terminated() {
            return Err(DispatchError::Terminated);
        }

        let worker = if self.initialize().await {
            match self
                .request(OutboundKind::GetStats, None, self.options.request_timeout)
                .await
                .and_then(|message| decode::<WorkerStats>(message.data))
            {
                Ok(stats) => Some(stats),
                Err(error) => {
                    tracing::debug!(%error, "worker statistics unavailable");
                    None
                }
            }
        } else {
            None
        };

        let counters = &self.shared.counters;
        Ok(DispatchStats {
            ready: self.is_ready(),
            pending_requests: self.pending_len(),
            requests_sent: counters.requests_sent.load(Ordering::Relaxed),
            fallbacks: counters.fallbacks.load(Ordering::Relaxed),
            timeouts: counters.timeouts.load(Ordering::Relaxed),
            late_responses: counters.late_responses.load(Ordering::Relaxed),
            worker,
        })
    }

    /// Rejects every pending request with [`DispatchError::Terminated`] and
    /// detaches from the worker.
    pub fn terminate(&self) {
        if self.shared.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shared.detach();
        let rejected = self.shared.reject_all(|| DispatchError::Terminated);
        let router = match self.router.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(router) = router {
            router.abort();
        }
        tracing::info!(rejected, "dispatch client terminated");
    }

    async fn offload<T: DeserializeOwned>(
        &self,
        kind: OutboundKind,
        payload: Value,
        options: RequestOptions,
        fallback: impl FnOnce() -> std::result::Result<T, ParseFailure>,
    ) -> Result<T> {
        if self.is_terminated() {
            return Err(DispatchError::Terminated);
        }

        if self.initialize().await {
            let timeout = options.timeout.unwrap_or(self.options.request_timeout);
            let outcome = self
                .request(kind, Some(payload), timeout)
                .await
                .and_then(|message| decode::<T>(message.data));
            match outcome {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_infrastructure() => return Err(error),
                Err(error) => {
                    tracing::warn!(%error, ?kind, "worker request failed; parsing on calling thread");
                }
            }
        }

        let _ = self
            .shared
            .counters
            .fallbacks
            .fetch_add(1, Ordering::Relaxed);
        Ok(fallback()?)
    }

    async fn request(
        &self,
        kind: OutboundKind,
        data: Option<Value>,
        timeout: Duration,
    ) -> Result<InboundMessage> {
        if self.is_terminated() {
            return Err(DispatchError::Terminated);
        }
        let sender = self
            .shared
            .sender()
            .ok_or_else(|| DispatchError::Unavailable("no worker attached".to_string()))?;
        self.post(&sender, kind, data, timeout).await
    }

    /// Registers a pending entry, posts the message and waits for its resolution.
    async fn post(
        &self,
        sender: &mpsc::UnboundedSender<OutboundMessage>,
        kind: OutboundKind,
        data: Option<Value>,
        timeout: Duration,
    ) -> Result<InboundMessage> {
        let id = self.next_id();
        let (response_tx, mut response_rx) = oneshot::channel();
        self.shared.pending.insert(
            id.clone(),
            PendingRequest {
                kind,
                response: response_tx,
            },
        );
        let _guard = PendingGuard {
            shared: &self.shared,
            id: &id,
        };

        // Teardown may have run between the caller's checks and the insert
        // above; it would have missed this entry.
        if self.is_terminated() {
            return Err(DispatchError::Terminated);
        }
        if self.shared.sender().is_none() {
            return Err(DispatchError::Unavailable(
                "worker detached while the request was registered".to_string(),
            ));
        }

        let message = OutboundMessage {
            kind,
            id: id.clone(),
            data,
        };
        if sender.send(message).is_err() {
            if self.is_terminated() {
                return Err(DispatchError::Terminated);
            }
            return Err(DispatchError::Unavailable(
                "worker stopped accepting requests".to_string(),
            ));
        }
        let _ = self
            .shared
            .counters
            .requests_sent
            .fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%id, ?kind, "request posted to parse worker");

        match tokio::time::timeout(timeout, &mut response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DispatchError::ContextFailure(
                "pending request was dropped".to_string(),
            )),
            Err(_) => {
                if self.shared.pending.remove(&id).is_none() {
                    // Resolved between the deadline and the removal.
                    if let Ok(result) = response_rx.try_recv() {
                        return result;
                    }
                }
                let _ = self
                    .shared
                    .counters
                    .timeouts
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%id, ?kind, timeout_ms = timeout.as_millis() as u64, "request timed out");
                Err(DispatchError::Timeout {
                    id: id.clone(),
                    timeout,
                })
            }
        }
    }

    fn next_id(&self) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("req-{sequence}-{:x}", self.nonce)
    }
}

impl Drop for DispatchClient {
    fn drop(&mut self) {
        self.terminate();
    }
}

async fn route_events(shared: Arc<Shared>, mut events: mpsc::UnboundedReceiver<WorkerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            WorkerEvent::Message(message) => shared.route(message),
            WorkerEvent::Failed(reason) => {
                shared.fail_context(&reason);
                return;
            }
        }
    }
    shared.fail_context("worker disconnected");
}

fn to_payload<T: Serialize>(request: &T) -> Result<Value> {
    serde_json::to_value(request)
        .map_err(|error| DispatchError::InvalidResponse(format!("unencodable request: {error}")))
}

fn decode<T: DeserializeOwned>(data: Option<Value>) -> Result<T> {
    let data = data.ok_or_else(|| DispatchError::InvalidResponse("missing data".to_string()))?;
    serde_json::from_value(data).map_err(|error| DispatchError::InvalidResponse(error.to_string()))
}
