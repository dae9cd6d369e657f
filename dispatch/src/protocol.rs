use serde::{Deserialize, Serialize};
use serde_json::Value;
use simkernel_core::{BufferError, OwnedBatch};

/// Message types sent from the client to the background worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundKind {
    Init,
    ParseJson,
    ParseBatch,
    ParseVectorData,
    GetStats,
    Benchmark,
}

impl OutboundKind {
    /// Inbound type that resolves a request of this kind.
    pub fn completion(self) -> InboundKind {
        match self {
            Self::Init => InboundKind::InitComplete,
            Self::ParseJson => InboundKind::ParseComplete,
            Self::ParseBatch => InboundKind::BatchComplete,
            Self::ParseVectorData => InboundKind::VectorParseComplete,
            Self::GetStats => InboundKind::Stats,
            Self::Benchmark => InboundKind::BenchmarkComplete,
        }
    }
}

/// Message types sent from the background worker to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundKind {
    WorkerReady,
    InitComplete,
    ParseComplete,
    BatchComplete,
    VectorParseComplete,
    Stats,
    BenchmarkComplete,
    ParseError,
    Error,
}

impl InboundKind {
    pub fn is_error(self) -> bool {
        matches!(self, Self::ParseError | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: OutboundKind,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: InboundKind,
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl InboundMessage {
    pub fn new(kind: InboundKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            data: None,
            error: None,
            success: None,
            metadata: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// `data` of a `PARSE_JSON` or `PARSE_VECTOR_DATA` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseRequest {
    pub text: String,
}

/// `data` of a `PARSE_BATCH` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub texts: Vec<String>,
}

/// `data` of a `BENCHMARK` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkRequest {
    pub iterations: usize,
    pub size: usize,
}

/// Vector/tensor API payload shape accepted by `parse_vector_data`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VectorData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vectors: Option<Vec<Vec<f32>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<Vec<Vec<f32>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarities: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl VectorData {
    /// Packs `vectors` (or `embeddings` when `vectors` is absent) into a kernel batch.
    ///
    /// Returns `Ok(None)` when the payload carries no rows. The first row fixes
    /// the dimension.
    pub fn into_batch(self) -> Result<Option<OwnedBatch>, BufferError> {
        let rows = match (self.vectors, self.embeddings) {
            (Some(vectors), _) if !vectors.is_empty() => vectors,
            (_, Some(embeddings)) if !embeddings.is_empty() => embeddings,
            _ => return Ok(None),
        };
        let dimension = rows.first().map_or(0, Vec::len);
        OwnedBatch::from_rows(dimension, &rows).map(Some)
    }
}

/// Counters kept by the background worker.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkerStats {
    pub messages_processed: u64,
    pub documents_parsed: u64,
    pub bytes_parsed: u64,
    pub parse_errors: u64,
    pub total_parse_micros: u64,
}

impl WorkerStats {
    pub fn average_parse_micros(&self) -> f64 {
        if self.documents_parsed == 0 {
            return 0.0;
        }
        self.total_parse_micros as f64 / self.documents_parsed as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub iterations: usize,
    pub size: usize,
    pub payload_bytes: usize,
    pub total_ms: f64,
    pub avg_ms: f64,
    pub ops_per_sec: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outbound_message_uses_wire_field_names() {
        let message = OutboundMessage {
            kind: OutboundKind::ParseVectorData,
            id: "req-1-a".to_string(),
            data: Some(json!({"text": "{}"})),
        };
        let encoded = serde_json::to_value(&message).expect("message must serialize");
        assert_eq!(
            encoded,
            json!({"type": "PARSE_VECTOR_DATA", "id": "req-1-a", "data": {"text": "{}"}})
        );

        let init = OutboundMessage {
            kind: OutboundKind::Init,
            id: "req-0-a".to_string(),
            data: None,
        };
        let encoded = serde_json::to_value(&init).expect("message must serialize");
        assert_eq!(encoded, json!({"type": "INIT", "id": "req-0-a"}));
    }

    #[test]
    fn inbound_message_tolerates_missing_optional_fields() {
        let decoded: InboundMessage =
            serde_json::from_value(json!({"type": "WORKER_READY"})).expect("must decode");
        assert_eq!(decoded.kind, InboundKind::WorkerReady);
        assert!(decoded.id.is_empty());
        assert!(!decoded.kind.is_error());

        let decoded: InboundMessage = serde_json::from_value(json!({
            "type": "PARSE_ERROR",
            "id": "req-3-a",
            "error": "expected value",
            "metadata": {"bytes": 3}
        }))
        .expect("must decode");
        assert!(decoded.kind.is_error());
        assert_eq!(decoded.error.as_deref(), Some("expected value"));
    }

    #[test]
    fn every_request_kind_has_a_distinct_completion() {
        let kinds = [
            OutboundKind::Init,
            OutboundKind::ParseJson,
            OutboundKind::ParseBatch,
            OutboundKind::ParseVectorData,
            OutboundKind::GetStats,
            OutboundKind::Benchmark,
        ];
        let mut completions: Vec<InboundKind> = kinds.iter().map(|kind| kind.completion()).collect();
        completions.dedup();
        assert_eq!(completions.len(), kinds.len());
        assert!(completions.iter().all(|kind| !kind.is_error()));
    }

    #[test]
    fn vector_data_packs_vectors_before_embeddings() {
        let data = VectorData {
            vectors: Some(vec![vec![1.0, 2.0], vec![3.0, 4.0]]),
            embeddings: Some(vec![vec![9.0]]),
            ..VectorData::default()
        };
        let batch = data
            .into_batch()
            .expect("rows must pack")
            .expect("batch must exist");
        assert_eq!(batch.dimension(), 2);
        assert_eq!(batch.len(), 2);

        let data = VectorData {
            embeddings: Some(vec![vec![9.0, 8.0, 7.0]]),
            ..VectorData::default()
        };
        let batch = data
            .into_batch()
            .expect("rows must pack")
            .expect("batch must exist");
        assert_eq!(batch.as_slice(), &[9.0, 8.0, 7.0]);

        assert!(VectorData::default()
            .into_batch()
            .expect("empty payload must not fail")
            .is_none());
    }

    #[test]
    fn vector_data_rejects_ragged_rows() {
        let data = VectorData {
            vectors: Some(vec![vec![1.0, 2.0], vec![3.0]]),
            ..VectorData::default()
        };
        assert_eq!(
            data.into_batch().expect_err("must fail"),
            BufferError::RowLength {
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn average_parse_time_ignores_empty_stats() {
        assert_eq!(WorkerStats::default().average_parse_micros(), 0.0);

        let stats = WorkerStats {
            documents_parsed: 4,
            total_parse_micros: 10,
            ..WorkerStats::default()
        };
        assert_eq!(stats.average_parse_micros(), 2.5);
    }
}
