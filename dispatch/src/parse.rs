//! Synchronous parse engine shared by the background worker and the
//! calling-thread fallback, so both paths produce identical values.

use std::fmt;
use std::time::Instant;

use serde_json::{json, Value};

use crate::protocol::{BenchmarkResult, VectorData};

#[derive(Debug)]
pub struct ParseFailure {
    /// Position of the failing document in a batch.
    pub index: Option<usize>,
    pub source: serde_json::Error,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "document {index}: {}", self.source),
            None => write!(f, "{}", self.source),
        }
    }
}

impl std::error::Error for ParseFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl From<serde_json::Error> for ParseFailure {
    fn from(source: serde_json::Error) -> Self {
        Self {
            index: None,
            source,
        }
    }
}

pub fn parse_json(text: &str) -> Result<Value, ParseFailure> {
    Ok(serde_json::from_str(text)?)
}

/// Parses every document, failing on the first malformed one.
pub fn parse_batch<S: AsRef<str>>(texts: &[S]) -> Result<Vec<Value>, ParseFailure> {
    texts
        .iter()
        .enumerate()
        .map(|(index, text)| {
            serde_json::from_str(text.as_ref()).map_err(|source| ParseFailure {
                index: Some(index),
                source,
            })
        })
        .collect()
}

pub fn parse_vector_data(text: &str) -> Result<VectorData, ParseFailure> {
    Ok(serde_json::from_str(text)?)
}

/// Builds a synthetic vector payload with `size` rows of 8 floats.
pub fn benchmark_payload(size: usize) -> String {
    let vectors: Vec<Vec<f32>> = (0..size)
        .map(|row| {
            (0..8)
                .map(|column| ((row * 31 + column * 17) % 1_000) as f32 / 1_000.0)
                .collect()
        })
        .collect();
    json!({
        "vectors": vectors,
        "metadata": {"rows": size, "source": "benchmark"},
    })
    .to_string()
}

/// Parses the synthetic payload `iterations` times and reports timings.
pub fn run_benchmark(iterations: usize, size: usize) -> Result<BenchmarkResult, ParseFailure> {
    let payload = benchmark_payload(size);
    let iterations = iterations.max(1);

    let started_at = Instant::now();
    for _ in 0..iterations {
        let parsed = parse_vector_data(&payload)?;
        std::hint::black_box(parsed);
    }
    let total_ms = started_at.elapsed().as_secs_f64() * 1_000.0;
    let avg_ms = total_ms / iterations as f64;
    let ops_per_sec = if total_ms > 0.0 {
        iterations as f64 / (total_ms / 1_000.0)
    } else {
        0.0
    };

    Ok(BenchmarkResult {
        iterations,
        size,
        payload_bytes: payload.len(),
        total_ms,
        avg_ms,
        ops_per_sec,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_json_returns_value() {
        let value = parse_json(r#"{"a":1,"b":[true,null]}"#).expect("must parse");
        assert_eq!(value, json!({"a": 1, "b": [true, null]}));
    }

    #[test]
    fn parse_batch_reports_failing_index() {
        let error = parse_batch(&["1", "[2]", "{oops"]).expect_err("must fail");
        assert_eq!(error.index, Some(2));
        assert!(error.to_string().starts_with("document 2:"));
    }

    #[test]
    fn parse_vector_data_accepts_partial_payloads() {
        let data = parse_vector_data(r#"{"similarities":[0.5,0.25]}"#).expect("must parse");
        assert_eq!(data.similarities, Some(vec![0.5, 0.25]));
        assert!(data.vectors.is_none());
        assert!(data.embeddings.is_none());
        assert!(data.metadata.is_none());
    }

    #[test]
    fn parse_vector_data_rejects_wrong_shape() {
        assert!(parse_vector_data(r#"{"vectors":"nope"}"#).is_err());
    }

    #[test]
    fn benchmark_payload_round_trips_through_parser() {
        let data = parse_vector_data(&benchmark_payload(5)).expect("payload must parse");
        let vectors = data.vectors.expect("vectors must exist");
        assert_eq!(vectors.len(), 5);
        assert!(vectors.iter().all(|row| row.len() == 8));
    }

    #[test]
    fn benchmark_counts_at_least_one_iteration() {
        let result = run_benchmark(0, 4).expect("benchmark must run");
        assert_eq!(result.iterations, 1);
        assert_eq!(result.size, 4);
        assert!(result.payload_bytes > 0);
    }
}
