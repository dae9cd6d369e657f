#![forbid(unsafe_code)]
//! Ranks vectors read from stdin against the first one.
//!
//! Each input line is a JSON document with `vectors` or `embeddings`. Lines are
//! parsed through the dispatch client; the optional first argument is the
//! metric selector (0 cosine, 1 euclidean, 2 dot product, 3 manhattan).
//! Non-finite or mismatched vectors are rejected before scoring.

use anyhow::{Context, Result};
use simkernel_core::{
    euclidean_distance_checked, manhattan_distance_checked, top_k, validate_vectors, BatchScorer,
    OwnedBatch, SimilarityMetric, VectorBatch, VectorValidationOptions,
};
use simkernel_dispatch::{DispatchClient, DispatchConfig, RequestOptions};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const RANKING_LIMIT: usize = 10;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let metric = match std::env::args().nth(1) {
        Some(raw) => {
            let selector: u32 = raw
                .parse()
                .with_context(|| format!("metric selector must be an integer, got '{raw}'"))?;
            SimilarityMetric::from_selector(selector)
                .with_context(|| format!("unknown metric selector {selector}"))?
        }
        None => SimilarityMetric::default(),
    };

    let config = DispatchConfig::from_env().context("failed to load dispatch configuration")?;
    let client = DispatchClient::from_config(&config);
    let ready = client.initialize().await;
    tracing::info!(
        ready,
        request_timeout_ms = config.request_timeout_ms,
        "dispatch client started"
    );

    let outcome = rank_stdin(&client, metric).await;
    match client.get_stats().await {
        Ok(stats) => tracing::info!(
            requests_sent = stats.requests_sent,
            fallbacks = stats.fallbacks,
            timeouts = stats.timeouts,
            "dispatch statistics"
        ),
        Err(error) => tracing::warn!(%error, "dispatch statistics unavailable"),
    }
    client.terminate();
    outcome
}

async fn rank_stdin(client: &DispatchClient, metric: SimilarityMetric) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut vectors: Option<OwnedBatch> = None;
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        let data = client
            .parse_vector_data(&line, RequestOptions::default())
            .await
            .with_context(|| format!("line {line_number}: invalid vector payload"))?;
        let Some(batch) = data
            .into_batch()
            .with_context(|| format!("line {line_number}: ragged vectors"))?
        else {
            tracing::debug!(line_number, "line carries no vectors");
            continue;
        };

        match vectors.as_mut() {
            None => vectors = Some(batch),
            Some(all) => {
                for row in batch.as_batch().rows() {
                    all.push(row)
                        .with_context(|| format!("line {line_number}: dimension mismatch"))?;
                }
            }
        }
    }

    let vectors = vectors.context("no vectors on stdin")?;
    let dimension = vectors.dimension();
    let (query, rest) = vectors.as_slice().split_at(dimension);
    let candidates = VectorBatch::new(rest, dimension, vectors.len() - 1)?;
    let options = VectorValidationOptions::strict();
    for (index, candidate) in candidates.rows().enumerate() {
        validate_vectors(query, candidate, options)
            .with_context(|| format!("vector {}: rejected", index + 1))?;
    }
    let mut scores = vec![0.0f32; candidates.count()];
    BatchScorer::default().score(query, &candidates, &mut scores, metric)?;

    println!("metric={metric:?}");
    println!("dimension={dimension}");
    println!("candidates={}", candidates.count());
    for (rank, entry) in top_k(&scores, RANKING_LIMIT).iter().enumerate() {
        let Some(candidate) = candidates.row(entry.index) else {
            continue;
        };
        let euclidean = euclidean_distance_checked(query, candidate, options)?;
        let manhattan = manhattan_distance_checked(query, candidate, options)?;
        println!(
            "rank={} index={} score={:.6} euclidean={euclidean:.6} manhattan={manhattan:.6}",
            rank + 1,
            entry.index + 1,
            entry.score
        );
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(error) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("failed to initialize tracing subscriber: {error}");
    }
}
