#![forbid(unsafe_code)]
//! Kernel and dispatch benchmarks for simkernel.
//!
//! Scenarios:
//! - `dot`: scan + top-1 by dot product, scalar, SIMD and validated
//! - `cosine`: scan + top-1 by cosine similarity, scalar, SIMD and validated
//! - `batch`: batch scoring of unit-normalized rows + top-k for every metric selector
//! - `embedding`: hash-embedding fallback throughput
//! - `dispatch`: vector payload parsing through the worker and inline

use std::env;
use std::process;
use std::time::{Duration, Instant};

use simkernel_core::{
    cosine_similarity, cosine_similarity_checked, cosine_similarity_simd, dot_product,
    dot_product_checked, dot_product_simd, hash_embedding, normalize_rows, top_k, BatchScorer,
    OwnedBatch, VectorError, VectorValidationOptions,
};
use simkernel_dispatch::{ClientOptions, DispatchClient, ParseWorker, RequestOptions};

const DIMENSION: usize = 128;
const DATASET_SIZE: usize = 10_000;
const TOP_K: usize = 10;
const EMBEDDING_DIMENSION: usize = 384;
const EMBEDDING_TEXTS: usize = 2_000;
const DISPATCH_DOCUMENTS: usize = 200;
const DISPATCH_ROWS: usize = 32;
const WARMUP_RUNS: usize = 8;
const MEASURED_RUNS: usize = 50;
const DISPATCH_WARMUP_RUNS: usize = 2;
const DISPATCH_MEASURED_RUNS: usize = 10;

type Kernel = fn(&[f32], &[f32]) -> f32;
type CheckedKernel = fn(&[f32], &[f32], VectorValidationOptions) -> Result<f32, VectorError>;

fn main() {
    if cfg!(debug_assertions) && env::var("SIMKERNEL_ALLOW_DEBUG_BENCH").as_deref() != Ok("1") {
        eprintln!(
            "error=debug_build_not_allowed message=\"run `cargo run --release -p simkernel-bench`\""
        );
        process::exit(2);
    }

    let mode = if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    };

    let scenario = env::var("SIMKERNEL_BENCH_SCENARIO").unwrap_or_else(|_| "all".to_string());
    let ok = match scenario.as_str() {
        "all" => {
            run_dot_bench(mode)
                && run_cosine_bench(mode)
                && run_batch_bench(mode)
                && run_embedding_bench(mode)
                && run_dispatch_bench(mode)
        }
        "dot" => run_dot_bench(mode),
        "cosine" => run_cosine_bench(mode),
        "batch" => run_batch_bench(mode),
        "embedding" => run_embedding_bench(mode),
        "dispatch" => run_dispatch_bench(mode),
        _ => {
            eprintln!(
                "error=invalid_scenario scenario=\"{}\" allowed=\"all,dot,cosine,batch,embedding,dispatch\"",
                scenario
            );
            false
        }
    };

    if !ok {
        process::exit(1);
    }
}

fn run_dot_bench(mode: &str) -> bool {
    let query = deterministic_vector(42, DIMENSION);
    let dataset = generate_dataset(DATASET_SIZE, DIMENSION);
    run_scan_bench(
        "dot",
        mode,
        &query,
        &dataset,
        [dot_product, dot_product_simd],
        dot_product_checked,
    )
}

fn run_cosine_bench(mode: &str) -> bool {
    let query = deterministic_vector(1337, DIMENSION);
    let dataset = generate_dataset(DATASET_SIZE, DIMENSION);
    run_scan_bench(
        "cosine",
        mode,
        &query,
        &dataset,
        [cosine_similarity, cosine_similarity_simd],
        cosine_similarity_checked,
    )
}

fn run_scan_bench(
    name: &str,
    mode: &str,
    query: &[f32],
    dataset: &[Vec<f32>],
    [scalar, simd]: [Kernel; 2],
    checked: CheckedKernel,
) -> bool {
    let options = VectorValidationOptions::strict();
    let variants: [(&str, Box<dyn Fn(&[f32], &[f32]) -> Result<f32, VectorError>>); 3] = [
        (
            "scalar",
            Box::new(move |left: &[f32], right: &[f32]| Ok(scalar(left, right))),
        ),
        (
            "simd",
            Box::new(move |left: &[f32], right: &[f32]| Ok(simd(left, right))),
        ),
        (
            "checked",
            Box::new(move |left: &[f32], right: &[f32]| checked(left, right, options)),
        ),
    ];

    for (variant, kernel) in &variants {
        let mut best = (0usize, f32::MIN);
        let samples = sample_runs(WARMUP_RUNS, MEASURED_RUNS, || {
            let started_at = Instant::now();
            match scan_best(query, dataset, kernel.as_ref()) {
                Ok(found) => best = found,
                Err(error) => {
                    eprintln!("error=core_{name}_failed variant={variant} detail=\"{error}\"");
                    return None;
                }
            }
            Some(started_at.elapsed())
        });
        let Some((elapsed_ms, total)) = samples else {
            return false;
        };

        let (p50_ms, p95_ms, avg_ms) = summarize_ms(&elapsed_ms);
        let qps = (MEASURED_RUNS * dataset.len()) as f64 / total.as_secs_f64();
        let (best_id, best_score) = best;
        println!(
            "bench=core_{name} variant={variant} mode={mode} dataset_size={} dimension={} warmup_runs={WARMUP_RUNS} measured_runs={MEASURED_RUNS} p50_ms={p50_ms:.6} p95_ms={p95_ms:.6} avg_ms={avg_ms:.6} qps={qps:.2} best_id={best_id} best_score={best_score:.6}",
            dataset.len(),
            query.len()
        );
    }
    true
}

fn run_batch_bench(mode: &str) -> bool {
    let query = deterministic_vector(7, DIMENSION);
    let rows = generate_dataset(DATASET_SIZE, DIMENSION);
    let mut dataset = match OwnedBatch::from_rows(DIMENSION, &rows) {
        Ok(batch) => batch,
        Err(error) => {
            eprintln!("error=batch_shape_invalid detail=\"{error}\"");
            return false;
        }
    };
    normalize_rows(&mut dataset);
    let candidates = dataset.as_batch();
    let scorer = BatchScorer::default();
    let mut scores = vec![0.0f32; DATASET_SIZE];

    for selector in 0..4u32 {
        let mut best_id = 0usize;
        let mut failure = None;
        let samples = sample_runs(WARMUP_RUNS, MEASURED_RUNS, || {
            let started_at = Instant::now();
            if let Err(error) = scorer.score_selector(&query, &candidates, &mut scores, selector) {
                failure = Some(error);
                return None;
            }
            best_id = top_k(&scores, TOP_K).first().map_or(0, |entry| entry.index);
            Some(started_at.elapsed())
        });
        let Some((elapsed_ms, total)) = samples else {
            if let Some(error) = failure {
                eprintln!("error=batch_scoring_failed selector={selector} detail=\"{error}\"");
            }
            return false;
        };

        let (p50_ms, p95_ms, avg_ms) = summarize_ms(&elapsed_ms);
        let qps = (MEASURED_RUNS * DATASET_SIZE) as f64 / total.as_secs_f64();
        println!(
            "bench=batch_similarity selector={selector} backend={:?} mode={mode} normalized_rows=true dataset_size={DATASET_SIZE} dimension={DIMENSION} top_k={TOP_K} measured_runs={MEASURED_RUNS} p50_ms={p50_ms:.6} p95_ms={p95_ms:.6} avg_ms={avg_ms:.6} qps={qps:.2} best_id={best_id}",
            scorer.backend()
        );
    }
    true
}

fn run_embedding_bench(mode: &str) -> bool {
    let texts: Vec<String> = (0..EMBEDDING_TEXTS)
        .map(|index| format!("case {index} evidence summary filed under docket {}", index * 31))
        .collect();
    let mut embedding = vec![0.0f32; EMBEDDING_DIMENSION];
    let mut checksum = 0.0f32;

    let samples = sample_runs(WARMUP_RUNS, MEASURED_RUNS, || {
        let started_at = Instant::now();
        for text in &texts {
            hash_embedding(text.as_bytes(), &mut embedding);
            checksum += embedding[0];
        }
        Some(started_at.elapsed())
    });
    let Some((elapsed_ms, total)) = samples else {
        return false;
    };

    let (p50_ms, p95_ms, avg_ms) = summarize_ms(&elapsed_ms);
    let qps = (MEASURED_RUNS * EMBEDDING_TEXTS) as f64 / total.as_secs_f64();
    println!(
        "bench=hash_embedding mode={mode} texts={EMBEDDING_TEXTS} dimension={EMBEDDING_DIMENSION} measured_runs={MEASURED_RUNS} p50_ms={p50_ms:.6} p95_ms={p95_ms:.6} avg_ms={avg_ms:.6} qps={qps:.2} checksum={checksum:.3}"
    );
    true
}

fn run_dispatch_bench(mode: &str) -> bool {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("error=runtime_build_failed detail=\"{error}\"");
            return false;
        }
    };

    let documents: Vec<String> = (0..DISPATCH_DOCUMENTS)
        .map(|seed| vector_document(seed as u64))
        .collect();
    let payload_bytes: usize = documents.iter().map(String::len).sum();

    runtime.block_on(async {
        for variant in ["worker", "inline"] {
            let worker = if variant == "worker" {
                match ParseWorker::spawn() {
                    Ok(handle) => Some(handle),
                    Err(error) => {
                        eprintln!("error=worker_spawn_failed detail=\"{error}\"");
                        return false;
                    }
                }
            } else {
                None
            };
            let client = DispatchClient::new(ClientOptions::default(), worker);
            let ready = client.initialize().await;

            let mut elapsed_ms = Vec::with_capacity(DISPATCH_MEASURED_RUNS);
            let mut total = Duration::from_secs(0);
            for run in 0..DISPATCH_WARMUP_RUNS + DISPATCH_MEASURED_RUNS {
                let started_at = Instant::now();
                for document in &documents {
                    if let Err(error) = client
                        .parse_vector_data(document, RequestOptions::default())
                        .await
                    {
                        eprintln!("error=dispatch_parse_failed variant={variant} detail=\"{error}\"");
                        client.terminate();
                        return false;
                    }
                }
                let elapsed = started_at.elapsed();
                if run >= DISPATCH_WARMUP_RUNS {
                    elapsed_ms.push(elapsed.as_secs_f64() * 1_000.0);
                    total += elapsed;
                }
            }

            let (fallbacks, worker_avg_parse_us) = match client.get_stats().await {
                Ok(stats) => (
                    stats.fallbacks,
                    stats
                        .worker
                        .map_or(0.0, |worker| worker.average_parse_micros()),
                ),
                Err(error) => {
                    eprintln!("error=dispatch_stats_failed detail=\"{error}\"");
                    client.terminate();
                    return false;
                }
            };
            client.terminate();

            let (p50_ms, p95_ms, avg_ms) = summarize_ms(&elapsed_ms);
            let docs_per_sec =
                (DISPATCH_MEASURED_RUNS * DISPATCH_DOCUMENTS) as f64 / total.as_secs_f64();
            println!(
                "bench=dispatch_vector_parse variant={variant} mode={mode} ready={ready} documents={DISPATCH_DOCUMENTS} rows={DISPATCH_ROWS} dimension={DIMENSION} payload_bytes={payload_bytes} measured_runs={DISPATCH_MEASURED_RUNS} p50_ms={p50_ms:.6} p95_ms={p95_ms:.6} avg_ms={avg_ms:.6} docs_per_sec={docs_per_sec:.2} fallbacks={fallbacks} worker_avg_parse_us={worker_avg_parse_us:.3}"
            );
        }
        true
    })
}

fn scan_best(
    query: &[f32],
    dataset: &[Vec<f32>],
    kernel: &dyn Fn(&[f32], &[f32]) -> Result<f32, VectorError>,
) -> Result<(usize, f32), VectorError> {
    let mut best_id = 0usize;
    let mut best_score = f32::MIN;
    for (id, candidate) in dataset.iter().enumerate() {
        let score = kernel(query, candidate)?;
        if score > best_score {
            best_score = score;
            best_id = id;
        }
    }
    Ok((best_id, best_score))
}

/// Runs `run` for warmup plus measured iterations, keeping the measured samples in ms.
fn sample_runs(
    warmup_runs: usize,
    measured_runs: usize,
    mut run: impl FnMut() -> Option<Duration>,
) -> Option<(Vec<f64>, Duration)> {
    for _ in 0..warmup_runs {
        run()?;
    }

    let mut elapsed_samples = Vec::with_capacity(measured_runs);
    let mut total_duration = Duration::from_secs(0);
    for _ in 0..measured_runs {
        let elapsed = run()?;
        elapsed_samples.push(elapsed.as_secs_f64() * 1_000.0);
        total_duration += elapsed;
    }
    Some((elapsed_samples, total_duration))
}

fn summarize_ms(samples_ms: &[f64]) -> (f64, f64, f64) {
    let p50_ms = percentile_ms(samples_ms, 0.50);
    let p95_ms = percentile_ms(samples_ms, 0.95);
    let avg_ms = if samples_ms.is_empty() {
        0.0
    } else {
        samples_ms.iter().sum::<f64>() / samples_ms.len() as f64
    };
    (p50_ms, p95_ms, avg_ms)
}

fn percentile_ms(samples_ms: &[f64], quantile: f64) -> f64 {
    if samples_ms.is_empty() {
        return 0.0;
    }

    let mut sorted = samples_ms.to_vec();
    sorted.sort_by(f64::total_cmp);
    let last_index = sorted.len().saturating_sub(1);
    let position = (quantile.clamp(0.0, 1.0) * last_index as f64).round() as usize;
    sorted[position]
}

fn generate_dataset(size: usize, dimension: usize) -> Vec<Vec<f32>> {
    (0..size)
        .map(|id| deterministic_vector(id as u64, dimension))
        .collect()
}

fn vector_document(seed: u64) -> String {
    let rows: Vec<String> = (0..DISPATCH_ROWS as u64)
        .map(|row| {
            let values: Vec<String> = deterministic_vector(seed * 1_000 + row, DIMENSION)
                .iter()
                .map(|value| format!("{value:.4}"))
                .collect();
            format!("[{}]", values.join(","))
        })
        .collect();
    format!(
        "{{\"vectors\":[{}],\"metadata\":{{\"seed\":{seed}}}}}",
        rows.join(",")
    )
}

fn deterministic_vector(seed: u64, dimension: usize) -> Vec<f32> {
    (0..dimension)
        .map(|index| {
            let mixed = (seed as usize)
                .wrapping_mul(31)
                .wrapping_add(index.wrapping_mul(17))
                % 10_000;
            mixed as f32 / 10_000.0
        })
        .collect()
}
