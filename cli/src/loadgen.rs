//! Concurrent load against the inference backend, bypassing the robot.

use anyhow::{Context, Result};
use reachy_core::{ChatMessage, InferenceClient, Settings};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::output::print_loadgen_report;

const PROMPTS: [&str; 5] = [
    "Give me a one-sentence status update on the project.",
    "What is the capital of France? Answer briefly.",
    "Suggest a name for a friendly robot.",
    "Summarize the benefits of edge inference in one sentence.",
    "Say hello in three languages.",
];

#[derive(Debug, Clone)]
pub struct LoadgenOptions {
    pub concurrency: usize,
    pub duration: Duration,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LatencyStats {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
}

impl LatencyStats {
    /// `None` when there are no samples
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        Some(Self {
            p50_ms: percentile(&sorted, 50.0),
            p95_ms: percentile(&sorted, 95.0),
            p99_ms: percentile(&sorted, 99.0),
            max_ms: sorted[sorted.len() - 1],
            mean_ms: sorted.iter().sum::<f64>() / sorted.len() as f64,
        })
    }
}

/// Nearest-rank percentile over already sorted samples
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadgenReport {
    pub concurrency: usize,
    pub duration_secs: f64,
    pub requests: u64,
    pub errors: u64,
    pub latency: Option<LatencyStats>,
    pub first_error: Option<String>,
}

#[derive(Default)]
struct WorkerResult {
    latencies: Vec<f64>,
    errors: u64,
    first_error: Option<String>,
}

async fn worker(
    id: usize,
    client: Arc<InferenceClient>,
    model: String,
    max_tokens: u32,
    deadline: Instant,
) -> WorkerResult {
    let mut result = WorkerResult::default();
    let mut i = id;

    while Instant::now() < deadline {
        let prompt = PROMPTS[i % PROMPTS.len()];
        i += 1;

        let started = Instant::now();
        match client
            .chat_messages(&model, vec![ChatMessage::user(prompt)], 0.2, max_tokens)
            .await
        {
            Ok(_) => result.latencies.push(started.elapsed().as_secs_f64() * 1000.0),
            Err(e) => {
                debug!(worker = id, error = %e, "Load request failed");
                result.errors += 1;
                if result.first_error.is_none() {
                    result.first_error = Some(e.to_string());
                }
            }
        }
    }
    result
}

pub async fn run_loadgen(settings: &Settings, options: &LoadgenOptions) -> Result<LoadgenReport> {
    let client = Arc::new(
        InferenceClient::from_settings(&settings.inference)
            .context("Failed to create inference client")?,
    );
    let concurrency = options.concurrency.max(1);
    info!(
        concurrency,
        duration_secs = options.duration.as_secs(),
        endpoint = client.base_url(),
        "Starting load test"
    );

    let started = Instant::now();
    let deadline = started + options.duration;
    let mut workers = JoinSet::new();
    for id in 0..concurrency {
        workers.spawn(worker(
            id,
            client.clone(),
            settings.inference.model.clone(),
            options.max_tokens,
            deadline,
        ));
    }

    let mut latencies = Vec::new();
    let mut errors = 0;
    let mut first_error = None;
    while let Some(joined) = workers.join_next().await {
        let result = joined.context("Load worker panicked")?;
        latencies.extend(result.latencies);
        errors += result.errors;
        if first_error.is_none() {
            first_error = result.first_error;
        }
    }

    Ok(LoadgenReport {
        concurrency,
        duration_secs: started.elapsed().as_secs_f64(),
        requests: latencies.len() as u64 + errors,
        errors,
        latency: LatencyStats::from_samples(&latencies),
        first_error,
    })
}

/// Run the load test and print the report
pub async fn loadgen(settings: &Settings, options: LoadgenOptions, json: bool) -> Result<()> {
    let report = run_loadgen(settings, &options).await?;
    if json {
        let rendered =
            serde_json::to_string_pretty(&report).context("Failed to serialize load report")?;
        println!("{}", rendered);
    } else {
        print_loadgen_report(&report);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_nearest_rank() {
        let sorted: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 50.0), 50.0);
        assert_eq!(percentile(&sorted, 95.0), 95.0);
        assert_eq!(percentile(&sorted, 99.0), 99.0);
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_stats_from_unsorted_samples() {
        let stats = LatencyStats::from_samples(&[300.0, 100.0, 200.0]).unwrap();
        assert_eq!(stats.p50_ms, 200.0);
        assert_eq!(stats.max_ms, 300.0);
        assert_eq!(stats.mean_ms, 200.0);
        assert!(LatencyStats::from_samples(&[]).is_none());
    }

    #[tokio::test]
    async fn test_unreachable_backend_counts_errors() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut settings = Settings::default();
        settings.inference.base_url = Some(format!("http://{}", addr));
        settings.inference.max_retries = 0;

        let report = run_loadgen(
            &settings,
            &LoadgenOptions {
                concurrency: 2,
                duration: Duration::from_millis(100),
                max_tokens: 8,
            },
        )
        .await
        .unwrap();

        assert!(report.errors >= 2);
        assert_eq!(report.requests, report.errors);
        assert!(report.latency.is_none());
        assert!(report.first_error.is_some());
    }
}
