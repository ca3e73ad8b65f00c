//! HTTP API Load Test
//!
//! Drives the kingdom endpoints with concurrent signed-in users and reports
//! latency percentiles (p50/p95/p99), throughput and error rate.
//!
//! Usage:
//!   cargo run --release --bin http_load_test -- --url http://localhost:8080 \
//!       --concurrency 10 --duration 30 --secret dev-secret-change-me
//!
//! Each worker signs in as its own `load-user-<n>`, so the first realm read of
//! every worker exercises seeding.

use anyhow::Context;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use kingdom_core::logging::init_tracing_default;
use kingdom_server::SignedTokenIdentity;

// ============================================================================
// Endpoint definitions
// ============================================================================

#[derive(Clone, Copy, PartialEq)]
enum Method {
    Get,
    Post,
}

struct Endpoint {
    name: &'static str,
    method: Method,
    path: &'static str,
    body: Option<Value>,
    authenticated: bool,
}

fn all_endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint {
            name: "Health",
            method: Method::Get,
            path: "/health",
            body: None,
            authenticated: false,
        },
        Endpoint {
            name: "ReadRealm",
            method: Method::Get,
            path: "/realm-tiles",
            body: None,
            authenticated: true,
        },
        Endpoint {
            name: "PlaceTile",
            method: Method::Post,
            path: "/realm-tiles",
            body: Some(json!({"x": 6, "y": 3, "tile_type": 9})),
            authenticated: true,
        },
        Endpoint {
            name: "PlaceBatch",
            method: Method::Post,
            path: "/realm-tiles",
            body: Some(json!([
                {"x": 2, "y": 2, "tile_type": 10},
                {"x": 3, "y": 2, "tile_type": 12, "event_type": "harvest"},
                {"x": 4, "y": 2, "tile_type": 16, "meta": {"level": 1}}
            ])),
            authenticated: true,
        },
        Endpoint {
            name: "GetCharacter",
            method: Method::Get,
            path: "/character",
            body: None,
            authenticated: true,
        },
        Endpoint {
            name: "GrantReward",
            method: Method::Post,
            path: "/character/rewards",
            body: Some(json!({"experience": 25, "gold": 5})),
            authenticated: true,
        },
        Endpoint {
            name: "MetricsJson",
            method: Method::Get,
            path: "/metrics/json",
            body: None,
            authenticated: false,
        },
    ]
}

// ============================================================================
// Per-endpoint statistics
// ============================================================================

struct EndpointStats {
    name: String,
    latencies_us: parking_lot::Mutex<Vec<u64>>,
    success: AtomicU64,
    errors: AtomicU64,
}

impl EndpointStats {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            latencies_us: parking_lot::Mutex::new(Vec::with_capacity(10_000)),
            success: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    fn record(&self, duration_us: u64, ok: bool) {
        self.latencies_us.lock().push(duration_us);
        if ok {
            self.success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn count(&self) -> (u64, u64) {
        (
            self.success.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
        )
    }

    /// Latency at percentile `p`, in milliseconds
    fn percentile(&self, p: f64) -> f64 {
        let mut lat = self.latencies_us.lock().clone();
        if lat.is_empty() {
            return 0.0;
        }
        lat.sort_unstable();
        let idx = ((p / 100.0) * lat.len() as f64) as usize;
        lat[idx.min(lat.len() - 1)] as f64 / 1000.0
    }
}

struct LoadConfig {
    base_url: String,
    concurrency: usize,
    duration_secs: u64,
    secret: String,
}

impl LoadConfig {
    fn from_args(args: &[String]) -> Self {
        Self {
            base_url: parse_str_arg(args, "--url").unwrap_or_else(|| "http://localhost:8080".into()),
            concurrency: parse_num_arg(args, "--concurrency").unwrap_or(10).max(1),
            duration_secs: parse_num_arg(args, "--duration").unwrap_or(30),
            secret: parse_str_arg(args, "--secret")
                .or_else(|| std::env::var("AUTH_SECRET").ok())
                .unwrap_or_else(|| "dev-secret-change-me".into()),
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing_default();

    let args: Vec<String> = std::env::args().collect();
    let config = LoadConfig::from_args(&args);

    println!("=== Kingdom HTTP Load Test ===");
    println!("  Target:      {}", config.base_url);
    println!("  Concurrency: {}", config.concurrency);
    println!("  Duration:    {}s", config.duration_secs);
    println!();

    let client = Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("failed to create HTTP client")?;

    let health = client
        .get(format!("{}/health", config.base_url))
        .send()
        .await
        .with_context(|| format!("cannot reach server at {}", config.base_url))?;
    if !health.status().is_success() {
        anyhow::bail!("server health check failed: HTTP {}", health.status());
    }
    info!("Server health check OK");

    let endpoints = Arc::new(all_endpoints());
    let stats: Arc<Vec<EndpointStats>> =
        Arc::new(endpoints.iter().map(|e| EndpointStats::new(e.name)).collect());

    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let identity = SignedTokenIdentity::new(config.secret.clone());
    let start = Instant::now();
    let deadline = start + Duration::from_secs(config.duration_secs);
    let total_requests = Arc::new(AtomicU64::new(0));

    println!("Running load test...\n");

    let mut handles = Vec::new();
    for worker_id in 0..config.concurrency {
        let client = client.clone();
        let base_url = config.base_url.clone();
        let sem = semaphore.clone();
        let endpoints = endpoints.clone();
        let stats = stats.clone();
        let total = total_requests.clone();
        let token = identity.sign(&format!("load-user-{}", worker_id));

        handles.push(tokio::spawn(async move {
            let mut idx = worker_id % endpoints.len();
            while Instant::now() < deadline {
                let Ok(_permit) = sem.acquire().await else {
                    break;
                };
                let endpoint = &endpoints[idx];
                let url = format!("{}{}", base_url, endpoint.path);

                let mut req = match endpoint.method {
                    Method::Get => client.get(&url),
                    Method::Post => client.post(&url),
                };
                if endpoint.authenticated {
                    req = req.bearer_auth(&token);
                }
                if let Some(body) = &endpoint.body {
                    req = req.json(body);
                }

                let req_start = Instant::now();
                let result = req.send().await;
                let duration_us = req_start.elapsed().as_micros() as u64;
                let ok = match &result {
                    Ok(resp) => resp.status().is_success(),
                    Err(e) => {
                        warn!("{} failed: {}", endpoint.name, e);
                        false
                    }
                };
                stats[idx].record(duration_us, ok);
                total.fetch_add(1, Ordering::Relaxed);

                idx = (idx + 1) % endpoints.len();
            }
        }));
    }

    // Progress reporter
    let total_clone = total_requests.clone();
    let progress = tokio::spawn(async move {
        let mut last_count = 0u64;
        loop {
            tokio::time::sleep(Duration::from_secs(5)).await;
            if Instant::now() >= deadline {
                break;
            }
            let current = total_clone.load(Ordering::Relaxed);
            let elapsed = start.elapsed().as_secs_f64();
            println!(
                "  [{:.0}s] {} requests ({:.0} rps, +{} last 5s)",
                elapsed,
                current,
                current as f64 / elapsed,
                current - last_count
            );
            last_count = current;
        }
    });

    for h in handles {
        if let Err(e) = h.await {
            error!("Worker task failed: {}", e);
        }
    }
    progress.abort();

    let total_time = start.elapsed();
    let total_reqs = total_requests.load(Ordering::Relaxed);
    let total_errors = print_report(&stats, total_reqs, total_time);

    let server_metrics = fetch_server_metrics(&client, &config.base_url).await;

    let results = json!({
        "test_config": {
            "base_url": config.base_url,
            "concurrency": config.concurrency,
            "duration_secs": config.duration_secs,
        },
        "summary": {
            "total_requests": total_reqs,
            "total_errors": total_errors,
            "duration_secs": total_time.as_secs_f64(),
            "rps": total_reqs as f64 / total_time.as_secs_f64(),
            "error_rate": total_errors as f64 / total_reqs.max(1) as f64,
        },
        "server_metrics": server_metrics,
        "endpoints": stats.iter().map(|s| {
            let (success, errors) = s.count();
            json!({
                "name": s.name,
                "count": success + errors,
                "errors": errors,
                "p50_ms": s.percentile(50.0),
                "p95_ms": s.percentile(95.0),
                "p99_ms": s.percentile(99.0),
            })
        }).collect::<Vec<_>>(),
    });

    let results_path = "load_test_results.json";
    std::fs::write(results_path, serde_json::to_string_pretty(&results)?)
        .with_context(|| format!("failed to write {}", results_path))?;
    println!("\nResults written to {}", results_path);

    let error_rate = total_errors as f64 / total_reqs.max(1) as f64;
    if error_rate > 0.10 {
        anyhow::bail!("error rate {:.1}% exceeds 10% threshold", error_rate * 100.0);
    }
    Ok(())
}

/// Print the per-endpoint table and return the total error count.
fn print_report(stats: &[EndpointStats], total_reqs: u64, total_time: Duration) -> u64 {
    println!("\n=== Results ===\n");
    println!(
        "Total: {} requests in {:.2}s ({:.1} rps)\n",
        total_reqs,
        total_time.as_secs_f64(),
        total_reqs as f64 / total_time.as_secs_f64()
    );
    println!(
        "{:<25} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "Endpoint", "Count", "Errors", "p50(ms)", "p95(ms)", "p99(ms)", "Err%"
    );
    println!("{}", "-".repeat(85));

    let mut total_errors = 0u64;
    for stat in stats {
        let (success, errors) = stat.count();
        let count = success + errors;
        total_errors += errors;
        let err_pct = if count > 0 {
            errors as f64 / count as f64 * 100.0
        } else {
            0.0
        };
        println!(
            "{:<25} {:>8} {:>8} {:>8.2} {:>8.2} {:>8.2} {:>7.1}%",
            stat.name,
            count,
            errors,
            stat.percentile(50.0),
            stat.percentile(95.0),
            stat.percentile(99.0),
            err_pct,
        );
    }

    println!("{}", "-".repeat(85));
    println!("{:<25} {:>8} {:>8}", "TOTAL", total_reqs, total_errors);
    total_errors
}

/// Server-side counters after the run, or null if unavailable.
async fn fetch_server_metrics(client: &Client, base_url: &str) -> Value {
    let resp = match client.get(format!("{}/metrics/json", base_url)).send().await {
        Ok(resp) => resp,
        Err(e) => {
            warn!("Could not fetch server metrics: {}", e);
            return Value::Null;
        }
    };
    match resp.json::<Value>().await {
        Ok(metrics) => {
            info!(
                "Server counted {} tiles written, {} realms seeded",
                metrics["tiles_written"], metrics["realms_seeded"]
            );
            metrics
        }
        Err(e) => {
            warn!("Server metrics were not JSON: {}", e);
            Value::Null
        }
    }
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_num_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    parse_str_arg(args, flag).and_then(|v| v.parse().ok())
}
