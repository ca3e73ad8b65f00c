//! Server Metrics — request and kingdom counters with Prometheus + JSON export
//!
//! Uses lock-free atomics for all counters.
//!
//! ## Endpoints
//! - `GET /metrics` — Prometheus text format
//! - `GET /metrics/json` — JSON format (read by the load client)

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::api::ApiState;

/// Shared metrics state (all lock-free atomics)
#[derive(Debug)]
pub struct ServerMetrics {
    /// Total HTTP requests served
    pub total_requests: AtomicU64,
    /// Total request errors (4xx + 5xx)
    pub total_errors: AtomicU64,
    /// Cumulative request duration in microseconds (for computing average)
    pub total_duration_us: AtomicU64,
    pub tiles_written: AtomicU64,
    pub realms_seeded: AtomicU64,
    pub rewards_granted: AtomicU64,
    pub start_time: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            total_duration_us: AtomicU64::new(0),
            tiles_written: AtomicU64::new(0),
            realms_seeded: AtomicU64::new(0),
            rewards_granted: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }
}

impl ServerMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_request(&self, duration_us: u64, is_error: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_duration_us.fetch_add(duration_us, Ordering::Relaxed);
        if is_error {
            self.total_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_tiles_written(&self, count: u64) {
        self.tiles_written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_realm_seeded(&self) {
        self.realms_seeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reward(&self) {
        self.rewards_granted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    pub fn requests_per_second(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed) as f64;
        let uptime = self.uptime_secs();
        if uptime > 0.0 { total / uptime } else { 0.0 }
    }

    pub fn avg_duration_ms(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        let dur_us = self.total_duration_us.load(Ordering::Relaxed);
        if total > 0 {
            (dur_us as f64 / total as f64) / 1000.0
        } else {
            0.0
        }
    }

    pub fn snapshot(&self) -> JsonMetrics {
        JsonMetrics {
            uptime_secs: self.uptime_secs(),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            rps: self.requests_per_second(),
            avg_request_duration_ms: self.avg_duration_ms(),
            tiles_written: self.tiles_written.load(Ordering::Relaxed),
            realms_seeded: self.realms_seeded.load(Ordering::Relaxed),
            rewards_granted: self.rewards_granted.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Axum Middleware — Automatic request tracking
// ============================================================================

/// Middleware that records request count and duration for every HTTP request.
pub async fn metrics_middleware(
    State(state): State<ApiState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let resp = next.run(req).await;
    let duration_us = start.elapsed().as_micros() as u64;
    let is_error = resp.status().is_client_error() || resp.status().is_server_error();

    state.metrics.record_request(duration_us, is_error);
    resp
}

// ============================================================================
// GET /metrics — Prometheus text exposition format
// ============================================================================

pub async fn prometheus_handler(State(state): State<ApiState>) -> impl IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        render_prometheus(&state.metrics.snapshot()),
    )
}

fn render_prometheus(m: &JsonMetrics) -> String {
    let avg_req_duration_s = m.avg_request_duration_ms / 1000.0;
    format!(
        "# HELP kingdom_requests_total Total HTTP requests served\n\
         # TYPE kingdom_requests_total counter\n\
         kingdom_requests_total {total_requests}\n\
         \n\
         # HELP kingdom_request_errors_total Total HTTP request errors (4xx/5xx)\n\
         # TYPE kingdom_request_errors_total counter\n\
         kingdom_request_errors_total {total_errors}\n\
         \n\
         # HELP kingdom_request_duration_seconds Average request duration\n\
         # TYPE kingdom_request_duration_seconds gauge\n\
         kingdom_request_duration_seconds {avg_req_duration_s:.6}\n\
         \n\
         # HELP kingdom_requests_per_second Current request throughput\n\
         # TYPE kingdom_requests_per_second gauge\n\
         kingdom_requests_per_second {rps:.2}\n\
         \n\
         # HELP kingdom_tiles_written_total Realm cells written by placements\n\
         # TYPE kingdom_tiles_written_total counter\n\
         kingdom_tiles_written_total {tiles_written}\n\
         \n\
         # HELP kingdom_realms_seeded_total Realms seeded from the template\n\
         # TYPE kingdom_realms_seeded_total counter\n\
         kingdom_realms_seeded_total {realms_seeded}\n\
         \n\
         # HELP kingdom_rewards_granted_total Rewards granted to characters\n\
         # TYPE kingdom_rewards_granted_total counter\n\
         kingdom_rewards_granted_total {rewards_granted}\n\
         \n\
         # HELP kingdom_uptime_seconds Server uptime\n\
         # TYPE kingdom_uptime_seconds gauge\n\
         kingdom_uptime_seconds {uptime:.2}\n",
        total_requests = m.total_requests,
        total_errors = m.total_errors,
        rps = m.rps,
        tiles_written = m.tiles_written,
        realms_seeded = m.realms_seeded,
        rewards_granted = m.rewards_granted,
        uptime = m.uptime_secs,
    )
}

// ============================================================================
// GET /metrics/json
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonMetrics {
    pub uptime_secs: f64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub rps: f64,
    pub avg_request_duration_ms: f64,
    pub tiles_written: u64,
    pub realms_seeded: u64,
    pub rewards_granted: u64,
}

pub async fn json_metrics_handler(State(state): State<ApiState>) -> Json<JsonMetrics> {
    Json(state.metrics.snapshot())
}

// ============================================================================
// Tests
// ============================================================================
