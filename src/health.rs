//! # Health Check
//!
//! `GET /health` reports whether the service is up, which provider it is
//! bound to, and request statistics gathered by the middleware.
//!
//! ## Response Example:
//! ```json
//! {
//!   "status": "healthy",
//!   "service": { "name": "transcriber", "version": "0.1.0" },
//!   "provider": { "kind": "local", "description": "local whisper base on cpu" },
//!   "uptime_seconds": 42,
//!   "metrics": { "total_requests": 10, "total_errors": 1, "error_rate": 0.1 },
//!   "endpoints": [...]
//! }
//! ```

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let provider = state.handler.provider();

    let mut endpoints: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms()
            })
        })
        .collect();
    endpoints.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": state.service_name,
            "version": env!("CARGO_PKG_VERSION")
        },
        "provider": {
            "kind": provider.kind(),
            "description": provider.describe()
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "transcription_requests": state.transcription_metrics.request_count()
        },
        "memory": get_memory_info(),
        "endpoints": endpoints
    }))
}

/// Resident and virtual memory of this process, where the platform exposes it.
fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let read_kb = |key: &str| {
                status
                    .lines()
                    .find(|line| line.starts_with(key))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<u64>().ok())
                    .unwrap_or(0)
                    * 1024
            };
            return json!({
                "resident_memory_bytes": read_kb("VmRSS:"),
                "virtual_memory_bytes": read_kb("VmSize:"),
                "available": true
            });
        }
    }

    json!({ "available": false })
}
