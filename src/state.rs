//! # Application State Management
//!
//! Everything request handlers share, built once in `main` and injected with
//! `web::Data`. There are no process-wide singletons: a test can build as
//! many independent states as it likes.
//!
//! ## Contents:
//! - **handler**: The request handler bound to the one configured provider
//! - **transcription_metrics**: Prometheus counters and histograms
//! - **http_metrics**: Per-endpoint request statistics (middleware-fed)
//! - **service identity**: name, staging directory, upload limit, start time

use crate::config::AppConfig;
use crate::metrics::TranscriptionMetrics;
use crate::transcription::RequestHandler;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<RequestHandler>,
    pub transcription_metrics: Arc<TranscriptionMetrics>,

    /// HTTP statistics, updated by the metrics middleware on every request
    pub http_metrics: Arc<RwLock<HttpMetrics>>,

    pub service_name: String,
    pub staging_dir: PathBuf,
    pub max_upload_bytes: usize,

    /// When the server started (never changes)
    pub start_time: Instant,
}

/// Request statistics collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct HttpMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of 4xx/5xx responses since server start
    pub error_count: u64,

    /// Key: endpoint name (e.g., "POST /transcriptions")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,

    /// Total time spent processing all requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    pub error_count: u64,
}

impl AppState {
    pub fn new(config: &AppConfig, handler: RequestHandler) -> Self {
        Self {
            handler: Arc::new(handler),
            transcription_metrics: Arc::new(TranscriptionMetrics::new()),
            http_metrics: Arc::new(RwLock::new(HttpMetrics::default())),
            service_name: config.server.name.clone(),
            staging_dir: config.staging.directory.clone(),
            max_upload_bytes: config.server.max_upload_bytes,
            start_time: Instant::now(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        self.write_metrics().request_count += 1;
    }

    /// Increment the total error counter (4xx and 5xx responses).
    pub fn increment_error_count(&self) {
        self.write_metrics().error_count += 1;
    }

    /// Record timing and outcome for one request to `endpoint`.
    ///
    /// The first request to an endpoint creates its entry.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.write_metrics();
        let endpoint_metric = metrics
            .endpoint_metrics
            .entry(endpoint.to_string())
            .or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Get a copy of current HTTP metrics, so no lock is held while responding.
    pub fn get_metrics_snapshot(&self) -> HttpMetrics {
        self.http_metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn write_metrics(&self) -> std::sync::RwLockWriteGuard<'_, HttpMetrics> {
        self.http_metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl EndpointMetric {
    /// Average response time for this endpoint, 0.0 before the first request.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate for this endpoint as a fraction (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
