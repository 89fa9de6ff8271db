//! # HTTP Handlers
//!
//! Route tables for the two listeners: the public API and, when
//! `metrics.prometheus_port` is set, the Prometheus exposition server.

pub mod metrics;
pub mod transcriptions;

pub use metrics::prometheus_metrics;
pub use transcriptions::create_transcription;

use actix_web::web;

/// Public API routes.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/transcriptions", web::post().to(create_transcription))
        .route("/health", web::get().to(crate::health::health_check));
}

/// Routes served on the metrics port.
pub fn metrics_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(prometheus_metrics));
}
