//! Request-level middleware: structured logging with request ids, and
//! per-endpoint HTTP statistics.

pub mod logging;
pub mod metrics;

pub use logging::RequestLogging;
pub use metrics::MetricsMiddleware;
