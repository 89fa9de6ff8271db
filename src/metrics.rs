//! # Transcription Metrics
//!
//! Counters and histograms describing the transcription workload, rendered
//! in the Prometheus text exposition format.
//!
//! ## Metrics:
//! - `request_count`: Every call to `POST /transcriptions`
//! - `transcribe_duration_seconds`: Provider wall time per request
//! - `result_length_chars`: Characters in each successful transcript
//! - `audio_length_seconds`: Upload size divided by 16000, an estimate
//!
//! Metric objects are owned by [`crate::state::AppState`], not by globals, so
//! tests get a fresh set per app instance.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const DURATION_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
];
const RESULT_LENGTH_BUCKETS: &[f64] = &[
    0.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];
const AUDIO_LENGTH_BUCKETS: &[f64] = &[
    1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0,
];

/// Fixed-bucket histogram. Bucket counts are stored per bucket and made
/// cumulative when rendered.
#[derive(Debug, Clone)]
pub struct Histogram {
    bounds: &'static [f64],
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl Histogram {
    pub fn new(bounds: &'static [f64]) -> Self {
        Self {
            bounds,
            counts: vec![0; bounds.len()],
            sum: 0.0,
            count: 0,
        }
    }

    pub fn observe(&mut self, value: f64) {
        if let Some(idx) = self.bounds.iter().position(|&upper| value <= upper) {
            self.counts[idx] += 1;
        }
        self.sum += value;
        self.count += 1;
    }

    #[cfg(test)]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[cfg(test)]
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// `(upper_bound, cumulative_count)` pairs, without the `+Inf` bucket.
    pub fn cumulative_buckets(&self) -> Vec<(f64, u64)> {
        let mut running = 0;
        self.bounds
            .iter()
            .zip(&self.counts)
            .map(|(&upper, &n)| {
                running += n;
                (upper, running)
            })
            .collect()
    }

    fn render(&self, out: &mut String, name: &str, help: &str) {
        let _ = writeln!(out, "# HELP {} {}", name, help);
        let _ = writeln!(out, "# TYPE {} histogram", name);
        for (upper, cumulative) in self.cumulative_buckets() {
            let _ = writeln!(out, "{}_bucket{{le=\"{}\"}} {}", name, upper, cumulative);
        }
        let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", name, self.count);
        let _ = writeln!(out, "{}_sum {}", name, self.sum);
        let _ = writeln!(out, "{}_count {}", name, self.count);
    }
}

#[derive(Debug)]
pub struct TranscriptionMetrics {
    request_count: AtomicU64,
    transcribe_duration: Mutex<Histogram>,
    result_length: Mutex<Histogram>,
    audio_length: Mutex<Histogram>,
}

impl Default for TranscriptionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptionMetrics {
    pub fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
            transcribe_duration: Mutex::new(Histogram::new(DURATION_BUCKETS)),
            result_length: Mutex::new(Histogram::new(RESULT_LENGTH_BUCKETS)),
            audio_length: Mutex::new(Histogram::new(AUDIO_LENGTH_BUCKETS)),
        }
    }

    pub fn record_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn observe_transcribe_duration(&self, elapsed: Duration) {
        observe(&self.transcribe_duration, elapsed.as_secs_f64());
    }

    pub fn observe_result_length(&self, chars: usize) {
        observe(&self.result_length, chars as f64);
    }

    pub fn observe_audio_length(&self, seconds: f64) {
        observe(&self.audio_length, seconds);
    }

    pub fn transcribe_duration(&self) -> Histogram {
        snapshot(&self.transcribe_duration)
    }

    pub fn result_length(&self) -> Histogram {
        snapshot(&self.result_length)
    }

    pub fn audio_length(&self) -> Histogram {
        snapshot(&self.audio_length)
    }

    /// Render all metrics in Prometheus text exposition format (0.0.4).
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# HELP request_count Number of transcription requests received");
        let _ = writeln!(out, "# TYPE request_count counter");
        let _ = writeln!(out, "request_count {}", self.request_count());

        self.transcribe_duration().render(
            &mut out,
            "transcribe_duration_seconds",
            "Time spent in the transcription provider",
        );
        self.result_length().render(
            &mut out,
            "result_length_chars",
            "Length of the returned transcript in characters",
        );
        self.audio_length().render(
            &mut out,
            "audio_length_seconds",
            "Estimated audio length (upload bytes / 16000)",
        );
        out
    }
}

// A panic while holding the lock leaves the histogram consistent; keep using it.
fn observe(histogram: &Mutex<Histogram>, value: f64) {
    histogram
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .observe(value);
}

fn snapshot(histogram: &Mutex<Histogram>) -> Histogram {
    histogram
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_buckets_are_cumulative() {
        let mut histogram = Histogram::new(&[1.0, 5.0, 10.0]);
        histogram.observe(0.5);
        histogram.observe(3.0);
        histogram.observe(3.0);
        histogram.observe(50.0);

        assert_eq!(
            histogram.cumulative_buckets(),
            vec![(1.0, 1), (5.0, 3), (10.0, 3)]
        );
        assert_eq!(histogram.count(), 4);
        assert_eq!(histogram.sum(), 56.5);
    }

    #[test]
    fn test_render_prometheus() {
        let metrics = TranscriptionMetrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.observe_transcribe_duration(Duration::from_millis(300));
        metrics.observe_result_length(11);
        metrics.observe_audio_length(2.0);

        let text = metrics.render_prometheus();

        assert!(text.contains("# TYPE request_count counter\nrequest_count 2\n"));
        assert!(text.contains("# TYPE transcribe_duration_seconds histogram"));
        assert!(text.contains("transcribe_duration_seconds_bucket{le=\"0.5\"} 1"));
        assert!(text.contains("transcribe_duration_seconds_bucket{le=\"0.25\"} 0"));
        assert!(text.contains("result_length_chars_sum 11"));
        assert!(text.contains("audio_length_seconds_bucket{le=\"+Inf\"} 1"));
        assert!(text.contains("audio_length_seconds_count 1"));
    }
}
