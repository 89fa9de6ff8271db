//! # Audio Handling Module
//!
//! Everything the service does with raw audio before a provider sees it.
//!
//! ## Key Components:
//! - **Staging**: Writes uploads to scoped temporary files
//! - **Processor**: WAV decoding and PCM conversion for the local model
//!
//! Duration figures reported to metrics are estimated from the byte count
//! alone; see [`estimate_duration_seconds`].

pub mod processor;    // WAV decoding and PCM conversion
pub mod staging;      // Scoped temporary files for uploads

pub use staging::StagedAudio;

/// Bytes per second assumed when estimating audio duration.
pub const ESTIMATED_BYTES_PER_SECOND: f64 = 16_000.0;

/// Rough audio duration from the upload size.
///
/// This is an approximation for the audio length histogram, not a
/// measurement: it ignores container headers, sample width, channel count
/// and compression.
pub fn estimate_duration_seconds(byte_len: usize) -> f64 {
    byte_len as f64 / ESTIMATED_BYTES_PER_SECOND
}
