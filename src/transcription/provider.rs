//! # Transcription Provider Interface
//!
//! Every speech-to-text backend implements [`TranscriptionProvider`]. The HTTP
//! layer never sees a concrete backend: it holds an
//! `Arc<dyn TranscriptionProvider>` chosen once at startup by the factory.
//!
//! ## Failure Modes:
//! - **Local inference**: unreadable or malformed audio, model decode errors
//! - **Remote API**: HTTP status errors, timeouts, malformed JSON
//!
//! Both end up as a [`TranscriptionError`] whose `Display` output is the
//! message handed back to clients.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Option key controlling half-precision decoding on the local model.
pub const FP16_OPTION: &str = "fp16";

/// Option key selecting the spoken language (ISO 639-1 code).
pub const LANGUAGE_OPTION: &str = "language";

/// Provider-level transcription failure.
///
/// Recoverable per request: the request handler turns it into a
/// `Failure` outcome instead of letting it reach the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("failed to read audio file: {0}")]
    AudioRead(String),
    #[error("audio decoding failed: {0}")]
    Decoding(String),
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
    #[error("transcription failed: {0}")]
    Inference(String),
    #[error("api request failed: {0}")]
    Request(String),
    #[error("api returned status {status}: {body}")]
    ApiStatus { status: u16, body: String },
    #[error("malformed api response: {0}")]
    MalformedResponse(String),
}

/// Provider-specific parameters for one transcription call.
///
/// A thin wrapper over a name → JSON value map so each backend can pick the
/// options it understands and ignore the rest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptionOptions {
    values: HashMap<String, Value>,
}

impl TranscriptionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Whether half precision was requested. Absent means no.
    pub fn fp16(&self) -> bool {
        self.get(FP16_OPTION).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn language(&self) -> Option<&str> {
        self.get(LANGUAGE_OPTION).and_then(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// The transcription capability shared by all backends.
///
/// Implementations are constructed once and then shared read-only between
/// concurrent requests, hence `Send + Sync` and `&self` receivers.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Transcribe the audio stored at `audio_path`.
    async fn transcribe(
        &self,
        audio_path: &Path,
        options: &TranscriptionOptions,
    ) -> Result<String, TranscriptionError>;

    /// Short backend identifier (`"local"` or `"api"`).
    fn kind(&self) -> &'static str;

    /// Human-readable description for logs and the health endpoint.
    fn describe(&self) -> String;
}
