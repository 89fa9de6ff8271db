//! # Transcription Module
//!
//! The backend abstraction and request-handling core of the service.
//!
//! ## Key Components:
//! - **Provider trait**: `transcribe(path, options) -> text`
//! - **Local provider**: Whisper via Candle-rs, loaded once at startup
//! - **Remote provider**: OpenAI-compatible HTTP API via reqwest
//! - **Factory**: Builds exactly one provider from configuration
//! - **Request handler**: Maps provider errors to a tagged outcome

pub mod factory;     // Provider selection from configuration
pub mod handler;     // Error-to-outcome mapping
pub mod local;       // In-process Whisper provider
pub mod model;       // Whisper model loading and decoding
pub mod provider;    // The provider trait and its error type
pub mod remote;      // Remote API provider

pub use factory::ProviderFactory;
pub use handler::{RequestHandler, TranscriptionOutcome, TranscriptionRequest};
pub use provider::TranscriptionOptions;
