//! # Request Handler
//!
//! The single place where heterogeneous provider failures (decode errors,
//! HTTP errors, I/O errors) are funneled into one outcome shape. Callers
//! pattern-match on [`TranscriptionOutcome`] instead of handling provider
//! errors themselves.

use crate::transcription::provider::{TranscriptionOptions, TranscriptionProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// One transcription call: staged audio plus provider parameters.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub audio_path: PathBuf,
    pub options: TranscriptionOptions,
}

impl TranscriptionRequest {
    pub fn new(audio_path: impl Into<PathBuf>, options: TranscriptionOptions) -> Self {
        Self {
            audio_path: audio_path.into(),
            options,
        }
    }
}

/// Tagged result of a transcription call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionOutcome {
    Success { text: String },
    Failure { message: String },
}

/// Binds a provider and normalizes its results.
pub struct RequestHandler {
    provider: Arc<dyn TranscriptionProvider>,
}

impl RequestHandler {
    pub fn new(provider: Arc<dyn TranscriptionProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn TranscriptionProvider> {
        &self.provider
    }

    /// Run the provider on the staged file. Never returns an error: provider
    /// failures become `Failure` with the error's display text.
    pub async fn handle(&self, request: &TranscriptionRequest) -> TranscriptionOutcome {
        match self
            .provider
            .transcribe(&request.audio_path, &request.options)
            .await
        {
            Ok(text) => {
                debug!(
                    provider = self.provider.kind(),
                    chars = text.chars().count(),
                    "Transcription succeeded"
                );
                TranscriptionOutcome::Success { text }
            }
            Err(e) => {
                warn!(provider = self.provider.kind(), error = %e, "Transcription failed");
                TranscriptionOutcome::Failure {
                    message: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Stub provider shared by the handler and HTTP tests.

    use super::*;
    use crate::transcription::provider::TranscriptionError;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub struct StubProvider {
        response: Result<String, String>,
        calls: AtomicUsize,
        seen: Mutex<Vec<(PathBuf, bool, TranscriptionOptions)>>,
    }

    impl StubProvider {
        pub fn returning(text: &str) -> Self {
            Self::with_response(Ok(text.to_string()))
        }

        pub fn failing(message: &str) -> Self {
            Self::with_response(Err(message.to_string()))
        }

        fn with_response(response: Result<String, String>) -> Self {
            Self {
                response,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Paths handed to the stub, whether each existed at call time, and
        /// the options it received.
        pub fn seen(&self) -> Vec<(PathBuf, bool, TranscriptionOptions)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TranscriptionProvider for StubProvider {
        async fn transcribe(
            &self,
            audio_path: &Path,
            options: &TranscriptionOptions,
        ) -> Result<String, TranscriptionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push((
                audio_path.to_path_buf(),
                audio_path.exists(),
                options.clone(),
            ));
            self.response
                .clone()
                .map_err(TranscriptionError::Inference)
        }

        fn kind(&self) -> &'static str {
            "stub"
        }

        fn describe(&self) -> String {
            "stub provider".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::StubProvider;
    use super::*;

    fn request() -> TranscriptionRequest {
        TranscriptionRequest::new("/tmp/does-not-matter.wav", TranscriptionOptions::new())
    }

    #[actix_web::test]
    async fn test_success_is_tagged() {
        let handler = RequestHandler::new(Arc::new(StubProvider::returning("hello world")));

        let outcome = handler.handle(&request()).await;

        assert_eq!(
            outcome,
            TranscriptionOutcome::Success {
                text: "hello world".to_string()
            }
        );
    }

    #[actix_web::test]
    async fn test_provider_error_becomes_failure() {
        let stub = Arc::new(StubProvider::failing("model exploded"));
        let handler = RequestHandler::new(stub.clone());

        let outcome = handler.handle(&request()).await;

        let expected = crate::transcription::provider::TranscriptionError::Inference(
            "model exploded".to_string(),
        )
        .to_string();
        assert_eq!(outcome, TranscriptionOutcome::Failure { message: expected });
        assert_eq!(stub.call_count(), 1);
    }

    #[actix_web::test]
    async fn test_options_are_forwarded() {
        let stub = Arc::new(StubProvider::returning("ok"));
        let handler = RequestHandler::new(stub.clone());
        let request = TranscriptionRequest::new(
            "/tmp/a.wav",
            TranscriptionOptions::new().with("language", "fr"),
        );

        handler.handle(&request).await;

        let seen = stub.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].2.language(), Some("fr"));
    }
}
