//! # Remote API Provider
//!
//! Sends audio to an OpenAI-compatible transcription endpoint:
//! - Multipart form upload, audio in the `file` field
//! - Authorization via `Bearer` token
//! - JSON response with a `text` field
//!
//! The provider holds only immutable configuration and a pooled
//! `reqwest::Client`, so any number of requests can run through it at once.
//! No retries are attempted here; a failed call surfaces as a
//! [`TranscriptionError`] and the caller decides what to do.

use crate::transcription::provider::{
    TranscriptionError, TranscriptionOptions, TranscriptionProvider, FP16_OPTION,
};
use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

/// Default request timeout when the configuration does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

pub struct RemoteApiProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for RemoteApiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteApiProvider")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RemoteApiProvider {
    /// Build the provider. Fails only if the HTTP client cannot be created.
    pub fn new(
        api_key: String,
        endpoint: String,
        model: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        tracing::info!(
            endpoint = %endpoint,
            timeout_secs = timeout.as_secs(),
            "Remote transcription provider configured"
        );

        Ok(Self {
            client,
            api_key,
            endpoint,
            model,
            timeout,
        })
    }

    #[cfg(test)]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[cfg(test)]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    #[cfg(test)]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn build_form(
        &self,
        audio: Vec<u8>,
        file_name: String,
        options: &TranscriptionOptions,
    ) -> Result<multipart::Form, TranscriptionError> {
        let file_part = multipart::Part::bytes(audio)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .map_err(|e| TranscriptionError::Request(format!("mime: {}", e)))?;

        let mut form = multipart::Form::new().part("file", file_part);

        if let Some(model) = &self.model {
            form = form.text("model", model.clone());
        }

        for (name, value) in options.iter() {
            if name == FP16_OPTION {
                continue;
            }
            match value {
                Value::String(s) => form = form.text(name.clone(), s.clone()),
                Value::Number(n) => form = form.text(name.clone(), n.to_string()),
                Value::Bool(b) => form = form.text(name.clone(), b.to_string()),
                _ => tracing::debug!(option = %name, "Skipping non-scalar option"),
            }
        }

        Ok(form)
    }
}

#[async_trait]
impl TranscriptionProvider for RemoteApiProvider {
    async fn transcribe(
        &self,
        audio_path: &Path,
        options: &TranscriptionOptions,
    ) -> Result<String, TranscriptionError> {
        let audio = tokio::fs::read(audio_path)
            .await
            .map_err(|e| TranscriptionError::AudioRead(format!("{}: {}", audio_path.display(), e)))?;

        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        let form = self.build_form(audio, file_name, options)?;

        tracing::debug!(endpoint = %self.endpoint, "Sending audio to remote transcription API");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TranscriptionError::Request(format!(
                        "timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else {
                    TranscriptionError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(TranscriptionError::ApiStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| TranscriptionError::Request(format!("body: {}", e)))?;
        let parsed: TranscriptionResponse = serde_json::from_str(&body)
            .map_err(|e| TranscriptionError::MalformedResponse(e.to_string()))?;

        tracing::info!(
            chars = parsed.text.chars().count(),
            "Remote transcription completed"
        );

        Ok(parsed.text)
    }

    fn kind(&self) -> &'static str {
        "api"
    }

    fn describe(&self) -> String {
        format!("remote api at {}", self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_multipart::Multipart;
    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use futures_util::StreamExt;
    use std::io::Write;

    /// Mock endpoint: echoes the uploaded `file` back as the transcription,
    /// after a delay derived from its size so concurrent calls interleave.
    async fn echo_transcription(req: HttpRequest, mut payload: Multipart) -> HttpResponse {
        let auth = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if auth != "Bearer test-key" {
            return HttpResponse::Unauthorized().body("invalid api key");
        }

        let mut file = Vec::new();
        let mut fields = Vec::new();
        while let Some(Ok(mut field)) = payload.next().await {
            let name = field.name().unwrap_or_default().to_string();
            let mut bytes = Vec::new();
            while let Some(Ok(chunk)) = field.next().await {
                bytes.extend_from_slice(&chunk);
            }
            if name == "file" {
                file = bytes;
            } else {
                fields.push(name);
            }
        }

        let delay = if file.len() > 8 { 10 } else { 120 };
        actix_web::rt::time::sleep(Duration::from_millis(delay)).await;

        HttpResponse::Ok().json(serde_json::json!({
            "text": String::from_utf8_lossy(&file),
            "fields": fields,
        }))
    }

    async fn fixed(status: u16, body: &'static str) -> HttpResponse {
        HttpResponse::build(actix_web::http::StatusCode::from_u16(status).unwrap())
            .content_type("application/json")
            .body(body)
    }

    const PATH: &str = "/v1/audio/transcriptions";

    /// Serve `configure` on an ephemeral port and return the endpoint URL.
    fn start_mock_server(configure: fn(&mut web::ServiceConfig)) -> String {
        let server = HttpServer::new(move || App::new().configure(configure))
            .workers(1)
            .bind(("127.0.0.1", 0))
            .unwrap();
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        format!("http://{}{}", addr, PATH)
    }

    fn echo_routes(cfg: &mut web::ServiceConfig) {
        cfg.route(PATH, web::post().to(echo_transcription));
    }

    fn rate_limited_routes(cfg: &mut web::ServiceConfig) {
        cfg.route(
            PATH,
            web::post().to(|| fixed(429, r#"{"error":"rate limited"}"#)),
        );
    }

    fn wrong_shape_routes(cfg: &mut web::ServiceConfig) {
        cfg.route(
            PATH,
            web::post().to(|| fixed(200, r#"{"transcript":"wrong key"}"#)),
        );
    }

    /// Responds with the comma-joined names of the multipart fields received.
    async fn field_names(mut payload: Multipart) -> HttpResponse {
        let mut names = Vec::new();
        while let Some(Ok(mut field)) = payload.next().await {
            names.push(field.name().unwrap_or_default().to_string());
            while let Some(Ok(_)) = field.next().await {}
        }
        HttpResponse::Ok().json(serde_json::json!({ "text": names.join(",") }))
    }

    fn field_name_routes(cfg: &mut web::ServiceConfig) {
        cfg.route(PATH, web::post().to(field_names));
    }

    fn audio_file(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    fn provider(url: String) -> RemoteApiProvider {
        RemoteApiProvider::new(
            "test-key".to_string(),
            url,
            None,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
        .unwrap()
    }

    #[actix_web::test]
    async fn test_transcribe_returns_text_field() {
        let url = start_mock_server(echo_routes);
        let dir = tempfile::tempdir().unwrap();
        let path = audio_file(&dir, "clip.wav", b"spoken words");

        let text = provider(url)
            .transcribe(&path, &TranscriptionOptions::new())
            .await
            .unwrap();

        assert_eq!(text, "spoken words");
    }

    #[actix_web::test]
    async fn test_multibyte_transcript_is_returned_intact() {
        let url = start_mock_server(echo_routes);
        let dir = tempfile::tempdir().unwrap();
        let path = audio_file(&dir, "clip.wav", "Grüße, naïve café".as_bytes());

        let text = provider(url)
            .transcribe(&path, &TranscriptionOptions::new())
            .await
            .unwrap();

        assert_eq!(text, "Grüße, naïve café");
        assert_eq!(text.chars().count(), 17);
    }

    #[actix_web::test]
    async fn test_concurrent_calls_do_not_leak_results() {
        let url = start_mock_server(echo_routes);
        let dir = tempfile::tempdir().unwrap();
        let slow = audio_file(&dir, "slow.wav", b"first");
        let fast = audio_file(&dir, "fast.wav", b"second request");
        let provider = std::sync::Arc::new(provider(url));
        let options = TranscriptionOptions::new();

        let (a, b) = futures_util::future::join(
            provider.transcribe(&slow, &options),
            provider.transcribe(&fast, &options),
        )
        .await;

        assert_eq!(a.unwrap(), "first");
        assert_eq!(b.unwrap(), "second request");
    }

    #[actix_web::test]
    async fn test_non_success_status_carries_status_and_body() {
        let url = start_mock_server(rate_limited_routes);
        let dir = tempfile::tempdir().unwrap();
        let path = audio_file(&dir, "clip.wav", b"audio");

        let err = provider(url)
            .transcribe(&path, &TranscriptionOptions::new())
            .await
            .unwrap_err();

        match err {
            TranscriptionError::ApiStatus { status, body } => {
                assert_eq!(status, 429);
                assert!(body.contains("rate limited"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[actix_web::test]
    async fn test_wrong_key_is_reported_as_status_error() {
        let url = start_mock_server(echo_routes);
        let dir = tempfile::tempdir().unwrap();
        let path = audio_file(&dir, "clip.wav", b"audio");
        let provider = RemoteApiProvider::new(
            "wrong".to_string(),
            url,
            None,
            Duration::from_secs(5),
        )
        .unwrap();

        let err = provider
            .transcribe(&path, &TranscriptionOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptionError::ApiStatus { status: 401, .. }));
    }

    #[actix_web::test]
    async fn test_missing_text_field_is_malformed() {
        let url = start_mock_server(wrong_shape_routes);
        let dir = tempfile::tempdir().unwrap();
        let path = audio_file(&dir, "clip.wav", b"audio");

        let err = provider(url)
            .transcribe(&path, &TranscriptionOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptionError::MalformedResponse(_)));
    }

    #[actix_web::test]
    async fn test_connection_failure_is_request_error() {
        // Bind then drop a listener to get a port nobody is serving.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let dir = tempfile::tempdir().unwrap();
        let path = audio_file(&dir, "clip.wav", b"audio");

        let err = provider(format!("http://127.0.0.1:{}/v1/audio/transcriptions", port))
            .transcribe(&path, &TranscriptionOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptionError::Request(_)));
    }

    #[actix_web::test]
    async fn test_missing_file_is_audio_read_error() {
        let err = provider("http://127.0.0.1:9/unused".to_string())
            .transcribe(Path::new("/nonexistent/clip.wav"), &TranscriptionOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptionError::AudioRead(_)));
    }

    #[actix_web::test]
    async fn test_fp16_is_not_forwarded_but_other_options_are() {
        let url = start_mock_server(field_name_routes);
        let dir = tempfile::tempdir().unwrap();
        let path = audio_file(&dir, "clip.wav", b"audio");
        let options = TranscriptionOptions::new()
            .with(FP16_OPTION, false)
            .with("language", "en");

        let text = provider(url).transcribe(&path, &options).await.unwrap();

        let names: Vec<&str> = text.split(',').collect();
        assert!(names.contains(&"file"));
        assert!(names.contains(&"language"));
        assert!(!names.contains(&"fp16"));
    }
}
