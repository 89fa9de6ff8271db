//! # Local Inference Provider
//!
//! Runs a Whisper model held in process memory. The model keeps decoder
//! state between tokens, so one instance serves one request at a time:
//! requests queue on a mutex, and inference runs on the blocking thread pool
//! so actix workers keep serving other connections meanwhile.

use crate::audio::processor::decode_wav;
use crate::device::DeviceManager;
use crate::transcription::model::{ModelSize, WhisperModel};
use crate::transcription::provider::{
    TranscriptionError, TranscriptionOptions, TranscriptionProvider,
};
use async_trait::async_trait;
use candle_core::Device;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct LocalWhisperProvider {
    model: Arc<Mutex<WhisperModel>>,
    size: ModelSize,
    device: &'static str,
}

impl LocalWhisperProvider {
    /// Download (if needed) and load the model. Expected to take seconds.
    pub async fn load(size: ModelSize, device: Device) -> anyhow::Result<Self> {
        let device_name = DeviceManager::get_device_info(&device);
        let model = WhisperModel::load(size, device).await?;
        Ok(Self::new(model, size, device_name))
    }

    pub fn new(model: WhisperModel, size: ModelSize, device: &'static str) -> Self {
        Self {
            model: Arc::new(Mutex::new(model)),
            size,
            device,
        }
    }
}

#[async_trait]
impl TranscriptionProvider for LocalWhisperProvider {
    async fn transcribe(
        &self,
        audio_path: &Path,
        options: &TranscriptionOptions,
    ) -> Result<String, TranscriptionError> {
        // Read up front: the staged file may be removed before inference ends.
        let data = tokio::fs::read(audio_path)
            .await
            .map_err(|e| TranscriptionError::AudioRead(format!("{}: {}", audio_path.display(), e)))?;

        if options.fp16() {
            tracing::warn!("FP16 is not supported by this model build; using FP32 instead");
        }
        let language = options.language().map(str::to_string);
        let model = Arc::clone(&self.model);

        tokio::task::spawn_blocking(move || {
            let pcm = decode_wav(&data)?;
            let mut model = model
                .lock()
                .map_err(|_| TranscriptionError::Inference("model lock poisoned".to_string()))?;
            model.transcribe(&pcm, language.as_deref())
        })
        .await
        .map_err(|e| TranscriptionError::Inference(format!("inference task failed: {}", e)))?
    }

    fn kind(&self) -> &'static str {
        "local"
    }

    fn describe(&self) -> String {
        format!("local whisper {} on {}", self.size, self.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::processor::test_support::wav_bytes;
    use crate::transcription::model::test_support::tiny_model;
    use crate::transcription::provider::LANGUAGE_OPTION;

    fn provider() -> LocalWhisperProvider {
        LocalWhisperProvider::new(
            tiny_model(),
            ModelSize::Tiny,
            DeviceManager::get_device_info(&Device::Cpu),
        )
    }

    fn staged(data: &[u8]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), data).unwrap();
        file
    }

    #[actix_web::test]
    async fn test_transcribes_wav_file() {
        let samples: Vec<i16> = (0..16000).map(|i| ((i % 200) as i16 - 100) * 50).collect();
        let file = staged(&wav_bytes(16000, 1, &samples));

        let result = provider()
            .transcribe(file.path(), &TranscriptionOptions::new())
            .await;
        assert!(result.is_ok(), "{:?}", result);
    }

    #[actix_web::test]
    async fn test_non_wav_file_is_a_decoding_error() {
        let file = staged(b"this is not audio at all");

        let result = provider()
            .transcribe(file.path(), &TranscriptionOptions::new())
            .await;
        assert!(matches!(result, Err(TranscriptionError::Decoding(_))));
    }

    #[actix_web::test]
    async fn test_wrong_sample_rate_is_unsupported() {
        let file = staged(&wav_bytes(44100, 1, &[0; 441]));

        let result = provider()
            .transcribe(file.path(), &TranscriptionOptions::new())
            .await;
        assert!(matches!(result, Err(TranscriptionError::UnsupportedFormat(_))));
    }

    #[actix_web::test]
    async fn test_missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();

        let result = provider()
            .transcribe(&dir.path().join("gone.wav"), &TranscriptionOptions::new())
            .await;
        assert!(matches!(result, Err(TranscriptionError::AudioRead(_))));
    }

    #[actix_web::test]
    async fn test_unknown_language_fails_inference() {
        let file = staged(&wav_bytes(16000, 1, &[0; 1600]));
        let options = TranscriptionOptions::new().with(LANGUAGE_OPTION, "xx");

        let result = provider().transcribe(file.path(), &options).await;
        assert!(matches!(result, Err(TranscriptionError::Inference(_))));
    }

    #[test]
    fn test_describe_names_size_and_device() {
        let provider = provider();
        assert_eq!(provider.kind(), "local");
        assert_eq!(provider.describe(), "local whisper tiny on cpu");
    }
}
