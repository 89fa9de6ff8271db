//! # Whisper Model Management
//!
//! Loads Whisper weights with Candle-rs and runs greedy decoding over PCM
//! audio.
//!
//! ## Model Loading Process:
//! 1. Download model files from HuggingFace if not cached locally
//! 2. Load configuration, tokenizer and mel filter bank
//! 3. Memory-map the safetensors weights onto the chosen device
//!
//! Loading is a one-time startup cost. A loaded [`WhisperModel`] keeps a
//! decoder KV cache, so decoding needs `&mut self` and callers must serialize
//! access to a single instance.

use anyhow::{anyhow, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use hf_hub::api::tokio::ApiBuilder;
use std::io::Cursor;
use tokenizers::Tokenizer;

use crate::transcription::provider::TranscriptionError;

/// Repository hosting the precomputed mel filter banks.
const MEL_FILTERS_REPO: &str = "FL33TW00D-HF/whisper-base";

/// Consecutive identical tokens after which the decoder is considered stuck.
const MAX_REPEATED_TOKENS: usize = 32;

/// Available Whisper model sizes.
///
/// ## Trade-offs:
/// - **Size vs Accuracy**: Larger models are more accurate but slower
/// - **Memory vs Speed**: More memory usage for better performance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// Get the HuggingFace model repository name.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

/// A loaded Whisper model ready for transcription.
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    device: Device,
    tokenizer: Tokenizer,
    mel_filters: Vec<f32>,
}

impl WhisperModel {
    /// Load a Whisper model from HuggingFace.
    ///
    /// Honors `HF_TOKEN` and `HF_HUB_CACHE` the same way the hub CLI does.
    pub async fn load(size: ModelSize, device: Device) -> Result<Self> {
        tracing::info!(model = %size, repo = size.repo_name(), "Loading Whisper model");
        let start_time = std::time::Instant::now();

        let mut builder = ApiBuilder::new()
            .with_progress(false)
            .with_token(std::env::var("HF_TOKEN").ok());
        if let Ok(cache_dir) = std::env::var("HF_HUB_CACHE") {
            tracing::debug!("Using custom cache dir: {}", cache_dir);
            builder = builder.with_cache_dir(cache_dir.into());
        }
        let api = builder.build().context("Failed to create HuggingFace API client")?;

        let repo = api.model(size.repo_name().to_string());
        let config_filename = repo
            .get("config.json")
            .await
            .map_err(|e| anyhow!("Failed to download config.json from {}: {}", size.repo_name(), e))?;
        let tokenizer_filename = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| anyhow!("Failed to download tokenizer.json from {}: {}", size.repo_name(), e))?;
        let model_filename = repo
            .get("model.safetensors")
            .await
            .map_err(|e| anyhow!("Failed to download model weights from {}: {}", size.repo_name(), e))?;

        let config: Config = serde_json::from_reader(std::fs::File::open(config_filename)?)?;
        tracing::debug!("Model config: {:?}", config);

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let mel_file = match config.num_mel_bins {
            80 => "melfilters.bytes",
            128 => "melfilters128.bytes",
            other => return Err(anyhow!("Unsupported number of mel bins: {}", other)),
        };
        let mel_path = api
            .model(MEL_FILTERS_REPO.to_string())
            .get(mel_file)
            .await
            .map_err(|e| anyhow!("Failed to download {}: {}", mel_file, e))?;
        let mel_filters = read_mel_filters(&std::fs::read(mel_path)?, &config)?;

        // SAFETY: safetensors files are memory-mapped read-only
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[model_filename], m::DTYPE, &device)? };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        tracing::info!(
            model = %size,
            "Whisper model loaded in {:.2}s",
            start_time.elapsed().as_secs_f64()
        );

        Ok(Self::new(model, config, device, tokenizer, mel_filters))
    }

    /// Assemble a model from already loaded parts.
    pub fn new(
        model: m::model::Whisper,
        config: Config,
        device: Device,
        tokenizer: Tokenizer,
        mel_filters: Vec<f32>,
    ) -> Self {
        Self {
            model,
            config,
            device,
            tokenizer,
            mel_filters,
        }
    }

    /// Transcribe mono 16 kHz PCM samples.
    ///
    /// Audio is split into 30 second windows; each window is decoded greedily
    /// and the window texts are joined with a space.
    pub fn transcribe(
        &mut self,
        pcm: &[f32],
        language: Option<&str>,
    ) -> Result<String, TranscriptionError> {
        if pcm.is_empty() {
            return Err(TranscriptionError::Decoding("audio contains no samples".to_string()));
        }

        let start_time = std::time::Instant::now();
        let language_token = match language {
            Some(lang) => Some(self.token_id(&format!("<|{}|>", lang.to_lowercase())).map_err(
                |_| TranscriptionError::Inference(format!("unsupported language: {}", lang)),
            )?),
            None => None,
        };

        let mut segments = Vec::new();
        for (i, chunk) in pcm.chunks(m::N_SAMPLES).enumerate() {
            let mel = self.mel_window(chunk)?;

            tracing::debug!(segment = i, "Decoding audio segment");
            let text = self.decode_segment(&mel, language_token);
            self.model.reset_kv_cache();
            let text = text?;
            if !text.is_empty() {
                segments.push(text);
            }
        }

        let transcript = segments.join(" ");
        tracing::debug!(
            "Transcribed {:.2}s of audio in {:.2}s",
            pcm.len() as f64 / m::SAMPLE_RATE as f64,
            start_time.elapsed().as_secs_f64()
        );
        Ok(transcript)
    }

    /// Log-mel spectrogram of one window, shaped `(1, n_mels, N_FRAMES)`.
    ///
    /// `pcm_to_mel` pads its input on its own, so the result is cut back to
    /// the frame count the encoder's positional embedding covers.
    fn mel_window(&self, chunk: &[f32]) -> Result<Tensor, TranscriptionError> {
        let mut samples = chunk.to_vec();
        samples.resize(m::N_SAMPLES, 0.0);

        let mel = m::audio::pcm_to_mel(&self.config, &samples, &self.mel_filters);
        let n_mels = self.config.num_mel_bins;
        let n_frames = mel.len() / n_mels;
        if n_frames < m::N_FRAMES {
            return Err(TranscriptionError::Inference(format!(
                "mel window has {} frames, expected at least {}",
                n_frames,
                m::N_FRAMES
            )));
        }

        Tensor::from_vec(mel, (1, n_mels, n_frames), &self.device)
            .and_then(|mel| mel.narrow(2, 0, m::N_FRAMES))
            .map_err(|e| TranscriptionError::Inference(format!("mel tensor: {}", e)))
    }

    fn decode_segment(
        &mut self,
        mel: &Tensor,
        language_token: Option<u32>,
    ) -> Result<String, TranscriptionError> {
        let sot = self.token_id(m::SOT_TOKEN)?;
        let transcribe = self.token_id(m::TRANSCRIBE_TOKEN)?;
        let no_timestamps = self.token_id(m::NO_TIMESTAMPS_TOKEN)?;
        let eot = self.token_id(m::EOT_TOKEN)?;

        let audio_features = self
            .model
            .encoder
            .forward(mel, true)
            .map_err(|e| TranscriptionError::Inference(format!("encoder: {}", e)))?;

        let mut tokens = vec![sot];
        tokens.extend(language_token);
        tokens.push(transcribe);
        tokens.push(no_timestamps);
        let prompt_len = tokens.len();

        let max_tokens = self.config.max_target_positions / 2;
        for i in 0..max_tokens {
            let next = self
                .next_token(&tokens, &audio_features, i == 0)
                .map_err(|e| TranscriptionError::Inference(format!("decoder: {}", e)))?;
            if next == eot {
                break;
            }
            if is_stuck(&tokens[prompt_len..], next) {
                return Err(TranscriptionError::Inference(format!(
                    "decoder repeated token {} {} times in a row",
                    next, MAX_REPEATED_TOKENS
                )));
            }
            tokens.push(next);
        }

        let text = self
            .tokenizer
            .decode(&tokens[prompt_len..], true)
            .map_err(|e| TranscriptionError::Inference(format!("tokenizer decode: {}", e)))?;
        Ok(text.trim().to_string())
    }

    fn next_token(
        &mut self,
        tokens: &[u32],
        audio_features: &Tensor,
        flush_kv_cache: bool,
    ) -> candle_core::Result<u32> {
        let tokens_t = Tensor::new(tokens, &self.device)?.unsqueeze(0)?;
        let ys = self
            .model
            .decoder
            .forward(&tokens_t, audio_features, flush_kv_cache)?;
        let (_, seq_len, _) = ys.dims3()?;
        let logits = self
            .model
            .decoder
            .final_linear(&ys.narrow(1, seq_len - 1, 1)?)?
            .squeeze(0)?
            .squeeze(0)?;
        logits.argmax(0)?.to_scalar::<u32>()
    }

    fn token_id(&self, token: &str) -> Result<u32, TranscriptionError> {
        self.tokenizer
            .token_to_id(token)
            .ok_or_else(|| TranscriptionError::Inference(format!("token not found: {}", token)))
    }
}

/// Whether `new_token` would extend a run of identical tokens to
/// `MAX_REPEATED_TOKENS`. Repeated phrases are legitimate speech; a single
/// token emitted dozens of times is a decoder loop.
fn is_stuck(tokens: &[u32], new_token: u32) -> bool {
    let run = MAX_REPEATED_TOKENS - 1;
    tokens.len() >= run && tokens[tokens.len() - run..].iter().all(|&t| t == new_token)
}

/// Parse a little-endian f32 mel filter bank sized for `config`.
fn read_mel_filters(bytes: &[u8], config: &Config) -> Result<Vec<f32>> {
    let expected_len = config.num_mel_bins * (m::N_FFT / 2 + 1);
    if bytes.len() < expected_len * 4 {
        return Err(anyhow!(
            "mel filters file too small: {} bytes, expected at least {}",
            bytes.len(),
            expected_len * 4
        ));
    }

    let mut filters = vec![0f32; expected_len];
    Cursor::new(bytes).read_f32_into::<LittleEndian>(&mut filters)?;
    Ok(filters)
}


#[cfg(test)]
pub(crate) mod test_support {
    //! A zero-weight Whisper small enough to run in unit tests.

    use super::*;
    use candle_core::DType;
    use std::str::FromStr;

    pub const N_MELS: usize = 80;

    fn tiny_config() -> Config {
        serde_json::from_value(serde_json::json!({
            "num_mel_bins": N_MELS,
            "max_source_positions": 1500,
            "d_model": 8,
            "encoder_attention_heads": 2,
            "encoder_layers": 1,
            "vocab_size": 7,
            "max_target_positions": 12,
            "decoder_attention_heads": 2,
            "decoder_layers": 1,
            "suppress_tokens": []
        }))
        .unwrap()
    }

    fn tiny_tokenizer() -> Tokenizer {
        let json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": null,
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": {
                    "hello": 0,
                    "<|endoftext|>": 1,
                    "<|startoftranscript|>": 2,
                    "<|transcribe|>": 3,
                    "<|notimestamps|>": 4,
                    "<|en|>": 5,
                    "<unk>": 6
                },
                "unk_token": "<unk>"
            }
        });
        Tokenizer::from_str(&json.to_string()).unwrap()
    }

    pub fn tiny_model() -> WhisperModel {
        let device = Device::Cpu;
        let config = tiny_config();
        let vb = VarBuilder::zeros(DType::F32, &device);
        let model = m::model::Whisper::load(&vb, config.clone()).unwrap();
        let mel_filters = vec![0.0; N_MELS * (m::N_FFT / 2 + 1)];
        WhisperModel::new(model, config, device, tiny_tokenizer(), mel_filters)
    }
}
