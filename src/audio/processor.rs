//! # Audio Decoding and Conversion
//!
//! Turns an uploaded WAV file into the sample format Whisper expects:
//! 32-bit float, range [-1.0, 1.0], mono, 16 kHz.
//!
//! ## Supported Input:
//! - **Container**: RIFF/WAVE
//! - **Sample formats**: 8-bit unsigned, 16/24-bit signed PCM, 32-bit float
//! - **Channels**: any; frames are averaged down to mono
//! - **Sample rate**: 16 kHz only (no resampling)

use crate::transcription::provider::TranscriptionError;
use std::io::Cursor;
use wav::BitDepth;

/// Sample rate every local model input must have.
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Decode WAV bytes into mono 16 kHz float samples.
pub fn decode_wav(data: &[u8]) -> Result<Vec<f32>, TranscriptionError> {
    if data.is_empty() {
        return Err(TranscriptionError::Decoding("audio file is empty".to_string()));
    }

    let (header, track) = wav::read(&mut Cursor::new(data))
        .map_err(|e| TranscriptionError::Decoding(format!("invalid wav data: {}", e)))?;

    if header.sampling_rate != WHISPER_SAMPLE_RATE {
        return Err(TranscriptionError::UnsupportedFormat(format!(
            "sample rate {} Hz, expected {} Hz",
            header.sampling_rate, WHISPER_SAMPLE_RATE
        )));
    }

    let interleaved = samples_to_float(track)?;
    let samples = downmix(&interleaved, header.channel_count);

    if samples.is_empty() {
        return Err(TranscriptionError::Decoding("audio contains no samples".to_string()));
    }

    tracing::debug!(
        channels = header.channel_count,
        bits = header.bits_per_sample,
        samples = samples.len(),
        "Decoded wav audio"
    );

    Ok(samples)
}

/// Scale integer PCM of any supported width into [-1.0, 1.0].
fn samples_to_float(track: BitDepth) -> Result<Vec<f32>, TranscriptionError> {
    match track {
        BitDepth::Eight(samples) => Ok(samples
            .into_iter()
            .map(|s| (s as f32 - 128.0) / 128.0)
            .collect()),
        BitDepth::Sixteen(samples) => Ok(pcm_to_float(&samples)),
        BitDepth::TwentyFour(samples) => Ok(samples
            .into_iter()
            .map(|s| s as f32 / 8_388_608.0)
            .collect()),
        BitDepth::ThirtyTwoFloat(samples) => Ok(samples),
        BitDepth::Empty => Err(TranscriptionError::Decoding(
            "wav file has no sample data".to_string(),
        )),
    }
}

/// Convert 16-bit PCM samples to 32-bit float format for ML models.
pub fn pcm_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&sample| sample as f32 / 32768.0).collect()
}

/// Average interleaved frames down to a single channel.
///
/// A trailing partial frame is dropped.
pub fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use byteorder::{LittleEndian, WriteBytesExt};

    /// Build a 16-bit PCM WAV file in memory.
    pub fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.write_u32::<LittleEndian>(36 + data_len).unwrap();
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.write_u32::<LittleEndian>(16).unwrap();
        out.write_u16::<LittleEndian>(1).unwrap();
        out.write_u16::<LittleEndian>(channels).unwrap();
        out.write_u32::<LittleEndian>(sample_rate).unwrap();
        out.write_u32::<LittleEndian>(sample_rate * channels as u32 * 2).unwrap();
        out.write_u16::<LittleEndian>(channels * 2).unwrap();
        out.write_u16::<LittleEndian>(16).unwrap();
        out.extend_from_slice(b"data");
        out.write_u32::<LittleEndian>(data_len).unwrap();
        for &s in samples {
            out.write_i16::<LittleEndian>(s).unwrap();
        }
        out
    }
}
