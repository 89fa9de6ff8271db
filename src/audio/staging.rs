//! # Upload Staging
//!
//! Providers consume audio by file path, so every upload is written to a
//! transient file in the configured staging directory. The file lives exactly
//! as long as its [`StagedAudio`] guard: dropping the guard (normal return,
//! error path, or a cancelled request future) removes it.

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Longest file extension carried over from the uploaded file name.
const MAX_EXTENSION_LEN: usize = 8;

#[derive(Debug)]
pub struct StagedAudio {
    file: NamedTempFile,
}

impl StagedAudio {
    /// Write `bytes` to a fresh file in `dir`.
    ///
    /// The uploaded file name's extension is kept (when it is short and
    /// alphanumeric) since remote APIs infer the audio format from it.
    pub fn write(dir: &Path, bytes: &[u8], original_name: Option<&str>) -> std::io::Result<Self> {
        let suffix = original_name
            .and_then(safe_extension)
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();

        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&suffix)
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;

        tracing::debug!(path = %file.path().display(), bytes = bytes.len(), "Staged uploaded audio");

        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

fn safe_extension(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?;
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
