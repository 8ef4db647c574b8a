//! Model weight catalog and acquisition.
//!
//! Maps (model size, precision) pairs to GGML weight files and downloads
//! them on first use. Acquisition is blocking: it runs inside the load
//! ladder, which is synchronous by contract.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::Precision;

/// Available model sizes, smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    #[default]
    Medium,
    LargeV1,
    LargeV2,
    LargeV3,
}

impl ModelSize {
    pub const ALL: [ModelSize; 7] = [
        ModelSize::Tiny,
        ModelSize::Base,
        ModelSize::Small,
        ModelSize::Medium,
        ModelSize::LargeV1,
        ModelSize::LargeV2,
        ModelSize::LargeV3,
    ];

    /// The last-resort size the load ladder falls back to.
    pub fn smallest() -> ModelSize {
        ModelSize::Tiny
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::LargeV1 => "large-v1",
            ModelSize::LargeV2 => "large-v2",
            ModelSize::LargeV3 => "large-v3",
        }
    }
}

impl fmt::Display for ModelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown model size {0:?} (expected one of tiny, base, small, medium, large-v1, large-v2, large-v3)")]
pub struct ParseModelSizeError(String);

impl std::str::FromStr for ModelSize {
    type Err = ParseModelSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelSize::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ParseModelSizeError(s.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Dirs(#[from] crate::dirs::DirsError),
    #[error("failed to download model from {url}: {source}")]
    Http { url: String, source: reqwest::Error },
    #[error("failed to download model: HTTP {0}")]
    HttpStatus(u16),
    #[error("downloaded model size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("failed to store model file: {0}")]
    Io(#[from] std::io::Error),
}

const WHISPER_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Metadata for a downloadable weight file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFile {
    /// Filename to save as.
    pub filename: String,
    /// Download URL.
    pub url: String,
    /// Expected file size for validation, where known.
    pub size_bytes: Option<u64>,
}

/// The GGML weight file backing a (size, precision) pair.
///
/// Precision maps onto the published quantizations: `int8` uses the q8_0
/// files, `int8_fp16` the mixed q5 files (q5_1 below Medium, q5_0 from
/// Medium up), and both float precisions share the unquantized weights;
/// compute precision is the inference engine's concern.
pub fn weight_file(size: ModelSize, precision: Precision) -> ModelFile {
    let stem = match precision {
        Precision::Fp16 | Precision::Fp32 => format!("ggml-{}", size.as_str()),
        Precision::Int8 => format!("ggml-{}-q8_0", size.as_str()),
        Precision::Int8Fp16 => {
            let quant = match size {
                ModelSize::Tiny | ModelSize::Base | ModelSize::Small => "q5_1",
                _ => "q5_0",
            };
            format!("ggml-{}-{}", size.as_str(), quant)
        }
    };

    let filename = format!("{stem}.bin");
    ModelFile {
        url: format!("{WHISPER_BASE_URL}/{filename}"),
        size_bytes: full_weight_size(size, precision),
        filename,
    }
}

/// Known byte sizes of the unquantized weight files, for validation.
fn full_weight_size(size: ModelSize, precision: Precision) -> Option<u64> {
    if !matches!(precision, Precision::Fp16 | Precision::Fp32) {
        return None;
    }
    match size {
        ModelSize::Tiny => Some(77_691_713),
        ModelSize::Base => Some(147_951_465),
        ModelSize::Small => Some(487_601_967),
        ModelSize::Medium => Some(1_533_774_781),
        ModelSize::LargeV3 => Some(3_094_623_691),
        ModelSize::LargeV1 | ModelSize::LargeV2 => None,
    }
}

/// Manages weight file downloads and storage.
pub struct ModelManager {
    models_dir: PathBuf,
}

impl ModelManager {
    /// Create a manager using the default models directory,
    /// `~/.local/share/voxtext/models/`.
    pub fn new() -> Result<Self, ModelError> {
        Ok(Self {
            models_dir: crate::dirs::models_dir()?,
        })
    }

    /// Create a manager with a custom models directory.
    pub fn with_dir(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    /// Get the models directory path.
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Ensure the weight file for a (size, precision) pair is available,
    /// downloading if necessary. Returns the path to the file.
    pub fn ensure(&self, size: ModelSize, precision: Precision) -> Result<PathBuf, ModelError> {
        let file = weight_file(size, precision);
        let path = self.models_dir.join(&file.filename);

        if path.exists() {
            if file_is_valid(&path, file.size_bytes)? {
                debug!(path = %path.display(), "weight file already exists");
                return Ok(path);
            }
            warn!(
                path = %path.display(),
                expected = ?file.size_bytes,
                "weight file size mismatch, re-downloading"
            );
            std::fs::remove_file(&path)?;
        }

        self.download(&file, &path)?;
        Ok(path)
    }

    /// Download a weight file to its destination.
    fn download(&self, file: &ModelFile, dest: &Path) -> Result<(), ModelError> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!(url = %file.url, dest = %dest.display(), "downloading model");

        let response = reqwest::blocking::get(&file.url).map_err(|source| ModelError::Http {
            url: file.url.clone(),
            source,
        })?;

        if !response.status().is_success() {
            return Err(ModelError::HttpStatus(response.status().as_u16()));
        }

        let bytes = response.bytes().map_err(|source| ModelError::Http {
            url: file.url.clone(),
            source,
        })?;

        if let Some(expected) = file.size_bytes {
            if bytes.len() as u64 != expected {
                return Err(ModelError::SizeMismatch {
                    expected,
                    actual: bytes.len() as u64,
                });
            }
        }

        // Write to a sibling first, then rename (atomic)
        let temp_path = dest.with_extension("tmp");
        std::fs::write(&temp_path, &bytes)?;
        std::fs::rename(&temp_path, dest)?;

        info!(path = %dest.display(), size = bytes.len(), "model downloaded");
        Ok(())
    }
}

/// Whether an on-disk weight file passes its size check. Files with an
/// unknown expected size are trusted.
fn file_is_valid(path: &Path, expected: Option<u64>) -> Result<bool, ModelError> {
    match expected {
        Some(expected) => Ok(std::fs::metadata(path)?.len() == expected),
        None => Ok(true),
    }
}

#[cfg(test)]
#[path = "models_test.rs"]
mod tests;
