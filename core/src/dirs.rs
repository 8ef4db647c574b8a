//! Filesystem locations for voxtext.

use std::path::PathBuf;

use thiserror::Error;

const APP_NAME: &str = "voxtext";

#[derive(Debug, Error)]
pub enum DirsError {
    #[error("could not determine {0} directory (HOME not set?)")]
    Unavailable(&'static str),
    #[error("failed to create directory: {0}")]
    Create(#[from] std::io::Error),
}

/// Return the config directory (no creation - config may not exist yet).
/// `~/.config/voxtext/`
pub fn config_dir() -> Result<PathBuf, DirsError> {
    dirs::config_dir()
        .map(|p| p.join(APP_NAME))
        .ok_or(DirsError::Unavailable("config"))
}

/// Return the data directory, creating it if needed.
/// `~/.local/share/voxtext/`
pub fn data_dir() -> Result<PathBuf, DirsError> {
    let dir = dirs::data_dir()
        .map(|p| p.join(APP_NAME))
        .ok_or(DirsError::Unavailable("data"))?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Return the models directory.
/// `~/.local/share/voxtext/models/`
pub fn models_dir() -> Result<PathBuf, DirsError> {
    Ok(data_dir()?.join("models"))
}
