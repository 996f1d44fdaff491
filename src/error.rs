//! Error types for bindless_streamer

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for load operations
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Texture error: {0}")]
    Texture(#[from] crate::texture::TextureError),

    #[error("GPU error: {0}")]
    Gpu(#[from] crate::gpu::GpuError),

    #[error("Task error: {0}")]
    Task(#[from] crate::runtime::TaskError),

    #[error("Texture '{label}' is {found}, expected {expected}")]
    InvalidState {
        label: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Load failed: {0}")]
    LoadFailure(String),
}

impl AssetError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn parse(path: &Path, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// True for errors that abort the whole load rather than a single texture
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Texture(_))
    }
}

/// Result type alias for load operations
pub type Result<T> = std::result::Result<T, AssetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mentions_path() {
        let err = AssetError::io(
            Path::new("scene/missing.obj"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        let msg = err.to_string();
        assert!(msg.contains("missing.obj"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_invalid_state_message() {
        let err = AssetError::InvalidState {
            label: "albedo".into(),
            expected: "Prepared",
            found: "Unprepared",
        };
        assert_eq!(
            err.to_string(),
            "Texture 'albedo' is Unprepared, expected Prepared"
        );
    }

    #[test]
    fn test_gpu_error_converts() {
        let err: AssetError = crate::gpu::GpuError::DeviceLost.into();
        assert!(matches!(err, AssetError::Gpu(_)));
        assert!(err.is_fatal());
    }
}
