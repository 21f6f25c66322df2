//! Error types for DOCX template processing.

use std::path::{Path, PathBuf};

/// Errors raised while reading, filling, merging or writing a package.
#[derive(Debug, thiserror::Error)]
pub enum FillError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Malformed XML in {part}: {message}")]
    Xml { part: String, message: String },

    #[error("Part not found in package: {0}")]
    MissingPart(String),

    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    #[error("Invalid pattern: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("{}: {source}", .path.display())]
    AtPath {
        path: PathBuf,
        #[source]
        source: Box<FillError>,
    },
}

impl FillError {
    pub(crate) fn xml(part: &str, message: impl std::fmt::Display) -> Self {
        FillError::Xml {
            part: part.to_string(),
            message: message.to_string(),
        }
    }

    /// Attach the file the error happened on.
    pub fn at(self, path: &Path) -> Self {
        FillError::AtPath {
            path: path.to_path_buf(),
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, FillError>;
