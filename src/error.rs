//! Error types shared across the viewer.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::editing::EditError;
use crate::filter::FilterError;
use crate::persistence::PersistenceError;
use crate::source::SourceError;
use crate::store::StoreError;

/// Errors while exporting the current view.
#[derive(Error, Debug)]
pub enum ExportError {
    /// There is nothing to export
    #[error("No image loaded")]
    NoImage,

    #[error(transparent)]
    Filter(#[from] FilterError),

    /// PNG encoding or file write failed
    #[error("Failed to write {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Any error a viewer session can report.
#[derive(Error, Debug)]
pub enum ViewerError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Export(#[from] ExportError),

    /// The operation needs an image and none is loaded
    #[error("No image loaded")]
    NoImage,
}

impl ViewerError {
    /// One line suitable for a status bar or message box.
    pub fn user_message(&self) -> String {
        match self {
            ViewerError::Source(SourceError::Io { path, .. }) => {
                format!("Could not read {}", path.display())
            }
            ViewerError::Source(SourceError::Decode(_)) => {
                "The file is not a supported image".to_string()
            }
            ViewerError::Source(e) => format!("Could not acquire an image: {e}"),
            ViewerError::Filter(FilterError::EmptyImage { .. }) => {
                "The image is empty and cannot be filtered".to_string()
            }
            ViewerError::Store(StoreError::IndexOutOfRange { index, len }) => {
                format!("There is no overlay #{} (only {} exist)", index + 1, len)
            }
            ViewerError::Store(StoreError::DuplicateId(id)) => {
                format!("An overlay with id {id} already exists")
            }
            ViewerError::Store(e) => format!("Overlay file error: {e}"),
            ViewerError::Edit(EditError::DrawingInProgress) => {
                "Finish or cancel the current drawing first".to_string()
            }
            ViewerError::NoImage | ViewerError::Edit(EditError::NoImage) => {
                "Load or capture an image first".to_string()
            }
            ViewerError::Edit(e) => e.to_string(),
            ViewerError::Persistence(e) => format!("Could not save settings: {e}"),
            ViewerError::Config(e) => format!("Configuration problem: {e}"),
            ViewerError::Export(ExportError::Encode { path, .. }) => {
                format!("Could not export to {}", path.display())
            }
            ViewerError::Export(e) => format!("Export failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        let err = ViewerError::from(StoreError::IndexOutOfRange { index: 4, len: 3 });
        assert_eq!(err.user_message(), "There is no overlay #5 (only 3 exist)");

        let err = ViewerError::from(EditError::DrawingInProgress);
        assert_eq!(err.user_message(), "Finish or cancel the current drawing first");

        assert_eq!(
            ViewerError::from(EditError::NoImage).user_message(),
            "Load or capture an image first"
        );
        assert_eq!(
            ViewerError::from(SourceError::unavailable("window closed")).user_message(),
            "Could not acquire an image: Capture unavailable: window closed"
        );
    }
}
