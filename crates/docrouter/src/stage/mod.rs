//! The stage: the ingress directory files are uploaded into before processing.

pub mod feed;
pub mod filesystem;
pub mod scanner;

use serde::Serialize;

pub use feed::{mark_consumed, pending_feed, refresh};
pub use filesystem::{validate_file_name, Stage, StagedFile};
pub use scanner::{ScannedFile, StageScanner};

/// Coarse file kind, used for stage filtering and review previews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Image,
    Unknown,
}

impl FileKind {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => FileKind::Pdf,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "tif" | "tiff" => FileKind::Image,
            _ => FileKind::Unknown,
        }
    }

    pub fn from_file_name(file_name: &str) -> Self {
        std::path::Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(FileKind::Unknown)
    }

    /// Whether the scanner picks files of this kind up.
    pub fn is_supported(&self) -> bool {
        !matches!(self, FileKind::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Pdf => "pdf",
            FileKind::Image => "image",
            FileKind::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_file_name() {
        assert_eq!(FileKind::from_file_name("permit.PDF"), FileKind::Pdf);
        assert_eq!(FileKind::from_file_name("scan.tiff"), FileKind::Image);
        assert_eq!(FileKind::from_file_name("photo.jpeg"), FileKind::Image);
        assert_eq!(FileKind::from_file_name("notes.txt"), FileKind::Unknown);
        assert_eq!(FileKind::from_file_name("README"), FileKind::Unknown);
    }

    #[test]
    fn test_supported_kinds() {
        assert!(FileKind::Pdf.is_supported());
        assert!(FileKind::Image.is_supported());
        assert!(!FileKind::Unknown.is_supported());
        assert_eq!(FileKind::Image.as_str(), "image");
    }
}
