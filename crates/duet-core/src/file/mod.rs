//! File operations for Duet.
//!
//! This module handles:
//! - File descriptors exchanged in offers
//! - Outgoing file sources for the sender pump
//! - Safe output paths for received files
//! - Size formatting

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::{Error, Result};

/// MIME type used when none can be guessed.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Metadata describing a file offered for transfer.
///
/// Serialized as `{"name", "size", "type"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// File name (no directory components)
    pub name: String,
    /// File size in bytes
    pub size: u64,
    /// MIME type
    #[serde(rename = "type", default)]
    pub mime_type: String,
}

impl FileDescriptor {
    /// Create a descriptor.
    pub fn new(name: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
        }
    }

    /// Create a descriptor from a file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not a readable regular file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(Error::InvalidInput(format!(
                "'{}' is not a regular file",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let mime_type = mime_guess::from_path(path)
            .first()
            .map_or_else(|| DEFAULT_MIME_TYPE.to_string(), |m| m.to_string());

        Ok(Self::new(name, metadata.len(), mime_type))
    }
}

/// A byte source that can be pumped through a channel.
pub type FileSource = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// A file selected locally and waiting to be offered.
pub struct OutgoingFile {
    descriptor: FileDescriptor,
    source: FileSource,
}

impl fmt::Debug for OutgoingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutgoingFile")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl OutgoingFile {
    /// Pair a descriptor with a source producing exactly `descriptor.size` bytes.
    pub fn new(descriptor: FileDescriptor, source: FileSource) -> Self {
        Self { descriptor, source }
    }

    /// Open a file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub async fn open(path: &Path) -> Result<Self> {
        let descriptor = FileDescriptor::from_path(path)?;
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(descriptor, Box::new(file)))
    }

    /// Wrap an in-memory buffer.
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        let descriptor = FileDescriptor::new(name, data.len() as u64, mime_type);
        Self::new(descriptor, Box::new(std::io::Cursor::new(data)))
    }

    /// The descriptor sent in the offer.
    #[must_use]
    pub fn descriptor(&self) -> &FileDescriptor {
        &self.descriptor
    }

    /// Split into descriptor and source.
    #[must_use]
    pub fn into_parts(self) -> (FileDescriptor, FileSource) {
        (self.descriptor, self.source)
    }
}

/// Reduce a peer-supplied name to a safe single path component.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .collect();

    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned
    }
}

/// Pick a path in `dir` for `name` that does not overwrite an existing file.
///
/// `report.pdf` becomes `report (1).pdf`, `report (2).pdf`, ... when taken.
#[must_use]
pub fn unique_output_path(dir: &Path, name: &str) -> PathBuf {
    let name = sanitize_file_name(name);
    let candidate = dir.join(&name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{ext}")),
        _ => (name.clone(), String::new()),
    };

    (1..)
        .map(|n| dir.join(format!("{stem} ({n}){ext}")))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

/// Format a file size for display.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_descriptor_wire_format() {
        let descriptor = FileDescriptor::new("photo.jpg", 2048, "image/jpeg");
        let json = serde_json::to_string(&descriptor).unwrap();

        assert_eq!(json, r#"{"name":"photo.jpg","size":2048,"type":"image/jpeg"}"#);
    }

    #[test]
    fn test_descriptor_missing_type_defaults_empty() {
        let descriptor: FileDescriptor =
            serde_json::from_str(r#"{"name":"notes","size":5}"#).unwrap();
        assert_eq!(descriptor.mime_type, "");
    }

    #[test]
    fn test_descriptor_from_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("readme.txt");
        std::fs::write(&path, b"hello").unwrap();

        let descriptor = FileDescriptor::from_path(&path).unwrap();
        assert_eq!(descriptor.name, "readme.txt");
        assert_eq!(descriptor.size, 5);
        assert_eq!(descriptor.mime_type, "text/plain");
    }

    #[test]
    fn test_descriptor_from_directory_fails() {
        let dir = TempDir::new().unwrap();
        assert!(FileDescriptor::from_path(dir.path()).is_err());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\a.txt"), "a.txt");
        assert_eq!(sanitize_file_name("..."), "download");
        assert_eq!(sanitize_file_name(".bashrc"), "bashrc");
        assert_eq!(sanitize_file_name("a\u{0}b.txt"), "ab.txt");
    }

    #[test]
    fn test_unique_output_path() {
        let dir = TempDir::new().unwrap();
        assert_eq!(unique_output_path(dir.path(), "a.txt"), dir.path().join("a.txt"));

        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        assert_eq!(unique_output_path(dir.path(), "a.txt"), dir.path().join("a (1).txt"));

        std::fs::write(dir.path().join("a (1).txt"), b"x").unwrap();
        assert_eq!(unique_output_path(dir.path(), "a.txt"), dir.path().join("a (2).txt"));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(8_000_000), "7.6 MB");
    }
}
