//! Source documents on disk.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Extensions [`FileReader::list_files`] reports.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["txt", "md", "docx", "pdf"];

/// Extensions [`FileReader::read`] can turn into text.
const TEXT_EXTENSIONS: [&str; 2] = ["txt", "md"];

/// A source document found by [`FileReader::list_files`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub name: String,
    pub path: PathBuf,
    /// Lowercase, without the dot.
    pub extension: String,
    pub size_bytes: u64,
}

/// Lists and reads source documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileReader;

impl FileReader {
    pub fn new() -> Self {
        Self
    }

    /// Supported files directly inside `dir`, sorted by name.
    pub async fn list_files(&self, dir: impl AsRef<Path>) -> Result<Vec<FileMeta>> {
        let mut entries = tokio::fs::read_dir(dir.as_ref()).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let path = entry.path();
            let Some(extension) = extension_of(&path) else {
                continue;
            };
            if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
                continue;
            }
            files.push(FileMeta {
                name: entry.file_name().to_string_lossy().into_owned(),
                path,
                extension,
                size_bytes: metadata.len(),
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(dir = %dir.as_ref().display(), count = files.len(), "listed source files");
        Ok(files)
    }

    /// Text of a `txt` or `md` file.
    ///
    /// `docx` and `pdf` are listed but not decoded here; they fail with
    /// [`PipelineError::UnsupportedFile`], like any unknown extension.
    pub async fn read(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        match extension_of(path) {
            Some(ext) if TEXT_EXTENSIONS.contains(&ext.as_str()) => {
                let bytes = tokio::fs::read(path).await?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            _ => Err(PipelineError::UnsupportedFile(path.display().to_string())),
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.md"), "# B").unwrap();
        std::fs::write(dir.path().join("a.TXT"), "alpha").unwrap();
        std::fs::write(dir.path().join("c.pdf"), [0u8, 1, 2]).unwrap();
        std::fs::write(dir.path().join("notes.csv"), "x,y").unwrap();
        std::fs::create_dir(dir.path().join("nested.md")).unwrap();

        let files = FileReader::new().list_files(dir.path()).await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.TXT", "b.md", "c.pdf"]);
        assert_eq!(files[0].extension, "txt");
        assert_eq!(files[0].size_bytes, 5);
        assert_eq!(files[2].size_bytes, 3);
    }

    #[tokio::test]
    async fn test_read_text_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("article.md");
        std::fs::write(&path, "Cycling saves 40 minutes.").unwrap();
        let text = FileReader::new().read(&path).await.unwrap();
        assert_eq!(text, "Cycling saves 40 minutes.");
    }

    #[tokio::test]
    async fn test_binary_and_unknown_formats_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["report.docx", "report.pdf", "data.csv", "README"] {
            let path = dir.path().join(name);
            std::fs::write(&path, "x").unwrap();
            let err = FileReader::new().read(&path).await.unwrap_err();
            assert!(matches!(err, PipelineError::UnsupportedFile(_)), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileReader::new()
            .list_files(dir.path().join("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
