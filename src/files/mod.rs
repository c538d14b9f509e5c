use chrono::{ DateTime, Local, Utc };
use log::{ info, warn };
use std::io::ErrorKind;
use std::path::{ Path, PathBuf };
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

use crate::config::FileStoreConfig;
use crate::models::files::OutputFileInfo;

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("File extension {0} not allowed")]
    ExtensionNotAllowed(String),
    #[error("File size exceeds {0}MB limit")]
    TooLarge(u64),
    #[error("Invalid file name: {0}")]
    InvalidName(String),
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("File storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl FileStoreError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FileStoreError::ExtensionNotAllowed(_) |
                FileStoreError::TooLarge(_) |
                FileStoreError::InvalidName(_)
        )
    }
}

/// Uploaded files live in `uploads_dir` as `{file_id}_{original name}`;
/// processed results live in `outputs_dir`.
#[derive(Debug, Clone)]
pub struct FileStore {
    config: FileStoreConfig,
}

impl FileStore {
    pub fn new(config: FileStoreConfig) -> Self {
        Self { config }
    }

    pub async fn init(&self) -> Result<(), FileStoreError> {
        fs::create_dir_all(&self.config.uploads_dir).await?;
        fs::create_dir_all(&self.config.outputs_dir).await?;
        info!(
            "Storage directories ready: uploads={}, outputs={}",
            self.config.uploads_dir.display(),
            self.config.outputs_dir.display()
        );
        Ok(())
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.config.uploads_dir
    }

    pub fn outputs_dir(&self) -> &Path {
        &self.config.outputs_dir
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.config.max_file_size_bytes
    }

    pub fn max_file_size_mb(&self) -> u64 {
        self.config.max_file_size_bytes / (1024 * 1024)
    }

    pub fn is_allowed_name(&self, name: &str) -> bool {
        extension_of(name).map_or(false, |ext| self.config.allowed_extensions.contains(&ext))
    }

    pub async fn save_file(&self, name: &str, content: &[u8]) -> Result<(String, PathBuf), FileStoreError> {
        let base_name = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| FileStoreError::InvalidName(name.to_string()))?;

        let ext = extension_of(base_name).unwrap_or_default();
        if !self.config.allowed_extensions.contains(&ext) {
            return Err(FileStoreError::ExtensionNotAllowed(ext));
        }
        if (content.len() as u64) > self.config.max_file_size_bytes {
            return Err(FileStoreError::TooLarge(self.max_file_size_mb()));
        }

        let file_id = Uuid::new_v4().to_string();
        let path = self.config.uploads_dir.join(format!("{}_{}", file_id, base_name));
        fs::create_dir_all(&self.config.uploads_dir).await?;
        fs::write(&path, content).await?;
        info!("Saved upload '{}' as {} ({} bytes)", base_name, file_id, content.len());

        Ok((file_id, path))
    }

    async fn find_upload(&self, file_id: &str) -> Result<Option<PathBuf>, FileStoreError> {
        if file_id.is_empty() {
            return Ok(None);
        }
        let mut entries = match fs::read_dir(&self.config.uploads_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(None);
            }
            Err(e) => {
                return Err(e.into());
            }
        };
        let prefix = format!("{}_", file_id);
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }

    pub async fn file_exists(&self, file_id: &str) -> bool {
        matches!(self.find_upload(file_id).await, Ok(Some(_)))
    }

    /// Decoded text of an upload, `None` when the id is unknown or the file is not UTF-8.
    pub async fn read_file_content(&self, file_id: &str) -> Result<Option<String>, FileStoreError> {
        let path = match self.find_upload(file_id).await? {
            Some(path) => path,
            None => {
                return Ok(None);
            }
        };
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                warn!("Upload {} is not valid UTF-8: {}", file_id, e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_output_file(&self, file_id: &str, content: &str) -> Result<String, FileStoreError> {
        let filename = format!("output_{}_{}.txt", file_id, Local::now().format("%Y%m%d_%H%M%S"));
        let path = self.output_path(&filename)?;
        fs::create_dir_all(&self.config.outputs_dir).await?;
        fs::write(&path, content).await?;
        info!("Wrote output file {}", filename);
        Ok(filename)
    }

    /// Resolves an output file name, refusing anything that is not a bare file name.
    pub fn output_path(&self, filename: &str) -> Result<PathBuf, FileStoreError> {
        let is_bare = Path::new(filename)
            .file_name()
            .map_or(false, |n| n == filename);
        if !is_bare || filename.contains('/') || filename.contains('\\') {
            return Err(FileStoreError::InvalidName(filename.to_string()));
        }
        Ok(self.config.outputs_dir.join(filename))
    }

    pub async fn list_output_files(&self) -> Result<Vec<OutputFileInfo>, FileStoreError> {
        let mut entries = match fs::read_dir(&self.config.outputs_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e.into());
            }
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name().to_string_lossy().into_owned();
            if !filename.ends_with(".txt") {
                continue;
            }
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            files.push(OutputFileInfo {
                filename,
                size: meta.len(),
                created: meta.created().ok().map(DateTime::<Utc>::from),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }

    pub async fn delete_output_file(&self, filename: &str) -> Result<(), FileStoreError> {
        let path = self.output_path(filename)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted output file {}", filename);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(FileStoreError::NotFound(filename.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}
