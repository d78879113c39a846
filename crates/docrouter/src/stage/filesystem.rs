use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info};
use reqwest::Url;
use serde::Serialize;

use super::FileKind;
use crate::error::StageError;

/// A file that is present in the stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagedFile {
    pub file_name: String,
    pub path: PathBuf,
    pub mime_type: String,
    pub size: u64,
    pub kind: FileKind,
}

impl StagedFile {
    pub fn read_bytes(&self) -> Result<Vec<u8>, StageError> {
        std::fs::read(&self.path).map_err(|e| StageError::ReadFile {
            path: self.path.clone(),
            source: e,
        })
    }
}

/// Rejects names that would escape the stage directory or are not plain file names.
pub fn validate_file_name(file_name: &str) -> Result<(), StageError> {
    let reason = if file_name.trim().is_empty() {
        Some("name is empty")
    } else if file_name.contains('/') || file_name.contains('\\') {
        Some("name contains a path separator")
    } else if file_name == "." || file_name == ".." {
        Some("name refers to a directory")
    } else if file_name.starts_with('.') {
        Some("hidden files are not staged")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StageError::InvalidFileName {
            name: file_name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Local-directory stage.
#[derive(Debug, Clone)]
pub struct Stage {
    directory: PathBuf,
    url_base: Option<Url>,
}

impl Stage {
    /// `url_base`, when set, is the public prefix staged files are served under.
    pub fn new<P: AsRef<Path>>(directory: P, url_base: Option<&str>) -> Result<Self, StageError> {
        let url_base = match url_base.map(str::trim).filter(|b| !b.is_empty()) {
            Some(base) => {
                let mut base = base.to_string();
                if !base.ends_with('/') {
                    base.push('/');
                }
                Some(Url::parse(&base).map_err(|e| StageError::InvalidUrl(format!("{}: {}", base, e)))?)
            }
            None => None,
        };

        Ok(Self {
            directory: directory.as_ref().to_path_buf(),
            url_base,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Creates the stage directory if missing.
    pub fn ensure_exists(&self) -> Result<(), StageError> {
        if !self.directory.exists() {
            std::fs::create_dir_all(&self.directory).map_err(|e| StageError::CreateDirectory {
                path: self.directory.clone(),
                source: e,
            })?;
            info!("Created stage directory {}", self.directory.display());
        }
        Ok(())
    }

    /// Writes `content` under `file_name`, replacing any existing file.
    ///
    /// The bytes land in a hidden temp file first and are renamed into place,
    /// so scanners never see a half-written document.
    pub fn put(&self, file_name: &str, content: &[u8]) -> Result<StagedFile, StageError> {
        validate_file_name(file_name)?;
        self.ensure_exists()?;

        let target = self.directory.join(file_name);
        let temp = self
            .directory
            .join(format!(".{}.{}.part", file_name, uuid::Uuid::new_v4()));

        let write_result = std::fs::File::create(&temp).and_then(|mut file| {
            file.write_all(content)?;
            file.sync_all()
        });
        if let Err(e) = write_result {
            let _ = std::fs::remove_file(&temp);
            return Err(StageError::WriteFile {
                path: temp,
                source: e,
            });
        }

        std::fs::rename(&temp, &target).map_err(|e| {
            let _ = std::fs::remove_file(&temp);
            StageError::WriteFile {
                path: target.clone(),
                source: e,
            }
        })?;

        debug!("Staged {} ({} bytes)", file_name, content.len());
        self.open(file_name)
    }

    /// Looks up a staged file by name.
    pub fn open(&self, file_name: &str) -> Result<StagedFile, StageError> {
        validate_file_name(file_name)?;
        let path = self.directory.join(file_name);
        let metadata = match std::fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(StageError::NotFound(file_name.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StageError::NotFound(file_name.to_string()))
            }
            Err(e) => return Err(StageError::ReadFile { path, source: e }),
        };

        let mime_type = mime_guess::from_path(&path)
            .first()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        Ok(StagedFile {
            file_name: file_name.to_string(),
            mime_type,
            size: metadata.len(),
            kind: FileKind::from_file_name(file_name),
            path,
        })
    }

    /// Address a reviewer can open the file at.
    pub fn url_for(&self, file_name: &str) -> Result<String, StageError> {
        validate_file_name(file_name)?;

        if let Some(ref base) = self.url_base {
            let escaped = file_name
                .replace('%', "%25")
                .replace('#', "%23")
                .replace('?', "%3F");
            return base
                .join(&escaped)
                .map(|u| u.to_string())
                .map_err(|e| StageError::InvalidUrl(format!("{}: {}", file_name, e)));
        }

        let mut path = self.directory.join(file_name);
        if path.is_relative() {
            let cwd = std::env::current_dir().map_err(|e| StageError::ReadFile {
                path: path.clone(),
                source: e,
            })?;
            path = cwd.join(path);
        }
        Url::from_file_path(&path)
            .map(|u| u.to_string())
            .map_err(|_| StageError::InvalidUrl(path.display().to_string()))
    }
}
