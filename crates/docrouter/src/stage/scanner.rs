use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use notify::{Config as NotifyConfig, PollWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer_opt, Config as DebouncerConfig, DebouncedEventKind};
use walkdir::WalkDir;

use super::{validate_file_name, FileKind};
use crate::error::StageError;

/// A supported file found at the top level of the stage directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedFile {
    pub file_name: String,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

fn stageable_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    if validate_file_name(name).is_err() {
        return None;
    }
    if !FileKind::from_file_name(name).is_supported() {
        return None;
    }
    Some(name.to_string())
}

#[derive(Debug, Clone)]
pub struct StageScanner {
    directory: PathBuf,
}

impl StageScanner {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Lists supported files in the stage, oldest modification first.
    /// Files modified at the same instant are ordered by name.
    pub fn scan(&self) -> Result<Vec<ScannedFile>, StageError> {
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.directory).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(StageError::ScanFailed {
                        path: self.directory.clone(),
                        source: e,
                    })
                }
                Err(e) => {
                    warn!("Skipping unreadable stage entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            let Some(file_name) = stageable_name(entry.path()) else {
                continue;
            };

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!("Skipping {}: {}", file_name, e);
                    continue;
                }
            };
            let modified_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            debug!("Found staged document: {}", file_name);
            files.push(ScannedFile {
                file_name,
                size: metadata.len(),
                modified_at,
            });
        }

        files.sort_by(|a, b| {
            a.modified_at
                .cmp(&b.modified_at)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        info!(
            "Scanned {} document(s) in {}",
            files.len(),
            self.directory.display()
        );
        Ok(files)
    }

    /// Blocks until `shutdown` is set, invoking `callback` with the name of
    /// every supported file that appears or changes.
    pub fn watch<F>(&self, callback: F, shutdown: Arc<AtomicBool>) -> Result<(), StageError>
    where
        F: Fn(String) + Send + 'static,
    {
        // Polling works on network mounts where inotify does not.
        let poll_config = NotifyConfig::default().with_poll_interval(Duration::from_secs(2));
        let debouncer_config = DebouncerConfig::default()
            .with_timeout(Duration::from_millis(500))
            .with_notify_config(poll_config);

        let (tx, rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer_opt::<_, PollWatcher>(debouncer_config, tx)
            .map_err(|e| StageError::WatchError(e.to_string()))?;
        debouncer
            .watcher()
            .watch(&self.directory, RecursiveMode::NonRecursive)
            .map_err(|e| StageError::WatchError(e.to_string()))?;

        info!("Watching stage directory: {}", self.directory.display());

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Stage watch shutting down");
                break;
            }

            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(Ok(events)) => {
                    for event in events {
                        if !matches!(event.kind, DebouncedEventKind::Any) {
                            continue;
                        }
                        if !event.path.is_file() {
                            continue;
                        }
                        if let Some(file_name) = stageable_name(&event.path) {
                            info!("New staged document detected: {}", file_name);
                            callback(file_name);
                        }
                    }
                }
                Ok(Err(e)) => warn!("Watch error: {:?}", e),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    error!("Watch channel disconnected");
                    break;
                }
            }
        }

        Ok(())
    }
}
