//! File-polled cooperative controller for the training loop: polls an
//! out-of-band update file at each epoch boundary for an epoch override or
//! a stop request.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::logging::STATUS_TARGET;

/// The self-describing record read from the update file. An empty or
/// malformed file means `STOP`.
#[derive(Debug, Serialize, Deserialize)]
struct UpdateRecord {
    epoch: Option<i64>,
}

/// What the training loop should do at the next epoch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    Iterate,
    SetEpoch(usize),
    Stop,
}

/// Polls `update_path` at every training epoch boundary and translates its
/// contents into an [`UpdateAction`].
pub struct LifeCycleMonitor {
    update_path: Option<PathBuf>,
    current_epoch: usize,
}

impl LifeCycleMonitor {
    pub fn new(update_path: Option<PathBuf>) -> Self {
        Self {
            update_path,
            current_epoch: 0,
        }
    }

    /// Remove any stale update file and reset the epoch counter. Called at
    /// the start of every training run.
    pub fn reset(&mut self) {
        if let Some(path) = &self.update_path {
            if path.is_file() {
                info!(target: STATUS_TARGET, "cleaning stale update file: {}", path.display());
                let _ = fs::remove_file(path);
            }
        }
        self.current_epoch = 0;
    }

    /// Read the update file (if configured), unlink it regardless of
    /// whether it existed or parsed, and return the resulting action
    /// (read, decide, unlink).
    pub fn poll(&mut self) -> UpdateAction {
        let action = self.read_and_unlink();
        match action {
            UpdateAction::Iterate => {
                self.current_epoch += 1;
            }
            UpdateAction::SetEpoch(epoch) => {
                self.current_epoch = epoch;
            }
            UpdateAction::Stop => {}
        }
        action
    }

    fn read_and_unlink(&self) -> UpdateAction {
        let Some(path) = &self.update_path else {
            return UpdateAction::Iterate;
        };
        if !path.exists() {
            return UpdateAction::Iterate;
        }

        let action = match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<UpdateRecord>(&contents) {
                Ok(UpdateRecord { epoch: Some(epoch) }) if epoch >= 0 => {
                    info!(target: STATUS_TARGET, "setting epoch to: {epoch}");
                    UpdateAction::SetEpoch(epoch as usize)
                }
                Ok(_) => {
                    debug!(target: STATUS_TARGET, "update file had no usable epoch, stopping");
                    UpdateAction::Stop
                }
                Err(e) => {
                    info!(target: STATUS_TARGET, "unsuccessful parse of {}, assuming stop: {e}", path.display());
                    UpdateAction::Stop
                }
            },
            Err(e) => {
                info!(target: STATUS_TARGET, "could not read {}, assuming stop: {e}", path.display());
                UpdateAction::Stop
            }
        };

        let _ = fs::remove_file(path);
        action
    }

    /// Request cooperative shutdown by creating the update file. Returns
    /// whether the request was newly issued.
    pub fn stop(&self) -> bool {
        let Some(path) = &self.update_path else {
            return false;
        };
        if path.is_file() {
            return false;
        }
        if let Err(e) = fs::write(path, "{\"epoch\": -1}") {
            info!(target: STATUS_TARGET, "failed to create stop file {}: {e}", path.display());
            return false;
        }
        info!(target: STATUS_TARGET, "created early stop file: {}", path.display());
        true
    }

    pub fn current_epoch(&self) -> usize {
        self.current_epoch
    }

    pub fn update_path(&self) -> Option<&Path> {
        self.update_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_file_iterates() {
        let dir = tempdir().unwrap();
        let mut monitor = LifeCycleMonitor::new(Some(dir.path().join("update.json")));
        assert_eq!(monitor.poll(), UpdateAction::Iterate);
        assert_eq!(monitor.current_epoch(), 1);
    }

    #[test]
    fn well_formed_file_sets_epoch_and_is_removed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("update.json");
        std::fs::write(&path, r#"{"epoch": 4}"#).unwrap();
        let mut monitor = LifeCycleMonitor::new(Some(path.clone()));
        assert_eq!(monitor.poll(), UpdateAction::SetEpoch(4));
        assert_eq!(monitor.current_epoch(), 4);
        assert!(!path.exists());
    }

    #[test]
    fn malformed_file_stops_and_is_removed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("update.json");
        std::fs::write(&path, "not json").unwrap();
        let mut monitor = LifeCycleMonitor::new(Some(path.clone()));
        assert_eq!(monitor.poll(), UpdateAction::Stop);
        assert!(!path.exists());
    }

    #[test]
    fn empty_file_stops() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("update.json");
        std::fs::write(&path, "").unwrap();
        let mut monitor = LifeCycleMonitor::new(Some(path.clone()));
        assert_eq!(monitor.poll(), UpdateAction::Stop);
    }

    #[test]
    fn stop_creates_file_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("update.json");
        let monitor = LifeCycleMonitor::new(Some(path.clone()));
        assert!(monitor.stop());
        assert!(path.is_file());
        assert!(!monitor.stop());
    }

    #[test]
    fn reset_removes_stale_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("update.json");
        std::fs::write(&path, r#"{"epoch": 2}"#).unwrap();
        let mut monitor = LifeCycleMonitor::new(Some(path.clone()));
        monitor.reset();
        assert!(!path.exists());
        assert_eq!(monitor.current_epoch(), 0);
    }
}
