//! Pure I/O façade over the checkpoint directory. Holds no in-memory
//! state; the [`crate::executor::Executor`] supplies already serialized
//! weight/optimizer bytes (produced via `burn`'s recorder) and this module
//! is responsible only for the atomic five-file write.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{ExecutorError, ExecutorResult};
use crate::logging::STATUS_TARGET;
use crate::result::ModelResult;

/// `{host, numeric, device?}` — the seeds of the host RNG, the numeric
/// framework's RNG, and (if present) the accelerator RNG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRecord {
    pub host: u64,
    pub numeric: u64,
    pub device: Option<u64>,
}

/// The plain-data members of the checkpoint quintuple; weights and
/// optimizer state are handled separately via
/// [`CheckpointManager::save_executor`]'s `weights_writer`/
/// `optimizer_writer` callbacks because burn's recorders write straight to
/// a file path rather than handing back an in-memory buffer.
pub struct CheckpointPayload<'a> {
    pub result: &'a ModelResult,
    pub config_json: &'a str,
    pub seed: &'a SeedRecord,
}

/// Operates on `<dir>/<name>.{weights,optim,result,config,seed}`.
pub struct CheckpointManager {
    dir: PathBuf,
    name: String,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> ExecutorResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| ExecutorError::io(&dir, e))?;
        Ok(Self {
            dir,
            name: name.into(),
        })
    }

    fn path(&self, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{ext}", self.name))
    }

    fn tmp_path(&self, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{ext}.tmp", self.name))
    }

    /// burn's `FileRecorder`s (e.g. `CompactRecorder`) write to a path
    /// derived from the one they're handed by *replacing* whatever
    /// extension it already has with their own (`.mpk`), the same way
    /// `Path::with_extension` does — an extensionless stem like
    /// `"model"` becomes `"model.mpk"`, but `"model.weights.tmp"` becomes
    /// `"model.weights.mpk"`, silently dropping the `.tmp` marker (this is
    /// exactly what made the previous staging scheme rename a file that
    /// was never written). Giving the recorder a path whose extension is
    /// already `mpk` is a no-op replacement, so these two paths are the
    /// ones actually read and written by burn, not the logical
    /// `<name>.weights`/`<name>.optim` names.
    pub fn weights_path(&self) -> PathBuf {
        self.dir.join(format!("{}.weights.mpk", self.name))
    }

    fn weights_tmp_path(&self) -> PathBuf {
        self.dir.join(format!("{}.weights.tmp.mpk", self.name))
    }

    /// The optimizer record, persisted through the same recorder (and
    /// subject to the same extension-replacement behavior) as the weights,
    /// rather than as a hand-rolled byte blob.
    pub fn optimizer_path(&self) -> PathBuf {
        self.dir.join(format!("{}.optim.mpk", self.name))
    }

    fn optimizer_tmp_path(&self) -> PathBuf {
        self.dir.join(format!("{}.optim.tmp.mpk", self.name))
    }

    /// Write all five files atomically: each is staged under a `.tmp`
    /// sibling, then renamed into place in a tight sequence with no
    /// fallible work between renames, so a crash either leaves the old
    /// quintuple fully intact or the new one fully observable.
    /// `weights_writer`/`optimizer_writer` are each handed the real tmp
    /// path burn's recorder will write to (see [`Self::weights_tmp_path`])
    /// and are expected to use the caller's recorder of choice
    /// (`model.clone().save_file(path, &CompactRecorder::new())`,
    /// `CompactRecorder::new().record(optimizer.to_record(), path.into())`)
    /// to populate it.
    pub fn save_executor<FW, FO>(
        &self,
        weights_writer: FW,
        optimizer_writer: FO,
        payload: CheckpointPayload<'_>,
    ) -> ExecutorResult<()>
    where
        FW: FnOnce(&Path) -> ExecutorResult<()>,
        FO: FnOnce(&Path) -> ExecutorResult<()>,
    {
        let result_bytes = bincode::serialize(payload.result)?;
        let seed_json = serde_json::to_string_pretty(payload.seed)?;

        let staged = [
            ("result", result_bytes),
            ("config", payload.config_json.as_bytes().to_vec()),
            ("seed", seed_json.into_bytes()),
        ];

        let weights_tmp = self.weights_tmp_path();
        weights_writer(&weights_tmp)?;
        let optim_tmp = self.optimizer_tmp_path();
        optimizer_writer(&optim_tmp)?;

        let mut renames = vec![
            (weights_tmp, self.weights_path()),
            (optim_tmp, self.optimizer_path()),
        ];
        for (ext, bytes) in &staged {
            let tmp = self.tmp_path(ext);
            fs::write(&tmp, bytes).map_err(|e| ExecutorError::io(&tmp, e))?;
            renames.push((tmp, self.path(ext)));
        }
        for (tmp, dest) in renames {
            fs::rename(&tmp, &dest).map_err(|e| ExecutorError::io(&dest, e))?;
        }

        info!(target: STATUS_TARGET, "checkpoint saved: {}", self.dir.display());
        Ok(())
    }

    /// Write the completed `ModelResult` separately from the weight
    /// snapshot; the weights may already be older, corresponding to the
    /// best validation epoch rather than the final one (see DESIGN.md for
    /// the rationale).
    pub fn save_final_trained_results(&self, result: &ModelResult) -> ExecutorResult<()> {
        let bytes = bincode::serialize(result)?;
        let tmp = self.dir.join(format!("{}.final-result.tmp", self.name));
        fs::write(&tmp, &bytes).map_err(|e| ExecutorError::io(&tmp, e))?;
        let dest = self.dir.join(format!("{}.final-result", self.name));
        fs::rename(&tmp, &dest).map_err(|e| ExecutorError::io(&dest, e))?;
        Ok(())
    }

    /// Write the in-progress `ModelResult` to `<name>.intermediate-result`,
    /// a cheap, non-atomic, every-epoch progress marker distinct from the
    /// five-file checkpoint quintuple (which only writes on validation
    /// improvement). A caller polling this file mid-run sees the latest
    /// epoch's results without waiting for an improving epoch.
    pub fn save_intermediate_results(&self, result: &ModelResult) -> ExecutorResult<()> {
        let bytes = bincode::serialize(result)?;
        let path = self.dir.join(format!("{}.intermediate-result", self.name));
        fs::write(&path, &bytes).map_err(|e| ExecutorError::io(&path, e))
    }

    pub fn has_checkpoint(&self) -> bool {
        self.weights_path().exists()
    }

    pub fn load_weights_bytes(&self) -> ExecutorResult<Vec<u8>> {
        let path = self.weights_path();
        fs::read(&path).map_err(|e| ExecutorError::io(&path, e))
    }

    pub fn load_optim_bytes(&self) -> ExecutorResult<Vec<u8>> {
        let path = self.optimizer_path();
        fs::read(&path).map_err(|e| ExecutorError::io(&path, e))
    }

    pub fn load_result(&self) -> ExecutorResult<ModelResult> {
        let path = self.path("result");
        let bytes = fs::read(&path).map_err(|e| ExecutorError::io(&path, e))?;
        Ok(bincode::deserialize(&bytes)?)
    }

    pub fn load_config(&self) -> ExecutorResult<String> {
        let path = self.path("config");
        fs::read_to_string(&path).map_err(|e| ExecutorError::io(&path, e))
    }

    pub fn load_seed(&self) -> ExecutorResult<SeedRecord> {
        let path = self.path("seed");
        let contents = fs::read_to_string(&path).map_err(|e| ExecutorError::io(&path, e))?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::tempdir;

    use crate::result::RunCounter;

    use super::*;

    #[test]
    fn save_executor_writes_all_five_files_atomically() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path(), "demo").unwrap();
        let counter = RunCounter::new();
        let result = ModelResult::new("demo", &counter, HashMap::new(), HashMap::new());
        let seed = SeedRecord {
            host: 1,
            numeric: 2,
            device: None,
        };

        manager
            .save_executor(
                |path| fs::write(path, b"weights-bytes").map_err(|e| ExecutorError::io(path, e)),
                |path| fs::write(path, b"optim-bytes").map_err(|e| ExecutorError::io(path, e)),
                CheckpointPayload {
                    result: &result,
                    config_json: "{}",
                    seed: &seed,
                },
            )
            .unwrap();

        assert!(dir.path().join("demo.weights.mpk").exists());
        assert!(!dir.path().join("demo.weights.tmp.mpk").exists());
        assert!(dir.path().join("demo.optim.mpk").exists());
        assert!(!dir.path().join("demo.optim.tmp.mpk").exists());
        for ext in ["result", "config", "seed"] {
            assert!(dir.path().join(format!("demo.{ext}")).exists(), "{ext} missing");
            assert!(!dir.path().join(format!("demo.{ext}.tmp")).exists());
        }
        assert!(manager.has_checkpoint());
        assert_eq!(manager.load_weights_bytes().unwrap(), b"weights-bytes");
        assert_eq!(manager.load_seed().unwrap().host, 1);
    }

    #[test]
    fn no_checkpoint_before_first_save() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path(), "demo").unwrap();
        assert!(!manager.has_checkpoint());
    }
}
