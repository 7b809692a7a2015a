//! On-disk, key-incrementing store of [`ModelResult`] runs, backed by
//! `bincode` for the binary payload and plain text for the human-readable
//! companion.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{ExecutorError, ExecutorResult};

use super::ModelResult;

/// Backed by a directory; keys are consecutive positive integers assigned
/// at dump time.
pub struct ResultManager {
    path: PathBuf,
    prefix: String,
    save_text: bool,
}

impl ResultManager {
    pub fn new(name: &str, path: impl Into<PathBuf>, save_text: bool) -> ExecutorResult<Self> {
        let path = path.into();
        fs::create_dir_all(&path).map_err(|e| ExecutorError::io(&path, e))?;
        Ok(Self {
            path,
            prefix: name.to_lowercase().replace(' ', "-"),
            save_text,
        })
    }

    /// Exposed so consumers can build CSV summary names.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn bin_path(&self, key: usize) -> PathBuf {
        self.path.join(format!("{}-{key}.bin", self.prefix))
    }

    fn txt_path(&self, key: usize) -> PathBuf {
        self.path.join(format!("{}-{key}.txt", self.prefix))
    }

    fn last_key(&self) -> ExecutorResult<Option<usize>> {
        let mut max_key = None;
        let entries = fs::read_dir(&self.path).map_err(|e| ExecutorError::io(&self.path, e))?;
        let needle_prefix = format!("{}-", self.prefix);
        for entry in entries {
            let entry = entry.map_err(|e| ExecutorError::io(&self.path, e))?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(rest) = file_name.strip_prefix(&needle_prefix) else {
                continue;
            };
            let Some(key_str) = rest.strip_suffix(".bin") else {
                continue;
            };
            if let Ok(key) = key_str.parse::<usize>() {
                max_key = Some(max_key.map_or(key, |m: usize| m.max(key)));
            }
        }
        Ok(max_key)
    }

    /// Assign `last_key + 1` (1 on empty), write the serialized result, and
    /// — if verbose text output is enabled — a human-readable companion
    /// file. Returns the assigned key.
    pub fn dump(&self, result: &ModelResult) -> ExecutorResult<usize> {
        let key = self.last_key()?.map_or(1, |k| k + 1);
        let bin_path = self.bin_path(key);
        let tmp_path = self.path.join(format!("{}-{key}.bin.tmp", self.prefix));
        let bytes = bincode::serialize(result)?;
        fs::write(&tmp_path, &bytes).map_err(|e| ExecutorError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &bin_path).map_err(|e| ExecutorError::io(&bin_path, e))?;

        if self.save_text {
            let txt_path = self.txt_path(key);
            let mut report = String::new();
            result
                .write_report(&mut report)
                .expect("writing to an in-memory String cannot fail");
            let mut file = File::create(&txt_path).map_err(|e| ExecutorError::io(&txt_path, e))?;
            file.write_all(report.as_bytes())
                .map_err(|e| ExecutorError::io(&txt_path, e))?;
        }
        Ok(key)
    }

    /// Load the result at the highest key.
    pub fn load(&self) -> ExecutorResult<ModelResult> {
        let key = self
            .last_key()?
            .ok_or_else(|| ExecutorError::Config(format!("no results in {}", self.path.display())))?;
        self.load_key(key)
    }

    /// Load a specific run by key.
    pub fn load_key(&self, key: usize) -> ExecutorResult<ModelResult> {
        let path = self.bin_path(key);
        let bytes = fs::read(&path).map_err(|e| ExecutorError::io(&path, e))?;
        Ok(bincode::deserialize(&bytes)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::tempdir;

    use crate::result::RunCounter;

    use super::*;

    #[test]
    fn dump_then_load_returns_just_dumped_object() {
        let dir = tempdir().unwrap();
        let manager = ResultManager::new("Iris Model", dir.path(), true).unwrap();
        let counter = RunCounter::new();
        let result = ModelResult::new("iris", &counter, HashMap::new(), HashMap::new());

        let key = manager.dump(&result).unwrap();
        assert_eq!(key, 1);

        let loaded = manager.load().unwrap();
        assert_eq!(loaded.name, result.name);
        assert_eq!(loaded.index, result.index);

        assert!(dir.path().join("iris-model-1.bin").exists());
        assert!(dir.path().join("iris-model-1.txt").exists());
    }

    #[test]
    fn keys_increment_across_dumps() {
        let dir = tempdir().unwrap();
        let manager = ResultManager::new("m", dir.path(), false).unwrap();
        let counter = RunCounter::new();
        let r1 = ModelResult::new("m", &counter, HashMap::new(), HashMap::new());
        let r2 = ModelResult::new("m", &counter, HashMap::new(), HashMap::new());

        assert_eq!(manager.dump(&r1).unwrap(), 1);
        assert_eq!(manager.dump(&r2).unwrap(), 2);
        assert_eq!(manager.load().unwrap().index, r2.index);
        assert!(!dir.path().join("m-1.txt").exists());
    }
}
