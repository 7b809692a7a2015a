//! [`ModelResult`]: the named triple of [`DatasetResult`]s plus run metadata.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ExecutorError, ExecutorResult};

use super::{DatasetResult, ResultsContainer, SplitTag};

/// A process-wide (or per-executor, if not shared) monotonic run counter.
/// `reset()` exists purely for test isolation.
#[derive(Clone, Default)]
pub struct RunCounter(Arc<AtomicUsize>);

impl RunCounter {
    pub fn new() -> Self {
        Self(Arc::new(AtomicUsize::new(0)))
    }

    pub fn next(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

/// A named triple of [`DatasetResult`]s keyed `{train, validation, test}`,
/// plus a run index and frozen settings snapshots.
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelResult {
    pub name: String,
    pub index: usize,
    pub model_settings: HashMap<String, String>,
    pub network_settings: HashMap<String, String>,
    /// The human-readable description an `Executor` operation was invoked
    /// with.
    pub description: Option<String>,
    datasets: HashMap<String, DatasetResult>,
}

impl ModelResult {
    pub fn new(
        name: impl Into<String>,
        run_counter: &RunCounter,
        model_settings: HashMap<String, String>,
        network_settings: HashMap<String, String>,
    ) -> Self {
        Self::with_description(name, run_counter, model_settings, network_settings, None)
    }

    pub fn with_description(
        name: impl Into<String>,
        run_counter: &RunCounter,
        model_settings: HashMap<String, String>,
        network_settings: HashMap<String, String>,
        description: Option<String>,
    ) -> Self {
        let mut datasets = HashMap::new();
        datasets.insert("train".to_string(), DatasetResult::new());
        datasets.insert("validation".to_string(), DatasetResult::new());
        datasets.insert("test".to_string(), DatasetResult::new());
        Self {
            name: name.into(),
            index: run_counter.next(),
            model_settings,
            network_settings,
            description,
            datasets,
        }
    }

    fn split_key(split: SplitTag) -> &'static str {
        match split {
            SplitTag::Train => "train",
            SplitTag::Validation => "validation",
            SplitTag::Test => "test",
        }
    }

    pub fn dataset(&self, split: SplitTag) -> &DatasetResult {
        self.datasets
            .get(Self::split_key(split))
            .expect("all three splits are initialized in ModelResult::new")
    }

    pub fn dataset_mut(&mut self, split: SplitTag) -> &mut DatasetResult {
        self.datasets
            .get_mut(Self::split_key(split))
            .expect("all three splits are initialized in ModelResult::new")
    }

    pub fn train(&self) -> &DatasetResult {
        self.dataset(SplitTag::Train)
    }

    pub fn validation(&self) -> &DatasetResult {
        self.dataset(SplitTag::Validation)
    }

    pub fn test(&self) -> &DatasetResult {
        self.dataset(SplitTag::Test)
    }

    /// Discard and replace one split's results, leaving the others intact
    /// (used before re-running `test`).
    pub fn reset(&mut self, split: SplitTag) {
        self.datasets
            .insert(Self::split_key(split).to_string(), DatasetResult::new());
    }

    /// Prefers test, then validation, raising `NoResults` if both are empty.
    pub fn last_test_dataset_result(&self) -> ExecutorResult<&DatasetResult> {
        if self.test().contains_results() {
            Ok(self.test())
        } else if self.validation().contains_results() {
            Ok(self.validation())
        } else {
            Err(ExecutorError::NoResults)
        }
    }

    pub fn contains_results(&self) -> bool {
        self.test().contains_results() || self.validation().contains_results()
    }

    /// Human-readable report for all three splits, written as the verbose
    /// `.txt` companion file alongside each dump.
    pub fn write_report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "Name: {}", self.name)?;
        writeln!(out, "Run index: {}", self.index)?;
        if let Some(description) = &self.description {
            writeln!(out, "Description: {description}")?;
        }
        for key in ["train", "validation", "test"] {
            let ds = self.datasets.get(key).expect("initialized split");
            writeln!(out, "{key}:")?;
            if ds.contains_results() {
                if let Some(start) = ds.start_time() {
                    writeln!(out, "  started: {start}")?;
                }
                if let Some(end) = ds.end_time() {
                    writeln!(out, "  ended: {end}")?;
                }
                writeln!(out, "  num epochs: {}", ds.epochs().len())?;
                ds.write_report(out)?;
            } else {
                writeln!(out, "  no results")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ModelResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelResult")
            .field("name", &self.name)
            .field("index", &self.index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_counter_increments_monotonically() {
        let counter = RunCounter::new();
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
        counter.reset();
        assert_eq!(counter.next(), 1);
    }

    #[test]
    fn fresh_model_result_has_no_test_or_validation_results() {
        let counter = RunCounter::new();
        let result = ModelResult::new("demo", &counter, HashMap::new(), HashMap::new());
        assert!(!result.contains_results());
        assert!(matches!(
            result.last_test_dataset_result(),
            Err(ExecutorError::NoResults)
        ));
    }
}
