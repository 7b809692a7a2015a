//! The result container hierarchy: [`EpochResult`] for one epoch of one
//! split, [`DatasetResult`] for a whole split's epochs, and [`ModelResult`]
//! tying train/validation/test together.

mod manager;
mod metrics;
mod model_result;

pub use manager::ResultManager;
pub use metrics::PrecisionRecallF1;
pub use model_result::{ModelResult, RunCounter};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ExecutorError, ExecutorResult};

/// Which split a result was produced from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitTag {
    Train,
    Validation,
    Test,
}

impl fmt::Display for SplitTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SplitTag::Train => "train",
            SplitTag::Validation => "validation",
            SplitTag::Test => "test",
        };
        write!(f, "{s}")
    }
}

/// Behavior shared by every level of the result hierarchy: derived metrics
/// that all raise [`ExecutorError::NoResults`] on an empty container.
pub trait ResultsContainer {
    fn get_ids(&self) -> Vec<u64>;
    fn get_predictions(&self) -> Vec<f32>;
    fn get_labels(&self) -> Vec<f32>;
    fn get_loss(&self) -> f64;
    fn get_losses(&self) -> Vec<f64>;

    fn len(&self) -> usize {
        self.get_ids().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains_results(&self) -> bool {
        !self.is_empty()
    }

    fn assert_results(&self) -> ExecutorResult<()> {
        if self.contains_results() {
            Ok(())
        } else {
            Err(ExecutorError::NoResults)
        }
    }

    fn ids(&self) -> ExecutorResult<Vec<u64>> {
        self.assert_results()?;
        Ok(self.get_ids())
    }

    fn predictions(&self) -> ExecutorResult<Vec<f32>> {
        self.assert_results()?;
        Ok(self.get_predictions())
    }

    fn labels(&self) -> ExecutorResult<Vec<f32>> {
        self.assert_results()?;
        Ok(self.get_labels())
    }

    fn loss(&self) -> ExecutorResult<f64> {
        self.assert_results()?;
        Ok(self.get_loss())
    }

    fn losses(&self) -> ExecutorResult<Vec<f64>> {
        self.assert_results()?;
        Ok(self.get_losses())
    }

    /// Index of the minimum-loss entry in [`Self::losses`].
    fn convergence(&self) -> ExecutorResult<usize> {
        let losses = self.losses()?;
        let (idx, _) = losses
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .expect("non-empty per assert_results");
        Ok(idx)
    }

    fn min_loss(&self) -> ExecutorResult<f64> {
        let losses = self.losses()?;
        Ok(losses
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min))
    }

    fn accuracy(&self) -> ExecutorResult<f64> {
        self.assert_results()?;
        Ok(metrics::accuracy(&self.get_labels(), &self.get_predictions()))
    }

    fn micro_metrics(&self) -> ExecutorResult<PrecisionRecallF1> {
        self.assert_results()?;
        Ok(metrics::micro_metrics(
            &self.get_labels(),
            &self.get_predictions(),
        ))
    }

    fn macro_metrics(&self) -> ExecutorResult<PrecisionRecallF1> {
        self.assert_results()?;
        Ok(metrics::macro_metrics(
            &self.get_labels(),
            &self.get_predictions(),
        ))
    }

    /// Human-readable report matching the verbose `.txt` companion file
    /// [`crate::result::ResultManager`] writes alongside each dump.
    fn write_report(&self, out: &mut dyn std::fmt::Write) -> std::fmt::Result {
        match (self.loss(), self.convergence(), self.micro_metrics(), self.macro_metrics()) {
            (Ok(loss), Ok(convergence), Ok(micro), Ok(macro_)) => {
                writeln!(out, "loss: {loss}")?;
                writeln!(out, "num outcomes: {}", self.len())?;
                writeln!(out, "epoch convergence: {convergence}")?;
                writeln!(
                    out,
                    "micro: F1: {:.3}, precision: {:.2}, recall: {:.2}",
                    micro.f1, micro.precision, micro.recall
                )?;
                writeln!(
                    out,
                    "macro: F1: {:.3}, precision: {:.2}, recall: {:.2}",
                    macro_.f1, macro_.precision, macro_.recall
                )
            }
            _ => writeln!(out, "no results"),
        }
    }
}

/// One batch's contribution to an [`EpochResult`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutcomeBatch {
    pub predictions: Vec<f32>,
    pub labels: Vec<f32>,
}

/// One epoch of one split.
///
/// Invariant: `batch_losses`, `batch_ids`, `n_data_points` and
/// `prediction_updates` always have equal length (tested by
/// [`tests::lengths_stay_in_lockstep`]); the container is append-only via
/// [`EpochResult::update`] until [`EpochResult::reset`] is called.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EpochResult {
    pub index: usize,
    pub split: SplitTag,
    batch_losses: Vec<f64>,
    batch_ids: Vec<u64>,
    n_data_points: Vec<usize>,
    prediction_updates: Vec<OutcomeBatch>,
    id_updates: Vec<Vec<u64>>,
}

impl EpochResult {
    pub fn new(index: usize, split: SplitTag) -> Self {
        Self {
            index,
            split,
            batch_losses: Vec::new(),
            batch_ids: Vec::new(),
            n_data_points: Vec::new(),
            prediction_updates: Vec::new(),
            id_updates: Vec::new(),
        }
    }

    /// Append one batch's outcome. `loss` is the *mean* loss for the batch
    /// (as returned by the criterion); it is multiplied by `batch_size`
    /// here so `batch_losses` is always already multiplied by batch size.
    pub fn update(
        &mut self,
        batch_id: u64,
        loss: f64,
        batch_size: usize,
        data_point_ids: Vec<u64>,
        outcome: OutcomeBatch,
    ) {
        self.batch_losses.push(loss * batch_size as f64);
        self.n_data_points.push(batch_size);
        self.batch_ids.push(batch_id);
        self.id_updates.push(data_point_ids);
        self.prediction_updates.push(outcome);
    }

    pub fn reset(&mut self) {
        self.batch_losses.clear();
        self.batch_ids.clear();
        self.n_data_points.clear();
        self.prediction_updates.clear();
        self.id_updates.clear();
    }

    pub fn batch_ids(&self) -> &[u64] {
        &self.batch_ids
    }

    pub fn n_data_points(&self) -> &[usize] {
        &self.n_data_points
    }

    /// Number of batches folded into this epoch so far; the denominator of
    /// [`Self::ave_loss`], which divides total loss contributions by this
    /// count.
    pub fn batch_count(&self) -> usize {
        self.batch_losses.len()
    }

    /// Total data points folded into this epoch so far; the per-epoch
    /// weight [`DatasetResult::get_loss`] sums over: the dataset-level
    /// average loss is Σbatch-losses / Σbatch-sizes, weighted by
    /// data-point counts rather than batch counts.
    pub fn data_point_count(&self) -> usize {
        self.n_data_points.iter().sum()
    }

    /// Sum of loss contributions over the number of batches in this epoch
    /// — total loss contributions divided by the number of batches folded
    /// in so far.
    pub fn ave_loss(&self) -> f64 {
        if self.batch_losses.is_empty() {
            return 0.0;
        }
        self.batch_losses.iter().sum::<f64>() / self.batch_count() as f64
    }
}

impl ResultsContainer for EpochResult {
    fn get_ids(&self) -> Vec<u64> {
        self.id_updates.iter().flatten().copied().collect()
    }

    fn get_predictions(&self) -> Vec<f32> {
        self.prediction_updates
            .iter()
            .flat_map(|o| o.predictions.iter().copied())
            .collect()
    }

    fn get_labels(&self) -> Vec<f32> {
        self.prediction_updates
            .iter()
            .flat_map(|o| o.labels.iter().copied())
            .collect()
    }

    fn get_loss(&self) -> f64 {
        self.ave_loss()
    }

    fn get_losses(&self) -> Vec<f64> {
        self.batch_losses.clone()
    }
}

/// A sequence of epoch results for one split plus start/end timestamps.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetResult {
    results: Vec<EpochResult>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

impl Default for DatasetResult {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetResult {
    pub fn new() -> Self {
        Self {
            results: Vec::new(),
            start_time: None,
            end_time: None,
        }
    }

    /// Set the start timestamp. Spec invariant: exactly once, before any
    /// epoch is appended.
    pub fn start(&mut self) -> ExecutorResult<()> {
        if self.contains_results() {
            return Err(ExecutorError::Config(
                "dataset result already contains epochs; start() must be called first".into(),
            ));
        }
        self.start_time = Some(Utc::now());
        Ok(())
    }

    /// Set the end timestamp. Spec invariant: exactly once, after the last
    /// epoch is appended.
    pub fn end(&mut self) {
        self.end_time = Some(Utc::now());
    }

    pub fn append(&mut self, epoch: EpochResult) {
        self.results.push(epoch);
    }

    pub fn epochs(&self) -> &[EpochResult] {
        &self.results
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }
}

impl ResultsContainer for DatasetResult {
    fn get_ids(&self) -> Vec<u64> {
        self.results.iter().flat_map(|r| r.get_ids()).collect()
    }

    fn get_predictions(&self) -> Vec<f32> {
        self.results
            .iter()
            .flat_map(|r| r.get_predictions())
            .collect()
    }

    fn get_labels(&self) -> Vec<f32> {
        self.results.iter().flat_map(|r| r.get_labels()).collect()
    }

    /// Σ(per-epoch Σloss-contributions) / Σ(per-epoch data-point count); 0
    /// on empty, explicitly zero rather than undefined. Weighted by
    /// data-point counts rather than batch counts (see DESIGN.md for the
    /// rationale).
    fn get_loss(&self) -> f64 {
        let loss_sum: f64 = self
            .results
            .iter()
            .map(|r| r.ave_loss() * r.batch_count() as f64)
            .sum();
        let point_sum: usize = self.results.iter().map(|r| r.data_point_count()).sum();
        if point_sum == 0 {
            0.0
        } else {
            loss_sum / point_sum as f64
        }
    }

    fn get_losses(&self) -> Vec<f64> {
        self.results.iter().map(|r| r.ave_loss()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(pred: f32, label: f32) -> OutcomeBatch {
        OutcomeBatch {
            predictions: vec![pred],
            labels: vec![label],
        }
    }

    #[test]
    fn lengths_stay_in_lockstep() {
        let mut e = EpochResult::new(0, SplitTag::Train);
        e.update(1, 0.5, 2, vec![10, 11], outcome(1.0, 1.0));
        e.update(2, 0.25, 2, vec![12, 13], outcome(0.0, 1.0));
        assert_eq!(e.batch_ids().len(), 2);
        assert_eq!(e.n_data_points().len(), 2);
        assert_eq!(e.get_ids().len(), 4);
        assert_eq!(e.get_predictions().len(), 4);
    }

    #[test]
    fn empty_dataset_result_has_zero_average_loss() {
        let d = DatasetResult::new();
        assert_eq!(d.get_loss(), 0.0);
    }

    #[test]
    fn dataset_average_loss_matches_invariant() {
        let mut d = DatasetResult::new();
        let mut e0 = EpochResult::new(0, SplitTag::Train);
        e0.update(1, 1.0, 4, vec![1, 2, 3, 4], outcome(1.0, 1.0));
        d.append(e0);
        let mut e1 = EpochResult::new(1, SplitTag::Train);
        e1.update(2, 0.5, 2, vec![5, 6], outcome(1.0, 0.0));
        d.append(e1);
        // epoch0: loss contribution 1.0*4=4.0 over 4 data points
        // epoch1: loss contribution 0.5*2=1.0 over 2 data points
        // total: (4.0 + 1.0) / (4 + 2) = 0.8333...
        assert!((d.get_loss() - (5.0 / 6.0)).abs() < 1e-9);
    }

    #[test]
    fn no_results_on_empty_container() {
        let e = EpochResult::new(0, SplitTag::Train);
        assert!(matches!(e.loss(), Err(ExecutorError::NoResults)));
    }

    #[test]
    fn dataset_start_twice_is_rejected() {
        let mut d = DatasetResult::new();
        d.start().unwrap();
        let mut e0 = EpochResult::new(0, SplitTag::Train);
        e0.update(1, 1.0, 1, vec![1], outcome(1.0, 1.0));
        d.append(e0);
        assert!(d.start().is_err());
    }
}
