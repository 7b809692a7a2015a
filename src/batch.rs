//! Batch data model and the batch-iteration policy engine.
//!
//! A [`Batch`] is opaque to the executor beyond a handful of operations: an
//! identifier, a size, relocation on/off the target device, and the tensors
//! needed to compute a loss. The split provider that produces batches (the
//! vectorizer pipeline) is an external collaborator; this crate
//! only specifies the [`SplitProvider`] trait it must satisfy.

use std::collections::HashMap;
use std::fmt::Debug;

use burn::tensor::{backend::Backend, Tensor};

use crate::error::{ExecutorError, ExecutorResult};

/// One unit of forward/backward work. Implementors own whatever host or
/// device tensors back the batch; the executor never inspects them beyond
/// this trait.
pub trait Batch<B: Backend>: Send + Debug + Sized {
    /// Stable identifier, used for logging and for the per-epoch
    /// `batch_ids` bookkeeping in [`crate::result::EpochResult`].
    fn id(&self) -> u64;

    /// Number of data points in the batch.
    fn size(&self) -> usize;

    /// Identifiers of the individual data points, surfaced for prediction
    /// reporting.
    fn data_point_ids(&self) -> Vec<u64>;

    /// Return a copy of this batch relocated onto `device`. The original is
    /// left intact so that, under the device-resident policy, the host
    /// original can be released separately from the device copy.
    fn to_device(&self, device: &B::Device) -> Self;

    /// Release any resources (typically device memory) this batch holds.
    /// Must be safe to call on a batch that never left host memory.
    fn release(self);

    /// The input tensor fed to the model's forward pass.
    fn input(&self) -> Tensor<B, 2>;

    /// The label tensor for this batch, used to compute the loss.
    fn labels(&self) -> Tensor<B, 2>;

    /// A short human-readable record, written in debug mode.
    fn descriptor(&self) -> String;
}

/// The external collaborator that hands the executor an ordered, sized
/// collection of batches for one named split.
pub trait SplitProvider<B: Backend> {
    type Batch: Batch<B>;

    /// Batches for `split`, in insertion order.
    fn split(&self, split: &str) -> ExecutorResult<Vec<Self::Batch>>;
}

/// How the executor decides where batches live during a phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchIterationMode {
    /// `gpu`: eagerly relocate up to `batch_limit` batches onto the device.
    Device,
    /// `cpu`: keep batches host-resident, relocate lazily per step.
    Host,
    /// `buffered`: pass the underlying source through unchanged.
    Streamed,
}

/// A per-phase materialization policy.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct BatchIterationPolicy {
    pub mode: BatchIterationMode,
    pub batch_limit: usize,
    pub cache_batches: bool,
}

impl BatchIterationPolicy {
    pub fn new(mode: BatchIterationMode, batch_limit: usize, cache_batches: bool) -> Self {
        Self {
            mode,
            batch_limit,
            cache_batches,
        }
    }

    /// Reject the one configuration error this engine can produce:
    /// `cache_batches` combined with the streamed mode.
    pub fn validate(&self) -> ExecutorResult<()> {
        if self.cache_batches && self.mode == BatchIterationMode::Streamed {
            return Err(ExecutorError::Config(
                "cache_batches cannot be combined with the streamed (buffered) batch \
                 iteration mode"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a batch's device memory must be released immediately after
    /// its step, per the per-step release-discipline contract.
    pub fn release_after_step(&self) -> bool {
        match self.mode {
            BatchIterationMode::Host => !self.cache_batches,
            BatchIterationMode::Streamed => true,
            BatchIterationMode::Device => false,
        }
    }

    /// Whether a batch arrives at a step already placed on the target
    /// device (so the per-step relocation is a no-op).
    pub fn preplaced(&self) -> bool {
        self.mode == BatchIterationMode::Device
    }
}

/// Per-phase materialized batches plus whatever needs releasing once the
/// phase completes. Kept separate from the long-lived `cached_batches` map:
/// a phase that doesn't cache hands its batches back here to be released by
/// the caller once iteration is done.
pub struct MaterializedPhase<T> {
    pub batches: Vec<T>,
    pub to_release: Vec<T>,
}

/// Cache of materialized batches keyed by phase name, the only structure
/// that legitimately retains device memory across phases.
#[derive(Default)]
pub struct BatchCache<T> {
    phases: HashMap<String, Vec<T>>,
}

impl<T> BatchCache<T> {
    pub fn new() -> Self {
        Self {
            phases: HashMap::new(),
        }
    }

    pub fn get(&self, phase: &str) -> Option<&Vec<T>> {
        self.phases.get(phase)
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn insert(&mut self, phase: impl Into<String>, batches: Vec<T>) {
        self.phases.insert(phase.into(), batches);
    }

    /// Remove and return every cached batch across every phase, for the
    /// caller to release.
    pub fn drain(&mut self) -> Vec<T> {
        self.phases.drain().flat_map(|(_, batches)| batches).collect()
    }
}

/// Materialize `source` (already pulled from the split provider) according
/// to `policy`, consulting `cache` first.
pub fn materialize<B, T>(
    policy: &BatchIterationPolicy,
    device: &B::Device,
    phase: &str,
    source: Vec<T>,
    cache: &mut BatchCache<T>,
) -> ExecutorResult<MaterializedPhase<T>>
where
    B: Backend,
    T: Batch<B> + Clone,
{
    policy.validate()?;

    if let Some(cached) = cache.get(phase) {
        return Ok(MaterializedPhase {
            batches: cached.clone(),
            to_release: Vec::new(),
        });
    }

    let (batches, to_release) = match policy.mode {
        BatchIterationMode::Device => {
            let limited: Vec<T> = source.into_iter().take(policy.batch_limit).collect();
            let device_batches: Vec<T> = limited.iter().map(|b| b.to_device(device)).collect();
            let mut to_release = limited;
            if !policy.cache_batches {
                to_release.extend(device_batches.iter().cloned());
            }
            (device_batches, to_release)
        }
        BatchIterationMode::Host => {
            let limited: Vec<T> = source.into_iter().take(policy.batch_limit).collect();
            let to_release = if policy.cache_batches {
                Vec::new()
            } else {
                limited.clone()
            };
            (limited, to_release)
        }
        BatchIterationMode::Streamed => (source, Vec::new()),
    };

    if policy.cache_batches {
        cache.insert(phase.to_string(), batches.clone());
    }

    Ok(MaterializedPhase {
        batches,
        to_release,
    })
}
