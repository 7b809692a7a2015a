//! The training/validation/test state machine — the component that
//! orchestrates [`crate::batch`], [`crate::lifecycle`], [`crate::checkpoint`]
//! and [`crate::result`] against an external model and split provider.
//! Follows a seed/construct/loop/checkpoint/persist shape but hand-rolls the
//! epoch loop instead of delegating to `burn::train::LearnerBuilder`, since
//! the checkpoint-on-improvement/lifecycle-poll/scheduler ordering this
//! module needs is more specific than the learner's own callbacks provide.

use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::nn::loss::{CrossEntropyLossConfig, MseLoss, Reduction as LossReduction};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, GradientsParams, Optimizer};
use burn::record::{CompactRecorder, Recorder};
use burn::tensor::{activation, backend::AutodiffBackend, Tensor};
use log::{error, info, warn};

use crate::batch::{materialize, Batch, BatchCache, BatchIterationPolicy, SplitProvider};
use crate::checkpoint::{CheckpointManager, CheckpointPayload, SeedRecord};
use crate::config::{
    resolve_optimizer, resolve_scheduler, validate_criterion, DebugLevel, ModelSettings,
    NetworkSettings, PlateauScheduler, Reduction,
};
use crate::error::{ExecutorError, ExecutorResult};
use crate::lifecycle::{LifeCycleMonitor, UpdateAction};
use crate::logging::{PROGRESS_TARGET, STATUS_TARGET};
use crate::result::{
    EpochResult, ModelResult, OutcomeBatch, ResultManager, ResultsContainer, RunCounter, SplitTag,
};
use crate::Model;

/// A tagged outcome of one phase, modeling debug-mode's early bail as data
/// rather than an exception. `EarlyBail` is not a variant of
/// [`ExecutorError`] — it is expected control flow, not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    Completed,
    EarlyBailed(String),
}

impl PhaseOutcome {
    pub fn is_early_bail(&self) -> bool {
        matches!(self, PhaseOutcome::EarlyBailed(_))
    }
}

/// Convert a scalar-producing 1D tensor to an `f64`, detaching it from the
/// autodiff graph first.
fn scalar_loss<B: AutodiffBackend>(loss: Tensor<B, 1>) -> f64 {
    loss.detach()
        .into_data()
        .to_vec::<f32>()
        .ok()
        .and_then(|mut v| v.pop())
        .unwrap_or(0.0) as f64
}

fn tensor_to_vec<B: burn::tensor::backend::Backend>(tensor: Tensor<B, 2>) -> Vec<f32> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .expect("float tensor converts to a f32 vec")
}

/// Turn raw model output into predictions per the configured reduction.
fn decode<B: burn::tensor::backend::Backend>(reduction: Reduction, tensor: Tensor<B, 2>) -> Vec<f32> {
    match reduction {
        Reduction::Argmax => tensor_to_vec(tensor.argmax(1).float()),
        Reduction::Softmax => tensor_to_vec(activation::softmax(tensor, 1)),
        Reduction::None => tensor_to_vec(tensor),
    }
}

/// `criterion(output, labels)`. Only the three names
/// [`crate::config::validate_criterion`] accepts ever reach here.
/// `cross_entropy`/`nll` both treat `labels` as one-hot rows and recover a
/// class index via `argmax`, since the executor's label tensors are always
/// `Tensor<B, 2>` rather than a dedicated integer-class type.
fn criterion_loss<B: burn::tensor::backend::Backend>(
    name: &str,
    output: Tensor<B, 2>,
    labels: Tensor<B, 2>,
    device: &B::Device,
) -> Tensor<B, 1> {
    match name {
        "mse" => MseLoss::new().forward(output, labels, LossReduction::Mean),
        "cross_entropy" => {
            let targets = labels.argmax(1).flatten::<1>(0, 1);
            CrossEntropyLossConfig::new()
                .init(device)
                .forward(output, targets)
        }
        "nll" => {
            let targets = labels.argmax(1);
            let log_probs = activation::log_softmax(output, 1);
            let selected = log_probs.gather(1, targets);
            selected.mean().neg().unsqueeze()
        }
        // unreachable: `validate_criterion` is run at construction time and
        // at every `set_model_parameter("criterion", ..)` write-through.
        other => unreachable!("unvalidated criterion reached the executor: {other}"),
    }
}

/// The training/validation/test state machine. Owns the current model,
/// the (criterion is a name, not owned) optimizer/scheduler pair, the
/// in-progress `ModelResult`, and the `LifeCycleMonitor`; borrows batches
/// from `provider`.
pub struct Executor<B, M, P>
where
    B: AutodiffBackend,
    M: Model<B, Input = Tensor<B, 2>, Output = Tensor<B, 2>> + AutodiffModule<B> + Clone,
    P: SplitProvider<B>,
{
    device: B::Device,
    model_settings: ModelSettings,
    network_settings: NetworkSettings,
    model_config: M::Config,
    model: Option<M>,
    optimizer: Option<OptimizerAdaptor<Adam, M, B>>,
    scheduler: Option<PlateauScheduler>,
    provider: P,
    lifecycle: LifeCycleMonitor,
    batch_cache: BatchCache<P::Batch>,
    run_counter: RunCounter,
    checkpoint: CheckpointManager,
    result_manager: ResultManager,
    model_result: Option<ModelResult>,
    min_valid_loss: f64,
    seed: SeedRecord,
}

impl<B, M, P> Executor<B, M, P>
where
    B: AutodiffBackend,
    M: Model<B, Input = Tensor<B, 2>, Output = Tensor<B, 2>> + AutodiffModule<B> + Clone,
    P: SplitProvider<B>,
    P::Batch: Clone,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model_settings: ModelSettings,
        network_settings: NetworkSettings,
        model_config: M::Config,
        provider: P,
        device: B::Device,
        checkpoint_dir: impl Into<PathBuf>,
        result_dir: impl Into<PathBuf>,
        update_path: Option<PathBuf>,
        run_counter: RunCounter,
    ) -> ExecutorResult<Self>
    where
        M::Config: Clone,
    {
        validate_criterion(&model_settings.criterion)?;
        BatchIterationPolicy::new(
            network_settings.batch_iteration,
            network_settings.batch_limit,
            network_settings.cache_batches,
        )
        .validate()?;

        let checkpoint = CheckpointManager::new(checkpoint_dir, model_settings.name.clone())?;
        crate::logging::init_logging(checkpoint.dir(), &model_settings.name)
            .map_err(|e| ExecutorError::io(checkpoint.dir(), e))?;
        let result_manager =
            ResultManager::new(&model_settings.name, result_dir, model_settings.save_text)?;
        let seed = SeedRecord {
            host: model_settings.seed,
            numeric: model_settings.seed,
            device: None,
        };

        Ok(Self {
            device,
            model_settings,
            network_settings,
            model_config,
            model: None,
            optimizer: None,
            scheduler: None,
            provider,
            lifecycle: LifeCycleMonitor::new(update_path),
            batch_cache: BatchCache::new(),
            run_counter,
            checkpoint,
            result_manager,
            model_result: None,
            min_valid_loss: f64::INFINITY,
            seed,
        })
    }

    fn batch_policy(&self) -> BatchIterationPolicy {
        BatchIterationPolicy::new(
            self.network_settings.batch_iteration,
            self.network_settings.batch_limit,
            self.network_settings.cache_batches,
        )
    }

    /// Lazily construct the model/optimizer/scheduler triple, preferring a
    /// checkpointed snapshot when one is on disk.
    fn ensure_model(&mut self) -> ExecutorResult<()>
    where
        M::Config: Clone,
    {
        if self.model.is_none() {
            let has_checkpoint = self.checkpoint.has_checkpoint();
            if has_checkpoint {
                if let Ok(seed) = self.checkpoint.load_seed() {
                    self.seed = seed;
                }
            }
            B::seed(self.seed.numeric);
            let fresh = M::from_config(self.model_config.clone());
            let model = if has_checkpoint {
                fresh
                    .load_file(
                        self.checkpoint.weights_path(),
                        &CompactRecorder::new(),
                        &self.device,
                    )
                    .map_err(|e| ExecutorError::Serialization(e.to_string()))?
            } else {
                fresh
            };
            self.model = Some(model);
            let adam = resolve_optimizer(&self.model_settings.optimizer)?;
            let mut optimizer = adam.init();
            if has_checkpoint {
                let record = CompactRecorder::new()
                    .load(self.checkpoint.optimizer_path(), &self.device)
                    .map_err(|e| ExecutorError::Serialization(e.to_string()))?;
                optimizer = optimizer.load_record(record);
            }
            self.optimizer = Some(optimizer);
        }
        if self.scheduler.is_none() {
            if let Some(name) = self.model_settings.scheduler.clone() {
                self.scheduler = Some(resolve_scheduler(
                    &name,
                    self.model_settings.init_learning_rate,
                )?);
            }
        }
        Ok(())
    }

    fn current_lr(&self) -> f64 {
        self.scheduler
            .as_ref()
            .map(|s| s.lr())
            .unwrap_or(self.model_settings.init_learning_rate)
    }

    /// The per-step contract: relocate, forward, (maybe) backward, decode,
    /// append. Returns `EarlyBailed` exactly when debug mode is active and
    /// this is the very first step taken across the whole call to
    /// [`Self::train`]/[`Self::test`]/[`Self::train_production`].
    fn step(
        &mut self,
        raw_batch: &P::Batch,
        epoch_result: &mut EpochResult,
        training: bool,
        first_step: &mut bool,
    ) -> ExecutorResult<PhaseOutcome> {
        let device = self.device.clone();
        let batch = raw_batch.to_device(&device);

        let labels = batch.labels();
        let output_model = self
            .model
            .as_ref()
            .ok_or_else(|| ExecutorError::ModelContract("no model to step with".to_string()))?;
        let output = output_model.forward(batch.input());

        if output.dims()[0] != labels.dims()[0] {
            return Err(ExecutorError::ModelContract(format!(
                "output batch dim {} does not match label batch dim {}",
                output.dims()[0],
                labels.dims()[0]
            )));
        }

        let debug = self.network_settings.debug;
        if debug.is_active() && *first_step {
            *first_step = false;
            info!(
                target: STATUS_TARGET,
                "debug bail on batch: {}",
                batch.descriptor()
            );
            if debug.dumps_tensors() {
                info!(target: STATUS_TARGET, "output tensor: {output:?}");
                info!(target: STATUS_TARGET, "label tensor: {labels:?}");
            }
            if self.batch_policy().release_after_step() {
                batch.release();
            }
            return Ok(PhaseOutcome::EarlyBailed(format!(
                "debug bail on batch {}",
                batch.id()
            )));
        }
        *first_step = false;

        let loss = criterion_loss(
            &self.model_settings.criterion,
            output.clone(),
            labels.clone(),
            &device,
        );
        let loss_value = scalar_loss(loss.clone());

        if training {
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, output_model);
            let model = self.model.take().expect("checked Some above");
            let optimizer = self
                .optimizer
                .as_mut()
                .expect("ensure_model initializes the optimizer alongside the model");
            let lr = self.current_lr();
            self.model = Some(optimizer.step(lr, model, grads));
        }

        let reduction = self.network_settings.reduction;
        let predictions = decode(reduction, output);
        let decoded_labels = if self.model_settings.nominal_labels {
            tensor_to_vec(labels)
        } else {
            decode(reduction, labels)
        };

        epoch_result.update(
            batch.id(),
            loss_value,
            batch.size(),
            batch.data_point_ids(),
            OutcomeBatch {
                predictions,
                labels: decoded_labels,
            },
        );

        if self.batch_policy().release_after_step() {
            batch.release();
        }

        Ok(PhaseOutcome::Completed)
    }

    /// Materialize `phase`'s batches per the configured policy, consulting
    /// the phase cache first.
    fn materialize_phase(&mut self, phase: &str) -> ExecutorResult<Vec<P::Batch>> {
        let policy = self.batch_policy();
        policy.validate()?;

        if let Some(cached) = self.batch_cache.get(phase) {
            return Ok(cached.clone());
        }

        let source = self.provider.split(phase)?;
        let materialized =
            materialize::<B, P::Batch>(&policy, &self.device, phase, source, &mut self.batch_cache)?;
        for batch in materialized.to_release {
            batch.release();
        }
        Ok(materialized.batches)
    }

    /// Run one epoch's worth of batches into a fresh `EpochResult`, honoring
    /// debug-mode early bail. `training` toggles the zero-grad/backward/
    /// optimizer-step half of the per-step contract.
    fn run_phase(
        &mut self,
        batches: &[P::Batch],
        split: SplitTag,
        epoch_index: usize,
        training: bool,
        first_step: &mut bool,
    ) -> ExecutorResult<(EpochResult, PhaseOutcome)> {
        let mut epoch_result = EpochResult::new(epoch_index, split);
        for batch in batches {
            match self.step(batch, &mut epoch_result, training, first_step)? {
                PhaseOutcome::Completed => continue,
                bail @ PhaseOutcome::EarlyBailed(_) => return Ok((epoch_result, bail)),
            }
        }
        Ok((epoch_result, PhaseOutcome::Completed))
    }

    /// Build `<name>.config`'s contents: the two settings documents
    /// verbatim, matching the checkpoint quintuple's config file.
    fn config_document(&self) -> ExecutorResult<String> {
        serde_json::to_string_pretty(&PersistedConfig {
            model: self.model_settings.clone(),
            network: self.network_settings.clone(),
        })
        .map_err(ExecutorError::from)
    }

    fn save_checkpoint(&self, result: &ModelResult) -> ExecutorResult<()> {
        let config_json = self.config_document()?;
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| ExecutorError::ModelContract("no model to checkpoint".to_string()))?
            .clone();
        let optimizer_record = self
            .optimizer
            .as_ref()
            .ok_or_else(|| ExecutorError::ModelContract("no optimizer to checkpoint".to_string()))?
            .to_record();
        self.checkpoint.save_executor(
            |path| {
                model
                    .clone()
                    .save_file(path, &CompactRecorder::new())
                    .map_err(|e| ExecutorError::Serialization(e.to_string()))
            },
            |path| {
                CompactRecorder::new()
                    .record(optimizer_record, path.to_path_buf())
                    .map_err(|e| ExecutorError::Serialization(e.to_string()))
            },
            CheckpointPayload {
                result,
                config_json: &config_json,
                seed: &self.seed,
            },
        )
    }

    /// Builds a fresh `ModelResult`, then runs the training loop.
    pub fn train(&mut self, description: Option<String>) -> ExecutorResult<ModelResult>
    where
        M::Config: Clone,
    {
        self.ensure_model()?;
        self.lifecycle.reset();
        self.min_valid_loss = f64::INFINITY;

        let mut result = ModelResult::with_description(
            self.model_settings.name.clone(),
            &self.run_counter,
            self.model_settings.to_settings_map(),
            self.network_settings.to_settings_map(),
            description,
        );

        let train_batches = self.materialize_phase("train")?;
        let valid_batches = self.materialize_phase("validation")?;

        result.dataset_mut(SplitTag::Train).start()?;
        result.dataset_mut(SplitTag::Validation).start()?;

        let mut first_step = true;
        let mut epoch = 0usize;
        let cap = self.model_settings.num_epochs;

        while epoch < cap {
            let (train_epoch, outcome) =
                self.run_phase(&train_batches, SplitTag::Train, epoch, true, &mut first_step)?;
            if outcome.is_early_bail() {
                warn!(target: STATUS_TARGET, "early bail during training: {outcome:?}");
                self.reset();
                return Ok(result);
            }
            result.dataset_mut(SplitTag::Train).append(train_epoch);

            let (valid_epoch, outcome) = self.run_phase(
                &valid_batches,
                SplitTag::Validation,
                epoch,
                false,
                &mut first_step,
            )?;
            if outcome.is_early_bail() {
                warn!(target: STATUS_TARGET, "early bail during validation: {outcome:?}");
                self.reset();
                return Ok(result);
            }
            let valid_loss = valid_epoch.ave_loss();
            result.dataset_mut(SplitTag::Validation).append(valid_epoch);
            self.checkpoint.save_intermediate_results(&result)?;

            if valid_loss.is_nan() {
                error!(
                    target: STATUS_TARGET,
                    "validation loss is NaN at epoch {epoch}, stopping early"
                );
                epoch = cap;
                continue;
            }

            if let Some(scheduler) = self.scheduler.as_mut() {
                scheduler.observe(valid_loss);
            }

            if valid_loss < self.min_valid_loss {
                self.min_valid_loss = valid_loss;
                self.save_checkpoint(&result)?;
            }

            let action = self.lifecycle.poll();
            epoch = match action {
                UpdateAction::Iterate => epoch + 1,
                UpdateAction::SetEpoch(e) => e,
                UpdateAction::Stop => cap,
            };
            info!(target: PROGRESS_TARGET, "epoch {epoch}/{cap}, valid loss {valid_loss:.6}");
        }

        result.dataset_mut(SplitTag::Train).end();
        result.dataset_mut(SplitTag::Validation).end();
        self.model_result = Some(result.clone());
        self.save_final_trained_results(&result)?;
        Ok(result)
    }

    /// Same as [`Self::train`] but the training split is `train ∪
    /// validation` and no validation loop runs.
    pub fn train_production(&mut self, description: Option<String>) -> ExecutorResult<ModelResult>
    where
        M::Config: Clone,
    {
        self.ensure_model()?;
        self.lifecycle.reset();

        let mut result = ModelResult::with_description(
            self.model_settings.name.clone(),
            &self.run_counter,
            self.model_settings.to_settings_map(),
            self.network_settings.to_settings_map(),
            description,
        );

        let mut train_batches = self.materialize_phase("train")?;
        train_batches.extend(self.materialize_phase("validation")?);

        result.dataset_mut(SplitTag::Train).start()?;

        let mut first_step = true;
        let mut epoch = 0usize;
        let cap = self.model_settings.num_epochs;

        while epoch < cap {
            let (train_epoch, outcome) =
                self.run_phase(&train_batches, SplitTag::Train, epoch, true, &mut first_step)?;
            if outcome.is_early_bail() {
                warn!(target: STATUS_TARGET, "early bail during production training: {outcome:?}");
                self.reset();
                return Ok(result);
            }
            result.dataset_mut(SplitTag::Train).append(train_epoch);

            let action = self.lifecycle.poll();
            epoch = match action {
                UpdateAction::Iterate => epoch + 1,
                UpdateAction::SetEpoch(e) => e,
                UpdateAction::Stop => cap,
            };
        }

        result.dataset_mut(SplitTag::Train).end();
        self.save_checkpoint(&result)?;
        self.model_result = Some(result.clone());
        Ok(result)
    }

    /// Reuses the in-progress `ModelResult` if one exists, otherwise loads
    /// the last persisted one.
    pub fn test(&mut self, description: Option<String>) -> ExecutorResult<ModelResult>
    where
        M::Config: Clone,
    {
        self.ensure_model()?;

        let mut result = match self.model_result.take() {
            Some(r) => r,
            None => self.result_manager.load()?,
        };
        if let Some(description) = description {
            result.description = Some(description);
        }
        result.reset(SplitTag::Test);

        let test_batches = self.materialize_phase("test")?;
        result.dataset_mut(SplitTag::Test).start()?;

        let mut first_step = true;
        let (test_epoch, outcome) =
            self.run_phase(&test_batches, SplitTag::Test, 0, false, &mut first_step)?;
        if outcome.is_early_bail() {
            warn!(target: STATUS_TARGET, "early bail during test: {outcome:?}");
            self.reset();
            return Ok(result);
        }
        result.dataset_mut(SplitTag::Test).append(test_epoch);
        result.dataset_mut(SplitTag::Test).end();

        self.model_result = Some(result.clone());
        Ok(result)
    }

    fn save_final_trained_results(&self, result: &ModelResult) -> ExecutorResult<()> {
        self.checkpoint.save_final_trained_results(result)?;
        self.result_manager.dump(result)?;
        Ok(())
    }

    /// Request cooperative shutdown.
    pub fn stop(&self) -> bool {
        self.lifecycle.stop()
    }

    /// Discards the model + optimizer triple; cached batches and results
    /// are left in place.
    pub fn reset(&mut self) {
        self.model = None;
        self.optimizer = None;
        self.scheduler = None;
    }

    /// Release every cached batch across every phase — the only structure
    /// that legitimately retains device memory across phases.
    pub fn deallocate_batches(&mut self) {
        for batch in self.batch_cache.drain() {
            batch.release();
        }
    }

    pub fn set_model_parameter(&mut self, key: &str, value: &str) -> ExecutorResult<()> {
        self.model_settings.set_model_parameter(key, value)
    }

    pub fn set_network_parameter(&mut self, key: &str, value: &str) -> ExecutorResult<()> {
        self.network_settings.set_network_parameter(key, value)
    }

    pub fn model_exists(&self) -> bool {
        self.model.is_some()
    }

    pub fn checkpoint_dir(&self) -> &Path {
        self.checkpoint.dir()
    }

    /// The borrowed split provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Reinstantiate an executor from a checkpoint directory: reads the
    /// persisted `<name>.config` document to recover the
    /// `ModelSettings`/`NetworkSettings` a previous run was built with, then
    /// constructs a fresh `Executor` against them and eagerly loads weights,
    /// optimizer state and seed via [`Self::ensure_model`] — the read-side
    /// counterpart to [`Self::save_checkpoint`]'s quintuple write. Lives here
    /// rather than on `CheckpointManager` because constructing `Executor<B,
    /// M, P>` needs the `M`/`P` type parameters `CheckpointManager`
    /// deliberately doesn't carry; this simply reads the same checkpoint
    /// files `CheckpointManager` owns.
    #[allow(clippy::too_many_arguments)]
    pub fn load_executor(
        name: impl Into<String>,
        model_config: M::Config,
        provider: P,
        device: B::Device,
        checkpoint_dir: impl Into<PathBuf>,
        result_dir: impl Into<PathBuf>,
        update_path: Option<PathBuf>,
        run_counter: RunCounter,
    ) -> ExecutorResult<Self>
    where
        M::Config: Clone,
    {
        let checkpoint_dir = checkpoint_dir.into();
        let name = name.into();
        let probe = CheckpointManager::new(checkpoint_dir.clone(), name.clone())?;
        let config_json = probe.load_config()?;
        let persisted: PersistedConfig = serde_json::from_str(&config_json)?;

        let mut executor = Self::new(
            persisted.model,
            persisted.network,
            model_config,
            provider,
            device,
            checkpoint_dir,
            result_dir,
            update_path,
            run_counter,
        )?;
        executor.ensure_model()?;
        Ok(executor)
    }
}

/// The on-disk shape of `<name>.config`: both settings documents, reused by
/// [`Executor::load_executor`] to reconstruct the settings a checkpoint was
/// written under.
#[derive(serde::Serialize, serde::Deserialize)]
struct PersistedConfig {
    model: ModelSettings,
    network: NetworkSettings,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use burn::nn::LinearConfig;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;
    use tempfile::tempdir;

    use crate::common::linear::{LinearNetwork, LinearNetworkConfig};

    use super::*;

    type TestBackend = Autodiff<NdArray<f32>>;

    #[derive(Clone, Debug)]
    struct FixtureBatch {
        id: u64,
        input: Vec<Vec<f32>>,
        labels: Vec<Vec<f32>>,
    }

    impl Batch<TestBackend> for FixtureBatch {
        fn id(&self) -> u64 {
            self.id
        }

        fn size(&self) -> usize {
            self.input.len()
        }

        fn data_point_ids(&self) -> Vec<u64> {
            (0..self.input.len() as u64).collect()
        }

        fn to_device(&self, _device: &<TestBackend as burn::tensor::backend::Backend>::Device) -> Self {
            self.clone()
        }

        fn release(self) {}

        fn input(&self) -> Tensor<TestBackend, 2> {
            let rows = self.input.len();
            let cols = self.input[0].len();
            let flat: Vec<f32> = self.input.iter().flatten().copied().collect();
            Tensor::from_data(
                burn::tensor::TensorData::new(flat, [rows, cols]),
                &Default::default(),
            )
        }

        fn labels(&self) -> Tensor<TestBackend, 2> {
            let rows = self.labels.len();
            let cols = self.labels[0].len();
            let flat: Vec<f32> = self.labels.iter().flatten().copied().collect();
            Tensor::from_data(
                burn::tensor::TensorData::new(flat, [rows, cols]),
                &Default::default(),
            )
        }

        fn descriptor(&self) -> String {
            format!("batch#{}", self.id)
        }
    }

    struct FixtureProvider {
        train: Vec<FixtureBatch>,
        validation: Vec<FixtureBatch>,
        test: Vec<FixtureBatch>,
    }

    impl SplitProvider<TestBackend> for FixtureProvider {
        type Batch = FixtureBatch;

        fn split(&self, split: &str) -> ExecutorResult<Vec<Self::Batch>> {
            Ok(match split {
                "train" => self.train.clone(),
                "validation" => self.validation.clone(),
                "test" => self.test.clone(),
                other => {
                    return Err(ExecutorError::Config(format!("unknown split: {other}")))
                }
            })
        }
    }

    fn fixture_batch(id: u64) -> FixtureBatch {
        FixtureBatch {
            id,
            input: vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0], vec![0.0, 0.0]],
            labels: vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, 1.0]],
        }
    }

    fn model_config() -> LinearNetworkConfig {
        LinearNetworkConfig {
            linears: vec![(LinearConfig::new(2, 2), None, crate::common::Activation::Identity)],
        }
    }

    fn make_executor(
        network_settings: NetworkSettings,
        dir: &Path,
    ) -> Executor<TestBackend, LinearNetwork<TestBackend>, FixtureProvider> {
        let provider = FixtureProvider {
            train: vec![fixture_batch(1)],
            validation: vec![fixture_batch(2)],
            test: vec![fixture_batch(3)],
        };
        Executor::new(
            ModelSettings {
                num_epochs: 1,
                ..ModelSettings::default()
            },
            network_settings,
            model_config(),
            provider,
            Default::default(),
            dir.join("checkpoint"),
            dir.join("results"),
            None,
            RunCounter::new(),
        )
        .unwrap()
    }

    #[test]
    fn one_epoch_sanity_produces_populated_train_and_validation() {
        let dir = tempdir().unwrap();
        let mut executor = make_executor(NetworkSettings::default(), dir.path());
        let result = executor.train(None).unwrap();
        assert!(result.train().contains_results());
        assert!(result.validation().contains_results());
        assert!(!result.test().contains_results());
        assert_eq!(result.validation().convergence().unwrap(), 0);
        assert!(executor.checkpoint_dir().join("model.weights.mpk").exists());
    }

    #[test]
    fn load_executor_round_trips_weights_optimizer_and_seed() {
        let dir = tempdir().unwrap();
        let mut executor = make_executor(NetworkSettings::default(), dir.path());
        executor.train(None).unwrap();

        let provider = FixtureProvider {
            train: vec![fixture_batch(1)],
            validation: vec![fixture_batch(2)],
            test: vec![fixture_batch(3)],
        };
        let reloaded: Executor<TestBackend, LinearNetwork<TestBackend>, FixtureProvider> =
            Executor::load_executor(
                "model",
                model_config(),
                provider,
                Default::default(),
                dir.path().join("checkpoint"),
                dir.path().join("results"),
                None,
                RunCounter::new(),
            )
            .unwrap();

        assert!(reloaded.model_exists());
        assert_eq!(reloaded.seed.host, executor.seed.host);
    }

    #[test]
    fn debug_bail_returns_empty_result_and_resets_model() {
        let dir = tempdir().unwrap();
        let mut network_settings = NetworkSettings::default();
        network_settings.debug = DebugLevel::BailWithDump;
        let mut executor = make_executor(network_settings, dir.path());
        let result = executor.train(None).unwrap();
        assert!(!result.train().contains_results());
        assert!(!executor.model_exists());
    }

    #[test]
    fn intermediate_results_are_written_every_epoch() {
        let dir = tempdir().unwrap();
        let mut executor = make_executor(NetworkSettings::default(), dir.path());
        executor.train(None).unwrap();
        assert!(executor
            .checkpoint_dir()
            .join("model.intermediate-result")
            .exists());
    }

    #[test]
    fn nan_validation_loss_stops_training_early_without_checkpointing() {
        let dir = tempdir().unwrap();
        let provider = FixtureProvider {
            train: vec![fixture_batch(1)],
            validation: vec![FixtureBatch {
                id: 2,
                input: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
                labels: vec![vec![f32::NAN, 0.0], vec![0.0, f32::NAN]],
            }],
            test: vec![fixture_batch(3)],
        };
        let mut executor = Executor::new(
            ModelSettings {
                num_epochs: 5,
                ..ModelSettings::default()
            },
            NetworkSettings::default(),
            model_config(),
            provider,
            Default::default(),
            dir.path().join("checkpoint"),
            dir.path().join("results"),
            None,
            RunCounter::new(),
        )
        .unwrap();

        let result = executor.train(None).unwrap();
        assert_eq!(result.train().epochs().len(), 1);
        assert_eq!(result.validation().epochs().len(), 1);
        assert!(!executor.checkpoint_dir().join("model.weights.mpk").exists());
    }

    #[test]
    fn streamed_with_cache_rejects_before_any_batch_is_drawn() {
        let dir = tempdir().unwrap();
        let mut network_settings = NetworkSettings::default();
        network_settings.batch_iteration = crate::batch::BatchIterationMode::Streamed;
        network_settings.cache_batches = true;
        let err = Executor::new(
            ModelSettings::default(),
            network_settings,
            model_config(),
            FixtureProvider {
                train: vec![],
                validation: vec![],
                test: vec![],
            },
            <TestBackend as burn::tensor::backend::Backend>::Device::default(),
            dir.path().join("checkpoint"),
            dir.path().join("results"),
            None,
            RunCounter::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ExecutorError::Config(_)));
    }
}
