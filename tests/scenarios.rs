//! End-to-end scenarios driving [`academy_executor::Executor`] through its
//! public API: cooperative epoch control via the update file, cooperative
//! stop, and batch-cache reuse across repeated phases.

use std::collections::HashMap;
use std::time::Duration;

use academy_executor::burn::nn::LinearConfig;
use academy_executor::burn::tensor::{backend::Backend, Tensor, TensorData};
use academy_executor::burn_ndarray::NdArray;
use academy_executor::common::linear::{LinearNetwork, LinearNetworkConfig};
use academy_executor::common::Activation;
use academy_executor::config::{ModelSettings, NetworkSettings};
use academy_executor::result::RunCounter;
use academy_executor::{batch::Batch, batch::SplitProvider, Executor, ExecutorResult};
use burn_autodiff::Autodiff;
use tempfile::tempdir;

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

    fn to_device(&self, _device: &<TestBackend as Backend>::Device) -> Self {
        // Pads each step so a background writer has a wide, comfortable
        // margin to land the update file between epoch boundaries.
        std::thread::sleep(Duration::from_millis(20));
        self.clone()
    }

    fn release(self) {}

    fn input(&self) -> Tensor<TestBackend, 2> {
        stack(&self.input)
    }

    fn labels(&self) -> Tensor<TestBackend, 2> {
        stack(&self.labels)
    }

    fn descriptor(&self) -> String {
        format!("batch#{}", self.id)
    }
}

fn stack(rows: &[Vec<f32>]) -> Tensor<TestBackend, 2> {
    let r = rows.len();
    let c = rows[0].len();
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Tensor::from_data(TensorData::new(flat, [r, c]), &Default::default())
}

fn fixture_batch(id: u64) -> FixtureBatch {
    FixtureBatch {
        id,
        input: vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0], vec![0.0, 0.0]],
        labels: vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, 1.0]],
    }
}

/// A [`SplitProvider`] that counts how many times each named split is pulled,
/// so tests can assert a cached phase is materialized exactly once.
struct CountingProvider {
    calls: std::sync::Mutex<HashMap<String, usize>>,
}

impl CountingProvider {
    fn new() -> Self {
        Self {
            calls: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn call_count(&self, split: &str) -> usize {
        *self.calls.lock().unwrap().get(split).unwrap_or(&0)
    }
}

impl SplitProvider<TestBackend> for CountingProvider {
    type Batch = FixtureBatch;

    fn split(&self, split: &str) -> ExecutorResult<Vec<Self::Batch>> {
        *self.calls.lock().unwrap().entry(split.to_string()).or_insert(0) += 1;
        Ok(match split {
            "train" => vec![fixture_batch(1)],
            "validation" => vec![fixture_batch(2)],
            "test" => vec![fixture_batch(3)],
            other => panic!("unknown split: {other}"),
        })
    }
}

fn model_config() -> LinearNetworkConfig {
    LinearNetworkConfig {
        linears: vec![(LinearConfig::new(2, 2), None, Activation::Identity)],
    }
}

fn make_executor(
    model_settings: ModelSettings,
    network_settings: NetworkSettings,
    provider: CountingProvider,
    dir: &std::path::Path,
    update_path: Option<std::path::PathBuf>,
) -> Executor<TestBackend, LinearNetwork<TestBackend>, CountingProvider> {
    Executor::new(
        model_settings,
        network_settings,
        model_config(),
        provider,
        Default::default(),
        dir.join("checkpoint"),
        dir.join("results"),
        update_path,
        RunCounter::new(),
    )
    .unwrap()
}

/// `Executor::train` wipes any pre-existing update file as its first act
/// (stale-file cleanup), so the file has to land *after* training has
/// already started. A background thread writes it a few milliseconds in;
/// each epoch is padded to tens of milliseconds via `FixtureBatch::to_device`,
/// leaving a comfortable margin for the write to land before the first
/// epoch-boundary poll.
#[test]
fn update_file_jumps_epoch_and_is_removed_after_poll() {
    let dir = tempdir().unwrap();
    let update_path = dir.path().join("update.json");

    let settings = ModelSettings {
        num_epochs: 10,
        ..ModelSettings::default()
    };
    let mut executor = make_executor(
        settings,
        NetworkSettings::default(),
        CountingProvider::new(),
        dir.path(),
        Some(update_path.clone()),
    );

    let writer_path = update_path.clone();
    let writer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(5));
        std::fs::write(&writer_path, r#"{"epoch": 4}"#).unwrap();
    });

    let result = executor.train(None).unwrap();
    writer.join().unwrap();

    // epoch 0 runs, the update file sets epoch to 4, then 4..10 run in order:
    // 0, 4, 5, 6, 7, 8, 9 = 7 epochs total.
    assert_eq!(result.train().epochs().len(), 7);
    assert!(!update_path.exists());
}

#[test]
fn cooperative_stop_file_halts_training_at_next_boundary() {
    let dir = tempdir().unwrap();
    let update_path = dir.path().join("update.json");

    let settings = ModelSettings {
        num_epochs: 10,
        ..ModelSettings::default()
    };
    let mut executor = make_executor(
        settings,
        NetworkSettings::default(),
        CountingProvider::new(),
        dir.path(),
        Some(update_path.clone()),
    );

    let writer_path = update_path.clone();
    let writer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(5));
        // Same sentinel LifeCycleMonitor::stop() writes: a record with no
        // usable (non-negative) epoch, which the monitor downgrades to `Stop`.
        std::fs::write(&writer_path, r#"{"epoch": -1}"#).unwrap();
    });

    let result = executor.train(None).unwrap();
    writer.join().unwrap();

    assert_eq!(result.train().epochs().len(), 1);
    assert_eq!(result.validation().epochs().len(), 1);
    assert!(!update_path.exists());
}

#[test]
fn cached_batches_are_not_rematerialized_across_repeated_phases() {
    let dir = tempdir().unwrap();
    let mut network_settings = NetworkSettings::default();
    network_settings.cache_batches = true;

    let settings = ModelSettings {
        num_epochs: 1,
        ..ModelSettings::default()
    };
    let mut executor = make_executor(
        settings,
        network_settings,
        CountingProvider::new(),
        dir.path(),
        None,
    );

    executor.train(None).unwrap();
    // training materialized train+validation exactly once each
    assert_eq!(executor_provider_calls(&executor, "train"), 1);
    assert_eq!(executor_provider_calls(&executor, "validation"), 1);

    executor.train(None).unwrap();
    // with caching on, the second run reuses the phase cache rather than
    // pulling fresh batches from the split provider.
    assert_eq!(executor_provider_calls(&executor, "train"), 1);
    assert_eq!(executor_provider_calls(&executor, "validation"), 1);

    executor.deallocate_batches();
    executor.train(None).unwrap();
    assert_eq!(executor_provider_calls(&executor, "train"), 2);
    assert_eq!(executor_provider_calls(&executor, "validation"), 2);
}

fn executor_provider_calls(
    executor: &Executor<TestBackend, LinearNetwork<TestBackend>, CountingProvider>,
    split: &str,
) -> usize {
    executor.provider().call_count(split)
}
