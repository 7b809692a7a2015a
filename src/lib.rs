use std::fmt::{Debug, Display};

use burn::{config::Config, module::Module, tensor::backend::Backend};

pub use burn;
#[cfg(feature = "burn-ndarray")]
pub use burn_ndarray;

pub mod batch;
pub mod checkpoint;
pub mod common;
pub mod config;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod logging;
pub mod result;

pub use error::{ExecutorError, ExecutorResult};
pub use executor::Executor;

/// The network under training: an opaque forward function plus a
/// `burn::config::Config` describing how to build one from scratch.
pub trait Model<B: Backend>: Module<B> + Display + Debug + 'static {
    type Input;
    type Output;
    type Config: Config;

    fn from_config(config: Self::Config) -> Self;
    fn forward(&self, input: Self::Input) -> Self::Output;
}
