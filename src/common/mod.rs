//! Shared building blocks for the reference linear/autoencoder models in
//! `common::linear` and `common::autoencoder`. These exist only as
//! concrete `Model` fixtures the executor's tests are exercised against.

pub mod autoencoder;
pub mod linear;

use burn::module::{Devices, Module, ModuleMapper, ModuleVisitor};
use burn::tensor::{activation, backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

/// Activation functions available to the reference models, dispatched at
/// `forward` time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Relu,
    Gelu,
    Sigmoid,
    Tanh,
    Identity,
}

impl Activation {
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::Relu => activation::relu(x),
            Activation::Gelu => activation::gelu(x),
            Activation::Sigmoid => activation::sigmoid(x),
            Activation::Tanh => activation::tanh(x),
            Activation::Identity => x,
        }
    }
}

/// A heterogeneous triple whose first two slots are `Module`s and whose
/// third is plain data (typically an [`Activation`]); manually implements
/// `Module` by delegating to the first two fields and passing the third
/// through unchanged, since burn's `#[derive(Module)]` has no notion of a
/// non-parameter passenger field.
#[derive(Debug, Clone)]
pub struct ThreeTuple<A, B, C>(pub A, pub B, pub C);

impl<Bk, A, Mid, C> Module<Bk> for ThreeTuple<A, Mid, C>
where
    Bk: Backend,
    A: Module<Bk>,
    Mid: Module<Bk>,
    C: Clone + core::fmt::Debug + Send + Sync + 'static,
{
    type Record = (A::Record, Mid::Record);

    fn collect_devices(&self, devices: Devices<Bk>) -> Devices<Bk> {
        let devices = self.0.collect_devices(devices);
        self.1.collect_devices(devices)
    }

    fn fork(self, device: &<Bk as Backend>::Device) -> Self {
        Self(self.0.fork(device), self.1.fork(device), self.2)
    }

    fn to_device(self, device: &<Bk as Backend>::Device) -> Self {
        Self(self.0.to_device(device), self.1.to_device(device), self.2)
    }

    fn visit<V: ModuleVisitor<Bk>>(&self, visitor: &mut V) {
        self.0.visit(visitor);
        self.1.visit(visitor);
    }

    fn map<MM: ModuleMapper<Bk>>(self, mapper: &mut MM) -> Self {
        Self(self.0.map(mapper), self.1.map(mapper), self.2)
    }

    fn load_record(self, record: Self::Record) -> Self {
        Self(
            self.0.load_record(record.0),
            self.1.load_record(record.1),
            self.2,
        )
    }

    fn into_record(self) -> Self::Record {
        (self.0.into_record(), self.1.into_record())
    }
}

/// The `idx`-th smallest divisor of `n` (1-indexed), or `None` if `n` has
/// fewer than `idx` divisors. Used to pick a `GroupNorm` group count that
/// evenly divides a layer's channel count.
pub fn find_nth_factor(n: usize, idx: usize) -> Option<usize> {
    if n == 0 || idx == 0 {
        return None;
    }
    (1..=n).filter(|d| n % d == 0).nth(idx - 1)
}
