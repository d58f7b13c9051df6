//! Models module.
use serde_derive::{Deserialize, Serialize};

pub mod factorization;
mod optim;

/// Optimizer used to train the model.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Optimizer {
    /// Plain stochastic gradient descent.
    Sgd,
    /// Adagrad.
    Adagrad,
    /// Adam.
    Adam,
}

/// Losses recorded at the end of a training epoch.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct EpochLoss {
    /// Zero-based epoch index within the `fit` call.
    pub epoch: usize,
    /// Mean absolute error over the training rows, measured before each
    /// minibatch update.
    pub train_loss: f32,
    /// Mean absolute error over the held-out validation rows, if any.
    pub validation_loss: Option<f32>,
}
