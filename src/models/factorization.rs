//! Explicit-feedback factorization model.
//!
//! The model keeps two embedding tables, one row per user id and one row
//! per item id. The predicted rating of a `(user, item)` pair is the dot
//! product of their rows:
//!
//! ```text
//! r(u, i) = user_embeddings[u] . item_embeddings[i]
//! ```
//!
//! Training minimises the mean absolute error between predicted and true
//! ratings, one minibatch update at a time.
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rand_xorshift::XorShiftRng;
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info};

use super::optim::TableOptimizer;
use super::{EpochLoss, Optimizer};
use failure::format_err;

use crate::data::{floor_count, RatingEvent};
use crate::{FittingError, ItemId, PredictionError, RatingModel, Table, UserId};

fn embedding_init<T: Rng>(
    rows: usize,
    cols: usize,
    rng: &mut T,
) -> Result<Array2<f32>, FittingError> {
    let normal = Normal::new(0.0, 1.0 / cols as f32)
        .map_err(|err| FittingError::InvalidConfiguration(err.to_string()))?;

    Ok(Array2::from_shape_fn((rows, cols), |_| normal.sample(rng)))
}

fn invalid<T>(message: String) -> Result<T, FittingError> {
    Err(FittingError::InvalidConfiguration(message))
}

/// Hyperparameters describing the factorization model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Hyperparameters {
    max_user_id: UserId,
    max_item_id: ItemId,
    embedding_dim: usize,
    learning_rate: f32,
    optimizer: Optimizer,
    minibatch_size: usize,
    num_epochs: usize,
    validation_fraction: f32,
    shuffle: bool,
    gradient_clip: f32,
    seed: u64,
}

impl Hyperparameters {
    /// Build new hyperparameters for ids up to and including
    /// `max_user_id` and `max_item_id`.
    pub fn new(max_user_id: UserId, max_item_id: ItemId) -> Self {
        Hyperparameters {
            max_user_id,
            max_item_id,
            embedding_dim: 32,
            learning_rate: 0.01,
            optimizer: Optimizer::Adam,
            minibatch_size: 64,
            num_epochs: 10,
            validation_fraction: 0.1,
            shuffle: true,
            gradient_clip: 5.0,
            seed: 42,
        }
    }

    /// Set the embedding dimensionality.
    pub fn embedding_dim(mut self, embedding_dim: usize) -> Self {
        self.embedding_dim = embedding_dim;
        self
    }

    /// Set the learning rate.
    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the optimizer type.
    pub fn optimizer(mut self, optimizer: Optimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Set the number of rows per minibatch update.
    pub fn minibatch_size(mut self, minibatch_size: usize) -> Self {
        self.minibatch_size = minibatch_size;
        self
    }

    /// Set the number of epochs to run per each `fit` call.
    pub fn num_epochs(mut self, num_epochs: usize) -> Self {
        self.num_epochs = num_epochs;
        self
    }

    /// Set the fraction of rows, taken from the end of the training data,
    /// that is scored once per epoch and never trained on.
    pub fn validation_fraction(mut self, validation_fraction: f32) -> Self {
        self.validation_fraction = validation_fraction;
        self
    }

    /// Set whether training rows are reshuffled before every epoch.
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Set the absolute bound applied to every gradient component.
    pub fn gradient_clip(mut self, gradient_clip: f32) -> Self {
        self.gradient_clip = gradient_clip;
        self
    }

    /// Set the seed of the random number generator used for
    /// initialization and shuffling.
    pub fn from_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<(), FittingError> {
        if self.embedding_dim == 0 {
            return invalid("embedding_dim must be positive".to_owned());
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return invalid(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            ));
        }
        if self.minibatch_size == 0 {
            return invalid("minibatch_size must be positive".to_owned());
        }
        if self.num_epochs == 0 {
            return invalid("num_epochs must be positive".to_owned());
        }
        if !(self.validation_fraction >= 0.0 && self.validation_fraction < 1.0) {
            return invalid(format!(
                "validation_fraction must be in [0, 1), got {}",
                self.validation_fraction
            ));
        }
        if !(self.gradient_clip > 0.0) {
            return invalid(format!(
                "gradient_clip must be positive, got {}",
                self.gradient_clip
            ));
        }
        if self.max_user_id == UserId::max_value() || self.max_item_id == ItemId::max_value() {
            return invalid("maximum ids must leave room for a table size".to_owned());
        }

        Ok(())
    }

    /// Initialize the model: allocate both embedding tables, sized by
    /// the maximum ids plus one, with small random values.
    pub fn build(self) -> Result<FactorizationModel, FittingError> {
        self.validate()?;

        let mut rng = XorShiftRng::seed_from_u64(self.seed);
        let user_embeddings = embedding_init(self.max_user_id + 1, self.embedding_dim, &mut rng)?;
        let item_embeddings = embedding_init(self.max_item_id + 1, self.embedding_dim, &mut rng)?;

        Ok(FactorizationModel {
            hyper: self,
            user_embeddings,
            item_embeddings,
            rng,
        })
    }
}

/// Dot-product rating model over user and item embedding tables.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FactorizationModel {
    hyper: Hyperparameters,
    user_embeddings: Array2<f32>,
    item_embeddings: Array2<f32>,
    rng: XorShiftRng,
}

impl FactorizationModel {
    /// The hyperparameters the model was built with.
    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyper
    }

    /// The user embedding table, one row per user id.
    pub fn user_embeddings(&self) -> ArrayView2<f32> {
        self.user_embeddings.view()
    }

    /// The item embedding table, one row per item id.
    pub fn item_embeddings(&self) -> ArrayView2<f32> {
        self.item_embeddings.view()
    }

    /// The embedding of `user_id`.
    pub fn user_embedding(&self, user_id: UserId) -> Result<ArrayView1<f32>, PredictionError> {
        row(&self.user_embeddings, Table::User, user_id)
    }

    /// The embedding of `item_id`.
    pub fn item_embedding(&self, item_id: ItemId) -> Result<ArrayView1<f32>, PredictionError> {
        row(&self.item_embeddings, Table::Item, item_id)
    }

    fn check_bounds<T: RatingEvent>(&self, rows: &[T]) -> Result<(), FittingError> {
        let num_users = self.user_embeddings.nrows();
        let num_items = self.item_embeddings.nrows();

        for row in rows {
            if row.user_id() >= num_users {
                return Err(FittingError::OutOfRange {
                    table: Table::User,
                    id: row.user_id(),
                    num_rows: num_users,
                });
            }
            if row.item_id() >= num_items {
                return Err(FittingError::OutOfRange {
                    table: Table::Item,
                    id: row.item_id(),
                    num_rows: num_items,
                });
            }
        }

        Ok(())
    }

    fn absolute_error<T: RatingEvent>(&self, row: &T) -> f32 {
        let user = self.user_embeddings.row(row.user_id());
        let item = self.item_embeddings.row(row.item_id());

        (user.dot(&item) - row.rating()).abs()
    }

    /// Fit the model, returning the losses of every epoch.
    ///
    /// The trailing `validation_fraction` of `rows` is held out and only
    /// scored. Calling `fit` again continues from the current embeddings.
    pub fn fit<T: RatingEvent>(&mut self, rows: &[T]) -> Result<Vec<EpochLoss>, FittingError> {
        self.check_bounds(rows)?;

        let num_validation = floor_count(self.hyper.validation_fraction, rows.len());
        let num_train = rows.len() - num_validation;

        if num_train == 0 {
            return Err(FittingError::NoInteractions);
        }

        let (train, validation) = rows.split_at(num_train);
        let dim = self.hyper.embedding_dim;

        let mut user_optimizer = TableOptimizer::new(
            self.hyper.optimizer,
            self.hyper.learning_rate,
            self.hyper.gradient_clip,
            self.user_embeddings.dim(),
        );
        let mut item_optimizer = TableOptimizer::new(
            self.hyper.optimizer,
            self.hyper.learning_rate,
            self.hyper.gradient_clip,
            self.item_embeddings.dim(),
        );

        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut history = Vec::with_capacity(self.hyper.num_epochs);

        for epoch in 0..self.hyper.num_epochs {
            if self.hyper.shuffle {
                order.shuffle(&mut self.rng);
            }

            let mut loss_value = 0.0;

            for batch in order.chunks(self.hyper.minibatch_size) {
                let scale = 1.0 / batch.len() as f32;

                let mut user_gradients: HashMap<UserId, Array1<f32>> = HashMap::new();
                let mut item_gradients: HashMap<ItemId, Array1<f32>> = HashMap::new();

                for &idx in batch {
                    let datum = &train[idx];
                    let user = self.user_embeddings.row(datum.user_id());
                    let item = self.item_embeddings.row(datum.item_id());

                    let error = user.dot(&item) - datum.rating();
                    loss_value += error.abs();

                    // Subgradient of |error|; zero when the prediction is exact.
                    let sign = if error > 0.0 {
                        1.0
                    } else if error < 0.0 {
                        -1.0
                    } else {
                        0.0
                    };

                    user_gradients
                        .entry(datum.user_id())
                        .or_insert_with(|| Array1::zeros(dim))
                        .scaled_add(sign * scale, &item);
                    item_gradients
                        .entry(datum.item_id())
                        .or_insert_with(|| Array1::zeros(dim))
                        .scaled_add(sign * scale, &user);
                }

                for (user_id, gradient) in user_gradients {
                    user_optimizer.step(
                        user_id,
                        self.user_embeddings.row_mut(user_id),
                        gradient.view(),
                    );
                }
                for (item_id, gradient) in item_gradients {
                    item_optimizer.step(
                        item_id,
                        self.item_embeddings.row_mut(item_id),
                        gradient.view(),
                    );
                }
            }

            let train_loss = loss_value / train.len() as f32;
            let validation_loss = if validation.is_empty() {
                None
            } else {
                let total: f32 = validation.iter().map(|x| self.absolute_error(x)).sum();
                Some(total / validation.len() as f32)
            };

            debug!(epoch, train_loss, validation_loss = ?validation_loss, "finished epoch");

            history.push(EpochLoss {
                epoch,
                train_loss,
                validation_loss,
            });
        }

        if let Some(last) = history.last() {
            info!(
                num_epochs = history.len(),
                num_train = train.len(),
                num_validation = validation.len(),
                train_loss = last.train_loss,
                validation_loss = ?last.validation_loss,
                "fitted factorization model"
            );
        }

        Ok(history)
    }

    /// Write the model to `path`.
    ///
    /// Embedding values round-trip exactly through `load`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), failure::Error> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        bincode::serialize_into(&mut writer, self)?;
        writer.flush()?;

        info!(path = %path.as_ref().display(), "saved model");

        Ok(())
    }

    /// Read a model previously written by `save`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, failure::Error> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let model: FactorizationModel = bincode::deserialize_from(reader)?;
        model.check_shapes()?;

        info!(path = %path.as_ref().display(), "loaded model");

        Ok(model)
    }

    fn check_shapes(&self) -> Result<(), failure::Error> {
        let tables = [
            (Table::User, &self.user_embeddings, self.hyper.max_user_id),
            (Table::Item, &self.item_embeddings, self.hyper.max_item_id),
        ];

        for &(kind, table, max_id) in &tables {
            let expected = (max_id.saturating_add(1), self.hyper.embedding_dim);

            if table.dim() != expected {
                return Err(format_err!(
                    "{} table has shape {:?}, expected {:?}",
                    kind,
                    table.dim(),
                    expected
                ));
            }
        }

        Ok(())
    }
}

fn row(table: &Array2<f32>, kind: Table, id: usize) -> Result<ArrayView1<f32>, PredictionError> {
    if id < table.nrows() {
        Ok(table.row(id))
    } else {
        Err(PredictionError::OutOfRange {
            table: kind,
            id,
            num_rows: table.nrows(),
        })
    }
}

impl RatingModel for FactorizationModel {
    fn max_user_id(&self) -> UserId {
        self.hyper.max_user_id
    }

    fn max_item_id(&self) -> ItemId {
        self.hyper.max_item_id
    }

    fn predict(&self, user_id: UserId, item_id: ItemId) -> Result<f32, PredictionError> {
        let user = self.user_embedding(user_id)?;
        let item = self.item_embedding(item_id)?;
        let prediction = user.dot(&item);

        if prediction.is_finite() {
            Ok(prediction)
        } else {
            Err(PredictionError::InvalidPredictionValue)
        }
    }
}
