#![deny(missing_docs)]
//! # embrec
//!
//! `embrec` implements an explicit-feedback recommender: user and item
//! embedding tables whose dot product predicts a star rating, trained by
//! minimising mean absolute error. The trained item embeddings answer
//! "which items are like this one" queries, and the full model produces
//! top-N recommendations of items a user has not rated yet.
//!
//! ## Example
//! Fit a model on a local copy of the Movielens 100K dataset:
//!
//! ```rust,no_run
//! # extern crate embrec;
//! use embrec::data::{join, max_ids, train_test_split};
//! use embrec::models::factorization::Hyperparameters;
//! use embrec::similarity::{most_similar, recommend};
//!
//! let (ratings, items) = embrec::datasets::load_movielens_100k("ml-100k").unwrap();
//! let rows = join(&ratings, &items);
//! let (max_user_id, max_item_id) = max_ids(&rows).unwrap();
//!
//! let (train, test) = train_test_split(&rows, 0.2, 42).unwrap();
//!
//! let mut model = Hyperparameters::new(max_user_id, max_item_id)
//!     .embedding_dim(64)
//!     .num_epochs(10)
//!     .build()
//!     .unwrap();
//!
//! let history = model.fit(&train).unwrap();
//! let test_mae = embrec::evaluation::mae_score(&model, &test).unwrap();
//!
//! println!("{:?}, test MAE {}", history.last(), test_mae);
//!
//! let neighbours = most_similar(50, model.item_embeddings(), 10).unwrap();
//! let top = recommend(&model, &rows, 5, 10).unwrap();
//! # let _ = (neighbours, top);
//! ```
use std::fmt;

use failure::Fail;

pub mod data;
pub mod datasets;
pub mod evaluation;
pub mod models;
pub mod similarity;

/// Alias for user indices.
pub type UserId = usize;
/// Alias for item indices.
pub type ItemId = usize;
/// Alias for timestamps.
pub type Timestamp = usize;

/// Which embedding table an id refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Table {
    /// The user embedding table.
    User,
    /// The item embedding table.
    Item,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Table::User => write!(f, "user"),
            Table::Item => write!(f, "item"),
        }
    }
}

/// Fitting error types.
#[derive(Debug, Fail, PartialEq)]
pub enum FittingError {
    /// A hyperparameter or split parameter is outside its valid range.
    #[fail(display = "Invalid configuration: {}", _0)]
    InvalidConfiguration(String),
    /// No interactions were given, or none remain after hold-out.
    #[fail(display = "No interactions to fit on.")]
    NoInteractions,
    /// A training row references an id beyond the embedding tables.
    #[fail(
        display = "Training row references {} id {}, but the table has {} rows.",
        table, id, num_rows
    )]
    OutOfRange {
        /// Table the id was looked up in.
        table: Table,
        /// Offending id.
        id: usize,
        /// Number of rows in the table.
        num_rows: usize,
    },
}

/// Prediction error types.
#[derive(Debug, Fail, PartialEq)]
pub enum PredictionError {
    /// An id is beyond the bounds fixed when the tables were initialized.
    #[fail(display = "{} id {} is out of range: the table has {} rows.", table, id, num_rows)]
    OutOfRange {
        /// Table the id was looked up in.
        table: Table,
        /// Offending id.
        id: usize,
        /// Number of rows in the table.
        num_rows: usize,
    },
    /// Cosine similarity is undefined for the zero vector.
    #[fail(display = "Cosine similarity is undefined for a zero vector.")]
    ZeroVector,
    /// Failed prediction due to numerical issues.
    #[fail(display = "Invalid prediction value: non-finite or not a number.")]
    InvalidPredictionValue,
}

/// Trait describing models that predict the rating a user would give an item.
pub trait RatingModel {
    /// Largest user id the model was initialized with.
    fn max_user_id(&self) -> UserId;
    /// Largest item id the model was initialized with.
    fn max_item_id(&self) -> ItemId;
    /// Predict the rating `user_id` would give `item_id`.
    fn predict(&self, user_id: UserId, item_id: ItemId) -> Result<f32, PredictionError>;
}
