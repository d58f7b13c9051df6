//! Held-out evaluation of rating models.
use rayon::prelude::*;

use crate::data::RatingEvent;
use crate::{PredictionError, RatingModel};

/// `(true_rating, predicted_rating)` for every row, in input order.
pub fn prediction_pairs<M, T>(model: &M, rows: &[T]) -> Result<Vec<(f32, f32)>, PredictionError>
where
    M: RatingModel + Sync,
    T: RatingEvent + Sync,
{
    rows.par_iter()
        .map(|row| {
            model
                .predict(row.user_id(), row.item_id())
                .map(|prediction| (row.rating(), prediction))
        })
        .collect()
}

/// Mean absolute error of the model's predictions on `rows`.
///
/// Returns NaN when `rows` is empty.
pub fn mae_score<M, T>(model: &M, rows: &[T]) -> Result<f32, PredictionError>
where
    M: RatingModel + Sync,
    T: RatingEvent + Sync,
{
    let pairs = prediction_pairs(model, rows)?;
    let total: f32 = pairs
        .iter()
        .map(|&(truth, prediction)| (truth - prediction).abs())
        .sum();

    Ok(total / pairs.len() as f32)
}
