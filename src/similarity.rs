//! Item-to-item similarity and top-N recommendation queries over a
//! trained model.
use std::cmp::Ordering;
use std::collections::HashSet;

use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;

use crate::data::RatingEvent;
use crate::{ItemId, PredictionError, RatingModel, Table, UserId};

/// Cosine similarity of two vectors, in `[-1, 1]`.
///
/// Fails with `ZeroVector` if either vector has zero norm.
pub fn cosine_similarity(a: ArrayView1<f32>, b: ArrayView1<f32>) -> Result<f32, PredictionError> {
    let (mut dot, mut a_norm, mut b_norm) = (0.0f64, 0.0f64, 0.0f64);

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }

    if a_norm == 0.0 || b_norm == 0.0 {
        return Err(PredictionError::ZeroVector);
    }

    let similarity = dot / (a_norm.sqrt() * b_norm.sqrt());

    Ok(similarity.max(-1.0).min(1.0) as f32)
}

// Descending by score, then ascending by id.
fn by_score(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.0.cmp(&b.0))
}

/// The `top_n` items most similar to `item_id`, as `(item_id, similarity)`.
///
/// Every row of `item_embeddings` is a candidate, the query item included:
/// it scores 1.0 and normally comes first.
pub fn most_similar(
    item_id: ItemId,
    item_embeddings: ArrayView2<f32>,
    top_n: usize,
) -> Result<Vec<(ItemId, f32)>, PredictionError> {
    if item_id >= item_embeddings.nrows() {
        return Err(PredictionError::OutOfRange {
            table: Table::Item,
            id: item_id,
            num_rows: item_embeddings.nrows(),
        });
    }

    let query = item_embeddings.row(item_id);
    let rows: Vec<ArrayView1<f32>> = item_embeddings.outer_iter().collect();

    let mut scores = rows
        .par_iter()
        .enumerate()
        .map(|(candidate, embedding)| {
            cosine_similarity(query, embedding.view()).map(|similarity| (candidate, similarity))
        })
        .collect::<Result<Vec<_>, _>>()?;

    scores.sort_by(by_score);
    scores.truncate(top_n);

    Ok(scores)
}

/// The `top_n` items `user_id` has not rated, as `(item_id, predicted_rating)`.
///
/// Candidates are the ids in `[1, max_item_id)` of the model; ids the user
/// rated anywhere in `history` are excluded.
pub fn recommend<M, T>(
    model: &M,
    history: &[T],
    user_id: UserId,
    top_n: usize,
) -> Result<Vec<(ItemId, f32)>, PredictionError>
where
    M: RatingModel + Sync,
    T: RatingEvent,
{
    if user_id > model.max_user_id() {
        return Err(PredictionError::OutOfRange {
            table: Table::User,
            id: user_id,
            num_rows: model.max_user_id() + 1,
        });
    }

    let seen: HashSet<ItemId> = history
        .iter()
        .filter(|x| x.user_id() == user_id)
        .map(|x| x.item_id())
        .collect();

    let candidates: Vec<ItemId> = (1..model.max_item_id())
        .filter(|item_id| !seen.contains(item_id))
        .collect();

    let mut predictions = candidates
        .par_iter()
        .map(|&item_id| {
            model
                .predict(user_id, item_id)
                .map(|prediction| (item_id, prediction))
        })
        .collect::<Result<Vec<_>, _>>()?;

    predictions.sort_by(by_score);
    predictions.truncate(top_n);

    Ok(predictions)
}
