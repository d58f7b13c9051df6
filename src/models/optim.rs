use itertools::izip;
use ndarray::{Array2, ArrayView1, ArrayViewMut1};

use super::Optimizer;

const ADAGRAD_INITIAL_ACCUMULATOR: f32 = 0.1;
const ADAM_BETA_1: f32 = 0.9;
const ADAM_BETA_2: f32 = 0.999;
const EPSILON: f32 = 1e-7;

#[derive(Debug)]
enum State {
    Sgd,
    Adagrad {
        accumulators: Array2<f32>,
    },
    Adam {
        first_moments: Array2<f32>,
        second_moments: Array2<f32>,
        steps: Vec<i32>,
    },
}

/// Per-row optimizer state for one embedding table.
///
/// Only rows that receive a gradient are updated, so Adam keeps a separate
/// step count for each row.
#[derive(Debug)]
pub(crate) struct TableOptimizer {
    learning_rate: f32,
    gradient_clip: f32,
    state: State,
}

impl TableOptimizer {
    pub(crate) fn new(
        optimizer: Optimizer,
        learning_rate: f32,
        gradient_clip: f32,
        shape: (usize, usize),
    ) -> Self {
        let state = match optimizer {
            Optimizer::Sgd => State::Sgd,
            Optimizer::Adagrad => State::Adagrad {
                accumulators: Array2::from_elem(shape, ADAGRAD_INITIAL_ACCUMULATOR),
            },
            Optimizer::Adam => State::Adam {
                first_moments: Array2::zeros(shape),
                second_moments: Array2::zeros(shape),
                steps: vec![0; shape.0],
            },
        };

        TableOptimizer {
            learning_rate,
            gradient_clip,
            state,
        }
    }

    /// Apply `gradient` to `parameters`, the `row`-th row of the table.
    pub(crate) fn step(
        &mut self,
        row: usize,
        mut parameters: ArrayViewMut1<f32>,
        gradient: ArrayView1<f32>,
    ) {
        let learning_rate = self.learning_rate;
        let clip = self.gradient_clip;

        match self.state {
            State::Sgd => {
                for (param, &grad) in izip!(parameters.iter_mut(), gradient.iter()) {
                    *param -= learning_rate * grad.max(-clip).min(clip);
                }
            }
            State::Adagrad {
                ref mut accumulators,
            } => {
                let mut accumulator = accumulators.row_mut(row);

                for (param, acc, &grad) in izip!(
                    parameters.iter_mut(),
                    accumulator.iter_mut(),
                    gradient.iter()
                ) {
                    let grad = grad.max(-clip).min(clip);
                    *acc += grad * grad;
                    *param -= learning_rate * grad / (acc.sqrt() + EPSILON);
                }
            }
            State::Adam {
                ref mut first_moments,
                ref mut second_moments,
                ref mut steps,
            } => {
                steps[row] += 1;
                let t = steps[row];
                let step_size = learning_rate * (1.0 - ADAM_BETA_2.powi(t)).sqrt()
                    / (1.0 - ADAM_BETA_1.powi(t));

                let mut first_moment = first_moments.row_mut(row);
                let mut second_moment = second_moments.row_mut(row);

                for (param, m, v, &grad) in izip!(
                    parameters.iter_mut(),
                    first_moment.iter_mut(),
                    second_moment.iter_mut(),
                    gradient.iter()
                ) {
                    let grad = grad.max(-clip).min(clip);
                    *m = ADAM_BETA_1 * *m + (1.0 - ADAM_BETA_1) * grad;
                    *v = ADAM_BETA_2 * *v + (1.0 - ADAM_BETA_2) * grad * grad;
                    *param -= step_size * *m / (v.sqrt() + EPSILON);
                }
            }
        }
    }
}
