//! Gradient-boosted regression trees with squared loss.
//!
//! F0 = mean(y); each round fits a depth-limited tree to the residuals
//! y - F and adds `learning_rate * tree(x)`. Splits are exact: every distinct
//! threshold of every feature is scored by the reduction in squared error.

use super::{ForecastModel, TargetTransform, history_at, next_day, undefined_error};
use crate::domain::error::MinecastError;
use crate::domain::feature::FeatureFrame;
use chrono::{Duration, NaiveDate};

pub const NAME: &str = "gradient_boosting";

const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, x: &[f64]) -> f64 {
        match self {
            Node::Leaf(v) => *v,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if x[*feature] <= *threshold {
                    left.predict(x)
                } else {
                    right.predict(x)
                }
            }
        }
    }
}

struct TreeParams {
    max_depth: usize,
    min_samples_leaf: usize,
}

fn mean_of(indices: &[usize], y: &[f64]) -> f64 {
    indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64
}

fn grow(x: &[Vec<f64>], y: &[f64], indices: Vec<usize>, depth: usize, params: &TreeParams) -> Node {
    let n = indices.len();
    if depth >= params.max_depth || n < 2 * params.min_samples_leaf {
        return Node::Leaf(mean_of(&indices, y));
    }

    let total: f64 = indices.iter().map(|&i| y[i]).sum();
    let parent_score = total * total / n as f64;
    let n_features = x.first().map_or(0, Vec::len);

    let mut best: Option<(f64, usize, f64)> = None;
    let mut order = indices.clone();
    for feature in 0..n_features {
        order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));
        let mut left_sum = 0.0;
        for split in 1..n {
            left_sum += y[order[split - 1]];
            let lo = x[order[split - 1]][feature];
            let hi = x[order[split]][feature];
            if split < params.min_samples_leaf || n - split < params.min_samples_leaf || lo == hi {
                continue;
            }
            let right_sum = total - left_sum;
            let score = left_sum * left_sum / split as f64
                + right_sum * right_sum / (n - split) as f64;
            let gain = score - parent_score;
            if gain > MIN_GAIN && best.is_none_or(|(g, _, _)| gain > g) {
                best = Some((gain, feature, lo + (hi - lo) / 2.0));
            }
        }
    }

    let Some((_, feature, threshold)) = best else {
        return Node::Leaf(total / n as f64);
    };
    let (left, right): (Vec<usize>, Vec<usize>) =
        indices.into_iter().partition(|&i| x[i][feature] <= threshold);
    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(x, y, left, depth + 1, params)),
        right: Box::new(grow(x, y, right, depth + 1, params)),
    }
}

#[derive(Debug, Clone)]
pub struct GradientBoosting {
    n_trees: usize,
    learning_rate: f64,
    max_depth: usize,
    min_samples_leaf: usize,
    transform: TargetTransform,
    base: f64,
    trees: Vec<Node>,
    fitted: bool,
}

impl GradientBoosting {
    pub fn new(
        n_trees: usize,
        learning_rate: f64,
        max_depth: usize,
        min_samples_leaf: usize,
        transform: TargetTransform,
    ) -> Self {
        Self {
            n_trees,
            learning_rate,
            max_depth,
            min_samples_leaf,
            transform,
            base: 0.0,
            trees: Vec::new(),
            fitted: false,
        }
    }

    fn predict(&self, x: &[f64]) -> f64 {
        self.base
            + self
                .trees
                .iter()
                .map(|t| self.learning_rate * t.predict(x))
                .sum::<f64>()
    }

    /// Training matrix and response from rows up to `cutoff`. Under the
    /// difference transform, rows without a previous-day target are skipped.
    fn training_set(&self, frame: &FeatureFrame, cutoff: NaiveDate) -> (Vec<Vec<f64>>, Vec<f64>) {
        let columns = frame.predictive_indices();
        let history = frame.history();
        let mut x = Vec::new();
        let mut y = Vec::new();

        for row in frame.rows_until(cutoff) {
            let response = match self.transform {
                TargetTransform::Level => row.target,
                TargetTransform::Difference => {
                    match history.target_at(row.date - Duration::days(1)) {
                        Some(previous) => row.target - previous,
                        None => continue,
                    }
                }
            };
            x.push(columns.iter().map(|&c| row.values[c]).collect());
            y.push(response);
        }
        (x, y)
    }
}

impl ForecastModel for GradientBoosting {
    fn name(&self) -> &'static str {
        NAME
    }

    fn fit(&mut self, frame: &FeatureFrame, cutoff: NaiveDate) -> Result<(), MinecastError> {
        let (x, y) = self.training_set(frame, cutoff);
        if y.is_empty() {
            return Err(MinecastError::InsufficientHistory {
                target: frame.target().to_string(),
                rows: 0,
                minimum: 1,
            });
        }

        let params = TreeParams {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
        };
        self.base = y.iter().sum::<f64>() / y.len() as f64;
        self.trees.clear();

        let mut fitted = vec![self.base; y.len()];
        for _ in 0..self.n_trees {
            let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(a, f)| a - f).collect();
            let tree = grow(&x, &residuals, (0..y.len()).collect(), 0, &params);
            for (f, row) in fitted.iter_mut().zip(&x) {
                *f += self.learning_rate * tree.predict(row);
            }
            self.trees.push(tree);
        }
        self.fitted = true;

        tracing::debug!(
            target = frame.target(),
            %cutoff,
            rows = y.len(),
            trees = self.trees.len(),
            "fitted gradient boosting"
        );
        Ok(())
    }

    fn forecast(
        &self,
        frame: &FeatureFrame,
        origin: NaiveDate,
        horizon: usize,
    ) -> Result<Vec<f64>, MinecastError> {
        if !self.fitted {
            return Err(MinecastError::InvalidState {
                expected: "fitted model",
                actual: "unfitted model",
            });
        }
        let builder = frame.builder();
        let mut history = history_at(frame, origin)?;
        let mut out = Vec::with_capacity(horizon);

        for _ in 0..horizon {
            let date = next_day(&history);
            let x = builder
                .predictive_row(&history, date)
                .map_err(|why| undefined_error(frame, date, why))?;
            let step = self.predict(&x);
            let value = match self.transform {
                TargetTransform::Level => step,
                TargetTransform::Difference => {
                    let previous = history
                        .lookup(None, history.end())
                        .map_err(|why| undefined_error(frame, date, why))?;
                    previous + step
                }
            };
            history.push_target(value);
            out.push(value);
        }
        Ok(out)
    }
}
