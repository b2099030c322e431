//! Forecasting models.
//!
//! Every model is fitted on rows dated on or before a cutoff and forecasts
//! recursively from an origin: each predicted day is appended to the history
//! before the next day's features are computed.

pub mod gbrt;
pub mod holt_winters;

pub use gbrt::GradientBoosting;
pub use holt_winters::HoltWinters;

use crate::domain::error::MinecastError;
use crate::domain::feature::{FeatureFrame, History, Undefined};
use chrono::{Duration, NaiveDate};
use std::fmt;

/// What a tree-based model learns: the level itself or its daily change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetTransform {
    Level,
    Difference,
}

impl TargetTransform {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "level" => Some(TargetTransform::Level),
            "difference" | "diff" => Some(TargetTransform::Difference),
            _ => None,
        }
    }
}

pub trait ForecastModel: fmt::Debug + Send {
    fn name(&self) -> &'static str;

    /// Fit on the frame's rows dated on or before `cutoff`.
    fn fit(&mut self, frame: &FeatureFrame, cutoff: NaiveDate) -> Result<(), MinecastError>;

    /// Point forecasts for the `horizon` days after `origin`, using only
    /// history dated on or before `origin`.
    fn forecast(
        &self,
        frame: &FeatureFrame,
        origin: NaiveDate,
        horizon: usize,
    ) -> Result<Vec<f64>, MinecastError>;
}

/// Model selection by configuration. A fresh model is built per fold.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelClass {
    GradientBoosting {
        n_trees: usize,
        learning_rate: f64,
        max_depth: usize,
        min_samples_leaf: usize,
        transform: TargetTransform,
    },
    HoltWinters {
        alpha: f64,
        beta: f64,
        gamma: f64,
        season_length: usize,
    },
}

impl Default for ModelClass {
    fn default() -> Self {
        ModelClass::gradient_boosting()
    }
}

impl ModelClass {
    pub fn gradient_boosting() -> Self {
        ModelClass::GradientBoosting {
            n_trees: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 5,
            transform: TargetTransform::Difference,
        }
    }

    pub fn holt_winters() -> Self {
        ModelClass::HoltWinters {
            alpha: 0.3,
            beta: 0.05,
            gamma: 0.1,
            season_length: 7,
        }
    }

    /// Default parameters for a model name as written in configuration.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "gbrt" | "gbm" | "gradient_boosting" => Some(ModelClass::gradient_boosting()),
            "holt_winters" | "hw" | "ets" => Some(ModelClass::holt_winters()),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelClass::GradientBoosting { .. } => gbrt::NAME,
            ModelClass::HoltWinters { .. } => holt_winters::NAME,
        }
    }

    pub fn validate(&self) -> Result<(), MinecastError> {
        let invalid = |key: &str, reason: &str| Err(MinecastError::config_invalid("forecast", key, reason));
        match *self {
            ModelClass::GradientBoosting {
                n_trees,
                learning_rate,
                max_depth,
                min_samples_leaf,
                ..
            } => {
                if n_trees == 0 {
                    return invalid("n_trees", "must be at least 1");
                }
                if !(learning_rate > 0.0 && learning_rate <= 1.0) {
                    return invalid("learning_rate", "must be in (0, 1]");
                }
                if max_depth == 0 {
                    return invalid("max_depth", "must be at least 1");
                }
                if min_samples_leaf == 0 {
                    return invalid("min_samples_leaf", "must be at least 1");
                }
            }
            ModelClass::HoltWinters {
                alpha,
                beta,
                gamma,
                season_length,
            } => {
                for (key, value) in [("alpha", alpha), ("beta", beta), ("gamma", gamma)] {
                    if !(0.0..=1.0).contains(&value) {
                        return invalid(key, "must be in [0, 1]");
                    }
                }
                if season_length < 2 {
                    return invalid("season_length", "must be at least 2");
                }
            }
        }
        Ok(())
    }

    pub fn build(&self) -> Box<dyn ForecastModel> {
        match *self {
            ModelClass::GradientBoosting {
                n_trees,
                learning_rate,
                max_depth,
                min_samples_leaf,
                transform,
            } => Box::new(GradientBoosting::new(
                n_trees,
                learning_rate,
                max_depth,
                min_samples_leaf,
                transform,
            )),
            ModelClass::HoltWinters {
                alpha,
                beta,
                gamma,
                season_length,
            } => Box::new(HoltWinters::new(alpha, beta, gamma, season_length)),
        }
    }
}

/// History up to `origin` with interior gaps carried forward.
pub(crate) fn history_at(frame: &FeatureFrame, origin: NaiveDate) -> Result<History, MinecastError> {
    let mut history = frame.history().truncated(origin);
    if history.is_empty() || history.end() != origin {
        return Err(MinecastError::Data {
            reason: format!("forecast origin {origin} is outside the history of {}", frame.target()),
        });
    }
    history.carry_forward();
    Ok(history)
}

pub(crate) fn undefined_error(frame: &FeatureFrame, date: NaiveDate, why: Undefined) -> MinecastError {
    MinecastError::Data {
        reason: format!(
            "features for {} undefined on {date} during recursion ({why:?})",
            frame.target()
        ),
    }
}

pub(crate) fn next_day(history: &History) -> NaiveDate {
    history.end() + Duration::days(1)
}
