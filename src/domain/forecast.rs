//! Per-target forecast engine with rolling-origin evaluation.
//!
//! The engine is a state machine:
//!
//! ```text
//! Uninitialized --prepare--> FeaturesReady --train--> Trained --forecast--> Forecasted
//! ```
//!
//! Calling an operation out of order returns `InvalidState`. Any error resets
//! the engine to `Uninitialized`.
//!
//! Fold k (0-based, K folds) evaluates the H days ending at
//! `last - (K - 1 - k) * stride` and trains on rows up to the day before that
//! window. The final model is refitted on all rows and forecasts the H days
//! after the last row, with bands of `band_z` times the per-step MAE observed
//! across folds.

use crate::domain::error::MinecastError;
use crate::domain::feature::{FeatureBuilder, FeatureFrame, FeatureSpec};
use crate::domain::model::{ForecastModel, ModelClass};
use crate::domain::series_store::SeriesStore;
use chrono::{Duration, NaiveDate};

pub const DEFAULT_HORIZON: usize = 30;
pub const DEFAULT_FOLDS: usize = 3;
pub const DEFAULT_MAPE_THRESHOLD: f64 = 0.10;
pub const DEFAULT_BAND_Z: f64 = 1.28;

/// Closed range of plausible values for a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueDomain {
    pub min: f64,
    pub max: f64,
}

impl Default for ValueDomain {
    fn default() -> Self {
        Self::non_negative()
    }
}

impl ValueDomain {
    pub fn non_negative() -> Self {
        Self {
            min: 0.0,
            max: f64::INFINITY,
        }
    }

    pub fn unbounded() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    pub fn bounded(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamp `value` and report whether it moved.
    pub fn clip(&self, value: f64) -> (f64, bool) {
        let clipped = value.clamp(self.min, self.max);
        (clipped, clipped != value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub horizon: usize,
    pub folds: usize,
    /// Days between successive fold windows. Defaults to `horizon`.
    pub stride: Option<usize>,
    /// Usable rows required. Defaults to `2 * horizon * folds`.
    pub min_rows: Option<usize>,
    pub model: ModelClass,
    pub mape_threshold: f64,
    pub band_z: f64,
    pub domain: ValueDomain,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            horizon: DEFAULT_HORIZON,
            folds: DEFAULT_FOLDS,
            stride: None,
            min_rows: None,
            model: ModelClass::default(),
            mape_threshold: DEFAULT_MAPE_THRESHOLD,
            band_z: DEFAULT_BAND_Z,
            domain: ValueDomain::default(),
        }
    }
}

impl EngineConfig {
    pub fn stride(&self) -> usize {
        self.stride.unwrap_or(self.horizon)
    }

    pub fn min_rows(&self) -> usize {
        self.min_rows.unwrap_or(2 * self.horizon * self.folds)
    }

    pub fn validate(&self) -> Result<(), MinecastError> {
        let invalid = |key: &str, reason: String| Err(MinecastError::config_invalid("forecast", key, reason));
        if self.horizon == 0 {
            return invalid("horizon", "must be at least 1".into());
        }
        if self.folds == 0 {
            return invalid("folds", "must be at least 1".into());
        }
        if self.stride() < self.horizon {
            return invalid(
                "stride",
                format!("{} is shorter than the horizon {}", self.stride(), self.horizon),
            );
        }
        if !(self.mape_threshold.is_finite() && self.mape_threshold > 0.0) {
            return invalid("mape_threshold", "must be positive".into());
        }
        if !(self.band_z.is_finite() && self.band_z >= 0.0) {
            return invalid("band_z", "must be non-negative".into());
        }
        if self.domain.min > self.domain.max {
            return invalid("domain", "min exceeds max".into());
        }
        self.model.validate()
    }
}

/// One rolling-origin split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fold {
    pub index: usize,
    pub cutoff: NaiveDate,
    pub eval_start: NaiveDate,
    pub eval_end: NaiveDate,
    pub train_rows: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoldScore {
    pub fold: Fold,
    /// Per step; `None` where the actual value is missing.
    pub abs_errors: Vec<Option<f64>>,
    pub pct_errors: Vec<Option<f64>>,
    pub mae: f64,
    pub mape: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationScore {
    pub folds: Vec<FoldScore>,
    pub mae: f64,
    /// Fraction, e.g. 0.05 for 5 %. NaN when no step had a non-zero actual.
    pub mape: f64,
    pub step_mae: Vec<Option<f64>>,
}

impl ValidationScore {
    fn from_folds(folds: Vec<FoldScore>, horizon: usize) -> Self {
        let abs: Vec<f64> = folds.iter().flat_map(|f| f.abs_errors.iter().flatten().copied()).collect();
        let pct: Vec<f64> = folds.iter().flat_map(|f| f.pct_errors.iter().flatten().copied()).collect();
        let step_mae = (0..horizon)
            .map(|step| {
                let errors: Vec<f64> = folds.iter().filter_map(|f| f.abs_errors[step]).collect();
                mean(&errors)
            })
            .collect();
        Self {
            mae: mean(&abs).unwrap_or(f64::NAN),
            mape: mean(&pct).unwrap_or(f64::NAN),
            step_mae,
            folds,
        }
    }

    /// MAE used for the band at `step` (0-based), falling back to the overall MAE.
    pub fn band_width(&self, step: usize) -> f64 {
        self.step_mae.get(step).copied().flatten().unwrap_or(self.mae)
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    pub target: String,
    pub origin: NaiveDate,
    pub model: &'static str,
    pub points: Vec<ForecastPoint>,
    pub score: ValidationScore,
    pub low_confidence: bool,
    /// Number of values (point or band) clamped into the value domain.
    pub clipped: usize,
}

impl ForecastResult {
    pub fn was_clipped(&self) -> bool {
        self.clipped > 0
    }

    pub fn horizon(&self) -> usize {
        self.points.len()
    }
}

#[derive(Debug)]
enum EngineState {
    Uninitialized,
    FeaturesReady {
        frame: FeatureFrame,
    },
    Trained {
        frame: FeatureFrame,
        score: ValidationScore,
        model: Box<dyn ForecastModel>,
    },
    Forecasted {
        result: ForecastResult,
    },
}

impl EngineState {
    fn name(&self) -> &'static str {
        match self {
            EngineState::Uninitialized => "Uninitialized",
            EngineState::FeaturesReady { .. } => "FeaturesReady",
            EngineState::Trained { .. } => "Trained",
            EngineState::Forecasted { .. } => "Forecasted",
        }
    }
}

#[derive(Debug)]
pub struct ForecastEngine {
    config: EngineConfig,
    state: EngineState,
}

impl ForecastEngine {
    pub fn new(config: EngineConfig) -> Result<Self, MinecastError> {
        config.validate()?;
        Ok(Self {
            config,
            state: EngineState::Uninitialized,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    /// Latest forecast, once the engine reached `Forecasted`.
    pub fn result(&self) -> Option<&ForecastResult> {
        match &self.state {
            EngineState::Forecasted { result } => Some(result),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.state = EngineState::Uninitialized;
    }

    /// Build the feature frame for `target`. Returns the number of usable rows.
    pub fn prepare(
        &mut self,
        store: &SeriesStore,
        target: &str,
        spec: FeatureSpec,
    ) -> Result<usize, MinecastError> {
        let state = std::mem::replace(&mut self.state, EngineState::Uninitialized);
        if !matches!(state, EngineState::Uninitialized) {
            return Err(invalid_state("Uninitialized", &state));
        }

        let frame = FeatureBuilder::new(spec)?.build(store, target)?;
        let rows = frame.rows().len();
        let minimum = self.config.min_rows();
        if rows < minimum {
            return Err(MinecastError::InsufficientHistory {
                target: target.to_string(),
                rows,
                minimum,
            });
        }
        self.state = EngineState::FeaturesReady { frame };
        Ok(rows)
    }

    /// Evaluate on rolling-origin folds, then refit on all rows.
    pub fn train(&mut self) -> Result<ValidationScore, MinecastError> {
        let frame = match std::mem::replace(&mut self.state, EngineState::Uninitialized) {
            EngineState::FeaturesReady { frame } => frame,
            other => return Err(invalid_state("FeaturesReady", &other)),
        };

        let folds = self.folds(&frame)?;
        let mut scores = Vec::with_capacity(folds.len());
        for fold in folds {
            let score = self.evaluate(&frame, fold)?;
            tracing::info!(
                target = frame.target(),
                fold = fold.index,
                cutoff = %fold.cutoff,
                train_rows = fold.train_rows,
                mae = score.mae,
                mape = score.mape,
                "fold evaluated"
            );
            scores.push(score);
        }
        let score = ValidationScore::from_folds(scores, self.config.horizon);

        let last = last_row_date(&frame)?;
        let mut model = self.config.model.build();
        model.fit(&frame, last)?;

        self.state = EngineState::Trained {
            frame,
            score: score.clone(),
            model,
        };
        Ok(score)
    }

    /// Forecast `horizon` days past the last usable row.
    pub fn forecast(&mut self) -> Result<ForecastResult, MinecastError> {
        let (frame, score, model) = match std::mem::replace(&mut self.state, EngineState::Uninitialized) {
            EngineState::Trained { frame, score, model } => (frame, score, model),
            other => return Err(invalid_state("Trained", &other)),
        };

        let origin = last_row_date(&frame)?;
        let horizon = self.config.horizon;
        let raw = model.forecast(&frame, origin, horizon)?;

        let domain = self.config.domain;
        let mut clipped = 0;
        let mut clip = |value: f64| {
            let (v, moved) = domain.clip(value);
            clipped += usize::from(moved);
            v
        };
        let points: Vec<ForecastPoint> = raw
            .iter()
            .enumerate()
            .map(|(step, &value)| {
                let width = self.config.band_z * score.band_width(step);
                ForecastPoint {
                    date: origin + Duration::days(step as i64 + 1),
                    point: clip(value),
                    lower: clip(value - width),
                    upper: clip(value + width),
                }
            })
            .collect();

        let low_confidence = !(score.mape <= self.config.mape_threshold);
        if low_confidence {
            tracing::warn!(
                target = frame.target(),
                mape = score.mape,
                threshold = self.config.mape_threshold,
                "low confidence forecast"
            );
        }
        if clipped > 0 {
            tracing::warn!(target = frame.target(), clipped, "forecast values clipped to domain");
        }

        let result = ForecastResult {
            target: frame.target().to_string(),
            origin,
            model: model.name(),
            points,
            score,
            low_confidence,
            clipped,
        };
        self.state = EngineState::Forecasted {
            result: result.clone(),
        };
        Ok(result)
    }

    /// `prepare`, `train` and `forecast` in one call.
    pub fn run(
        &mut self,
        store: &SeriesStore,
        target: &str,
        spec: FeatureSpec,
    ) -> Result<ForecastResult, MinecastError> {
        self.prepare(store, target, spec)?;
        self.train()?;
        self.forecast()
    }

    /// Rolling-origin splits over the frame, earliest first.
    pub fn folds(&self, frame: &FeatureFrame) -> Result<Vec<Fold>, MinecastError> {
        let last = last_row_date(frame)?;
        let horizon = self.config.horizon as i64;
        let stride = self.config.stride() as i64;
        let k = self.config.folds as i64;

        let mut folds = Vec::with_capacity(self.config.folds);
        for index in 0..k {
            let eval_end = last - Duration::days((k - 1 - index) * stride);
            let cutoff = eval_end - Duration::days(horizon);
            let train_rows = frame.rows_until(cutoff).len();
            if train_rows < self.config.horizon {
                return Err(MinecastError::InsufficientHistory {
                    target: frame.target().to_string(),
                    rows: train_rows,
                    minimum: self.config.horizon,
                });
            }
            folds.push(Fold {
                index: index as usize,
                cutoff,
                eval_start: cutoff + Duration::days(1),
                eval_end,
                train_rows,
            });
        }
        Ok(folds)
    }

    fn evaluate(&self, frame: &FeatureFrame, fold: Fold) -> Result<FoldScore, MinecastError> {
        let mut model = self.config.model.build();
        model.fit(frame, fold.cutoff)?;
        let predicted = model.forecast(frame, fold.cutoff, self.config.horizon)?;

        let mut abs_errors = Vec::with_capacity(predicted.len());
        let mut pct_errors = Vec::with_capacity(predicted.len());
        for (step, value) in predicted.iter().enumerate() {
            let date = fold.cutoff + Duration::days(step as i64 + 1);
            let actual = frame.history().target_at(date);
            let error = actual.map(|a| (value - a).abs());
            abs_errors.push(error);
            pct_errors.push(actual.zip(error).and_then(|(a, e)| (a != 0.0).then(|| e / a.abs())));
        }

        let abs: Vec<f64> = abs_errors.iter().flatten().copied().collect();
        let pct: Vec<f64> = pct_errors.iter().flatten().copied().collect();
        Ok(FoldScore {
            fold,
            mae: mean(&abs).unwrap_or(f64::NAN),
            mape: mean(&pct).unwrap_or(f64::NAN),
            abs_errors,
            pct_errors,
        })
    }
}

fn invalid_state(expected: &'static str, actual: &EngineState) -> MinecastError {
    MinecastError::InvalidState {
        expected,
        actual: actual.name(),
    }
}

fn last_row_date(frame: &FeatureFrame) -> Result<NaiveDate, MinecastError> {
    frame.last_date().ok_or_else(|| MinecastError::InsufficientHistory {
        target: frame.target().to_string(),
        rows: 0,
        minimum: 1,
    })
}
