//! Additive Holt-Winters exponential smoothing.
//!
//! level_t  = alpha * (y_t - s_{t-m}) + (1 - alpha) * (level + trend)
//! trend_t  = beta * (level_t - level_{t-1}) + (1 - beta) * trend
//! s_t      = gamma * (y_t - level_t) + (1 - gamma) * s_{t-m}
//! yhat_t+h = level + h * trend + s_{t+h-m}

use super::{ForecastModel, history_at};
use crate::domain::error::MinecastError;
use crate::domain::feature::FeatureFrame;
use chrono::NaiveDate;

pub const NAME: &str = "holt_winters";

#[derive(Debug, Clone, PartialEq)]
struct State {
    level: f64,
    trend: f64,
    seasonal: Vec<f64>,
    /// Number of observations smoothed; the next value's season index is
    /// `observed % m`.
    observed: usize,
}

#[derive(Debug, Clone)]
pub struct HoltWinters {
    alpha: f64,
    beta: f64,
    gamma: f64,
    season_length: usize,
    fitted: Option<(NaiveDate, State)>,
}

impl HoltWinters {
    pub fn new(alpha: f64, beta: f64, gamma: f64, season_length: usize) -> Self {
        Self {
            alpha,
            beta,
            gamma,
            season_length,
            fitted: None,
        }
    }

    fn smooth(&self, values: &[f64]) -> Option<State> {
        let m = self.season_length;
        if values.len() < 2 * m {
            return None;
        }
        let first = values[..m].iter().sum::<f64>() / m as f64;
        let second = values[m..2 * m].iter().sum::<f64>() / m as f64;

        let mut state = State {
            level: first,
            trend: (second - first) / m as f64,
            seasonal: values[..m].iter().map(|v| v - first).collect(),
            observed: m,
        };
        for &y in &values[m..] {
            let i = state.observed % m;
            let season = state.seasonal[i];
            let previous_level = state.level;
            state.level = self.alpha * (y - season) + (1.0 - self.alpha) * (state.level + state.trend);
            state.trend = self.beta * (state.level - previous_level) + (1.0 - self.beta) * state.trend;
            state.seasonal[i] = self.gamma * (y - state.level) + (1.0 - self.gamma) * season;
            state.observed += 1;
        }
        Some(state)
    }

    fn state_at(&self, frame: &FeatureFrame, origin: NaiveDate) -> Result<State, MinecastError> {
        let values = history_at(frame, origin)?.target_values();
        self.smooth(&values).ok_or_else(|| MinecastError::InsufficientHistory {
            target: frame.target().to_string(),
            rows: values.len(),
            minimum: 2 * self.season_length,
        })
    }
}

impl ForecastModel for HoltWinters {
    fn name(&self) -> &'static str {
        NAME
    }

    fn fit(&mut self, frame: &FeatureFrame, cutoff: NaiveDate) -> Result<(), MinecastError> {
        let state = self.state_at(frame, cutoff)?;
        tracing::debug!(
            target = frame.target(),
            %cutoff,
            level = state.level,
            trend = state.trend,
            "fitted holt-winters"
        );
        self.fitted = Some((cutoff, state));
        Ok(())
    }

    fn forecast(
        &self,
        frame: &FeatureFrame,
        origin: NaiveDate,
        horizon: usize,
    ) -> Result<Vec<f64>, MinecastError> {
        let state = match &self.fitted {
            Some((cutoff, state)) if *cutoff == origin => state.clone(),
            Some(_) => self.state_at(frame, origin)?,
            None => {
                return Err(MinecastError::InvalidState {
                    expected: "fitted model",
                    actual: "unfitted model",
                });
            }
        };
        let m = self.season_length;
        Ok((1..=horizon)
            .map(|h| {
                let season = state.seasonal[(state.observed + h - 1) % m];
                state.level + h as f64 * state.trend + season
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::feature::{FeatureBuilder, FeatureSpec};
    use crate::domain::series::RawSeries;
    use crate::domain::series_store::{CalendarPolicy, ConflictPolicy, SeriesStore};
    use approx::assert_abs_diff_eq;
    use chrono::Duration;

    fn frame(values: &[f64]) -> FeatureFrame {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let points = values
            .iter()
            .enumerate()
            .map(|(i, &v)| (start + Duration::days(i as i64), v))
            .collect();
        let store = SeriesStore::build(
            vec![RawSeries::new("cm", "hashrate", points).unwrap()],
            &CalendarPolicy::new(ConflictPolicy::Fail),
        )
        .unwrap();
        FeatureBuilder::new(FeatureSpec::lags(&[1]))
            .unwrap()
            .build(&store, "hashrate")
            .unwrap()
    }

    #[test]
    fn constant_series_forecasts_constant() {
        let frame = frame(&[42.0; 28]);
        let origin = frame.last_date().unwrap();
        let mut model = HoltWinters::new(0.3, 0.1, 0.1, 7);
        model.fit(&frame, origin).unwrap();
        for v in model.forecast(&frame, origin, 5).unwrap() {
            assert_abs_diff_eq!(v, 42.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn pure_weekly_pattern_repeats() {
        let week = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let values: Vec<f64> = week.iter().copied().cycle().take(35).collect();
        let frame = frame(&values);
        let origin = frame.last_date().unwrap();
        let mut model = HoltWinters::new(0.5, 0.1, 0.3, 7);
        model.fit(&frame, origin).unwrap();
        let forecast = model.forecast(&frame, origin, 7).unwrap();
        for (got, want) in forecast.iter().zip(week) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-9);
        }
    }

    #[test]
    fn short_history_is_insufficient() {
        let frame = frame(&[1.0; 10]);
        let mut model = HoltWinters::new(0.3, 0.1, 0.1, 7);
        let err = model.fit(&frame, frame.last_date().unwrap()).unwrap_err();
        assert!(matches!(err, MinecastError::InsufficientHistory { minimum: 14, .. }));
    }

    #[test]
    fn forecast_from_earlier_origin_refits_state() {
        let values: Vec<f64> = (0..40).map(|i| 10.0 + i as f64).collect();
        let frame = frame(&values);
        let last = frame.last_date().unwrap();
        let earlier = last - Duration::days(10);

        let mut model = HoltWinters::new(0.3, 0.1, 0.1, 7);
        model.fit(&frame, last).unwrap();
        let mut direct = HoltWinters::new(0.3, 0.1, 0.1, 7);
        direct.fit(&frame, earlier).unwrap();
        assert_eq!(
            model.forecast(&frame, earlier, 3).unwrap(),
            direct.forecast(&frame, earlier, 3).unwrap()
        );
    }
}
