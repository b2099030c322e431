//! Leakage-free feature construction.
//!
//! This module provides:
//! - `FeatureKind`: one engineered predictor (lag, rolling statistic, calendar)
//! - `FeatureSpec`: the ordered list of predictors for a target
//! - `FeatureBuilder`: turns a `SeriesStore` into a `FeatureFrame`
//! - `FeatureFrame`: date-indexed predictor rows plus the target column
//!
//! No-look-ahead: a lag of k days at row T reads T-k; predictive rolling
//! windows cover [T-w, T-1]. Contemporaneous rolling windows cover
//! [T-w+1, T] and are never fed to a forecasting model.

pub mod history;
pub mod rolling;

pub use history::{History, Undefined};
pub use rolling::RollingStat;

use crate::domain::error::MinecastError;
use crate::domain::halving::HalvingSchedule;
use crate::domain::series_store::SeriesStore;
use chrono::{Datelike, Duration, NaiveDate};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    /// Value `days` before the row date. `series: None` is the target.
    Lag { series: Option<String>, days: usize },
    Rolling {
        series: Option<String>,
        window: usize,
        stat: RollingStat,
        contemporaneous: bool,
    },
    DayOfWeek,
    DaysSinceHalving,
}

impl FeatureKind {
    pub fn lag(days: usize) -> Self {
        FeatureKind::Lag { series: None, days }
    }

    pub fn rolling(window: usize, stat: RollingStat) -> Self {
        FeatureKind::Rolling {
            series: None,
            window,
            stat,
            contemporaneous: false,
        }
    }

    pub fn is_contemporaneous(&self) -> bool {
        matches!(
            self,
            FeatureKind::Rolling {
                contemporaneous: true,
                ..
            }
        )
    }

    fn series(&self) -> Option<&str> {
        match self {
            FeatureKind::Lag { series, .. } | FeatureKind::Rolling { series, .. } => {
                series.as_deref()
            }
            _ => None,
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureKind::Lag { series: None, days } => write!(f, "LAG({})", days),
            FeatureKind::Lag {
                series: Some(s),
                days,
            } => write!(f, "LAG({},{})", s, days),
            FeatureKind::Rolling {
                series,
                window,
                stat,
                contemporaneous,
            } => {
                let suffix = if *contemporaneous { "_NOW" } else { "" };
                match series {
                    None => write!(f, "{}{}({})", stat, suffix, window),
                    Some(s) => write!(f, "{}{}({},{})", stat, suffix, s, window),
                }
            }
            FeatureKind::DayOfWeek => write!(f, "DOW"),
            FeatureKind::DaysSinceHalving => write!(f, "DAYS_SINCE_HALVING"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSpec {
    pub features: Vec<FeatureKind>,
    pub schedule: HalvingSchedule,
}

impl Default for FeatureSpec {
    /// Lags {1, 7, 14, 30}; mean/std/min/max over {7, 30, 90}; day of week;
    /// days since halving.
    fn default() -> Self {
        let mut features: Vec<FeatureKind> =
            [1, 7, 14, 30].into_iter().map(FeatureKind::lag).collect();
        for window in [7, 30, 90] {
            for stat in [
                RollingStat::Mean,
                RollingStat::Std,
                RollingStat::Min,
                RollingStat::Max,
            ] {
                features.push(FeatureKind::rolling(window, stat));
            }
        }
        features.push(FeatureKind::DayOfWeek);
        features.push(FeatureKind::DaysSinceHalving);
        Self::new(features)
    }
}

impl FeatureSpec {
    pub fn new(features: Vec<FeatureKind>) -> Self {
        Self {
            features,
            schedule: HalvingSchedule::default(),
        }
    }

    pub fn lags(days: &[usize]) -> Self {
        Self::new(days.iter().copied().map(FeatureKind::lag).collect())
    }

    pub fn with_schedule(mut self, schedule: HalvingSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn validate(&self) -> Result<(), MinecastError> {
        let invalid = |reason: String| Err(MinecastError::InvalidFeatureSpec { reason });

        for (i, feature) in self.features.iter().enumerate() {
            if self.features[..i].contains(feature) {
                return invalid(format!("duplicate feature {feature}"));
            }
            match feature {
                FeatureKind::Lag { days: 0, .. } => {
                    return invalid("lag offsets must be at least 1 day".into());
                }
                FeatureKind::Rolling { window, stat, .. } if *window < stat.min_window() => {
                    return invalid(format!(
                        "{feature}: window must be at least {}",
                        stat.min_window()
                    ));
                }
                _ => {}
            }
        }

        if !self.features.iter().any(|f| !f.is_contemporaneous()) {
            return invalid("at least one predictive feature is required".into());
        }
        Ok(())
    }

    /// Distinct exogenous series referenced by the features, in first-use order.
    pub fn exogenous_series(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.features.iter().filter_map(|f| f.series()) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureColumn {
    pub name: String,
    pub kind: FeatureKind,
    pub contemporaneous: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub values: Vec<f64>,
    pub target: f64,
}

/// Counts of calendar dates that did not become rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DropReport {
    pub insufficient_history: usize,
    pub missing_value: usize,
    pub missing_target: usize,
}

impl DropReport {
    pub fn total(&self) -> usize {
        self.insufficient_history + self.missing_value + self.missing_target
    }
}

#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    spec: FeatureSpec,
    columns: Vec<FeatureColumn>,
}

impl FeatureBuilder {
    pub fn new(spec: FeatureSpec) -> Result<Self, MinecastError> {
        spec.validate()?;
        let columns = spec
            .features
            .iter()
            .map(|kind| FeatureColumn {
                name: kind.to_string(),
                kind: kind.clone(),
                contemporaneous: kind.is_contemporaneous(),
            })
            .collect();
        Ok(Self { spec, columns })
    }

    pub fn spec(&self) -> &FeatureSpec {
        &self.spec
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn build(&self, store: &SeriesStore, target: &str) -> Result<FeatureFrame, MinecastError> {
        let exogenous = self.spec.exogenous_series();
        let history = History::from_store(store, target, &exogenous)?;

        let mut rows = Vec::with_capacity(store.calendar().len());
        let mut dropped = DropReport::default();

        for &date in store.calendar() {
            let Some(target_value) = history.target_at(date) else {
                dropped.missing_target += 1;
                continue;
            };
            match self.feature_row(&history, date) {
                Ok(values) => rows.push(FeatureRow {
                    date,
                    values,
                    target: target_value,
                }),
                Err(Undefined::InsufficientHistory) => dropped.insufficient_history += 1,
                Err(Undefined::MissingValue) => dropped.missing_value += 1,
            }
        }

        tracing::info!(
            target,
            rows = rows.len(),
            dropped = dropped.total(),
            insufficient_history = dropped.insufficient_history,
            missing_value = dropped.missing_value,
            missing_target = dropped.missing_target,
            "built feature frame"
        );

        Ok(FeatureFrame {
            target: target.to_string(),
            builder: self.clone(),
            rows,
            dropped,
            history,
        })
    }

    /// Feature values for `date`, reading only what the no-look-ahead rule allows.
    pub fn feature_row(&self, history: &History, date: NaiveDate) -> Result<Vec<f64>, Undefined> {
        self.spec
            .features
            .iter()
            .map(|feature| self.feature_value(feature, history, date))
            .collect()
    }

    /// Like [`feature_row`](Self::feature_row) but restricted to the
    /// non-contemporaneous columns, in column order. Used when extending a
    /// history one day at a time, where the row date itself is unknown.
    pub fn predictive_row(&self, history: &History, date: NaiveDate) -> Result<Vec<f64>, Undefined> {
        self.spec
            .features
            .iter()
            .filter(|feature| !feature.is_contemporaneous())
            .map(|feature| self.feature_value(feature, history, date))
            .collect()
    }

    fn feature_value(
        &self,
        feature: &FeatureKind,
        history: &History,
        date: NaiveDate,
    ) -> Result<f64, Undefined> {
        match feature {
            FeatureKind::Lag { series, days } => {
                history.lookup(series.as_deref(), date - Duration::days(*days as i64))
            }
            FeatureKind::Rolling {
                series,
                window,
                stat,
                contemporaneous,
            } => {
                let end = if *contemporaneous {
                    date
                } else {
                    date - Duration::days(1)
                };
                let mut values = Vec::with_capacity(*window);
                for back in (0..*window).rev() {
                    values.push(history.lookup(series.as_deref(), end - Duration::days(back as i64))?);
                }
                Ok(stat.apply(&values))
            }
            FeatureKind::DayOfWeek => Ok(date.weekday().num_days_from_monday() as f64),
            FeatureKind::DaysSinceHalving => self
                .spec
                .schedule
                .days_since_halving(date)
                .map(|d| d as f64)
                .ok_or(Undefined::InsufficientHistory),
        }
    }
}

/// Predictor rows for one target, plus the history needed to extend them.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    target: String,
    builder: FeatureBuilder,
    rows: Vec<FeatureRow>,
    dropped: DropReport,
    history: History,
}

impl FeatureFrame {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn builder(&self) -> &FeatureBuilder {
        &self.builder
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        self.builder.columns()
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn dropped(&self) -> DropReport {
        self.dropped
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date)
    }

    /// Rows dated on or before `cutoff`.
    pub fn rows_until(&self, cutoff: NaiveDate) -> &[FeatureRow] {
        let end = self.rows.partition_point(|r| r.date <= cutoff);
        &self.rows[..end]
    }

    /// Indices of the columns a forecasting model may use.
    pub fn predictive_indices(&self) -> Vec<usize> {
        self.columns()
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.contemporaneous)
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::series::RawSeries;
    use crate::domain::series_store::{CalendarPolicy, ConflictPolicy};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn store_from(values: &[f64]) -> SeriesStore {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, &v)| (start() + Duration::days(i as i64), v))
            .collect();
        SeriesStore::build(
            vec![RawSeries::new("cm", "difficulty", points).unwrap()],
            &CalendarPolicy::new(ConflictPolicy::Fail),
        )
        .unwrap()
    }

    #[test]
    fn display_names() {
        assert_eq!(FeatureKind::lag(7).to_string(), "LAG(7)");
        assert_eq!(
            FeatureKind::Lag {
                series: Some("hashrate".into()),
                days: 1
            }
            .to_string(),
            "LAG(hashrate,1)"
        );
        assert_eq!(FeatureKind::rolling(30, RollingStat::Std).to_string(), "STD(30)");
        assert_eq!(
            FeatureKind::Rolling {
                series: None,
                window: 7,
                stat: RollingStat::Mean,
                contemporaneous: true
            }
            .to_string(),
            "MEAN_NOW(7)"
        );
    }

    #[test]
    fn validate_rejects_zero_lag() {
        let err = FeatureSpec::lags(&[0, 1]).validate().unwrap_err();
        assert!(matches!(err, MinecastError::InvalidFeatureSpec { .. }));
    }

    #[test]
    fn validate_rejects_std_window_one() {
        let spec = FeatureSpec::new(vec![FeatureKind::rolling(1, RollingStat::Std)]);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn validate_requires_predictive_feature() {
        let spec = FeatureSpec::new(vec![FeatureKind::Rolling {
            series: None,
            window: 3,
            stat: RollingStat::Mean,
            contemporaneous: true,
        }]);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicates() {
        assert!(FeatureSpec::lags(&[1, 1]).validate().is_err());
    }

    #[test]
    fn default_spec_is_valid() {
        assert!(FeatureSpec::default().validate().is_ok());
        assert_eq!(FeatureSpec::default().features.len(), 4 + 12 + 2);
    }

    #[test]
    fn lags_read_past_values() {
        let store = store_from(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let builder = FeatureBuilder::new(FeatureSpec::lags(&[1, 2])).unwrap();
        let frame = builder.build(&store, "difficulty").unwrap();

        assert_eq!(frame.rows().len(), 3);
        assert_eq!(frame.dropped().insufficient_history, 2);
        let first = &frame.rows()[0];
        assert_eq!(first.date, start() + Duration::days(2));
        assert_eq!(first.values, vec![11.0, 10.0]);
        assert_eq!(first.target, 12.0);
    }

    #[test]
    fn predictive_rolling_excludes_row_date() {
        let store = store_from(&[1.0, 2.0, 3.0, 4.0]);
        let spec = FeatureSpec::new(vec![
            FeatureKind::rolling(2, RollingStat::Mean),
            FeatureKind::Rolling {
                series: None,
                window: 2,
                stat: RollingStat::Mean,
                contemporaneous: true,
            },
        ]);
        let frame = FeatureBuilder::new(spec).unwrap().build(&store, "difficulty").unwrap();

        let row = frame.rows().last().unwrap();
        assert_eq!(row.target, 4.0);
        assert_eq!(row.values[0], 2.5);
        assert_eq!(row.values[1], 3.5);
        assert_eq!(frame.predictive_indices(), vec![0]);
    }

    #[test]
    fn calendar_features() {
        let store = store_from(&[1.0, 2.0, 3.0]);
        let spec = FeatureSpec::new(vec![
            FeatureKind::lag(1),
            FeatureKind::DayOfWeek,
            FeatureKind::DaysSinceHalving,
        ]);
        let frame = FeatureBuilder::new(spec).unwrap().build(&store, "difficulty").unwrap();
        let row = &frame.rows()[0];
        // 2024-01-02 is a Tuesday; last halving 2020-05-11
        assert_eq!(row.values[1], 1.0);
        let expected = (row.date - NaiveDate::from_ymd_opt(2020, 5, 11).unwrap()).num_days();
        assert_eq!(row.values[2], expected as f64);
    }

    #[test]
    fn rows_until_is_inclusive() {
        let store = store_from(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let frame = FeatureBuilder::new(FeatureSpec::lags(&[1]))
            .unwrap()
            .build(&store, "difficulty")
            .unwrap();
        let cutoff = start() + Duration::days(2);
        let rows = frame.rows_until(cutoff);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.last().unwrap().date, cutoff);
    }

    #[test]
    fn missing_exogenous_series_is_not_found() {
        let store = store_from(&[1.0, 2.0, 3.0]);
        let spec = FeatureSpec::new(vec![FeatureKind::Lag {
            series: Some("hashrate".into()),
            days: 1,
        }]);
        let err = FeatureBuilder::new(spec)
            .unwrap()
            .build(&store, "difficulty")
            .unwrap_err();
        assert!(matches!(err, MinecastError::NotFound { .. }));
    }
}
