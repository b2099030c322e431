//! Day-indexed value history for the target and exogenous series.

use crate::domain::error::MinecastError;
use crate::domain::series_store::SeriesStore;
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

/// Why a lookup produced no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Undefined {
    /// The date precedes the start of the history.
    InsufficientHistory,
    /// The date is inside the history but its value is missing.
    MissingValue,
}

/// Values on a contiguous daily calendar starting at `start`.
#[derive(Debug, Clone, PartialEq)]
pub struct History {
    start: NaiveDate,
    target: Vec<Option<f64>>,
    exogenous: BTreeMap<String, Vec<Option<f64>>>,
}

impl History {
    pub fn from_store(
        store: &SeriesStore,
        target: &str,
        exogenous: &[&str],
    ) -> Result<Self, MinecastError> {
        let values = |name: &str| -> Result<Vec<Option<f64>>, MinecastError> {
            Ok(store.get(name)?.points().iter().map(|p| p.value).collect())
        };

        let mut exo = BTreeMap::new();
        for name in exogenous {
            exo.insert(name.to_string(), values(name)?);
        }

        Ok(Self {
            start: store.start(),
            target: values(target)?,
            exogenous: exo,
        })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.start + Duration::days(self.target.len() as i64 - 1)
    }

    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    fn index(&self, date: NaiveDate) -> Result<usize, Undefined> {
        let offset = (date - self.start).num_days();
        if offset < 0 {
            return Err(Undefined::InsufficientHistory);
        }
        let offset = offset as usize;
        if offset >= self.target.len() {
            return Err(Undefined::MissingValue);
        }
        Ok(offset)
    }

    /// Value of `series` (`None` = target) on `date`.
    pub fn lookup(&self, series: Option<&str>, date: NaiveDate) -> Result<f64, Undefined> {
        let i = self.index(date)?;
        let values = match series {
            None => &self.target,
            Some(name) => self
                .exogenous
                .get(name)
                .ok_or(Undefined::MissingValue)?,
        };
        values
            .get(i)
            .copied()
            .flatten()
            .ok_or(Undefined::MissingValue)
    }

    pub fn target_at(&self, date: NaiveDate) -> Option<f64> {
        self.lookup(None, date).ok()
    }

    /// Copy truncated after `last` (inclusive end).
    pub fn truncated(&self, last: NaiveDate) -> History {
        let keep = ((last - self.start).num_days() + 1).clamp(0, self.target.len() as i64) as usize;
        History {
            start: self.start,
            target: self.target[..keep].to_vec(),
            exogenous: self
                .exogenous
                .iter()
                .map(|(k, v)| (k.clone(), v[..keep].to_vec()))
                .collect(),
        }
    }

    /// Replace missing values with the last known value of the same series.
    /// Leading missing values stay missing.
    pub fn carry_forward(&mut self) {
        fn fill(values: &mut [Option<f64>]) {
            let mut last = None;
            for v in values.iter_mut() {
                match v {
                    Some(x) => last = Some(*x),
                    None => *v = last,
                }
            }
        }
        fill(&mut self.target);
        for values in self.exogenous.values_mut() {
            fill(values);
        }
    }

    /// Append the next day: the target takes `value`, exogenous series hold
    /// their last value.
    pub fn push_target(&mut self, value: f64) {
        self.target.push(Some(value));
        for values in self.exogenous.values_mut() {
            let last = values.last().copied().flatten();
            values.push(last);
        }
    }

    /// Present target values in calendar order.
    pub fn target_values(&self) -> Vec<f64> {
        self.target.iter().flatten().copied().collect()
    }
}
