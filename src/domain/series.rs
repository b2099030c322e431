//! Date-indexed numeric series and raw ingestion records.

use crate::domain::error::MinecastError;
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

/// Canonical field names shared by adapters and derivations.
pub const DIFFICULTY: &str = "difficulty";
pub const HASHRATE: &str = "hashrate";
pub const PRICE: &str = "price";
pub const FEES: &str = "fees";

/// One (date, value) pair. `None` marks an explicitly missing value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

/// A named, strictly increasing sequence of observations.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    name: String,
    points: Vec<Observation>,
}

impl Series {
    pub fn new(name: impl Into<String>, points: Vec<Observation>) -> Result<Self, MinecastError> {
        let name = name.into();
        for pair in points.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(MinecastError::InvalidSeries {
                    name,
                    reason: format!(
                        "dates must be strictly increasing ({} follows {})",
                        pair[1].date, pair[0].date
                    ),
                });
            }
        }
        if let Some(bad) = points
            .iter()
            .find(|p| p.value.is_some_and(|v| !v.is_finite()))
        {
            return Err(MinecastError::InvalidSeries {
                name,
                reason: format!("non-finite value on {}", bad.date),
            });
        }
        Ok(Self { name, points })
    }

    /// Contiguous daily series starting at `start`.
    pub fn from_values(
        name: impl Into<String>,
        start: NaiveDate,
        values: &[f64],
    ) -> Result<Self, MinecastError> {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, &v)| Observation {
                date: start + Duration::days(i as i64),
                value: Some(v),
            })
            .collect();
        Self::new(name, points)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points(&self) -> &[Observation] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn value_at(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .and_then(|i| self.points[i].value)
    }

    /// Last date carrying a present value.
    pub fn last_present_date(&self) -> Option<NaiveDate> {
        self.points
            .iter()
            .rev()
            .find(|p| p.value.is_some())
            .map(|p| p.date)
    }

    pub fn present_count(&self) -> usize {
        self.points.iter().filter(|p| p.value.is_some()).count()
    }

    pub fn missing_count(&self) -> usize {
        self.points.len() - self.present_count()
    }

    /// True when consecutive dates are exactly one day apart.
    pub fn is_contiguous(&self) -> bool {
        self.points
            .windows(2)
            .all(|w| w[1].date - w[0].date == Duration::days(1))
    }

    pub fn renamed(&self, name: impl Into<String>) -> Series {
        Series {
            name: name.into(),
            points: self.points.clone(),
        }
    }
}

/// A single raw value as supplied by an ingestion collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub source: String,
    pub date: NaiveDate,
    pub field: String,
    pub value: f64,
}

/// All observations of one field from one source, sorted and de-duplicated.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    pub source: String,
    pub field: String,
    pub points: Vec<(NaiveDate, f64)>,
}

/// Result of grouping raw records into per-source series.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedRecords {
    pub series: Vec<RawSeries>,
    pub duplicates: usize,
    pub non_finite: usize,
}

impl RawSeries {
    /// Points in any order; a date may appear only once.
    pub fn new(source: &str, field: &str, mut points: Vec<(NaiveDate, f64)>) -> Result<Self, MinecastError> {
        points.sort_by_key(|(d, _)| *d);
        if let Some(pair) = points.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(MinecastError::InvalidSeries {
                name: format!("{source}.{field}"),
                reason: format!("duplicate date {}", pair[0].0),
            });
        }
        Ok(Self {
            source: source.to_string(),
            field: field.to_string(),
            points,
        })
    }

    /// Group records by (source, field). A repeated date within one source and
    /// field keeps the first value and is counted as a duplicate.
    pub fn group(records: &[RawRecord]) -> GroupedRecords {
        let mut grouped: BTreeMap<(String, String), BTreeMap<NaiveDate, f64>> = BTreeMap::new();
        let mut duplicates = 0;
        let mut non_finite = 0;

        for record in records {
            if !record.value.is_finite() {
                non_finite += 1;
                continue;
            }
            let entry = grouped
                .entry((record.source.clone(), record.field.clone()))
                .or_default();
            if entry.contains_key(&record.date) {
                duplicates += 1;
            } else {
                entry.insert(record.date, record.value);
            }
        }

        let series = grouped
            .into_iter()
            .map(|((source, field), points)| RawSeries {
                source,
                field,
                points: points.into_iter().collect(),
            })
            .collect();

        GroupedRecords {
            series,
            duplicates,
            non_finite,
        }
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|(d, _)| *d)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|(d, _)| *d)
    }
}
