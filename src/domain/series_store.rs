//! Multi-source alignment onto a unified daily calendar.
//!
//! Sources are appended to a [`SeriesStoreBuilder`] and finalised into an
//! immutable [`SeriesStore`]. Every field supplied by more than one source is
//! reconciled with an explicit [`ConflictPolicy`]; interior gaps are
//! forward-filled up to [`CalendarPolicy::max_fill_gap`] days and marked missing
//! beyond that.

use crate::domain::error::MinecastError;
use crate::domain::series::{GroupedRecords, Observation, RawRecord, RawSeries, Series};
use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_MAX_FILL_GAP: usize = 3;

/// Tie-break for two or more sources reporting different values on one date.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictPolicy {
    /// Earlier source names win. Sources missing from the list never win.
    Precedence(Vec<String>),
    Average,
    Fail,
}

impl ConflictPolicy {
    pub fn prefer_first<S: AsRef<str>>(order: &[S]) -> Self {
        ConflictPolicy::Precedence(order.iter().map(|s| s.as_ref().to_string()).collect())
    }

    fn rank(&self, source: &str) -> Option<usize> {
        match self {
            ConflictPolicy::Precedence(order) => order.iter().position(|s| s == source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarPolicy {
    pub max_fill_gap: usize,
    pub conflict: ConflictPolicy,
}

impl CalendarPolicy {
    pub fn new(conflict: ConflictPolicy) -> Self {
        Self {
            max_fill_gap: DEFAULT_MAX_FILL_GAP,
            conflict,
        }
    }
}

/// Merged points of one field plus the number of dates where sources disagreed.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub series: RawSeries,
    pub conflicts: usize,
}

/// Merge two sources of the same field.
pub fn merge_overlap(
    a: &RawSeries,
    b: &RawSeries,
    policy: &ConflictPolicy,
) -> Result<MergeOutcome, MinecastError> {
    merge_sources(&[a, b], policy)
}

/// N-way merge of sources reporting the same field.
pub fn merge_sources(
    sources: &[&RawSeries],
    policy: &ConflictPolicy,
) -> Result<MergeOutcome, MinecastError> {
    let field = sources
        .first()
        .map(|s| s.field.clone())
        .unwrap_or_default();

    let mut by_date: BTreeMap<NaiveDate, Vec<(&str, f64)>> = BTreeMap::new();
    for source in sources {
        for &(date, value) in &source.points {
            by_date
                .entry(date)
                .or_default()
                .push((source.source.as_str(), value));
        }
    }

    let mut conflicts = 0;
    let mut points = Vec::with_capacity(by_date.len());

    for (date, candidates) in by_date {
        let first = candidates[0].1;
        if candidates.iter().all(|(_, v)| *v == first) {
            points.push((date, first));
            continue;
        }

        conflicts += 1;
        let value = match policy {
            ConflictPolicy::Average => {
                candidates.iter().map(|(_, v)| v).sum::<f64>() / candidates.len() as f64
            }
            ConflictPolicy::Precedence(_) => candidates
                .iter()
                .filter_map(|(s, v)| policy.rank(s).map(|r| (r, *v)))
                .min_by_key(|(r, _)| *r)
                .map(|(_, v)| v)
                .ok_or_else(|| MinecastError::Conflict {
                    series: field.clone(),
                    date,
                    reason: format!(
                        "no precedence for sources {}",
                        candidates
                            .iter()
                            .map(|(s, _)| *s)
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                })?,
            ConflictPolicy::Fail => {
                return Err(MinecastError::Conflict {
                    series: field.clone(),
                    date,
                    reason: candidates
                        .iter()
                        .map(|(s, v)| format!("{s}={v}"))
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
        };
        points.push((date, value));
    }

    let source = sources
        .iter()
        .map(|s| s.source.as_str())
        .collect::<Vec<_>>()
        .join("+");

    Ok(MergeOutcome {
        series: RawSeries {
            source,
            field,
            points,
        },
        conflicts,
    })
}

/// Per-series alignment statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesReport {
    pub sources: Vec<String>,
    pub observed: usize,
    pub filled: usize,
    pub missing: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlignmentReport {
    pub series: BTreeMap<String, SeriesReport>,
    pub conflicts_resolved: usize,
    pub duplicate_records: usize,
    pub non_finite_records: usize,
}

/// Append-only collector of raw sources.
#[derive(Debug, Default)]
pub struct SeriesStoreBuilder {
    sources: Vec<RawSeries>,
    duplicate_records: usize,
    non_finite_records: usize,
}

impl SeriesStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, source: RawSeries) -> &mut Self {
        self.sources.push(source);
        self
    }

    pub fn add_records(&mut self, records: &[RawRecord]) -> &mut Self {
        let GroupedRecords {
            series,
            duplicates,
            non_finite,
        } = RawSeries::group(records);
        if duplicates > 0 || non_finite > 0 {
            tracing::warn!(duplicates, non_finite, "rejected raw records");
        }
        self.duplicate_records += duplicates;
        self.non_finite_records += non_finite;
        self.sources.extend(series);
        self
    }

    pub fn finalize(self, policy: &CalendarPolicy) -> Result<SeriesStore, MinecastError> {
        let mut by_field: BTreeMap<String, Vec<&RawSeries>> = BTreeMap::new();
        for source in &self.sources {
            if source.points.is_empty() {
                tracing::warn!(source = %source.source, field = %source.field, "skipping empty source");
                continue;
            }
            by_field.entry(source.field.clone()).or_default().push(source);
        }

        if by_field.is_empty() {
            return Err(MinecastError::Alignment {
                reason: "no non-empty sources".into(),
            });
        }

        let mut report = AlignmentReport {
            duplicate_records: self.duplicate_records,
            non_finite_records: self.non_finite_records,
            ..AlignmentReport::default()
        };
        let mut merged = Vec::with_capacity(by_field.len());
        for (field, sources) in &by_field {
            let outcome = merge_sources(sources, &policy.conflict)?;
            if outcome.conflicts > 0 {
                tracing::info!(series = %field, conflicts = outcome.conflicts, "resolved source conflicts");
            }
            report.conflicts_resolved += outcome.conflicts;
            let names = sources.iter().map(|s| s.source.clone()).collect();
            merged.push((outcome.series, names));
        }

        let start = merged
            .iter()
            .filter_map(|(s, _)| s.first_date())
            .max()
            .ok_or_else(|| MinecastError::Alignment {
                reason: "no dated observations".into(),
            })?;
        let end = merged
            .iter()
            .filter_map(|(s, _)| s.last_date())
            .min()
            .ok_or_else(|| MinecastError::Alignment {
                reason: "no dated observations".into(),
            })?;

        if end <= start {
            return Err(MinecastError::Alignment {
                reason: format!(
                    "fewer than two overlapping dates across sources (overlap {start} to {end})"
                ),
            });
        }

        let calendar = build_calendar(start, end);
        let mut series = BTreeMap::new();

        for (raw, sources) in merged {
            let (aligned, stats) = align(&raw, &calendar, policy.max_fill_gap)?;
            if stats.missing > 0 {
                tracing::warn!(
                    series = %raw.field,
                    missing = stats.missing,
                    max_fill_gap = policy.max_fill_gap,
                    "dates left missing after forward fill"
                );
            }
            tracing::debug!(series = %raw.field, filled = stats.filled, "aligned series");
            report.series.insert(
                raw.field.clone(),
                SeriesReport {
                    sources,
                    observed: stats.observed,
                    filled: stats.filled,
                    missing: stats.missing,
                },
            );
            series.insert(raw.field.clone(), aligned);
        }

        Ok(SeriesStore {
            calendar,
            series,
            report,
        })
    }
}

struct AlignStats {
    observed: usize,
    filled: usize,
    missing: usize,
}

fn build_calendar(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let days = (end - start).num_days();
    (0..=days).map(|i| start + Duration::days(i)).collect()
}

fn align(
    raw: &RawSeries,
    calendar: &[NaiveDate],
    max_fill_gap: usize,
) -> Result<(Series, AlignStats), MinecastError> {
    let mut stats = AlignStats {
        observed: 0,
        filled: 0,
        missing: 0,
    };
    let mut cursor = 0;
    let mut last_observed: Option<(NaiveDate, f64)> = None;
    let mut points = Vec::with_capacity(calendar.len());

    for &date in calendar {
        while cursor < raw.points.len() && raw.points[cursor].0 < date {
            last_observed = Some(raw.points[cursor]);
            cursor += 1;
        }

        let value = if cursor < raw.points.len() && raw.points[cursor].0 == date {
            stats.observed += 1;
            Some(raw.points[cursor].1)
        } else {
            match last_observed {
                Some((seen, v)) if (date - seen).num_days() as usize <= max_fill_gap => {
                    stats.filled += 1;
                    Some(v)
                }
                _ => {
                    stats.missing += 1;
                    None
                }
            }
        };
        points.push(Observation { date, value });
    }

    Ok((Series::new(raw.field.clone(), points)?, stats))
}

/// Immutable set of aligned series sharing one daily calendar.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    calendar: Vec<NaiveDate>,
    series: BTreeMap<String, Series>,
    report: AlignmentReport,
}

impl SeriesStore {
    pub fn build(
        sources: Vec<RawSeries>,
        policy: &CalendarPolicy,
    ) -> Result<SeriesStore, MinecastError> {
        let mut builder = SeriesStoreBuilder::new();
        for source in sources {
            builder.add_source(source);
        }
        builder.finalize(policy)
    }

    pub fn get(&self, name: &str) -> Result<&Series, MinecastError> {
        self.series.get(name).ok_or_else(|| MinecastError::NotFound {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.series.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.series.keys().map(|k| k.as_str()).collect()
    }

    pub fn calendar(&self) -> &[NaiveDate] {
        &self.calendar
    }

    pub fn start(&self) -> NaiveDate {
        self.calendar[0]
    }

    pub fn end(&self) -> NaiveDate {
        self.calendar[self.calendar.len() - 1]
    }

    pub fn report(&self) -> &AlignmentReport {
        &self.report
    }

    /// New store including `series`, which must cover exactly this calendar.
    pub fn with_series(&self, series: Series) -> Result<SeriesStore, MinecastError> {
        if self.series.contains_key(series.name()) {
            return Err(MinecastError::InvalidSeries {
                name: series.name().to_string(),
                reason: "a series with this name already exists".into(),
            });
        }
        let dates: BTreeSet<NaiveDate> = series.points().iter().map(|p| p.date).collect();
        if series.len() != self.calendar.len() || !self.calendar.iter().all(|d| dates.contains(d))
        {
            return Err(MinecastError::Alignment {
                reason: format!("series {} is not on the store calendar", series.name()),
            });
        }

        let mut store = self.clone();
        store.report.series.insert(
            series.name().to_string(),
            SeriesReport {
                sources: vec!["derived".into()],
                observed: series.present_count(),
                filled: 0,
                missing: series.missing_count(),
            },
        );
        store.series.insert(series.name().to_string(), series);
        Ok(store)
    }
}
