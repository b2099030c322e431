//! Mining concentration (Herfindahl-Hirschman Index) from pool block counts.
//!
//! HHI[d] = sum over pools of share[d, pool]^2, where share is the pool's
//! fraction of that day's blocks. `HhiScale::Percent` squares percentage
//! shares (0-10000), `HhiScale::Fraction` squares fractional shares (0-1).

use crate::domain::error::MinecastError;
use crate::domain::series::{Observation, Series};
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub const DEFAULT_MIN_BLOCKS: u64 = 50;
pub const SHARE_TOLERANCE: f64 = 1e-6;
pub const HHI_SERIES: &str = "hhi";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolShareRecord {
    pub date: NaiveDate,
    pub pool: String,
    pub blocks: u64,
}

/// date -> pool -> block count
pub type PoolShares = BTreeMap<NaiveDate, BTreeMap<String, u64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HhiScale {
    Percent,
    Fraction,
}

impl HhiScale {
    pub fn max_value(self) -> f64 {
        match self {
            HhiScale::Percent => 10_000.0,
            HhiScale::Fraction => 1.0,
        }
    }

    fn share_multiplier(self) -> f64 {
        match self {
            HhiScale::Percent => 100.0,
            HhiScale::Fraction => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncompletePolicy {
    Fail,
    Exclude,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HhiOptions {
    pub min_blocks: u64,
    pub scale: HhiScale,
    pub on_incomplete: IncompletePolicy,
}

impl Default for HhiOptions {
    fn default() -> Self {
        Self {
            min_blocks: DEFAULT_MIN_BLOCKS,
            scale: HhiScale::Percent,
            on_incomplete: IncompletePolicy::Fail,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExcludedDate {
    pub date: NaiveDate,
    pub blocks: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HhiOutcome {
    /// One observation per input date; excluded dates are present as missing.
    pub series: Series,
    pub excluded: Vec<ExcludedDate>,
}

/// Fold records into per-date, per-pool block counts. Repeated
/// (date, pool) entries are summed.
pub fn aggregate_pool_shares(records: &[PoolShareRecord]) -> PoolShares {
    let mut shares = PoolShares::new();
    for record in records {
        *shares
            .entry(record.date)
            .or_default()
            .entry(record.pool.clone())
            .or_insert(0) += record.blocks;
    }
    shares
}

/// Fractional share of each pool; empty when the day has no blocks.
pub fn fractional_shares(counts: &BTreeMap<String, u64>) -> BTreeMap<String, f64> {
    let total: u64 = counts.values().sum();
    if total == 0 {
        return BTreeMap::new();
    }
    counts
        .iter()
        .map(|(pool, &blocks)| (pool.clone(), blocks as f64 / total as f64))
        .collect()
}

pub fn compute_hhi(shares: &PoolShares, options: &HhiOptions) -> Result<HhiOutcome, MinecastError> {
    let mut points = Vec::with_capacity(shares.len());
    let mut excluded = Vec::new();
    let multiplier = options.scale.share_multiplier();

    for (&date, counts) in shares {
        let total: u64 = counts.values().sum();
        let fractions = fractional_shares(counts);
        let share_sum: f64 = fractions.values().sum();

        let complete = total >= options.min_blocks && (share_sum - 1.0).abs() <= SHARE_TOLERANCE;
        if !complete {
            match options.on_incomplete {
                IncompletePolicy::Fail => {
                    return Err(MinecastError::IncompleteData {
                        date,
                        blocks: total,
                        minimum: options.min_blocks,
                    });
                }
                IncompletePolicy::Exclude => {
                    excluded.push(ExcludedDate {
                        date,
                        blocks: total,
                    });
                    points.push(Observation { date, value: None });
                    continue;
                }
            }
        }

        let hhi: f64 = fractions
            .values()
            .map(|s| (s * multiplier).powi(2))
            .sum();
        points.push(Observation {
            date,
            value: Some(hhi),
        });
    }

    if !excluded.is_empty() {
        tracing::warn!(
            excluded = excluded.len(),
            min_blocks = options.min_blocks,
            "excluded incomplete pool-share dates from HHI"
        );
    }

    Ok(HhiOutcome {
        series: Series::new(HHI_SERIES, points)?,
        excluded,
    })
}
