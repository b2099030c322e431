//! Block subsidy schedule.
//!
//! The subsidy changes at each halving, so the schedule is configuration
//! rather than a constant. Each epoch is (activation date, subsidy in BTC).

use crate::domain::error::MinecastError;
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct SubsidyEpoch {
    pub start: NaiveDate,
    pub subsidy_btc: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HalvingSchedule {
    epochs: Vec<SubsidyEpoch>,
}

impl Default for HalvingSchedule {
    fn default() -> Self {
        let epoch = |y, m, d, subsidy_btc| SubsidyEpoch {
            start: NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN),
            subsidy_btc,
        };
        Self {
            epochs: vec![
                epoch(2009, 1, 3, 50.0),
                epoch(2012, 11, 28, 25.0),
                epoch(2016, 7, 9, 12.5),
                epoch(2020, 5, 11, 6.25),
                epoch(2024, 4, 20, 3.125),
            ],
        }
    }
}

impl HalvingSchedule {
    pub fn new(mut epochs: Vec<SubsidyEpoch>) -> Result<Self, MinecastError> {
        if epochs.is_empty() {
            return Err(MinecastError::config_invalid(
                "revenue",
                "halvings",
                "subsidy schedule needs at least one epoch",
            ));
        }
        epochs.sort_by_key(|e| e.start);
        if epochs.windows(2).any(|w| w[0].start == w[1].start) {
            return Err(MinecastError::config_invalid(
                "revenue",
                "halvings",
                "duplicate epoch start date",
            ));
        }
        if epochs
            .iter()
            .any(|e| !e.subsidy_btc.is_finite() || e.subsidy_btc < 0.0)
        {
            return Err(MinecastError::config_invalid(
                "revenue",
                "halvings",
                "subsidy must be a non-negative number",
            ));
        }
        Ok(Self { epochs })
    }

    /// Parse `YYYY-MM-DD:subsidy` pairs separated by commas.
    pub fn parse(input: &str) -> Result<Self, MinecastError> {
        let mut epochs = Vec::new();
        for token in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (date_str, subsidy_str) = token.split_once(':').ok_or_else(|| {
                MinecastError::config_invalid(
                    "revenue",
                    "halvings",
                    format!("expected DATE:SUBSIDY, got {token}"),
                )
            })?;
            let start = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d").map_err(|_| {
                MinecastError::config_invalid(
                    "revenue",
                    "halvings",
                    format!("invalid date {date_str}"),
                )
            })?;
            let subsidy_btc: f64 = subsidy_str.trim().parse().map_err(|_| {
                MinecastError::config_invalid(
                    "revenue",
                    "halvings",
                    format!("invalid subsidy {subsidy_str}"),
                )
            })?;
            epochs.push(SubsidyEpoch { start, subsidy_btc });
        }
        Self::new(epochs)
    }

    pub fn epochs(&self) -> &[SubsidyEpoch] {
        &self.epochs
    }

    fn epoch_at(&self, date: NaiveDate) -> Option<&SubsidyEpoch> {
        self.epochs.iter().rev().find(|e| e.start <= date)
    }

    /// Subsidy in force on `date`; zero before the first epoch.
    pub fn subsidy_at(&self, date: NaiveDate) -> f64 {
        self.epoch_at(date).map(|e| e.subsidy_btc).unwrap_or(0.0)
    }

    /// Days since the most recent epoch start, `None` before the first.
    pub fn days_since_halving(&self, date: NaiveDate) -> Option<i64> {
        self.epoch_at(date).map(|e| (date - e.start).num_days())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn default_schedule_subsidies() {
        let s = HalvingSchedule::default();
        assert_eq!(s.subsidy_at(date(2010, 1, 1)), 50.0);
        assert_eq!(s.subsidy_at(date(2020, 5, 10)), 12.5);
        assert_eq!(s.subsidy_at(date(2020, 5, 11)), 6.25);
        assert_eq!(s.subsidy_at(date(2024, 4, 19)), 6.25);
        assert_eq!(s.subsidy_at(date(2025, 1, 1)), 3.125);
        assert_eq!(s.subsidy_at(date(2008, 1, 1)), 0.0);
    }

    #[test]
    fn days_since_halving_counts_from_epoch_start() {
        let s = HalvingSchedule::default();
        assert_eq!(s.days_since_halving(date(2024, 4, 20)), Some(0));
        assert_eq!(s.days_since_halving(date(2024, 4, 30)), Some(10));
        assert_eq!(s.days_since_halving(date(2000, 1, 1)), None);
    }

    #[test]
    fn parse_sorts_epochs() {
        let s = HalvingSchedule::parse("2028-04-01:1.5625, 2024-04-20:3.125").unwrap();
        assert_eq!(s.epochs()[0].subsidy_btc, 3.125);
        assert_eq!(s.subsidy_at(date(2028, 6, 1)), 1.5625);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(HalvingSchedule::parse("2024-04-20").is_err());
        assert!(HalvingSchedule::parse("2024/04/20:3.125").is_err());
        assert!(HalvingSchedule::parse("2024-04-20:abc").is_err());
        assert!(HalvingSchedule::parse("").is_err());
    }
}
