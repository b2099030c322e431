//! Miner revenue per unit hashrate.
//!
//! Expected blocks per day for a miner of 1 TH/s:
//! - difficulty basis: 1e12 * 86400 / (difficulty * 2^32)
//! - hashrate basis:   1e12 / (network_hashrate * unit) * blocks_per_day
//!
//! BTC/day = blocks * (subsidy(date) + fees_per_block), USD/day = BTC/day * price.

use crate::domain::error::MinecastError;
use crate::domain::halving::HalvingSchedule;
use crate::domain::series::{Observation, Series};
use chrono::NaiveDate;

pub const HASHES_PER_TH: f64 = 1e12;
pub const SECONDS_PER_DAY: f64 = 86_400.0;
pub const REVENUE_SERIES: &str = "revenue_usd_per_th_day";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevenueBasis {
    Difficulty,
    Hashrate,
}

/// Unit of the daily total fees series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeDenomination {
    Native,
    Usd,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RevenueParams {
    pub basis: RevenueBasis,
    pub blocks_per_day: f64,
    pub hashes_per_difficulty: f64,
    /// Hashes per second represented by one unit of the network hashrate series.
    pub hashrate_unit_hs: f64,
    pub fee_denomination: FeeDenomination,
    pub schedule: HalvingSchedule,
}

impl Default for RevenueParams {
    fn default() -> Self {
        Self {
            basis: RevenueBasis::Difficulty,
            blocks_per_day: 144.0,
            hashes_per_difficulty: 4_294_967_296.0,
            hashrate_unit_hs: 1.0,
            fee_denomination: FeeDenomination::Native,
            schedule: HalvingSchedule::default(),
        }
    }
}

impl RevenueParams {
    pub fn validate(&self) -> Result<(), MinecastError> {
        for (key, value) in [
            ("blocks_per_day", self.blocks_per_day),
            ("hashes_per_difficulty", self.hashes_per_difficulty),
            ("hashrate_unit_hs", self.hashrate_unit_hs),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(MinecastError::config_invalid(
                    "revenue",
                    key,
                    format!("{key} must be positive"),
                ));
            }
        }
        Ok(())
    }

    /// Expected blocks per day for 1 TH/s given the network difficulty or
    /// hashrate (per `basis`). `None` for non-positive inputs.
    pub fn blocks_per_th_day(&self, network: f64) -> Option<f64> {
        if !(network.is_finite() && network > 0.0) {
            return None;
        }
        let blocks = match self.basis {
            RevenueBasis::Difficulty => {
                HASHES_PER_TH * SECONDS_PER_DAY / (network * self.hashes_per_difficulty)
            }
            RevenueBasis::Hashrate => {
                HASHES_PER_TH / (network * self.hashrate_unit_hs) * self.blocks_per_day
            }
        };
        Some(blocks)
    }

    pub fn btc_per_th_day(&self, date: NaiveDate, network: f64, fee_per_block_btc: f64) -> Option<f64> {
        self.blocks_per_th_day(network)
            .map(|blocks| blocks * (self.schedule.subsidy_at(date) + fee_per_block_btc))
    }

    /// Average fee per block in BTC from a daily fee total.
    pub fn fee_per_block_btc(&self, daily_fees: f64, price_usd: f64) -> Option<f64> {
        let fees_btc = match self.fee_denomination {
            FeeDenomination::Native => daily_fees,
            FeeDenomination::Usd if price_usd > 0.0 => daily_fees / price_usd,
            FeeDenomination::Usd => return None,
        };
        (fees_btc.is_finite() && fees_btc >= 0.0).then(|| fees_btc / self.blocks_per_day)
    }
}

/// Aligned inputs for historical revenue.
#[derive(Debug, Clone, Copy)]
pub struct RevenueInputs<'a> {
    pub price: &'a Series,
    pub difficulty: &'a Series,
    pub hashrate: &'a Series,
    pub fees: &'a Series,
}

/// One row of the expected-revenue table for a miner of `miner_th` TH/s.
#[derive(Debug, Clone, PartialEq)]
pub struct RevenueRow {
    pub date: NaiveDate,
    pub price_usd: f64,
    pub network_hashrate: f64,
    pub difficulty: f64,
    pub fee_per_block_btc: f64,
    pub btc_per_day: f64,
    pub usd_per_day: f64,
}

/// Rows for every date of `inputs.price` where all inputs are present and
/// positive; returns the rows and the number of dates skipped.
pub fn revenue_table(
    inputs: RevenueInputs<'_>,
    params: &RevenueParams,
    miner_th: f64,
) -> (Vec<RevenueRow>, usize) {
    let mut rows = Vec::with_capacity(inputs.price.len());
    let mut skipped = 0;

    for point in inputs.price.points() {
        match revenue_row(point.date, inputs, params, miner_th) {
            Some(row) => rows.push(row),
            None => skipped += 1,
        }
    }
    (rows, skipped)
}

fn revenue_row(
    date: NaiveDate,
    inputs: RevenueInputs<'_>,
    params: &RevenueParams,
    miner_th: f64,
) -> Option<RevenueRow> {
    let price_usd = inputs.price.value_at(date).filter(|p| *p > 0.0)?;
    let difficulty = inputs.difficulty.value_at(date)?;
    let network_hashrate = inputs.hashrate.value_at(date)?;
    let fee_per_block_btc = params.fee_per_block_btc(inputs.fees.value_at(date)?, price_usd)?;

    let network = match params.basis {
        RevenueBasis::Difficulty => difficulty,
        RevenueBasis::Hashrate => network_hashrate,
    };
    let btc_per_day = params.btc_per_th_day(date, network, fee_per_block_btc)? * miner_th;
    let usd_per_day = btc_per_day * price_usd;
    usd_per_day.is_finite().then_some(RevenueRow {
        date,
        price_usd,
        network_hashrate,
        difficulty,
        fee_per_block_btc,
        btc_per_day,
        usd_per_day,
    })
}

/// Historical USD revenue per TH/s per day on the price calendar. Dates with
/// any missing or non-positive input are missing in the output.
pub fn compute_revenue_to_date(
    price: &Series,
    difficulty: &Series,
    hashrate: &Series,
    fees: &Series,
    params: &RevenueParams,
) -> Result<Series, MinecastError> {
    params.validate()?;
    let inputs = RevenueInputs {
        price,
        difficulty,
        hashrate,
        fees,
    };

    let mut missing = 0;
    let points = price
        .points()
        .iter()
        .map(|p| {
            let value = revenue_row(p.date, inputs, params, 1.0).map(|r| r.usd_per_day);
            if value.is_none() {
                missing += 1;
            }
            Observation {
                date: p.date,
                value,
            }
        })
        .collect();

    if missing > 0 {
        tracing::warn!(missing, "revenue dates missing an input");
    }
    Series::new(REVENUE_SERIES, points)
}

/// Average fee per block in BTC over the last `days` dates where both fees
/// and price are present. `None` when no such date exists.
pub fn mean_fee_per_block(
    fees: &Series,
    price: &Series,
    params: &RevenueParams,
    days: usize,
) -> Option<f64> {
    let recent: Vec<f64> = fees
        .points()
        .iter()
        .rev()
        .filter_map(|p| {
            let price_usd = price.value_at(p.date).unwrap_or(0.0);
            params.fee_per_block_btc(p.value?, price_usd)
        })
        .take(days)
        .collect();
    (!recent.is_empty()).then(|| recent.iter().sum::<f64>() / recent.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn series(name: &str, values: &[f64]) -> Series {
        Series::from_values(name, start(), values).unwrap()
    }

    #[test]
    fn difficulty_basis_blocks() {
        let params = RevenueParams::default();
        let difficulty = 80e12;
        let blocks = params.blocks_per_th_day(difficulty).unwrap();
        assert_relative_eq!(
            blocks,
            1e12 * 86_400.0 / (difficulty * 4_294_967_296.0),
            max_relative = 1e-12
        );
    }

    #[test]
    fn hashrate_basis_matches_share_of_network() {
        let params = RevenueParams {
            basis: RevenueBasis::Hashrate,
            ..RevenueParams::default()
        };
        // 1 TH/s out of 600 EH/s, 144 blocks a day
        let blocks = params.blocks_per_th_day(600e18).unwrap();
        assert_relative_eq!(blocks, 144.0 / 600e6, max_relative = 1e-12);
    }

    #[test]
    fn non_positive_network_is_none() {
        let params = RevenueParams::default();
        assert!(params.blocks_per_th_day(0.0).is_none());
        assert!(params.blocks_per_th_day(-1.0).is_none());
    }

    #[test]
    fn usd_fees_are_converted_with_price() {
        let params = RevenueParams {
            fee_denomination: FeeDenomination::Usd,
            ..RevenueParams::default()
        };
        let per_block = params.fee_per_block_btc(1_440_000.0, 50_000.0).unwrap();
        assert_relative_eq!(per_block, 28.8 / 144.0, max_relative = 1e-12);
    }

    #[test]
    fn revenue_to_date_uses_subsidy_and_fees() {
        let params = RevenueParams {
            basis: RevenueBasis::Hashrate,
            ..RevenueParams::default()
        };
        let price = series("price", &[60_000.0, 60_000.0]);
        let difficulty = series("difficulty", &[80e12, 80e12]);
        let hashrate = series("hashrate", &[600e18, 600e18]);
        let fees = series("fees", &[14.4, 28.8]);

        let revenue = compute_revenue_to_date(&price, &difficulty, &hashrate, &fees, &params).unwrap();

        let blocks = 144.0 / 600e6;
        let day1 = blocks * (3.125 + 0.1) * 60_000.0;
        let day2 = blocks * (3.125 + 0.2) * 60_000.0;
        assert_relative_eq!(revenue.value_at(start()).unwrap(), day1, max_relative = 1e-12);
        assert_relative_eq!(
            revenue.value_at(start() + chrono::Duration::days(1)).unwrap(),
            day2,
            max_relative = 1e-12
        );
    }

    #[test]
    fn missing_input_propagates() {
        let params = RevenueParams::default();
        let price = series("price", &[60_000.0, 60_000.0]);
        let difficulty = Series::new(
            "difficulty",
            vec![
                Observation { date: start(), value: Some(80e12) },
                Observation { date: start() + chrono::Duration::days(1), value: None },
            ],
        )
        .unwrap();
        let hashrate = series("hashrate", &[600e18, 600e18]);
        let fees = series("fees", &[10.0, 10.0]);

        let revenue = compute_revenue_to_date(&price, &difficulty, &hashrate, &fees, &params).unwrap();
        assert!(revenue.value_at(start()).is_some());
        assert_eq!(revenue.missing_count(), 1);
    }

    #[test]
    fn revenue_table_scales_with_miner_hashrate() {
        let params = RevenueParams::default();
        let price = series("price", &[60_000.0]);
        let difficulty = series("difficulty", &[80e12]);
        let hashrate = series("hashrate", &[600e18]);
        let fees = series("fees", &[10.0]);
        let inputs = RevenueInputs {
            price: &price,
            difficulty: &difficulty,
            hashrate: &hashrate,
            fees: &fees,
        };

        let (one, _) = revenue_table(inputs, &params, 1.0);
        let (hundred, skipped) = revenue_table(inputs, &params, 100.0);
        assert_eq!(skipped, 0);
        assert_relative_eq!(hundred[0].usd_per_day, one[0].usd_per_day * 100.0, max_relative = 1e-12);
    }

    #[test]
    fn mean_fee_uses_latest_days() {
        let params = RevenueParams::default();
        let price = series("price", &[60_000.0; 4]);
        let fees = series("fees", &[1000.0, 14.4, 28.8, 43.2]);
        let mean = mean_fee_per_block(&fees, &price, &params, 3).unwrap();
        assert_relative_eq!(mean, 0.2, max_relative = 1e-12);
    }

    #[test]
    fn invalid_params_rejected() {
        let params = RevenueParams {
            blocks_per_day: 0.0,
            ..RevenueParams::default()
        };
        assert!(params.validate().is_err());
    }
}
