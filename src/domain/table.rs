//! Flat `(date, metric, value, lower, upper)` records for reports.

use crate::domain::forecast::ForecastResult;
use crate::domain::revenue::RevenueRow;
use crate::domain::scenario::RevenueEstimate;
use crate::domain::series::Series;
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRecord {
    pub date: NaiveDate,
    pub metric: String,
    pub value: f64,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl TableRecord {
    pub fn new(date: NaiveDate, metric: impl Into<String>, value: f64) -> Self {
        Self {
            date,
            metric: metric.into(),
            value,
            lower: None,
            upper: None,
        }
    }

    pub fn with_band(mut self, lower: f64, upper: f64) -> Self {
        self.lower = Some(lower);
        self.upper = Some(upper);
        self
    }
}

/// Present observations of a series, metric named after the series.
pub fn series_records(series: &Series) -> Vec<TableRecord> {
    series
        .points()
        .iter()
        .filter_map(|p| p.value.map(|v| TableRecord::new(p.date, series.name(), v)))
        .collect()
}

/// Forecast points as `<target>_forecast` with bands, followed by one
/// `<target>_fold_mae` and `<target>_fold_mape` record per fold dated at the
/// fold cutoff.
pub fn forecast_records(forecast: &ForecastResult) -> Vec<TableRecord> {
    let metric = format!("{}_forecast", forecast.target);
    let mut out: Vec<TableRecord> = forecast
        .points
        .iter()
        .map(|p| TableRecord::new(p.date, metric.as_str(), p.point).with_band(p.lower, p.upper))
        .collect();

    for fold in &forecast.score.folds {
        out.push(TableRecord::new(
            fold.fold.cutoff,
            format!("{}_fold_mae", forecast.target),
            fold.mae,
        ));
        out.push(TableRecord::new(
            fold.fold.cutoff,
            format!("{}_fold_mape", forecast.target),
            fold.mape,
        ));
    }
    out
}

/// Four records per estimate: `<scenario>_gross_usd`, `<scenario>_pool_fee_usd`,
/// `<scenario>_electricity_usd` and `<scenario>_net_usd` (with band).
pub fn revenue_records(estimates: &[RevenueEstimate]) -> Vec<TableRecord> {
    estimates
        .iter()
        .flat_map(|e| {
            let name = |suffix: &str| format!("{}_{}", e.scenario, suffix);
            [
                TableRecord::new(e.date, name("gross_usd"), e.gross_usd),
                TableRecord::new(e.date, name("pool_fee_usd"), e.pool_fee_usd),
                TableRecord::new(e.date, name("electricity_usd"), e.electricity_usd),
                TableRecord::new(e.date, name("net_usd"), e.net_usd)
                    .with_band(e.net_lower_usd, e.net_upper_usd),
            ]
        })
        .collect()
}

/// Historical miner revenue: `miner_btc_per_day`, `miner_usd_per_day` and
/// `fee_per_block_btc` for each row.
pub fn miner_revenue_records(rows: &[RevenueRow]) -> Vec<TableRecord> {
    rows.iter()
        .flat_map(|r| {
            [
                TableRecord::new(r.date, "miner_btc_per_day", r.btc_per_day),
                TableRecord::new(r.date, "miner_usd_per_day", r.usd_per_day),
                TableRecord::new(r.date, "fee_per_block_btc", r.fee_per_block_btc),
            ]
        })
        .collect()
}
