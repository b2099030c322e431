//! Store assembly and per-target forecast runs.

use crate::domain::error::MinecastError;
use crate::domain::feature::FeatureSpec;
use crate::domain::forecast::{EngineConfig, ForecastEngine, ForecastResult};
use crate::domain::hhi::{HhiOptions, HhiOutcome, PoolShareRecord, aggregate_pool_shares, compute_hhi};
use crate::domain::revenue::{RevenueParams, compute_revenue_to_date};
use crate::domain::series::{DIFFICULTY, FEES, HASHRATE, Observation, PRICE, RawRecord, Series};
use crate::domain::series_store::{CalendarPolicy, SeriesStore, SeriesStoreBuilder};
use rayon::prelude::*;

#[derive(Debug)]
pub struct Assembly {
    pub store: SeriesStore,
    /// `None` without pool shares. An error leaves the store without HHI.
    pub hhi: Option<Result<HhiOutcome, MinecastError>>,
}

/// Place a derived series on the store calendar as is. Dates it lacks, or
/// holds as missing, stay missing.
fn on_calendar(store: &SeriesStore, series: &Series) -> Result<Series, MinecastError> {
    let points = store
        .calendar()
        .iter()
        .map(|&date| Observation {
            date,
            value: series.value_at(date),
        })
        .collect();
    Series::new(series.name(), points)
}

/// Align chain records, then add HHI from pool shares and, when price,
/// difficulty, hashrate and fees are all present, historical revenue.
///
/// HHI is never forward filled, so dates excluded as incomplete stay
/// missing. A failed HHI computation is returned in `Assembly::hhi` and does
/// not stop assembly of the chain series.
pub fn assemble(
    records: &[RawRecord],
    pool_shares: Option<&[PoolShareRecord]>,
    hhi_options: &HhiOptions,
    revenue: Option<&RevenueParams>,
    policy: &CalendarPolicy,
) -> Result<Assembly, MinecastError> {
    let mut builder = SeriesStoreBuilder::new();
    builder.add_records(records);
    let mut store = builder.finalize(policy)?;

    let hhi = pool_shares.map(|shares| compute_hhi(&aggregate_pool_shares(shares), hhi_options));
    match &hhi {
        Some(Ok(outcome)) => store = store.with_series(on_calendar(&store, &outcome.series)?)?,
        Some(Err(e)) => tracing::error!(error = %e, "HHI not added to the store"),
        None => {}
    }

    if let Some(params) = revenue {
        let inputs = [PRICE, DIFFICULTY, HASHRATE, FEES];
        if inputs.iter().all(|name| store.contains(name)) {
            let series = compute_revenue_to_date(
                store.get(PRICE)?,
                store.get(DIFFICULTY)?,
                store.get(HASHRATE)?,
                store.get(FEES)?,
                params,
            )?;
            store = store.with_series(series)?;
        } else {
            let missing: Vec<&str> = inputs.into_iter().filter(|n| !store.contains(n)).collect();
            tracing::info!(?missing, "skipping historical revenue");
        }
    }

    tracing::info!(
        start = %store.start(),
        end = %store.end(),
        days = store.calendar().len(),
        series = ?store.names(),
        "assembled series store"
    );
    Ok(Assembly { store, hhi })
}

#[derive(Debug, Clone)]
pub struct TargetJob {
    pub target: String,
    pub spec: FeatureSpec,
    pub config: EngineConfig,
}

#[derive(Debug)]
pub struct TargetOutcome {
    pub target: String,
    pub result: Result<ForecastResult, MinecastError>,
}

/// Run every job on its own engine in parallel. A failing target does not
/// affect the others; outcomes keep the job order.
pub fn run_targets(store: &SeriesStore, jobs: &[TargetJob]) -> Vec<TargetOutcome> {
    jobs.par_iter()
        .map(|job| {
            let result = ForecastEngine::new(job.config.clone())
                .and_then(|mut engine| engine.run(store, &job.target, job.spec.clone()));
            match &result {
                Ok(forecast) => tracing::info!(
                    target = %job.target,
                    mape = forecast.score.mape,
                    low_confidence = forecast.low_confidence,
                    "target forecast complete"
                ),
                Err(e) => tracing::error!(target = %job.target, error = %e, "target failed"),
            }
            TargetOutcome {
                target: job.target.clone(),
                result,
            }
        })
        .collect()
}
