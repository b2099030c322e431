#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use minecast::domain::error::MinecastError;
use minecast::domain::hhi::PoolShareRecord;
use minecast::domain::revenue::FeeDenomination;
use minecast::domain::series::{DIFFICULTY, FEES, HASHRATE, PRICE, RawRecord, RawSeries};
use minecast::domain::series_store::{CalendarPolicy, ConflictPolicy, SeriesStore};
use minecast::domain::table::TableRecord;
use minecast::ports::data_port::{DataPort, IngestBatch, PoolShareBatch};
use minecast::ports::report_port::ReportPort;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub struct MockDataPort {
    pub sources: HashMap<String, Vec<RawRecord>>,
    pub pools: Vec<PoolShareRecord>,
    pub errors: HashMap<String, String>,
    pub fee_denomination: Option<FeeDenomination>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
            pools: Vec::new(),
            errors: HashMap::new(),
            fee_denomination: None,
        }
    }

    pub fn with_records(mut self, source: &str, records: Vec<RawRecord>) -> Self {
        self.sources
            .entry(source.to_string())
            .or_default()
            .extend(records);
        self
    }

    pub fn with_pools(mut self, pools: Vec<PoolShareRecord>) -> Self {
        self.pools = pools;
        self
    }

    pub fn with_error(mut self, source: &str, reason: &str) -> Self {
        self.errors.insert(source.to_string(), reason.to_string());
        self
    }

    pub fn with_fee_denomination(mut self, denomination: FeeDenomination) -> Self {
        self.fee_denomination = Some(denomination);
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_chain_records(&self, source: &str) -> Result<IngestBatch, MinecastError> {
        if let Some(reason) = self.errors.get(source) {
            return Err(MinecastError::Data {
                reason: reason.clone(),
            });
        }
        match self.sources.get(source) {
            Some(records) => Ok(IngestBatch {
                records: records.clone(),
                fee_denomination: self.fee_denomination,
                ..IngestBatch::default()
            }),
            None => Err(MinecastError::Data {
                reason: format!("unknown source {source}"),
            }),
        }
    }

    fn fetch_pool_shares(&self) -> Result<PoolShareBatch, MinecastError> {
        Ok(PoolShareBatch {
            records: self.pools.clone(),
            rejected: 0,
        })
    }

    fn list_sources(&self) -> Result<Vec<String>, MinecastError> {
        let mut names: Vec<String> = self.sources.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Report port that keeps written records in memory.
pub struct CapturingReport {
    pub written: RefCell<Vec<(PathBuf, Vec<TableRecord>)>>,
}

impl CapturingReport {
    pub fn new() -> Self {
        Self {
            written: RefCell::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<TableRecord> {
        self.written
            .borrow()
            .last()
            .map(|(_, r)| r.clone())
            .unwrap_or_default()
    }

    pub fn metric_count(&self, metric: &str) -> usize {
        self.records().iter().filter(|r| r.metric == metric).count()
    }
}

impl ReportPort for CapturingReport {
    fn write(&self, records: &[TableRecord], output_path: &Path) -> Result<(), MinecastError> {
        self.written
            .borrow_mut()
            .push((output_path.to_path_buf(), records.to_vec()));
        Ok(())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn start() -> NaiveDate {
    date(2024, 1, 1)
}

pub fn day(i: usize) -> NaiveDate {
    start() + Duration::days(i as i64)
}

pub fn record(source: &str, field: &str, date: NaiveDate, value: f64) -> RawRecord {
    RawRecord {
        source: source.to_string(),
        date,
        field: field.to_string(),
        value,
    }
}

/// `days` daily records of `field` from `start()`, valued by `f(i)`.
pub fn generate_records(
    source: &str,
    field: &str,
    days: usize,
    f: impl Fn(usize) -> f64,
) -> Vec<RawRecord> {
    (0..days).map(|i| record(source, field, day(i), f(i))).collect()
}

pub fn linear_difficulty(i: usize) -> f64 {
    50e12 + 1e11 * i as f64
}

/// Difficulty, hashrate, price and fees over `days`, all rising linearly.
pub fn chain_records(source: &str, days: usize) -> Vec<RawRecord> {
    let mut records = generate_records(source, DIFFICULTY, days, linear_difficulty);
    records.extend(generate_records(source, HASHRATE, days, |i| {
        linear_difficulty(i) * 4_294_967_296.0 / 600.0
    }));
    records.extend(generate_records(source, PRICE, days, |i| 40_000.0 + 50.0 * i as f64));
    records.extend(generate_records(source, FEES, days, |_| 28.8));
    records
}

/// Five pools with fixed block counts on each of `days` days.
pub fn pool_records(days: usize) -> Vec<PoolShareRecord> {
    let counts = [("Foundry USA", 44), ("AntPool", 36), ("ViaBTC", 20), ("F2Pool", 16), ("Other", 28)];
    (0..days)
        .flat_map(|i| {
            counts.iter().map(move |&(pool, blocks)| PoolShareRecord {
                date: day(i),
                pool: pool.to_string(),
                blocks,
            })
        })
        .collect()
}

pub fn store_from(field: &str, values: &[f64]) -> SeriesStore {
    let points = values.iter().enumerate().map(|(i, &v)| (day(i), v)).collect();
    SeriesStore::build(
        vec![RawSeries::new("cm", field, points).unwrap()],
        &CalendarPolicy::new(ConflictPolicy::Fail),
    )
    .unwrap()
}
