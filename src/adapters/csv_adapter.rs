//! CSV file data adapter.
//!
//! Chain sources are wide daily exports at `{base}/{source}.csv` (CoinMetrics
//! community layout): one time column and one column per metric. Columns are
//! matched case-insensitively against known aliases; unknown columns are
//! ignored. Pool shares come from `{base}/{pool_file}` with `date,pool,blocks`.

use crate::domain::error::MinecastError;
use crate::domain::hhi::PoolShareRecord;
use crate::domain::revenue::FeeDenomination;
use crate::domain::series::{DIFFICULTY, FEES, HASHRATE, PRICE, RawRecord};
use crate::ports::data_port::{DataPort, IngestBatch, PoolShareBatch};
use chrono::{DateTime, NaiveDate};
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_POOL_FILE: &str = "pools.csv";

const TIME_COLUMNS: &[&str] = &["time", "date"];
const DIFFICULTY_COLUMNS: &[&str] = &["diffmean", "difflast", "difficulty"];
const HASHRATE_COLUMNS: &[&str] = &["hashrate", "hashratemean", "hashrate7d", "hashrate30d"];
const PRICE_COLUMNS: &[&str] = &["priceusd", "price(usd)", "price_usd"];
const NATIVE_FEE_COLUMNS: &[&str] = &["feetotntv", "feesntv", "feetotbtc", "feesbtc"];
const USD_FEE_COLUMNS: &[&str] = &["feetotusd", "feesusd", "feeusd"];

/// Parse `YYYY-MM-DD` or an RFC 3339 timestamp.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(input).ok().map(|dt| dt.date_naive()))
}

/// Index of the first header matching any alias, aliases tried in order.
fn find_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| headers.iter().position(|h| h == alias))
}

struct ColumnMap {
    time: usize,
    metrics: Vec<(&'static str, usize)>,
    fee_denomination: Option<FeeDenomination>,
}

impl ColumnMap {
    fn detect(headers: &csv::StringRecord) -> Option<Self> {
        let headers: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let time = find_column(&headers, TIME_COLUMNS)?;

        let mut metrics = Vec::new();
        for (field, aliases) in [
            (DIFFICULTY, DIFFICULTY_COLUMNS),
            (HASHRATE, HASHRATE_COLUMNS),
            (PRICE, PRICE_COLUMNS),
        ] {
            if let Some(i) = find_column(&headers, aliases) {
                metrics.push((field, i));
            }
        }

        let fees = find_column(&headers, NATIVE_FEE_COLUMNS)
            .map(|i| (i, FeeDenomination::Native))
            .or_else(|| find_column(&headers, USD_FEE_COLUMNS).map(|i| (i, FeeDenomination::Usd)));
        if let Some((i, _)) = fees {
            metrics.push((FEES, i));
        }

        Some(Self {
            time,
            metrics,
            fee_denomination: fees.map(|(_, d)| d),
        })
    }
}

pub struct CsvAdapter {
    base_path: PathBuf,
    pool_file: String,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            pool_file: DEFAULT_POOL_FILE.to_string(),
        }
    }

    pub fn with_pool_file(mut self, pool_file: impl Into<String>) -> Self {
        self.pool_file = pool_file.into();
        self
    }

    fn csv_path(&self, source: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", source))
    }

    fn read(&self, path: &PathBuf) -> Result<String, MinecastError> {
        fs::read_to_string(path).map_err(|e| MinecastError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })
    }
}

fn csv_error(e: csv::Error) -> MinecastError {
    MinecastError::Data {
        reason: format!("CSV parse error: {}", e),
    }
}

impl DataPort for CsvAdapter {
    fn fetch_chain_records(&self, source: &str) -> Result<IngestBatch, MinecastError> {
        let path = self.csv_path(source);
        let content = self.read(&path)?;
        let mut rdr = csv::Reader::from_reader(content.as_bytes());

        let columns = ColumnMap::detect(rdr.headers().map_err(csv_error)?).ok_or_else(|| {
            MinecastError::Data {
                reason: format!("{}: no time/date column", path.display()),
            }
        })?;
        if columns.metrics.is_empty() {
            tracing::warn!(source, "no recognised metric columns");
        }

        let mut batch = IngestBatch {
            fee_denomination: columns.fee_denomination,
            ..IngestBatch::default()
        };
        for result in rdr.records() {
            let record = result.map_err(csv_error)?;
            let Some(date) = record.get(columns.time).and_then(parse_date) else {
                batch.rejected += columns.metrics.len();
                continue;
            };

            for &(field, i) in &columns.metrics {
                let cell = record.get(i).unwrap_or("").trim();
                if cell.is_empty() {
                    batch.blank += 1;
                    continue;
                }
                match cell.parse::<f64>() {
                    Ok(value) if value.is_finite() => batch.records.push(RawRecord {
                        source: source.to_string(),
                        date,
                        field: field.to_string(),
                        value,
                    }),
                    _ => batch.rejected += 1,
                }
            }
        }

        tracing::debug!(
            source,
            records = batch.records.len(),
            rejected = batch.rejected,
            blank = batch.blank,
            "read chain source"
        );
        Ok(batch)
    }

    fn fetch_pool_shares(&self) -> Result<PoolShareBatch, MinecastError> {
        let path = self.base_path.join(&self.pool_file);
        let content = self.read(&path)?;
        let mut rdr = csv::Reader::from_reader(content.as_bytes());

        let headers: Vec<String> = rdr
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();
        let column = |name: &str| {
            headers.iter().position(|h| h == name).ok_or_else(|| MinecastError::Data {
                reason: format!("{}: missing column {}", path.display(), name),
            })
        };
        let (date_col, pool_col, blocks_col) = (column("date")?, column("pool")?, column("blocks")?);

        let mut batch = PoolShareBatch::default();
        for result in rdr.records() {
            let record = result.map_err(csv_error)?;
            let date = record.get(date_col).and_then(parse_date);
            let pool = record.get(pool_col).map(str::trim).filter(|p| !p.is_empty());
            let blocks = record.get(blocks_col).and_then(|b| b.trim().parse::<u64>().ok());
            match (date, pool, blocks) {
                (Some(date), Some(pool), Some(blocks)) => batch.records.push(PoolShareRecord {
                    date,
                    pool: pool.to_string(),
                    blocks,
                }),
                _ => batch.rejected += 1,
            }
        }
        Ok(batch)
    }

    fn list_sources(&self) -> Result<Vec<String>, MinecastError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| MinecastError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut sources = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MinecastError::Data {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == self.pool_file {
                continue;
            }
            if let Some(stem) = name.strip_suffix(".csv") {
                sources.push(stem.to_string());
            }
        }

        sources.sort();
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let coinmetrics = "time,PriceUSD,DiffMean,HashRate,FeeTotNtv,SplyCur\n\
            2024-01-01T00:00:00.000000000Z,42000.5,7.2e13,5.1e20,25.5,19500000\n\
            2024-01-02T00:00:00.000000000Z,43000,7.2e13,,30.1,19500900\n\
            2024-01-03T00:00:00.000000000Z,n/a,7.3e13,5.3e20,28.0,19501800\n\
            not-a-date,1,2,3,4,5\n";
        fs::write(path.join("btc.csv"), coinmetrics).unwrap();
        fs::write(
            path.join("usd_fees.csv"),
            "Date,Difficulty,FeesUSD\n2024-01-01,7e13,1000000\n",
        )
        .unwrap();
        fs::write(
            path.join("pools.csv"),
            "date,pool,blocks\n\
             2024-01-01,Foundry USA,40\n\
             2024-01-01,AntPool,35\n\
             2024-01-01,,3\n\
             2024-01-02,ViaBTC,many\n",
        )
        .unwrap();

        (dir, path)
    }

    fn count(batch: &IngestBatch, field: &str) -> usize {
        batch.records.iter().filter(|r| r.field == field).count()
    }

    #[test]
    fn detects_coinmetrics_columns() {
        let (_dir, path) = setup_test_data();
        let batch = CsvAdapter::new(path).fetch_chain_records("btc").unwrap();

        assert_eq!(count(&batch, PRICE), 2);
        assert_eq!(count(&batch, DIFFICULTY), 3);
        assert_eq!(count(&batch, HASHRATE), 2);
        assert_eq!(count(&batch, FEES), 3);
        assert_eq!(batch.blank, 1);
        // "n/a" plus four metric cells on the undated row
        assert_eq!(batch.rejected, 5);
        assert_eq!(batch.fee_denomination, Some(FeeDenomination::Native));

        let first = &batch.records[0];
        assert_eq!(first.source, "btc");
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn detects_usd_fees_and_plain_dates() {
        let (_dir, path) = setup_test_data();
        let batch = CsvAdapter::new(path).fetch_chain_records("usd_fees").unwrap();
        assert_eq!(batch.fee_denomination, Some(FeeDenomination::Usd));
        assert_eq!(count(&batch, DIFFICULTY), 1);
        assert_eq!(count(&batch, FEES), 1);
    }

    #[test]
    fn missing_source_is_error() {
        let (_dir, path) = setup_test_data();
        assert!(CsvAdapter::new(path).fetch_chain_records("nope").is_err());
    }

    #[test]
    fn pool_shares_reject_bad_rows() {
        let (_dir, path) = setup_test_data();
        let batch = CsvAdapter::new(path).fetch_pool_shares().unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.rejected, 2);
        assert_eq!(batch.records[0].pool, "Foundry USA");
    }

    #[test]
    fn list_sources_skips_pool_file() {
        let (_dir, path) = setup_test_data();
        let sources = CsvAdapter::new(path).list_sources().unwrap();
        assert_eq!(sources, vec!["btc", "usd_fees"]);
    }

    #[test]
    fn parse_date_formats() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(parse_date("2024-02-29"), Some(d));
        assert_eq!(parse_date("2024-02-29T00:00:00Z"), Some(d));
        assert_eq!(parse_date("29/02/2024"), None);
    }
}
