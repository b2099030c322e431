//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::{CsvAdapter, DEFAULT_POOL_FILE};
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::{
    SCENARIO_PREFIX, parse_f64_list, parse_list, parse_usize_list, scenario_names, validate_config,
};
use crate::domain::error::MinecastError;
use crate::domain::feature::{FeatureKind, FeatureSpec, RollingStat};
use crate::domain::forecast::{
    DEFAULT_BAND_Z, DEFAULT_FOLDS, DEFAULT_HORIZON, DEFAULT_MAPE_THRESHOLD, EngineConfig,
    ForecastResult, ValueDomain,
};
use crate::domain::halving::HalvingSchedule;
use crate::domain::hhi::{
    DEFAULT_MIN_BLOCKS, HHI_SERIES, HhiOptions, HhiScale, IncompletePolicy, PoolShareRecord,
    aggregate_pool_shares, compute_hhi,
};
use crate::domain::model::{ModelClass, TargetTransform};
use crate::domain::pipeline::{TargetJob, assemble, run_targets};
use crate::domain::revenue::{
    FeeDenomination, REVENUE_SERIES, RevenueBasis, RevenueInputs, RevenueParams, mean_fee_per_block,
    revenue_table,
};
use crate::domain::scenario::{PricePath, ScenarioConfig, ScenarioEngine};
use crate::domain::series::{DIFFICULTY, FEES, HASHRATE, PRICE, RawRecord};
use crate::domain::series_store::{CalendarPolicy, ConflictPolicy, DEFAULT_MAX_FILL_GAP, SeriesStore};
use crate::domain::table::{
    TableRecord, forecast_records, miner_revenue_records, revenue_records, series_records,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

/// Days of fee history averaged when `fee_per_block_btc` is not configured.
const FEE_LOOKBACK_DAYS: usize = 30;

#[derive(Parser, Debug)]
#[command(name = "minecast", about = "Bitcoin mining metrics, forecasts and revenue scenarios")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Forecast targets and project scenario revenue
    Forecast {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Forecast only these targets (repeatable)
        #[arg(long)]
        target: Vec<String>,
    },
    /// Compute daily mining concentration (HHI) from pool shares
    Hhi {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show available sources and their date ranges
    Info {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Forecast {
            config,
            output,
            target,
        } => run_forecast(&config, output.as_ref(), &target),
        Command::Hhi { config, output } => run_hhi(&config, output.as_ref()),
        Command::Validate { config } => run_validate(&config),
        Command::Info { config } => run_info(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = MinecastError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn fail(e: MinecastError) -> ExitCode {
    eprintln!("error: {e}");
    (&e).into()
}

/// Data adapter rooted at `[data] base_path`.
pub fn build_data_adapter(config: &dyn ConfigPort) -> Result<CsvAdapter, MinecastError> {
    let base_path = config
        .get_string("data", "base_path")
        .ok_or_else(|| MinecastError::ConfigMissing {
            section: "data".into(),
            key: "base_path".into(),
        })?;
    let pool_file = config
        .get_string("data", "pool_file")
        .unwrap_or_else(|| DEFAULT_POOL_FILE.to_string());
    Ok(CsvAdapter::new(PathBuf::from(base_path)).with_pool_file(pool_file))
}

fn get_usize(config: &dyn ConfigPort, section: &str, key: &str, default: usize) -> Result<usize, MinecastError> {
    let value = config.get_int(section, key, default as i64);
    usize::try_from(value)
        .map_err(|_| MinecastError::config_invalid(section, key, format!("{value} is negative")))
}

fn get_optional_usize(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<usize>, MinecastError> {
    match config.get_string(section, key) {
        Some(_) => get_usize(config, section, key, 0).map(Some),
        None => Ok(None),
    }
}

fn get_optional_f64(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, MinecastError> {
    match config.get_string(section, key) {
        Some(value) => value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| MinecastError::config_invalid(section, key, format!("{value:?} is not a number"))),
        None => Ok(None),
    }
}

fn get_f64(config: &dyn ConfigPort, section: &str, key: &str, default: f64) -> Result<f64, MinecastError> {
    Ok(get_optional_f64(config, section, key)?.unwrap_or(default))
}

fn get_choice(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config.get_string(section, key).map(|v| v.trim().to_lowercase())
}

pub fn build_calendar_policy(config: &dyn ConfigPort) -> Result<CalendarPolicy, MinecastError> {
    let conflict = get_choice(config, "alignment", "conflict").ok_or_else(|| MinecastError::ConfigMissing {
        section: "alignment".into(),
        key: "conflict".into(),
    })?;
    let conflict = match conflict.as_str() {
        "average" => ConflictPolicy::Average,
        "fail" => ConflictPolicy::Fail,
        other => match other.strip_prefix("prefer:") {
            Some(order) => ConflictPolicy::prefer_first(&parse_list(order)),
            None => {
                return Err(MinecastError::config_invalid(
                    "alignment",
                    "conflict",
                    format!("unknown policy {other:?}"),
                ));
            }
        },
    };
    Ok(CalendarPolicy {
        max_fill_gap: get_usize(config, "alignment", "max_fill_gap", DEFAULT_MAX_FILL_GAP)?,
        conflict,
    })
}

pub fn build_hhi_options(config: &dyn ConfigPort) -> Result<HhiOptions, MinecastError> {
    let scale = match get_choice(config, "hhi", "scale").as_deref() {
        None | Some("percent") => HhiScale::Percent,
        Some("fraction") => HhiScale::Fraction,
        Some(other) => return Err(MinecastError::config_invalid("hhi", "scale", format!("unknown scale {other:?}"))),
    };
    let on_incomplete = match get_choice(config, "hhi", "on_incomplete").as_deref() {
        None | Some("fail") => IncompletePolicy::Fail,
        Some("exclude") => IncompletePolicy::Exclude,
        Some(other) => {
            return Err(MinecastError::config_invalid(
                "hhi",
                "on_incomplete",
                format!("unknown policy {other:?}"),
            ));
        }
    };
    Ok(HhiOptions {
        min_blocks: config.get_int("hhi", "min_blocks", DEFAULT_MIN_BLOCKS as i64).max(0) as u64,
        scale,
        on_incomplete,
    })
}

pub fn build_halving_schedule(config: &dyn ConfigPort) -> Result<HalvingSchedule, MinecastError> {
    match config.get_string("revenue", "halvings") {
        Some(value) => HalvingSchedule::parse(&value),
        None => Ok(HalvingSchedule::default()),
    }
}

/// Revenue parameters. `detected` is the fee unit reported by the data
/// source; an explicit `fee_denomination` key wins over it.
pub fn build_revenue_params(
    config: &dyn ConfigPort,
    detected: Option<FeeDenomination>,
) -> Result<RevenueParams, MinecastError> {
    let defaults = RevenueParams::default();
    let basis = match get_choice(config, "revenue", "basis").as_deref() {
        None | Some("difficulty") => RevenueBasis::Difficulty,
        Some("hashrate") => RevenueBasis::Hashrate,
        Some(other) => return Err(MinecastError::config_invalid("revenue", "basis", format!("unknown basis {other:?}"))),
    };
    let fee_denomination = match get_choice(config, "revenue", "fee_denomination").as_deref() {
        None => detected.unwrap_or(defaults.fee_denomination),
        Some("native") => FeeDenomination::Native,
        Some("usd") => FeeDenomination::Usd,
        Some(other) => {
            return Err(MinecastError::config_invalid(
                "revenue",
                "fee_denomination",
                format!("unknown denomination {other:?}"),
            ));
        }
    };
    let params = RevenueParams {
        basis,
        blocks_per_day: get_f64(config, "revenue", "blocks_per_day", defaults.blocks_per_day)?,
        hashes_per_difficulty: get_f64(config, "revenue", "hashes_per_difficulty", defaults.hashes_per_difficulty)?,
        hashrate_unit_hs: get_f64(config, "revenue", "hashrate_unit_hs", defaults.hashrate_unit_hs)?,
        fee_denomination,
        schedule: build_halving_schedule(config)?,
    };
    params.validate()?;
    Ok(params)
}

pub fn build_feature_spec(config: &dyn ConfigPort) -> Result<FeatureSpec, MinecastError> {
    let list = |key: &str, default: &str| {
        let value = config.get_string("features", key).unwrap_or_else(|| default.to_string());
        parse_usize_list("features", key, &value)
    };

    let mut features: Vec<FeatureKind> = list("lags", "1,7,14,30")?
        .into_iter()
        .map(FeatureKind::lag)
        .collect();

    if let Some(exogenous) = config.get_string("features", "exogenous_lags") {
        for item in parse_list(&exogenous) {
            let parsed = item
                .split_once(':')
                .and_then(|(name, days)| Some((name.trim().to_string(), days.trim().parse::<usize>().ok()?)));
            let Some((series, days)) = parsed else {
                return Err(MinecastError::config_invalid(
                    "features",
                    "exogenous_lags",
                    format!("{item:?} is not <series>:<days>"),
                ));
            };
            features.push(FeatureKind::Lag {
                series: Some(series),
                days,
            });
        }
    }

    let stats = config
        .get_string("features", "stats")
        .unwrap_or_else(|| "mean,std,min,max".to_string());
    let stats: Vec<RollingStat> = parse_list(&stats)
        .iter()
        .map(|s| {
            RollingStat::parse(s).ok_or_else(|| {
                MinecastError::config_invalid("features", "stats", format!("unknown statistic {s:?}"))
            })
        })
        .collect::<Result<_, _>>()?;
    for window in list("windows", "7,30,90")? {
        for &stat in &stats {
            features.push(FeatureKind::rolling(window, stat));
        }
    }

    for window in list("contemporaneous_windows", "")? {
        features.push(FeatureKind::Rolling {
            series: None,
            window,
            stat: RollingStat::Mean,
            contemporaneous: true,
        });
    }

    if config.get_bool("features", "calendar", true) {
        features.push(FeatureKind::DayOfWeek);
        features.push(FeatureKind::DaysSinceHalving);
    }

    let spec = FeatureSpec::new(features).with_schedule(build_halving_schedule(config)?);
    spec.validate()?;
    Ok(spec)
}

pub fn build_model_class(config: &dyn ConfigPort) -> Result<ModelClass, MinecastError> {
    let name = config
        .get_string("forecast", "model")
        .unwrap_or_else(|| "gbrt".to_string());
    let model = match ModelClass::parse(&name) {
        Some(ModelClass::GradientBoosting {
            n_trees,
            learning_rate,
            max_depth,
            min_samples_leaf,
            transform,
        }) => ModelClass::GradientBoosting {
            n_trees: get_usize(config, "forecast", "n_trees", n_trees)?,
            learning_rate: get_f64(config, "forecast", "learning_rate", learning_rate)?,
            max_depth: get_usize(config, "forecast", "max_depth", max_depth)?,
            min_samples_leaf: get_usize(config, "forecast", "min_samples_leaf", min_samples_leaf)?,
            transform: match config.get_string("forecast", "transform") {
                Some(t) => TargetTransform::parse(&t).ok_or_else(|| {
                    MinecastError::config_invalid("forecast", "transform", "expected level or difference")
                })?,
                None => transform,
            },
        },
        Some(ModelClass::HoltWinters {
            alpha,
            beta,
            gamma,
            season_length,
        }) => ModelClass::HoltWinters {
            alpha: get_f64(config, "forecast", "alpha", alpha)?,
            beta: get_f64(config, "forecast", "beta", beta)?,
            gamma: get_f64(config, "forecast", "gamma", gamma)?,
            season_length: get_usize(config, "forecast", "season_length", season_length)?,
        },
        None => {
            return Err(MinecastError::config_invalid(
                "forecast",
                "model",
                format!("unknown model {name:?}"),
            ));
        }
    };
    model.validate()?;
    Ok(model)
}

/// Plausible values for a target: HHI is bounded by its scale, everything
/// else is non-negative.
pub fn value_domain(target: &str, hhi: &HhiOptions) -> ValueDomain {
    if target == HHI_SERIES {
        ValueDomain::bounded(0.0, hhi.scale.max_value())
    } else {
        ValueDomain::non_negative()
    }
}

pub fn build_engine_config(
    config: &dyn ConfigPort,
    target: &str,
    hhi: &HhiOptions,
) -> Result<EngineConfig, MinecastError> {
    let engine = EngineConfig {
        horizon: get_usize(config, "forecast", "horizon", DEFAULT_HORIZON)?,
        folds: get_usize(config, "forecast", "folds", DEFAULT_FOLDS)?,
        stride: get_optional_usize(config, "forecast", "stride")?,
        min_rows: get_optional_usize(config, "forecast", "min_rows")?,
        model: build_model_class(config)?,
        mape_threshold: get_f64(config, "forecast", "mape_threshold", DEFAULT_MAPE_THRESHOLD)?,
        band_z: get_f64(config, "forecast", "band_z", DEFAULT_BAND_Z)?,
        domain: value_domain(target, hhi),
    };
    engine.validate()?;
    Ok(engine)
}

/// Price assumption of a scenario before the horizon is known.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceSpec {
    Constant(f64),
    Linear { start: f64, end: f64 },
    Explicit(Vec<f64>),
    /// Multiplier applied to the price forecast.
    Forecast(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSettings {
    pub name: String,
    pub price: PriceSpec,
    pub electricity_cost_per_kwh: f64,
    pub miner_efficiency_j_per_th: f64,
    pub pool_fee_fraction: f64,
}

impl ScenarioSettings {
    pub fn resolve(
        &self,
        horizon: usize,
        price_forecast: Option<&ForecastResult>,
    ) -> Result<ScenarioConfig, MinecastError> {
        let path = match &self.price {
            PriceSpec::Constant(p) => PricePath::constant(*p, horizon),
            PriceSpec::Linear { start, end } => PricePath::linear(*start, *end, horizon),
            PriceSpec::Explicit(prices) => PricePath::explicit(prices.clone()),
            PriceSpec::Forecast(multiplier) => match price_forecast {
                Some(forecast) => PricePath::from_forecast(forecast, *multiplier),
                None => {
                    return Err(MinecastError::InvalidScenario {
                        scenario: self.name.clone(),
                        reason: format!("needs a {PRICE} forecast; add {PRICE} to [forecast] targets"),
                    });
                }
            },
        };
        ScenarioConfig::new(
            self.name.clone(),
            path,
            self.electricity_cost_per_kwh,
            self.miner_efficiency_j_per_th,
            self.pool_fee_fraction,
        )
    }
}

pub fn build_scenarios(config: &dyn ConfigPort) -> Result<Vec<ScenarioSettings>, MinecastError> {
    scenario_names(config)
        .into_iter()
        .map(|name| {
            let section = format!("{SCENARIO_PREFIX}{name}");
            let number = |key: &str| {
                config
                    .get_string(&section, key)
                    .and_then(|v| v.trim().parse::<f64>().ok())
                    .ok_or_else(|| MinecastError::config_invalid(&section, key, "expected a number"))
            };

            let price = if config.get_string(&section, "price").is_some() {
                PriceSpec::Constant(number("price")?)
            } else if config.get_string(&section, "price_start").is_some() {
                PriceSpec::Linear {
                    start: number("price_start")?,
                    end: number("price_end")?,
                }
            } else if let Some(prices) = config.get_string(&section, "prices") {
                PriceSpec::Explicit(parse_f64_list(&section, "prices", &prices)?)
            } else if config.get_string(&section, "price_forecast_multiplier").is_some() {
                PriceSpec::Forecast(number("price_forecast_multiplier")?)
            } else {
                return Err(MinecastError::ConfigMissing {
                    section: section.clone(),
                    key: "price".into(),
                });
            };

            Ok(ScenarioSettings {
                price,
                electricity_cost_per_kwh: number("electricity_cost_per_kwh")?,
                miner_efficiency_j_per_th: number("miner_efficiency_j_per_th")?,
                pool_fee_fraction: number("pool_fee_fraction")?,
                name,
            })
        })
        .collect()
}

/// Outcome of one forecast pipeline run.
#[derive(Debug)]
pub struct PipelineSummary {
    pub calendar_days: usize,
    pub succeeded: Vec<ForecastResult>,
    pub failed: Vec<(String, MinecastError)>,
    pub scenario_rows: usize,
    /// Scenarios that could not be projected, by name.
    pub scenario_failures: Vec<(String, MinecastError)>,
    pub miner_rows: usize,
    pub records_written: usize,
}

fn read_chain_records(
    data_port: &dyn DataPort,
    sources: &[String],
) -> Result<(Vec<RawRecord>, Option<FeeDenomination>), MinecastError> {
    let mut records = Vec::new();
    let mut detected = None;
    for source in sources {
        let batch = data_port.fetch_chain_records(source)?;
        eprintln!(
            "  {}: {} values, {} rejected, {} blank",
            source,
            batch.records.len(),
            batch.rejected,
            batch.blank
        );
        if batch.rejected > 0 {
            tracing::warn!(source = %source, rejected = batch.rejected, "rejected non-numeric cells");
        }
        detected = detected.or(batch.fee_denomination);
        records.extend(batch.records);
    }
    Ok((records, detected))
}

fn read_pool_shares(data_port: &dyn DataPort) -> Result<Vec<PoolShareRecord>, MinecastError> {
    let batch = data_port.fetch_pool_shares()?;
    eprintln!(
        "  pools: {} rows, {} rejected",
        batch.records.len(),
        batch.rejected
    );
    if batch.rejected > 0 {
        tracing::warn!(rejected = batch.rejected, "rejected pool share rows");
    }
    Ok(batch.records)
}

fn fee_per_block(config: &dyn ConfigPort, store: &SeriesStore, params: &RevenueParams) -> f64 {
    if let Some(value) = config
        .get_string("scenarios", "fee_per_block_btc")
        .and_then(|v| v.trim().parse::<f64>().ok())
    {
        return value;
    }
    let recent = match (store.get(FEES), store.get(PRICE)) {
        (Ok(fees), Ok(price)) => mean_fee_per_block(fees, price, params, FEE_LOOKBACK_DAYS),
        _ => None,
    };
    recent.unwrap_or_else(|| {
        tracing::warn!("no fee history; scenarios assume zero fees per block");
        0.0
    })
}

/// Read, align, forecast, project scenarios and write the report.
pub fn run_forecast_pipeline(
    data_port: &dyn DataPort,
    report: &dyn ReportPort,
    config: &dyn ConfigPort,
    target_override: &[String],
    output: &Path,
) -> Result<PipelineSummary, MinecastError> {
    let sources = parse_list(&config.get_string("data", "sources").unwrap_or_default());
    eprintln!("Reading {} source(s)...", sources.len());
    let (records, detected) = read_chain_records(data_port, &sources)?;
    let pool_shares = match config.get_string("data", "pool_file") {
        Some(_) => Some(read_pool_shares(data_port)?),
        None => None,
    };

    let policy = build_calendar_policy(config)?;
    let hhi = build_hhi_options(config)?;
    let params = build_revenue_params(config, detected)?;
    let spec = build_feature_spec(config)?;

    let assembly = assemble(&records, pool_shares.as_deref(), &hhi, Some(&params), &policy)?;
    let store = assembly.store;
    let mut hhi_error = None;
    eprintln!(
        "Aligned {} series over {} days ({} to {})",
        store.names().len(),
        store.calendar().len(),
        store.start(),
        store.end()
    );
    match assembly.hhi {
        Some(Ok(outcome)) if !outcome.excluded.is_empty() => {
            eprintln!("  HHI: {} incomplete date(s) excluded", outcome.excluded.len());
        }
        Some(Err(e)) => {
            eprintln!("  HHI: not computed ({e})");
            hhi_error = Some(e);
        }
        _ => {}
    }

    let targets: Vec<String> = if target_override.is_empty() {
        parse_list(&config.get_string("forecast", "targets").unwrap_or_default())
    } else {
        target_override.to_vec()
    };
    let mut failed = Vec::new();
    let mut jobs = Vec::with_capacity(targets.len());
    for target in &targets {
        if target == HHI_SERIES {
            if let Some(e) = hhi_error.take() {
                eprintln!("  {target}: failed ({e})");
                failed.push((target.clone(), e));
                continue;
            }
        }
        jobs.push(TargetJob {
            target: target.clone(),
            spec: spec.clone(),
            config: build_engine_config(config, target, &hhi)?,
        });
    }

    eprintln!("Forecasting {} target(s)...", jobs.len());
    let mut succeeded = Vec::new();
    for outcome in run_targets(&store, &jobs) {
        match outcome.result {
            Ok(result) => {
                eprintln!(
                    "  {}: {} from {}, {} days, MAPE {:.2}%{}{}",
                    result.target,
                    result.model,
                    result.origin,
                    result.horizon(),
                    result.score.mape * 100.0,
                    if result.low_confidence { " [low confidence]" } else { "" },
                    if result.was_clipped() { " [clipped]" } else { "" },
                );
                succeeded.push(result);
            }
            Err(e) => {
                eprintln!("  {}: failed ({})", outcome.target, e);
                failed.push((outcome.target, e));
            }
        }
    }

    let mut table: Vec<TableRecord> = Vec::new();
    if config.get_bool("report", "include_history", true) {
        for name in targets.iter().map(String::as_str).chain([HHI_SERIES, REVENUE_SERIES]) {
            if let Ok(series) = store.get(name) {
                if !table.iter().any(|r| r.metric == name) {
                    table.extend(series_records(series));
                }
            }
        }
    }
    for result in &succeeded {
        table.extend(forecast_records(result));
    }

    let mut miner_rows = 0;
    if let Some(miner_th) = get_optional_f64(config, "revenue", "miner_th")? {
        match (store.get(PRICE), store.get(DIFFICULTY), store.get(HASHRATE), store.get(FEES)) {
            (Ok(price), Ok(difficulty), Ok(hashrate), Ok(fees)) => {
                let inputs = RevenueInputs {
                    price,
                    difficulty,
                    hashrate,
                    fees,
                };
                let (rows, skipped) = revenue_table(inputs, &params, miner_th);
                if skipped > 0 {
                    tracing::warn!(skipped, "miner revenue dates with missing inputs");
                }
                eprintln!("Miner revenue: {} day(s) at {} TH/s", rows.len(), miner_th);
                miner_rows = rows.len();
                table.extend(miner_revenue_records(&rows));
            }
            _ => eprintln!(
                "warning: miner revenue needs {PRICE}, {DIFFICULTY}, {HASHRATE} and {FEES}; skipped"
            ),
        }
    }

    let scenario_settings = build_scenarios(config)?;
    let mut scenario_rows = 0;
    let mut scenario_failures = Vec::new();
    if !scenario_settings.is_empty() {
        let preferred = match params.basis {
            RevenueBasis::Difficulty => [DIFFICULTY, HASHRATE],
            RevenueBasis::Hashrate => [HASHRATE, DIFFICULTY],
        };
        let network = preferred
            .iter()
            .find_map(|name| succeeded.iter().find(|r| r.target == *name));
        match network {
            Some(network) => {
                let price_forecast = succeeded.iter().find(|r| r.target == PRICE);
                match ScenarioEngine::new(params.clone(), fee_per_block(config, &store, &params)) {
                    Ok(engine) => {
                        let mut projected = 0;
                        for settings in &scenario_settings {
                            let estimates = settings
                                .resolve(network.horizon(), price_forecast)
                                .and_then(|scenario| engine.run(network, &scenario));
                            match estimates {
                                Ok(estimates) => {
                                    projected += 1;
                                    scenario_rows += estimates.len();
                                    table.extend(revenue_records(&estimates));
                                }
                                Err(e) => {
                                    eprintln!("  scenario {}: failed ({})", settings.name, e);
                                    scenario_failures.push((settings.name.clone(), e));
                                }
                            }
                        }
                        eprintln!(
                            "Projected {} of {} scenario(s) on the {} forecast",
                            projected,
                            scenario_settings.len(),
                            network.target
                        );
                    }
                    Err(e) => {
                        eprintln!("warning: scenarios skipped ({e})");
                        scenario_failures.extend(scenario_settings.iter().map(|s| {
                            let reason = e.to_string();
                            (s.name.clone(), MinecastError::InvalidScenario { scenario: s.name.clone(), reason })
                        }));
                    }
                }
            }
            None => {
                eprintln!("warning: no {DIFFICULTY} or {HASHRATE} forecast; scenarios skipped");
            }
        }
    }

    report.write(&table, output)?;
    Ok(PipelineSummary {
        calendar_days: store.calendar().len(),
        succeeded,
        failed,
        scenario_rows,
        scenario_failures,
        miner_rows,
        records_written: table.len(),
    })
}

fn output_path(output: Option<&PathBuf>, config: &dyn ConfigPort, default: &str) -> PathBuf {
    output
        .cloned()
        .or_else(|| config.get_string("report", "output").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(default))
}

pub fn run_forecast(config_path: &PathBuf, output: Option<&PathBuf>, targets: &[String]) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if let Err(e) = validate_config(&config) {
        return fail(e);
    }
    let data_port = match build_data_adapter(&config) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };

    let output = output_path(output, &config, "forecast.csv");
    match run_forecast_pipeline(&data_port, &CsvReportAdapter, &config, targets, &output) {
        Ok(summary) => {
            eprintln!(
                "\nReport written to: {} ({} rows)",
                output.display(),
                summary.records_written
            );
            match summary.failed.first() {
                Some((_, e)) if summary.succeeded.is_empty() => e.into(),
                _ => ExitCode::SUCCESS,
            }
        }
        Err(e) => fail(e),
    }
}

pub fn run_hhi(config_path: &PathBuf, output: Option<&PathBuf>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let result = (|| -> Result<(PathBuf, usize), MinecastError> {
        let options = build_hhi_options(&config)?;
        let data_port = build_data_adapter(&config)?;
        let shares = read_pool_shares(&data_port)?;
        let outcome = compute_hhi(&aggregate_pool_shares(&shares), &options)?;
        if !outcome.excluded.is_empty() {
            eprintln!("{} incomplete date(s) excluded:", outcome.excluded.len());
            for excluded in &outcome.excluded {
                eprintln!("  {}: {} blocks", excluded.date, excluded.blocks);
            }
        }
        let records = series_records(&outcome.series);
        let output = output_path(output, &config, "hhi.csv");
        CsvReportAdapter.write(&records, &output)?;
        Ok((output, records.len()))
    })();

    match result {
        Ok((output, rows)) => {
            eprintln!("HHI written to: {} ({} days)", output.display(), rows);
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

pub fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let result = (|| -> Result<(), MinecastError> {
        validate_config(&config)?;
        let spec = build_feature_spec(&config)?;
        let hhi = build_hhi_options(&config)?;
        build_calendar_policy(&config)?;
        build_revenue_params(&config, None)?;
        let targets = parse_list(&config.get_string("forecast", "targets").unwrap_or_default());
        let engine = targets
            .iter()
            .map(|t| build_engine_config(&config, t, &hhi))
            .collect::<Result<Vec<_>, _>>()?;
        let scenarios = build_scenarios(&config)?;

        eprintln!("\nFeatures ({}):", spec.features.len());
        for feature in &spec.features {
            eprintln!("  {}", feature);
        }
        if let Some(first) = engine.first() {
            eprintln!(
                "\nForecast: {} over {} days, {} folds, stride {}",
                first.model.name(),
                first.horizon,
                first.folds,
                first.stride()
            );
        }
        eprintln!("  targets: {}", targets.join(", "));
        eprintln!("\nScenarios:");
        for s in &scenarios {
            eprintln!(
                "  {}: {:?}, ${}/kWh, {} J/TH, pool fee {}",
                s.name, s.price, s.electricity_cost_per_kwh, s.miner_efficiency_j_per_th, s.pool_fee_fraction
            );
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            eprintln!("\nConfiguration is valid.");
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

pub fn run_info(config_path: &PathBuf) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let adapter = match build_data_adapter(&config) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };
    let sources = match adapter.list_sources() {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    if sources.is_empty() {
        eprintln!("No sources found");
    }
    for source in &sources {
        match adapter.fetch_chain_records(source) {
            Ok(batch) => {
                let mut fields: Vec<&str> = batch.records.iter().map(|r| r.field.as_str()).collect();
                fields.sort_unstable();
                fields.dedup();
                for field in fields {
                    let dates = batch.records.iter().filter(|r| r.field == field).map(|r| r.date);
                    let count = dates.clone().count();
                    if let (Some(min), Some(max)) = (dates.clone().min(), dates.max()) {
                        println!("{}.{}: {} values, {} to {}", source, field, count, min, max);
                    }
                }
            }
            Err(e) => eprintln!("error reading {}: {}", source, e),
        }
    }

    if config.get_string("data", "pool_file").is_some() {
        match adapter.fetch_pool_shares() {
            Ok(batch) => {
                let days = aggregate_pool_shares(&batch.records);
                if let (Some(first), Some(last)) = (days.keys().next(), days.keys().next_back()) {
                    println!("pools: {} days, {} to {}", days.len(), first, last);
                }
            }
            Err(e) => eprintln!("error reading pool shares: {}", e),
        }
    }
    ExitCode::SUCCESS
}
