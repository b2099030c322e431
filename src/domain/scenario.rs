//! Forward miner revenue under named scenarios.
//!
//! For forecast step i on date d:
//!
//! ```text
//! gross       = btc_per_th_day(d, network_i) * price_path[i]
//! pool_fee    = gross * pool_fee_fraction
//! electricity = efficiency_j_per_th * 24 / 1000 * cost_per_kwh
//! net         = gross - pool_fee - electricity
//! ```
//!
//! All amounts are USD per TH/s per day. The upper network bound of the
//! forecast gives the lower revenue bound and vice versa.

use crate::domain::error::MinecastError;
use crate::domain::forecast::ForecastResult;
use crate::domain::revenue::{RevenueBasis, RevenueParams};
use crate::domain::series::{DIFFICULTY, HASHRATE};
use chrono::NaiveDate;

const HOURS_PER_DAY: f64 = 24.0;
const WATTS_PER_KILOWATT: f64 = 1000.0;

/// BTC/USD price per forecast step.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePath(Vec<f64>);

impl PricePath {
    pub fn constant(price: f64, len: usize) -> Self {
        Self(vec![price; len])
    }

    /// `len` prices moving linearly from `start` to `end` inclusive.
    pub fn linear(start: f64, end: f64, len: usize) -> Self {
        let step = if len > 1 {
            (end - start) / (len - 1) as f64
        } else {
            0.0
        };
        Self((0..len).map(|i| start + step * i as f64).collect())
    }

    pub fn explicit(prices: Vec<f64>) -> Self {
        Self(prices)
    }

    /// Point forecasts of a price target scaled by `multiplier`.
    pub fn from_forecast(forecast: &ForecastResult, multiplier: f64) -> Self {
        Self(forecast.points.iter().map(|p| p.point * multiplier).collect())
    }

    pub fn prices(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    name: String,
    price_path: PricePath,
    electricity_cost_per_kwh: f64,
    miner_efficiency_j_per_th: f64,
    pool_fee_fraction: f64,
}

impl ScenarioConfig {
    pub fn new(
        name: impl Into<String>,
        price_path: PricePath,
        electricity_cost_per_kwh: f64,
        miner_efficiency_j_per_th: f64,
        pool_fee_fraction: f64,
    ) -> Result<Self, MinecastError> {
        let name = name.into();
        let invalid = |reason: String| {
            Err(MinecastError::InvalidScenario {
                scenario: name.clone(),
                reason,
            })
        };

        for (label, value) in [
            ("electricity_cost_per_kwh", electricity_cost_per_kwh),
            ("miner_efficiency_j_per_th", miner_efficiency_j_per_th),
            ("pool_fee_fraction", pool_fee_fraction),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return invalid(format!("{label} must be positive, got {value}"));
            }
        }
        if pool_fee_fraction >= 1.0 {
            return invalid(format!("pool_fee_fraction must be below 1, got {pool_fee_fraction}"));
        }
        if price_path.is_empty() {
            return invalid("price path is empty".into());
        }
        if let Some((i, p)) = price_path
            .prices()
            .iter()
            .enumerate()
            .find(|(_, p)| !(p.is_finite() && **p > 0.0))
        {
            return invalid(format!("price path entry {i} is not a positive price ({p})"));
        }

        Ok(Self {
            name,
            price_path,
            electricity_cost_per_kwh,
            miner_efficiency_j_per_th,
            pool_fee_fraction,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price_path(&self) -> &PricePath {
        &self.price_path
    }

    pub fn electricity_cost_per_kwh(&self) -> f64 {
        self.electricity_cost_per_kwh
    }

    pub fn miner_efficiency_j_per_th(&self) -> f64 {
        self.miner_efficiency_j_per_th
    }

    pub fn pool_fee_fraction(&self) -> f64 {
        self.pool_fee_fraction
    }

    /// Daily electricity cost of 1 TH/s in USD.
    pub fn electricity_usd_per_th_day(&self) -> f64 {
        self.miner_efficiency_j_per_th * HOURS_PER_DAY / WATTS_PER_KILOWATT * self.electricity_cost_per_kwh
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RevenueEstimate {
    pub scenario: String,
    pub date: NaiveDate,
    pub btc_per_day: f64,
    pub gross_usd: f64,
    pub pool_fee_usd: f64,
    pub electricity_usd: f64,
    pub net_usd: f64,
    pub net_lower_usd: f64,
    pub net_upper_usd: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioEngine {
    params: RevenueParams,
    fee_per_block_btc: f64,
}

impl ScenarioEngine {
    pub fn new(params: RevenueParams, fee_per_block_btc: f64) -> Result<Self, MinecastError> {
        params.validate()?;
        if !(fee_per_block_btc.is_finite() && fee_per_block_btc >= 0.0) {
            return Err(MinecastError::config_invalid(
                "scenarios",
                "fee_per_block_btc",
                "must be a non-negative number",
            ));
        }
        Ok(Self {
            params,
            fee_per_block_btc,
        })
    }

    pub fn fee_per_block_btc(&self) -> f64 {
        self.fee_per_block_btc
    }

    pub fn run(
        &self,
        forecast: &ForecastResult,
        scenario: &ScenarioConfig,
    ) -> Result<Vec<RevenueEstimate>, MinecastError> {
        let invalid = |reason: String| MinecastError::InvalidScenario {
            scenario: scenario.name().to_string(),
            reason,
        };

        let basis = match forecast.target.as_str() {
            DIFFICULTY => RevenueBasis::Difficulty,
            HASHRATE => RevenueBasis::Hashrate,
            other => {
                return Err(invalid(format!(
                    "forecast target {other} is neither {DIFFICULTY} nor {HASHRATE}"
                )));
            }
        };
        if scenario.price_path().len() < forecast.horizon() {
            return Err(invalid(format!(
                "price path has {} entries, forecast horizon is {}",
                scenario.price_path().len(),
                forecast.horizon()
            )));
        }

        let params = RevenueParams {
            basis,
            ..self.params.clone()
        };
        let electricity = scenario.electricity_usd_per_th_day();
        let keep = 1.0 - scenario.pool_fee_fraction();

        forecast
            .points
            .iter()
            .zip(scenario.price_path().prices())
            .map(|(point, &price)| {
                let btc = |network: f64| params.btc_per_th_day(point.date, network, self.fee_per_block_btc);
                let btc_per_day = btc(point.point).ok_or_else(|| {
                    invalid(format!("non-positive forecast {} on {}", forecast.target, point.date))
                })?;
                let net = |btc: f64| btc * price * keep - electricity;

                let gross_usd = btc_per_day * price;
                let pool_fee_usd = gross_usd * scenario.pool_fee_fraction();
                Ok(RevenueEstimate {
                    scenario: scenario.name().to_string(),
                    date: point.date,
                    btc_per_day,
                    gross_usd,
                    pool_fee_usd,
                    electricity_usd: electricity,
                    net_usd: gross_usd - pool_fee_usd - electricity,
                    net_lower_usd: btc(point.upper).map_or(net(0.0), net),
                    net_upper_usd: btc(point.lower).map_or(f64::INFINITY, net),
                })
            })
            .collect()
    }

    /// Run every scenario against the same forecast. Output is grouped by
    /// scenario, in input order, each covering the same dates.
    pub fn run_all(
        &self,
        forecast: &ForecastResult,
        scenarios: &[ScenarioConfig],
    ) -> Result<Vec<RevenueEstimate>, MinecastError> {
        let mut out = Vec::with_capacity(forecast.horizon() * scenarios.len());
        for scenario in scenarios {
            out.extend(self.run(forecast, scenario)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::forecast::{ForecastPoint, ValidationScore};
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn origin() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn forecast(target: &str, values: &[(f64, f64, f64)]) -> ForecastResult {
        ForecastResult {
            target: target.to_string(),
            origin: origin(),
            model: "test",
            points: values
                .iter()
                .enumerate()
                .map(|(i, &(lower, point, upper))| ForecastPoint {
                    date: origin() + Duration::days(i as i64 + 1),
                    point,
                    lower,
                    upper,
                })
                .collect(),
            score: ValidationScore {
                folds: Vec::new(),
                mae: 0.0,
                mape: 0.0,
                step_mae: Vec::new(),
            },
            low_confidence: false,
            clipped: 0,
        }
    }

    fn scenario(prices: Vec<f64>) -> ScenarioConfig {
        ScenarioConfig::new("base", PricePath::explicit(prices), 0.05, 20.0, 0.02).unwrap()
    }

    #[test]
    fn scenario_validation() {
        let path = || PricePath::constant(60_000.0, 3);
        assert!(ScenarioConfig::new("a", path(), 0.0, 20.0, 0.02).is_err());
        assert!(ScenarioConfig::new("a", path(), 0.05, -1.0, 0.02).is_err());
        assert!(ScenarioConfig::new("a", path(), 0.05, 20.0, 0.0).is_err());
        assert!(ScenarioConfig::new("a", path(), 0.05, 20.0, 1.0).is_err());
        assert!(ScenarioConfig::new("a", PricePath::explicit(vec![]), 0.05, 20.0, 0.02).is_err());
        assert!(ScenarioConfig::new("a", PricePath::explicit(vec![1.0, -5.0]), 0.05, 20.0, 0.02).is_err());
        assert!(ScenarioConfig::new("a", path(), 0.05, 20.0, 0.02).is_ok());
    }

    #[test]
    fn electricity_cost() {
        let s = scenario(vec![1.0]);
        // 20 W per TH/s for 24 h = 0.48 kWh at $0.05
        assert_relative_eq!(s.electricity_usd_per_th_day(), 0.024, max_relative = 1e-12);
    }

    #[test]
    fn revenue_components() {
        let engine = ScenarioEngine::new(RevenueParams::default(), 0.1).unwrap();
        let difficulty = 100e12;
        let f = forecast(DIFFICULTY, &[(90e12, difficulty, 110e12)]);
        let out = engine.run(&f, &scenario(vec![50_000.0])).unwrap();

        let blocks = 1e12 * 86_400.0 / (difficulty * 4_294_967_296.0);
        let btc = blocks * (3.125 + 0.1);
        let gross = btc * 50_000.0;
        let e = &out[0];
        assert_relative_eq!(e.btc_per_day, btc, max_relative = 1e-12);
        assert_relative_eq!(e.gross_usd, gross, max_relative = 1e-12);
        assert_relative_eq!(e.pool_fee_usd, gross * 0.02, max_relative = 1e-12);
        assert_relative_eq!(e.net_usd, gross * 0.98 - 0.024, max_relative = 1e-9);
        assert!(e.net_lower_usd < e.net_usd && e.net_usd < e.net_upper_usd);
    }

    #[test]
    fn run_is_deterministic() {
        let engine = ScenarioEngine::new(RevenueParams::default(), 0.05).unwrap();
        let f = forecast(HASHRATE, &[(5e20, 6e20, 7e20), (5e20, 6.1e20, 7.2e20)]);
        let s = scenario(vec![60_000.0, 61_000.0]);
        let a = engine.run(&f, &s).unwrap();
        let b = engine.run(&f, &s).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.net_usd.to_bits(), y.net_usd.to_bits());
            assert_eq!(x.gross_usd.to_bits(), y.gross_usd.to_bits());
        }
    }

    #[test]
    fn short_price_path_rejected() {
        let engine = ScenarioEngine::new(RevenueParams::default(), 0.0).unwrap();
        let f = forecast(DIFFICULTY, &[(1e12, 1e12, 1e12), (1e12, 1e12, 1e12)]);
        let err = engine.run(&f, &scenario(vec![50_000.0])).unwrap_err();
        assert!(matches!(err, MinecastError::InvalidScenario { .. }));
    }

    #[test]
    fn price_target_rejected() {
        let engine = ScenarioEngine::new(RevenueParams::default(), 0.0).unwrap();
        let f = forecast("price", &[(1.0, 1.0, 1.0)]);
        assert!(engine.run(&f, &scenario(vec![50_000.0])).is_err());
    }

    #[test]
    fn zero_lower_bound_gives_unbounded_upper_revenue() {
        let engine = ScenarioEngine::new(RevenueParams::default(), 0.0).unwrap();
        let f = forecast(DIFFICULTY, &[(0.0, 1e12, 2e12)]);
        let out = engine.run(&f, &scenario(vec![50_000.0])).unwrap();
        assert!(out[0].net_upper_usd.is_infinite());
    }

    #[test]
    fn run_all_keeps_scenario_order() {
        let engine = ScenarioEngine::new(RevenueParams::default(), 0.0).unwrap();
        let f = forecast(DIFFICULTY, &[(1e14, 1e14, 1e14), (1e14, 1e14, 1e14)]);
        let cheap = ScenarioConfig::new("cheap", PricePath::constant(50_000.0, 2), 0.03, 20.0, 0.01).unwrap();
        let dear = ScenarioConfig::new("dear", PricePath::constant(50_000.0, 2), 0.10, 20.0, 0.01).unwrap();
        let out = engine.run_all(&f, &[cheap, dear]).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].scenario, "cheap");
        assert_eq!(out[2].scenario, "dear");
        assert_eq!(out[0].date, out[2].date);
        assert!(out[0].net_usd > out[2].net_usd);
    }

    #[test]
    fn linear_price_path() {
        let path = PricePath::linear(100.0, 200.0, 3);
        assert_eq!(path.prices(), &[100.0, 150.0, 200.0]);
    }
}
