//! Configuration validation.
//!
//! Checks every section before any data is read, so a bad value fails fast
//! with the section and key that caused it.

use crate::domain::error::MinecastError;
use crate::domain::feature::RollingStat;
use crate::domain::halving::HalvingSchedule;
use crate::domain::model::{ModelClass, TargetTransform};
use crate::ports::config_port::ConfigPort;

pub const SCENARIO_PREFIX: &str = "scenario.";

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), MinecastError> {
    validate_data(config)?;
    validate_alignment(config)?;
    validate_hhi(config)?;
    validate_revenue(config)?;
    validate_features(config)?;
    validate_forecast(config)?;
    validate_scenarios(config)?;
    Ok(())
}

/// Comma-separated list, trimmed, empty entries dropped.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn parse_usize_list(section: &str, key: &str, value: &str) -> Result<Vec<usize>, MinecastError> {
    parse_list(value)
        .iter()
        .map(|item| {
            item.parse::<usize>().map_err(|_| {
                MinecastError::config_invalid(section, key, format!("{item:?} is not a whole number"))
            })
        })
        .collect()
}

pub fn parse_f64_list(section: &str, key: &str, value: &str) -> Result<Vec<f64>, MinecastError> {
    parse_list(value)
        .iter()
        .map(|item| {
            item.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| MinecastError::config_invalid(section, key, format!("{item:?} is not a number")))
        })
        .collect()
}

fn require_string(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, MinecastError> {
    config
        .get_string(section, key)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| MinecastError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        })
}

fn check_choice(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    choices: &[&str],
) -> Result<(), MinecastError> {
    match config.get_string(section, key) {
        Some(value) if !choices.contains(&value.trim().to_lowercase().as_str()) => {
            Err(MinecastError::config_invalid(
                section,
                key,
                format!("{value:?} is not one of {}", choices.join(", ")),
            ))
        }
        _ => Ok(()),
    }
}

fn check_positive(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), MinecastError> {
    if config.get_string(section, key).is_some() && config.get_double(section, key, -1.0) <= 0.0 {
        return Err(MinecastError::config_invalid(section, key, "must be a positive number"));
    }
    Ok(())
}

/// A present value must parse as a finite number; returns it.
fn check_number(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, MinecastError> {
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

fn check_whole(config: &dyn ConfigPort, section: &str, key: &str, minimum: i64) -> Result<(), MinecastError> {
    if config.get_string(section, key).is_some() && config.get_int(section, key, i64::MIN) < minimum {
        return Err(MinecastError::config_invalid(
            section,
            key,
            format!("must be a whole number of at least {minimum}"),
        ));
    }
    Ok(())
}

fn validate_data(config: &dyn ConfigPort) -> Result<(), MinecastError> {
    require_string(config, "data", "base_path")?;
    let sources = require_string(config, "data", "sources")?;
    if parse_list(&sources).is_empty() {
        return Err(MinecastError::config_invalid("data", "sources", "no sources listed"));
    }
    Ok(())
}

fn validate_alignment(config: &dyn ConfigPort) -> Result<(), MinecastError> {
    check_whole(config, "alignment", "max_fill_gap", 0)?;
    let conflict = require_string(config, "alignment", "conflict")?;
    let conflict = conflict.trim().to_lowercase();
    match conflict.strip_prefix("prefer:") {
        Some(order) if parse_list(order).is_empty() => Err(MinecastError::config_invalid(
            "alignment",
            "conflict",
            "prefer: needs at least one source",
        )),
        Some(_) => Ok(()),
        None if conflict == "average" || conflict == "fail" => Ok(()),
        None => Err(MinecastError::config_invalid(
            "alignment",
            "conflict",
            "expected average, fail or prefer:<source>,...",
        )),
    }
}

fn validate_hhi(config: &dyn ConfigPort) -> Result<(), MinecastError> {
    check_choice(config, "hhi", "scale", &["percent", "fraction"])?;
    check_choice(config, "hhi", "on_incomplete", &["fail", "exclude"])?;
    check_whole(config, "hhi", "min_blocks", 1)
}

fn validate_revenue(config: &dyn ConfigPort) -> Result<(), MinecastError> {
    check_choice(config, "revenue", "basis", &["difficulty", "hashrate"])?;
    check_choice(config, "revenue", "fee_denomination", &["native", "usd"])?;
    for key in ["blocks_per_day", "hashes_per_difficulty", "hashrate_unit_hs", "miner_th"] {
        check_positive(config, "revenue", key)?;
    }
    if let Some(halvings) = config.get_string("revenue", "halvings") {
        HalvingSchedule::parse(&halvings)?;
    }
    Ok(())
}

fn validate_features(config: &dyn ConfigPort) -> Result<(), MinecastError> {
    for key in ["lags", "windows", "contemporaneous_windows"] {
        if let Some(value) = config.get_string("features", key) {
            if parse_usize_list("features", key, &value)?.contains(&0) {
                return Err(MinecastError::config_invalid("features", key, "entries must be at least 1"));
            }
        }
    }
    if let Some(stats) = config.get_string("features", "stats") {
        for stat in parse_list(&stats) {
            if RollingStat::parse(&stat).is_none() {
                return Err(MinecastError::config_invalid(
                    "features",
                    "stats",
                    format!("unknown statistic {stat:?}"),
                ));
            }
        }
    }
    if let Some(exogenous) = config.get_string("features", "exogenous_lags") {
        for item in parse_list(&exogenous) {
            let valid = item
                .split_once(':')
                .is_some_and(|(name, days)| !name.trim().is_empty() && days.trim().parse::<usize>().is_ok_and(|d| d > 0));
            if !valid {
                return Err(MinecastError::config_invalid(
                    "features",
                    "exogenous_lags",
                    format!("{item:?} is not <series>:<days>"),
                ));
            }
        }
    }
    Ok(())
}

fn validate_forecast(config: &dyn ConfigPort) -> Result<(), MinecastError> {
    let targets = require_string(config, "forecast", "targets")?;
    if parse_list(&targets).is_empty() {
        return Err(MinecastError::config_invalid("forecast", "targets", "no targets listed"));
    }
    for key in ["horizon", "folds", "stride", "min_rows", "n_trees", "max_depth", "min_samples_leaf"] {
        check_whole(config, "forecast", key, 1)?;
    }
    check_whole(config, "forecast", "season_length", 2)?;
    for key in ["mape_threshold", "learning_rate"] {
        check_positive(config, "forecast", key)?;
    }
    if check_number(config, "forecast", "band_z")?.is_some_and(|z| z < 0.0) {
        return Err(MinecastError::config_invalid("forecast", "band_z", "must be non-negative"));
    }
    for key in ["alpha", "beta", "gamma"] {
        check_number(config, "forecast", key)?;
    }
    if let Some(model) = config.get_string("forecast", "model") {
        if ModelClass::parse(&model).is_none() {
            return Err(MinecastError::config_invalid(
                "forecast",
                "model",
                format!("unknown model {model:?}"),
            ));
        }
    }
    if let Some(transform) = config.get_string("forecast", "transform") {
        if TargetTransform::parse(&transform).is_none() {
            return Err(MinecastError::config_invalid(
                "forecast",
                "transform",
                "expected level or difference",
            ));
        }
    }
    let horizon = config.get_int("forecast", "horizon", 30);
    if config.get_int("forecast", "stride", horizon) < horizon {
        return Err(MinecastError::config_invalid(
            "forecast",
            "stride",
            "must not be shorter than the horizon",
        ));
    }
    Ok(())
}

/// Scenario sections named in `[scenarios] names`, or every `[scenario.*]`
/// section when no names are given. Sorted when discovered.
pub fn scenario_names(config: &dyn ConfigPort) -> Vec<String> {
    if let Some(names) = config.get_string("scenarios", "names") {
        return parse_list(&names).into_iter().map(|n| n.to_lowercase()).collect();
    }
    let mut names: Vec<String> = config
        .sections()
        .into_iter()
        .filter_map(|s| s.strip_prefix(SCENARIO_PREFIX).map(str::to_string))
        .collect();
    names.sort();
    names
}

fn validate_scenarios(config: &dyn ConfigPort) -> Result<(), MinecastError> {
    if config.get_string("scenarios", "fee_per_block_btc").is_some()
        && config.get_double("scenarios", "fee_per_block_btc", -1.0) < 0.0
    {
        return Err(MinecastError::config_invalid(
            "scenarios",
            "fee_per_block_btc",
            "must be a non-negative number",
        ));
    }

    let sections = config.sections();
    for name in scenario_names(config) {
        let section = format!("{SCENARIO_PREFIX}{name}");
        if !sections.contains(&section) {
            return Err(MinecastError::ConfigMissing {
                section,
                key: "(section)".into(),
            });
        }
        for key in [
            "electricity_cost_per_kwh",
            "miner_efficiency_j_per_th",
            "pool_fee_fraction",
        ] {
            require_string(config, &section, key)?;
        }

        let price_keys = ["price", "price_start", "prices", "price_forecast_multiplier"];
        let given = price_keys
            .iter()
            .filter(|k| config.get_string(&section, k).is_some())
            .count();
        if given != 1 {
            return Err(MinecastError::config_invalid(
                &section,
                "price",
                "set exactly one of price, price_start/price_end, prices, price_forecast_multiplier",
            ));
        }
        if config.get_string(&section, "price_start").is_some() {
            require_string(config, &section, "price_end")?;
        }
        if let Some(prices) = config.get_string(&section, "prices") {
            parse_f64_list(&section, "prices", &prices)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapConfig(HashMap<(String, String), String>);

    impl MapConfig {
        fn new(entries: &[(&str, &str, &str)]) -> Self {
            Self(
                entries
                    .iter()
                    .map(|(s, k, v)| ((s.to_string(), k.to_string()), v.to_string()))
                    .collect(),
            )
        }
    }

    impl ConfigPort for MapConfig {
        fn get_string(&self, section: &str, key: &str) -> Option<String> {
            self.0.get(&(section.to_string(), key.to_string())).cloned()
        }
        fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
            self.get_string(section, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }
        fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
            self.get_string(section, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }
        fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
            self.get_string(section, key)
                .map(|v| v == "true")
                .unwrap_or(default)
        }
        fn sections(&self) -> Vec<String> {
            let mut out: Vec<String> = self.0.keys().map(|(s, _)| s.clone()).collect();
            out.sort();
            out.dedup();
            out
        }
    }

    fn base() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("data", "base_path", "data"),
            ("data", "sources", "btc"),
            ("alignment", "conflict", "average"),
            ("forecast", "targets", "difficulty"),
            ("scenario.base", "price", "60000"),
            ("scenario.base", "electricity_cost_per_kwh", "0.05"),
            ("scenario.base", "miner_efficiency_j_per_th", "20"),
            ("scenario.base", "pool_fee_fraction", "0.02"),
        ]
    }

    fn with(extra: &[(&'static str, &'static str, &'static str)]) -> MapConfig {
        let mut entries = base();
        for e in extra {
            entries.retain(|(s, k, _)| !(s == &e.0 && k == &e.1));
            entries.push(*e);
        }
        MapConfig::new(&entries)
    }

    #[test]
    fn minimal_config_is_valid() {
        assert!(validate_config(&with(&[])).is_ok());
    }

    #[test]
    fn missing_sources_reported() {
        let config = MapConfig::new(&[("data", "base_path", "data")]);
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, MinecastError::ConfigMissing { ref key, .. } if key == "sources"));
    }

    #[test]
    fn conflict_policy_spellings() {
        assert!(validate_config(&with(&[("alignment", "conflict", "prefer:btc,bc")])).is_ok());
        assert!(validate_config(&with(&[("alignment", "conflict", "prefer:")])).is_err());
        assert!(validate_config(&with(&[("alignment", "conflict", "newest")])).is_err());
    }

    #[test]
    fn hhi_scale_choice() {
        assert!(validate_config(&with(&[("hhi", "scale", "Fraction")])).is_ok());
        assert!(validate_config(&with(&[("hhi", "scale", "basis_points")])).is_err());
    }

    #[test]
    fn stride_below_horizon_rejected() {
        let config = with(&[("forecast", "horizon", "30"), ("forecast", "stride", "10")]);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn unknown_model_rejected() {
        assert!(validate_config(&with(&[("forecast", "model", "prophet")])).is_err());
    }

    #[test]
    fn zero_lag_rejected() {
        assert!(validate_config(&with(&[("features", "lags", "0,7")])).is_err());
    }

    #[test]
    fn exogenous_lag_format() {
        assert!(validate_config(&with(&[("features", "exogenous_lags", "hashrate:1")])).is_ok());
        assert!(validate_config(&with(&[("features", "exogenous_lags", "hashrate")])).is_err());
    }

    #[test]
    fn scenario_needs_exactly_one_price() {
        let config = with(&[("scenario.base", "prices", "1,2,3")]);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn named_scenario_must_exist() {
        let config = with(&[("scenarios", "names", "base, bear")]);
        assert!(matches!(
            validate_config(&config).unwrap_err(),
            MinecastError::ConfigMissing { .. }
        ));
    }

    #[test]
    fn scenario_names_discovered_from_sections() {
        assert_eq!(scenario_names(&with(&[])), vec!["base"]);
    }

    #[test]
    fn bad_halving_schedule_rejected() {
        assert!(validate_config(&with(&[("revenue", "halvings", "2020-05-11")])).is_err());
    }

    #[test]
    fn non_numeric_forecast_values_rejected() {
        for key in ["band_z", "mape_threshold", "learning_rate", "alpha"] {
            let err = validate_config(&with(&[("forecast", key, "wide")])).unwrap_err();
            assert!(
                matches!(err, MinecastError::ConfigInvalid { key: ref k, .. } if k == key),
                "{key}: {err}"
            );
        }
        assert!(validate_config(&with(&[("forecast", "band_z", "0")])).is_ok());
        assert!(validate_config(&with(&[("forecast", "band_z", "-1")])).is_err());
    }

    #[test]
    fn miner_th_must_be_positive() {
        assert!(validate_config(&with(&[("revenue", "miner_th", "100")])).is_ok());
        assert!(validate_config(&with(&[("revenue", "miner_th", "0")])).is_err());
        assert!(validate_config(&with(&[("revenue", "miner_th", "lots")])).is_err());
    }
}
