//! INI file configuration adapter.
//!
//! Section and key names are case-insensitive.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }

    fn sections(&self) -> Vec<String> {
        self.config.sections()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[data]
base_path = /data/coinmetrics
sources = btc, blockchain_com

[alignment]
conflict = prefer:btc,blockchain_com
max_fill_gap = 3

[forecast]
horizon = 30
band_z = 1.28
targets = difficulty, hashrate

[scenarios]
fee_per_block_btc = 0.12

[scenario.Base]
price = 60000
electricity_cost_per_kwh = 0.05
"#;

    #[test]
    fn reads_typed_values() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(
            adapter.get_string("data", "base_path"),
            Some("/data/coinmetrics".to_string())
        );
        assert_eq!(adapter.get_int("forecast", "horizon", 0), 30);
        assert_eq!(adapter.get_double("forecast", "band_z", 0.0), 1.28);
        assert_eq!(adapter.get_double("scenarios", "fee_per_block_btc", 0.0), 0.12);
    }

    #[test]
    fn missing_values_fall_back() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_string("data", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
        assert_eq!(adapter.get_int("forecast", "folds", 3), 3);
        assert_eq!(adapter.get_double("forecast", "missing", 0.5), 0.5);
    }

    #[test]
    fn non_numeric_values_fall_back() {
        let adapter = FileConfigAdapter::from_string("[forecast]\nhorizon = soon\n").unwrap();
        assert_eq!(adapter.get_int("forecast", "horizon", 30), 30);
        assert_eq!(adapter.get_double("forecast", "horizon", 1.5), 1.5);
    }

    #[test]
    fn bool_spellings() {
        let adapter =
            FileConfigAdapter::from_string("[hhi]\na = yes\nb = 0\nc = maybe\n").unwrap();
        assert!(adapter.get_bool("hhi", "a", false));
        assert!(!adapter.get_bool("hhi", "b", true));
        assert!(adapter.get_bool("hhi", "c", true));
    }

    #[test]
    fn section_names_are_lowercased() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        let sections = adapter.sections();
        assert!(sections.contains(&"scenario.base".to_string()));
        assert_eq!(adapter.get_double("scenario.Base", "price", 0.0), 60000.0);
    }

    #[test]
    fn from_file_reads_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[report]\noutput = forecast.csv\n").unwrap();
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("report", "output"),
            Some("forecast.csv".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        assert!(FileConfigAdapter::from_file("/nonexistent/path/config.ini").is_err());
    }
}
