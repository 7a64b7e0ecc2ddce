//! INI file configuration adapter.

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
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    const FULL: &str = r#"
[data]
prices = data/bbo_15min.csv
valuation_prices = data/bbo_1min.csv
frames = data/frames.csv
splits = data/splits.json

[pixels]
width = 64
height = 48

[assignment]
forced = AAPL:0, NVDA:1, TSLA:2

[simulation]
deployed_capital = 1000000.0

[runtime]
threads = 8
"#;

    #[test]
    fn from_string_parses_config() {
        let adapter = FileConfigAdapter::from_string(FULL).unwrap();
        assert_eq!(
            adapter.get_string("data", "prices"),
            Some("data/bbo_15min.csv".to_string())
        );
        assert_eq!(
            adapter.get_string("assignment", "forced"),
            Some("AAPL:0, NVDA:1, TSLA:2".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[data]\nprices = p.csv\n").unwrap();
        assert_eq!(adapter.get_string("data", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_value_or_default() {
        let adapter = FileConfigAdapter::from_string(FULL).unwrap();
        assert_eq!(adapter.get_int("pixels", "width", 0), 64);
        assert_eq!(adapter.get_int("runtime", "threads", 0), 8);
        assert_eq!(adapter.get_int("pixels", "depth", 42), 42);
    }

    #[test]
    fn get_int_returns_default_for_non_numeric() {
        let adapter = FileConfigAdapter::from_string("[pixels]\nwidth = wide\n").unwrap();
        assert_eq!(adapter.get_int("pixels", "width", 64), 64);
    }

    #[test]
    fn get_double_returns_value_or_default() {
        let adapter = FileConfigAdapter::from_string(FULL).unwrap();
        assert_eq!(
            adapter.get_double("simulation", "deployed_capital", 0.0),
            1_000_000.0
        );
        assert_eq!(adapter.get_double("simulation", "missing", 99.9), 99.9);
    }

    #[test]
    fn get_double_returns_default_for_non_numeric() {
        let adapter =
            FileConfigAdapter::from_string("[simulation]\ndeployed_capital = lots\n").unwrap();
        assert_eq!(adapter.get_double("simulation", "deployed_capital", 5.0), 5.0);
    }

    #[test]
    fn get_path_skips_blank_values() {
        let adapter =
            FileConfigAdapter::from_string("[data]\nprices =  p.csv \nscale =\n").unwrap();
        assert_eq!(adapter.get_path("data", "prices"), Some(PathBuf::from("p.csv")));
        assert_eq!(adapter.get_path("data", "scale"), None);
        assert_eq!(adapter.get_path("data", "frames"), None);
    }

    #[test]
    fn every_setting_reads_through_the_port() {
        let adapter = FileConfigAdapter::from_string(FULL).unwrap();
        let port: &dyn ConfigPort = &adapter;
        assert_eq!(port.get_path("data", "frames"), Some(PathBuf::from("data/frames.csv")));
        assert_eq!(port.get_int("pixels", "height", 0), 48);
        assert_eq!(port.get_double("simulation", "deployed_capital", 0.0), 1_000_000.0);
        assert_eq!(port.get_string("runtime", "threads"), Some("8".to_string()));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[output]\ndir = /tmp/results\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_path("output", "dir"),
            Some(PathBuf::from("/tmp/results"))
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(result.is_err());
    }
}
