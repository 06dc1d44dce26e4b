use std::path::PathBuf;
use std::time::Duration;

/// Daemon settings, read from `FARMSTAY_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// JSON array of listings to serve from the in-memory directory.
    pub listings_file: Option<PathBuf>,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            listings_file: None,
            metrics_port: None,
            compact_threshold: 1000,
            sweep_interval: Duration::from_secs(300),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("FARMSTAY_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            listings_file: lookup("FARMSTAY_LISTINGS").map(PathBuf::from),
            metrics_port: lookup("FARMSTAY_METRICS_PORT").and_then(|s| s.parse().ok()),
            compact_threshold: lookup("FARMSTAY_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
            sweep_interval: lookup("FARMSTAY_SWEEP_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        }
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("bookings.journal")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.journal_path(), PathBuf::from("./data/bookings.journal"));
    }

    #[test]
    fn reads_all_keys() {
        let config = Config::from_lookup(lookup(&[
            ("FARMSTAY_DATA_DIR", "/var/lib/farmstay"),
            ("FARMSTAY_LISTINGS", "/etc/farmstay/listings.json"),
            ("FARMSTAY_METRICS_PORT", "9100"),
            ("FARMSTAY_COMPACT_THRESHOLD", "50"),
            ("FARMSTAY_SWEEP_INTERVAL_SECS", "30"),
        ]));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/farmstay"));
        assert_eq!(config.listings_file, Some(PathBuf::from("/etc/farmstay/listings.json")));
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.compact_threshold, 50);
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
    }

    #[test]
    fn garbage_falls_back() {
        let config = Config::from_lookup(lookup(&[
            ("FARMSTAY_METRICS_PORT", "not-a-port"),
            ("FARMSTAY_SWEEP_INTERVAL_SECS", "0"),
        ]));
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.sweep_interval, Config::default().sweep_interval);
    }
}
