//! Runtime settings: CLI flags with environment fallbacks (a `.env` file is honored
//! by the binary through `dotenvy`).

use crate::aggregate::{DEFAULT_FACTOR, DerivationFactor};
use clap::Args;
use std::path::PathBuf;

pub const DEFAULT_COUNTRIES_URL: &str =
    "https://restcountries.com/v2/all?fields=name,capital,region,population,flag,currencies";
pub const DEFAULT_RATES_URL: &str = "https://open.er-api.com/v6/latest/USD";

/// File name of the published summary inside the cache directory.
pub const SUMMARY_FILE_NAME: &str = "summary.svg";

#[derive(Args, Debug, Clone, PartialEq)]
pub struct Settings {
    /// Snapshot file (JSON).
    #[arg(long, env = "COUNTRIES_DATA_FILE", default_value = "data/countries.json")]
    pub data_file: PathBuf,
    /// Directory the summary image is published to.
    #[arg(long, env = "COUNTRIES_CACHE_DIR", default_value = "cache")]
    pub cache_dir: PathBuf,
    /// Country facts endpoint.
    #[arg(long, env = "COUNTRIES_SOURCE_URL", default_value = DEFAULT_COUNTRIES_URL)]
    pub countries_url: String,
    /// Exchange rate endpoint (rates per 1 USD).
    #[arg(long, env = "COUNTRIES_RATES_URL", default_value = DEFAULT_RATES_URL)]
    pub rates_url: String,
    /// HTTP timeout for each upstream call, in seconds.
    #[arg(long, env = "COUNTRIES_HTTP_TIMEOUT", default_value_t = 30)]
    pub timeout_secs: u64,
    /// Fixed GDP derivation factor (ignored when --gdp-seed is set).
    #[arg(long, env = "COUNTRIES_GDP_FACTOR", default_value_t = DEFAULT_FACTOR)]
    pub gdp_factor: f64,
    /// Draw a factor per country from 1000..=2000 with this seed.
    #[arg(long, env = "COUNTRIES_GDP_SEED")]
    pub gdp_seed: Option<u64>,
    /// Locale for number formatting in the summary (e.g., en, de).
    #[arg(long, env = "COUNTRIES_LOCALE", default_value = "en")]
    pub locale: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("data/countries.json"),
            cache_dir: PathBuf::from("cache"),
            countries_url: DEFAULT_COUNTRIES_URL.to_string(),
            rates_url: DEFAULT_RATES_URL.to_string(),
            timeout_secs: 30,
            gdp_factor: DEFAULT_FACTOR,
            gdp_seed: None,
            locale: "en".to_string(),
        }
    }
}

impl Settings {
    pub fn derivation_factor(&self) -> DerivationFactor {
        match self.gdp_seed {
            Some(seed) => DerivationFactor::Seeded { seed },
            None => DerivationFactor::Fixed(self.gdp_factor),
        }
    }

    pub fn summary_path(&self) -> PathBuf {
        self.cache_dir.join(SUMMARY_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        settings: Settings,
    }

    #[test]
    fn seed_switches_to_seeded_factor() {
        let h = Harness::parse_from(["t", "--gdp-seed", "42", "--cache-dir", "/tmp/c"]);
        assert_eq!(
            h.settings.derivation_factor(),
            DerivationFactor::Seeded { seed: 42 }
        );
        assert_eq!(h.settings.summary_path(), PathBuf::from("/tmp/c/summary.svg"));
    }

    #[test]
    fn defaults_match_cli_defaults() {
        let d = Settings::default();
        assert_eq!(d.derivation_factor(), DerivationFactor::Fixed(DEFAULT_FACTOR));
        assert_eq!(d.countries_url, DEFAULT_COUNTRIES_URL);
    }
}
