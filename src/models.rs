use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Sentinel currency code used when a country lists no currency.
pub const UNKNOWN_CURRENCY: &str = "N/A";

/// Currency code -> units of that currency per 1 USD.
pub type RateTable = AHashMap<String, f64>;

/// Serde helper: accept any JSON value and keep it only if it has the expected shape.
///
/// Upstream country facts are loosely typed; a field of the wrong type must
/// degrade to `None` instead of rejecting the whole element.
fn de_lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let v = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(v).ok())
}

/// Serde helper: population as a non-negative integer from a number or a numeric string.
fn de_population<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(population_from_value(&v))
}

fn population_from_value(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                return Some(u);
            }
            // Integral floats like `83000000.0` are accepted; negatives are not.
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// One entry of the `currencies` list of a country fact.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Currency {
    #[serde(default, deserialize_with = "de_lenient")]
    pub code: Option<String>,
}

/// Raw country fact as delivered by the country-facts provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawCountry {
    #[serde(default, deserialize_with = "de_lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de_lenient")]
    pub capital: Option<String>,
    #[serde(default, deserialize_with = "de_lenient")]
    pub region: Option<String>,
    #[serde(default, deserialize_with = "de_population")]
    pub population: Option<u64>,
    #[serde(default, deserialize_with = "de_lenient")]
    pub currencies: Option<Vec<Currency>>,
    #[serde(default, deserialize_with = "de_lenient")]
    pub flag: Option<String>,
}

impl RawCountry {
    /// Code of the first listed currency, if any non-empty code is present.
    pub fn first_currency_code(&self) -> Option<&str> {
        self.currencies
            .as_ref()?
            .first()?
            .code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// A joined country row produced by the aggregator, not yet persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewCountry {
    pub name: String,
    pub capital: Option<String>,
    pub region: Option<String>,
    pub population: Option<u64>,
    pub currency_code: String,
    pub exchange_rate: Option<f64>,
    pub estimated_gdp: Option<f64>,
    pub flag_url: Option<String>,
}

impl NewCountry {
    /// Attach the batch timestamp assigned when the snapshot is installed.
    pub fn stamp(self, refreshed_at: DateTime<Utc>) -> CountryRecord {
        CountryRecord {
            name: self.name,
            capital: self.capital,
            region: self.region,
            population: self.population,
            currency_code: self.currency_code,
            exchange_rate: self.exchange_rate,
            estimated_gdp: self.estimated_gdp,
            flag_url: self.flag_url,
            refreshed_at,
        }
    }
}

/// Stored country row (one row = one country in the live snapshot).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CountryRecord {
    pub name: String,
    pub capital: Option<String>,
    pub region: Option<String>,
    pub population: Option<u64>,
    pub currency_code: String,
    pub exchange_rate: Option<f64>,
    pub estimated_gdp: Option<f64>,
    pub flag_url: Option<String>,
    pub refreshed_at: DateTime<Utc>,
}

/// Ordering of a listing by estimated GDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[serde(rename = "gdp_asc")]
    GdpAsc,
    #[serde(rename = "gdp_desc")]
    GdpDesc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::GdpAsc => "gdp_asc",
            SortOrder::GdpDesc => "gdp_desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gdp_asc" => Ok(SortOrder::GdpAsc),
            "gdp_desc" => Ok(SortOrder::GdpDesc),
            other => Err(format!(
                "unsupported sort '{other}', expected gdp_asc or gdp_desc"
            )),
        }
    }
}

/// Conjunctive filter over the snapshot plus an optional GDP ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountryFilter {
    pub region: Option<String>,
    pub currency_code: Option<String>,
    pub sort: Option<SortOrder>,
}

impl CountryFilter {
    pub fn matches(&self, record: &CountryRecord) -> bool {
        let region_ok = self
            .region
            .as_deref()
            .is_none_or(|r| record.region.as_deref() == Some(r));
        let currency_ok = self
            .currency_code
            .as_deref()
            .is_none_or(|c| record.currency_code == c);
        region_ok && currency_ok
    }
}

/// Time of the last successful refresh, or the "never refreshed" signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastRefresh {
    Never,
    At(DateTime<Utc>),
}

impl LastRefresh {
    pub const NEVER_TEXT: &'static str = "No refresh yet";
}

impl From<Option<DateTime<Utc>>> for LastRefresh {
    fn from(v: Option<DateTime<Utc>>) -> Self {
        v.map_or(LastRefresh::Never, LastRefresh::At)
    }
}

impl Serialize for LastRefresh {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LastRefresh::Never => serializer.serialize_str(Self::NEVER_TEXT),
            LastRefresh::At(ts) => ts.serialize(serializer),
        }
    }
}

/// Payload of the status operation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Status {
    pub total_countries: usize,
    pub last_refreshed_at: LastRefresh,
}

/// Payload of a successful refresh.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RefreshSummary {
    pub message: String,
    pub count: usize,
}

/// Plain confirmation payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Message {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_country_degrades_bad_fields_to_none() {
        let v = serde_json::json!({
            "name": "Xland",
            "capital": 42,
            "region": "Europe",
            "population": "-5",
            "currencies": [{"code": ""}],
            "flag": null
        });
        let c: RawCountry = serde_json::from_value(v).unwrap();
        assert_eq!(c.name.as_deref(), Some("Xland"));
        assert_eq!(c.capital, None);
        assert_eq!(c.population, None);
        assert_eq!(c.first_currency_code(), None);
    }

    #[test]
    fn population_accepts_integral_float_and_string() {
        assert_eq!(population_from_value(&serde_json::json!(83000000.0)), Some(83_000_000));
        assert_eq!(population_from_value(&serde_json::json!("1200")), Some(1200));
        assert_eq!(population_from_value(&serde_json::json!(1.5)), None);
        assert_eq!(population_from_value(&serde_json::json!(-3)), None);
    }

    #[test]
    fn sort_order_parses_known_values_only() {
        assert_eq!("gdp_desc".parse::<SortOrder>(), Ok(SortOrder::GdpDesc));
        assert_eq!("GDP_ASC".parse::<SortOrder>(), Ok(SortOrder::GdpAsc));
        assert!("population".parse::<SortOrder>().is_err());
    }

    #[test]
    fn never_refreshed_serializes_as_text() {
        let s = Status {
            total_countries: 0,
            last_refreshed_at: LastRefresh::Never,
        };
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["last_refreshed_at"], "No refresh yet");
        assert_eq!(v["total_countries"], 0);
    }
}
