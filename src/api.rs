//! Synchronous clients for the two upstream providers.
//!
//! - **Country facts** (`restcountries.com/v2/all`): a JSON array with name, capital,
//!   region, population, currencies, and flag per country.
//! - **Exchange rates** (`open.er-api.com/v6/latest/USD`): an object whose `rates`
//!   maps currency codes to units per 1 USD.
//!
//! ### Notes
//! - No retries: a single failed attempt fails the refresh.
//! - Elements of the country payload are read leniently; a field of the wrong type
//!   becomes `None`. Elements without a name are skipped (the name keys the snapshot).
//! - Timeouts come from `Settings::timeout_secs`; the transport enforces them.
//!
//! Typical usage:
//! ```no_run
//! # use country_snapshot::api::{Client, CountrySource, RateSource};
//! # use country_snapshot::Settings;
//! let client = Client::from_settings(&Settings::default())?;
//! let facts = client.fetch_countries()?;
//! let rates = client.fetch_rates()?;
//! # Ok::<(), country_snapshot::error::FetchError>(())
//! ```

use crate::config::Settings;
use crate::error::FetchError;
use crate::models::{RateTable, RawCountry};
use log::{debug, warn};
use reqwest::blocking::Client as HttpClient;
use reqwest::redirect::Policy;
use serde_json::Value;
use std::time::Duration;

/// Provider of raw country facts.
pub trait CountrySource: Send + Sync {
    fn fetch_countries(&self) -> Result<Vec<RawCountry>, FetchError>;
}

/// Provider of currency -> USD exchange rates.
pub trait RateSource: Send + Sync {
    fn fetch_rates(&self) -> Result<RateTable, FetchError>;
}

#[derive(Debug, Clone)]
pub struct Client {
    pub countries_url: String,
    pub rates_url: String,
    http: HttpClient,
}

impl Client {
    pub fn new(
        countries_url: impl Into<String>,
        rates_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http = HttpClient::builder()
            .timeout(timeout) // total request timeout
            .connect_timeout(Duration::from_secs(10))
            .redirect(Policy::limited(5))
            .user_agent(concat!("country_snapshot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            countries_url: countries_url.into(),
            rates_url: rates_url.into(),
            http,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, FetchError> {
        Self::new(
            settings.countries_url.clone(),
            settings.rates_url.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        debug!("GET {url}");
        let resp = self.http.get(url).send().map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }
        resp.json().map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

impl CountrySource for Client {
    fn fetch_countries(&self) -> Result<Vec<RawCountry>, FetchError> {
        let v = self.get_json(&self.countries_url)?;
        parse_countries(&v)
    }
}

impl RateSource for Client {
    fn fetch_rates(&self) -> Result<RateTable, FetchError> {
        let v = self.get_json(&self.rates_url)?;
        parse_rates(&v)
    }
}

/// Parse the country-facts payload.
///
/// The payload must be a top-level array. Elements that are not objects or carry no
/// usable name are skipped with a warning; every other element is kept.
pub fn parse_countries(v: &Value) -> Result<Vec<RawCountry>, FetchError> {
    let arr = v
        .as_array()
        .ok_or_else(|| FetchError::Payload("country facts: not a top-level array".into()))?;

    let mut out = Vec::with_capacity(arr.len());
    let mut skipped = 0usize;
    for item in arr {
        match serde_json::from_value::<RawCountry>(item.clone()) {
            Ok(c) if c.name.as_deref().is_some_and(|n| !n.trim().is_empty()) => out.push(c),
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("skipped {skipped} country facts without a usable name");
    }
    Ok(out)
}

/// Parse the exchange-rate payload into a [`RateTable`].
///
/// `{"result": "error", ...}` is surfaced as an upstream failure. Non-numeric rate
/// values are ignored.
pub fn parse_rates(v: &Value) -> Result<RateTable, FetchError> {
    let obj = v
        .as_object()
        .ok_or_else(|| FetchError::Payload("exchange rates: not a JSON object".into()))?;

    if obj.get("result").and_then(Value::as_str) == Some("error") {
        let kind = obj
            .get("error-type")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(FetchError::Upstream(format!("exchange rates: {kind}")));
    }

    let rates = obj
        .get("rates")
        .and_then(Value::as_object)
        .ok_or_else(|| FetchError::Payload("exchange rates: missing `rates` object".into()))?;

    Ok(rates
        .iter()
        .filter_map(|(code, rate)| rate.as_f64().map(|r| (code.clone(), r)))
        .collect())
}
