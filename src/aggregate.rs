//! Join country facts with exchange rates and derive the estimated GDP.
//!
//! `estimated_gdp = population × factor / exchange_rate`, computed only when a
//! usable rate and a population are both present. The factor is an explicit input
//! so that a refresh over identical data can be reproduced.

use crate::models::{NewCountry, RateTable, RawCountry, UNKNOWN_CURRENCY};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;

/// Range the seeded factor is drawn from.
pub const FACTOR_RANGE: RangeInclusive<f64> = 1000.0..=2000.0;

/// Default fixed factor (midpoint of [`FACTOR_RANGE`]).
pub const DEFAULT_FACTOR: f64 = 1500.0;

/// How the per-record derivation factor is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DerivationFactor {
    /// Same constant for every record.
    Fixed(f64),
    /// Independent uniform draw per record from [`FACTOR_RANGE`], seeded.
    Seeded { seed: u64 },
}

impl Default for DerivationFactor {
    fn default() -> Self {
        DerivationFactor::Fixed(DEFAULT_FACTOR)
    }
}

impl DerivationFactor {
    fn draws(self) -> FactorDraws {
        match self {
            DerivationFactor::Fixed(v) => FactorDraws::Fixed(v),
            DerivationFactor::Seeded { seed } => {
                FactorDraws::Seeded(Box::new(StdRng::seed_from_u64(seed)))
            }
        }
    }
}

enum FactorDraws {
    Fixed(f64),
    Seeded(Box<StdRng>),
}

impl FactorDraws {
    fn next(&mut self) -> f64 {
        match self {
            FactorDraws::Fixed(v) => *v,
            FactorDraws::Seeded(rng) => rng.random_range(FACTOR_RANGE),
        }
    }
}

/// Look up a usable rate; zero, negative, and non-finite rates count as unknown.
pub fn resolve_rate(rates: &RateTable, currency_code: &str) -> Option<f64> {
    rates
        .get(currency_code)
        .copied()
        .filter(|r| r.is_finite() && *r > 0.0)
}

/// Join facts with rates. Output has the same length and order as `facts`.
///
/// Facts without a name are kept with an empty name; callers that persist the
/// result are expected to have dropped them already (see `api::parse_countries`).
pub fn aggregate(
    facts: &[RawCountry],
    rates: &RateTable,
    factor: DerivationFactor,
) -> Vec<NewCountry> {
    let mut draws = factor.draws();
    facts
        .iter()
        .map(|fact| {
            let currency_code = fact
                .first_currency_code()
                .unwrap_or(UNKNOWN_CURRENCY)
                .to_string();
            let exchange_rate = resolve_rate(rates, &currency_code);
            let estimated_gdp = match (exchange_rate, fact.population) {
                (Some(rate), Some(pop)) => Some(pop as f64 * draws.next() / rate),
                _ => None,
            };
            NewCountry {
                name: fact.name.clone().unwrap_or_default(),
                capital: fact.capital.clone(),
                region: fact.region.clone(),
                population: fact.population,
                currency_code,
                exchange_rate,
                estimated_gdp,
                flag_url: fact.flag.clone(),
            }
        })
        .collect()
}
