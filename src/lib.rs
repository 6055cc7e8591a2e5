//! country_snapshot
//!
//! A local economic snapshot of world countries: country facts joined with USD
//! exchange rates, an estimated GDP per country, filtered/sorted reads, and a
//! rendered top-5 summary. Pairs with the `countries` CLI.
//!
//! ### Features
//! - Fetch country facts and exchange rates, join them, and derive an estimated GDP
//! - Keep exactly one live snapshot, replaced atomically on every refresh
//! - Filter by region/currency, sort by estimated GDP, look up or delete by name
//! - Render an SVG summary of the top 5 countries, published atomically
//! - Export the snapshot as CSV or JSON
//!
//! ### Example
//! ```no_run
//! use country_snapshot::{CountryService, ListQuery, Settings};
//!
//! let service = CountryService::from_settings(&Settings::default())?;
//! let refreshed = service.refresh()?;
//! println!("{} countries", refreshed.count);
//! let europe = service.list(&ListQuery {
//!     region: Some("Europe".into()),
//!     sort: Some("gdp_desc".into()),
//!     ..Default::default()
//! })?;
//! println!("{:#?}", service.status()?);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod aggregate;
pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod service;
pub mod storage;
pub mod summary;

pub use aggregate::DerivationFactor;
pub use config::Settings;
pub use error::{ErrorBody, Operation, ServiceError};
pub use models::{CountryFilter, CountryRecord, LastRefresh, SortOrder, Status};
pub use service::{CountryService, ListQuery};
pub use storage::SnapshotStore;
pub use summary::{SummaryArtifact, SummaryRenderer};
