//! Query/status facade: the operations the boundary layer (CLI or HTTP) calls.
//!
//! Every operation returns a [`ServiceError`] the boundary can map to a status code;
//! failures are logged here with their full diagnostic.

use crate::aggregate::{DerivationFactor, aggregate};
use crate::api::{Client, CountrySource, RateSource};
use crate::config::Settings;
use crate::error::{Operation, ServiceError};
use crate::models::{CountryFilter, CountryRecord, Message, RefreshSummary, SortOrder, Status};
use crate::storage::SnapshotStore;
use crate::summary::{SummaryArtifact, SummaryRenderer};
use chrono::Utc;
use log::{error, info, warn};
use std::sync::{Mutex, TryLockError};
use std::thread;

/// Listing parameters as received from the boundary. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub region: Option<String>,
    pub currency: Option<String>,
    pub sort: Option<String>,
}

fn non_empty(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl ListQuery {
    pub fn to_filter(&self) -> Result<CountryFilter, ServiceError> {
        let sort = match non_empty(&self.sort) {
            Some(s) => Some(s.parse::<SortOrder>().map_err(ServiceError::InvalidQuery)?),
            None => None,
        };
        Ok(CountryFilter {
            region: non_empty(&self.region),
            currency_code: non_empty(&self.currency),
            sort,
        })
    }
}

pub struct CountryService {
    countries: Box<dyn CountrySource>,
    rates: Box<dyn RateSource>,
    store: SnapshotStore,
    renderer: SummaryRenderer,
    factor: DerivationFactor,
    // Held for the whole refresh; a second trigger is rejected, not queued.
    refresh_gate: Mutex<()>,
}

impl CountryService {
    pub fn new(
        countries: impl CountrySource + 'static,
        rates: impl RateSource + 'static,
        store: SnapshotStore,
        renderer: SummaryRenderer,
        factor: DerivationFactor,
    ) -> Self {
        Self {
            countries: Box::new(countries),
            rates: Box::new(rates),
            store,
            renderer,
            factor,
            refresh_gate: Mutex::new(()),
        }
    }

    /// Wire the live HTTP client, the file-backed store, and the cache directory.
    pub fn from_settings(settings: &Settings) -> Result<Self, ServiceError> {
        Self::wire(settings, SnapshotStore::open(&settings.data_file)?)
    }

    /// Same wiring as [`CountryService::from_settings`], but a corrupt snapshot
    /// file opens as an empty snapshot instead of failing. Meant for callers that
    /// are about to refresh, which replaces the file wholesale.
    pub fn for_refresh(settings: &Settings) -> Result<Self, ServiceError> {
        Self::wire(settings, SnapshotStore::open_recovering(&settings.data_file)?)
    }

    fn wire(settings: &Settings, store: SnapshotStore) -> Result<Self, ServiceError> {
        let client = Client::from_settings(settings)?;
        Ok(Self::new(
            client.clone(),
            client,
            store,
            SummaryRenderer::new(settings.summary_path(), settings.locale.clone()),
            settings.derivation_factor(),
        ))
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn renderer(&self) -> &SummaryRenderer {
        &self.renderer
    }

    /// Release the store.
    pub fn close(self) {
        self.store.close();
    }

    /// Fetch both sources, join them, install the new snapshot, and publish the summary.
    ///
    /// The summary is rendered and staged before the install, so the only step
    /// left afterwards is the rename. If that fails the prior generation is put
    /// back. A failed refresh leaves the previous snapshot live.
    pub fn refresh(&self) -> Result<RefreshSummary, ServiceError> {
        logged(Operation::Refresh, self.run_refresh())
    }

    fn run_refresh(&self) -> Result<RefreshSummary, ServiceError> {
        let _guard = match self.refresh_gate.try_lock() {
            Ok(g) => g,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(ServiceError::RefreshInProgress),
        };
        info!("refresh started");

        let (facts, rates) = thread::scope(|s| {
            let rates = s.spawn(|| self.rates.fetch_rates());
            let facts = self.countries.fetch_countries();
            let rates = rates
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            (facts, rates)
        });
        let facts = facts?;
        let rates = rates?;
        info!("fetched {} countries and {} rates", facts.len(), rates.len());

        let records = aggregate(&facts, &rates, self.factor);
        let staged = self.renderer.stage(&records, Utc::now())?;
        let prior = self.store.snapshot();
        let installed = self.store.replace_all(records)?;
        if let Err(e) = staged.commit() {
            if let Err(undo) = self.store.restore(&prior) {
                error!("could not restore previous snapshot: {undo}");
            }
            return Err(e.into());
        }

        info!("refresh finished: {} countries", installed.len());
        Ok(RefreshSummary {
            message: "Countries refreshed successfully".to_string(),
            count: installed.len(),
        })
    }

    pub fn list(&self, query: &ListQuery) -> Result<Vec<CountryRecord>, ServiceError> {
        logged(Operation::List, query.to_filter().map(|f| self.store.query(&f)))
    }

    pub fn get(&self, name: &str) -> Result<CountryRecord, ServiceError> {
        logged(
            Operation::Get,
            self.store
                .get_by_name(name)
                .ok_or_else(|| ServiceError::NotFound("Country".into())),
        )
    }

    pub fn delete(&self, name: &str) -> Result<Message, ServiceError> {
        let res = self
            .store
            .delete_by_name(name)
            .map_err(ServiceError::from)
            .and_then(|n| match n {
                0 => Err(ServiceError::NotFound("Country".into())),
                _ => Ok(Message {
                    message: format!("{name} deleted successfully"),
                }),
            });
        logged(Operation::Delete, res)
    }

    pub fn status(&self) -> Result<Status, ServiceError> {
        // One generation for both numbers, so they agree with each other.
        let snap = self.store.snapshot();
        Ok(Status {
            total_countries: snap.len(),
            last_refreshed_at: snap.iter().map(|r| r.refreshed_at).max().into(),
        })
    }

    pub fn summary_image(&self) -> Result<SummaryArtifact, ServiceError> {
        let res = self
            .renderer
            .load()
            .map_err(ServiceError::from)
            .and_then(|a| a.ok_or_else(|| ServiceError::NotFound("Summary image".into())));
        logged(Operation::Summary, res)
    }
}

fn logged<T>(op: Operation, res: Result<T, ServiceError>) -> Result<T, ServiceError> {
    if let Err(e) = &res {
        match e {
            ServiceError::NotFound(_) | ServiceError::InvalidQuery(_) => info!("{op:?}: {e}"),
            ServiceError::RefreshInProgress => warn!("{op:?}: {e}"),
            _ => error!("{op:?} failed: {e}"),
        }
    }
    res
}
