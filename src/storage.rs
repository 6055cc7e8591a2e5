//! Snapshot store: exactly one live generation of country records, replaced wholesale.
//!
//! The live generation sits behind an `Arc` that is swapped under a short lock, so
//! a reader either sees the whole previous generation or the whole new one. When
//! the store is file-backed, a new generation is written to a temp file in the
//! same directory and renamed over the snapshot file before the swap; a failed
//! write leaves disk and memory on the prior generation.

use crate::error::StoreError;
use crate::models::{CountryFilter, CountryRecord, NewCountry, SortOrder};
use ahash::AHashSet;
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use log::{debug, error};
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tempfile::NamedTempFile;

/// One immutable generation of the snapshot, in storage order.
pub type Generation = Arc<Vec<CountryRecord>>;

#[derive(Debug)]
pub struct SnapshotStore {
    path: Option<PathBuf>,
    current: RwLock<Generation>,
    // Serializes writers (replace, delete); readers never take it.
    writer: Mutex<()>,
}

impl SnapshotStore {
    /// Store without a backing file.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(Vec::new())),
            writer: Mutex::new(()),
        }
    }

    /// Open a file-backed store. A missing file means an empty snapshot; an
    /// unreadable or corrupt one is an error.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records = read_snapshot(&path)?;
        debug!("opened snapshot {} with {} records", path.display(), records.len());
        Ok(Self::with_records(path, records))
    }

    /// Like [`SnapshotStore::open`], but a snapshot file that cannot be decoded
    /// starts the store empty. The file is left as is until the next install
    /// overwrites it, so this suits callers about to replace the snapshot anyway.
    pub fn open_recovering<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records = match read_snapshot(&path) {
            Ok(records) => records,
            Err(e @ StoreError::Serde { .. }) => {
                error!("{e}; starting from an empty snapshot");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        Ok(Self::with_records(path, records))
    }

    fn with_records(path: PathBuf, records: Vec<CountryRecord>) -> Self {
        Self {
            path: Some(path),
            current: RwLock::new(Arc::new(records)),
            writer: Mutex::new(()),
        }
    }

    /// End the store's lifecycle. Every write is already durable when it returns,
    /// so there is nothing left to flush.
    pub fn close(self) {
        if let Some(path) = &self.path {
            debug!("closed snapshot {}", path.display());
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current generation. Cheap: clones the pointer only.
    pub fn snapshot(&self) -> Generation {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn install(&self, next: Vec<CountryRecord>) -> Result<Generation, StoreError> {
        if let Some(path) = &self.path {
            write_atomically(path, &next)?;
        }
        let next = Arc::new(next);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        Ok(next)
    }

    /// Discard the current snapshot and install `records`, all stamped with one
    /// `refreshed_at`. All-or-nothing: on error the prior snapshot stays live.
    pub fn replace_all(&self, records: Vec<NewCountry>) -> Result<Generation, StoreError> {
        let mut seen = AHashSet::with_capacity(records.len());
        for r in &records {
            if !seen.insert(r.name.as_str()) {
                return Err(StoreError::DuplicateName(r.name.clone()));
            }
        }
        drop(seen);

        let refreshed_at = Utc::now();
        let next: Vec<CountryRecord> = records.into_iter().map(|r| r.stamp(refreshed_at)).collect();

        let _guard = self.lock_writer();
        let installed = self.install(next)?;
        debug!("installed generation of {} records", installed.len());
        Ok(installed)
    }

    /// Put a previously installed generation back, on disk and in memory.
    pub fn restore(&self, generation: &Generation) -> Result<(), StoreError> {
        let _guard = self.lock_writer();
        self.install(Vec::clone(generation))?;
        debug!("restored generation of {} records", generation.len());
        Ok(())
    }

    /// Records matching `filter`, in storage order unless a sort is given.
    pub fn query(&self, filter: &CountryFilter) -> Vec<CountryRecord> {
        let snap = self.snapshot();
        let mut out: Vec<CountryRecord> = snap.iter().filter(|r| filter.matches(r)).cloned().collect();
        if let Some(order) = filter.sort {
            sort_by_gdp(&mut out, order);
        }
        out
    }

    pub fn get_by_name(&self, name: &str) -> Option<CountryRecord> {
        self.snapshot().iter().find(|r| r.name == name).cloned()
    }

    /// Remove the record named `name`. Returns the number removed (0 or 1).
    pub fn delete_by_name(&self, name: &str) -> Result<usize, StoreError> {
        let _guard = self.lock_writer();
        let snap = self.snapshot();
        let Some(idx) = snap.iter().position(|r| r.name == name) else {
            return Ok(0);
        };
        let mut next = Vec::clone(&snap);
        next.remove(idx);
        self.install(next)?;
        debug!("deleted {name}");
        Ok(1)
    }

    pub fn count(&self) -> usize {
        self.snapshot().len()
    }

    /// Latest `refreshed_at` in the snapshot; `None` when empty.
    pub fn last_refresh_time(&self) -> Option<DateTime<Utc>> {
        self.snapshot().iter().map(|r| r.refreshed_at).max()
    }
}

/// Stable sort by `estimated_gdp`; records without a value go last in both orders.
pub fn sort_by_gdp(records: &mut [CountryRecord], order: SortOrder) {
    records.sort_by(|a, b| match (a.estimated_gdp, b.estimated_gdp) {
        (Some(x), Some(y)) => {
            let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            match order {
                SortOrder::GdpAsc => ord,
                SortOrder::GdpDesc => ord.reverse(),
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

fn read_snapshot(path: &Path) -> Result<Vec<CountryRecord>, StoreError> {
    match File::open(path) {
        Ok(f) => serde_json::from_reader(BufReader::new(f)).map_err(|source| StoreError::Serde {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_atomically(path: &Path, records: &[CountryRecord]) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    {
        let mut w = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer(&mut w, records).map_err(|source| StoreError::Serde {
            path: path.to_path_buf(),
            source,
        })?;
        w.flush().map_err(io_err)?;
    }
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// Cells starting with these characters are interpreted as formulas by spreadsheets.
fn csv_safe(s: &str) -> String {
    if s.starts_with(['=', '+', '-', '@']) {
        format!("'{s}")
    } else {
        s.to_string()
    }
}

fn csv_safe_opt(s: &Option<String>) -> String {
    s.as_deref().map(csv_safe).unwrap_or_default()
}

/// Save records as CSV with header.
pub fn export_csv<P: AsRef<Path>>(records: &[CountryRecord], path: P) -> Result<(), StoreError> {
    let mut wtr = WriterBuilder::new().from_path(path)?;
    wtr.serialize((
        "name",
        "capital",
        "region",
        "population",
        "currency_code",
        "exchange_rate",
        "estimated_gdp",
        "flag_url",
        "last_refreshed_at",
    ))?;
    for r in records {
        wtr.serialize((
            csv_safe(&r.name),
            csv_safe_opt(&r.capital),
            csv_safe_opt(&r.region),
            r.population,
            csv_safe(&r.currency_code),
            r.exchange_rate,
            r.estimated_gdp,
            csv_safe_opt(&r.flag_url),
            r.refreshed_at.to_rfc3339(),
        ))?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Save records as a pretty JSON array.
pub fn export_json<P: AsRef<Path>>(records: &[CountryRecord], path: P) -> Result<(), StoreError> {
    let path = path.as_ref();
    let s = serde_json::to_string_pretty(records).map_err(|source| StoreError::Serde {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, s).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_country(name: &str, region: &str, gdp: Option<f64>) -> NewCountry {
        NewCountry {
            name: name.into(),
            capital: None,
            region: Some(region.into()),
            population: Some(1),
            currency_code: "EUR".into(),
            exchange_rate: gdp.map(|_| 1.0),
            estimated_gdp: gdp,
            flag_url: None,
        }
    }

    #[test]
    fn file_backed_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("countries.json");
        let store = SnapshotStore::open(&path).unwrap();
        store
            .replace_all(vec![
                new_country("A", "Europe", Some(1.0)),
                new_country("B", "Asia", None),
            ])
            .unwrap();
        assert_eq!(store.delete_by_name("B").unwrap(), 1);
        let stamp = store.last_refresh_time();
        store.close();

        let reopened = SnapshotStore::open(&path).unwrap();
        assert_eq!(reopened.count(), 1);
        assert_eq!(reopened.get_by_name("A").unwrap().region.as_deref(), Some("Europe"));
        assert_eq!(reopened.last_refresh_time(), stamp);
    }

    #[test]
    fn duplicate_names_keep_prior_generation() {
        let store = SnapshotStore::in_memory();
        store.replace_all(vec![new_country("A", "Europe", None)]).unwrap();
        let err = store
            .replace_all(vec![
                new_country("X", "Asia", None),
                new_country("X", "Asia", None),
            ])
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(n) if n == "X"));
        assert_eq!(store.count(), 1);
        assert!(store.get_by_name("A").is_some());
    }

    #[test]
    fn unwritable_path_keeps_prior_generation() {
        let dir = tempdir().unwrap();
        // A directory where the snapshot file should be makes the rename fail.
        let path = dir.path().join("blocked");
        let store = SnapshotStore::open(&path).unwrap();
        fs::create_dir(&path).unwrap();
        assert!(store.replace_all(vec![new_country("A", "Europe", None)]).is_err());
        assert_eq!(store.count(), 0);
        assert_eq!(store.last_refresh_time(), None);
    }

    #[test]
    fn corrupt_file_fails_open_but_recovering_open_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("countries.json");
        fs::write(&path, b"{not json").unwrap();

        assert!(matches!(SnapshotStore::open(&path), Err(StoreError::Serde { .. })));

        let store = SnapshotStore::open_recovering(&path).unwrap();
        assert_eq!(store.count(), 0);
        assert_eq!(fs::read(&path).unwrap(), b"{not json");

        store.replace_all(vec![new_country("A", "Europe", Some(1.0))]).unwrap();
        store.close();
        let reopened = SnapshotStore::open(&path).unwrap();
        assert_eq!(reopened.count(), 1);
        assert!(reopened.get_by_name("A").is_some());
    }

    #[test]
    fn restore_reinstalls_an_earlier_generation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("countries.json");
        let store = SnapshotStore::open(&path).unwrap();
        let first = store.replace_all(vec![new_country("A", "Europe", None)]).unwrap();
        store.replace_all(vec![new_country("B", "Asia", None)]).unwrap();

        store.restore(&first).unwrap();
        assert_eq!(store.snapshot()[0].name, "A");
        assert_eq!(store.last_refresh_time(), Some(first[0].refreshed_at));
        store.close();
        let reopened = SnapshotStore::open(&path).unwrap();
        assert_eq!(reopened.count(), 1);
        assert!(reopened.get_by_name("A").is_some());
    }

    #[test]
    fn held_generation_is_unaffected_by_replace() {
        let store = SnapshotStore::in_memory();
        store.replace_all(vec![new_country("A", "Europe", None)]).unwrap();
        let held = store.snapshot();
        store.replace_all(vec![new_country("B", "Asia", None)]).unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].name, "A");
        assert_eq!(store.snapshot()[0].name, "B");
    }
}
