use country_snapshot::models::{CountryFilter, NewCountry, SortOrder};
use country_snapshot::storage::{self, SnapshotStore};
use std::fs;
use tempfile::tempdir;

fn country(name: &str, region: &str, currency: &str, gdp: Option<f64>) -> NewCountry {
    NewCountry {
        name: name.into(),
        capital: None,
        region: Some(region.into()),
        population: Some(100),
        currency_code: currency.into(),
        exchange_rate: gdp.map(|_| 1.0),
        estimated_gdp: gdp,
        flag_url: None,
    }
}

fn seeded_store() -> SnapshotStore {
    let store = SnapshotStore::in_memory();
    store
        .replace_all(vec![
            country("France", "Europe", "EUR", Some(30.0)),
            country("Japan", "Asia", "JPY", Some(50.0)),
            country("Germany", "Europe", "EUR", None),
            country("Italy", "Europe", "EUR", Some(20.0)),
            country("Nepal", "Asia", "NPR", Some(5.0)),
        ])
        .unwrap();
    store
}

fn names(records: &[country_snapshot::CountryRecord]) -> Vec<&str> {
    records.iter().map(|r| r.name.as_str()).collect()
}

#[test]
fn region_filter_keeps_storage_order() {
    let store = seeded_store();
    let out = store.query(&CountryFilter {
        region: Some("Europe".into()),
        ..Default::default()
    });
    assert_eq!(names(&out), ["France", "Germany", "Italy"]);
}

#[test]
fn filters_are_conjunctive() {
    let store = seeded_store();
    let out = store.query(&CountryFilter {
        region: Some("Asia".into()),
        currency_code: Some("JPY".into()),
        sort: None,
    });
    assert_eq!(names(&out), ["Japan"]);

    let none = store.query(&CountryFilter {
        region: Some("Europe".into()),
        currency_code: Some("JPY".into()),
        sort: None,
    });
    assert!(none.is_empty());
}

#[test]
fn gdp_desc_is_non_increasing_with_nulls_last() {
    let store = seeded_store();
    let out = store.query(&CountryFilter {
        sort: Some(SortOrder::GdpDesc),
        ..Default::default()
    });
    assert_eq!(names(&out), ["Japan", "France", "Italy", "Nepal", "Germany"]);
    let gdps: Vec<f64> = out.iter().filter_map(|r| r.estimated_gdp).collect();
    assert!(gdps.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn gdp_asc_places_nulls_last_too() {
    let store = seeded_store();
    let out = store.query(&CountryFilter {
        region: Some("Europe".into()),
        sort: Some(SortOrder::GdpAsc),
        ..Default::default()
    });
    assert_eq!(names(&out), ["Italy", "France", "Germany"]);
}

#[test]
fn lookup_and_delete_on_empty_store() {
    let store = SnapshotStore::in_memory();
    assert!(store.get_by_name("Atlantis").is_none());
    assert_eq!(store.delete_by_name("Atlantis").unwrap(), 0);
    assert_eq!(store.count(), 0);
    assert_eq!(store.last_refresh_time(), None);
}

#[test]
fn lookup_is_exact_and_delete_removes_one() {
    let store = seeded_store();
    assert!(store.get_by_name("france").is_none());
    assert_eq!(store.get_by_name("France").unwrap().currency_code, "EUR");
    assert_eq!(store.delete_by_name("France").unwrap(), 1);
    assert_eq!(store.delete_by_name("France").unwrap(), 0);
    assert_eq!(store.count(), 4);
}

#[test]
fn one_batch_shares_one_timestamp() {
    let store = seeded_store();
    let snap = store.snapshot();
    let first = snap[0].refreshed_at;
    assert!(snap.iter().all(|r| r.refreshed_at == first));
    assert_eq!(store.last_refresh_time(), Some(first));
}

#[test]
fn replace_discards_previous_generation() {
    let store = seeded_store();
    store
        .replace_all(vec![country("Chad", "Africa", "XAF", None)])
        .unwrap();
    assert_eq!(store.count(), 1);
    assert!(store.get_by_name("France").is_none());
}

#[test]
fn export_csv_and_json() {
    let store = seeded_store();
    let rows = store.query(&CountryFilter::default());
    let dir = tempdir().unwrap();

    let csv_path = dir.path().join("countries.csv");
    storage::export_csv(&rows, &csv_path).unwrap();
    let csv_txt = fs::read_to_string(&csv_path).unwrap();
    assert!(csv_txt.starts_with("name,capital,region,"));
    assert_eq!(csv_txt.lines().count(), 1 + rows.len());

    let json_path = dir.path().join("countries.json");
    storage::export_json(&rows, &json_path).unwrap();
    let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(v.as_array().unwrap().len(), rows.len());
    assert_eq!(v[0]["name"], "France");
}

// Spreadsheet apps execute cells that start with = + - @, so exported text is
// prefixed with a single quote.
#[test]
fn csv_cells_are_prefixed_to_avoid_formulas() {
    let store = SnapshotStore::in_memory();
    store
        .replace_all(vec![country("=HYPERLINK(\"http://evil\")", "@region", "+X", None)])
        .unwrap();
    let rows = store.query(&CountryFilter::default());
    let dir = tempdir().unwrap();
    let path = dir.path().join("injection.csv");
    storage::export_csv(&rows, &path).unwrap();

    let mut rdr = csv::Reader::from_path(&path).unwrap();
    let headers = rdr.headers().unwrap().clone();
    let row = rdr.records().next().expect("one data row").unwrap();
    let cell = |name: &str| {
        let idx = headers.iter().position(|h| h == name).expect("header present");
        row.get(idx).unwrap().to_string()
    };
    assert_eq!(cell("name"), "'=HYPERLINK(\"http://evil\")");
    assert_eq!(cell("region"), "'@region");
    assert_eq!(cell("currency_code"), "'+X");
}
