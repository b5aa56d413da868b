//! Shared fixtures for unit tests.

use crate::models::*;
use crate::store::SalaryStore;

use rust_decimal::Decimal;
use tempfile::TempDir;

/// Parse a decimal literal.
pub(crate) fn dec(value: &str) -> Decimal {
    Decimal::from_str_exact(value).unwrap()
}

/// Create a SalaryObservation with only the role set.
pub(crate) fn observation(role: &str) -> SalaryObservation {
    SalaryObservation {
        role: role.to_string(),
        ..Default::default()
    }
}

/// Create an observation with every field set.
#[allow(clippy::too_many_arguments)]
pub(crate) fn full_observation(
    source: &str,
    role: &str,
    level: &str,
    location: &str,
    state: &str,
    currency: &str,
    work_model: &str,
    salary: Option<(&str, &str)>,
    total_compensation: &str,
) -> SalaryObservation {
    SalaryObservation {
        source: source.to_string(),
        role: role.to_string(),
        level: level.to_string(),
        location: location.to_string(),
        state: state.to_string(),
        country: if currency == "EUR" { "DE" } else { "US" }.to_string(),
        currency: currency.to_string(),
        work_model: work_model.to_string(),
        base_salary_min: salary.map(|(min, _)| dec(min)),
        base_salary_max: salary.map(|(_, max)| dec(max)),
        total_compensation: Some(dec(total_compensation)),
        observed_at: None,
    }
}

/// Observations used by store-backed tests.
#[rustfmt::skip]
pub(crate) fn fixture_observations() -> Vec<SalaryObservation> {
    vec![
        full_observation(
            "levels", "Engineer", "Senior", "San Francisco", "CA", "USD", "Remote",
            Some(("150000", "180000")), "250000",
        ),
        full_observation(
            "levels", "Engineer", "Junior", "Seattle", "WA", "USD", "Hybrid",
            Some(("90000", "110000")), "120000",
        ),
        full_observation(
            "glassdoor", "Engineer", "Senior", "New York", "NY", "USD", "Onsite",
            Some(("140000", "170000")), "200000",
        ),
        full_observation(
            "glassdoor", "Engineer", "", "Los Angeles", "CA", "USD", "Remote", None, "150000",
        ),
        full_observation(
            "levels", "Engineer", "Senior", "Berlin", "", "EUR", "Hybrid",
            Some(("70000", "90000")), "100000",
        ),
        full_observation(
            "levels", "Designer", "Mid", "San Francisco", "CA", "USD", "Onsite",
            Some(("100000", "120000")), "140000",
        ),
        full_observation(
            "glassdoor", " designer ", "Senior", "New York", "NY", "USD", "Remote",
            Some(("110000", "130000")), "160000",
        ),
    ]
}

/// Create an empty store in a temporary directory.
///
/// The directory is removed when the returned [TempDir] is dropped.
pub(crate) fn temp_store() -> (TempDir, SalaryStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SalaryStore::create(&dir.path().join("salaries.sqlite3")).unwrap();
    (dir, store)
}

/// Create a store in a temporary directory containing the fixture observations.
pub(crate) fn seeded_store() -> (TempDir, SalaryStore) {
    let (dir, mut store) = temp_store();
    store
        .insert_observations(&fixture_observations())
        .unwrap();
    (dir, store)
}

/// Create a Summary with no observations.
pub(crate) fn empty_summary(role: &str) -> Summary {
    Summary {
        role: role.to_string(),
        filters: FilterEcho {
            role: Some(role.to_string()),
            ..Default::default()
        },
        total_observations: 0,
        currencies: vec![],
        levels: vec![],
        states: vec![],
        work_models: vec![],
    }
}

/// Create an Insights with no observations.
pub(crate) fn empty_insights(role: &str) -> Insights {
    Insights {
        role: role.to_string(),
        filters: FilterEcho {
            role: Some(role.to_string()),
            ..Default::default()
        },
        total_observations: 0,
        percentiles: Percentiles::default(),
        top_states: vec![],
        top_locations: vec![],
        top_work_models: vec![],
        top_sources: vec![],
    }
}
