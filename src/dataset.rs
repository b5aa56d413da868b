//! Loading of normalised salary datasets.
//!
//! A dataset is a CSV file with a header row naming the columns `source`, `role`, `level`,
//! `location`, `state`, `country`, `currency`, `work_model`, `base_salary_min`,
//! `base_salary_max`, `total_compensation` and optionally `observed_at` (`YYYY-MM-DD`). Missing
//! columns and blank cells are treated as unknown.

use crate::error::SalaryStatsError;
use crate::models::SalaryObservation;
use crate::store::SalaryStore;

use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use time::macros::format_description;
use time::Date;
use tracing::{event, Level};

/// A dataset record as it appears in the CSV file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DatasetRecord {
    source: String,
    role: String,
    level: String,
    location: String,
    state: String,
    country: String,
    currency: String,
    work_model: String,
    base_salary_min: String,
    base_salary_max: String,
    total_compensation: String,
    observed_at: String,
}

/// Outcome of loading a dataset.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LoadReport {
    /// Number of records read from the file
    pub rows_read: usize,
    /// Number of new observations stored
    pub rows_inserted: usize,
    /// Number of records identical to an existing observation
    pub duplicates: usize,
}

fn parse_decimal(
    record: u64,
    field: &'static str,
    value: &str,
) -> Result<Option<Decimal>, SalaryStatsError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    Decimal::from_str(value)
        .map(Some)
        .map_err(|_| SalaryStatsError::InvalidDatasetValue {
            record,
            field,
            value: value.to_string(),
        })
}

fn parse_date(record: u64, value: &str) -> Result<Option<Date>, SalaryStatsError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .map(Some)
        .map_err(|_| SalaryStatsError::InvalidDatasetValue {
            record,
            field: "observed_at",
            value: value.to_string(),
        })
}

impl DatasetRecord {
    /// Convert into an observation. `record` is the 1-based record number, used in errors.
    fn into_observation(self, record: u64) -> Result<SalaryObservation, SalaryStatsError> {
        if self.role.trim().is_empty() {
            return Err(SalaryStatsError::InvalidDatasetValue {
                record,
                field: "role",
                value: self.role,
            });
        }
        Ok(SalaryObservation {
            base_salary_min: parse_decimal(record, "base_salary_min", &self.base_salary_min)?,
            base_salary_max: parse_decimal(record, "base_salary_max", &self.base_salary_max)?,
            total_compensation: parse_decimal(
                record,
                "total_compensation",
                &self.total_compensation,
            )?,
            observed_at: parse_date(record, &self.observed_at)?,
            source: self.source.trim().to_string(),
            role: self.role.trim().to_string(),
            level: self.level.trim().to_string(),
            location: self.location.trim().to_string(),
            state: self.state.trim().to_string(),
            country: self.country.trim().to_string(),
            currency: self.currency.trim().to_string(),
            work_model: self.work_model.trim().to_string(),
        })
    }
}

/// Read every observation from a dataset file.
///
/// Fails with [SalaryStatsError::DataUnavailable] if the file does not exist.
pub fn read_dataset(path: &Path) -> Result<Vec<SalaryObservation>, SalaryStatsError> {
    if !path.exists() {
        return Err(SalaryStatsError::DataUnavailable(format!(
            "salary dataset {} not found",
            path.display()
        )));
    }
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_path(path)?;
    reader
        .deserialize::<DatasetRecord>()
        .enumerate()
        .map(|(index, record)| record?.into_observation(index as u64 + 1))
        .collect()
}

/// Load a dataset into the store.
///
/// All observations are inserted in one transaction. Loading the same dataset twice is a no-op.
#[tracing::instrument(level = "DEBUG", skip(store))]
pub fn load_dataset(store: &mut SalaryStore, path: &Path) -> Result<LoadReport, SalaryStatsError> {
    let observations = read_dataset(path)?;
    let rows_inserted = store.insert_observations(&observations)?;
    let report = LoadReport {
        rows_read: observations.len(),
        rows_inserted,
        duplicates: observations.len() - rows_inserted,
    };
    event!(
        Level::INFO,
        "loaded {} observations from {} ({} duplicates)",
        report.rows_inserted,
        path.display(),
        report.duplicates
    );
    Ok(report)
}

/// Load a dataset into the store unless the store already has observations.
///
/// Returns `None` if the store was already populated.
pub fn ensure_dataset_loaded(
    store: &mut SalaryStore,
    path: &Path,
) -> Result<Option<LoadReport>, SalaryStatsError> {
    if store.has_observations()? {
        event!(Level::DEBUG, "observations present, skipping dataset load");
        return Ok(None);
    }
    load_dataset(store, path).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{self, FilterParams};
    use crate::test_utils::{self, dec};

    use std::io::Write;
    use tempfile::NamedTempFile;
    use time::macros::date;

    const HEADER: &str = "source,role,level,location,state,country,currency,work_model,\
        base_salary_min,base_salary_max,total_compensation";

    fn dataset(rows: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn read_rows() {
        let file = dataset(&[
            "levels, Engineer ,Senior,San Francisco,CA,US,USD,Remote,150000,180000.50,250000",
            "glassdoor,Designer,,New York,NY,US,USD,Onsite,,,90000",
        ]);
        let observations = read_dataset(file.path()).unwrap();
        assert_eq!(2, observations.len());
        assert_eq!("Engineer", observations[0].role);
        assert_eq!(Some(dec("180000.50")), observations[0].base_salary_max);
        assert_eq!("", observations[1].level);
        assert_eq!(None, observations[1].base_salary_min);
        assert_eq!(Some(dec("90000")), observations[1].total_compensation);
        assert_eq!(None, observations[1].observed_at);
    }

    #[test]
    fn read_observed_at() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "role,currency,total_compensation,observed_at").unwrap();
        writeln!(file, "Engineer,USD,100,2024-03-15").unwrap();
        writeln!(file, "Engineer,USD,200,").unwrap();
        file.flush().unwrap();
        let observations = read_dataset(file.path()).unwrap();
        assert_eq!(Some(date!(2024 - 03 - 15)), observations[0].observed_at);
        assert_eq!(None, observations[1].observed_at);
        assert_eq!("", observations[0].source);
    }

    #[test]
    fn read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_dataset(&dir.path().join("missing.csv")).unwrap_err();
        assert!(matches!(err, SalaryStatsError::DataUnavailable(_)));
    }

    #[test]
    fn read_invalid_measure() {
        let file = dataset(&[
            "levels,Engineer,Senior,Austin,TX,US,USD,Remote,100,200,300",
            "levels,Engineer,Senior,Austin,TX,US,USD,Remote,100,lots,300",
        ]);
        let err = read_dataset(file.path()).unwrap_err();
        assert_eq!(
            "invalid base_salary_max value \"lots\" in dataset record 2",
            err.to_string()
        );
    }

    #[test]
    fn read_blank_role() {
        let file = dataset(&["levels, ,Senior,Austin,TX,US,USD,Remote,100,200,300"]);
        let err = read_dataset(file.path()).unwrap_err();
        assert!(matches!(
            err,
            SalaryStatsError::InvalidDatasetValue { field: "role", .. }
        ));
    }

    #[test]
    fn read_malformed_csv() {
        let file = dataset(&["levels,Engineer,Senior"]);
        let err = read_dataset(file.path()).unwrap_err();
        assert!(matches!(err, SalaryStatsError::Dataset(_)));
    }

    #[test]
    fn load_is_idempotent() {
        let (_dir, mut store) = test_utils::temp_store();
        let file = dataset(&[
            "levels,Engineer,Senior,Austin,TX,US,USD,Remote,100,200,300",
            "levels,Engineer,Senior,Austin,TX,US,USD,Remote,100,200,300",
            "levels,Designer,Junior,Austin,TX,US,USD,Remote,50,60,70",
        ]);
        let report = load_dataset(&mut store, file.path()).unwrap();
        assert_eq!(
            LoadReport {
                rows_read: 3,
                rows_inserted: 2,
                duplicates: 1
            },
            report
        );
        let report = load_dataset(&mut store, file.path()).unwrap();
        assert_eq!(0, report.rows_inserted);
        assert_eq!(3, report.duplicates);

        let filters = filters::resolve(Some("engineer"), &FilterParams::default()).unwrap();
        assert_eq!(1, store.observations(&filters).unwrap().len());
    }

    #[test]
    fn ensure_loaded_only_when_empty() {
        let (_dir, mut store) = test_utils::temp_store();
        let file = dataset(&["levels,Engineer,Senior,Austin,TX,US,USD,Remote,100,200,300"]);
        let report = ensure_dataset_loaded(&mut store, file.path()).unwrap();
        assert_eq!(Some(1), report.map(|r| r.rows_inserted));

        let other = dataset(&["levels,Designer,Senior,Austin,TX,US,USD,Remote,100,200,300"]);
        assert_eq!(None, ensure_dataset_loaded(&mut store, other.path()).unwrap());
        assert_eq!(vec!["engineer"], store.distinct_roles().unwrap());
    }

    #[test]
    fn ensure_loaded_populated_store_ignores_missing_file() {
        let (dir, mut store) = test_utils::seeded_store();
        let missing = dir.path().join("missing.csv");
        assert_eq!(None, ensure_dataset_loaded(&mut store, &missing).unwrap());
    }
}
