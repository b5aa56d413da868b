//! SQLite-backed observation and aggregate store.
//!
//! Salary measures are stored as integer hundredths so that the database never rounds them.
//! Each [SalaryStore] owns a single connection and is intended to be used by one task at a time;
//! request handlers open a fresh store per request.

use crate::error::SalaryStatsError;
use crate::filters::{self, ResolvedFilters};
use crate::models::{GroupField, Insights, SalaryObservation, SalaryRoleAggregate, Summary};
use crate::statistics::round_half_up;

use rusqlite::functions::FunctionFlags;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use rust_decimal::Decimal;
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::{event, Level};

const SCHEMA_VERSION: i64 = 1;

const SCHEMA_V1: &str = r"
CREATE TABLE IF NOT EXISTS salary_observations (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  source TEXT NOT NULL DEFAULT '',
  role TEXT NOT NULL,
  level TEXT NOT NULL DEFAULT '',
  location TEXT NOT NULL DEFAULT '',
  state TEXT NOT NULL DEFAULT '',
  country TEXT NOT NULL DEFAULT '',
  currency TEXT NOT NULL DEFAULT '',
  work_model TEXT NOT NULL DEFAULT '',
  base_salary_min_cents INTEGER,
  base_salary_max_cents INTEGER,
  total_compensation_cents INTEGER,
  observed_at TEXT,
  ingested_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_salary_observations_identity
  ON salary_observations(
    source, role, level, location, state, country, currency, work_model,
    coalesce(base_salary_min_cents, ''),
    coalesce(base_salary_max_cents, ''),
    coalesce(total_compensation_cents, ''),
    coalesce(observed_at, '')
  );

CREATE TRIGGER IF NOT EXISTS trg_salary_observations_no_update
BEFORE UPDATE ON salary_observations
BEGIN
  SELECT RAISE(FAIL, 'salary_observations is append-only');
END;

CREATE TABLE IF NOT EXISTS salary_role_aggregates (
  role TEXT PRIMARY KEY,
  summary_json TEXT,
  insights_json TEXT,
  generated_at TEXT NOT NULL
);
";

const OBSERVATION_COLUMNS: &str = "source, role, level, location, state, country, currency, \
    work_model, base_salary_min_cents, base_salary_max_cents, total_compensation_cents, \
    observed_at";

/// Store of salary observations and precomputed per-role aggregates.
pub struct SalaryStore {
    conn: Connection,
}

impl SalaryStore {
    /// Open an existing store.
    ///
    /// Fails with [SalaryStatsError::DataUnavailable] if the database file does not exist.
    pub fn open(path: &Path) -> Result<Self, SalaryStatsError> {
        if !path.exists() {
            return Err(SalaryStatsError::DataUnavailable(format!(
                "salary database {} not found",
                path.display()
            )));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::configure(conn)
    }

    /// Open a store, creating the database file if necessary, and apply the schema.
    pub fn create(path: &Path) -> Result<Self, SalaryStatsError> {
        let store = Self::configure(Connection::open(path)?)?;
        store.migrate()?;
        Ok(store)
    }

    fn configure(conn: Connection) -> Result<Self, SalaryStatsError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        // Text comparisons must fold case the same way as filter values.
        conn.create_scalar_function(
            "normalise",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| Ok(filters::normalise(ctx.get::<Option<String>>(0)?.as_deref())),
        )?;
        Ok(Self { conn })
    }

    /// Apply the schema. Safe to call repeatedly.
    pub fn migrate(&self) -> Result<(), SalaryStatsError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );",
        )?;
        self.conn.execute_batch(SCHEMA_V1)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
            params![SCHEMA_VERSION, now_rfc3339()?],
        )?;
        Ok(())
    }

    /// Insert observations in a single transaction.
    ///
    /// Observations identical to an existing row are skipped. Returns the number inserted.
    #[tracing::instrument(level = "DEBUG", skip_all, fields(count = observations.len()))]
    pub fn insert_observations(
        &mut self,
        observations: &[SalaryObservation],
    ) -> Result<usize, SalaryStatsError> {
        let ingested_at = now_rfc3339()?;
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO salary_observations(
                    source, role, level, location, state, country, currency, work_model,
                    base_salary_min_cents, base_salary_max_cents, total_compensation_cents,
                    observed_at, ingested_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for observation in observations {
                inserted += stmt.execute(params![
                    observation.source,
                    observation.role,
                    observation.level,
                    observation.location,
                    observation.state,
                    observation.country,
                    observation.currency,
                    observation.work_model,
                    to_cents(observation.base_salary_min)?,
                    to_cents(observation.base_salary_max)?,
                    to_cents(observation.total_compensation)?,
                    observation.observed_at.map(format_date).transpose()?,
                    ingested_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Returns true if the store contains at least one observation.
    pub fn has_observations(&self) -> Result<bool, SalaryStatsError> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM salary_observations)",
            [],
            |row| row.get(0),
        )?;
        Ok(exists != 0)
    }

    /// Returns the observations matching a set of filters.
    ///
    /// Every supplied filter is compared against the column value normalised with
    /// [filters::normalise].
    #[tracing::instrument(level = "DEBUG", skip(self))]
    pub fn observations(
        &self,
        filters: &ResolvedFilters,
    ) -> Result<Vec<SalaryObservation>, SalaryStatsError> {
        let mut sql =
            format!("SELECT {OBSERVATION_COLUMNS} FROM salary_observations WHERE normalise(role) = ?");
        let mut values = vec![filters.role.as_str()];
        for (field, value) in filters.constraints() {
            if let Some(value) = value {
                sql.push_str(&format!(" AND normalise({field}) = ?"));
                values.push(value);
            }
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), parse_observation_row)?;
        let observations = rows.collect::<Result<Vec<_>, _>>()?;
        event!(Level::DEBUG, "{} observations matched", observations.len());
        Ok(observations)
    }

    /// Returns every distinct normalised role, in ascending order.
    pub fn distinct_roles(&self) -> Result<Vec<String>, SalaryStatsError> {
        self.query_strings(
            "SELECT DISTINCT normalise(role) AS value FROM salary_observations
             WHERE normalise(role) IS NOT NULL ORDER BY value",
        )
    }

    /// Returns every distinct non-blank value of a field, in ascending order.
    pub fn distinct_values(&self, field: GroupField) -> Result<Vec<String>, SalaryStatsError> {
        self.query_strings(&format!(
            "SELECT DISTINCT {field} FROM salary_observations
             WHERE normalise({field}) IS NOT NULL ORDER BY {field}"
        ))
    }

    /// Returns the roles that have a precomputed aggregate, in ascending order.
    pub fn aggregate_roles(&self) -> Result<Vec<String>, SalaryStatsError> {
        self.query_strings("SELECT role FROM salary_role_aggregates ORDER BY role")
    }

    /// Look up the precomputed aggregate for a normalised role.
    #[tracing::instrument(level = "DEBUG", skip(self))]
    pub fn aggregate(&self, role: &str) -> Result<Option<SalaryRoleAggregate>, SalaryStatsError> {
        let row = self
            .conn
            .query_row(
                "SELECT role, summary_json, insights_json, generated_at
                 FROM salary_role_aggregates WHERE role = ?1",
                params![role],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((role, summary, insights, generated_at)) = row else {
            return Ok(None);
        };
        Ok(Some(SalaryRoleAggregate {
            role,
            summary: summary.as_deref().map(serde_json::from_str).transpose()?,
            insights: insights.as_deref().map(serde_json::from_str).transpose()?,
            generated_at,
        }))
    }

    /// Insert or replace the precomputed aggregate for a normalised role.
    ///
    /// Concurrent writers for the same role race; the last write wins.
    #[tracing::instrument(level = "DEBUG", skip(self, summary, insights))]
    pub fn upsert_aggregate(
        &self,
        role: &str,
        summary: &Summary,
        insights: &Insights,
    ) -> Result<SalaryRoleAggregate, SalaryStatsError> {
        let generated_at = now_rfc3339()?;
        self.conn.execute(
            "INSERT INTO salary_role_aggregates(role, summary_json, insights_json, generated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(role) DO UPDATE SET
               summary_json = excluded.summary_json,
               insights_json = excluded.insights_json,
               generated_at = excluded.generated_at",
            params![
                role,
                serde_json::to_string(summary)?,
                serde_json::to_string(insights)?,
                generated_at,
            ],
        )?;
        Ok(SalaryRoleAggregate {
            role: role.to_string(),
            summary: Some(summary.clone()),
            insights: Some(insights.clone()),
            generated_at,
        })
    }

    fn query_strings(&self, sql: &str) -> Result<Vec<String>, SalaryStatsError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn parse_observation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SalaryObservation> {
    let observed_at = row
        .get::<_, Option<String>>(11)?
        .map(|value| {
            Date::parse(&value, format_description!("[year]-[month]-[day]")).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(err))
            })
        })
        .transpose()?;
    Ok(SalaryObservation {
        source: row.get(0)?,
        role: row.get(1)?,
        level: row.get(2)?,
        location: row.get(3)?,
        state: row.get(4)?,
        country: row.get(5)?,
        currency: row.get(6)?,
        work_model: row.get(7)?,
        base_salary_min: from_cents(row.get(8)?),
        base_salary_max: from_cents(row.get(9)?),
        total_compensation: from_cents(row.get(10)?),
        observed_at,
    })
}

/// Convert a measure to integer hundredths, rounding half-up.
fn to_cents(value: Option<Decimal>) -> Result<Option<i64>, SalaryStatsError> {
    value
        .map(|value| -> Result<i64, SalaryStatsError> {
            let mut rounded = round_half_up(value);
            rounded.rescale(2);
            Ok(i64::try_from(rounded.mantissa())?)
        })
        .transpose()
}

fn from_cents(cents: Option<i64>) -> Option<Decimal> {
    cents.map(|cents| Decimal::new(cents, 2))
}

fn format_date(date: Date) -> Result<String, SalaryStatsError> {
    Ok(date.format(format_description!("[year]-[month]-[day]"))?)
}

/// Current time as an RFC 3339 string.
pub(crate) fn now_rfc3339() -> Result<String, SalaryStatsError> {
    Ok(OffsetDateTime::now_utc().format(&Rfc3339)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{self, FilterParams};
    use crate::test_utils::{self, dec, observation};

    use time::macros::date;

    #[test]
    fn open_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.sqlite3");
        let err = SalaryStore::open(&path).err().unwrap();
        assert!(matches!(err, SalaryStatsError::DataUnavailable(_)));
        assert!(!path.exists());
    }

    #[test]
    fn create_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("salaries.sqlite3");
        let store = SalaryStore::create(&path).unwrap();
        // Migrating twice is harmless.
        store.migrate().unwrap();
        drop(store);
        let store = SalaryStore::open(&path).unwrap();
        assert!(!store.has_observations().unwrap());
    }

    #[test]
    fn duplicate_insert_is_noop() {
        let (_dir, mut store) = test_utils::temp_store();
        let row = SalaryObservation {
            currency: "USD".to_string(),
            total_compensation: Some(dec("100.50")),
            ..observation("Engineer")
        };
        assert_eq!(1, store.insert_observations(&[row.clone()]).unwrap());
        assert_eq!(0, store.insert_observations(&[row.clone()]).unwrap());
        // Duplicates with missing measures and dates are detected too.
        let sparse = observation("Designer");
        assert_eq!(1, store.insert_observations(&[sparse.clone(), sparse]).unwrap());
        assert!(store.has_observations().unwrap());
    }

    #[test]
    fn observations_round_trip() {
        let (_dir, mut store) = test_utils::temp_store();
        let row = SalaryObservation {
            source: "levels".to_string(),
            level: "Senior".to_string(),
            location: "San Francisco".to_string(),
            state: "CA".to_string(),
            country: "US".to_string(),
            currency: "USD".to_string(),
            work_model: "Hybrid".to_string(),
            base_salary_min: Some(dec("150000.25")),
            base_salary_max: Some(dec("180000")),
            total_compensation: Some(dec("250000.99")),
            observed_at: Some(date!(2024 - 03 - 15)),
            ..observation("Engineer")
        };
        store.insert_observations(&[row.clone()]).unwrap();
        let filters = filters::resolve(Some("engineer"), &FilterParams::default()).unwrap();
        assert_eq!(vec![row], store.observations(&filters).unwrap());
    }

    #[test]
    fn measures_rounded_to_cents() {
        let (_dir, mut store) = test_utils::temp_store();
        let row = SalaryObservation {
            total_compensation: Some(dec("100.005")),
            ..observation("Engineer")
        };
        store.insert_observations(&[row]).unwrap();
        let filters = filters::resolve(Some("engineer"), &FilterParams::default()).unwrap();
        let observations = store.observations(&filters).unwrap();
        assert_eq!(Some(dec("100.01")), observations[0].total_compensation);
    }

    #[test]
    fn observations_filtered_case_insensitively() {
        let (_dir, store) = test_utils::seeded_store();
        let params = FilterParams {
            state: Some("ca".to_string()),
            work_model: Some(" REMOTE ".to_string()),
            ..Default::default()
        };
        let filters = filters::resolve(Some(" ENGINEER "), &params).unwrap();
        let observations = store.observations(&filters).unwrap();
        assert!(!observations.is_empty());
        assert!(observations
            .iter()
            .all(|o| o.state == "CA" && o.work_model == "Remote" && o.role == "Engineer"));
    }

    #[test]
    fn observations_no_match() {
        let (_dir, store) = test_utils::seeded_store();
        let filters = filters::resolve(Some("astronaut"), &FilterParams::default()).unwrap();
        assert!(store.observations(&filters).unwrap().is_empty());
    }

    #[test]
    fn observations_filtered_with_unicode_case() {
        let (_dir, mut store) = test_utils::temp_store();
        let rows = [
            SalaryObservation {
                location: "Île-de-France".to_string(),
                ..observation("Engineer")
            },
            SalaryObservation {
                location: "\u{a0}ÎLE-DE-FRANCE".to_string(),
                ..observation("ÉCONOMISTE")
            },
            observation("Économiste"),
        ];
        store.insert_observations(&rows).unwrap();

        let params = FilterParams {
            location: Some("Île-de-France".to_string()),
            ..Default::default()
        };
        let filters = filters::resolve(Some("Engineer"), &params).unwrap();
        assert_eq!(vec![rows[0].clone()], store.observations(&filters).unwrap());

        let filters = filters::resolve(Some("économiste"), &params).unwrap();
        assert_eq!(vec![rows[1].clone()], store.observations(&filters).unwrap());

        let filters = filters::resolve(Some("Économiste"), &FilterParams::default()).unwrap();
        assert_eq!(2, store.observations(&filters).unwrap().len());

        assert_eq!(vec!["engineer", "économiste"], store.distinct_roles().unwrap());
    }

    #[test]
    fn distinct_values_skip_unicode_blanks() {
        let (_dir, mut store) = test_utils::temp_store();
        let rows = [
            SalaryObservation {
                state: "\u{3000}".to_string(),
                ..observation("Engineer")
            },
            SalaryObservation {
                state: "CA".to_string(),
                ..observation("Engineer")
            },
        ];
        store.insert_observations(&rows).unwrap();
        assert_eq!(vec!["CA"], store.distinct_values(GroupField::State).unwrap());
    }

    #[test]
    fn distinct_roles_and_values() {
        let (_dir, store) = test_utils::seeded_store();
        assert_eq!(vec!["designer", "engineer"], store.distinct_roles().unwrap());
        assert_eq!(
            vec!["CA", "NY", "WA"],
            store.distinct_values(GroupField::State).unwrap()
        );
        assert_eq!(
            vec!["Hybrid", "Onsite", "Remote"],
            store.distinct_values(GroupField::WorkModel).unwrap()
        );
    }

    #[test]
    fn aggregate_upsert_and_lookup() {
        let (_dir, store) = test_utils::seeded_store();
        assert_eq!(None, store.aggregate("engineer").unwrap());

        let summary = test_utils::empty_summary("engineer");
        let insights = test_utils::empty_insights("engineer");
        let first = store.upsert_aggregate("engineer", &summary, &insights).unwrap();
        assert_eq!(first, store.aggregate("engineer").unwrap().unwrap());

        let mut summary = summary;
        summary.total_observations = 42;
        let second = store.upsert_aggregate("engineer", &summary, &insights).unwrap();
        let stored = store.aggregate("engineer").unwrap().unwrap();
        assert_eq!(second, stored);
        assert_eq!(42, stored.summary.unwrap().total_observations);
        assert_eq!(vec!["engineer"], store.aggregate_roles().unwrap());
    }

    #[test]
    fn to_cents_overflow() {
        let err = to_cents(Some(Decimal::MAX)).unwrap_err();
        assert!(matches!(err, SalaryStatsError::TryFromInt(_)));
    }
}
