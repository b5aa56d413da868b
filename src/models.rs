//! Data types and associated functions and methods

use crate::filters::FilterParams;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use time::Date;
use validator::Validate;

/// A single reported salary data point.
///
/// Observations are immutable once ingested.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SalaryObservation {
    /// Dataset the observation was ingested from
    pub source: String,
    pub role: String,
    pub level: String,
    pub location: String,
    pub state: String,
    pub country: String,
    /// ISO 4217 currency code of the measures
    pub currency: String,
    /// Remote, hybrid, on-site, ...
    pub work_model: String,
    pub base_salary_min: Option<Decimal>,
    pub base_salary_max: Option<Decimal>,
    pub total_compensation: Option<Decimal>,
    /// Date on which the salary was reported, if known
    pub observed_at: Option<Date>,
}

/// Text fields of an observation that can be grouped or filtered on.
///
/// The [Display] implementation yields the database column name.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[strum(serialize_all = "snake_case")]
pub enum GroupField {
    Source,
    Role,
    Level,
    Location,
    State,
    Country,
    Currency,
    WorkModel,
}

impl GroupField {
    /// Returns the value of this field for an observation.
    pub fn value(self, observation: &SalaryObservation) -> &str {
        match self {
            Self::Source => &observation.source,
            Self::Role => &observation.role,
            Self::Level => &observation.level,
            Self::Location => &observation.location,
            Self::State => &observation.state,
            Self::Country => &observation.country,
            Self::Currency => &observation.currency,
            Self::WorkModel => &observation.work_model,
        }
    }
}

/// Query parameters accepted by the summary and insights endpoints.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Validate)]
pub struct SalaryQuery {
    /// Role to report on. Required, but checked by filter resolution so that a missing role
    /// produces the same error as a blank one.
    #[validate(length(max = 255))]
    pub role: Option<String>,
    #[validate(length(max = 255))]
    pub location: Option<String>,
    #[validate(length(max = 255))]
    pub country: Option<String>,
    #[validate(length(max = 255))]
    pub state: Option<String>,
    #[validate(length(max = 255))]
    pub level: Option<String>,
    #[validate(length(max = 255))]
    pub currency: Option<String>,
    #[validate(length(max = 255))]
    pub work_model: Option<String>,
    /// Bypass the precomputed per-role aggregates
    pub raw: Option<bool>,
}

impl SalaryQuery {
    /// Returns the optional filters of this query.
    pub fn filter_params(&self) -> FilterParams {
        FilterParams {
            location: self.location.clone(),
            country: self.country.clone(),
            state: self.state.clone(),
            level: self.level.clone(),
            currency: self.currency.clone(),
            work_model: self.work_model.clone(),
        }
    }
}

/// Query parameters accepted by the comparison endpoint.
///
/// Roles may be given as a comma-separated `roles` parameter, as repeated `role` parameters, or
/// both. Serde cannot collect repeated keys, so this type is built by [ComparisonQuery::parse].
#[derive(Clone, Debug, Default, PartialEq, Validate)]
pub struct ComparisonQuery {
    #[validate(length(max = 50, message = "at most 50 roles may be compared"))]
    pub roles: Vec<String>,
    #[validate(length(max = 255))]
    pub location: Option<String>,
    #[validate(length(max = 255))]
    pub country: Option<String>,
    #[validate(length(max = 255))]
    pub state: Option<String>,
    #[validate(length(max = 255))]
    pub level: Option<String>,
    #[validate(length(max = 255))]
    pub currency: Option<String>,
    #[validate(length(max = 255))]
    pub work_model: Option<String>,
    pub raw: Option<bool>,
}

impl ComparisonQuery {
    /// Parse a comparison query from a URL-encoded query string.
    ///
    /// Unknown parameters are ignored. An unparseable `raw` flag is treated as absent.
    pub fn parse(query: &str) -> Self {
        let mut parsed = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "roles" => parsed.roles.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|role| !role.is_empty())
                        .map(String::from),
                ),
                "role" => {
                    let role = value.trim();
                    if !role.is_empty() {
                        parsed.roles.push(role.to_string());
                    }
                }
                "location" => parsed.location = Some(value.into_owned()),
                "country" => parsed.country = Some(value.into_owned()),
                "state" => parsed.state = Some(value.into_owned()),
                "level" => parsed.level = Some(value.into_owned()),
                "currency" => parsed.currency = Some(value.into_owned()),
                "work_model" => parsed.work_model = Some(value.into_owned()),
                "raw" => parsed.raw = value.parse().ok(),
                _ => (),
            }
        }
        parsed
    }

    /// Returns the shared optional filters of this query.
    pub fn filter_params(&self) -> FilterParams {
        FilterParams {
            location: self.location.clone(),
            country: self.country.clone(),
            state: self.state.clone(),
            level: self.level.clone(),
            currency: self.currency.clone(),
            work_model: self.work_model.clone(),
        }
    }
}

/// Normalised echo of the filters a report was computed with.
///
/// Each field is lower-cased and trimmed, or `null` when it was not supplied.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct FilterEcho {
    /// Omitted when the echo is shared between several roles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub level: Option<String>,
    pub currency: Option<String>,
    pub work_model: Option<String>,
}

/// Minimum, maximum and mean of one salary measure, rounded to 2 decimal places.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct MeasureStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
}

/// Observation count and mean total compensation of one source.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SourceBreakdown {
    pub source: String,
    pub observations: u64,
    pub avg_total_compensation: Option<f64>,
}

/// Statistics for the observations reported in one currency.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CurrencyBreakdown {
    pub currency: String,
    pub observations: u64,
    pub base_salary_min: MeasureStats,
    pub base_salary_max: MeasureStats,
    pub total_compensation: MeasureStats,
    /// Sorted by source name
    pub sources: Vec<SourceBreakdown>,
}

/// Statistics for the observations sharing one value of a [GroupField].
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GroupBreakdown {
    pub value: String,
    pub observations: u64,
    pub currencies: Vec<CurrencyBreakdown>,
}

/// Result of a summary report.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Summary {
    pub role: String,
    pub filters: FilterEcho,
    pub total_observations: u64,
    pub currencies: Vec<CurrencyBreakdown>,
    pub levels: Vec<GroupBreakdown>,
    pub states: Vec<GroupBreakdown>,
    pub work_models: Vec<GroupBreakdown>,
}

/// Quartiles of total compensation.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Percentiles {
    pub p25: Option<f64>,
    pub median: Option<f64>,
    pub p75: Option<f64>,
}

/// One entry of a top-N ranking by mean total compensation.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TopGroup {
    pub value: String,
    pub observations: u64,
    pub avg_total_compensation: Option<f64>,
}

/// Result of an insights report.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Insights {
    pub role: String,
    pub filters: FilterEcho,
    pub total_observations: u64,
    pub percentiles: Percentiles,
    pub top_states: Vec<TopGroup>,
    pub top_locations: Vec<TopGroup>,
    pub top_work_models: Vec<TopGroup>,
    pub top_sources: Vec<TopGroup>,
}

/// Result of a role comparison.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Comparison {
    /// Normalised roles, in the same order as `summaries`
    pub roles: Vec<String>,
    /// Filters shared by every summary
    pub filters: FilterEcho,
    pub summaries: Vec<Summary>,
}

/// Precomputed statistics for one role.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SalaryRoleAggregate {
    pub role: String,
    pub summary: Option<Summary>,
    pub insights: Option<Insights>,
    /// RFC 3339 timestamp of the last rebuild
    pub generated_at: String,
}

/// Values available for each filter, used to populate client-side pickers.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct FilterOptions {
    pub roles: Vec<String>,
    pub states: Vec<String>,
    pub levels: Vec<String>,
    pub work_models: Vec<String>,
}
