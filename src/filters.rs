//! Filter resolution.
//!
//! Reports are always scoped to a role and may be narrowed further by optional filters. Every
//! filter value is trimmed and lower-cased before use, and matched case-insensitively against the
//! observation store.

use crate::error::SalaryStatsError;
use crate::models::{FilterEcho, GroupField};

use std::collections::BTreeSet;

/// Optional filters as supplied by a caller, before normalisation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterParams {
    pub location: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub level: Option<String>,
    pub currency: Option<String>,
    pub work_model: Option<String>,
}

/// Normalised filters for a single role.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedFilters {
    pub role: String,
    pub location: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub level: Option<String>,
    pub currency: Option<String>,
    pub work_model: Option<String>,
}

impl ResolvedFilters {
    /// Returns true if the role is the only constraint, making the query eligible for the
    /// precomputed per-role aggregates.
    pub fn only_role(&self) -> bool {
        self.constraints().iter().all(|(_, value)| value.is_none())
    }

    /// Optional constraints paired with the field they apply to.
    pub fn constraints(&self) -> [(GroupField, Option<&str>); 6] {
        [
            (GroupField::Location, self.location.as_deref()),
            (GroupField::Country, self.country.as_deref()),
            (GroupField::State, self.state.as_deref()),
            (GroupField::Level, self.level.as_deref()),
            (GroupField::Currency, self.currency.as_deref()),
            (GroupField::WorkModel, self.work_model.as_deref()),
        ]
    }

    /// Echo of these filters, including the role.
    pub fn echo(&self) -> FilterEcho {
        FilterEcho {
            role: Some(self.role.clone()),
            ..self.shared_echo()
        }
    }

    /// Echo of the optional filters only, for reports spanning several roles.
    pub fn shared_echo(&self) -> FilterEcho {
        FilterEcho {
            role: None,
            location: self.location.clone(),
            country: self.country.clone(),
            state: self.state.clone(),
            level: self.level.clone(),
            currency: self.currency.clone(),
            work_model: self.work_model.clone(),
        }
    }
}

/// Trim and lower-case a filter value, mapping absent or blank values to `None`.
pub fn normalise(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_lowercase)
}

/// Resolve a role and optional filters.
///
/// Fails with [SalaryStatsError::InvalidArgument] if the role is absent or blank.
///
/// # Arguments
///
/// * `role`: Role to report on
/// * `params`: Optional filters
pub fn resolve(role: Option<&str>, params: &FilterParams) -> Result<ResolvedFilters, SalaryStatsError> {
    let role = normalise(role).ok_or_else(|| {
        SalaryStatsError::InvalidArgument("role query parameter is required".to_string())
    })?;
    Ok(ResolvedFilters {
        role,
        location: normalise(params.location.as_deref()),
        country: normalise(params.country.as_deref()),
        state: normalise(params.state.as_deref()),
        level: normalise(params.level.as_deref()),
        currency: normalise(params.currency.as_deref()),
        work_model: normalise(params.work_model.as_deref()),
    })
}

/// Normalise a list of roles: trim, lower-case, drop blanks, de-duplicate and sort.
///
/// Fails with [SalaryStatsError::InvalidArgument] if no roles remain.
pub fn normalise_roles<S: AsRef<str>>(roles: &[S]) -> Result<Vec<String>, SalaryStatsError> {
    let roles = roles
        .iter()
        .filter_map(|role| normalise(Some(role.as_ref())))
        .collect::<BTreeSet<_>>();
    if roles.is_empty() {
        return Err(SalaryStatsError::InvalidArgument(
            "at least one role is required".to_string(),
        ));
    }
    Ok(roles.into_iter().collect())
}
