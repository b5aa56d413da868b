//! Salary reports.
//!
//! Each report is implemented as a struct that implements the [Report](crate::report::Report)
//! trait, backed by a free function that may also be called directly.

use crate::breakdown::{currency_breakdown, group_breakdown, top_groups, TOP_N};
use crate::error::SalaryStatsError;
use crate::filters::{self, FilterParams, ResolvedFilters};
use crate::metrics::AGGREGATE_CACHE_LOOKUPS;
use crate::models::{
    Comparison, ComparisonQuery, FilterOptions, GroupField, Insights, SalaryObservation,
    SalaryQuery, SalaryRoleAggregate, Summary,
};
use crate::report::Report;
use crate::statistics::quartiles;
use crate::store::SalaryStore;

use rust_decimal::Decimal;
use tracing::{event, Level};

/// Parameters of a single-role report.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReportRequest {
    pub role: Option<String>,
    pub filters: FilterParams,
    /// Whether a precomputed aggregate may be returned for an only-role query
    pub use_cache: bool,
}

impl From<SalaryQuery> for ReportRequest {
    fn from(query: SalaryQuery) -> Self {
        Self {
            filters: query.filter_params(),
            use_cache: !query.raw.unwrap_or(false),
            role: query.role,
        }
    }
}

/// Parameters of a role comparison.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComparisonRequest {
    pub roles: Vec<String>,
    pub filters: FilterParams,
    pub use_cache: bool,
}

impl From<ComparisonQuery> for ComparisonRequest {
    fn from(query: ComparisonQuery) -> Self {
        Self {
            filters: query.filter_params(),
            use_cache: !query.raw.unwrap_or(false),
            roles: query.roles,
        }
    }
}

/// Summary statistics for a role.
pub struct SummaryReport {}

impl Report for SummaryReport {
    type Request = ReportRequest;
    type Output = Summary;

    fn execute(store: &SalaryStore, request: &ReportRequest) -> Result<Summary, SalaryStatsError> {
        summarize(
            store,
            request.role.as_deref(),
            &request.filters,
            request.use_cache,
        )
    }
}

/// Percentiles and top-N rankings for a role.
pub struct InsightsReport {}

impl Report for InsightsReport {
    type Request = ReportRequest;
    type Output = Insights;

    fn execute(store: &SalaryStore, request: &ReportRequest) -> Result<Insights, SalaryStatsError> {
        insights(
            store,
            request.role.as_deref(),
            &request.filters,
            request.use_cache,
        )
    }
}

/// Side-by-side summaries of several roles.
pub struct ComparisonReport {}

impl Report for ComparisonReport {
    type Request = ComparisonRequest;
    type Output = Comparison;

    fn execute(
        store: &SalaryStore,
        request: &ComparisonRequest,
    ) -> Result<Comparison, SalaryStatsError> {
        compare(store, &request.roles, &request.filters, request.use_cache)
    }
}

/// Look up the precomputed aggregate for an only-role query.
///
/// Returns `None` if the query has other filters, caching is disabled, or no aggregate exists.
fn cached_aggregate(
    store: &SalaryStore,
    filters: &ResolvedFilters,
    use_cache: bool,
) -> Result<Option<SalaryRoleAggregate>, SalaryStatsError> {
    if !use_cache || !filters.only_role() {
        return Ok(None);
    }
    let aggregate = store.aggregate(&filters.role)?;
    let result = if aggregate.is_some() { "hit" } else { "miss" };
    AGGREGATE_CACHE_LOOKUPS.with_label_values(&[result]).inc();
    Ok(aggregate)
}

/// Compute summary statistics for a role.
///
/// An only-role query with `use_cache` set returns the stored summary of the role's aggregate
/// verbatim when one exists, however stale. Otherwise statistics are computed from the matching
/// observations.
///
/// # Arguments
///
/// * `store`: Store to read from
/// * `role`: Role to report on. Required
/// * `params`: Optional filters
/// * `use_cache`: Whether a precomputed aggregate may be used
#[tracing::instrument(level = "DEBUG", skip(store))]
pub fn summarize(
    store: &SalaryStore,
    role: Option<&str>,
    params: &FilterParams,
    use_cache: bool,
) -> Result<Summary, SalaryStatsError> {
    let filters = filters::resolve(role, params)?;
    if let Some(summary) = cached_aggregate(store, &filters, use_cache)?.and_then(|a| a.summary) {
        return Ok(summary);
    }
    let observations = store.observations(&filters)?;
    Ok(build_summary(&filters, &observations))
}

/// Compute summary statistics over a set of observations already matched by `filters`.
pub fn build_summary(filters: &ResolvedFilters, observations: &[SalaryObservation]) -> Summary {
    let refs = observations.iter().collect::<Vec<_>>();
    Summary {
        role: filters.role.clone(),
        filters: filters.echo(),
        total_observations: observations.len() as u64,
        currencies: currency_breakdown(&refs),
        levels: group_breakdown(&refs, GroupField::Level),
        states: group_breakdown(&refs, GroupField::State),
        work_models: group_breakdown(&refs, GroupField::WorkModel),
    }
}

/// Compute total compensation percentiles and top-N rankings for a role.
///
/// Uses the precomputed aggregate under the same conditions as [summarize].
#[tracing::instrument(level = "DEBUG", skip(store))]
pub fn insights(
    store: &SalaryStore,
    role: Option<&str>,
    params: &FilterParams,
    use_cache: bool,
) -> Result<Insights, SalaryStatsError> {
    let filters = filters::resolve(role, params)?;
    if let Some(insights) = cached_aggregate(store, &filters, use_cache)?.and_then(|a| a.insights)
    {
        return Ok(insights);
    }
    let observations = store.observations(&filters)?;
    Ok(build_insights(&filters, &observations))
}

/// Compute insights over a set of observations already matched by `filters`.
pub fn build_insights(filters: &ResolvedFilters, observations: &[SalaryObservation]) -> Insights {
    let refs = observations.iter().collect::<Vec<_>>();
    let mut total_compensation = observations
        .iter()
        .filter_map(|o| o.total_compensation)
        .collect::<Vec<Decimal>>();
    Insights {
        role: filters.role.clone(),
        filters: filters.echo(),
        total_observations: observations.len() as u64,
        percentiles: quartiles(&mut total_compensation),
        top_states: top_groups(&refs, GroupField::State, TOP_N),
        top_locations: top_groups(&refs, GroupField::Location, TOP_N),
        top_work_models: top_groups(&refs, GroupField::WorkModel, TOP_N),
        top_sources: top_groups(&refs, GroupField::Source, TOP_N),
    }
}

/// Summarise several roles under the same filters.
///
/// Roles are normalised, de-duplicated and sorted, and each is summarised independently.
/// Fails with [SalaryStatsError::InvalidArgument] if no non-blank role is given.
#[tracing::instrument(level = "DEBUG", skip(store, roles))]
pub fn compare<S: AsRef<str>>(
    store: &SalaryStore,
    roles: &[S],
    params: &FilterParams,
    use_cache: bool,
) -> Result<Comparison, SalaryStatsError> {
    let roles = filters::normalise_roles(roles)?;
    // Roles are non-empty, so resolution cannot fail here.
    let filters = filters::resolve(roles.first().map(String::as_str), params)?.shared_echo();
    let summaries = roles
        .iter()
        .map(|role| summarize(store, Some(role), params, use_cache))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Comparison {
        roles,
        filters,
        summaries,
    })
}

/// Recompute and store the aggregate for a role from live observations.
#[tracing::instrument(level = "DEBUG", skip(store))]
pub fn rebuild(store: &SalaryStore, role: &str) -> Result<SalaryRoleAggregate, SalaryStatsError> {
    let filters = filters::resolve(Some(role), &FilterParams::default())?;
    let observations = store.observations(&filters)?;
    let summary = build_summary(&filters, &observations);
    let insights = build_insights(&filters, &observations);
    store.upsert_aggregate(&filters.role, &summary, &insights)
}

/// Rebuild the aggregate of every distinct role in the store.
///
/// Returns the number of roles rebuilt.
#[tracing::instrument(level = "DEBUG", skip(store))]
pub fn rebuild_all(store: &SalaryStore) -> Result<usize, SalaryStatsError> {
    let roles = store.distinct_roles()?;
    for role in &roles {
        rebuild(store, role)?;
    }
    event!(Level::INFO, "rebuilt aggregates for {} roles", roles.len());
    Ok(roles.len())
}

/// List the values available for each filter.
///
/// Roles are those with a precomputed aggregate.
pub fn filter_options(store: &SalaryStore) -> Result<FilterOptions, SalaryStatsError> {
    Ok(FilterOptions {
        roles: store.aggregate_roles()?,
        states: store.distinct_values(GroupField::State)?,
        levels: store.distinct_values(GroupField::Level)?,
        work_models: store.distinct_values(GroupField::WorkModel)?,
    })
}
