//! Salary statistics server API

use crate::app_state::{expand_path, AppState, SharedAppState, FILTER_OPTIONS_KEY};
use crate::cli::CommandLineArgs;
use crate::dataset;
use crate::error::SalaryStatsError;
use crate::metrics::{metrics_handler, record_response_metrics, request_counter};
use crate::models::{Comparison, ComparisonQuery, FilterOptions, SalaryQuery};
use crate::report::Report;
use crate::reports::{
    self, ComparisonReport, ComparisonRequest, InsightsReport, ReportRequest, SummaryReport,
};
use crate::store::SalaryStore;
use crate::validated_query::ValidatedQuery;

use axum::{
    extract::{RawQuery, State},
    routing::get,
    Json, Router,
};
use cached::{Cached, TimedCache};
use std::sync::{Arc, MutexGuard};
use tower::Layer;
use tower::ServiceBuilder;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::trace::TraceLayer;
use tracing::{event, Level};
use validator::Validate;

/// Application service type.
pub type Service = NormalizePath<Router>;

/// Prepare the database for serving.
///
/// Creates and migrates the database, loads the dataset if enabled and the database has no
/// observations, and rebuilds every aggregate if requested. A failed dataset load is logged and
/// does not prevent the server from starting.
///
/// # Arguments
///
/// * `args`: Command line arguments
pub fn init(args: &CommandLineArgs) -> Result<(), SalaryStatsError> {
    let mut store = SalaryStore::create(&expand_path(&args.database_path))?;
    if args.autoload_dataset {
        let dataset_path = expand_path(&args.dataset_path);
        if let Err(err) = dataset::ensure_dataset_loaded(&mut store, &dataset_path) {
            event!(Level::WARN, "automatic salary dataset load failed: {}", err);
        }
    }
    if args.rebuild_on_start {
        reports::rebuild_all(&store)?;
    }
    Ok(())
}

/// Returns a [crate::app::Service] for the salary statistics server API.
///
/// The service is populated with all routes as well as the following middleware:
///
/// * a [tower_http::trace::TraceLayer] for tracing requests and responses, with hooks that
///   record Prometheus metrics
/// * a [tower_http::normalize_path::NormalizePathLayer] for trimming trailing slashes from
///   requests
///
/// # Arguments
///
/// * `args`: Command line arguments
pub fn service(args: &CommandLineArgs) -> Service {
    let state: SharedAppState = Arc::new(AppState::new(args));
    let router = router(state);

    // Note that any middleware that should affect routing must wrap the router.
    // See https://docs.rs/axum/0.6.12/axum/middleware/index.html#rewriting-request-uri-in-middleware
    let normalize_path_layer = NormalizePathLayer::trim_trailing_slash();
    normalize_path_layer.layer(router)
}

/// Returns a [axum::Router] with all routes.
fn router(state: SharedAppState) -> Router {
    fn api() -> Router<SharedAppState> {
        Router::new()
            .route("/salaries", get(report_handler::<SummaryReport>))
            .route("/salaries/insights", get(report_handler::<InsightsReport>))
            .route("/salaries/comparison", get(comparison_handler))
            .route("/filters", get(filters_handler))
    }

    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_handler))
        .nest("/api", api())
        .layer(
            ServiceBuilder::new().layer(
                TraceLayer::new_for_http()
                    .on_request(request_counter)
                    .on_response(record_response_metrics),
            ),
        )
        .with_state(state)
}

/// Liveness check.
async fn health() -> &'static str {
    "OK"
}

/// Run a function against a freshly opened store on a blocking thread.
///
/// A task permit and a database connection permit are held until the function returns. The
/// function runs on the Rayon thread pool if enabled, otherwise on Tokio's blocking pool.
///
/// # Arguments
///
/// * `state`: Shared application state
/// * `f`: Function to run
async fn run_blocking<F, R>(state: &SharedAppState, f: F) -> Result<R, SalaryStatsError>
where
    F: FnOnce(&SalaryStore) -> Result<R, SalaryStatsError> + Send + 'static,
    R: Send + 'static,
{
    let _task_permit = state.resource_manager.task().await?;
    let _connection_permit = state.resource_manager.db_connection().await?;
    let database_path = state.database_path.clone();
    let job = move || SalaryStore::open(&database_path).and_then(|store| f(&store));
    if state.args.use_rayon {
        tokio_rayon::spawn(job).await
    } else {
        tokio::task::spawn_blocking(job).await?
    }
}

/// Execute a [crate::report::Report].
async fn run_report<T: Report + 'static>(
    state: &SharedAppState,
    request: T::Request,
) -> Result<T::Output, SalaryStatsError> {
    run_blocking(state, move |store| T::execute(store, &request)).await
}

/// Handler for single-role reports.
///
/// # Arguments
///
/// * `state`: Shared application state
/// * `query`: Validated report query
#[tracing::instrument(level = "DEBUG", skip(state))]
async fn report_handler<T>(
    State(state): State<SharedAppState>,
    ValidatedQuery(query): ValidatedQuery<SalaryQuery>,
) -> Result<Json<T::Output>, SalaryStatsError>
where
    T: Report<Request = ReportRequest> + 'static,
{
    run_report::<T>(&state, ReportRequest::from(query))
        .await
        .map(Json)
}

/// Handler for role comparisons.
///
/// The query string is parsed by hand since roles may be given as repeated parameters.
#[tracing::instrument(level = "DEBUG", skip(state))]
async fn comparison_handler(
    State(state): State<SharedAppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<Comparison>, SalaryStatsError> {
    let query = ComparisonQuery::parse(query.as_deref().unwrap_or_default());
    query.validate()?;
    run_report::<ComparisonReport>(&state, ComparisonRequest::from(query))
        .await
        .map(Json)
}

/// Handler for filter options, served from a TTL cache.
async fn filters_handler(
    State(state): State<SharedAppState>,
) -> Result<Json<FilterOptions>, SalaryStatsError> {
    let cached = lock_filter_cache(&state).cache_get(&FILTER_OPTIONS_KEY).cloned();
    if let Some(options) = cached {
        return Ok(Json(options));
    }
    let options = run_blocking(&state, reports::filter_options).await?;
    lock_filter_cache(&state).cache_set(FILTER_OPTIONS_KEY, options.clone());
    Ok(Json(options))
}

/// Lock the filter option cache, recovering it if a previous holder panicked.
fn lock_filter_cache(state: &AppState) -> MutexGuard<'_, TimedCache<&'static str, FilterOptions>> {
    state.filter_cache.lock().unwrap_or_else(|err| {
        event!(Level::WARN, "filter option cache lock poisoned, recovering");
        state.filter_cache.clear_poison();
        err.into_inner()
    })
}
