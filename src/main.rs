//! This file defines the salary-stats binary entry point.

use salary_stats::app;
use salary_stats::app_state::expand_path;
use salary_stats::cli;
use salary_stats::metrics;
use salary_stats::refresh;
use salary_stats::server;
use salary_stats::tracing;

use ::tracing::{event, Level};
use std::process::exit;
use std::time::Duration;

/// Application entry point
#[tokio::main]
async fn main() {
    let args = cli::parse();
    tracing::init_tracing(&args);
    metrics::register_metrics();
    if let Err(err) = app::init(&args) {
        event!(Level::ERROR, "initialisation failed: {}", err);
        tracing::shutdown_tracing();
        exit(1);
    }
    if args.rebuild_aggregates {
        let code = match refresh::rebuild_database(&expand_path(&args.database_path)) {
            Ok(count) => {
                event!(Level::INFO, "rebuilt {} role aggregates", count);
                0
            }
            Err(err) => {
                event!(Level::ERROR, "aggregate rebuild failed: {}", err);
                1
            }
        };
        tracing::shutdown_tracing();
        exit(code);
    }
    let refresher = args.aggregate_refresh_interval.map(|secs| {
        refresh::spawn_refresher(
            expand_path(&args.database_path),
            Duration::from_secs(secs.max(1)),
        )
    });
    let service = app::service(&args);
    server::serve(&args, service).await;
    if let Some(refresher) = refresher {
        refresher.abort();
    }
    tracing::shutdown_tracing();
}
