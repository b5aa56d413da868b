//! Command Line Interface (CLI) arguments.

use clap::Parser;

/// Salary statistics server command line interface
#[derive(Clone, Debug, Parser)]
pub struct CommandLineArgs {
    /// The IP address on which the server should listen
    #[arg(long, default_value = "0.0.0.0", env = "SALARY_STATS_HOST")]
    pub host: String,
    /// The port to which the server should bind
    #[arg(long, default_value_t = 8080, env = "SALARY_STATS_PORT")]
    pub port: u16,
    /// Flag indicating whether HTTPS should be used
    #[arg(long, default_value_t = false, env = "SALARY_STATS_HTTPS")]
    pub https: bool,
    /// Path to the certificate file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/salary-stats/certs/cert.pem",
        env = "SALARY_STATS_CERT_FILE"
    )]
    pub cert_file: String,
    /// Path to the key file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/salary-stats/certs/key.pem",
        env = "SALARY_STATS_KEY_FILE"
    )]
    pub key_file: String,
    /// Maximum time in seconds to wait for requests to complete upon receiving `ctrl+c` signal.
    #[arg(long, default_value_t = 60, env = "SALARY_STATS_SHUTDOWN_TIMEOUT")]
    pub graceful_shutdown_timeout: u64,
    /// Whether to enable sending traces to Jaeger.
    #[arg(long, default_value_t = false, env = "SALARY_STATS_ENABLE_JAEGER")]
    pub enable_jaeger: bool,
    /// Whether to use Rayon for execution of report tasks.
    #[arg(long, default_value_t = false, env = "SALARY_STATS_USE_RAYON")]
    pub use_rayon: bool,
    /// Maximum number of concurrent report tasks. Defaults to the number of CPUs minus one.
    #[arg(long, env = "SALARY_STATS_THREAD_LIMIT")]
    pub thread_limit: Option<usize>,
    /// Maximum number of concurrently open database connections.
    #[arg(long, env = "SALARY_STATS_CONNECTION_LIMIT")]
    pub connection_limit: Option<usize>,
    /// Path to the SQLite database holding observations and aggregates
    #[arg(long, default_value = "salaries.sqlite3", env = "SALARY_STATS_DATABASE_PATH")]
    pub database_path: String,
    /// Load the dataset into the database at startup if the database has no observations
    #[arg(long, default_value_t = false, env = "SALARY_STATS_AUTOLOAD_DATASET")]
    pub autoload_dataset: bool,
    /// Path to the normalised CSV dataset
    #[arg(
        long,
        default_value = "data/salaries.csv",
        env = "SALARY_STATS_DATASET_PATH"
    )]
    pub dataset_path: String,
    /// Time in seconds for which filter options are cached
    #[arg(long, default_value_t = 300, env = "SALARY_STATS_FILTER_CACHE_TTL")]
    pub filter_cache_ttl: u64,
    /// Rebuild every role aggregate at startup, before serving requests
    #[arg(long, default_value_t = false, env = "SALARY_STATS_REBUILD_ON_START")]
    pub rebuild_on_start: bool,
    /// Rebuild every role aggregate and exit without serving requests
    #[arg(long, default_value_t = false)]
    pub rebuild_aggregates: bool,
    /// Interval in seconds between background rebuilds of every role aggregate.
    /// Background rebuilds are disabled if unset.
    #[arg(long, env = "SALARY_STATS_AGGREGATE_REFRESH_INTERVAL")]
    pub aggregate_refresh_interval: Option<u64>,
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CommandLineArgs::try_parse_from(["salary-stats"]).unwrap();
        assert_eq!("0.0.0.0", args.host);
        assert_eq!(8080, args.port);
        assert!(!args.https);
        assert_eq!(300, args.filter_cache_ttl);
        assert_eq!(None, args.thread_limit);
        assert_eq!(None, args.aggregate_refresh_interval);
        assert!(!args.rebuild_aggregates);
    }

    #[test]
    fn overrides() {
        let args = CommandLineArgs::try_parse_from([
            "salary-stats",
            "--port",
            "9000",
            "--database-path",
            "/tmp/test.sqlite3",
            "--autoload-dataset",
            "--thread-limit",
            "2",
            "--aggregate-refresh-interval",
            "3600",
        ])
        .unwrap();
        assert_eq!(9000, args.port);
        assert_eq!("/tmp/test.sqlite3", args.database_path);
        assert!(args.autoload_dataset);
        assert_eq!(Some(2), args.thread_limit);
        assert_eq!(Some(3600), args.aggregate_refresh_interval);
    }
}
