use crate::cli::CommandLineArgs;
use crate::models::FilterOptions;
use crate::resource_manager::ResourceManager;

use cached::TimedCache;
use expanduser::expanduser;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Key of the single entry in the filter options cache.
pub const FILTER_OPTIONS_KEY: &str = "filter_options";

/// Shared application state passed to each request handler.
pub struct AppState {
    /// Command line arguments.
    pub args: CommandLineArgs,

    /// Resource manager.
    pub resource_manager: ResourceManager,

    /// Path to the SQLite database.
    pub database_path: PathBuf,

    /// Filter options, cached for `filter_cache_ttl` seconds.
    pub filter_cache: Mutex<TimedCache<&'static str, FilterOptions>>,
}

impl AppState {
    /// Create and return an [AppState].
    pub fn new(args: &CommandLineArgs) -> Self {
        let task_limit = args
            .thread_limit
            .or_else(|| Some(num_cpus::get().saturating_sub(1).max(1)));
        let resource_manager = ResourceManager::new(args.connection_limit, task_limit);

        Self {
            args: args.clone(),
            resource_manager,
            database_path: expand_path(&args.database_path),
            filter_cache: Mutex::new(TimedCache::with_lifespan(args.filter_cache_ttl)),
        }
    }
}

/// Expand a leading `~` in a path, leaving the path unchanged if expansion fails.
pub fn expand_path(path: &str) -> PathBuf {
    expanduser(path).unwrap_or_else(|_| PathBuf::from(path))
}

/// AppState wrapped in an Atomic Reference Count (Arc) to allow multiple references.
pub type SharedAppState = Arc<AppState>;
