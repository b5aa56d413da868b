use crate::error::SalaryStatsError;
use crate::store::SalaryStore;

use serde::Serialize;

/// Trait for salary reports.
///
/// This forms the contract between the API layer and the aggregation engine. Reports are
/// executed synchronously against a store owned by the calling task.
pub trait Report {
    /// Parameters of the report.
    type Request: Send + 'static;

    /// Result of the report, serialised as the response body.
    type Output: Serialize + Send + 'static;

    /// Execute the report.
    ///
    /// # Arguments
    ///
    /// * `store`: Store to read observations and aggregates from
    /// * `request`: Parameters of the report
    fn execute(
        store: &SalaryStore,
        request: &Self::Request,
    ) -> Result<Self::Output, SalaryStatsError>;
}
