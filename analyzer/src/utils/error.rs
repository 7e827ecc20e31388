use thiserror::Error;

/// Analysis error with the context needed to locate the offending data
///
/// Empty search results are never errors. These variants are reserved for
/// queries whose callers assume existence or uniqueness.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzeError {
    // Lookup errors
    #[error("Node {node_id} not found")]
    NodeNotFound { node_id: i64 },

    #[error("Node {node_id} not found in fragment {fragment_id}, instance {instance_id}")]
    NodeInstanceNotFound { fragment_id: i64, instance_id: i64, node_id: i64 },

    #[error("Metric {metric} not found for node {node_id}")]
    MetricNotFound { metric: String, node_id: i64 },

    // Data integrity errors
    #[error("Ambiguous result: {count} matches for {what}")]
    AmbiguousResult { what: String, count: usize },

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    // Aggregation errors
    #[error("No values to aggregate for metric {metric}{}", host_suffix(.host))]
    EmptyAggregation { metric: String, host: Option<String> },
}

impl AnalyzeError {
    /// Helper to create node not found error
    pub fn node_not_found(node_id: i64) -> Self {
        Self::NodeNotFound { node_id }
    }

    /// Helper to create metric not found error
    pub fn metric_not_found(metric: impl Into<String>, node_id: i64) -> Self {
        Self::MetricNotFound { metric: metric.into(), node_id }
    }

    /// Helper to create ambiguous result error
    pub fn ambiguous(what: impl Into<String>, count: usize) -> Self {
        Self::AmbiguousResult { what: what.into(), count }
    }

    /// Helper to create invalid profile error
    pub fn invalid_profile(message: impl Into<String>) -> Self {
        Self::InvalidProfile(message.into())
    }

    /// Helper to create empty aggregation error
    pub fn empty_aggregation(metric: impl Into<String>, host: Option<&str>) -> Self {
        Self::EmptyAggregation { metric: metric.into(), host: host.map(str::to_string) }
    }

    /// Whether the error means "data is missing" rather than "data is broken"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NodeNotFound { .. } | Self::NodeInstanceNotFound { .. } | Self::MetricNotFound { .. }
        )
    }
}

fn host_suffix(host: &Option<String>) -> String {
    host.as_deref().map(|h| format!(" on host {}", h)).unwrap_or_default()
}

/// Result type alias for analysis operations
pub type AnalyzeResult<T> = Result<T, AnalyzeError>;
