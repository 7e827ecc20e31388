//! Profile query engine
//!
//! Stateless search, extraction and aggregation primitives over a built
//! [`Profile`](super::models::Profile), plus contributor synthesis on top.

pub mod aggregation;
pub mod contributor;
pub mod metrics;
pub mod search;

pub use aggregation::{DEFAULT_REDUCERS, HostMetricRow, Reducer, host_by_metric};
pub use contributor::{
    Contributor, ContributorAnalyzer, ContributorConfig, ContributorType, Reason, ReasonPolicy,
    TimeShareReasonPolicy,
};
pub use metrics::{
    MetricRecord, find_metric_by_name, query_avg_fragment_metric_by_node_nid, query_fragment_metric_by_node,
    query_node_by_id, query_node_by_metric,
};
pub use search::{find_all_by_name, find_by_id, find_unique_by_id};
