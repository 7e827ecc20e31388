//! Metric extraction
//!
//! Pulls named counters off node occurrences and flattens them into
//! records carrying enough context (fragment, instance, host, node) for
//! later grouping.

use serde::Serialize;

use crate::profile_analyzer::models::{MetricMatch, NodeRef, Profile};
use crate::utils::{AnalyzeError, AnalyzeResult};

/// One metric value together with where it was emitted
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricRecord<'a> {
    pub value: f64,
    pub unit: &'a str,
    pub fragment_id: i64,
    pub instance_id: i64,
    pub host: &'a str,
    pub node_id: i64,
    pub name: &'a str,
    #[serde(skip)]
    pub node: NodeRef<'a>,
}

impl<'a> From<MetricMatch<'a>> for MetricRecord<'a> {
    fn from(m: MetricMatch<'a>) -> Self {
        Self {
            value: m.value,
            unit: m.unit,
            fragment_id: m.node.fragment_id(),
            instance_id: m.node.fragment_instance_id(),
            host: m.node.host(),
            node_id: m.node.id(),
            name: m.node.name(),
            node: m.node,
        }
    }
}

/// Every metric named `metric_name` on this single node
pub fn find_metric_by_name<'a>(node: NodeRef<'a>, metric_name: &str) -> Vec<MetricMatch<'a>> {
    node.find_metric_by_name(metric_name)
}

/// Value of the first matching metric on the node, descendants excluded
pub fn query_fragment_metric_by_node(node: NodeRef<'_>, metric_name: &str) -> Option<f64> {
    node.metrics().iter().find(|m| m.name == metric_name).map(|m| m.value)
}

/// `metric_name` on every occurrence of `node_id`, restricted to either the
/// averaged instances or the real per-host ones
pub fn query_node_by_id<'a>(
    profile: &'a Profile,
    node_id: i64,
    metric_name: &str,
    averaged: bool,
) -> Vec<MetricRecord<'a>> {
    tracing::debug!("query_node_by_id: node={}, metric={}, averaged={}", node_id, metric_name, averaged);
    collect_records(
        profile.find_by_id(node_id).into_iter().filter(|n| n.is_averaged() == averaged),
        metric_name,
    )
}

/// `metric_name` on every per-host occurrence of nodes named `node_name`
///
/// Averaged instances are skipped: a name may cover several logical nodes,
/// and their averages are not comparable.
pub fn query_node_by_metric<'a>(
    profile: &'a Profile,
    node_name: &str,
    metric_name: &str,
) -> Vec<MetricRecord<'a>> {
    tracing::debug!("query_node_by_metric: name={}, metric={}", node_name, metric_name);
    collect_records(
        profile.find_all_by_name(node_name).into_iter().filter(|n| !n.is_averaged()),
        metric_name,
    )
}

/// Averaged value of `metric_name` for logical node `node_nid`
///
/// Looks at the node's single averaged occurrence first, then at the
/// counters of the averaged fragment instance that contains it.
pub fn query_avg_fragment_metric_by_node_nid(
    profile: &Profile,
    node_nid: i64,
    metric_name: &str,
) -> AnalyzeResult<f64> {
    let occurrences = profile.find_by_id(node_nid);
    if occurrences.is_empty() {
        return Err(AnalyzeError::node_not_found(node_nid));
    }

    let averaged: Vec<NodeRef<'_>> = occurrences.into_iter().filter(|n| n.is_averaged()).collect();
    let node = match averaged.as_slice() {
        [] => return Err(AnalyzeError::node_not_found(node_nid)),
        [node] => *node,
        many => {
            tracing::warn!("Node {} has {} averaged occurrences", node_nid, many.len());
            return Err(AnalyzeError::ambiguous(
                format!("averaged occurrence of node {}", node_nid),
                many.len(),
            ));
        },
    };

    if let Some(value) = query_fragment_metric_by_node(node, metric_name) {
        return Ok(value);
    }

    node.fragment_instance()
        .find_metric_by_name(node.fragment(), metric_name)
        .first()
        .map(|m| m.value)
        .ok_or_else(|| AnalyzeError::metric_not_found(metric_name, node_nid))
}

fn collect_records<'a>(
    nodes: impl Iterator<Item = NodeRef<'a>>,
    metric_name: &str,
) -> Vec<MetricRecord<'a>> {
    nodes
        .flat_map(|n| n.find_metric_by_name(metric_name))
        .map(MetricRecord::from)
        .collect()
}
