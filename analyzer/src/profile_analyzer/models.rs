//! Profile data models
//!
//! These models represent an already materialized query execution profile:
//! fragments, their per-host instances, the plan node tree of each instance
//! and the counters attached to nodes. They are built once upstream and are
//! read-only to the analyzer.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::utils::{AnalyzeError, AnalyzeResult};

// ============================================================================
// Core Profile Structure
// ============================================================================

/// Complete execution profile of one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub query_id: String,
    /// Total query wall-clock time, in the same unit as node time counters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<f64>,
    pub fragments: Vec<Fragment>,
}

/// A fragment represents one logical stage of the distributed plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: i64,
    pub instances: Vec<FragmentInstance>,
}

/// One host's run of a fragment, or the synthetic averaged summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentInstance {
    pub id: i64,
    pub host: String,
    #[serde(default)]
    pub averaged: bool,
    /// Instance-level counters (not attached to any plan node)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<Metric>,
    pub root: Node,
}

/// A plan node occurrence inside one fragment instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Shared identity of "the same" plan node across fragment instances
    pub logical_id: i64,
    /// Unique per occurrence
    pub instance_id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<Metric>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

/// A named counter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
}

// ============================================================================
// Constructors
// ============================================================================

impl Metric {
    pub fn new(name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self { name: name.into(), value, unit: unit.into() }
    }
}

impl Node {
    pub fn new(logical_id: i64, instance_id: i64, name: impl Into<String>) -> Self {
        Self {
            logical_id,
            instance_id,
            name: name.into(),
            metrics: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        self.metrics.push(Metric::new(name, value, unit));
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }
}

impl FragmentInstance {
    pub fn new(id: i64, host: impl Into<String>, root: Node) -> Self {
        Self { id, host: host.into(), averaged: false, metrics: Vec::new(), root }
    }

    /// The synthetic cross-host summary instance of a fragment
    pub fn averaged(id: i64, root: Node) -> Self {
        Self { id, host: "averaged".to_string(), averaged: true, metrics: Vec::new(), root }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        self.metrics.push(Metric::new(name, value, unit));
        self
    }

    pub fn is_averaged(&self) -> bool {
        self.averaged
    }

    pub fn id(&self) -> i64 {
        self.id
    }
}

impl Fragment {
    pub fn new(id: i64, instances: Vec<FragmentInstance>) -> Self {
        Self { id, instances }
    }

    pub fn id(&self) -> i64 {
        self.id
    }
}

// ============================================================================
// Node view with back-references
// ============================================================================

/// Borrowed view of a node together with its owning fragment and instance
///
/// Nodes do not own or store links to their parents; the relation is
/// resolved during traversal and carried in this view instead.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    node: &'a Node,
    fragment: &'a Fragment,
    instance: &'a FragmentInstance,
    is_root: bool,
}

impl<'a> NodeRef<'a> {
    fn new(node: &'a Node, fragment: &'a Fragment, instance: &'a FragmentInstance, is_root: bool) -> Self {
        Self { node, fragment, instance, is_root }
    }

    pub fn node(&self) -> &'a Node {
        self.node
    }

    pub fn fragment(&self) -> &'a Fragment {
        self.fragment
    }

    pub fn fragment_instance(&self) -> &'a FragmentInstance {
        self.instance
    }

    /// Logical plan node id
    pub fn id(&self) -> i64 {
        self.node.logical_id
    }

    pub fn instance_id(&self) -> i64 {
        self.node.instance_id
    }

    pub fn name(&self) -> &'a str {
        &self.node.name
    }

    pub fn host(&self) -> &'a str {
        &self.instance.host
    }

    pub fn fragment_id(&self) -> i64 {
        self.fragment.id
    }

    pub fn fragment_instance_id(&self) -> i64 {
        self.instance.id
    }

    pub fn is_averaged(&self) -> bool {
        self.instance.averaged
    }

    /// True iff this node is the root of its fragment instance
    pub fn is_fragment(&self) -> bool {
        self.is_root
    }

    pub fn metrics(&self) -> &'a [Metric] {
        &self.node.metrics
    }

    pub fn children(self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let (fragment, instance) = (self.fragment, self.instance);
        self.node.children.iter().map(move |c| NodeRef::new(c, fragment, instance, false))
    }

    /// All metrics on this node with the given name, in insertion order
    pub fn find_metric_by_name(&self, metric_name: &str) -> Vec<MetricMatch<'a>> {
        self.node
            .metrics
            .iter()
            .filter(|m| m.name == metric_name)
            .map(|m| MetricMatch { value: m.value, unit: &m.unit, node: *self })
            .collect()
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id())
            .field("instance_id", &self.instance_id())
            .field("name", &self.name())
            .field("fragment_id", &self.fragment_id())
            .field("fragment_instance_id", &self.fragment_instance_id())
            .field("host", &self.host())
            .finish()
    }
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.node, other.node)
    }
}

/// A metric found on a node, with a link back to that node
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricMatch<'a> {
    pub value: f64,
    pub unit: &'a str,
    #[serde(skip)]
    pub node: NodeRef<'a>,
}

/// Pre-order walk over one instance tree
struct InstanceNodes<'a> {
    fragment: &'a Fragment,
    instance: &'a FragmentInstance,
    stack: Vec<(&'a Node, bool)>,
}

impl<'a> Iterator for InstanceNodes<'a> {
    type Item = NodeRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (node, is_root) = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev().map(|c| (c, false)));
        Some(NodeRef::new(node, self.fragment, self.instance, is_root))
    }
}

impl FragmentInstance {
    fn walk<'a>(&'a self, fragment: &'a Fragment) -> InstanceNodes<'a> {
        InstanceNodes { fragment, instance: self, stack: vec![(&self.root, true)] }
    }

    /// Every value of `metric_name` emitted by this instance: instance-level
    /// counters first, then the node tree in pre-order
    pub fn find_metric_by_name<'a>(&'a self, fragment: &'a Fragment, metric_name: &str) -> Vec<MetricMatch<'a>> {
        let root = NodeRef::new(&self.root, fragment, self, true);
        let own = self
            .metrics
            .iter()
            .filter(|m| m.name == metric_name)
            .map(move |m| MetricMatch { value: m.value, unit: &m.unit, node: root });
        own.chain(self.walk(fragment).flat_map(|n| n.find_metric_by_name(metric_name)))
            .collect()
    }
}

// ============================================================================
// Profile lookups
// ============================================================================

impl Profile {
    pub fn new(query_id: impl Into<String>, fragments: Vec<Fragment>) -> Self {
        Self { query_id: query_id.into(), total_time: None, fragments }
    }

    pub fn with_total_time(mut self, total_time: f64) -> Self {
        self.total_time = Some(total_time);
        self
    }

    pub fn find_all_fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// All fragment instances paired with their fragment, in profile order
    pub fn find_all_instances(&self) -> impl Iterator<Item = (&Fragment, &FragmentInstance)> {
        self.fragments.iter().flat_map(|f| f.instances.iter().map(move |i| (f, i)))
    }

    /// Every node occurrence: fragment order, then instance order, then pre-order
    pub fn nodes(&self) -> impl Iterator<Item = NodeRef<'_>> {
        self.find_all_instances().flat_map(|(f, i)| i.walk(f))
    }

    pub fn find_by_id(&self, logical_id: i64) -> Vec<NodeRef<'_>> {
        self.nodes().filter(|n| n.id() == logical_id).collect()
    }

    pub fn find_all_by_name(&self, name: &str) -> Vec<NodeRef<'_>> {
        self.nodes().filter(|n| n.name() == name).collect()
    }

    /// Check the invariants queries rely on
    ///
    /// - each fragment has exactly one averaged instance
    /// - instance ids are unique within a fragment
    /// - real instances of one fragment run on distinct hosts
    /// - a logical id occurs at most once per instance tree
    pub fn validate(&self) -> AnalyzeResult<()> {
        for fragment in &self.fragments {
            let averaged = fragment.instances.iter().filter(|i| i.averaged).count();
            if averaged != 1 {
                return Err(AnalyzeError::invalid_profile(format!(
                    "fragment {} has {} averaged instances, expected 1",
                    fragment.id, averaged
                )));
            }

            let mut instance_ids = HashSet::new();
            if let Some(dup) = fragment.instances.iter().find(|i| !instance_ids.insert(i.id)) {
                return Err(AnalyzeError::invalid_profile(format!(
                    "fragment {} has more than one instance with id {}",
                    fragment.id, dup.id
                )));
            }

            let mut hosts = HashSet::new();
            for instance in fragment.instances.iter().filter(|i| !i.averaged) {
                if !hosts.insert(instance.host.as_str()) {
                    return Err(AnalyzeError::invalid_profile(format!(
                        "fragment {} has more than one instance on host {}",
                        fragment.id, instance.host
                    )));
                }
            }

            for instance in &fragment.instances {
                let mut seen = HashSet::new();
                if let Some(dup) = instance.walk(fragment).find(|n| !seen.insert(n.id())) {
                    return Err(AnalyzeError::invalid_profile(format!(
                        "node {} occurs more than once in fragment {} instance {}",
                        dup.id(),
                        fragment.id,
                        instance.id
                    )));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Constants
// ============================================================================

pub mod constants {
    /// Time share thresholds for contributor classification, in percent
    pub mod time_thresholds {
        /// Threshold for "most consuming" node (> 30%)
        pub const MOST_CONSUMING_THRESHOLD: f64 = 30.0;
        /// Threshold for "second most consuming" node (> 15%)
        pub const SECOND_CONSUMING_THRESHOLD: f64 = 15.0;
    }

    /// Counter holding a node's wall-clock time
    pub const DEFAULT_TIME_METRIC: &str = "TotalTime";
}
