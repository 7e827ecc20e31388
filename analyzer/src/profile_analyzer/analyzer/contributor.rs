//! Contributor synthesis
//!
//! Ranks plan nodes by their share of query wall-clock time and attaches a
//! Reason to each significant one. The scoring is a replaceable
//! [`ReasonPolicy`]; [`TimeShareReasonPolicy`] is the default.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::aggregation::Reducer;
use super::metrics::{query_fragment_metric_by_node, query_node_by_id};
use crate::profile_analyzer::models::constants::{DEFAULT_TIME_METRIC, time_thresholds};
use crate::profile_analyzer::models::{NodeRef, Profile};
use crate::utils::AnalyzeResult;

// ============================================================================
// Diagnostic Model
// ============================================================================

/// What kind of plan element a contributor describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributorType {
    /// A plan operator inside a fragment
    Operator,
    /// A fragment instance root
    Fragment,
}

/// A plan node's share of total execution cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Contributor {
    pub id: String,
    pub query_id: String,
    #[serde(rename = "type")]
    pub contributor_type: ContributorType,
    pub wall_clock_time: f64,
    pub plan_node_id: i64,
    pub plan_node_name: String,
    #[serde(default)]
    pub reason: Option<Reason>,
}

/// Human-readable explanation with a normalized impact (higher is worse)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Reason {
    pub message: String,
    pub impact: f64,
}

impl Contributor {
    /// Stable key-sorted JSON object
    pub fn to_json(&self) -> serde_json::Result<String> {
        to_sorted_json(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl Reason {
    pub fn new(message: impl Into<String>, impact: f64) -> Self {
        Self { message: message.into(), impact }
    }

    /// Stable key-sorted JSON object
    pub fn to_json(&self) -> serde_json::Result<String> {
        to_sorted_json(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// serde_json's default map is ordered by key, so going through Value sorts
fn to_sorted_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string(&serde_json::to_value(value)?)
}

// ============================================================================
// Reason Policy
// ============================================================================

/// Strategy deciding whether a node deserves a Reason and how severe it is
pub trait ReasonPolicy {
    fn reason(&self, node: NodeRef<'_>, wall_clock_time: f64, query_total_time: f64) -> Option<Reason>;
}

impl<F> ReasonPolicy for F
where
    F: Fn(NodeRef<'_>, f64, f64) -> Option<Reason>,
{
    fn reason(&self, node: NodeRef<'_>, wall_clock_time: f64, query_total_time: f64) -> Option<Reason> {
        self(node, wall_clock_time, query_total_time)
    }
}

/// Impact is the node's fraction of query time, clamped to `[0, 1]`
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeShareReasonPolicy;

impl ReasonPolicy for TimeShareReasonPolicy {
    fn reason(&self, node: NodeRef<'_>, wall_clock_time: f64, query_total_time: f64) -> Option<Reason> {
        if query_total_time <= 0.0 || wall_clock_time <= 0.0 {
            return None;
        }
        let impact = (wall_clock_time / query_total_time).clamp(0.0, 1.0);
        let percentage = impact * 100.0;

        let label = if percentage > time_thresholds::MOST_CONSUMING_THRESHOLD {
            " (most time-consuming)"
        } else if percentage > time_thresholds::SECOND_CONSUMING_THRESHOLD {
            " (time-consuming)"
        } else {
            ""
        };

        Some(Reason::new(
            format!(
                "{} (plan_node_id={}) accounts for {:.1}% of query wall-clock time{}",
                node.name(),
                node.id(),
                percentage,
                label
            ),
            impact,
        ))
    }
}

// ============================================================================
// Contributor Analyzer
// ============================================================================

/// Contributor analyzer configuration
#[derive(Debug, Clone)]
pub struct ContributorConfig {
    /// Counter holding each node's wall-clock time
    pub time_metric: String,
    /// Read the averaged instance; otherwise reduce per-host values
    pub use_averaged: bool,
    /// Reducer over per-host values when `use_averaged` is off
    pub reducer: Reducer,
    /// Maximum number of contributors to return
    pub max_contributors: usize,
    /// Contributors below this impact are dropped
    pub min_impact: f64,
}

impl Default for ContributorConfig {
    fn default() -> Self {
        Self {
            time_metric: DEFAULT_TIME_METRIC.to_string(),
            use_averaged: true,
            reducer: Reducer::Max,
            max_contributors: 10,
            min_impact: 0.0,
        }
    }
}

/// Ranks plan nodes by wall-clock time
pub struct ContributorAnalyzer<P = TimeShareReasonPolicy> {
    config: ContributorConfig,
    policy: P,
}

impl ContributorAnalyzer<TimeShareReasonPolicy> {
    pub fn new() -> Self {
        Self::with_config(ContributorConfig::default())
    }

    pub fn with_config(config: ContributorConfig) -> Self {
        Self { config, policy: TimeShareReasonPolicy }
    }
}

impl Default for ContributorAnalyzer<TimeShareReasonPolicy> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ReasonPolicy> ContributorAnalyzer<P> {
    /// Swap the scoring strategy
    pub fn with_policy<Q: ReasonPolicy>(self, policy: Q) -> ContributorAnalyzer<Q> {
        ContributorAnalyzer { config: self.config, policy }
    }

    pub fn config(&self) -> &ContributorConfig {
        &self.config
    }

    /// Contributors of `profile`, highest wall-clock time first
    ///
    /// The query total is `Profile::total_time` when known, otherwise the sum
    /// over all candidate nodes.
    pub fn analyze(&self, profile: &Profile) -> AnalyzeResult<Vec<Contributor>> {
        let candidates = self.collect_candidates(profile)?;

        let query_total_time = profile
            .total_time
            .unwrap_or_else(|| candidates.iter().map(|(_, t)| t).sum());

        let mut contributors: Vec<Contributor> = candidates
            .into_iter()
            .filter_map(|(node, wall_clock_time)| {
                let reason = self
                    .policy
                    .reason(node, wall_clock_time, query_total_time)
                    .filter(|r| {
                        let finite = r.impact.is_finite();
                        if !finite {
                            tracing::warn!(
                                "Dropping reason for node {}: impact {} is not finite",
                                node.id(),
                                r.impact
                            );
                        }
                        finite
                    });
                let impact = reason.as_ref().map(|r| r.impact).unwrap_or(0.0);
                if impact < self.config.min_impact {
                    return None;
                }
                Some(Contributor {
                    id: format!("{}:{}", profile.query_id, node.id()),
                    query_id: profile.query_id.clone(),
                    contributor_type: if node.is_fragment() {
                        ContributorType::Fragment
                    } else {
                        ContributorType::Operator
                    },
                    wall_clock_time,
                    plan_node_id: node.id(),
                    plan_node_name: node.name().to_string(),
                    reason,
                })
            })
            .collect();

        contributors.sort_by(|a, b| {
            b.wall_clock_time
                .total_cmp(&a.wall_clock_time)
                .then(a.plan_node_id.cmp(&b.plan_node_id))
        });
        contributors.truncate(self.config.max_contributors);

        tracing::debug!(
            "Query {}: {} contributors (total time {})",
            profile.query_id,
            contributors.len(),
            query_total_time
        );

        Ok(contributors)
    }

    /// One (representative node, wall-clock time) per logical id, first-seen order
    fn collect_candidates<'a>(&self, profile: &'a Profile) -> AnalyzeResult<Vec<(NodeRef<'a>, f64)>> {
        let metric = self.config.time_metric.as_str();
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for node in profile.nodes() {
            if node.is_averaged() != self.config.use_averaged || !seen.insert(node.id()) {
                continue;
            }

            let time = if self.config.use_averaged {
                query_fragment_metric_by_node(node, metric)
            } else {
                let values: Vec<f64> =
                    query_node_by_id(profile, node.id(), metric, false).iter().map(|r| r.value).collect();
                if values.is_empty() { None } else { Some(self.config.reducer.apply(&values)?) }
            };

            match time {
                Some(time) if time.is_finite() => candidates.push((node, time)),
                Some(time) => tracing::warn!("Skipping node {}: {} is {}", node.id(), metric, time),
                None => {},
            }
        }

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile_analyzer::models::{Fragment, FragmentInstance, Node};
    use pretty_assertions::assert_eq;

    fn tree(sink: f64, join: f64, scan: f64) -> Node {
        Node::new(0, 0, "EXCHANGE_SINK")
            .with_metric("TotalTime", sink, "ns")
            .with_child(
                Node::new(1, 1, "HASH_JOIN")
                    .with_metric("TotalTime", join, "ns")
                    .with_child(Node::new(2, 2, "SCAN").with_metric("TotalTime", scan, "ns")),
            )
    }

    fn profile() -> Profile {
        Profile::new(
            "q42",
            vec![Fragment::new(
                1,
                vec![
                    FragmentInstance::averaged(0, tree(5.0, 30.0, 65.0)),
                    FragmentInstance::new(1, "a", tree(4.0, 20.0, 50.0)),
                    FragmentInstance::new(2, "b", tree(6.0, 40.0, 80.0)),
                ],
            )],
        )
        .with_total_time(100.0)
    }

    #[test]
    fn test_contributors_ranked_by_time() {
        let contributors = ContributorAnalyzer::new().analyze(&profile()).unwrap();
        let ids: Vec<i64> = contributors.iter().map(|c| c.plan_node_id).collect();
        assert_eq!(ids, vec![2, 1, 0]);

        let top = &contributors[0];
        assert_eq!(top.id, "q42:2");
        assert_eq!(top.contributor_type, ContributorType::Operator);
        assert_eq!(top.wall_clock_time, 65.0);
        let reason = top.reason.as_ref().unwrap();
        assert_eq!(reason.impact, 0.65);
        assert!(reason.message.contains("most time-consuming"));
        assert_eq!(contributors[2].contributor_type, ContributorType::Fragment);
    }

    #[test]
    fn test_contributors_from_per_host_values() {
        let config = ContributorConfig { use_averaged: false, ..Default::default() };
        let contributors = ContributorAnalyzer::with_config(config).analyze(&profile()).unwrap();
        assert_eq!(contributors[0].wall_clock_time, 80.0);
        assert_eq!(contributors[1].wall_clock_time, 40.0);
    }

    #[test]
    fn test_min_impact_and_truncation() {
        let config = ContributorConfig { min_impact: 0.1, max_contributors: 1, ..Default::default() };
        let contributors = ContributorAnalyzer::with_config(config).analyze(&profile()).unwrap();
        assert_eq!(contributors.len(), 1);
        assert_eq!(contributors[0].plan_node_id, 2);
    }

    #[test]
    fn test_total_time_defaults_to_candidate_sum() {
        let mut profile = profile();
        profile.total_time = None;
        let contributors = ContributorAnalyzer::new().analyze(&profile).unwrap();
        assert_eq!(contributors[0].reason.as_ref().unwrap().impact, 0.65);
    }

    #[test]
    fn test_custom_policy() {
        fn joins_only(node: NodeRef<'_>, time: f64, _total: f64) -> Option<Reason> {
            (node.name() == "HASH_JOIN").then(|| Reason::new("join is slow", time / 10.0))
        }
        let config = ContributorConfig { min_impact: 1.0, ..Default::default() };
        let contributors =
            ContributorAnalyzer::with_config(config).with_policy(joins_only).analyze(&profile()).unwrap();
        assert_eq!(contributors.len(), 1);
        assert_eq!(contributors[0].reason, Some(Reason::new("join is slow", 3.0)));
    }

    #[test]
    fn test_non_finite_values_never_reach_json() {
        fn undefined_impact(_node: NodeRef<'_>, _time: f64, _total: f64) -> Option<Reason> {
            Some(Reason::new("undefined", f64::NAN))
        }
        let contributors = ContributorAnalyzer::new().with_policy(undefined_impact).analyze(&profile()).unwrap();
        assert_eq!(contributors.len(), 3);
        for contributor in &contributors {
            assert_eq!(contributor.reason, None);
            assert_eq!(&Contributor::from_json(&contributor.to_json().unwrap()).unwrap(), contributor);
        }

        let config = ContributorConfig { min_impact: 0.1, ..Default::default() };
        let analyzer = ContributorAnalyzer::with_config(config).with_policy(undefined_impact);
        assert!(analyzer.analyze(&profile()).unwrap().is_empty());

        fn undefined_time(_values: &[f64]) -> f64 {
            f64::INFINITY
        }
        let config = ContributorConfig {
            use_averaged: false,
            reducer: Reducer::Custom("undefined", undefined_time),
            ..Default::default()
        };
        assert!(ContributorAnalyzer::with_config(config).analyze(&profile()).unwrap().is_empty());
    }

    #[test]
    fn test_contributor_json_is_key_sorted() {
        let contributor = Contributor {
            id: "q:3".to_string(),
            query_id: "q".to_string(),
            contributor_type: ContributorType::Operator,
            wall_clock_time: 12.5,
            plan_node_id: 3,
            plan_node_name: "SORT".to_string(),
            reason: Some(Reason::new("slow", 0.25)),
        };
        assert_eq!(
            contributor.to_json().unwrap(),
            r#"{"id":"q:3","plan_node_id":3,"plan_node_name":"SORT","query_id":"q","reason":{"impact":0.25,"message":"slow"},"type":"operator","wall_clock_time":12.5}"#
        );
    }

    #[test]
    fn test_contributor_json_round_trip() {
        let contributor = Contributor {
            id: "q:7".to_string(),
            query_id: "q".to_string(),
            contributor_type: ContributorType::Fragment,
            wall_clock_time: 0.1 + 0.2,
            plan_node_id: 7,
            plan_node_name: "EXCHANGE_SINK".to_string(),
            reason: Some(Reason::new("fragment dominates", 1.0 / 3.0)),
        };
        let parsed = Contributor::from_json(&contributor.to_json().unwrap()).unwrap();
        assert_eq!(parsed, contributor);

        let reason = Reason::new("x", 0.123456789012345);
        assert_eq!(Reason::from_json(&reason.to_json().unwrap()).unwrap(), reason);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(Reason::from_json(r#"{"message":"m","impact":1.0,"severity":"high"}"#).is_err());
        let without_reason = r#"{"id":"q:1","query_id":"q","type":"operator","wall_clock_time":1.0,"plan_node_id":1,"plan_node_name":"SCAN"}"#;
        assert_eq!(Contributor::from_json(without_reason).unwrap().reason, None);
    }
}
