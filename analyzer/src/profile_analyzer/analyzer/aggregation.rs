//! Cross-host aggregation
//!
//! Groups the values a metric takes on every real (non-averaged) fragment
//! instance by host and reduces each group, e.g. to spot the host that
//! dominates a counter.

use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::profile_analyzer::models::Profile;
use crate::utils::{AnalyzeError, AnalyzeResult};

/// A pure function folding a group of values into one
///
/// `Custom` carries a label for logs and errors; two custom reducers are
/// equal only when both the label and the function match.
#[derive(Clone, Copy)]
pub enum Reducer {
    Max,
    Min,
    Sum,
    Mean,
    Count,
    Custom(&'static str, fn(&[f64]) -> f64),
}

/// Reducers applied when the caller does not choose any
pub const DEFAULT_REDUCERS: &[Reducer] = &[Reducer::Max];

impl Reducer {
    pub fn name(&self) -> &'static str {
        match self {
            Reducer::Max => "max",
            Reducer::Min => "min",
            Reducer::Sum => "sum",
            Reducer::Mean => "mean",
            Reducer::Count => "count",
            Reducer::Custom(name, _) => *name,
        }
    }

    /// Reduce `values`, refusing empty input
    pub fn apply(&self, values: &[f64]) -> AnalyzeResult<f64> {
        if values.is_empty() {
            return Err(AnalyzeError::empty_aggregation(self.name(), None));
        }
        Ok(self.reduce(values))
    }

    fn reduce(&self, values: &[f64]) -> f64 {
        match self {
            Reducer::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Reducer::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Reducer::Sum => values.iter().sum(),
            Reducer::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Reducer::Count => values.len() as f64,
            Reducer::Custom(_, f) => f(values),
        }
    }
}

impl fmt::Debug for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reducer({})", self.name())
    }
}

impl PartialEq for Reducer {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Reducer::Custom(a, f), Reducer::Custom(b, g)) => a == b && std::ptr::fn_addr_eq(*f, *g),
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

impl FromStr for Reducer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "max" => Ok(Reducer::Max),
            "min" => Ok(Reducer::Min),
            "sum" => Ok(Reducer::Sum),
            "mean" | "avg" => Ok(Reducer::Mean),
            "count" => Ok(Reducer::Count),
            other => Err(format!("unsupported reducer: {}", other)),
        }
    }
}

/// One host with the reduced values, in reducer order
///
/// Serializes as a flat array: `[host, r1, r2, ...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct HostMetricRow {
    pub host: String,
    pub values: Vec<f64>,
}

impl Serialize for HostMetricRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.values.len() + 1))?;
        seq.serialize_element(&self.host)?;
        for value in &self.values {
            seq.serialize_element(value)?;
        }
        seq.end()
    }
}

/// Reduce `metric_name` per host over all real fragment instances
///
/// Values are collected in fragment, instance, then pre-order node order
/// (instance-level counters before node counters). Hosts appear in the
/// order their first value was seen; all values of a host form one group.
pub fn host_by_metric(
    profile: &Profile,
    metric_name: &str,
    reducers: &[Reducer],
) -> AnalyzeResult<Vec<HostMetricRow>> {
    let mut groups: Vec<(&str, Vec<f64>)> = Vec::new();

    for (fragment, instance) in profile.find_all_instances().filter(|(_, i)| !i.is_averaged()) {
        for m in instance.find_metric_by_name(fragment, metric_name) {
            let host = m.node.host();
            match groups.iter_mut().find(|(h, _)| *h == host) {
                Some((_, values)) => values.push(m.value),
                None => groups.push((host, vec![m.value])),
            }
        }
    }

    if groups.is_empty() {
        return Err(AnalyzeError::empty_aggregation(metric_name, None));
    }

    tracing::debug!(
        "host_by_metric: metric={}, hosts={}, reducers={:?}",
        metric_name,
        groups.len(),
        reducers
    );

    groups
        .into_iter()
        .map(|(host, values)| {
            let reduced = reducers
                .iter()
                .map(|r| {
                    r.apply(&values)
                        .map_err(|_| AnalyzeError::empty_aggregation(metric_name, Some(host)))
                })
                .collect::<AnalyzeResult<Vec<f64>>>()?;
            Ok(HostMetricRow { host: host.to_string(), values: reduced })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile_analyzer::models::{Fragment, FragmentInstance, Node};
    use pretty_assertions::assert_eq;

    fn scan(id: i64, rows: f64) -> Node {
        Node::new(id, id * 100, "SCAN").with_metric("rows_read", rows, "")
    }

    /// Host A reads 10 then 40 rows, host B reads 25
    fn profile() -> Profile {
        Profile::new(
            "q",
            vec![
                Fragment::new(
                    1,
                    vec![
                        FragmentInstance::averaged(0, scan(1, 17.5)),
                        FragmentInstance::new(1, "A", scan(1, 10.0)),
                        FragmentInstance::new(2, "B", scan(1, 25.0)),
                    ],
                ),
                Fragment::new(
                    2,
                    vec![
                        FragmentInstance::averaged(0, scan(2, 40.0)),
                        FragmentInstance::new(1, "A", scan(2, 40.0)),
                    ],
                ),
            ],
        )
    }

    fn row(host: &str, values: &[f64]) -> HostMetricRow {
        HostMetricRow { host: host.to_string(), values: values.to_vec() }
    }

    #[test]
    fn test_host_by_metric_max() {
        let rows = host_by_metric(&profile(), "rows_read", DEFAULT_REDUCERS).unwrap();
        assert_eq!(rows, vec![row("A", &[40.0]), row("B", &[25.0])]);
    }

    #[test]
    fn test_host_by_metric_multiple_reducers() {
        let reducers = [Reducer::Min, Reducer::Mean, Reducer::Count, Reducer::Sum];
        let rows = host_by_metric(&profile(), "rows_read", &reducers).unwrap();
        assert_eq!(rows, vec![row("A", &[10.0, 25.0, 2.0, 50.0]), row("B", &[25.0, 25.0, 1.0, 25.0])]);
    }

    #[test]
    fn test_host_by_metric_is_idempotent() {
        let profile = profile();
        let first = host_by_metric(&profile, "rows_read", &[Reducer::Max, Reducer::Min]).unwrap();
        let second = host_by_metric(&profile, "rows_read", &[Reducer::Max, Reducer::Min]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_host_by_metric_custom_reducer() {
        fn spread(values: &[f64]) -> f64 {
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            max - min
        }
        let rows = host_by_metric(&profile(), "rows_read", &[Reducer::Custom("spread", spread)]).unwrap();
        assert_eq!(rows, vec![row("A", &[30.0]), row("B", &[0.0])]);
    }

    #[test]
    fn test_host_by_metric_unknown_metric_fails() {
        let err = host_by_metric(&profile(), "bytes_sent", DEFAULT_REDUCERS).unwrap_err();
        assert_eq!(err, AnalyzeError::EmptyAggregation { metric: "bytes_sent".to_string(), host: None });
    }

    #[test]
    fn test_host_by_metric_without_reducers() {
        let rows = host_by_metric(&profile(), "rows_read", &[]).unwrap();
        assert_eq!(rows, vec![row("A", &[]), row("B", &[])]);
    }

    #[test]
    fn test_reducer_rejects_empty_input() {
        assert!(Reducer::Max.apply(&[]).is_err());
        assert_eq!(Reducer::Max.apply(&[1.0, 3.0, 2.0]), Ok(3.0));
    }

    #[test]
    fn test_reducer_from_str() {
        assert_eq!("MAX".parse::<Reducer>(), Ok(Reducer::Max));
        assert_eq!(" avg ".parse::<Reducer>(), Ok(Reducer::Mean));
        assert!("median".parse::<Reducer>().is_err());
    }

    #[test]
    fn test_custom_reducers_compare_by_function() {
        fn first(values: &[f64]) -> f64 {
            values[0]
        }
        fn last(values: &[f64]) -> f64 {
            values[values.len() - 1]
        }
        assert_ne!(Reducer::Custom("pick", first), Reducer::Custom("pick", last));
        assert_ne!(Reducer::Custom("first", first), Reducer::Custom("last", first));
        assert_ne!(Reducer::Custom("max", first), Reducer::Max);
        assert_eq!(Reducer::Sum, Reducer::Sum);
    }

    #[test]
    fn test_row_serializes_as_array() {
        let json = serde_json::to_string(&row("A", &[40.0, 10.0])).unwrap();
        assert_eq!(json, r#"["A",40.0,10.0]"#);
    }
}
