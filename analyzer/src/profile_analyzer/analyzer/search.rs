//! Identity search over the node tree
//!
//! A logical plan node appears once per fragment instance. These lookups
//! either return every occurrence or disambiguate down to exactly one.

use crate::profile_analyzer::models::{NodeRef, Profile};
use crate::utils::{AnalyzeError, AnalyzeResult};

/// Every occurrence of the logical node, averaged and per-host alike
///
/// An empty result means "not found" and is not an error.
pub fn find_by_id(profile: &Profile, node_id: i64) -> Vec<NodeRef<'_>> {
    profile.find_by_id(node_id)
}

/// Every occurrence whose name matches exactly
///
/// Distinct logical nodes may share a display name, so the result can span
/// several logical ids.
pub fn find_all_by_name<'a>(profile: &'a Profile, name: &str) -> Vec<NodeRef<'a>> {
    profile.find_all_by_name(name)
}

/// The single occurrence of `node_id` inside the given fragment instance
///
/// Instance ids are scoped per fragment, so both `fragment_id` and
/// `fragment_instance_id` must match, fragment roots included.
pub fn find_unique_by_id(
    profile: &Profile,
    fragment_id: i64,
    fragment_instance_id: i64,
    node_id: i64,
) -> AnalyzeResult<NodeRef<'_>> {
    let mut matches = profile.find_by_id(node_id).into_iter().filter(|n| {
        n.fragment_id() == fragment_id && n.fragment_instance_id() == fragment_instance_id
    });

    let first = matches.next().ok_or(AnalyzeError::NodeInstanceNotFound {
        fragment_id,
        instance_id: fragment_instance_id,
        node_id,
    })?;

    let extra = matches.count();
    if extra > 0 {
        tracing::warn!(
            "Node {} matches {} occurrences in fragment {} instance {}",
            node_id,
            extra + 1,
            fragment_id,
            fragment_instance_id
        );
        return Err(AnalyzeError::ambiguous(
            format!(
                "node {} in fragment {} instance {}",
                node_id, fragment_id, fragment_instance_id
            ),
            extra + 1,
        ));
    }

    Ok(first)
}
