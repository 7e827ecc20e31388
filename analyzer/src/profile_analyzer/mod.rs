//! Query Profile Analyzer
//!
//! Search, metric extraction, cross-host aggregation and contributor
//! synthesis over a materialized distributed query profile.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        Profile                            │
//! │   Fragment ── FragmentInstance (per host | averaged)      │
//! │                     └── Node tree ── Metric               │
//! └───────────────────────────────────────────────────────────┘
//!                             │ NodeRef (node + fragment + instance)
//!           ┌─────────────────┼──────────────────┐
//!           ▼                 ▼                  ▼
//!   ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐
//!   │   search     │  │   metrics    │  │   aggregation    │
//!   │ find_by_id   │  │ query_node_* │  │ host_by_metric   │
//!   └──────────────┘  └──────────────┘  └──────────────────┘
//!                             │
//!                             ▼
//!                   ┌──────────────────┐
//!                   │   contributor    │
//!                   │ Contributor      │
//!                   │ Reason           │
//!                   └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use query_profile_analyzer::profile_analyzer::{load_profile, host_by_metric, Reducer};
//!
//! let profile = load_profile(&snapshot_json)?;
//! for row in host_by_metric(&profile, "RowsRead", &[Reducer::Max, Reducer::Mean])? {
//!     println!("{}: {:?}", row.host, row.values);
//! }
//! ```

pub mod analyzer;
pub mod models;


pub use analyzer::*;
pub use models::*;

use crate::utils::{AnalyzeError, AnalyzeResult};

/// Parse a JSON profile snapshot and check its invariants
///
/// The snapshot is the serde form of [`Profile`]; producing it from the
/// engine's native profile format is the job of the ingestion layer.
pub fn load_profile(json: &str) -> AnalyzeResult<Profile> {
    let profile: Profile = serde_json::from_str(json)
        .map_err(|e| AnalyzeError::invalid_profile(format!("malformed snapshot: {}", e)))?;
    profile.validate()?;
    tracing::debug!(
        "Loaded profile {}: {} fragments, {} nodes",
        profile.query_id,
        profile.fragments.len(),
        profile.nodes().count()
    );
    Ok(profile)
}
