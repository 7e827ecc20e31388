//! Query Profile Analyzer Library
//!
//! Read-only analysis of distributed query execution profiles: identity
//! search over the plan node tree, metric extraction, cross-host
//! aggregation and contributor (bottleneck) synthesis.

pub mod config;
pub mod profile_analyzer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use profile_analyzer::{
    Contributor, ContributorAnalyzer, ContributorConfig, Fragment, FragmentInstance, Metric, Node, NodeRef,
    Profile, Reason, ReasonPolicy, Reducer,
};
pub use utils::{AnalyzeError, AnalyzeResult};
