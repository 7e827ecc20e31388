use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use query_profile_analyzer::{AnalyzeResult, Config};
use query_profile_analyzer::config::LoggingConfig;
use query_profile_analyzer::profile_analyzer::{
    self, ContributorAnalyzer, Reducer, find_unique_by_id, host_by_metric,
    query_avg_fragment_metric_by_node_nid, query_node_by_id, query_node_by_metric,
};

/// Query profile analyzer
///
/// Runs one query against a JSON profile snapshot and prints the result as JSON.
#[derive(Parser, Debug)]
#[command(name = "profile-analyzer", version, about)]
struct Cli {
    /// Profile snapshot (JSON)
    #[arg(short, long)]
    profile: PathBuf,

    /// Configuration file (defaults to conf/config.toml or config.toml)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Metric values of one logical plan node
    Node {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        metric: String,
        /// Read the averaged instance instead of per-host instances
        #[arg(long)]
        averaged: bool,
    },
    /// Per-host metric values of every node with the given name
    ByName {
        #[arg(long)]
        name: String,
        #[arg(long)]
        metric: String,
    },
    /// The node occurrence inside one fragment instance
    Unique {
        #[arg(long)]
        fragment: i64,
        #[arg(long)]
        instance: i64,
        #[arg(long)]
        id: i64,
    },
    /// Averaged metric value of one logical plan node
    Avg {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        metric: String,
    },
    /// Metric reduced per host
    Hosts {
        #[arg(long)]
        metric: String,
        /// Reducers (max, min, sum, mean, count); defaults to the configured ones
        #[arg(long = "reducer")]
        reducers: Vec<Reducer>,
    },
    /// Plan nodes ranked by wall-clock time
    Contributors {
        /// Override the configured maximum
        #[arg(long)]
        top: Option<usize>,
    },
}

#[derive(Serialize)]
struct UniqueNode<'a> {
    node_id: i64,
    instance_id: i64,
    name: &'a str,
    fragment_id: i64,
    fragment_instance_id: i64,
    host: &'a str,
    is_fragment: bool,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let _guard = init_logging(&config.logging);
    tracing::info!("Configuration loaded successfully");

    let snapshot = std::fs::read_to_string(&cli.profile)
        .with_context(|| format!("Failed to read profile {}", cli.profile.display()))?;
    let profile = profile_analyzer::load_profile(&snapshot)?;
    tracing::info!("Profile {} loaded from {}", profile.query_id, cli.profile.display());

    let output = match cli.command {
        Command::Node { id, metric, averaged } => {
            serde_json::to_value(query_node_by_id(&profile, id, &metric, averaged))?
        },
        Command::ByName { name, metric } => {
            serde_json::to_value(query_node_by_metric(&profile, &name, &metric))?
        },
        Command::Unique { fragment, instance, id } => {
            let node = or_missing(find_unique_by_id(&profile, fragment, instance, id))?;
            serde_json::to_value(node.map(|node| UniqueNode {
                node_id: node.id(),
                instance_id: node.instance_id(),
                name: node.name(),
                fragment_id: node.fragment_id(),
                fragment_instance_id: node.fragment_instance_id(),
                host: node.host(),
                is_fragment: node.is_fragment(),
            }))?
        },
        Command::Avg { id, metric } => {
            serde_json::to_value(or_missing(query_avg_fragment_metric_by_node_nid(&profile, id, &metric))?)?
        },
        Command::Hosts { metric, reducers } => {
            let reducers = if reducers.is_empty() { config.analysis.reducers()? } else { reducers };
            serde_json::to_value(host_by_metric(&profile, &metric, &reducers)?)?
        },
        Command::Contributors { top } => {
            let mut contributor_config = config.analysis.contributor_config()?;
            if let Some(top) = top {
                contributor_config.max_contributors = top;
            }
            let analyzer = ContributorAnalyzer::with_config(contributor_config);
            tracing::debug!("Ranking contributors by {}", analyzer.config().time_metric);
            serde_json::to_value(analyzer.analyze(&profile)?)?
        },
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Missing data prints `null`; broken data is still an error
fn or_missing<T>(result: AnalyzeResult<T>) -> AnalyzeResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => {
            tracing::warn!("{}", e);
            Ok(None)
        },
        Err(e) => Err(e),
    }
}

/// Console logs go to stderr so stdout carries only the JSON result
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let log_filter = tracing_subscriber::EnvFilter::new(&logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    // Add file logging if configured
    if let Some(log_file) = &logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path.file_name().and_then(|n| n.to_str()).unwrap_or("profile-analyzer.log");
        // Rolling appender adds a date suffix
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        registry
            .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
        Some(guard)
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)).init();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_profile_analyzer::AnalyzeError;

    #[test]
    fn test_init_logging_with_file_and_console() {
        let dir = std::env::temp_dir().join(format!("profile-analyzer-{}", std::process::id()));
        let logging = LoggingConfig {
            level: "debug".to_string(),
            file: Some(dir.join("analyzer.log").to_string_lossy().into_owned()),
        };
        let guard = init_logging(&logging);
        assert!(guard.is_some());
        tracing::info!("logging initialized");
        drop(guard);
        assert!(dir.is_dir());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_or_missing() {
        assert_eq!(or_missing(Ok(1.5)), Ok(Some(1.5)));
        assert_eq!(or_missing::<f64>(Err(AnalyzeError::node_not_found(3))), Ok(None));
        assert_eq!(
            or_missing::<f64>(Err(AnalyzeError::ambiguous("node 3", 2))),
            Err(AnalyzeError::ambiguous("node 3", 2))
        );
    }
}
