//! Instant Bandit: command-line front end for the bandit client.
//!
//! Loads a site document (remote or from a file), selects a variant and
//! optionally reports a metric, printing the resulting client state as JSON.

use bandit_client::{BanditClient, ClientConfig, ClientState, Site, StaticSiteSource};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "instant-bandit")]
#[command(about = "Select A/B variants and report outcome metrics")]
#[command(version)]
struct Cli {
    /// Optional config file (TOML or JSON), overridden by INSTANT_BANDIT__* variables
    #[arg(long, short)]
    config: Option<String>,

    /// Selection service base URL (overrides config)
    #[arg(long, env = "INSTANT_BANDIT__BASE_URL")]
    base_url: Option<String>,

    /// Origin the session is stored under (overrides config)
    #[arg(long)]
    origin: Option<String>,

    /// Default selection algorithm (overrides config)
    #[arg(long)]
    algorithm: Option<String>,

    /// Append a cache-busting timestamp to site requests
    #[arg(long, default_value_t = false)]
    append_timestamp: bool,

    /// Persist sessions as JSON files in this directory
    #[arg(long)]
    session_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the site and print the selected variant
    Select {
        /// Use a site document from disk instead of fetching one
        #[arg(long)]
        site_file: Option<PathBuf>,

        /// Force a specific variant
        #[arg(long)]
        select: Option<String>,
    },
    /// Load the site, report one metric sample and flush it
    Push {
        /// Metric name, e.g. `exposures` or `conversions`
        #[arg(long)]
        metric: String,

        #[arg(long, default_value_t = 1.0)]
        value: f64,

        /// Force a specific variant
        #[arg(long)]
        select: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "instant_bandit=info,bandit_client=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::load_from(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        ClientConfig::default()
    });

    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(origin) = cli.origin {
        config.origin = origin;
    }
    if let Some(algorithm) = cli.algorithm {
        config.default_algorithm = algorithm;
    }
    if cli.append_timestamp {
        config.append_timestamp = true;
    }
    if cli.session_dir.is_some() {
        config.session_dir = cli.session_dir;
    }

    info!(
        base_url = %config.base_url,
        site_path = %config.site_path,
        algorithm = %config.default_algorithm,
        "Configuration loaded"
    );

    match cli.command {
        Command::Select { site_file, select } => {
            let mut builder = BanditClient::builder(config);
            if let Some(path) = site_file {
                let site: Site = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
                builder = builder.source(Arc::new(StaticSiteSource::new(site)));
            }
            let client = builder.build();
            let state = client.load_with(select.as_deref()).await;
            print_state(&state)?;
        }
        Command::Push {
            metric,
            value,
            select,
        } => {
            let client = BanditClient::new(config);
            let state = client.load_with(select.as_deref()).await;
            client.record(&metric, value).await;
            client.flush().await;
            if !client.metrics().is_empty() {
                warn!(pending = client.metrics().len(), "Metrics could not be delivered");
            }
            print_state(&state)?;
        }
    }

    Ok(())
}

fn print_state(state: &ClientState) -> anyhow::Result<()> {
    let out = json!({
        "state": state.state,
        "site": state.site_name(),
        "variant": state.variant_name(),
        "selection": state.selection.as_ref().map(|s| format!("{s:?}")),
        "session": state.session.as_ref().map(|s| json!({
            "origin": s.origin,
            "sid": s.sid,
            "uid": s.uid,
            "variant": s.variant,
        })),
        "error": state.error.as_ref().map(|e| e.to_string()),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
