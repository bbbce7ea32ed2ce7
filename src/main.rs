use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use placement_core::config::{AppConfig, LogFormat};
use placement_core::{NodeId, PlacementId};
use placement_filter::country::CountryCode;
use placement_filter::rules::{Annotation, NodeAttributes};
use placement_filter::{PlacementConfig, PlacementRegistry};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Placement - inspect and check storage node placement rules
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to application configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Placement definitions, `id:expression;id:expression;...`
    #[arg(long, env = "PLACEMENT_DEFINITIONS", global = true)]
    definitions: Option<String>,

    /// Path to a YAML placement file
    #[arg(long, global = true)]
    placements: Option<PathBuf>,

    /// Do not register the built-in legacy placements
    #[arg(long, global = true)]
    no_legacy: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormatArg>,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the user-defined placements
    Describe {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Check whether a node is eligible for a placement
    Check {
        /// Placement identifier
        #[arg(long)]
        placement: PlacementId,

        /// Node country (ISO 3166-1 alpha-2, or "none")
        #[arg(long, default_value = "none")]
        country: String,

        /// Node identifier (64 hex characters)
        #[arg(long)]
        node_id: Option<NodeId>,

        /// Node tag as SIGNER/KEY=VALUE (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Load every configured source and report the result
    Validate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(format: LogFormatArg) -> Self {
        match format {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Serialize)]
struct DescribedPlacement {
    id: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    rule: String,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    init_logging(&config)?;
    let metrics = cli.metrics.then(init_metrics).transpose()?;

    let registry = build_registry(&config)?;

    let code = match cli.command {
        Command::Describe { format } => {
            describe(&registry, format)?;
            ExitCode::SUCCESS
        }
        Command::Check {
            placement,
            country,
            node_id,
            tags,
        } => {
            let node = node_attributes(&country, node_id, &tags)?;
            let accepted = registry.matches(placement, &node);
            debug!(placement = %placement, country = %node.country, accepted, "Checked node");
            if accepted {
                println!("accept");
                ExitCode::SUCCESS
            } else {
                println!("reject");
                ExitCode::FAILURE
            }
        }
        Command::Validate => {
            let user_defined = registry.user_defined().count();
            println!(
                "ok: {} placements registered ({} user-defined)",
                registry.len(),
                user_defined
            );
            ExitCode::SUCCESS
        }
    };

    if let Some(handle) = metrics {
        eprint!("{}", handle.render());
    }
    Ok(code)
}

/// Application config from file (with `PLACEMENT__*` overrides), then CLI flags on top.
fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_config_builder(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => AppConfig::new(),
    };

    if let Some(definitions) = &cli.definitions {
        config.placement.definitions = Some(definitions.clone());
    }
    if let Some(path) = &cli.placements {
        config.placement.file = Some(path.clone());
    }
    if cli.no_legacy {
        config.placement.legacy_defaults = false;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format.into();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let level = config.logging.parse_level()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    // stdout carries command output, logs go to stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = match config.logging.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| anyhow!("Failed to initialize logging: {e}"))
}

/// In-process Prometheus recorder, rendered on demand instead of served.
fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;
    placement_filter::metrics::describe();
    info!("Prometheus metrics recorder installed");
    Ok(handle)
}

/// Default rule, legacy rules, the placement file, then inline definitions.
fn build_registry(config: &AppConfig) -> Result<PlacementRegistry> {
    let settings = &config.placement;
    let file = settings
        .file
        .as_ref()
        .map(|path| {
            PlacementConfig::from_file(path)
                .with_context(|| format!("Failed to load placement file: {}", path.display()))
        })
        .transpose()?;

    let mut registry = PlacementRegistry::new();
    registry.register_default();

    let legacy = settings.legacy_defaults && file.as_ref().map_or(true, |f| f.legacy_defaults);
    if legacy {
        registry.register_legacy_defaults();
    }

    if let Some(file) = &file {
        let applied = file
            .apply(&mut registry)
            .context("Failed to apply placement file")?;
        info!(applied, "Applied placement file");
    }

    if let Some(definitions) = &settings.definitions {
        registry
            .load_definitions(definitions)
            .context("Failed to load placement definitions")?;
    }

    Ok(registry)
}

fn describe(registry: &PlacementRegistry, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", registry.describe()),
        OutputFormat::Json => {
            let placements: Vec<_> = registry
                .user_defined()
                .map(|(id, filter)| DescribedPlacement {
                    id: id.get(),
                    name: filter.annotation(Annotation::NAME).map(str::to_string),
                    rule: filter.to_string(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&placements)?);
        }
    }
    Ok(())
}

fn node_attributes(country: &str, node_id: Option<NodeId>, tags: &[String]) -> Result<NodeAttributes> {
    let country = if country.eq_ignore_ascii_case("none") {
        CountryCode::None
    } else {
        CountryCode::from_alpha2(country)
            .ok_or_else(|| anyhow!("Invalid country code: {country}"))?
    };

    let mut node = NodeAttributes::new(node_id.unwrap_or_default(), country);
    for tag in tags {
        let (signer, key, value) = parse_tag(tag)?;
        node = node.with_tag(signer, key, value);
    }
    Ok(node)
}

/// Parses `SIGNER/KEY=VALUE`.
fn parse_tag(tag: &str) -> Result<(NodeId, &str, &str)> {
    let Some((signer, rest)) = tag.split_once('/') else {
        bail!("Invalid tag {tag:?}: expected SIGNER/KEY=VALUE");
    };
    let Some((key, value)) = rest.split_once('=') else {
        bail!("Invalid tag {tag:?}: expected SIGNER/KEY=VALUE");
    };
    let signer = signer
        .parse::<NodeId>()
        .with_context(|| format!("Invalid tag signer in {tag:?}"))?;
    Ok((signer, key, value))
}
