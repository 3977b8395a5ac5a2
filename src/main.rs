use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use ocloud_adapters::backends::build_adapter;
use ocloud_adapters::config::Config;
use ocloud_adapters::model::Filter;
use ocloud_adapters::observability::TracingObserver;
use ocloud_adapters::session::http::format_api_error;
use ocloud_adapters::{Adapter, VERSION};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Query cloud backends through the O-Cloud adapter contract
#[derive(Parser, Debug)]
#[command(name = "ocloud-adapters", version = VERSION, about, long_about = None)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend name from the config file
    #[arg(short, long)]
    backend: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe backend reachability
    Health,
    /// List resource pools, or show one
    Pools {
        id: Option<String>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// List resources, or show one
    Resources {
        id: Option<String>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// List resource types, or show one
    Types {
        id: Option<String>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Show the deployment manager record
    DeploymentManager { id: String },
}

#[derive(ClapArgs, Debug, Default)]
struct FilterArgs {
    #[arg(long)]
    pool: Option<String>,
    #[arg(long = "type")]
    resource_type: Option<String>,
    #[arg(long)]
    location: Option<String>,
    /// Label selector, repeatable
    #[arg(long = "label", value_name = "KEY=VALUE", value_parser = parse_label)]
    labels: Vec<(String, String)>,
    #[arg(long, default_value_t = 0)]
    limit: usize,
    #[arg(long, default_value_t = 0)]
    offset: usize,
}

impl FilterArgs {
    fn to_filter(&self) -> Filter {
        Filter {
            resource_pool_id: self.pool.clone().unwrap_or_default(),
            resource_type_id: self.resource_type.clone().unwrap_or_default(),
            location: self.location.clone().unwrap_or_default(),
            labels: self.labels.iter().cloned().collect(),
            limit: self.limit,
            offset: self.offset,
        }
    }
}

fn parse_label(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::from_level(tracing_level).into())
                .from_env_lossy(),
        )
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("ocloud-adapters {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("ocloud-adapters").join("ocloud-adapters.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".ocloud-adapters").join("ocloud-adapters.log");
    }
    PathBuf::from("ocloud-adapters.log")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(
    adapter: &dyn Adapter,
    command: &Command,
) -> ocloud_adapters::Result<serde_json::Value> {
    let value = match command {
        Command::Health => {
            adapter.health().await?;
            serde_json::json!({
                "backend": adapter.name(),
                "version": adapter.version(),
                "healthy": true,
                "capabilities": adapter.capabilities().tags(),
            })
        },
        Command::Pools { id: Some(id), .. } => to_value(adapter.get_resource_pool(id).await?),
        Command::Pools { id: None, filter } => {
            to_value(adapter.list_resource_pools(Some(&filter.to_filter())).await?)
        },
        Command::Resources { id: Some(id), .. } => to_value(adapter.get_resource(id).await?),
        Command::Resources { id: None, filter } => {
            to_value(adapter.list_resources(Some(&filter.to_filter())).await?)
        },
        Command::Types { id: Some(id), .. } => to_value(adapter.get_resource_type(id).await?),
        Command::Types { id: None, filter } => {
            to_value(adapter.list_resource_types(Some(&filter.to_filter())).await?)
        },
        Command::DeploymentManager { id } => to_value(adapter.get_deployment_manager(id).await?),
    };
    Ok(value)
}

fn to_value<T: Serialize>(value: T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = setup_logging(args.log_level)?;

    let config = Config::load(args.config.as_deref())?;
    let backend = config.backend(args.backend.as_deref())?;

    let adapter = build_adapter(backend, Arc::new(TracingObserver))
        .await
        .map_err(|e| anyhow::anyhow!(format_api_error(&e)))
        .with_context(|| format!("Failed to initialize backend {}", backend.name))?;

    let result = run(adapter.as_ref(), &args.command).await;
    if let Err(e) = adapter.close().await {
        tracing::warn!("Close failed: {}", e);
    }

    match result {
        Ok(value) => print_json(&value),
        Err(e) => {
            tracing::error!(kind = ?e.kind(), "{}", e);
            bail!("{}", format_api_error(&e))
        },
    }
}
