use anyhow::{Context, Result};
use chronicle::api::{format_api_error, AcceptLanguage, ApiClient, ApiError, BearerToken, RetryPolicy};
use chronicle::cache::{QueryCache, QueryParams};
use chronicle::config::Config;
use chronicle::resource::{get_all_resource_names, get_resource, ResourceContext, ResourceModel};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Command-line client for the dashboard API
#[derive(Parser, Debug)]
#[command(name = "chronicle", version, about, long_about = None)]
struct Args {
    /// API root URL
    #[arg(long)]
    base_url: Option<String>,

    /// Bearer token (defaults to CHRONICLE_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Locale sent as Accept-Language
    #[arg(long)]
    locale: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    output: OutputFormat,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered resources
    Resources,
    /// List a resource collection
    List {
        resource: String,
        /// Filter or pagination parameter (key=value), repeatable
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// Follow pagination to the last page
        #[arg(long)]
        all: bool,
    },
    /// Show a single instance
    Get { resource: String, id: String },
    /// Create an instance from a JSON payload
    Create {
        resource: String,
        #[arg(long)]
        data: String,
    },
    /// Update an instance from a JSON payload
    Update {
        resource: String,
        id: String,
        #[arg(long)]
        data: String,
    },
    /// Delete an instance
    Delete { resource: String, id: String },
    /// Show a resource's choices listing
    Choices { resource: String },
    /// Resolve the display name of a stored value
    Label {
        resource: String,
        value: String,
        /// Restrict the lookup to one field's choices
        #[arg(long)]
        field: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
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

fn parse_param(s: &str) -> std::result::Result<(String, String), String> {
    QueryParams::parse_pair(s).ok_or_else(|| format!("expected key=value, got '{}'", s))
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    // RUST_LOG narrows per-module output; --log-level caps it
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing_level.as_str().to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("chronicle {} started with log level: {:?}", chronicle::VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("chronicle").join("chronicle.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".chronicle").join("chronicle.log");
    }
    PathBuf::from("chronicle.log")
}

fn build_context(args: &Args, config: &Config) -> Result<ResourceContext> {
    let mut client = ApiClient::try_from(config).context("Failed to create API client")?;

    if let Some(token) = args.token.clone().or_else(Config::env_token) {
        client = client.with_decorator(BearerToken::new(token));
    }
    if let Some(locale) = config.effective_locale() {
        client = client.with_decorator(AcceptLanguage::new(locale));
    }

    let cache = QueryCache::with_options(config.cache_options());

    tracing::info!("Using API at {}", client.base_url());

    Ok(ResourceContext::new(client)
        .with_cache(cache)
        .with_retry(RetryPolicy::default().with_max_retries(config.retries())))
}

fn print<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

fn parse_payload(data: &str) -> Result<Value> {
    serde_json::from_str(data).context("--data must be valid JSON")
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::load().with_overrides(args.base_url.clone(), args.locale.clone());
    let ctx = build_context(&args, &config)?;
    let model = |name: &str| -> Result<ResourceModel<Value>> { Ok(ctx.model_by_name(name)?) };

    match &args.command {
        Command::Resources => {
            let resources: Vec<Value> = get_all_resource_names()
                .into_iter()
                .filter_map(get_resource)
                .map(|d| {
                    serde_json::json!({
                        "name": d.name(),
                        "display_name": d.display_name,
                        "section": d.section,
                        "url": d.url(),
                    })
                })
                .collect();
            print(&resources, args.output)?;
        }
        Command::List {
            resource,
            params,
            all,
        } => {
            let params: QueryParams = params.iter().cloned().collect();
            let model = model(resource)?;
            if *all {
                print(&model.list_all(&params).await?, args.output)?;
            } else {
                print(&model.list_page(&params).await?, args.output)?;
            }
            if let Err(e) = config.set_last_resource(resource) {
                tracing::warn!("Failed to save config: {}", e);
            }
        }
        Command::Get { resource, id } => {
            print(&model(resource)?.get(id).await?, args.output)?;
        }
        Command::Create { resource, data } => {
            let payload = parse_payload(data)?;
            print(&model(resource)?.create(&payload).await?, args.output)?;
        }
        Command::Update { resource, id, data } => {
            let payload = parse_payload(data)?;
            print(&model(resource)?.update(id, &payload).await?, args.output)?;
        }
        Command::Delete { resource, id } => {
            model(resource)?.delete(id).await?;
            eprintln!("Deleted {} {}", resource, id);
        }
        Command::Choices { resource } => {
            print(&model(resource)?.choices().await?, args.output)?;
        }
        Command::Label {
            resource,
            value,
            field,
        } => {
            model(resource)?.choices().await?;
            let names = ctx.display_names();
            let label = match field {
                Some(field) => names.resolve_field(resource, field, value),
                None => names.resolve(resource, value),
            };
            println!("{}", label.as_deref().unwrap_or(value));
        }
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    let _log_guard = match setup_logging(args.log_level) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Warning: {err:#}");
            None
        }
    };

    if let Err(err) = run(args).await {
        match err.downcast_ref::<ApiError>() {
            Some(api_err) => {
                tracing::error!("{:?}", api_err);
                eprintln!("Error: {}", format_api_error(api_err));
            }
            None => eprintln!("Error: {err:#}"),
        }
        std::process::exit(1);
    }
}
