use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use graphverb::config::{Config, GraphSettings};
use graphverb::graph::{
    AuthContext, CallKind, Content, EnvToken, GraphClient, Headers, Method, QueryOptions,
    RequestSpec,
};
use graphverb::{describe_error, GraphError};
use serde_json::Value;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Call a Graph-style OData API from the terminal
#[derive(Parser, Debug)]
#[command(name = "graphverb", version, about, long_about = None)]
struct Args {
    /// HTTP method (GET, POST, PUT, PATCH, DELETE)
    method: String,

    /// Resource path relative to the base address, or an absolute next-link
    path: String,

    /// Properties to return ($select)
    #[arg(long, value_delimiter = ',')]
    select: Vec<String>,

    /// Relations to expand ($expand)
    #[arg(long, value_delimiter = ',')]
    expand: Vec<String>,

    /// Filter expression ($filter)
    #[arg(long)]
    filter: Option<String>,

    /// Ordering clause ($orderby), repeatable
    #[arg(long = "order-by")]
    order_by: Vec<String>,

    /// Rows to skip ($skip)
    #[arg(long, allow_negative_numbers = true)]
    skip: Option<i64>,

    /// Rows to return ($top)
    #[arg(long, allow_negative_numbers = true)]
    top: Option<i64>,

    /// Preferred server page size
    #[arg(long, allow_negative_numbers = true)]
    page_size: Option<i64>,

    /// Ask for @odata.count
    #[arg(long)]
    count: bool,

    /// Free-text search ($search)
    #[arg(long)]
    search: Option<String>,

    /// Extra header as "Name: value", repeatable
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body: inline JSON/text, or @path to read it from a file
    #[arg(short, long)]
    body: Option<String>,

    /// Follow next-links and print every item (GET only)
    #[arg(long)]
    all: bool,

    /// Service root (overrides config and GRAPH_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Schema version segment (overrides config and GRAPH_SCHEMA_VERSION)
    #[arg(long)]
    schema_version: Option<String>,

    /// Remember --base-url / --schema-version for later runs
    #[arg(long)]
    save_config: bool,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,
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
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("graphverb started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("graphverb").join("graphverb.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".graphverb").join("graphverb.log");
    }
    PathBuf::from("graphverb.log")
}

fn query_options(args: &Args) -> QueryOptions {
    let mut options = QueryOptions::new()
        .select(args.select.iter().cloned())
        .expand(args.expand.iter().cloned())
        .count(args.count);
    options.filter = args.filter.clone();
    options.order_by = args.order_by.clone();
    options.skip = args.skip;
    options.top = args.top;
    options.max_page_size = args.page_size;
    options.search = args.search.clone();
    options
}

fn request_headers(args: &Args) -> Result<Headers> {
    let mut headers = Headers::new();
    for line in &args.headers {
        let (name, value) = Headers::parse_line(line)?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn request_body(raw: &str) -> Result<Content> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read body from {}", path))?,
        None => raw.to_string(),
    };

    Ok(match serde_json::from_str::<Value>(&text) {
        Ok(object @ Value::Object(_)) => Content::json(object),
        _ => Content::text(text),
    })
}

fn settings(args: &Args) -> Result<GraphSettings> {
    let mut config = Config::load();
    if let Some(base_url) = &args.base_url {
        config.base_url = Some(base_url.clone());
    }
    if let Some(version) = &args.schema_version {
        config.schema_version = Some(version.clone());
    }
    if args.save_config {
        config.save()?;
    }

    // CLI flags beat the environment; the environment beats the file.
    let base_url = args
        .base_url
        .clone()
        .unwrap_or_else(|| config.effective_base_url());
    let schema_version = args
        .schema_version
        .clone()
        .unwrap_or_else(|| config.effective_schema_version());

    Ok(GraphSettings::new(&base_url, &schema_version)?)
}

/// The call described on the command line, with headers and body checked
fn request_spec(args: &Args) -> graphverb::Result<RequestSpec> {
    let method: Method = args.method.parse()?;
    let headers =
        request_headers(args).map_err(|e| GraphError::invalid_argument(e.to_string()))?;

    let mut spec = RequestSpec::new(method, args.path.as_str())
        .with_query(query_options(args))
        .with_headers(headers);
    if let Some(raw) = &args.body {
        let body = request_body(raw).map_err(|e| GraphError::invalid_argument(e.to_string()))?;
        spec = spec.with_body(body);
    }
    Ok(spec)
}

async fn run(args: &Args, client: &GraphClient) -> graphverb::Result<Value> {
    let spec = request_spec(args)?;

    if args.all {
        let items = client.invoke_all(&spec).await?;
        return Ok(Value::Array(items));
    }

    let kind = CallKind::for_options(spec.query());
    let output = client.invoke(&spec, kind).await?;
    Ok(output.to_json())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_guard = setup_logging(args.log_level)?;

    let settings = settings(&args)?;
    tracing::info!("Using base address: {}", settings.base_address());

    let cancel = CancellationToken::new();
    let client = GraphClient::new(settings, AuthContext::from_provider(EnvToken::default()))?
        .with_cancellation(cancel.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling in-flight request");
            cancel.cancel();
        }
    });

    match run(&args, &client).await {
        Ok(Value::Null) => Ok(()),
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(err) => {
            eprintln!("Error: {}", describe_error(&err));
            if let GraphError::Api { body, .. } = &err {
                if !body.is_empty() {
                    eprintln!("{}", body);
                }
            }
            drop(log_guard);
            std::process::exit(1);
        }
    }
}
