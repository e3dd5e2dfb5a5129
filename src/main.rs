use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;

use boarding_mock_lib::{
    logging, DemoConfig, DemoStore, Dispatcher, Method, RequestBody, RouteTable, SeedData,
    StorageHandle, StorageScopes,
};

#[derive(Debug, Parser)]
#[command(name = "boarding-mock", about = "Pet boarding demo backend", version)]
struct Cli {
    /// Directory holding persisted state. Defaults to the platform data dir.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Seed JSON to use instead of the bundled demo data.
    #[arg(long, global = true)]
    seed: Option<PathBuf>,

    /// JSON file with configuration overrides.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Start a fresh session, discarding previous mutations.
    #[arg(long, global = true)]
    new_session: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send one request through the dispatcher and print the response.
    Request {
        method: String,
        url: String,
        /// Request body; parsed as JSON when possible.
        #[arg(long)]
        body: Option<String>,
    },
    /// Replace persisted state with the seed data.
    Reset,
    /// List the route table in match order.
    Routes,
}

fn main() {
    logging::init_logging();

    let cli = Cli::parse();
    match handle_cli(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

fn handle_cli(cli: Cli) -> Result<i32> {
    match &cli.command {
        Commands::Routes => {
            print_routes(&RouteTable::standard());
            Ok(0)
        }
        Commands::Reset => {
            let seed = load_seed(cli.seed.as_deref())?;
            let mut dispatcher = open_dispatcher(&cli)?;
            dispatcher.store_mut().reset(&seed);
            let collections = dispatcher.store().collection_names().count();
            print_json(&json!({ "reset": true, "collections": collections }))?;
            Ok(0)
        }
        Commands::Request { method, url, body } => {
            let method = Method::from_str(method).context("parse request method")?;
            let body = body.clone().map(RequestBody::Text).unwrap_or_default();
            let mut dispatcher = open_dispatcher(&cli)?;
            let response = dispatcher.handle(method, url, body);
            print_json(&response)?;
            Ok(if response.is_success() { 0 } else { 1 })
        }
    }
}

fn default_data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("determine platform data directory")?;
    Ok(base.join("boarding-mock"))
}

fn load_config(path: Option<&Path>) -> Result<DemoConfig> {
    let config = match path {
        Some(path) => DemoConfig::from_file(path)
            .with_context(|| format!("load configuration from {}", path.display()))?,
        None => DemoConfig::default(),
    };
    config
        .with_env_overrides()
        .context("apply environment configuration overrides")
}

fn load_seed(path: Option<&Path>) -> Result<SeedData> {
    match path {
        Some(path) => SeedData::from_file(path, Utc::now())
            .with_context(|| format!("load seed from {}", path.display())),
        None => SeedData::bundled(Utc::now()).context("load bundled seed"),
    }
}

/// Both storage scopes live on disk so state carries across invocations.
fn open_dispatcher(cli: &Cli) -> Result<Dispatcher> {
    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => default_data_dir()?,
    };
    let config = load_config(cli.config.as_deref())?;
    let durable = StorageHandle::file(data_dir.join("durable"))
        .with_context(|| format!("open durable storage under {}", data_dir.display()))?;
    let session = StorageHandle::file(data_dir.join("session"))
        .with_context(|| format!("open session storage under {}", data_dir.display()))?;
    if cli.new_session {
        session
            .remove(&config.session_key)
            .context("clear session marker")?;
    }

    let seed = load_seed(cli.seed.as_deref())?;
    let store = DemoStore::initialize(&seed, StorageScopes::new(durable, session), config);
    tracing::debug!(
        target: "boarding_mock",
        event = "cli_store_opened",
        origin = store.origin().as_str(),
        data_dir = %data_dir.display()
    );
    Ok(Dispatcher::new(store))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let serialized = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{serialized}");
    Ok(())
}

fn print_routes(routes: &RouteTable) {
    let width = routes
        .iter()
        .map(|route| route.pattern().len())
        .max()
        .unwrap_or(0);
    for route in routes.iter() {
        println!(
            "{:<width$}  {:<12}  {}",
            route.pattern(),
            route.resource(),
            route.action().unwrap_or("-"),
        );
    }
}
