pub mod aggregate;
pub mod batch;
pub mod cli;
pub mod coerce;
pub mod config;
pub mod consolidate;
pub mod data;
pub mod error;
pub mod export;
pub mod filter;
pub mod frequency;
pub mod ingest;
pub mod io_utils;
pub mod repl;
pub mod report;
pub mod session;
pub mod stats;
pub mod store;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{ClearArgs, Cli, Commands, ConfigArgs, IngestArgs, StoreArgs},
    config::DashboardConfig,
    error::Severity,
    ingest::Upload,
    session::{Dashboard, Event},
    store::CsvStore,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sales_dashboard", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Ingest(args) => handle_ingest(&args),
        Commands::Report(args) => report::execute(&args),
        Commands::Export(args) => export::execute(&args),
        Commands::Clear(args) => handle_clear(&args),
        Commands::Session(args) => repl::execute(&args),
        Commands::Config(args) => handle_config(&args),
    }
}

/// Dashboard over the flat-file store named by `args`.
pub fn open_dashboard(args: &StoreArgs) -> Result<Dashboard<CsvStore>> {
    let config = args.resolve()?;
    debug!(
        "Store {:?}; uploads use delimiter '{}' and decimal separator '{}'",
        config.store,
        io_utils::printable_delimiter(config.delimiter()?),
        config.csv.decimal_separator
    );
    let store = CsvStore::new(config.store.clone());
    Ok(Dashboard::new(config, store))
}

fn handle_ingest(args: &IngestArgs) -> Result<()> {
    let dashboard = open_dashboard(&args.store)?;
    info!("Ingesting {:?}", args.input);
    let upload =
        Upload::from_path(&args.input).with_context(|| format!("Reading {:?}", args.input))?;
    let state = dashboard.startup();
    if let Some(problem) = state.diagnostics.first() {
        return Err(anyhow!(
            "{}; refusing to overwrite the store",
            problem.message
        ));
    }
    let before = state.dataset.row_count();
    let state = dashboard.update(state, Event::Upload(upload));
    for diagnostic in &state.diagnostics {
        match diagnostic.severity {
            Severity::Error => {}
            Severity::Warning => eprintln!("warning: {}", diagnostic.message),
            Severity::Info => println!("{}", diagnostic.message),
        }
    }
    if let Some(failure) = state
        .diagnostics
        .iter()
        .find(|d| d.severity == Severity::Error)
    {
        return Err(anyhow!(failure.message.clone()));
    }
    info!(
        "Dataset now holds {} row(s) ({} before)",
        state.dataset.row_count(),
        before
    );
    Ok(())
}

fn handle_clear(args: &ClearArgs) -> Result<()> {
    if !args.yes {
        return Err(anyhow!(
            "Clearing deletes all consolidated data; re-run with --yes to confirm"
        ));
    }
    let dashboard = open_dashboard(&args.store)?;
    let path = dashboard.store().path().to_path_buf();
    let state = dashboard.update(dashboard.startup(), Event::Clear { confirmed: true });
    for diagnostic in &state.diagnostics {
        if diagnostic.severity != Severity::Info {
            eprintln!("warning: {}", diagnostic.message);
        }
    }
    info!("Cleared consolidated data at {path:?}");
    Ok(())
}

fn handle_config(args: &ConfigArgs) -> Result<()> {
    DashboardConfig::default()
        .save(&args.output)
        .with_context(|| format!("Writing configuration to {:?}", args.output))?;
    info!("Default configuration written to {:?}", args.output);
    Ok(())
}
