//! KOE CLI - Command-line interface for the change-order claim engine.

use clap::Parser;
use koe_cli::commands;
use koe_cli::{Cli, Command, Config, Formatter};
use koe_domain::{AccelerationProjection, CaseProjection};
use koe_store::SqliteStore;
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Log to stderr; `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn run(cli: Cli) -> koe_cli::Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::path()?,
    };
    let config = Config::load_from(&config_path)?;

    let format = cli.format.map(Into::into).unwrap_or(config.settings.format);
    let color_enabled = !cli.no_color && config.settings.color;
    let formatter = Formatter::new(format, color_enabled);

    match cli.command {
        Command::Preclusion(args) => commands::execute_preclusion(args, &config.engine.preclusion, &formatter),
        Command::Grade(args) => commands::execute_grade(args, &formatter),
        Command::Consequence(args) => commands::execute_consequence(args, &formatter),
        Command::Config(args) => commands::execute_config(args, &config, &config_path, &formatter),
        Command::Append(args) => {
            let mut store = open_store(&config, cli.db.as_deref())?;
            commands::execute_append(args, &mut store, &formatter)
        }
        Command::Status(args) => {
            let store = open_store(&config, cli.db.as_deref())?;
            let projection = CaseProjection::new(&config.engine);
            let accelerations = AccelerationProjection::new(&config.engine.acceleration);
            commands::execute_status(args, &store, &projection, &accelerations, &formatter)
        }
        Command::Log(args) => commands::execute_log(args, &open_store(&config, cli.db.as_deref())?, &formatter),
        Command::Cases => commands::execute_cases(&open_store(&config, cli.db.as_deref())?, &formatter),
        Command::Forsering(args) => {
            let mut store = open_store(&config, cli.db.as_deref())?;
            let projection = CaseProjection::new(&config.engine);
            let accelerations = AccelerationProjection::new(&config.engine.acceleration);
            commands::execute_forsering(args, &mut store, &projection, &accelerations, &formatter)
        }
    }
}

/// Open the case database, creating its directory on first use.
fn open_store(config: &Config, overridden: Option<&Path>) -> koe_cli::Result<SqliteStore> {
    let db_path = config.database_path(overridden)?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracing::debug!("Using case database {}", db_path.display());
    Ok(SqliteStore::with_config(&db_path, &config.engine)?)
}
