//! src/main.rs
//! ============================================================================
//! `pump` host binary: runs TOML scenarios against the event pump and
//! inspects saved handler files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use pump_core::{
    Pump,
    config::{PersistFormat, PersistenceConfig, PumpConfig},
    host::{Scenario, ScriptExecutor, SubjectFilter, VariableInterpolator, Variables},
    logging::LoggerBuilder,
    persistence::EventStore,
};

#[derive(Debug, Parser)]
#[command(name = "pump", version, about = "Drive the event pump from scenario files")]
struct Cli {
    /// Config file; defaults to the platform config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured log level (e.g. `debug`, `pump_core=trace`).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register a scenario's handlers and fire its events in order.
    Run {
        scenario: PathBuf,

        /// Save the surviving handlers here afterwards.
        #[arg(long)]
        save: Option<PathBuf>,

        #[arg(long)]
        format: Option<PersistFormat>,
    },

    /// Print the handlers stored in a saved file.
    Inspect {
        file: PathBuf,

        #[arg(long)]
        format: Option<PersistFormat>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let mut logger = LoggerBuilder::new().with_config(config.logging.clone());
    if let Some(level) = &cli.log_level {
        logger = logger.with_level(level);
    }
    let _guard = logger.build().context("Failed to initialize logging")?;

    match cli.command {
        Command::Run {
            scenario,
            save,
            format,
        } => run(&config, &scenario, save.as_deref(), format),
        Command::Inspect { file, format } => inspect(&config, &file, format),
    }
}

fn load_config(explicit: Option<&Path>) -> Result<PumpConfig> {
    if let Some(path) = explicit {
        return PumpConfig::load_from(path);
    }

    let default_path = PumpConfig::config_path()?;
    if default_path.exists() {
        PumpConfig::load_from(&default_path)
    } else {
        Ok(PumpConfig::default())
    }
}

fn persistence_config(config: &PumpConfig, format: Option<PersistFormat>) -> PersistenceConfig {
    let mut persistence = config.persistence.clone();
    if let Some(format) = format {
        persistence.format = format;
    }
    persistence
}

fn run(
    config: &PumpConfig,
    scenario_path: &Path,
    save: Option<&Path>,
    format: Option<PersistFormat>,
) -> Result<()> {
    let scenario = Scenario::load(scenario_path)?;

    let vars = Variables::new();
    let pump = Pump::builder()
        .with_config(config.pump.clone())
        .with_filter(SubjectFilter)
        .with_executor(ScriptExecutor::new(vars.clone()))
        .with_interpolator(VariableInterpolator::new(vars.clone()))
        .build();

    let accepted = scenario.install(&pump, &vars);
    println!("registered {accepted} of {} handlers", scenario.handler.len());

    for spec in &scenario.fire {
        let instance = spec.to_instance(&vars);
        let label = if instance.id.is_empty() {
            instance.name.to_string()
        } else {
            format!("{} #{}", instance.name, instance.id)
        };

        let before = pump.wml_tracking();
        pump.set_context_mutated(false);
        let mutated = pump.fire_instance(instance);
        println!(
            "{label:<32} mutated={mutated:<5} ran={}",
            pump.wml_tracking() - before
        );
    }

    let pending = pump.pending_len();
    if pending > 0 {
        debug!(pending, "Events left queued after the last fire");
        println!("{pending} events still queued");
    }

    if let Some(path) = save {
        let store = EventStore::new(path, persistence_config(config, format));
        let saved = store
            .save(&pump)
            .with_context(|| format!("Failed to save handlers to {}", path.display()))?;
        store.cleanup();
        println!("saved {saved} handlers to {}", path.display());
    }

    info!(handlers = pump.handler_count(), "Scenario finished");
    Ok(())
}

fn inspect(config: &PumpConfig, file: &Path, format: Option<PersistFormat>) -> Result<()> {
    let store = EventStore::new(file, persistence_config(config, format));
    let records = store
        .load()
        .with_context(|| format!("Failed to load handlers from {}", file.display()))?;

    println!("{} handlers in {}", records.len(), file.display());
    for record in &records {
        if record.id.is_empty() {
            println!("  {}  {}", record.name, record.payload);
        } else {
            println!("  {} #{}  {}", record.name, record.id, record.payload);
        }
    }
    Ok(())
}
