use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use nitfinder::batch::{export_batch_summary, BatchRunner, CancellationFlag};
use nitfinder::cli::Cli;
use nitfinder::config::AppConfig;
use nitfinder::export::export_results;
use nitfinder::geo::{GeoReference, GeoResolver};
use nitfinder::logger::{BatchLogger, VerbosityLevel};
use nitfinder::sheet::read_identifiers;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbosity: VerbosityLevel) {
    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.tracing_directive()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn run(cli: Cli) -> Result<()> {
    if cli.init {
        let path = AppConfig::create_default_config().context("Failed to create configuration file")?;
        println!("✅ Created default configuration file at: {}", path.display());
        println!("   Edit this file to customize settings, then run nitfinder again.");
        return Ok(());
    }

    cli.validate().map_err(|e| anyhow::anyhow!("Invalid arguments: {}", e))?;

    let verbosity = VerbosityLevel::from_verbose_count(cli.verbose);
    init_tracing(verbosity);
    let logger = match &cli.log_file {
        Some(path) => BatchLogger::with_log_file(verbosity, path),
        None => BatchLogger::new(verbosity),
    };

    let mut config = AppConfig::load(cli.config.as_deref()).context("Configuration error")?;
    cli.apply_overrides(&mut config).context("Configuration error")?;

    // Input problems are fatal before any request goes out
    let Some(input) = cli.input.as_deref() else {
        anyhow::bail!("An input file is required (use --input)");
    };
    let identifiers = read_identifiers(input, &config.input.identifier_column)?;
    logger.record_input_file(input);
    logger.info(&format!("Read {} rows from {}", identifiers.len(), input.display()));

    let resolver = match cli.geo_reference_path(&config) {
        Some(path) => Some(load_resolver(&path, &config, &logger)?),
        None => None,
    };

    let mut runner = BatchRunner::from_config(&config, resolver)?;

    let cancel = CancellationFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_flag.is_cancelled() {
            eprintln!("\n⚠️  Second interrupt, exiting without writing results.");
            std::process::exit(130);
        }
        handler_flag.cancel();
        eprintln!("\n⚠️  Interrupt received. Finishing the current row and writing partial results...");
    })
    .unwrap_or_else(|e| {
        logger.warn(&format!("Failed to set Ctrl-C handler: {}. Interrupts will stop the run immediately.", e));
    });

    let run = runner.run(&identifiers, &logger, &cancel).await?;

    export_results(&run.table, &cli.output)?;
    logger.log_export_success(&cli.output);

    if let Some(summary_path) = &cli.summary {
        export_batch_summary(&run.summary, summary_path)?;
        logger.info(&format!("Run summary written to {}", summary_path.display()));
    }

    if let Err(e) = logger.export_logs() {
        logger.error(&format!("Failed to export logs: {}", e));
    }
    logger.print_final_summary();

    Ok(())
}

fn load_resolver(path: &Path, config: &AppConfig, logger: &BatchLogger) -> Result<GeoResolver> {
    let reference = GeoReference::load(path, &config.geo)?;
    if reference.is_empty() {
        logger.warn(&format!("DANE reference {} has no rows, every code will be 'No encontrado'", path.display()));
    }
    logger.record_geo_reference(path);
    Ok(GeoResolver::new(reference))
}
