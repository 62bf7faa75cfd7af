mod cli;
mod config;
mod errors;
mod processing;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing::{
    error,
    info,
};
use tracing_bunyan_formatter::{
    BunyanFormattingLayer,
    JsonStorageLayer,
};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use cli::Cli;
use config::{
    Config,
    InputConfig,
};
use errors::CliError;

#[cfg(target_os = "windows")]
use mimalloc::MiMalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn init_logging(json_logs: bool) {
    // This uses RUST_LOG environment variable
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    if json_logs {
        let formatting_layer = BunyanFormattingLayer::new("xlseek".into(), std::io::stdout);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(JsonStorageLayer)
            .with(formatting_layer)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

fn run(args: Cli) -> Result<(), CliError> {
    let mut config = Config::from_file(&args.config)?;
    config.apply_cli_args(&args)?;

    let Some(InputConfig::Json { path }) = config.input.clone() else {
        return Err(CliError::Config {
            source: "No input provided, please provide one in either the config file or with the --input flag".to_string(),
        });
    };
    let Some(output_config) = config.output.clone() else {
        return Err(CliError::Config {
            source: "No output directory provided, please provide one in either the config file or with the --output-dir flag".to_string(),
        });
    };
    info!("Parsed configuration: {:#?}", config);

    std::fs::create_dir_all(&output_config.directory)
        .map_err(|e| CliError::io(e, &output_config.directory))?;
    info!("Created output directory {}", output_config.directory.display());

    let summary = processing::process_input(path, &config.search, &output_config)?;
    println!(
        "Processed {} scans, wrote {} results ({} top)",
        summary.scans_processed, summary.results, summary.top_results
    );
    println!("Finished in {} ms", summary.elapsed_ms);
    Ok(())
}

fn main() {
    let args = Cli::parse();
    init_logging(args.json_logs);

    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}
