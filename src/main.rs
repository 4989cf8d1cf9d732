//! Iterative Programmer CLI
//!
//! Synthesizes a program for a natural-language instruction and prints the
//! run report as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use iterative_programmer::{
    CommandGenerator, ControllerConfig, IterationController, ProgrammerConfig, PythonSandbox,
    Result, SafetyAnalyzer, Validate,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        let program = args.first().map(String::as_str).unwrap_or("iterative-programmer");
        eprintln!("Usage: {} <instruction>", program);
        eprintln!("\nGenerates, checks, runs and repairs a Python program for the instruction.");
        eprintln!("\nEnvironment variables:");
        eprintln!("  PROGRAMMER_CONFIG=<path>   TOML or YAML run configuration");
        eprintln!("  PROGRAMMER_OUTPUT=<path>   Where to write the accepted source");
        std::process::exit(2);
    }

    let instruction = args[1..].join(" ");
    let config_path = std::env::var_os("PROGRAMMER_CONFIG").map(PathBuf::from);
    let output_path = std::env::var_os("PROGRAMMER_OUTPUT").map(PathBuf::from);

    match run(&instruction, config_path, output_path).await {
        Ok(accepted) => {
            if !accepted {
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn run(
    instruction: &str,
    config_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
) -> Result<bool> {
    let config = match &config_path {
        Some(path) => ProgrammerConfig::load(path)?,
        None => ProgrammerConfig::default(),
    };

    for warning in config.validate().into_result()? {
        tracing::warn!(warning = %warning, "configuration warning");
    }

    let capabilities = config.sandbox.capabilities.clone();
    let executor = PythonSandbox::new(capabilities.clone())
        .with_interpreter(&config.sandbox.interpreter)
        .with_max_output_bytes(config.sandbox.max_output_bytes);
    let generator = CommandGenerator::new(config.generator.clone());

    let controller = IterationController::new(
        Arc::new(generator),
        Arc::new(executor),
        SafetyAnalyzer::new(capabilities),
        ControllerConfig::from(&config),
    );

    tracing::info!(
        config = ?config_path,
        budget = config.retry_budget,
        invocation = %config.invocation,
        "starting synthesis"
    );

    let completed = controller.run(instruction, &config.assertion_set()).await?;
    println!("{}", completed.report.to_json()?);

    if let Some(path) = output_path {
        completed.report.persist(&path)?;
    }

    Ok(completed.report.is_accepted())
}
