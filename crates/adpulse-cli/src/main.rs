mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use adpulse_core::{ErrorInfo, LogFormat, LoggingSettings, PipelineError};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::run::RunArgs;

#[derive(Debug, Parser)]
#[command(name = "adpulse")]
#[command(about = "Campaign performance analytics and hypothesis validation")]
struct Cli {
    /// YAML configuration file; built-in defaults apply when omitted
    #[arg(long, global = true, env = "ADPULSE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Analyse a campaign dataset and validate hypotheses about it
    Run(RunArgs),
    /// Load and validate the configuration, then print the effective values
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = match adpulse_core::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => return Ok(report_failure(&ErrorInfo::from(&PipelineError::from(err)))),
    };
    init_tracing(&config.logging)?;

    match cli.command {
        Commands::Run(args) => {
            let report = run::run_analysis(config, &args).await?;
            match &report.failure {
                Some(failure) => Ok(report_failure(failure)),
                None => {
                    run::print_report(&report, &args.output_dir);
                    Ok(ExitCode::SUCCESS)
                }
            }
        }
        Commands::CheckConfig => {
            print!("{}", serde_yaml::to_string(&config)?);
            println!("configuration OK");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(settings: &LoggingSettings) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(settings.level.clone()))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    match settings.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
    Ok(())
}

fn report_failure(failure: &ErrorInfo) -> ExitCode {
    eprintln!("{}: {}", failure.error_type, failure.error_message);
    ExitCode::FAILURE
}
