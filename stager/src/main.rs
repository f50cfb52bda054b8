mod config;

use clap::{Parser, Subcommand};
use config::{Config, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(about = "Project staging and fan-out trigger service")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the trigger endpoints
    Run {
        #[arg(long, short)]
        config: PathBuf,
    },
    /// Load and validate a config file, then exit
    Validate {
        #[arg(long, short)]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        CliCommand::Validate { config } => match Config::from_file(&config) {
            Ok(_) => println!("{} is valid", config.display()),
            Err(e) => {
                eprintln!("Invalid config {}: {e}", config.display());
                process::exit(1);
            }
        },
        CliCommand::Run { config } => {
            let config = match Config::from_file(&config) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Could not load config {}: {e}", config.display());
                    process::exit(1);
                }
            };

            // Held for the lifetime of the process so buffered events flush on exit.
            let _sentry = init_logging(&config.common.logging);

            if let Some(metrics_config) = &config.common.metrics {
                init_metrics(metrics_config);
            }

            let rt = match tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to build runtime");
                    process::exit(1);
                }
            };

            tracing::info!("Starting stager");
            if let Err(e) = rt.block_on(functions::run(config.functions)) {
                tracing::error!(error = %e, "Stager exited");
                process::exit(1);
            }
        }
    }
}

fn init_logging(config: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    guard
}

fn init_metrics(config: &MetricsConfig) {
    let recorder = match StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some(config.prefix.as_str()))
    {
        Ok(recorder) => recorder,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create statsd recorder, metrics disabled");
            return;
        }
    };

    if let Err(e) = metrics::set_global_recorder(recorder) {
        tracing::error!(error = %e, "Failed to install metrics recorder");
        return;
    }

    shared::metrics_defs::describe_all(functions::metrics_defs::ALL_METRICS);
    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "Sending metrics to statsd"
    );
}
