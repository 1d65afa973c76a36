use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use channel_exporter::google::{ApiClient, GoogleSessions, ReqwestTransport, RetryPolicy};
use channel_exporter::{output, AppConfig, CancelFlag, Cli, ExportConfig, Pipeline};

const EXIT_FAILED: u8 = 1;
const EXIT_USAGE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = match AppConfig::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {:#}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let config = ExportConfig::from_cli(&cli, &settings);
    if config.channel_handle.is_empty() {
        eprintln!("--channel must not be blank");
        return ExitCode::from(EXIT_USAGE);
    }

    let transport = match ReqwestTransport::new() {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            eprintln!("Failed to initialize HTTP client: {}", e);
            return ExitCode::from(EXIT_FAILED);
        }
    };
    let api = ApiClient::new(
        transport,
        RetryPolicy::new(settings.retry.max_retries, settings.retry_base_delay()),
    );
    let sessions = Arc::new(GoogleSessions::new(config.token_path.clone(), settings.consent_timeout()));

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current request");
            on_interrupt.cancel();
        }
    });

    let started = Instant::now();
    let mut pipeline = Pipeline::new(config, settings, api, sessions)
        .with_cancel_flag(cancel)
        .with_progress(!cli.quiet);

    match pipeline.run().await {
        Ok(result) => {
            if !cli.quiet {
                output::print_summary(&result, started.elapsed());
            }
            ExitCode::SUCCESS
        }
        Err(failure) => {
            output::print_failure(&failure);
            ExitCode::from(failure.error.exit_code())
        }
    }
}
