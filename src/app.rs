use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::domain::api_config::ApiConfig;
use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::ConfigService;
use crate::interfaces::cli::{execute, Cli};

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
            error!(error = %err, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config, cli.verbose))
        .try_init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(execute(cli.command, config)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %err, "Command failed");
            eprintln!("{}", err.user_message());
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<ApiConfig> {
    let mut config = ConfigService::with_path(&cli.config).load()?;
    if let Some(api_url) = &cli.api_url {
        config.base_url = api_url.clone();
    }
    if config.base_url.trim().is_empty() {
        return Err(AppError::ConfigError("API base URL is empty".to_string()));
    }
    Ok(config)
}

/// `RUST_LOG` wins, then `-v`/`-vv`, then the configured level.
fn env_filter(config: &ApiConfig, verbose: u8) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = match verbose {
        0 => config.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}
