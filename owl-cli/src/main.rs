mod app;
mod cli;
mod config;
mod error;
mod keep_awake;

use crate::{
    app::{Finished, WatchOptions},
    cli::{Args, Commands, LogFormat},
    config::AppConfig,
    error::{AppError, Result},
};
use clap::{CommandFactory, Parser};
use std::process;
use tracing::{Level, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Exit status after Ctrl-C, as a shell reports SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = init_logging(args.verbose, args.quiet, args.log_format) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    match run(args).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("Application error: {}", e);
            eprintln!("Error: {}", e);
            if matches!(&e, AppError::EventSub(inner) if inner.requires_relogin()) {
                eprintln!("Run open-when-live again to log in.");
            }
            process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<i32> {
    let config = AppConfig::load(args.config.as_deref())?;

    if let Some(Commands::Config { show, reset }) = args.command {
        if reset {
            let path = AppConfig::reset(args.config.as_deref())?;
            println!("✓ Configuration reset to defaults ({})", path.display());
        } else if show {
            println!("{}", config.to_toml()?);
        } else {
            println!("Use --show to display current configuration or --reset to reset to defaults");
        }
        return Ok(0);
    }

    let Some(user) = args.user else {
        Args::command().print_help()?;
        return Ok(0);
    };

    let options = WatchOptions {
        user,
        credentials_path: args.credentials.unwrap_or(config.credentials_path.clone()),
        redirect_port: args.port.unwrap_or(config.redirect_port),
        authorization_timeout: config.authorization_timeout(),
        open_browser: config.open_browser && !args.no_browser,
        keep_awake: config.keep_awake && !args.no_keep_awake,
        session: config.session_config(),
    };

    match app::watch(options).await? {
        Finished::Opened => Ok(0),
        Finished::FirstRun(path) => {
            println!("Created {}.", path.display());
            println!(
                "Fill in clientId and clientSecret with the credentials of your Twitch application \
                 (https://dev.twitch.tv/console/apps), then run again."
            );
            Ok(0)
        }
        Finished::Interrupted => Ok(EXIT_INTERRUPTED),
    }
}

fn init_logging(verbose: bool, quiet: bool, format: LogFormat) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Pretty => subscriber
            .with(fmt::layer().with_target(false).with_level(verbose))
            .try_init(),
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_target(false))
            .try_init(),
    };
    installed.map_err(|e| AppError::Logging(e.to_string()))
}
