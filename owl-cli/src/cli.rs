use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Open a Twitch stream in your browser the moment it goes live.
#[derive(Parser, Debug)]
#[command(name = "open-when-live", version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Twitch user name or numeric user id to wait for
    #[arg(value_name = "USER")]
    pub user: Option<String>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, env = "OWL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Credential file holding the client id/secret and tokens
    #[arg(long, env = "OWL_CREDENTIALS")]
    pub credentials: Option<PathBuf>,

    /// Local port for the OAuth redirect
    #[arg(long)]
    pub port: Option<u16>,

    /// Print URLs instead of opening the browser
    #[arg(long)]
    pub no_browser: bool,

    /// Do not keep the machine awake while waiting (macOS)
    #[arg(long)]
    pub no_keep_awake: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show or reset the configuration file
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,

        /// Overwrite the configuration file with defaults
        #[arg(long, conflicts_with = "show")]
        reset: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}
