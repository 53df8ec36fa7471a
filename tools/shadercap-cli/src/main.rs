//! Shadercap CLI: capture a shader to video, check the encoder, edit settings.
//!
//! Usage:
//!   shadercap capture <URL> [OPTIONS]   Capture a shader page to MP4/GIF
//!   shadercap check                     Check the encoder installation
//!   shadercap config show               Print the current configuration
//!   shadercap config set <KEY> <VALUE>  Change an export preference

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use shadercap_common::config::{config_file_path, AppConfig};

mod commands;

#[derive(Parser)]
#[command(
    name = "shadercap",
    about = "Frame-exact shader capture to MP4 and GIF",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/shadercap/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a shader page frame by frame and encode it
    Capture {
        /// Shader page URL
        url: String,

        #[command(flatten)]
        overrides: commands::capture::Overrides,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// Disable the browser sandbox (containers, CI)
        #[arg(long)]
        no_sandbox: bool,

        /// Browser executable; auto-detected when unset
        #[arg(long)]
        browser: Option<PathBuf>,
    },

    /// Check that the encoder can be found and runs
    Check,

    /// Show or change persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the configuration as JSON
    Show,
    /// Print the config file location
    Path,
    /// Set an export preference (e.g. `fps 30`, `gif true`)
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(config_file_path);
    let config = AppConfig::load_from(&config_path);

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    shadercap_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Capture {
            url,
            overrides,
            headed,
            no_sandbox,
            browser,
        } => {
            let browser = commands::capture::BrowserOptions {
                headed,
                no_sandbox,
                executable: browser,
            };
            commands::capture::run(&config_path, url, overrides, browser).await
        }
        Commands::Check => commands::check::run(&config),
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&config),
            ConfigAction::Path => {
                println!("{}", config_path.display());
                Ok(())
            }
            ConfigAction::Set { key, value } => commands::config::set(&config_path, &key, &value),
        },
    }
}
