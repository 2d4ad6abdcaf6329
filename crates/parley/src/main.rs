// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parley - a Telegram chatbot for OpenAI-compatible chat models.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use parley_agent::ShutdownReason;
use parley_config::ParleyConfig;
use parley_core::AIModel;

/// Parley - a Telegram chatbot for OpenAI-compatible chat models.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Start the bot and poll Telegram for updates.
    Serve,
    /// Validate the configuration and print a summary.
    CheckConfig,
    /// List the supported models.
    Models,
}

fn load_config(path: Option<&PathBuf>) -> ParleyConfig {
    let loaded = match path {
        Some(path) => parley_config::load_and_validate_path(path),
        None => parley_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            parley_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve) => {
            let config = load_config(cli.config.as_ref());
            if let Err(errors) = parley_config::require_serve_keys(&config) {
                parley_config::render_errors(&errors);
                std::process::exit(1);
            }
            serve::init_tracing(&config.bot.log_level);

            match serve::run_serve(config).await {
                Ok(ShutdownReason::Upgrade) => {
                    let err = reexec();
                    eprintln!("error: failed to restart after upgrade: {err}");
                    std::process::exit(1);
                }
                Ok(ShutdownReason::Signal) => {}
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::CheckConfig) => {
            let config = load_config(cli.config.as_ref());
            print!("{}", config_summary(&config));
        }
        Some(Commands::Models) => {
            let config = load_config(cli.config.as_ref());
            print!("{}", models_listing(&config.provider.default_model));
        }
        None => {
            println!("parley: use --help for available commands");
        }
    }
}

fn config_summary(config: &ParleyConfig) -> String {
    let set = |value: &Option<String>| {
        if value.as_deref().is_some_and(|v| !v.is_empty()) {
            "set"
        } else {
            "not set"
        }
    };
    format!(
        "parley: configuration is valid\n\
         bot.name            {}\n\
         bot.log_level       {}\n\
         bot.sudoers         {}\n\
         telegram.bot_token  {}\n\
         provider.api_key    {}\n\
         provider.endpoint   {}\n\
         models              {} (fallback {})\n\
         search.api_key      {}\n\
         storage             {}\n",
        config.bot.name,
        config.bot.log_level,
        config.bot.sudoers.len(),
        set(&config.telegram.bot_token),
        set(&config.provider.api_key),
        config.provider.endpoint,
        config.provider.default_model,
        config.provider.fallback_model,
        set(&config.search.api_key),
        config.storage.database_path,
    )
}

fn models_listing(default_model: &str) -> String {
    AIModel::identifiers()
        .into_iter()
        .map(|id| {
            if id == default_model {
                format!("{id} (default)\n")
            } else {
                format!("{id}\n")
            }
        })
        .collect()
}

/// Replaces the process with a fresh copy of the (upgraded) binary.
///
/// Only returns on failure.
#[cfg(unix)]
fn reexec() -> std::io::Error {
    use std::os::unix::process::CommandExt;

    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => return e,
    };
    tracing::info!(exe = %exe.display(), "restarting after upgrade");
    std::process::Command::new(exe)
        .args(std::env::args_os().skip(1))
        .exec()
}

#[cfg(not(unix))]
fn reexec() -> std::io::Error {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => return e,
    };
    match std::process::Command::new(exe)
        .args(std::env::args_os().skip(1))
        .spawn()
    {
        Ok(_) => std::process::exit(0),
        Err(e) => e,
    }
}
