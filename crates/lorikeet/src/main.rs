// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lorikeet - operator CLI for the LoRaWAN device-management core.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lorikeet_core::DevEui;

/// Lorikeet - LoRaWAN device activation and downlink queue management.
#[derive(Parser, Debug)]
#[command(name = "lorikeet", version, about, long_about = None)]
struct Cli {
    /// Configuration file to use instead of the standard search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database and apply pending migrations.
    Init,
    /// Validate the configuration.
    Check {
        /// Print the effective configuration as TOML.
        #[arg(long)]
        print: bool,
    },
    /// Inspect registered devices.
    Devices {
        #[command(subcommand)]
        action: DevicesAction,
    },
    /// Draw a free random DevAddr for a device.
    DevAddr { dev_eui: DevEui },
    /// Manage join-request nonce history.
    Nonces {
        #[command(subcommand)]
        action: NoncesAction,
    },
    /// Inspect or flush a device's downlink queue.
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Inspect or remove a device's session.
    Activation {
        #[command(subcommand)]
        action: ActivationAction,
    },
}

#[derive(Subcommand, Debug)]
enum DevicesAction {
    /// List devices.
    List {
        /// Case-insensitive name filter.
        #[arg(long)]
        search: Option<String>,
        /// Maximum number of devices (0 lists all).
        #[arg(long, default_value_t = 0)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
        /// Output JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum NoncesAction {
    /// Forget every consumed DevNonce of a device.
    Flush { dev_eui: DevEui },
}

#[derive(Subcommand, Debug)]
enum QueueAction {
    /// Show the pending downlinks in delivery order.
    Show {
        dev_eui: DevEui,
        #[arg(long)]
        json: bool,
    },
    /// Remove every queued downlink.
    Flush { dev_eui: DevEui },
}

#[derive(Subcommand, Debug)]
enum ActivationAction {
    /// Show the live session (keys are not printed).
    Show {
        dev_eui: DevEui,
        #[arg(long)]
        json: bool,
    },
    /// Destroy the live session.
    Deactivate { dev_eui: DevEui },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => lorikeet_config::load_and_validate_path(path),
        None => lorikeet_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            lorikeet_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.server.log_level);

    let result = match cli.command {
        Some(Commands::Init) => commands::init(&config).await,
        Some(Commands::Check { print }) => commands::check(&config, print),
        Some(Commands::Devices {
            action:
                DevicesAction::List {
                    search,
                    limit,
                    offset,
                    json,
                },
        }) => commands::list_devices(&config, search, limit, offset, json).await,
        Some(Commands::DevAddr { dev_eui }) => commands::dev_addr(&config, dev_eui).await,
        Some(Commands::Nonces {
            action: NoncesAction::Flush { dev_eui },
        }) => commands::flush_nonces(&config, dev_eui).await,
        Some(Commands::Queue { action }) => match action {
            QueueAction::Show { dev_eui, json } => {
                commands::show_queue(&config, dev_eui, json).await
            }
            QueueAction::Flush { dev_eui } => commands::flush_queue(&config, dev_eui).await,
        },
        Some(Commands::Activation { action }) => match action {
            ActivationAction::Show { dev_eui, json } => {
                commands::show_activation(&config, dev_eui, json).await
            }
            ActivationAction::Deactivate { dev_eui } => {
                commands::deactivate(&config, dev_eui).await
            }
        },
        None => {
            println!("lorikeet: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error [{}]: {e}", e.kind());
        std::process::exit(1);
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lorikeet={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_queue_show() {
        let cli = Cli::try_parse_from(["lorikeet", "queue", "show", "0011223344556677", "--json"])
            .unwrap();
        match cli.command {
            Some(Commands::Queue {
                action: QueueAction::Show { dev_eui, json },
            }) => {
                assert_eq!(dev_eui.to_string(), "0011223344556677");
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_dev_eui() {
        assert!(Cli::try_parse_from(["lorikeet", "dev-addr", "not-hex"]).is_err());
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = lorikeet_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.server.name, "lorikeet");
    }
}
