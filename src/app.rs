//! Application orchestration and command routing.
//!
//! Handles command-line argument parsing and delegates to appropriate command handlers.

use crate::commands;
use crate::logging;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::process;

/// A terminal voice-memo recorder with live level metering and waveform playback
#[derive(Parser)]
#[command(name = "vmemo")]
#[command(version)]
#[command(about = "A terminal voice-memo recorder with live level metering and waveform playback")]
#[command(long_about = "A terminal voice-memo recorder with live level metering and waveform playback.\n\nDEFAULT COMMAND:\n    With no command, vmemo opens the interactive memo session.\n\nKEYS:\n    space/r     start or stop recording\n    enter/p     play or pause the selected memo\n    up/down     select a memo\n    esc/q       quit\n\nEXTERNAL TRIGGER:\n    $ pkill -USR1 vmemo     # start or stop recording from a hotkey")]
#[command(
    after_help = "CONFIGURATION:\n    Config file:        ~/.config/vmemo/vmemo.toml\n    Memos:              ~/.local/share/vmemo/\n    Logs:               ~/.local/state/vmemo/vmemo.log.*"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record and play back memos (default)
    ///
    /// Memos are kept for the duration of the session. Converted files stay
    /// in the output directory.
    #[command(visible_alias = "s")]
    Session,

    /// Open configuration file in your preferred editor
    ///
    /// Uses $EDITOR environment variable or falls back to nano/vi.
    #[command(visible_alias = "c")]
    Config,

    /// List available audio input devices
    ///
    /// Shows device IDs, names, and configurations to help configure
    /// the correct input device in vmemo.toml.
    #[command(name = "list-devices")]
    ListDevices,

    /// Show recent log entries from the application
    ///
    /// Display the last 50 lines of the most recent log file.
    Logs,

    /// Generate shell completion script
    ///
    /// Examples:
    ///   vmemo completions bash > vmemo.bash
    ///   vmemo completions zsh > _vmemo
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Runs the main application based on command-line arguments.
///
/// # Exit Codes
/// - 0: Success
/// - 1: General error
/// - 2: Usage error (invalid arguments)
///
/// # Errors
/// - If logging initialization fails
/// - If command execution fails
pub async fn run() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Commands that don't need logging
    match &cli.command {
        Some(Commands::Completions { shell }) => {
            generate(*shell, &mut Cli::command(), "vmemo", &mut io::stdout());
            return Ok(());
        }
        Some(Commands::ListDevices) => {
            return exit_on_error(commands::handle_list_devices());
        }
        Some(Commands::Logs) => {
            return exit_on_error(commands::handle_logs());
        }
        _ => {}
    }

    logging::init_logging()?;

    match cli.command {
        None | Some(Commands::Session) => {
            commands::handle_session().await?;
        }
        Some(Commands::Config) => {
            commands::handle_config()?;
        }
        Some(Commands::Completions { .. }) | Some(Commands::ListDevices) | Some(Commands::Logs) => {
            unreachable!("These commands are handled earlier")
        }
    }

    Ok(())
}

fn exit_on_error(result: anyhow::Result<()>) -> anyhow::Result<()> {
    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
    Ok(())
}
