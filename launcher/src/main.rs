use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

#[cfg_attr(not(windows), allow(dead_code))]
mod config;
mod logging;
#[cfg(windows)]
mod module;
#[cfg_attr(not(windows), allow(dead_code))]
mod monitor;
#[cfg(windows)]
mod winapi;

/// Keeps an application running in the background when its main window is closed.
#[derive(Debug, Parser)]
#[command(name = "hide-on-close", version)]
struct Cli {
    /// Config file, `config.toml` next to the executable by default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Watch for the target application and intercept its main window (default).
    Run,
    /// Launch the supervisor automatically at logon.
    Autostart {
        #[arg(value_enum)]
        action: Toggle,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[cfg_attr(not(windows), allow(dead_code))]
enum Toggle {
    On,
    Off,
    Status,
}

fn main() -> ExitCode {
    logging::init_logging();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(windows)]
fn run(cli: Cli) -> Result<()> {
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let settings = config::Settings::load(cli.config.as_deref())?;
            monitor::run(&settings)
        }
        Command::Autostart { action } => {
            if action != Toggle::Status {
                winapi::set_autostart(action == Toggle::On)?;
            }
            let state = if winapi::autostart_enabled()? { "on" } else { "off" };
            println!("[*] Autostart is {state}");
            Ok(())
        }
    }
}

#[cfg(not(windows))]
fn run(_cli: Cli) -> Result<()> {
    anyhow::bail!("hide-on-close only runs on Windows")
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_is_the_default() {
        let cli = Cli::try_parse_from(["hide-on-close"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn parses_autostart() {
        let cli = Cli::try_parse_from(["hide-on-close", "autostart", "off", "--config", "c.toml"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Autostart { action: Toggle::Off })
        ));
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
    }

    #[test]
    fn rejects_unknown_toggle() {
        assert!(Cli::try_parse_from(["hide-on-close", "autostart", "maybe"]).is_err());
    }
}
