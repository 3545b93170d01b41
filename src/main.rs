mod catalog;
mod cli;
mod commands;
mod paths;
mod progress;
mod runner;
mod selection;
mod signal;
mod ui;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use commands::Status;
use std::ffi::OsString;
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

/// Parse arguments, mapping clap's usage errors onto the failure status
///
/// `Err` carries the exit code once clap has printed its message. Help and
/// version output exit 0.
fn parse_args<I, T>(args: I) -> Result<Cli, u8>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args).map_err(|e| {
        let _ = e.print();
        if e.use_stderr() {
            Status::Failed.exit_code()
        } else {
            Status::Success.exit_code()
        }
    })
}

fn main() -> ExitCode {
    let cli = match parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(code) => return ExitCode::from(code),
    };

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    let interrupt = match signal::install() {
        Ok(interrupt) => interrupt,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            return ExitCode::from(Status::Failed.exit_code());
        }
    };

    let result = match cli.command {
        Command::Run(args) => commands::run::run(&ctx, args, interrupt),
        Command::Dispatch(args) => commands::dispatch::run(&ctx, args, interrupt),
        Command::List(args) => commands::list::run(args),
        Command::Backups(args) => commands::backups::run(args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "remedy", &mut io::stdout());
            Ok(Status::Success)
        }
    };

    match result {
        Ok(status) => ExitCode::from(status.exit_code()),
        Err(e) => {
            ui::error(&format!("{e:#}"));
            ExitCode::from(Status::Failed.exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_errors_exit_failed() {
        let failed = Status::Failed.exit_code();
        assert_eq!(parse_args(["remedy", "dispatch", "4"]).err(), Some(failed));
        let bad_timeout = ["remedy", "dispatch", "4", "t1", "--bucket", "b", "--timeout", "abc"];
        assert_eq!(parse_args(bad_timeout).err(), Some(failed));
        assert_eq!(parse_args(["remedy", "frobnicate"]).err(), Some(failed));
    }

    #[test]
    fn test_help_exits_success() {
        assert_eq!(parse_args(["remedy", "--help"]).err(), Some(0));
    }

    #[test]
    fn test_valid_args_parse() {
        assert!(parse_args(["remedy", "list"]).is_ok());
    }
}
