use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "remedy")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Remediate configuration drift against a catalog of compliance controls", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a group of controls on this host
    Run(RunArgs),

    /// Dispatch a group to remote targets and optionally wait for them
    Dispatch(DispatchArgs),

    /// Show which controls a run would execute, in order
    List(ListArgs),

    /// List backups taken for a resource
    Backups(BackupsArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Shared selection flags
// ============================================================================

#[derive(Args)]
pub struct SelectionArgs {
    /// Control catalog (TOML)
    #[arg(long, env = "REMEDY_CATALOG")]
    pub catalog: Option<String>,

    /// File of glob patterns restricting which controls run
    #[arg(long, env = "REMEDY_RULES")]
    pub rules: Option<String>,
}

// ============================================================================
// Run
// ============================================================================

#[derive(Args)]
pub struct RunArgs {
    /// Group to run: 1..6 or "all"
    pub group: String,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Only detect; no backups, no changes
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Minimum level written to the phase log
    #[arg(long, default_value = "INFO")]
    pub log_level: String,

    /// Phase log file
    #[arg(long, env = "REMEDY_LOG_FILE")]
    pub log_file: Option<String>,

    /// Backup root directory
    #[arg(long, env = "REMEDY_BACKUP_DIR")]
    pub backup_dir: Option<String>,

    /// Stop at the first failed control
    #[arg(long)]
    pub fail_fast: bool,
}

// ============================================================================
// Dispatch
// ============================================================================

#[derive(Args)]
pub struct DispatchArgs {
    /// Group to run on every target: 1..6 or "all"
    pub group: String,

    /// Comma-separated target ids
    pub targets: String,

    /// Only detect on every target
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Bucket each target fetches the catalog from
    #[arg(long, env = "REMEDY_BUCKET")]
    pub bucket: String,

    /// Key prefix inside the bucket
    #[arg(long, env = "REMEDY_PREFIX", default_value = "remedy/")]
    pub prefix: String,

    /// Log level forwarded to the targets
    #[arg(long, default_value = "INFO")]
    pub log_level: String,

    /// Wait for every target and print a summary
    #[arg(short, long)]
    pub wait: bool,

    /// Print the dispatch handle or batch summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Batch timeout in seconds (local wait only)
    #[arg(long, default_value_t = 3600, allow_negative_numbers = true)]
    pub timeout: i64,

    /// Seconds between status polls
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Remote entry point to invoke
    #[arg(long, default_value = fleet::types::DEFAULT_ENTRY_POINT)]
    pub document: String,

    /// Credentials profile passed to the aws CLI
    #[arg(long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// Region passed to the aws CLI
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,
}

// ============================================================================
// List / Backups
// ============================================================================

#[derive(Args)]
pub struct ListArgs {
    /// Group to list
    #[arg(default_value = "all")]
    pub group: String,

    #[command(flatten)]
    pub selection: SelectionArgs,
}

#[derive(Args)]
pub struct BackupsArgs {
    /// Logical resource name
    pub name: String,

    /// Backup root directory
    #[arg(long, env = "REMEDY_BACKUP_DIR")]
    pub backup_dir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use control::{GroupSelector, LogLevel};

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_dispatch() {
        let cli = Cli::try_parse_from([
            "remedy", "dispatch", "4", "i-a,i-b", "--bucket", "artifacts", "--wait",
            "--timeout", "30",
        ])
        .unwrap();
        let Command::Dispatch(args) = cli.command else {
            panic!("expected dispatch");
        };
        assert_eq!(args.group.parse::<GroupSelector>(), Ok(GroupSelector::Group(4)));
        assert_eq!(args.targets, "i-a,i-b");
        assert!(args.wait);
        assert_eq!(args.timeout, 30);
        assert_eq!(args.interval, 10);
        assert_eq!(args.log_level.parse::<LogLevel>(), Ok(LogLevel::Info));
    }

    #[test]
    fn test_negative_timeout_reaches_validation() {
        let cli = Cli::try_parse_from([
            "remedy", "dispatch", "all", "i-a", "--bucket", "b", "--timeout", "-5",
        ])
        .unwrap();
        let Command::Dispatch(args) = cli.command else {
            panic!("expected dispatch");
        };
        assert_eq!(args.timeout, -5);
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(
            Cli::try_parse_from([
                "remedy", "dispatch", "all", "i-a", "--bucket", "b", "--interval", "0",
            ])
            .is_err()
        );
    }
}
