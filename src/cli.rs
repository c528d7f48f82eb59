use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use declarative::Operation;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "provision")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Plan and apply declared settings, users and SQL scripts", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $PROVISION_CONFIG or <config dir>/provision.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compute the work for a manifest and write it to a plan file
    Plan(PlanArgs),

    /// Run a plan file against the store
    Apply(ApplyArgs),

    /// Show the store contents and unfinished backups
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct PlanArgs {
    /// Manifest declaring settings, users and scripts
    #[arg(short, long)]
    pub manifest: PathBuf,

    /// What to do with the declared entities
    #[arg(short, long, value_enum, default_value = "install")]
    pub operation: OperationArg,

    /// Only plan one kind, or kind.name
    #[arg(short, long)]
    pub target: Option<String>,

    /// Where to write the plan
    #[arg(long, default_value = "provision.plan")]
    pub out: PathBuf,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Plan file written by `provision plan`
    #[arg(short, long, default_value = "provision.plan")]
    pub plan: PathBuf,

    /// List the steps without running them
    #[arg(short, long)]
    pub dry_run: bool,

    /// Don't ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OperationArg {
    Install,
    Uninstall,
    Repair,
}

impl From<OperationArg> for Operation {
    fn from(arg: OperationArg) -> Self {
        match arg {
            OperationArg::Install => Operation::Install,
            OperationArg::Uninstall => Operation::Uninstall,
            OperationArg::Repair => Operation::Repair,
        }
    }
}
