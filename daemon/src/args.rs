use buildfarm_common::{BuildQueueStatus, CleanStatus, ResourceSet};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    /// Verbose logging
    #[arg(short, long, global = true, action(ArgAction::Count))]
    pub verbose: u8,
    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Bypass tty detection and always use colors
    #[arg(short = 'C', long, global = true)]
    pub color: bool,
    /// Load and print the config
    #[arg(long, exclusive = true)]
    pub check_config: bool,
    #[command(subcommand)]
    pub subcommand: Option<SubCommand>,
}

#[derive(Debug, Parser)]
pub enum SubCommand {
    /// List active builders
    Builders(Builders),
    /// Register a new builder
    AddBuilder(AddBuilder),
    /// Show the queue
    Queue(Queue),
    /// Show how much work is waiting per processor
    Status(Status),
    /// Show what a builder would be handed next
    Candidates(Candidates),
    /// Hold a waiting build back from dispatch
    Suspend(JobArgs),
    /// Release a suspended build
    Resume(JobArgs),
    /// Return a build whose builder went away to the queue
    Reset(JobArgs),
    /// Pin the score of a waiting build
    Rescore(Rescore),
    /// Cancel a build
    Cancel(JobArgs),
    /// Take a builder out of rotation
    FailBuilder(FailBuilder),
    /// Mark a builder as healthy again
    EnableBuilder(BuilderArgs),
    /// Record the clean state of a builder
    CleanStatus(SetCleanStatus),
}

#[derive(Debug, Parser)]
pub struct Builders {
    /// Print as json
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct AddBuilder {
    pub name: String,
    pub url: String,
    /// Processors in order of preference
    #[arg(short, long = "processor", required = true)]
    pub processors: Vec<String>,
    /// The builder runs builds natively instead of in a VM
    #[arg(long)]
    pub native: bool,
    /// Comma separated resource tags offered to any build asking for them
    #[arg(long, default_value = "")]
    pub open: ResourceSet,
    /// Comma separated resource tags builds have to ask for explicitly
    #[arg(long, default_value = "")]
    pub restricted: ResourceSet,
}

#[derive(Debug, Parser)]
pub struct Queue {
    /// Only show entries in this state (WAITING, RUNNING, SUSPENDED, CANCELLING)
    #[arg(long)]
    pub status: Option<BuildQueueStatus>,
    #[arg(long)]
    pub processor: Option<String>,
    #[arg(long)]
    pub limit: Option<i64>,
    /// Also estimate when each waiting entry is going to start
    #[arg(long)]
    pub estimate: bool,
    /// Print as json
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct Status {
    /// Print as json
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct Candidates {
    /// Use the capabilities of this registered builder
    #[arg(long, conflicts_with = "processor")]
    pub builder: Option<String>,
    #[arg(long, required_unless_present = "builder")]
    pub processor: Option<String>,
    #[arg(long)]
    pub native: bool,
    #[arg(long, default_value = "")]
    pub open: ResourceSet,
    #[arg(long, default_value = "")]
    pub restricted: ResourceSet,
    /// Defaults to the configured candidate limit
    #[arg(long)]
    pub limit: Option<i64>,
}

#[derive(Debug, Parser)]
pub struct JobArgs {
    /// The id of the build farm job
    pub job: i32,
}

#[derive(Debug, Parser)]
pub struct Rescore {
    /// The id of the build farm job
    pub job: i32,
    #[arg(allow_hyphen_values = true)]
    pub score: i32,
}

#[derive(Debug, Parser)]
pub struct BuilderArgs {
    pub name: String,
}

#[derive(Debug, Parser)]
pub struct FailBuilder {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Parser)]
pub struct SetCleanStatus {
    pub name: String,
    #[arg(value_enum)]
    pub status: CleanStatus,
}
