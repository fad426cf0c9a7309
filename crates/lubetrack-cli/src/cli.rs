use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use lubetrack_core::models::{Severity, SyncState, TaskStatus};

#[derive(Parser)]
#[command(name = "lubetrack")]
#[command(about = "Record lubrication work offline and reconcile it with the plant system")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the JSON configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Schedule, complete and inspect lubrication tasks
    #[command(subcommand)]
    Task(TaskCommands),
    /// Inspect and manage the sync queue
    #[command(subcommand)]
    Queue(QueueCommands),
    /// Push queued work to the remote authority
    Sync {
        /// Keep running and sync whenever connectivity allows
        #[arg(long)]
        watch: bool,
        /// Return entries a crashed sync left in flight to the queue first.
        /// Only safe when no other `sync --watch` is running.
        #[arg(long, conflicts_with = "watch")]
        recover: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Review fraud alerts
    #[command(subcommand)]
    Alerts(AlertCommands),
    /// Evidence photo tools
    #[command(subcommand)]
    Photo(PhotoCommands),
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Write completion script to file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Add a pending task from a work order
    Schedule {
        /// Work order identifier
        #[arg(long)]
        work_order: String,
        /// Lubrication point identifier
        #[arg(long)]
        point: String,
        /// Expected dose, e.g. 100g or 40ml
        #[arg(long, value_name = "QUANTITY")]
        expected: Option<String>,
        /// Latitude of the lubrication point
        #[arg(long, requires = "longitude", allow_hyphen_values = true)]
        latitude: Option<f64>,
        /// Longitude of the lubrication point
        #[arg(long, requires = "latitude", allow_hyphen_values = true)]
        longitude: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a completed task
    Complete {
        /// Task ID
        id: String,
        /// Quantity applied, e.g. 100g or 40ml
        #[arg(short, long)]
        quantity: String,
        /// Technician recording the work
        #[arg(short, long)]
        user: String,
        /// Free-text observations
        #[arg(long)]
        observations: Option<String>,
        /// Photo taken before the work
        #[arg(long, value_name = "PATH")]
        before: Option<PathBuf>,
        /// Photo taken after the work
        #[arg(long, value_name = "PATH")]
        after: Option<PathBuf>,
        /// Confirm a quantity outside the tolerance band
        #[arg(long)]
        confirm: bool,
        /// Device latitude at completion
        #[arg(long, requires = "longitude", allow_hyphen_values = true)]
        latitude: Option<f64>,
        /// Device longitude at completion
        #[arg(long, requires = "latitude", allow_hyphen_values = true)]
        longitude: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report a problem instead of completing a task
    Issue {
        /// Task ID
        id: String,
        /// Kind of problem, e.g. leak or blocked_access
        #[arg(long = "type", value_name = "TYPE")]
        issue_type: String,
        /// Severity of the problem
        #[arg(long, value_enum, default_value = "medium")]
        severity: SeverityArg,
        /// What happened
        #[arg(short, long)]
        description: String,
        /// Technician reporting the problem
        #[arg(short, long)]
        user: String,
        /// Photo documenting the problem
        #[arg(long, value_name = "PATH")]
        photo: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Close a pending task without doing it
    Skip {
        /// Task ID
        id: String,
        /// Why the task was skipped
        #[arg(long)]
        reason: Option<String>,
    },
    /// Replace the observations of a closed task
    Amend {
        /// Task ID
        id: String,
        /// New observations; omit to clear them
        #[arg(long)]
        observations: Option<String>,
    },
    /// Show one task
    Show {
        /// Task ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recent tasks
    List {
        /// Number of tasks to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Only tasks with this status
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        /// Only tasks in this sync state
        #[arg(long, value_enum)]
        sync_state: Option<SyncStateArg>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// List entries waiting for acknowledgment
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Release a task's parked entries after manual review
    Retry {
        /// Task ID
        task_id: String,
    },
}

#[derive(Subcommand)]
pub enum AlertCommands {
    /// List alerts, newest first
    List {
        /// Include resolved alerts
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark an alert reviewed
    Resolve {
        /// Alert ID
        id: String,
        /// Reviewer name
        #[arg(long)]
        by: String,
    },
    /// Dashboard totals and repeat offenders
    Summary {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum PhotoCommands {
    /// Fingerprint a photo and look for earlier submissions
    Check {
        /// Image file
        path: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SeverityArg {
    Low,
    Medium,
    High,
}

impl From<SeverityArg> for Severity {
    fn from(value: SeverityArg) -> Self {
        match value {
            SeverityArg::Low => Self::Low,
            SeverityArg::Medium => Self::Medium,
            SeverityArg::High => Self::High,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum StatusArg {
    Pending,
    Completed,
    IssueReported,
    Skipped,
}

impl From<StatusArg> for TaskStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Pending => Self::Pending,
            StatusArg::Completed => Self::Completed,
            StatusArg::IssueReported => Self::IssueReported,
            StatusArg::Skipped => Self::Skipped,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SyncStateArg {
    LocalOnly,
    Syncing,
    Synced,
    Conflict,
}

impl From<SyncStateArg> for SyncState {
    fn from(value: SyncStateArg) -> Self {
        match value {
            SyncStateArg::LocalOnly => Self::LocalOnly,
            SyncStateArg::Syncing => Self::Syncing,
            SyncStateArg::Synced => Self::Synced,
            SyncStateArg::Conflict => Self::Conflict,
        }
    }
}
