use clap::Parser;

#[derive(Parser)]
#[command(name = "getquota")]
#[command(version)]
#[command(about = "Show storage usage and quota status on the current cluster", long_about = None)]
pub struct Cli {
    /// Report on a specific user instead of yourself
    #[arg(short, long, conflicts_with = "group")]
    pub user: Option<String>,

    /// Report on a whole group
    #[arg(short, long)]
    pub group: Option<String>,

    /// Override the auto-detected cluster
    #[arg(short, long)]
    pub cluster: Option<String>,

    /// Only count group members with a home directory on this cluster
    #[arg(short, long)]
    pub active_users: bool,

    /// Force live queries and echo raw backend output
    #[arg(short, long)]
    pub debug: bool,

    /// Email-style rendering instead of the interactive layout
    #[arg(short, long)]
    pub email: bool,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}
