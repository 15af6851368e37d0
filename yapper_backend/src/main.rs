use anyhow::Result;
use clap::{Parser, Subcommand};
use yapper_backend::cli;
use yapper_backend::config::YapperConfig;
use yapper_backend::node::YapperNode;
use yapper_backend::telemetry;

#[derive(Parser)]
#[command(author, version, about = "Yapper moderation and session backend")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (Axum) with the live session socket
    Serve,
    /// Provision a user with the given handle and role level
    CreateUser {
        handle: String,
        /// 0 = standard, 1 = verified track, 2+ = elevated
        #[arg(long, default_value_t = 0)]
        role: i64,
    },
    /// Print a signed session token for an existing user
    IssueToken { handle: String },
    /// Recompute every denormalized counter and report corrections
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let args = Args::parse();

    let config = YapperConfig::from_env()?;
    let node = YapperNode::start(config).await?;
    tracing::info!(port = node.config().api_port, "bootstrap complete");

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => node.run_http_server().await,
        Command::CreateUser { handle, role } => cli::create_user(&node.database(), &handle, role),
        Command::IssueToken { handle } => {
            cli::issue_token(node.config(), &node.database(), &handle)
        }
        Command::Reconcile => cli::reconcile(&node.database()).map(|_| ()),
    }
}
