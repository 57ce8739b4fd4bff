mod auth;
mod commands;
mod config;
mod gmail_client;
mod mime;

use clap::Parser;
use commands::{Commands, MessageAction};
use config::Settings;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "email-manager",
    about = "Gmail Manager - Send, receive, search, and manage Gmail emails",
    author,
    version
)]
pub struct Cli {
    /// Print debug logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Diagnostics go to stderr so stdout stays pipeable
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("EMAIL_MANAGER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Commands::Completions(cmd) = &cli.command {
        return cmd.execute();
    }

    let settings = Settings::load()?;

    // Execute the specified command
    match cli.command {
        Commands::Send(cmd) => cmd.execute(&settings).await,
        Commands::List(cmd) => cmd.execute(&settings).await,
        Commands::Get(cmd) => cmd.execute(&settings).await,
        Commands::Search(cmd) => cmd.execute(&settings).await,
        Commands::Read(cmd) => cmd.execute(MessageAction::MarkRead, &settings).await,
        Commands::Unread(cmd) => cmd.execute(MessageAction::MarkUnread, &settings).await,
        Commands::Archive(cmd) => cmd.execute(MessageAction::Archive, &settings).await,
        Commands::Delete(cmd) => cmd.execute(MessageAction::Delete, &settings).await,
        Commands::DownloadAttachments(cmd) => cmd.execute(&settings).await,
        Commands::Labels(cmd) => cmd.execute(&settings).await,
        Commands::Auth(cmd) => cmd.execute(&settings).await,
        Commands::Config(cmd) => cmd.execute(&settings),
        Commands::Completions(cmd) => cmd.execute(),
    }
}
