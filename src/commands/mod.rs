mod attachments;
mod auth;
mod completions;
mod config;
mod labels;
mod list;
mod modify;
mod send;

pub use attachments::DownloadCommand;
pub use auth::AuthCommand;
pub use completions::CompletionsCommand;
pub use config::ConfigCommand;
pub use labels::LabelsCommand;
pub use list::{GetCommand, ListCommand, SearchCommand};
pub use modify::{MessageAction, MessageCommand};
pub use send::SendCommand;

use crate::config::Settings;
use crate::gmail_client::GmailClient;
use anyhow::Result;
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send an email
    Send(SendCommand),

    /// List messages
    List(ListCommand),

    /// Get a message by ID
    Get(GetCommand),

    /// Search messages
    Search(SearchCommand),

    /// Mark message as read
    Read(MessageCommand),

    /// Mark message as unread
    Unread(MessageCommand),

    /// Archive a message
    Archive(MessageCommand),

    /// Delete a message (moves it to the trash)
    Delete(MessageCommand),

    /// Download attachments from a message
    DownloadAttachments(DownloadCommand),

    /// Manage labels
    Labels(LabelsCommand),

    /// Manage authorization with Google
    Auth(AuthCommand),

    /// Show settings
    Config(ConfigCommand),

    /// Generate shell completions
    Completions(CompletionsCommand),
}

/// Authenticated Gmail client, authorizing in the browser if needed
async fn connect(settings: &Settings) -> Result<GmailClient> {
    crate::auth::Auth::new(settings)?.gmail_client().await
}
