use crate::auth::token_store::TokenStore;
use crate::auth::{self, Auth};
use crate::config::Settings;
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Debug, Args)]
pub struct AuthCommand {
    #[command(subcommand)]
    command: AuthCommands,
}

#[derive(Debug, Subcommand)]
enum AuthCommands {
    /// Authorize with Google in the browser and save the token
    Login,

    /// Logout and remove saved credentials
    Logout,

    /// Check authentication status
    Status,
}

impl AuthCommand {
    pub async fn execute(self, settings: &Settings) -> Result<()> {
        match self.command {
            AuthCommands::Login => Auth::new(settings)?.login().await.map(|_| ()),
            // Only the saved token is involved, the client descriptor may be gone
            AuthCommands::Logout => auth::logout(&TokenStore::new(settings.token_path()?)),
            AuthCommands::Status => auth::status(&TokenStore::new(settings.token_path()?)),
        }
    }
}
