use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// OAuth client registration downloaded from the Google Cloud console
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ClientSecrets {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

/// Desktop clients are wrapped in "installed", web clients in "web"
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read credentials file {}", path.display()))?;
        Self::parse(&json)
            .with_context(|| format!("Unable to parse credentials file {}", path.display()))
    }

    pub fn parse(json: &str) -> Result<Self> {
        let file: CredentialsFile = serde_json::from_str(json)?;
        file.installed
            .or(file.web)
            .ok_or_else(|| anyhow::anyhow!("expected an \"installed\" or \"web\" client entry"))
    }
}
