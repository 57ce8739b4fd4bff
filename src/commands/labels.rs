use super::connect;
use crate::config::Settings;
use crate::gmail_client::{MailApi, ModifyRequest};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::io::{self, Write};

#[derive(Debug, Args)]
pub struct LabelsCommand {
    #[command(subcommand)]
    command: LabelsCommands,
}

#[derive(Debug, Subcommand)]
enum LabelsCommands {
    /// List all labels
    List,

    /// Create a label
    Create {
        /// Label name
        name: String,
    },

    /// Apply label to message
    Apply {
        /// Message ID
        message_id: String,

        /// Label ID (see `labels list`)
        label_id: String,
    },
}

impl LabelsCommand {
    pub async fn execute(self, settings: &Settings) -> Result<()> {
        let client = connect(settings).await?;

        match self.command {
            LabelsCommands::List => list_labels(&client, &mut io::stdout()).await,
            LabelsCommands::Create { name } => create_label(&client, &name).await,
            LabelsCommands::Apply {
                message_id,
                label_id,
            } => apply_label(&client, &message_id, &label_id).await,
        }
    }
}

pub async fn list_labels<A, W>(api: &A, out: &mut W) -> Result<()>
where
    A: MailApi + ?Sized,
    W: Write,
{
    let labels = api.list_labels().await.context("error listing labels")?;
    for label in labels {
        writeln!(out, "{} (ID: {})", label.name, label.id)?;
    }
    Ok(())
}

pub async fn create_label<A>(api: &A, name: &str) -> Result<()>
where
    A: MailApi + ?Sized,
{
    let label = api
        .create_label(name)
        .await
        .with_context(|| format!("error creating label {}", name))?;
    eprintln!("Label created: {} (ID: {})", label.name, label.id);
    Ok(())
}

pub async fn apply_label<A>(api: &A, message_id: &str, label_id: &str) -> Result<()>
where
    A: MailApi + ?Sized,
{
    api.modify_message(message_id, ModifyRequest::add(label_id))
        .await
        .with_context(|| format!("error applying label {} to message {}", label_id, message_id))?;
    eprintln!("Label applied");
    Ok(())
}
