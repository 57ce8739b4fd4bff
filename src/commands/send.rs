use super::connect;
use crate::config::{self, Settings};
use crate::gmail_client::MailApi;
use crate::mime::{self, Draft};
use anyhow::{Context, Result};
use clap::Args;

#[derive(Debug, Args)]
pub struct SendCommand {
    /// Recipient email
    #[arg(long)]
    to: String,

    /// Email subject
    #[arg(long)]
    subject: String,

    /// Email body
    #[arg(long)]
    body: String,

    /// CC recipients (comma-separated)
    #[arg(long)]
    cc: Option<String>,

    /// BCC recipients (comma-separated)
    #[arg(long)]
    bcc: Option<String>,

    /// Attachment file paths (repeat or comma-separate)
    #[arg(long, value_delimiter = ',')]
    attach: Vec<String>,
}

impl SendCommand {
    pub async fn execute(self, settings: &Settings) -> Result<()> {
        // Resolve attachments before prompting for authorization
        let draft = self.into_draft()?;
        let client = connect(settings).await?;
        send(&client, &draft).await
    }

    fn into_draft(self) -> Result<Draft> {
        let attachments = self
            .attach
            .iter()
            .filter(|path| !path.is_empty())
            .map(|path| config::expand_path(path))
            .collect::<Result<Vec<_>>>()?;

        Ok(Draft {
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            subject: self.subject,
            body: self.body,
            attachments,
        })
    }
}

pub async fn send<A>(api: &A, draft: &Draft) -> Result<()>
where
    A: MailApi + ?Sized,
{
    let raw = mime::build_raw_message(draft)?;
    api.send_message(mime::encode_base64url(raw.as_bytes()))
        .await
        .context("error sending email")?;

    eprintln!("Email sent successfully to {}", draft.to);
    Ok(())
}
