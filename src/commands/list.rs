use super::connect;
use crate::config::Settings;
use crate::gmail_client::{MailApi, MessageRef};
use crate::mime;
use anyhow::{Context, Result};
use clap::Args;
use std::io::{self, Write};

/// Headers shown by `get`, in the order the message carries them
const DISPLAYED_HEADERS: [&str; 4] = ["From", "To", "Subject", "Date"];

#[derive(Debug, Args)]
pub struct ListCommand {
    /// Gmail query string, e.g. "is:unread from:alice"
    #[arg(long)]
    query: Option<String>,

    /// Maximum results
    #[arg(long)]
    max: Option<u32>,
}

impl ListCommand {
    pub async fn execute(self, settings: &Settings) -> Result<()> {
        let client = connect(settings).await?;
        let max = self.max.unwrap_or(settings.max_results);
        list(&client, self.query, max, &mut io::stdout()).await
    }
}

#[derive(Debug, Args)]
pub struct SearchCommand {
    /// Gmail query string
    query: String,

    /// Maximum results
    #[arg(long)]
    max: Option<u32>,
}

impl SearchCommand {
    pub async fn execute(self, settings: &Settings) -> Result<()> {
        let client = connect(settings).await?;
        let max = self.max.unwrap_or(settings.max_results);
        search(&client, self.query, max, &mut io::stdout()).await
    }
}

#[derive(Debug, Args)]
pub struct GetCommand {
    /// Message ID
    message_id: String,
}

impl GetCommand {
    pub async fn execute(self, settings: &Settings) -> Result<()> {
        let client = connect(settings).await?;
        get(&client, &self.message_id, &mut io::stdout()).await
    }
}

pub async fn list<A, W>(api: &A, query: Option<String>, max: u32, out: &mut W) -> Result<()>
where
    A: MailApi + ?Sized,
    W: Write,
{
    let messages = api
        .list_messages(query, max)
        .await
        .context("error listing messages")?;
    print_summaries(api, &messages, out).await?;
    Ok(())
}

pub async fn search<A, W>(api: &A, query: String, max: u32, out: &mut W) -> Result<()>
where
    A: MailApi + ?Sized,
    W: Write,
{
    let messages = api
        .list_messages(Some(query), max)
        .await
        .context("error searching")?;
    eprintln!("Found {} messages\n", messages.len());
    print_summaries(api, &messages, out).await?;
    Ok(())
}

/// Fetch each message and print its sender and subject.
///
/// A message that can't be fetched is skipped with a warning. Returns the
/// number of messages printed.
pub async fn print_summaries<A, W>(api: &A, messages: &[MessageRef], out: &mut W) -> Result<usize>
where
    A: MailApi + ?Sized,
    W: Write,
{
    let mut printed = 0;
    for summary in messages {
        let message = match api.get_message(&summary.id).await {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("failed to get message {}: {:#}", summary.id, e);
                continue;
            }
        };

        let headers = message
            .payload
            .as_ref()
            .map(|payload| payload.headers.as_slice())
            .unwrap_or_default();
        let (subject, from) = mime::extract_headers(headers);
        writeln!(out, "ID: {}", summary.id)?;
        writeln!(out, "From: {}", from)?;
        writeln!(out, "Subject: {}", subject)?;
        writeln!(out, "---")?;
        printed += 1;
    }
    Ok(printed)
}

pub async fn get<A, W>(api: &A, message_id: &str, out: &mut W) -> Result<()>
where
    A: MailApi + ?Sized,
    W: Write,
{
    let message = api
        .get_message(message_id)
        .await
        .with_context(|| format!("error getting message {}", message_id))?;
    let payload = message.payload.unwrap_or_default();

    for header in &payload.headers {
        if DISPLAYED_HEADERS.contains(&header.name.as_str()) {
            writeln!(out, "{}: {}", header.name, header.value)?;
        }
    }

    writeln!(out, "\n{}", "=".repeat(80))?;
    writeln!(out, "{}", mime::get_body(&payload))?;
    Ok(())
}
