use super::connect;
use crate::config::Settings;
use crate::gmail_client::{MailApi, ModifyRequest};
use anyhow::{Context, Result};
use clap::Args;

/// Operations that change a single message's state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageAction {
    MarkRead,
    MarkUnread,
    Archive,
    Delete,
}

impl MessageAction {
    fn verb(self) -> &'static str {
        match self {
            MessageAction::MarkRead => "marking as read",
            MessageAction::MarkUnread => "marking as unread",
            MessageAction::Archive => "archiving",
            MessageAction::Delete => "deleting",
        }
    }

    fn done(self) -> &'static str {
        match self {
            MessageAction::MarkRead => "marked as read",
            MessageAction::MarkUnread => "marked as unread",
            MessageAction::Archive => "archived",
            MessageAction::Delete => "deleted",
        }
    }
}

#[derive(Debug, Args)]
pub struct MessageCommand {
    /// Message ID
    message_id: String,
}

impl MessageCommand {
    pub async fn execute(self, action: MessageAction, settings: &Settings) -> Result<()> {
        let client = connect(settings).await?;
        apply(&client, &self.message_id, action).await
    }
}

pub async fn apply<A>(api: &A, message_id: &str, action: MessageAction) -> Result<()>
where
    A: MailApi + ?Sized,
{
    let result = match action {
        MessageAction::MarkRead => {
            api.modify_message(message_id, ModifyRequest::remove("UNREAD"))
                .await
        }
        MessageAction::MarkUnread => {
            api.modify_message(message_id, ModifyRequest::add("UNREAD"))
                .await
        }
        MessageAction::Archive => {
            api.modify_message(message_id, ModifyRequest::remove("INBOX"))
                .await
        }
        // Moves to trash, Gmail purges it after 30 days
        MessageAction::Delete => api.trash_message(message_id).await,
    };
    result.with_context(|| format!("error {} message {}", action.verb(), message_id))?;

    eprintln!("Message {}", action.done());
    Ok(())
}
