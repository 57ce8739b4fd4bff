use super::connect;
use crate::config::{self, Settings};
use crate::gmail_client::MailApi;
use crate::mime;
use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct DownloadCommand {
    /// Message ID
    message_id: String,

    /// Download directory [default: ~/Downloads, or download_dir from the config]
    #[arg(long)]
    dir: Option<String>,
}

impl DownloadCommand {
    pub async fn execute(self, settings: &Settings) -> Result<()> {
        let dir = config::expand_path(self.dir.as_deref().unwrap_or(&settings.download_dir))?;
        let client = connect(settings).await?;
        download(&client, &self.message_id, &dir).await?;
        Ok(())
    }
}

/// Save every attachment of a message into `dir`. Returns how many were
/// written.
///
/// Any fetch, decode or write failure aborts the download.
pub async fn download<A>(api: &A, message_id: &str, dir: &Path) -> Result<usize>
where
    A: MailApi + ?Sized,
{
    let message = api
        .get_message(message_id)
        .await
        .with_context(|| format!("error getting message {}", message_id))?;
    let attachments = message
        .payload
        .as_ref()
        .map(mime::collect_attachments)
        .unwrap_or_default();

    if attachments.is_empty() {
        eprintln!("No attachments found");
        return Ok(0);
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("error creating download directory {}", dir.display()))?;

    for attachment in &attachments {
        eprintln!("Downloading: {}", attachment.filename);
        let body = api
            .get_attachment(message_id, &attachment.attachment_id)
            .await
            .with_context(|| format!("error downloading attachment {}", attachment.filename))?;

        let Some(encoded) = body.data.as_deref() else {
            anyhow::bail!(
                "error downloading attachment {}: empty response",
                attachment.filename
            );
        };
        let data = mime::decode_base64url(encoded)
            .with_context(|| format!("error decoding attachment {}", attachment.filename))?;

        let path = dir.join(safe_file_name(&attachment.filename));
        fs::write(&path, &data)
            .with_context(|| format!("error writing file {}", path.display()))?;
        eprintln!("Saved: {}", path.display());
    }

    eprintln!(
        "Downloaded {} attachment(s) to {}",
        attachments.len(),
        dir.display()
    );
    Ok(attachments.len())
}

/// Keep only the last path component so a filename can't escape `dir`
fn safe_file_name(filename: &str) -> PathBuf {
    let normalized = filename.replace('\\', "/");
    Path::new(&normalized)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("attachment"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail_client::{Message, MessagePart, MessagePartBody, MockMailApi};

    fn part(filename: &str, attachment_id: Option<&str>, data: Option<&str>) -> MessagePart {
        MessagePart {
            mime_type: "application/octet-stream".to_string(),
            filename: filename.to_string(),
            body: Some(MessagePartBody {
                attachment_id: attachment_id.map(str::to_string),
                data: data.map(str::to_string),
                size: None,
            }),
            ..Default::default()
        }
    }

    fn message_with(parts: Vec<MessagePart>) -> Message {
        Message {
            id: "m1".to_string(),
            payload: Some(MessagePart {
                mime_type: "multipart/mixed".to_string(),
                parts,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_no_attachments_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("downloads");

        let mut api = MockMailApi::new();
        api.expect_get_message().returning(|_| {
            Ok(message_with(vec![
                part("", None, Some("aGVsbG8=")),
                // Inline file without an attachment id can't be fetched
                part("logo.png", None, Some("aGVsbG8=")),
            ]))
        });
        api.expect_get_attachment().never();

        assert_eq!(download(&api, "m1", &target).await.unwrap(), 0);
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_downloads_each_attachment() {
        let dir = tempfile::tempdir().unwrap();

        let mut api = MockMailApi::new();
        api.expect_get_message().returning(|_| {
            Ok(message_with(vec![
                part("report.pdf", Some("att-1"), None),
                MessagePart {
                    mime_type: "multipart/related".to_string(),
                    parts: vec![part("photo.jpg", Some("att-2"), None)],
                    ..Default::default()
                },
            ]))
        });
        api.expect_get_attachment()
            .times(2)
            .returning(|message_id, attachment_id| {
                assert_eq!(message_id, "m1");
                let content = format!("contents of {}", attachment_id);
                Ok(MessagePartBody {
                    data: Some(mime::encode_base64url(content.as_bytes())),
                    ..Default::default()
                })
            });

        assert_eq!(download(&api, "m1", dir.path()).await.unwrap(), 2);
        assert_eq!(
            fs::read_to_string(dir.path().join("report.pdf")).unwrap(),
            "contents of att-1"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("photo.jpg")).unwrap(),
            "contents of att-2"
        );
    }

    #[tokio::test]
    async fn test_undecodable_attachment_aborts() {
        let dir = tempfile::tempdir().unwrap();

        let mut api = MockMailApi::new();
        api.expect_get_message().returning(|_| {
            Ok(message_with(vec![
                part("bad.bin", Some("att-1"), None),
                part("good.bin", Some("att-2"), None),
            ]))
        });
        api.expect_get_attachment().times(1).returning(|_, _| {
            Ok(MessagePartBody {
                data: Some("***".to_string()),
                ..Default::default()
            })
        });

        let err = download(&api, "m1", dir.path()).await.unwrap_err();
        assert_eq!(err.to_string(), "error decoding attachment bad.bin");
        assert!(!dir.path().join("bad.bin").exists());
        assert!(!dir.path().join("good.bin").exists());
    }

    #[tokio::test]
    async fn test_attachment_without_data_aborts() {
        let dir = tempfile::tempdir().unwrap();

        let mut api = MockMailApi::new();
        api.expect_get_message()
            .returning(|_| Ok(message_with(vec![part("empty.bin", Some("att-1"), None)])));
        api.expect_get_attachment()
            .times(1)
            .returning(|_, _| Ok(MessagePartBody::default()));

        let err = download(&api, "m1", dir.path()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "error downloading attachment empty.bin: empty response"
        );
        assert!(!dir.path().join("empty.bin").exists());
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("report.pdf"), PathBuf::from("report.pdf"));
        assert_eq!(safe_file_name("../../etc/passwd"), PathBuf::from("passwd"));
        assert_eq!(safe_file_name("..\\evil.exe"), PathBuf::from("evil.exe"));
        assert_eq!(safe_file_name(".."), PathBuf::from("attachment"));
    }
}
