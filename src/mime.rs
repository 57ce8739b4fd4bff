//! Helpers for reading and building message payloads.
//!
//! Gmail hands out message bodies and attachments as base64url strings
//! inside a tree of [`MessagePart`]s, and expects outgoing mail as a
//! base64url encoded RFC 2822 document.

use crate::gmail_client::{Header, MessagePart};
use anyhow::{Context, Result};
use base64::Engine;
use base64::alphabet;
use base64::engine::DecodePaddingMode;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use std::path::PathBuf;

/// Returned by [`get_body`] when no readable text exists
pub const NO_TEXT_CONTENT: &str = "[No text content]";

/// URL-safe alphabet, padded on encode, padding optional on decode.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn encode_base64url(data: &[u8]) -> String {
    URL_SAFE_LENIENT.encode(data)
}

pub fn decode_base64url(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_LENIENT.decode(data)
}

/// Returns `(subject, from)`. Later headers override earlier ones and
/// names are matched exactly.
pub fn extract_headers(headers: &[Header]) -> (String, String) {
    let mut subject = String::new();
    let mut from = String::new();
    for header in headers {
        match header.name.as_str() {
            "Subject" => subject = header.value.clone(),
            "From" => from = header.value.clone(),
            _ => {}
        }
    }
    (subject, from)
}

fn inline_text(part: &MessagePart) -> Option<String> {
    let data = part.body.as_ref()?.data.as_deref()?;
    if data.is_empty() {
        return None;
    }
    decode_base64url(data)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Text of a message part.
///
/// Looks at the part's own payload, then at its immediate `text/plain`
/// children. Nested multiparts below that are not searched.
pub fn get_body(part: &MessagePart) -> String {
    if let Some(text) = inline_text(part) {
        return text;
    }

    part.parts
        .iter()
        .filter(|child| child.mime_type == "text/plain")
        .find_map(inline_text)
        .unwrap_or_else(|| NO_TEXT_CONTENT.to_string())
}

/// A downloadable attachment found in a message tree
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRef {
    pub filename: String,
    pub attachment_id: String,
}

/// Every part with both a filename and an attachment id, in document order.
pub fn collect_attachments(part: &MessagePart) -> Vec<AttachmentRef> {
    let mut found = Vec::new();
    walk_attachments(part, &mut found);
    found
}

fn walk_attachments(part: &MessagePart, found: &mut Vec<AttachmentRef>) {
    let attachment_id = part
        .body
        .as_ref()
        .and_then(|body| body.attachment_id.as_deref())
        .filter(|id| !id.is_empty());

    if let Some(id) = attachment_id {
        if !part.filename.is_empty() {
            found.push(AttachmentRef {
                filename: part.filename.clone(),
                attachment_id: id.to_string(),
            });
        }
    }

    for child in &part.parts {
        walk_attachments(child, found);
    }
}

/// An outgoing message
#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub to: String,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<PathBuf>,
}

/// Render a draft as an RFC 2822 document.
///
/// Without attachments this is just the headers, a blank line and the body.
/// With attachments the body and files are wrapped in `multipart/mixed`.
pub fn build_raw_message(draft: &Draft) -> Result<String> {
    let mut message = String::new();
    message.push_str(&format!("To: {}\r\n", draft.to));
    if let Some(cc) = draft.cc.as_deref().filter(|cc| !cc.is_empty()) {
        message.push_str(&format!("Cc: {}\r\n", cc));
    }
    if let Some(bcc) = draft.bcc.as_deref().filter(|bcc| !bcc.is_empty()) {
        message.push_str(&format!("Bcc: {}\r\n", bcc));
    }
    message.push_str(&format!("Subject: {}\r\n", draft.subject));

    if draft.attachments.is_empty() {
        message.push_str("\r\n");
        message.push_str(&draft.body);
        return Ok(message);
    }

    let boundary = format!("=_{}", uuid::Uuid::new_v4().simple());
    message.push_str("MIME-Version: 1.0\r\n");
    message.push_str(&format!(
        "Content-Type: multipart/mixed; boundary=\"{}\"\r\n\r\n",
        boundary
    ));

    message.push_str(&format!("--{}\r\n", boundary));
    message.push_str("Content-Type: text/plain; charset=\"UTF-8\"\r\n\r\n");
    message.push_str(&draft.body);
    message.push_str("\r\n");

    for path in &draft.attachments {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read attachment {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow::anyhow!("Attachment path has no file name: {}", path.display()))?
            .replace('"', "");

        message.push_str(&format!("--{}\r\n", boundary));
        message.push_str(&format!(
            "Content-Type: application/octet-stream; name=\"{}\"\r\n",
            filename
        ));
        message.push_str(&format!(
            "Content-Disposition: attachment; filename=\"{}\"\r\n",
            filename
        ));
        message.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
        for line in STANDARD.encode(&data).as_bytes().chunks(76) {
            // base64 output is ASCII
            message.push_str(&String::from_utf8_lossy(line));
            message.push_str("\r\n");
        }
    }
    message.push_str(&format!("--{}--\r\n", boundary));

    Ok(message)
}
