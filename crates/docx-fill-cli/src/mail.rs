//! Email drafts carrying the generated document.
//!
//! The draft is written as an RFC 5322 `.eml` file next to the document and
//! handed to the system's default mail handler. `X-Unsent: 1` makes clients
//! such as Outlook open it as an editable, unsent message.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use lettre::address::Envelope;
use lettre::message::header::{ContentType, Header, HeaderName, HeaderValue};
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use tracing::{info, warn};

pub const DEFAULT_SUBJECT: &str = "Comanda transport";
pub const DEFAULT_BODY: &str = "Va rugam gasiti atasat documentul in format DOCX.";
pub const DEFAULT_FROM: &str = "docx-fill <docx-fill@localhost>";
const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// `X-Unsent: 1`
#[derive(Debug, Clone, Copy)]
struct XUnsent;

impl Header for XUnsent {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("X-Unsent")
    }

    fn parse(_s: &str) -> std::result::Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(XUnsent)
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), "1".to_string())
    }
}

#[derive(Debug, Clone)]
pub struct DraftMessage {
    pub subject: String,
    pub body: String,
    pub from: Mailbox,
    pub to: Vec<Mailbox>,
    pub attachment: PathBuf,
}

impl DraftMessage {
    pub fn new(attachment: &Path, from: &str) -> Result<Self> {
        let from = from
            .parse::<Mailbox>()
            .map_err(|e| anyhow!("Invalid sender address '{}': {}", from, e))?;
        Ok(Self {
            subject: DEFAULT_SUBJECT.to_string(),
            body: DEFAULT_BODY.to_string(),
            from,
            to: Vec::new(),
            attachment: attachment.to_path_buf(),
        })
    }

    pub fn with_recipients<'a>(
        mut self,
        recipients: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        for to in recipients {
            let mailbox = to
                .parse::<Mailbox>()
                .map_err(|e| anyhow!("Invalid recipient address '{}': {}", to, e))?;
            self.to.push(mailbox);
        }
        Ok(self)
    }

    pub fn to_message(&self) -> Result<Message> {
        let data = fs::read(&self.attachment)
            .with_context(|| format!("Failed to read attachment {}", self.attachment.display()))?;
        let filename = self
            .attachment
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.docx".to_string());
        let content_type = ContentType::parse(DOCX_CONTENT_TYPE)
            .map_err(|e| anyhow!("Invalid content type: {}", e))?;

        // Drafts may have no recipient yet; the envelope only matters for SMTP.
        let envelope_to = match self.to.first() {
            Some(to) => vec![to.email.clone()],
            None => vec![self.from.email.clone()],
        };
        let envelope = Envelope::new(Some(self.from.email.clone()), envelope_to)
            .map_err(|e| anyhow!("Invalid envelope: {}", e))?;

        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(self.subject.as_str())
            .header(XUnsent)
            .envelope(envelope);
        for to in &self.to {
            builder = builder.to(to.clone());
        }

        builder
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(self.body.clone()))
                    .singlepart(Attachment::new(filename).body(data, content_type)),
            )
            .map_err(|e| anyhow!("Failed to build email draft: {}", e))
    }

    /// Write the draft next to the attachment, as `<document>.eml`.
    pub fn write_eml(&self) -> Result<PathBuf> {
        let path = self.attachment.with_extension("eml");
        let message = self.to_message()?;
        fs::write(&path, message.formatted())
            .with_context(|| format!("Failed to write email draft {}", path.display()))?;
        info!("Wrote email draft {:?}", path);
        Ok(path)
    }
}

/// Open `eml` in the default mail client, falling back to opening `document`.
///
/// Returns whether the draft itself was opened. Failures are logged and
/// never abort the command: the document has already been generated.
pub fn open_draft(eml: &Path, document: &Path) -> bool {
    match open::that(eml) {
        Ok(()) => true,
        Err(e) => {
            warn!("Could not open email draft {:?}: {}", eml, e);
            open_document(document);
            false
        }
    }
}

pub fn open_document(document: &Path) {
    if let Err(e) = open::that(document) {
        warn!("Could not open {:?}: {}", document, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn draft(dir: &TempDir) -> DraftMessage {
        let doc = dir.path().join("CAPAC+Comanda transport - 2024-03-04 09.05.07.docx");
        fs::write(&doc, b"PK fake docx").unwrap();
        DraftMessage::new(&doc, DEFAULT_FROM).unwrap()
    }

    #[test]
    fn test_draft_headers_and_body() {
        let dir = TempDir::new().unwrap();
        let formatted = String::from_utf8(draft(&dir).to_message().unwrap().formatted()).unwrap();
        assert!(formatted.contains("Subject: Comanda transport"));
        assert!(formatted.contains("X-Unsent: 1"));
        assert!(formatted.contains(DEFAULT_BODY));
        assert!(formatted.contains("Content-Disposition: attachment"));
        assert!(!formatted.contains("\r\nTo:"));
    }

    #[test]
    fn test_recipients_are_added() {
        let dir = TempDir::new().unwrap();
        let message = draft(&dir)
            .with_recipients(["dispecer@example.com"])
            .unwrap()
            .to_message()
            .unwrap();
        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("To: dispecer@example.com"));
    }

    #[test]
    fn test_eml_is_written_next_to_document() {
        let dir = TempDir::new().unwrap();
        let path = draft(&dir).write_eml().unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("eml"));
        assert_eq!(path.parent(), Some(dir.path()));
        assert!(path.is_file());
    }

    #[test]
    fn test_invalid_sender_is_rejected() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("a.docx");
        assert!(DraftMessage::new(&doc, "not an address").is_err());
    }
}
