//! Mail transport — IMAP fetch for inbound, SMTP via lettre for outbound
//! threaded replies.

mod imap;

pub use imap::{strip_html, strip_quoted_text};

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::MailError;
use crate::workflow::state::{Email, ReplyDraft};

// ── Configuration ───────────────────────────────────────────────────

/// Mail transport configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

impl MailConfig {
    /// Build config from environment variables.
    /// Returns `None` if `EMAIL_IMAP_HOST` is not set (transport disabled).
    pub fn from_env() -> Option<Self> {
        let imap_host = std::env::var("EMAIL_IMAP_HOST").ok()?;

        let imap_port: u16 = std::env::var("EMAIL_IMAP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(993);

        let smtp_host =
            std::env::var("EMAIL_SMTP_HOST").unwrap_or_else(|_| imap_host.replace("imap", "smtp"));

        let smtp_port: u16 = std::env::var("EMAIL_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("EMAIL_USERNAME").unwrap_or_default();
        let password = std::env::var("EMAIL_PASSWORD").unwrap_or_default();
        let from_address = std::env::var("EMAIL_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Some(Self {
            imap_host,
            imap_port,
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
        })
    }
}

// ── Mailer trait ────────────────────────────────────────────────────

/// Mail transport capability.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Fetch the newest inbound message since the poll cutoff.
    ///
    /// Poll failures are logged and reported as `None` — "nothing available"
    /// is never an error.
    async fn fetch_latest(&self) -> Option<Email>;

    /// Send a threaded reply to the original email.
    async fn send_reply(&self, original: &Email, reply: &ReplyDraft) -> Result<(), MailError>;
}

// ── Threading ───────────────────────────────────────────────────────

/// Reply threading headers derived from the original email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadingHeaders {
    pub in_reply_to: String,
    pub references: String,
}

impl ThreadingHeaders {
    /// Derive threading headers: `In-Reply-To` is the original Message-ID
    /// (synthesized when the original carried none), `References` is the
    /// original references chain extended with the original Message-ID.
    pub fn derive(original: &Email) -> Self {
        let in_reply_to = if original.message_id.is_empty() {
            synthesize_message_id(&original.id)
        } else {
            original.message_id.clone()
        };

        let references = if original.references.is_empty() {
            in_reply_to.clone()
        } else {
            format!("{} {}", original.references, in_reply_to)
        };

        Self {
            in_reply_to,
            references,
        }
    }
}

/// Synthesize a Message-ID when the original email carried none.
fn synthesize_message_id(email_id: &str) -> String {
    if email_id.is_empty() {
        format!("<{}@generated.invalid>", Uuid::new_v4())
    } else {
        format!("<{email_id}@generated.invalid>")
    }
}

/// Derive a reply subject: prefix with `Re: ` unless already present.
pub fn reply_subject(original_subject: &str) -> String {
    let trimmed = original_subject.trim();
    if trimmed.is_empty() {
        return "Re: (no subject)".to_string();
    }
    if trimmed.to_lowercase().starts_with("re:") {
        trimmed.to_string()
    } else {
        format!("Re: {trimmed}")
    }
}

// ── SMTP/IMAP mailer ────────────────────────────────────────────────

/// Concrete mailer: raw IMAP-over-TLS fetch, SMTP send via lettre.
pub struct SmtpImapMailer {
    config: MailConfig,
}

impl SmtpImapMailer {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailer for SmtpImapMailer {
    async fn fetch_latest(&self) -> Option<Email> {
        let config = self.config.clone();
        let fetched = tokio::task::spawn_blocking(move || imap::fetch_newest(&config)).await;

        match fetched {
            Ok(Ok(email)) => email,
            Ok(Err(e)) => {
                error!("Mail poll failed: {e}");
                None
            }
            Err(e) => {
                error!("Mail poll task panicked: {e}");
                None
            }
        }
    }

    async fn send_reply(&self, original: &Email, reply: &ReplyDraft) -> Result<(), MailError> {
        let threading = ThreadingHeaders::derive(original);
        let subject = if reply.subject.trim().is_empty() {
            reply_subject(&original.subject)
        } else {
            reply.subject.clone()
        };

        let message = Message::builder()
            .from(
                self.config
                    .from_address
                    .parse()
                    .map_err(|e| MailError::InvalidAddress {
                        address: self.config.from_address.clone(),
                        reason: format!("{e}"),
                    })?,
            )
            .to(original
                .sender
                .parse()
                .map_err(|e| MailError::InvalidAddress {
                    address: original.sender.clone(),
                    reason: format!("{e}"),
                })?)
            .subject(&subject)
            .in_reply_to(threading.in_reply_to)
            .references(threading.references)
            .body(reply.body.clone())
            .map_err(|e| MailError::SendFailed(format!("Failed to build reply: {e}")))?;

        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let transport = SmtpTransport::relay(&self.config.smtp_host)
            .map_err(|e| MailError::SendFailed(format!("SMTP relay error: {e}")))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        transport
            .send(&message)
            .map_err(|e| MailError::SendFailed(format!("SMTP send failed: {e}")))?;

        info!(to = %original.sender, subject = %subject, "Reply sent");
        Ok(())
    }
}
