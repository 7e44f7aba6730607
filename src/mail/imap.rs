//! Blocking IMAP-over-TLS fetch of the newest inbound email.
//!
//! Raw IMAP, no client crate: connect, LOGIN, SELECT INBOX, SEARCH SINCE
//! today's date, FETCH the highest uid, parse with mail-parser. Run inside
//! `spawn_blocking`.

use std::io::Write as IoWrite;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use mail_parser::{MessageParser, MimeHeaders};
use rustls_pki_types::ServerName;
use uuid::Uuid;

use crate::mail::MailConfig;
use crate::workflow::state::Email;

/// Error type for IMAP fetch operations.
pub(crate) type ImapError = Box<dyn std::error::Error + Send + Sync>;

/// Fetch the newest email received since the start of today.
///
/// Returns `Ok(None)` when nothing matched; the caller converts errors into
/// "nothing available" too.
pub(crate) fn fetch_newest(config: &MailConfig) -> Result<Option<Email>, ImapError> {
    // Connect TCP
    let tcp = TcpStream::connect((&*config.imap_host, config.imap_port))?;
    tcp.set_read_timeout(Some(Duration::from_secs(30)))?;

    // TLS via rustls
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name = ServerName::try_from(config.imap_host.clone())?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)?;
    let mut tls = rustls::StreamOwned::new(conn, tcp);

    // ── IMAP helpers ────────────────────────────────────────────────
    let read_line =
        |tls: &mut rustls::StreamOwned<rustls::ClientConnection, TcpStream>| -> Result<String, ImapError> {
            let mut buf = Vec::new();
            loop {
                let mut byte = [0u8; 1];
                match std::io::Read::read(tls, &mut byte) {
                    Ok(0) => return Err("IMAP connection closed".into()),
                    Ok(_) => {
                        buf.push(byte[0]);
                        if buf.ends_with(b"\r\n") {
                            return Ok(String::from_utf8_lossy(&buf).to_string());
                        }
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

    let send_cmd =
        |tls: &mut rustls::StreamOwned<rustls::ClientConnection, TcpStream>,
         tag: &str,
         cmd: &str|
         -> Result<Vec<String>, ImapError> {
            let full = format!("{tag} {cmd}\r\n");
            IoWrite::write_all(tls, full.as_bytes())?;
            IoWrite::flush(tls)?;
            let mut lines = Vec::new();
            loop {
                let line = read_line(tls)?;
                let done = line.starts_with(tag);
                lines.push(line);
                if done {
                    break;
                }
            }
            Ok(lines)
        };

    // Read greeting
    let _greeting = read_line(&mut tls)?;

    // Login
    let login_resp = send_cmd(
        &mut tls,
        "A1",
        &format!("LOGIN \"{}\" \"{}\"", config.username, config.password),
    )?;
    if !login_resp.last().is_some_and(|l| l.contains("OK")) {
        return Err("IMAP login failed".into());
    }

    // Select INBOX
    let _select = send_cmd(&mut tls, "A2", "SELECT \"INBOX\"")?;

    // Search messages received today; the newest is the highest uid.
    let cutoff = chrono::Utc::now().format("%d-%b-%Y");
    let search_resp = send_cmd(&mut tls, "A3", &format!("SEARCH SINCE {cutoff}"))?;
    let mut uids: Vec<String> = Vec::new();
    for line in &search_resp {
        if line.starts_with("* SEARCH") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() > 2 {
                uids.extend(parts[2..].iter().map(|s| s.to_string()));
            }
        }
    }

    let Some(uid) = uids.last() else {
        let _ = send_cmd(&mut tls, "A4", "LOGOUT");
        return Ok(None);
    };

    let fetch_resp = send_cmd(&mut tls, "A4", &format!("FETCH {uid} RFC822"))?;
    let raw: String = fetch_resp
        .iter()
        .skip(1)
        .take(fetch_resp.len().saturating_sub(2))
        .cloned()
        .collect();

    let email = MessageParser::default()
        .parse(raw.as_bytes())
        .map(|parsed| parsed_to_email(uid, &parsed));

    let _ = send_cmd(&mut tls, "A5", "LOGOUT");
    Ok(email)
}

/// Convert a parsed message into the workflow's Email value.
fn parsed_to_email(uid: &str, parsed: &mail_parser::Message) -> Email {
    let message_id = parsed
        .message_id()
        .map(ensure_angle_brackets)
        .unwrap_or_else(|| format!("<gen-{}@generated.invalid>", Uuid::new_v4()));

    let references = parsed
        .header_raw("References")
        .map(|raw| raw.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();

    let date = parsed
        .header_raw("Date")
        .map(|d| d.trim().to_string())
        .unwrap_or_default();

    Email {
        id: uid.to_string(),
        subject: parsed.subject().unwrap_or("(no subject)").to_string(),
        sender: extract_sender(parsed),
        date,
        body: strip_quoted_text(&extract_text(parsed)),
        message_id,
        references,
        // IMAP has no provider thread id; threading rides on References.
        thread_id: String::new(),
    }
}

/// Message-IDs travel bracketed in threading headers; mail-parser strips
/// the brackets on parse.
fn ensure_angle_brackets(id: &str) -> String {
    let trimmed = id.trim();
    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        trimmed.to_string()
    } else {
        format!("<{trimmed}>")
    }
}

/// Extract the sender address from a parsed email.
fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into())
}

/// Extract readable text from a parsed email.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    for part in parsed.attachments() {
        let part: &mail_parser::MessagePart = part;
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            return text.to_string();
        }
    }
    String::new()
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    // Normalize whitespace
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip quoted reply text from an email body.
///
/// Removes `>`-prefixed lines, "On ... wrote:" attribution lines, and
/// everything after an "Original Message" separator. Pure string parsing.
pub fn strip_quoted_text(body: &str) -> String {
    let mut result = Vec::new();
    let mut skip_rest = false;

    for line in body.lines() {
        if skip_rest {
            break;
        }

        let trimmed = line.trim();

        if trimmed.starts_with('>') {
            continue;
        }

        if trimmed.starts_with("On ") && trimmed.ends_with("wrote:") {
            skip_rest = true;
            continue;
        }

        if trimmed.starts_with("---") && trimmed.contains("Original Message") {
            skip_rest = true;
            continue;
        }

        result.push(line);
    }

    while result.last().is_some_and(|l| l.trim().is_empty()) {
        result.pop();
    }

    result.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Quote stripping ─────────────────────────────────────────────

    #[test]
    fn strip_basic_quoted_lines() {
        let body = "Hello!\n\n> This is quoted\n> Another quoted line\nThanks";
        assert_eq!(strip_quoted_text(body), "Hello!\n\nThanks");
    }

    #[test]
    fn strip_on_wrote_attribution() {
        let body = "Sounds good!\n\nOn Mon, Aug 24, 2026 at 10:00 AM Alice <alice@ex.com> wrote:\n> Original message";
        assert_eq!(strip_quoted_text(body), "Sounds good!");
    }

    #[test]
    fn strip_original_message_separator() {
        let body = "My reply\n\n--- Original Message ---\nOld stuff here";
        assert_eq!(strip_quoted_text(body), "My reply");
    }

    #[test]
    fn strip_no_quotes_passthrough() {
        let body = "Just a normal message\nWith multiple lines";
        assert_eq!(strip_quoted_text(body), body);
    }

    // ── HTML stripping ──────────────────────────────────────────────

    #[test]
    fn strip_html_basic() {
        assert_eq!(strip_html("<p>Hello</p>"), "Hello");
    }

    #[test]
    fn strip_html_nested_tags() {
        assert_eq!(
            strip_html("<div><b>Bold</b> and <i>italic</i></div>"),
            "Bold and italic"
        );
    }

    #[test]
    fn strip_html_whitespace_normalized() {
        assert_eq!(strip_html("<p>  Hello   World  </p>"), "Hello World");
    }

    // ── Message-ID normalization ────────────────────────────────────

    #[test]
    fn angle_brackets_added_when_missing() {
        assert_eq!(ensure_angle_brackets("abc@example.com"), "<abc@example.com>");
    }

    #[test]
    fn angle_brackets_preserved() {
        assert_eq!(
            ensure_angle_brackets("<abc@example.com>"),
            "<abc@example.com>"
        );
    }

    // ── Full message parsing ────────────────────────────────────────

    #[test]
    fn parsed_to_email_captures_threading_metadata() {
        let raw = "Message-ID: <msg-1@example.com>\r\n\
                   References: <root@example.com> <mid@example.com>\r\n\
                   From: Alice <alice@example.com>\r\n\
                   Date: Mon, 24 Aug 2026 10:00:00 +0000\r\n\
                   Subject: X200 pricing\r\n\
                   Content-Type: text/plain\r\n\
                   \r\n\
                   What is the price of the X200?\r\n";
        let parsed = MessageParser::default().parse(raw.as_bytes()).unwrap();
        let email = parsed_to_email("17", &parsed);

        assert_eq!(email.id, "17");
        assert_eq!(email.sender, "alice@example.com");
        assert_eq!(email.subject, "X200 pricing");
        assert_eq!(email.message_id, "<msg-1@example.com>");
        assert_eq!(
            email.references,
            "<root@example.com> <mid@example.com>"
        );
        assert!(email.body.contains("price of the X200"));
        assert!(email.thread_id.is_empty());
    }

    #[test]
    fn parsed_to_email_generates_message_id_when_absent() {
        let raw = "From: bob@example.com\r\nSubject: hi\r\n\r\nhello\r\n";
        let parsed = MessageParser::default().parse(raw.as_bytes()).unwrap();
        let email = parsed_to_email("3", &parsed);
        assert!(email.message_id.starts_with("<gen-"));
        assert!(email.message_id.ends_with('>'));
    }
}
