//! Email document parser. Raw RFC 5322 bytes into header and body fields.
//!
//! Pure transformation, no I/O.

use mail_parser::{HeaderName, Message, MessageParser, PartType};

use crate::error::ParseError;

/// Header and body fields extracted from one email document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEmail {
    pub from: String,
    pub to: String,
    pub cc: Option<String>,
    pub body: String,
}

/// Parse a raw email document.
///
/// `From`, `To` and `Cc` are taken verbatim from the header text (unfolded,
/// surrounding whitespace trimmed). Missing `From`/`To` become empty strings,
/// a missing `Cc` stays `None`. The body is the first `text/plain` part; an
/// HTML-only message has no plain-text body and is rejected.
pub fn parse_email(raw: &[u8]) -> Result<ParsedEmail, ParseError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::Malformed);
    }

    let message = MessageParser::default()
        .parse(raw)
        .ok_or(ParseError::Malformed)?;

    let body = plain_text_body(&message).ok_or(ParseError::NoPlainTextBody)?;

    Ok(ParsedEmail {
        from: message.header_raw(HeaderName::From).map(unfold).unwrap_or_default(),
        to: message.header_raw(HeaderName::To).map(unfold).unwrap_or_default(),
        cc: message.header_raw(HeaderName::Cc).map(unfold),
        body,
    })
}

/// Remove header folding: each line break is dropped, the continuation
/// line's leading whitespace is kept.
fn unfold(raw: &str) -> String {
    raw.lines().collect::<Vec<_>>().join("").trim().to_string()
}

/// First `text/plain` part listed in the message's text body.
///
/// mail-parser lists HTML parts in `text_body` when no plain alternative
/// exists; those are skipped rather than converted.
fn plain_text_body(message: &Message<'_>) -> Option<String> {
    message
        .text_body
        .iter()
        .filter_map(|&id| message.part(id))
        .find_map(|part| match &part.body {
            PartType::Text(text) => Some(text.to_string()),
            _ => None,
        })
}
