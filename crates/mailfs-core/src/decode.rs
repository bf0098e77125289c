//! Raw message bytes to the text exposed as file content.

use mailparse::{DispositionType, ParsedMail};
use tracing::debug;

/// Extracts the plain-text body of a raw RFC 822 message.
///
/// Every inline `text/plain` leaf part is decoded (transfer encoding and
/// charset) and appended in document order. HTML-only messages yield an
/// empty string. Input that does not parse as MIME is returned as lossy
/// UTF-8 so the file still shows something.
pub fn plain_text(raw: &[u8]) -> String {
    match mailparse::parse_mail(raw) {
        Ok(parsed) => {
            let mut out = String::new();
            collect_plain_parts(&parsed, &mut out);
            out
        }
        Err(e) => {
            debug!(error = %e, len = raw.len(), "Message is not valid MIME, using raw bytes");
            String::from_utf8_lossy(raw).into_owned()
        }
    }
}

fn collect_plain_parts(part: &ParsedMail<'_>, out: &mut String) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_plain_parts(sub, out);
        }
        return;
    }

    if part.get_content_disposition().disposition == DispositionType::Attachment {
        return;
    }
    if !part.ctype.mimetype.eq_ignore_ascii_case("text/plain") {
        return;
    }
    match part.get_body() {
        Ok(body) => out.push_str(&body),
        Err(e) => debug!(error = %e, "Failed to decode text/plain part"),
    }
}

/// Decodes an RFC 2047 encoded subject (`=?UTF-8?B?...?=`) into text.
pub fn decode_subject(raw: &[u8]) -> String {
    let mut header = b"Subject: ".to_vec();
    header.extend_from_slice(raw);
    match mailparse::parse_header(&header) {
        Ok((parsed, _)) => parsed.get_value(),
        Err(_) => String::from_utf8_lossy(raw).into_owned(),
    }
}
