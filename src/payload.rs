//! Message payload collaborator boundary.
//!
//! The transport does not own message construction; it drives a
//! [`Payload`] to learn the recipient set and to pull serialized bytes
//! through the channel's `io::Write` seam. [`RawMail`] is the stock
//! implementation for an already-serialized MIME message.

use std::io::{self, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mailparse::{MailAddr, MailHeaderMap, MailParseError};
use percent_encoding::{AsciiSet, CONTROLS, percent_encode};

/// Raw bytes encoded per block; a multiple of 3 so concatenated base64
/// blocks carry no interior padding.
const ENCODE_BLOCK: usize = 6144;

/// Characters of the base64 alphabet that are not form-safe.
const FORM: &AsciiSet = &CONTROLS.add(b'+').add(b'/').add(b'=');

/// An outbound message as the transport sees it.
pub trait Payload {
    /// Number of distinct addressees declared on the message. Used as the
    /// accepted-recipient count on success.
    fn recipient_count(&self) -> usize;

    /// The primary recipient address, named when the service rejects the
    /// message.
    fn primary_recipient(&self) -> Option<&str>;

    /// Streams the serialized, transfer-encoded message content into the
    /// sink. Called once per send, after the request prefix has been
    /// written.
    ///
    /// # Errors
    ///
    /// Propagates sink write failures.
    fn write_to(&self, sink: &mut dyn Write) -> io::Result<()>;
}

/// A serialized MIME message plus the recipients derived from its
/// `To`/`Cc`/`Bcc` headers.
///
/// `write_to` produces the form-safe shape the `SendRawEmail` action
/// expects: base64 of the raw bytes with `+`, `/` and `=` percent-encoded,
/// emitted block by block so large messages never materialize a second
/// full copy.
#[derive(Debug, Clone)]
pub struct RawMail {
    raw: Vec<u8>,
    recipients: Vec<String>,
}

impl RawMail {
    /// Parses the message headers to derive the recipient list.
    ///
    /// Recipients are collected from `To`, `Cc` and `Bcc` in that order,
    /// deduplicated, groups flattened to their members.
    ///
    /// # Errors
    ///
    /// Returns the underlying parse error for a malformed message or an
    /// unparseable address header.
    pub fn parse(raw: Vec<u8>) -> Result<Self, MailParseError> {
        let recipients = derive_recipients(&raw)?;
        Ok(Self { raw, recipients })
    }

    /// The derived recipient addresses, in header order.
    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }
}

impl Payload for RawMail {
    fn recipient_count(&self) -> usize {
        self.recipients.len()
    }

    fn primary_recipient(&self) -> Option<&str> {
        self.recipients.first().map(String::as_str)
    }

    fn write_to(&self, sink: &mut dyn Write) -> io::Result<()> {
        for block in self.raw.chunks(ENCODE_BLOCK) {
            let encoded = STANDARD.encode(block);
            let escaped = percent_encode(encoded.as_bytes(), FORM).to_string();
            sink.write_all(escaped.as_bytes())?;
        }
        Ok(())
    }
}

fn derive_recipients(raw: &[u8]) -> Result<Vec<String>, MailParseError> {
    let mail = mailparse::parse_mail(raw)?;

    let mut recipients = Vec::new();
    for header in ["To", "Cc", "Bcc"] {
        for value in mail.headers.get_all_values(header) {
            for addr in &*mailparse::addrparse(&value)? {
                match addr {
                    MailAddr::Single(single) => push_distinct(&mut recipients, &single.addr),
                    MailAddr::Group(group) => {
                        for single in &group.addrs {
                            push_distinct(&mut recipients, &single.addr);
                        }
                    }
                }
            }
        }
    }

    Ok(recipients)
}

fn push_distinct(recipients: &mut Vec<String>, addr: &str) {
    if !recipients.iter().any(|existing| existing == addr) {
        recipients.push(addr.to_string());
    }
}
