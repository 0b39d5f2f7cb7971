//! Transport orchestration: one signed request/response exchange per send.
//!
//! A [`Transport`] owns the account credentials and the service endpoint.
//! Each [`send`](Transport::send) notifies listeners, signs a fresh `Date`
//! header, opens a [`TlsChannel`] to the endpoint, streams the payload
//! through it, and classifies the parsed response into an
//! accepted-recipient count or a typed error.

use std::fmt;
use std::io::{Read, Write};

use chrono::Utc;
use serde::Deserialize;
use url::Url;

use crate::channel::{ChunkedChannel, TlsChannel};
use crate::error::{Result, TransportError};
use crate::events::{EventListener, SendEvent, SendResult};
use crate::payload::Payload;
use crate::response::Response;
use crate::signer;

/// Endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "https://email.us-east-1.amazonaws.com/";

/// RFC-1123-like timestamp for the `Date` header, which doubles as the
/// string under signature.
const DATE_FORMAT: &str = "%a, %-d %B %Y %H:%M:%S %z";

/// The request body prefix ahead of the encoded message content.
const ACTION_PREFIX: &[u8] = b"Action=SendRawEmail&RawMessage.Data=";

/// Deserializable transport settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// The account access key identifier.
    pub access_key_id: String,
    /// The account secret key.
    pub secret_key: String,
    /// Service endpoint URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Dump response bodies through the logging layer.
    #[serde(default)]
    pub debug: bool,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// A mail transport delivering through the SES HTTPS API.
pub struct Transport {
    access_key_id: String,
    secret_key: String,
    endpoint: String,
    debug: bool,
    listeners: Vec<Box<dyn EventListener>>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("debug", &self.debug)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Transport {
    /// Creates a transport for the default endpoint.
    #[must_use]
    pub fn new(access_key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_key: secret_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            debug: false,
            listeners: Vec::new(),
        }
    }

    /// Creates a transport from deserialized settings.
    #[must_use]
    pub fn from_config(config: TransportConfig) -> Self {
        let mut transport = Self::new(config.access_key_id, config.secret_key);
        transport.endpoint = config.endpoint;
        transport.debug = config.debug;
        transport
    }

    pub fn set_access_key_id(&mut self, access_key_id: impl Into<String>) {
        self.access_key_id = access_key_id.into();
    }

    pub fn set_secret_key(&mut self, secret_key: impl Into<String>) {
        self.secret_key = secret_key.into();
    }

    /// Sets the service endpoint. Not validated here; the URL is parsed
    /// once per send.
    pub fn set_endpoint(&mut self, endpoint: impl Into<String>) {
        self.endpoint = endpoint.into();
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Registers a listener observing every send through this transport.
    pub fn register_listener(&mut self, listener: Box<dyn EventListener>) {
        self.listeners.push(listener);
    }

    /// Delivers `message`, returning the number of recipients accepted.
    ///
    /// On success the count equals the message's distinct recipient
    /// count. A non-200 response with no structured error body yields
    /// `Ok(0)`: an unknown failure with no detail to report.
    /// `failed_recipients` is part of the interface but is never
    /// populated; the service reports acceptance for the message as a
    /// whole.
    ///
    /// # Errors
    ///
    /// Every variant of [`TransportError`] can surface here; see the
    /// crate-level docs for the taxonomy. A structured error body raises
    /// [`TransportError::MessageRejected`] or
    /// [`TransportError::ErrorResponse`].
    pub fn send(
        &self,
        message: &dyn Payload,
        failed_recipients: &mut Vec<String>,
    ) -> Result<usize> {
        self.send_via(message, failed_recipients, || self.open_channel())
    }

    /// The full send flow over a caller-supplied channel source. `send`
    /// passes the TLS connector; tests pass in-memory streams.
    fn send_via<S, F>(
        &self,
        message: &dyn Payload,
        failed_recipients: &mut Vec<String>,
        connect: F,
    ) -> Result<usize>
    where
        S: Read + Write,
        F: FnOnce() -> Result<ChunkedChannel<S>>,
    {
        let _ = failed_recipients;

        let mut event = SendEvent::new();
        for listener in &self.listeners {
            listener.before_send(&mut event);
        }
        if event.is_cancelled() {
            tracing::debug!("send cancelled by listener");
            return Ok(0);
        }

        let outcome = self.perform(message, &mut event, connect);
        if outcome.is_err() {
            event.set_result(SendResult::Failed);
        }
        for listener in &self.listeners {
            listener.after_send(&event);
        }

        outcome
    }

    /// Parses the configured endpoint and opens a TLS channel to it.
    fn open_channel(&self) -> Result<TlsChannel> {
        let endpoint = Url::parse(&self.endpoint).map_err(|err| {
            TransportError::InvalidOperation(format!(
                "invalid endpoint {:?}: {err}",
                self.endpoint
            ))
        })?;
        let host = endpoint.host_str().ok_or_else(|| {
            TransportError::InvalidOperation(format!(
                "endpoint {:?} has no host",
                self.endpoint
            ))
        })?;
        let port = endpoint.port().unwrap_or(443);

        TlsChannel::open(host, port, endpoint.path())
    }

    /// One full round trip plus classification.
    fn perform<S, F>(
        &self,
        message: &dyn Payload,
        event: &mut SendEvent,
        connect: F,
    ) -> Result<usize>
    where
        S: Read + Write,
        F: FnOnce() -> Result<ChunkedChannel<S>>,
    {
        let channel = connect()?;
        let response = self.exchange(channel, message)?;

        if self.debug {
            tracing::debug!(code = response.code, body = %response.body, "service response");
        }

        let accepted = classify(&response, message)?;
        event.set_result(if response.is_success() {
            SendResult::Success
        } else {
            SendResult::Failed
        });
        Ok(accepted)
    }

    /// Writes the signed request through an already-open channel and
    /// reads the response. Split from the connection step so the full
    /// exchange can run against an in-memory stream.
    fn exchange<S: Read + Write>(
        &self,
        mut channel: ChunkedChannel<S>,
        message: &dyn Payload,
    ) -> Result<Response> {
        let date = Utc::now().format(DATE_FORMAT).to_string();
        channel.header("Date", &date)?;
        channel.header("X-Amzn-Authorization", &self.authorization(&date))?;

        channel.write_chunk(ACTION_PREFIX)?;
        message
            .write_to(&mut channel)
            .map_err(|err| TransportError::InvalidOperation(err.to_string()))?;

        channel.read()
    }

    /// Builds the AWS3-HTTPS authorization header for a timestamp.
    fn authorization(&self, date: &str) -> String {
        format!(
            "AWS3-HTTPS AWSAccessKeyId={}, Algorithm=HmacSHA1, Signature={}",
            self.access_key_id,
            signer::sign(date.as_bytes(), self.secret_key.as_bytes())
        )
    }
}

/// Turns a parsed response into an accepted-recipient count or a typed
/// error. A structured error body always wins over the status code.
fn classify(response: &Response, message: &dyn Payload) -> Result<usize> {
    if let Some(error) = &response.error {
        if error.code == "MessageRejected" {
            return Err(TransportError::MessageRejected {
                recipient: message.primary_recipient().unwrap_or_default().to_string(),
                message: error.message.clone(),
            });
        }
        return Err(TransportError::ErrorResponse {
            kind: error.kind.clone(),
            code: error.code.clone(),
            message: error.message.clone(),
        });
    }

    if response.is_success() {
        Ok(message.recipient_count())
    } else {
        Ok(0)
    }
}
