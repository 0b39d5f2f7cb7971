//! HTTP response parsing and representation.
//!
//! The response is consumed line-by-line as it arrives off the socket.
//! Parsing is an explicit finite-state machine: [`consume`] is a pure
//! transition from one [`ParseState`] to the next, so every transition can
//! be unit tested without any I/O. [`ResponseParser`] threads the state
//! through successive lines and finalizes with [`ResponseParser::complete`].

use crate::error::{Result, TransportError};

/// A structured error document embedded in a response body.
///
/// The service reports failures as an XML `Error` element carrying `Type`,
/// `Code` and `Message` children, either as the document root or nested
/// under an `ErrorResponse` wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    /// The `Error/Type` field (e.g. `Sender`).
    pub kind: String,
    /// The `Error/Code` field (e.g. `MessageRejected`).
    pub code: String,
    /// The `Error/Message` field, verbatim.
    pub message: String,
}

impl ErrorRecord {
    /// Extracts an error record from a response body, if the body is a
    /// well-formed XML document containing an `Error` element.
    ///
    /// A body that is not XML yields `None`: a successful raw-email
    /// acceptance response is not matched here, and classification then
    /// falls back to the status code alone. Whether the live service can
    /// ever answer success with an XML document whose root is not an
    /// error wrapper remains unverified against the API contract.
    #[must_use]
    pub fn from_xml(body: &str) -> Option<Self> {
        let doc = roxmltree::Document::parse(body).ok()?;
        let error = doc
            .descendants()
            .find(|node| node.has_tag_name("Error"))?;

        let field = |name: &str| {
            error
                .children()
                .find(|child| child.has_tag_name(name))
                .and_then(|child| child.text())
                .unwrap_or_default()
                .to_string()
        };

        Some(Self {
            kind: field("Type"),
            code: field("Code"),
            message: field("Message"),
        })
    }
}

/// A parsed HTTP response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Numeric status code from the status line.
    pub code: u16,
    /// Status message text following the code.
    pub message: String,
    /// Response headers in arrival order.
    pub headers: Vec<(String, String)>,
    /// Accumulated body text, lines appended verbatim.
    pub body: String,
    /// Structured error document parsed from the body, when present.
    pub error: Option<ErrorRecord>,
}

impl Response {
    /// Looks up a header value by name. First match wins.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns `true` if the status line carried a 200 code.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == 200
    }
}

/// Parser position within the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseState {
    /// No line consumed yet; the next line must be the status line.
    #[default]
    Empty,
    /// Accumulating header lines until the blank terminator.
    Headers,
    /// Everything after the blank line is body.
    Body,
}

/// Applies one line of input to the response, returning the next state.
///
/// Lines are fed exactly as read from the socket, trailing CRLF included.
/// Transitions are monotonic: `Empty → Headers → Body`.
///
/// # Errors
///
/// - [`TransportError::EmptyResponse`] if the first line is empty.
/// - [`TransportError::InvalidHeader`] if a header line has no colon.
pub fn consume(state: ParseState, line: &str, response: &mut Response) -> Result<ParseState> {
    match state {
        ParseState::Empty => {
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                return Err(TransportError::EmptyResponse);
            }

            // `<protocol> <code> <message...>`
            let mut parts = trimmed.split(' ');
            let _protocol = parts.next();
            response.code = parts
                .next()
                .and_then(|token| token.parse().ok())
                .unwrap_or_default();
            response.message = parts.collect::<Vec<_>>().join(" ");
            Ok(ParseState::Headers)
        }
        ParseState::Headers => {
            if line.trim_end_matches(['\r', '\n']).is_empty() {
                return Ok(ParseState::Body);
            }

            let Some(colon) = line.find(':') else {
                return Err(TransportError::InvalidHeader(line.to_string()));
            };
            let name = line[..colon].to_string();
            // Value is everything after the colon, leading whitespace
            // preserved as framed, trailing line ending dropped.
            let value = line[colon + 1..].trim_end_matches(['\r', '\n']).to_string();
            response.headers.push((name, value));
            Ok(ParseState::Headers)
        }
        ParseState::Body => {
            response.body.push_str(line);
            Ok(ParseState::Body)
        }
    }
}

/// Incremental response parser, one [`feed`](Self::feed) call per line.
#[derive(Debug, Default)]
pub struct ResponseParser {
    state: ParseState,
    response: Response,
}

impl ResponseParser {
    /// Creates a parser in the initial state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one line of the response.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`consume`].
    pub fn feed(&mut self, line: &str) -> Result<()> {
        self.state = consume(self.state, line, &mut self.response)?;
        Ok(())
    }

    /// Finalizes parsing at end-of-stream, attempting to extract a
    /// structured error record from the accumulated body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::EmptyResponse`] if no line was ever
    /// consumed.
    pub fn complete(mut self) -> Result<Response> {
        if self.state == ParseState::Empty {
            return Err(TransportError::EmptyResponse);
        }
        self.response.error = ErrorRecord::from_xml(&self.response.body);
        Ok(self.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_headers_and_body() {
        let mut parser = ResponseParser::new();
        parser.feed("HTTP/1.1 200 OK\r\n").unwrap();
        parser.feed("X-A: 1\r\n").unwrap();
        parser.feed("\r\n").unwrap();
        parser.feed("<ok/>").unwrap();
        let response = parser.complete().unwrap();

        assert_eq!(response.code, 200);
        assert_eq!(response.message, "OK");
        assert_eq!(response.header("X-A"), Some(" 1"));
        assert_eq!(response.body, "<ok/>");
        assert!(response.error.is_none());
        assert!(response.is_success());
    }

    #[test]
    fn status_message_joins_remaining_tokens() {
        let mut response = Response::default();
        let state = consume(
            ParseState::Empty,
            "HTTP/1.1 500 Internal Server Error\r\n",
            &mut response,
        )
        .unwrap();
        assert_eq!(state, ParseState::Headers);
        assert_eq!(response.code, 500);
        assert_eq!(response.message, "Internal Server Error");
    }

    #[test]
    fn empty_first_line_is_empty_response() {
        let mut response = Response::default();
        let err = consume(ParseState::Empty, "", &mut response).unwrap_err();
        assert!(matches!(err, TransportError::EmptyResponse));
    }

    #[test]
    fn header_without_colon_is_invalid() {
        let mut response = Response::default();
        let err = consume(ParseState::Headers, "not a header\r\n", &mut response).unwrap_err();
        match err {
            TransportError::InvalidHeader(line) => assert_eq!(line, "not a header\r\n"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn blank_line_transitions_to_body() {
        let mut response = Response::default();
        let state = consume(ParseState::Headers, "\r\n", &mut response).unwrap();
        assert_eq!(state, ParseState::Body);
    }

    #[test]
    fn body_lines_accumulate_verbatim() {
        let mut response = Response::default();
        consume(ParseState::Body, "first\n", &mut response).unwrap();
        consume(ParseState::Body, "second", &mut response).unwrap();
        assert_eq!(response.body, "first\nsecond");
    }

    #[test]
    fn completing_unfed_parser_is_empty_response() {
        let err = ResponseParser::new().complete().unwrap_err();
        assert!(matches!(err, TransportError::EmptyResponse));
    }

    #[test]
    fn error_record_from_bare_error_root() {
        let record = ErrorRecord::from_xml(
            "<Error><Type>Sender</Type><Code>MessageRejected</Code><Message>bad</Message></Error>",
        )
        .unwrap();
        assert_eq!(record.kind, "Sender");
        assert_eq!(record.code, "MessageRejected");
        assert_eq!(record.message, "bad");
    }

    #[test]
    fn error_record_from_wrapped_error() {
        let body = "<ErrorResponse><Error><Type>Sender</Type><Code>Throttling</Code>\
                    <Message>Rate exceeded</Message></Error>\
                    <RequestId>abc</RequestId></ErrorResponse>";
        let record = ErrorRecord::from_xml(body).unwrap();
        assert_eq!(record.code, "Throttling");
        assert_eq!(record.message, "Rate exceeded");
    }

    #[test]
    fn non_xml_body_yields_no_record() {
        assert!(ErrorRecord::from_xml("220 not xml at all").is_none());
    }

    #[test]
    fn xml_without_error_element_yields_no_record() {
        assert!(
            ErrorRecord::from_xml("<SendRawEmailResponse><MessageId>1</MessageId></SendRawEmailResponse>")
                .is_none()
        );
    }
}
