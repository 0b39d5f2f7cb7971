//! Chunked-transfer HTTP channel over a blocking socket.
//!
//! [`ChunkedChannel`] frames one HTTP/1.1 request with chunked transfer
//! encoding and reads back one response. It is single-use: headers, then
//! body chunks, then the terminating chunk, then the response, in that
//! order and never again. Phase violations surface as
//! [`TransportError::InvalidOperation`].
//!
//! The channel is generic over its stream so the framing can be exercised
//! against in-memory buffers; [`TlsChannel`] is the concrete type used for
//! real deliveries.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

use crate::error::{Result, TransportError};
use crate::response::{Response, ResponseParser};

/// Bound on TCP connection establishment. The read phase is deliberately
/// unbounded: a stalled remote response blocks the call, matching the
/// one-shot blocking model of the transport.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A TLS stream over a plain TCP socket.
pub type TlsStream = StreamOwned<ClientConnection, TcpStream>;

/// The channel type used for real deliveries.
pub type TlsChannel = ChunkedChannel<TlsStream>;

/// Write-side phase of the exchange. The read phase is not represented
/// here: [`ChunkedChannel::read`] consumes the channel, so reading and
/// closing are enforced by ownership rather than by a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Headers may still be written.
    Initial,
    /// The header section is terminated and body chunks are accepted.
    BodyWriting,
    /// The terminating chunk has been written; no further writes.
    WriteFinished,
}

/// A single-use chunked-transfer HTTP exchange over `S`.
pub struct ChunkedChannel<S> {
    stream: S,
    phase: Phase,
}

impl<S: Write> ChunkedChannel<S> {
    /// Wraps a connected stream and immediately writes the request line
    /// and the default headers: `Host`, `Content-Type` (POST only),
    /// `Connection: close` and `Transfer-Encoding: chunked`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidOperation`] if the underlying
    /// stream fails to accept the request preamble.
    pub fn new(stream: S, host: &str, path: &str, method: &str) -> Result<Self> {
        let mut channel = Self {
            stream,
            phase: Phase::Initial,
        };

        channel.write_raw(format!("{method} {path} HTTP/1.1\r\n").as_bytes())?;
        channel.header("Host", host)?;
        if method == "POST" {
            channel.header("Content-Type", "application/x-www-form-urlencoded")?;
        }
        channel.header("Connection", "close")?;
        channel.header("Transfer-Encoding", "chunked")?;

        Ok(channel)
    }

    /// Writes one `Name: value` header line.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidOperation`] if body writing has
    /// already started, or if the underlying write fails.
    pub fn header(&mut self, name: &str, value: &str) -> Result<()> {
        if self.phase != Phase::Initial {
            return Err(TransportError::InvalidOperation(
                "cannot write header, body writing has started".into(),
            ));
        }
        self.write_raw(format!("{name}: {value}\r\n").as_bytes())
    }

    /// Writes one body chunk as `<hex length>\r\n<chunk>\r\n`. The first
    /// chunk terminates the header section.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidOperation`] if writing has
    /// already been finished, or if the underlying write fails.
    pub fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        if self.phase == Phase::WriteFinished {
            return Err(TransportError::InvalidOperation(
                "cannot write, reading has started".into(),
            ));
        }

        if self.phase == Phase::Initial {
            // Blank line starts the message body.
            self.write_raw(b"\r\n")?;
            self.phase = Phase::BodyWriting;
        }

        self.write_raw(format!("{:x}\r\n", chunk.len()).as_bytes())?;
        self.write_raw(chunk)?;
        self.write_raw(b"\r\n")
    }

    /// Writes the zero-length terminating chunk. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidOperation`] if the underlying
    /// write fails.
    pub fn finish_write(&mut self) -> Result<()> {
        if self.phase == Phase::WriteFinished {
            return Ok(());
        }
        self.write_chunk(b"")?;
        self.phase = Phase::WriteFinished;
        Ok(())
    }

    /// Returns the wrapped stream, abandoning the exchange.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Immediate write-and-flush. Failures on an open channel are treated
    /// as protocol-usage errors rather than a separate category: the
    /// channel's contract has already been broken by the environment.
    fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.stream
            .write_all(data)
            .and_then(|()| self.stream.flush())
            .map_err(|err| TransportError::InvalidOperation(err.to_string()))
    }
}

impl<S: Read + Write> ChunkedChannel<S> {
    /// Reads the response, consuming the channel.
    ///
    /// Finalizes the write side if that has not happened yet, then feeds
    /// the stream line-by-line into the response parser until end of
    /// stream. The socket is closed when the channel is dropped here.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::EmptyResponse`] if the peer closed
    /// without a status line, [`TransportError::InvalidHeader`] for a
    /// malformed header line, and [`TransportError::InvalidOperation`]
    /// for underlying I/O failures.
    pub fn read(mut self) -> Result<Response> {
        self.finish_write()?;

        let mut reader = BufReader::new(self.stream);
        let mut parser = ResponseParser::new();
        let mut line = Vec::new();

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => parser.feed(&String::from_utf8_lossy(&line))?,
                // Peers routinely close without a TLS close_notify once
                // they have written the full response. Bytes already
                // accumulated before the close are a final unterminated
                // line and still belong to the response.
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    if !line.is_empty() {
                        parser.feed(&String::from_utf8_lossy(&line))?;
                    }
                    break;
                }
                Err(err) => return Err(TransportError::InvalidOperation(err.to_string())),
            }
        }

        parser.complete()
    }
}

impl<S: Write> Write for ChunkedChannel<S> {
    /// Body-writing seam for payload byte producers. Empty buffers are
    /// skipped: a zero-length chunk is the body terminator.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !buf.is_empty() {
            self.write_chunk(buf).map_err(io::Error::other)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl TlsChannel {
    /// Establishes a TLS connection to `host:port` and frames a POST
    /// request for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connection`] if resolution, the TCP
    /// connection or the TLS client setup fails.
    pub fn open(host: &str, port: u16, path: &str) -> Result<Self> {
        let config = tls_config()?;

        let server_name = ServerName::try_from(host.to_string()).map_err(|err| {
            TransportError::Connection {
                message: format!("invalid server name {host:?}: {err}"),
                code: None,
            }
        })?;
        let connection = ClientConnection::new(Arc::new(config), server_name).map_err(|err| {
            TransportError::Connection {
                message: format!("TLS client setup failed: {err}"),
                code: None,
            }
        })?;

        let socket = connect(host, port)?;
        tracing::debug!(host, port, "connected to service endpoint");

        Self::new(StreamOwned::new(connection, socket), host, path, "POST")
    }
}

/// Resolves `host:port` and attempts each address with the fixed
/// connection bound, keeping the last failure.
fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|err| TransportError::connection(&err))?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(socket) => return Ok(socket),
            Err(err) => last_err = Some(err),
        }
    }

    Err(match last_err {
        Some(err) => TransportError::connection(&err),
        None => TransportError::Connection {
            message: format!("no addresses resolved for {host}:{port}"),
            code: None,
        },
    })
}

/// Builds the client TLS configuration from the platform trust store.
fn tls_config() -> Result<ClientConfig> {
    let mut root_store = RootCertStore::empty();

    let certs = rustls_native_certs::load_native_certs();
    for cert in certs.certs {
        root_store.add(cert).map_err(|err| TransportError::Connection {
            message: format!("failed to add certificate: {err}"),
            code: None,
        })?;
    }
    if !certs.errors.is_empty() {
        tracing::warn!(?certs.errors, "some platform certificates could not be loaded");
    }

    Ok(ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth())
}
