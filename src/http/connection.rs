use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::time::timeout;

use crate::fs::FileSystem;
use crate::http::handlers::handle_request;
use crate::http::parser::{parse_http_request, ParseError};
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::server::ServerContext;

const READ_CHUNK_SIZE: usize = 4096;

/// Requests whose head grows past this without a terminator are dropped.
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Why a connection ended without a clean close.
#[derive(Debug)]
pub enum ConnectionError {
    /// No bytes arrived within the configured read timeout.
    ReadTimeout,
    Read(io::Error),
    Write(io::Error),
    HeadersTooLarge,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ReadTimeout => write!(f, "read timed out"),
            ConnectionError::Read(e) => write!(f, "read failed: {}", e),
            ConnectionError::Write(e) => write!(f, "write failed: {}", e),
            ConnectionError::HeadersTooLarge => {
                write!(f, "request head exceeded {} bytes", MAX_HEADER_BYTES)
            }
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectionError::Read(e) | ConnectionError::Write(e) => Some(e),
            _ => None,
        }
    }
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

/// What one pass of the reader produced.
#[derive(Debug)]
pub enum ReadOutcome {
    Request(Request),
    Malformed(ParseError),
    /// Peer closed before a full request head arrived.
    Closed,
}

/// One accepted client connection.
///
/// Reads a request head, answers it, and either closes or (for a GET with
/// `Connection: keep-alive`) goes back to reading on the same stream.
pub struct Connection<S, F> {
    stream: S,
    buffer: BytesMut,
    state: ConnectionState,
    ctx: Arc<ServerContext<F>>,
}

impl<S, F> Connection<S, F>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FileSystem,
{
    pub fn new(stream: S, ctx: Arc<ServerContext<F>>) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
            state: ConnectionState::Reading,
            ctx,
        }
    }

    pub async fn run(&mut self) -> Result<(), ConnectionError> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => {
                    self.state = match self.read_request().await? {
                        ReadOutcome::Request(req) => ConnectionState::Processing(req),
                        ReadOutcome::Malformed(e) => {
                            tracing::info!(error = %e, status = 400, "Malformed request");
                            ConnectionState::Writing(ResponseWriter::new(&Response::bad_request()), false)
                        }
                        ReadOutcome::Closed => ConnectionState::Closed,
                    };
                }

                ConnectionState::Processing(req) => {
                    let response = handle_request(&req, &self.ctx).await;

                    tracing::info!(
                        method = req.method.as_str(),
                        path = %req.path,
                        status = response.status.as_u16(),
                        "Request handled"
                    );

                    // Bodies are never consumed, so only GET can safely reuse the stream.
                    let keep_alive = req.method == Method::GET && req.keep_alive();
                    self.state = ConnectionState::Writing(ResponseWriter::new(&response), keep_alive);
                }

                ConnectionState::Writing(writer, keep_alive) => {
                    writer
                        .write_to_stream(&mut self.stream)
                        .await
                        .map_err(ConnectionError::Write)?;

                    self.state = if keep_alive {
                        ConnectionState::Reading
                    } else {
                        ConnectionState::Closed
                    };
                }

                ConnectionState::Closed => break,
            }
        }

        Ok(())
    }

    /// Reads until the buffer holds a full request head.
    ///
    /// Each individual read is bounded by the configured idle timeout.
    pub async fn read_request(&mut self) -> Result<ReadOutcome, ConnectionError> {
        loop {
            if !self.buffer.is_empty() {
                match parse_http_request(&self.buffer) {
                    Ok((request, consumed)) => {
                        self.buffer.advance(consumed);
                        return Ok(ReadOutcome::Request(request));
                    }
                    Err(ParseError::Incomplete) => {}
                    Err(e) => {
                        self.buffer.clear();
                        return Ok(ReadOutcome::Malformed(e));
                    }
                }
            }

            if self.buffer.len() > MAX_HEADER_BYTES {
                return Err(ConnectionError::HeadersTooLarge);
            }

            self.buffer.reserve(READ_CHUNK_SIZE);
            let n = timeout(self.ctx.config.read_timeout, self.stream.read_buf(&mut self.buffer))
                .await
                .map_err(|_| ConnectionError::ReadTimeout)?
                .map_err(ConnectionError::Read)?;

            if n == 0 {
                if !self.buffer.is_empty() {
                    tracing::debug!(buffered = self.buffer.len(), "Peer closed before request terminator");
                }
                return Ok(ReadOutcome::Closed);
            }
        }
    }
}
