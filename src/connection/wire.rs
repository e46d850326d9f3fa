//! Buffered request/response I/O over a byte stream.
//!
//! `Wire` owns the stream, a receive buffer and a response parser. It is
//! generic over the stream so the framing loop can be exercised against
//! scripted streams in tests.
//!
//! An exchange is marked in flight from its first byte until its response has
//! been consumed. If it never settles (the caller gave up half way, or the
//! stream lost its framing) the next exchange fails with
//! [`ClientError::Desynchronized`] instead of reading a response that belongs
//! to someone else.

use crate::connection::client::ClientError;
use crate::connection::stats::ConnectionStats;
use crate::protocol::{Request, Response, ResponseParser};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, trace};

/// Initial receive buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

pub(crate) struct Wire<S> {
    stream: BufWriter<S>,
    buffer: BytesMut,
    parser: ResponseParser,
    log_traffic: bool,
    in_flight: bool,
}

impl<S> Wire<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: S, log_traffic: bool) -> Self {
        Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: ResponseParser::new(),
            log_traffic,
            in_flight: false,
        }
    }

    /// Marks the start of an exchange.
    pub(crate) fn begin(&mut self) -> Result<(), ClientError> {
        if self.in_flight {
            return Err(ClientError::Desynchronized);
        }
        self.in_flight = true;
        Ok(())
    }

    /// Ends the current exchange if the stream is still aligned on a frame
    /// boundary. Otherwise the wire stays unusable.
    pub(crate) fn settle<T>(&mut self, result: &Result<T, ClientError>) {
        if result.as_ref().map_or_else(ClientError::leaves_stream_aligned, |_| true) {
            self.in_flight = false;
        }
    }

    /// Writes one request and reads its response.
    pub(crate) async fn round_trip(
        &mut self,
        request: &Request<'_>,
        stats: &ConnectionStats,
    ) -> Result<Response, ClientError> {
        self.begin()?;
        let result = match self.write_request(request, stats).await {
            Ok(()) => self.read_response(stats).await,
            Err(e) => Err(e),
        };
        self.settle(&result);
        result
    }

    /// Writes one request line and flushes it.
    pub(crate) async fn write_request(
        &mut self,
        request: &Request<'_>,
        stats: &ConnectionStats,
    ) -> Result<(), ClientError> {
        let bytes = request.serialize();
        if self.log_traffic {
            debug!(request = %request, "write");
        }
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        stats.command_sent(bytes.len());
        Ok(())
    }

    /// Reads exactly one framed response.
    ///
    /// Keeps reading until the whole declared body and its newline have been
    /// received, however the transport splits them. A complete frame that is
    /// rejected is still removed from the buffer.
    pub(crate) async fn read_response(
        &mut self,
        stats: &ConnectionStats,
    ) -> Result<Response, ClientError> {
        loop {
            match self.parser.parse(&self.buffer) {
                Ok(Some((response, consumed))) => {
                    self.buffer.advance(consumed);
                    stats.response_received();
                    if self.log_traffic {
                        debug!(status = %response.status, body = %response.body, "read");
                    }
                    return Ok(response);
                }
                Ok(None) => {}
                Err(e) => {
                    if let Some(len) = e.frame_len() {
                        self.buffer.advance(len);
                        stats.response_received();
                    }
                    debug!(error = %e, "Rejected response frame");
                    return Err(e.into());
                }
            }

            if let Some(header) = self.parser.pending() {
                self.buffer.reserve(header.frame_len().saturating_sub(self.buffer.len()));
            } else if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
            if n == 0 {
                trace!(buffered = self.buffer.len(), "eof while waiting for a response");
                self.parser.reset();
                return Err(ClientError::UnexpectedEof);
            }

            stats.bytes_read(n);
            trace!(bytes = n, buffered = self.buffer.len(), "read data");
        }
    }

    /// Shuts down the write half of the stream.
    pub(crate) async fn shutdown(&mut self) -> std::io::Result<()> {
        self.stream.shutdown().await
    }
}
