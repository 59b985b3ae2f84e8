use std::collections::HashMap;
use std::rc::Rc;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;

use crate::http::error::TransportError;
use crate::http::headers::HeaderEntry;
use crate::http::request::{ConnectionId, StreamId};
use crate::http::response::StatusCode;

const HTTP_VERSION: &str = "HTTP/1.1";

/// A frame handed to a multiplexing layer for one stream.
#[derive(Debug, Clone, Copy)]
pub enum Frame<'a> {
    /// Status and headers opening the reply.
    Reply {
        status: StatusCode,
        headers: &'a [HeaderEntry],
    },
    /// Body bytes; `fin` closes the stream's reply.
    Data { body: &'a [u8], fin: bool },
}

/// Byte-accepting side of a connection.
///
/// Implementations queue or send what they accept and own flushing and
/// backpressure. Nothing here blocks: a transport that cannot take bytes
/// right now reports it instead of waiting.
pub trait Transport {
    /// Accepts bytes for a byte-stream connection, returning how many were
    /// taken.
    fn write(&mut self, conn: ConnectionId, bytes: &[u8]) -> Result<usize, TransportError>;

    /// Accepts a whole frame for one stream of a multiplexed connection.
    fn write_frame(
        &mut self,
        _conn: ConnectionId,
        _stream: StreamId,
        _frame: Frame<'_>,
    ) -> Result<(), TransportError> {
        Err(TransportError::Unsupported)
    }
}

/// Hands every byte of `buf` to the transport.
pub fn write_all(
    transport: &mut dyn Transport,
    conn: ConnectionId,
    buf: &[u8],
) -> Result<(), TransportError> {
    let mut written = 0;

    while written < buf.len() {
        let n = transport.write(conn, &buf[written..])?;

        if n == 0 {
            return Err(TransportError::Stalled);
        }

        written += n;
    }

    Ok(())
}

pub fn serialize_response(status: StatusCode, headers: &[HeaderEntry], body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + body.len());

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        status.as_u16(),
        status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    // Headers
    for header in headers {
        buf.extend_from_slice(header.name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(header.value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    // Body
    buf.extend_from_slice(body);

    buf
}

/// Minimal response for a request that failed before it existed.
pub fn serialize_error(status: StatusCode, server: &str) -> Vec<u8> {
    let headers = [
        HeaderEntry::new("Server", server),
        HeaderEntry::new("Content-Length", "0"),
        HeaderEntry::new("Connection", "close"),
    ];
    serialize_response(status, &headers, &[])
}

/// In-memory transport queueing bytes per connection until the socket task
/// drains them.
#[derive(Debug, Default)]
pub struct Outbox {
    pending: HashMap<ConnectionId, BytesMut>,
    wakers: HashMap<ConnectionId, Rc<Notify>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection; the returned handle fires whenever bytes
    /// are queued for it.
    pub fn register(&mut self, conn: ConnectionId) -> Rc<Notify> {
        self.pending.insert(conn, BytesMut::new());
        self.wakers
            .entry(conn)
            .or_insert_with(|| Rc::new(Notify::new()))
            .clone()
    }

    pub fn unregister(&mut self, conn: ConnectionId) {
        self.pending.remove(&conn);
        self.wakers.remove(&conn);
    }

    /// Takes everything queued for `conn`.
    pub fn take(&mut self, conn: ConnectionId) -> BytesMut {
        self.pending
            .get_mut(&conn)
            .map(|buf| buf.split())
            .unwrap_or_default()
    }
}

impl Transport for Outbox {
    fn write(&mut self, conn: ConnectionId, bytes: &[u8]) -> Result<usize, TransportError> {
        let buf = self.pending.get_mut(&conn).ok_or(TransportError::Closed)?;
        buf.extend_from_slice(bytes);

        if let Some(waker) = self.wakers.get(&conn) {
            waker.notify_one();
        }

        Ok(bytes.len())
    }
}

/// Flushes serialized bytes to a socket, tolerating partial writes.
pub struct ResponseWriter {
    buffer: BytesMut,
    written: usize,
}

impl ResponseWriter {
    pub fn new(buffer: BytesMut) -> Self {
        Self { buffer, written: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub async fn write_to_stream<S>(&mut self, stream: &mut S) -> anyhow::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        while self.written < self.buffer.len() {
            let n = stream.write(&self.buffer[self.written..]).await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }

        stream.flush().await?;
        Ok(())
    }
}
