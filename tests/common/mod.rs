//! Shared test doubles for the transport, handler and access-log boundaries.

use std::any::Any;
use std::collections::HashMap;

use keel::http::accesslog::{AccessLog, AccessLogEntry};
use keel::http::dispatcher::{Handler, HandlerOutcome};
use keel::http::headers::HeaderEntry;
use keel::http::request::{ConnectionId, Request, StreamId};
use keel::http::response::StatusCode;
use keel::http::writer::{Frame, Transport};
use keel::http::TransportError;

/// Frame as seen by the fake framing layer.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedFrame {
    Reply {
        status: StatusCode,
        headers: Vec<HeaderEntry>,
    },
    Data {
        body: Vec<u8>,
        fin: bool,
    },
}

/// Transport that keeps everything it is handed.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub bytes: HashMap<ConnectionId, Vec<u8>>,
    pub frames: Vec<(ConnectionId, StreamId, RecordedFrame)>,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn text(&self, conn: ConnectionId) -> String {
        self.bytes
            .get(&conn)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }
}

impl Transport for RecordingTransport {
    fn write(&mut self, conn: ConnectionId, bytes: &[u8]) -> Result<usize, TransportError> {
        self.bytes.entry(conn).or_default().extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn write_frame(
        &mut self,
        conn: ConnectionId,
        stream: StreamId,
        frame: Frame<'_>,
    ) -> Result<(), TransportError> {
        let recorded = match frame {
            Frame::Reply { status, headers } => RecordedFrame::Reply {
                status,
                headers: headers.to_vec(),
            },
            Frame::Data { body, fin } => RecordedFrame::Data {
                body: body.to_vec(),
                fin,
            },
        };
        self.frames.push((conn, stream, recorded));
        Ok(())
    }
}

/// Transport that accepts `budget` bytes and then stalls, and that can
/// refuse data frames.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct FlakyTransport {
    pub inner: RecordingTransport,
    pub budget: usize,
    pub refuse_data: bool,
}

impl Transport for FlakyTransport {
    fn write(&mut self, conn: ConnectionId, bytes: &[u8]) -> Result<usize, TransportError> {
        let n = bytes.len().min(self.budget);
        self.budget -= n;
        self.inner.write(conn, &bytes[..n])
    }

    fn write_frame(
        &mut self,
        conn: ConnectionId,
        stream: StreamId,
        frame: Frame<'_>,
    ) -> Result<(), TransportError> {
        if self.refuse_data && matches!(frame, Frame::Data { .. }) {
            return Err(TransportError::Stalled);
        }
        self.inner.write_frame(conn, stream, frame)
    }
}

/// What a scripted handler does with each request.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    RespondOk,
    /// Responds and carries on even if the write fails.
    RespondCareless,
    RetryOnce,
    Silent,
    Fail,
}

/// Handler that records the paths it saw and follows a script.
#[derive(Debug)]
pub struct ScriptedHandler {
    pub script: Script,
    pub seen: Vec<String>,
    pub released: usize,
}

#[allow(dead_code)]
impl ScriptedHandler {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            seen: Vec::new(),
            released: 0,
        }
    }
}

impl Handler for ScriptedHandler {
    fn handle(&mut self, req: &mut Request, transport: &mut dyn Transport) -> HandlerOutcome {
        self.seen.push(req.path().to_string());

        match self.script {
            Script::RespondOk => {
                req.set_extra(req.path().len());
                req.respond(transport, StatusCode::Ok, b"ok").unwrap();
                HandlerOutcome::Done
            }
            Script::RespondCareless => {
                let _ = req.respond(transport, StatusCode::Ok, b"ok");
                HandlerOutcome::Done
            }
            Script::RetryOnce => {
                if req.extra::<bool>().is_none() {
                    req.set_extra(true);
                    return HandlerOutcome::Retry;
                }
                req.respond(transport, StatusCode::Ok, b"late").unwrap();
                HandlerOutcome::Done
            }
            Script::Silent => HandlerOutcome::Done,
            Script::Fail => HandlerOutcome::Error,
        }
    }

    fn release_extra(&mut self, _extra: Box<dyn Any>) {
        self.released += 1;
    }
}

/// Owned copy of an access-log entry.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct LoggedRequest {
    pub path: String,
    pub status: u16,
}

#[derive(Debug, Default)]
pub struct MemoryLog {
    pub entries: Vec<LoggedRequest>,
}

impl AccessLog for MemoryLog {
    fn record(&mut self, entry: &AccessLogEntry<'_>) {
        self.entries.push(LoggedRequest {
            path: entry.path.to_string(),
            status: entry.status.as_u16(),
        });
    }
}
