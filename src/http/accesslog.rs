//! Access-log sink boundary.

use std::time::{Duration, Instant};

use crate::http::request::{ConnectionId, Method, Request, StreamId};
use crate::http::response::StatusCode;

/// What the access log sees of a finished request.
#[derive(Debug, Clone)]
pub struct AccessLogEntry<'a> {
    pub conn: ConnectionId,
    pub stream: Option<StreamId>,
    pub method: Method,
    pub host: &'a str,
    pub path: &'a str,
    pub agent: Option<&'a str>,
    pub status: StatusCode,
    pub start: Instant,
    pub elapsed: Duration,
}

impl<'a> AccessLogEntry<'a> {
    /// Entry for a request that has responded, `None` otherwise.
    pub fn from_request(req: &'a Request) -> Option<Self> {
        Some(Self {
            conn: req.owner(),
            stream: req.stream(),
            method: req.method,
            host: req.host(),
            path: req.path(),
            agent: req.agent(),
            status: req.status()?,
            start: req.start(),
            elapsed: req.elapsed()?,
        })
    }

    pub fn duration_ms(&self) -> u128 {
        self.elapsed.as_millis()
    }
}

pub trait AccessLog {
    fn record(&mut self, entry: &AccessLogEntry<'_>);
}

/// Emits one `info` event per request on the `keel::access` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAccessLog;

impl AccessLog for TracingAccessLog {
    fn record(&mut self, entry: &AccessLogEntry<'_>) {
        tracing::info!(
            target: "keel::access",
            conn = %entry.conn,
            stream = ?entry.stream.map(|s| s.0),
            method = %entry.method,
            host = %entry.host,
            path = %entry.path,
            status = entry.status.as_u16(),
            agent = entry.agent.unwrap_or("-"),
            duration_ms = entry.duration_ms() as u64,
            "request"
        );
    }
}
