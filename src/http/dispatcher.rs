//! Per-worker request dispatcher.
//!
//! A [`Dispatcher`] is created when a worker starts and drained when it
//! stops. It owns the worker's request registry together with the parse state
//! of every connection and stream, and it is the only place where requests
//! move between parser, handler and reclamation.
//!
//! Each call to [`Dispatcher::process`] is one pass: requests marked
//! DELETE_PENDING during an earlier pass are freed, and complete requests are
//! handed to the handler. A request is therefore never freed in the same pass
//! its handler ran.

use std::any::Any;
use std::collections::{HashMap, HashSet};

use bytes::BytesMut;

use crate::http::accesslog::{AccessLog, AccessLogEntry};
use crate::http::error::{HttpError, TransportError};
use crate::http::parser::{HeaderParser, ParseEvent, RequestHead};
use crate::http::request::{ConnectionId, Request, RequestId, RequestRegistry, StreamId};
use crate::http::response::StatusCode;
use crate::http::writer::{self, Frame, Transport};

/// What a handler reports after looking at a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Finished. If no response was sent the dispatcher answers 500.
    Done,
    /// Not finished; call again on the next pass.
    Retry,
    /// Give up on the request and close its connection.
    Error,
}

/// Application side of the dispatcher.
pub trait Handler {
    fn handle(&mut self, req: &mut Request, transport: &mut dyn Transport) -> HandlerOutcome;

    /// Receives state attached with [`Request::set_extra`] when the request
    /// is reclaimed.
    fn release_extra(&mut self, _extra: Box<dyn Any>) {}
}

/// How requests reach a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// One request at a time over the raw byte stream.
    Http1,
    /// Requests arrive on streams demultiplexed by an outer framing layer.
    Multiplexed,
}

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub max_body_size: usize,
    pub server_name: String,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024,
            server_name: "keel".to_string(),
        }
    }
}

struct ConnectionEntry {
    protocol: Protocol,
    closing: bool,
}

struct Session {
    parser: HeaderParser,
    buffer: BytesMut,
    current: Option<RequestId>,
    served: usize,
    /// A request that ends the connection was parsed; later bytes are dropped.
    halted: bool,
}

impl Session {
    fn new(max_body: usize) -> Self {
        Self {
            parser: HeaderParser::new(max_body),
            buffer: BytesMut::with_capacity(4096),
            current: None,
            served: 0,
            halted: false,
        }
    }

    fn halt(&mut self) {
        self.halted = true;
        self.buffer.clear();
    }
}

type SessionKey = (ConnectionId, Option<StreamId>);

pub struct Dispatcher {
    registry: RequestRegistry,
    connections: HashMap<ConnectionId, ConnectionEntry>,
    sessions: HashMap<SessionKey, Session>,
    next_conn: u64,
    settings: DispatcherSettings,
}

impl Dispatcher {
    pub fn new(settings: DispatcherSettings) -> Self {
        Self {
            registry: RequestRegistry::new(),
            connections: HashMap::new(),
            sessions: HashMap::new(),
            next_conn: 0,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// Number of live requests.
    pub fn request_count(&self) -> usize {
        self.registry.len()
    }

    pub fn open_connection(&mut self, protocol: Protocol) -> ConnectionId {
        self.next_conn += 1;
        let conn = ConnectionId(self.next_conn);

        self.connections.insert(
            conn,
            ConnectionEntry {
                protocol,
                closing: false,
            },
        );
        if protocol == Protocol::Http1 {
            self.sessions
                .insert((conn, None), Session::new(self.settings.max_body_size));
        }

        tracing::debug!(conn = %conn, ?protocol, "Connection opened");
        conn
    }

    /// Starts a stream on a multiplexed connection.
    pub fn open_stream(&mut self, conn: ConnectionId, stream: StreamId) -> Result<(), HttpError> {
        let entry = self
            .connections
            .get(&conn)
            .ok_or(TransportError::Closed)?;

        if entry.protocol != Protocol::Multiplexed {
            return Err(TransportError::Unsupported.into());
        }

        self.sessions
            .entry((conn, Some(stream)))
            .or_insert_with(|| Session::new(self.settings.max_body_size));
        Ok(())
    }

    /// Whether the connection should be closed once its pending output is
    /// flushed. Unknown connections count as closing.
    pub fn is_closing(&self, conn: ConnectionId) -> bool {
        self.connections.get(&conn).is_none_or(|c| c.closing)
    }

    /// Feeds bytes received on a connection, or on one of its streams.
    ///
    /// Parses as many requests as the bytes allow. On a parse failure an
    /// error response is written when possible, the offending request is
    /// marked DELETE_PENDING, and the error is returned; a failed byte-stream
    /// connection is marked closing.
    pub fn feed(
        &mut self,
        conn: ConnectionId,
        stream: Option<StreamId>,
        bytes: &[u8],
        transport: &mut dyn Transport,
    ) -> Result<(), HttpError> {
        if self.is_closing(conn) {
            return Err(TransportError::Closed.into());
        }

        let key = (conn, stream);
        match self.pump(key, bytes) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.reject(key, &err, transport);
                Err(err)
            }
        }
    }

    fn pump(&mut self, key: SessionKey, bytes: &[u8]) -> Result<(), HttpError> {
        let session = self
            .sessions
            .get_mut(&key)
            .ok_or(TransportError::Closed)?;
        if session.halted {
            tracing::trace!(conn = %key.0, bytes = bytes.len(), "Dropping bytes after a closing request");
            return Ok(());
        }
        session.buffer.extend_from_slice(bytes);

        loop {
            match session.parser.advance(&mut session.buffer)? {
                ParseEvent::Incomplete => return Ok(()),

                ParseEvent::Head(head) => {
                    if key.1.is_some() && session.served > 0 {
                        return Err(HttpError::MalformedRequestLine);
                    }
                    session.served += 1;

                    let id = create_request(&mut self.registry, key, head, &self.settings.server_name)?;
                    if let Some(req) = self.registry.get(id) {
                        if !req.is_complete() {
                            session.current = Some(id);
                            continue;
                        }
                        tracing::debug!(request = %id, conn = %key.0, "Request complete");
                        if ends_connection(req) {
                            session.halt();
                            return Ok(());
                        }
                    }
                }

                ParseEvent::Body { chunk, done } => {
                    let Some(id) = session.current else {
                        continue;
                    };
                    let Some(req) = self.registry.get_mut(id) else {
                        session.current = None;
                        continue;
                    };

                    req.append_body(&chunk);
                    if done {
                        req.mark_complete();
                        session.current = None;
                        tracing::debug!(request = %id, conn = %key.0, "Request complete");
                        if ends_connection(req) {
                            session.halt();
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn reject(&mut self, key: SessionKey, err: &HttpError, transport: &mut dyn Transport) {
        let (conn, stream) = key;
        let status = err.status();

        tracing::warn!(conn = %conn, stream = ?stream.map(|s| s.0), status = status.as_u16(), error = %err, "Rejecting request");

        if let Some(id) = self.sessions.get_mut(&key).and_then(|s| s.current.take()) {
            if let Some(req) = self.registry.get_mut(id) {
                req.mark_delete();
            }
        }

        if matches!(err, HttpError::Transport(_)) {
            return;
        }

        let sent = match stream {
            None => {
                let message = writer::serialize_error(status, &self.settings.server_name);
                writer::write_all(transport, conn, &message)
            }
            Some(stream) => {
                let headers = [crate::http::headers::HeaderEntry::new(
                    "Server",
                    self.settings.server_name.as_str(),
                )];
                transport
                    .write_frame(conn, stream, Frame::Reply { status, headers: &headers })
                    .and_then(|_| transport.write_frame(conn, stream, Frame::Data { body: &[], fin: true }))
            }
        };

        if let Err(e) = sent {
            tracing::debug!(conn = %conn, error = %e, "Could not send error response");
        }

        match stream {
            None => self.mark_closing(conn),
            Some(stream) => {
                self.abort_where(|req| req.owner() == conn && req.stream() == Some(stream));
                self.sessions.remove(&key);
            }
        }
    }

    fn mark_closing(&mut self, conn: ConnectionId) {
        if let Some(entry) = self.connections.get_mut(&conn) {
            entry.closing = true;
        }
    }

    /// The transport lost the connection. Its requests that are not yet
    /// finished become DELETE_PENDING without reaching a handler.
    pub fn close_connection(&mut self, conn: ConnectionId) {
        self.abort_where(|req| req.owner() == conn);
        self.sessions.retain(|(c, _), _| *c != conn);
        self.connections.remove(&conn);

        tracing::debug!(conn = %conn, "Connection closed");
    }

    /// The framing layer reset or closed one stream.
    pub fn close_stream(&mut self, conn: ConnectionId, stream: StreamId) {
        self.abort_where(|req| req.owner() == conn && req.stream() == Some(stream));
        self.sessions.remove(&(conn, Some(stream)));
    }

    fn abort_where(&mut self, matches: impl Fn(&Request) -> bool) {
        for (id, req) in self.registry.iter_mut() {
            if matches(req) && !req.is_delete_pending() {
                tracing::debug!(request = %id, complete = req.is_complete(), "Aborting request");
                req.mark_delete();
            }
        }
    }

    /// Runs one dispatcher pass. Returns how many handler calls were made.
    ///
    /// On a byte-stream connection only the oldest unfinished request is
    /// handed to the handler, so responses leave in request order. Requests
    /// of a connection that is closing are dropped unanswered.
    pub fn process(
        &mut self,
        handler: &mut dyn Handler,
        transport: &mut dyn Transport,
        log: &mut dyn AccessLog,
    ) -> usize {
        let mut handled = 0;
        let mut waiting: HashSet<ConnectionId> = HashSet::new();

        for id in self.registry.ids() {
            let Some(req) = self.registry.get_mut(id) else {
                continue;
            };

            if req.is_delete_pending() {
                self.reclaim(id, handler, log);
                continue;
            }

            let conn = req.owner();
            let stream = req.stream();

            if self.connections.get(&conn).is_none_or(|c| c.closing) {
                tracing::debug!(request = %id, conn = %conn, "Dropping request on closing connection");
                req.mark_delete();
                continue;
            }

            if stream.is_none() && waiting.contains(&conn) {
                continue;
            }

            if !req.is_complete() {
                continue;
            }

            handled += 1;
            let outcome = handler.handle(req, transport);

            match outcome {
                HandlerOutcome::Done => {
                    if !req.is_delete_pending() {
                        tracing::warn!(request = %id, path = %req.path(), "Handler finished without responding");
                        if let Err(e) = req.respond(transport, StatusCode::InternalError, &[]) {
                            tracing::error!(request = %id, error = %e, "Fallback response failed");
                        }
                    }
                }
                HandlerOutcome::Retry => {}
                HandlerOutcome::Error => {
                    tracing::warn!(request = %id, conn = %conn, "Handler failed, closing connection");
                    req.mark_delete();
                }
            }

            let cut_short = req.response_started() && req.end().is_none();
            let finished = req.is_delete_pending();
            let keep_alive = req.keep_alive();

            if cut_short {
                tracing::warn!(request = %id, conn = %conn, stream = ?stream.map(|s| s.0), "Response cut short");
                match stream {
                    None => self.mark_closing(conn),
                    Some(stream) => {
                        self.sessions.remove(&(conn, Some(stream)));
                    }
                }
            }

            if outcome == HandlerOutcome::Error {
                self.mark_closing(conn);
            } else if stream.is_none() && finished && !keep_alive {
                self.mark_closing(conn);
            }

            if stream.is_none() && !finished {
                waiting.insert(conn);
            }
        }

        handled
    }

    fn reclaim(&mut self, id: RequestId, handler: &mut dyn Handler, log: &mut dyn AccessLog) {
        let Some(mut req) = self.registry.free(id) else {
            return;
        };

        if let Some(entry) = AccessLogEntry::from_request(&req) {
            log.record(&entry);
        }

        if let Some(extra) = req.take_extra() {
            handler.release_extra(extra);
        }

        tracing::trace!(request = %id, remaining = self.registry.len(), "Request freed");
    }

    /// Frees every request. Called when the worker stops.
    pub fn drain(&mut self, handler: &mut dyn Handler, log: &mut dyn AccessLog) {
        for id in self.registry.ids() {
            if let Some(req) = self.registry.get_mut(id) {
                req.mark_delete();
            }
            self.reclaim(id, handler, log);
        }

        self.sessions.clear();
        self.connections.clear();
    }
}

fn ends_connection(req: &Request) -> bool {
    req.stream().is_none() && !req.keep_alive()
}

fn create_request(
    registry: &mut RequestRegistry,
    (conn, stream): SessionKey,
    head: RequestHead,
    server_name: &str,
) -> Result<RequestId, HttpError> {
    let id = registry.create(conn, stream, &head.method, &head.path, &head.host)?;
    let Some(req) = registry.get_mut(id) else {
        return Err(HttpError::MalformedRequestLine);
    };

    req.version = head.version;
    req.set_headers(head.headers);
    if let Some(agent) = req.header("User-Agent").map(str::to_string) {
        req.set_agent(&agent);
    }
    if let Err(e) = req.add_response_header("Server", server_name) {
        req.mark_delete();
        return Err(e);
    }

    if head.content_length > 0 {
        req.reserve_body(head.content_length);
    } else {
        req.mark_complete();
    }

    tracing::debug!(
        request = %id,
        conn = %conn,
        method = %req.method,
        path = %req.path(),
        "Request created"
    );
    Ok(id)
}
