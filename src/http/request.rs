use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

use bytes::BytesMut;

use crate::http::arguments::ArgumentStore;
use crate::http::date::parse_http_date;
use crate::http::error::HttpError;
use crate::http::headers::HeaderTable;
use crate::http::{DOMAIN_NAME_LEN, URI_LEN, USERAGENT_LEN};

/// HTTP request methods.
///
/// Only GET and POST are served. Other standard methods are recognised so
/// they can be answered with 405 instead of 501.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Submit data
    POST,
}

const KNOWN_METHODS: [&str; 9] = [
    "GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH", "TRACE", "CONNECT",
];

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Arguments
    ///
    /// * `s` - String representation of the method (case-sensitive, uppercase)
    ///
    /// # Returns
    ///
    /// `Some(Method)` if the string is a served method, `None` otherwise.
    ///
    /// # Example
    ///
    /// ```
    /// # use keel::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// assert_eq!(Method::from_str("PUT"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            _ => None,
        }
    }

    /// Whether `s` names a standard HTTP method, served or not.
    pub fn is_known_token(s: &str) -> bool {
        KNOWN_METHODS.contains(&s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque handle to a connection owned by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

/// Opaque handle to a stream inside a multiplexed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(pub u32);

/// Registry key of a live request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Lifecycle bits of a request. Both are set at most once and never cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestFlags(u8);

impl RequestFlags {
    /// Headers (and body, if any) fully received.
    pub const COMPLETE: u8 = 0x01;
    /// Finished; waiting for the dispatcher to reclaim it.
    pub const DELETE_PENDING: u8 = 0x02;

    pub fn contains(&self, bit: u8) -> bool {
        self.0 & bit == bit
    }

    fn insert(&mut self, bit: u8) {
        self.0 |= bit;
    }

    pub fn bits(&self) -> u8 {
        self.0
    }
}

/// A request bound to one connection, or to one stream of a multiplexed
/// connection.
///
/// `owner` and `stream` are handles into tables kept by the dispatcher and
/// the transport; dropping a request never touches the connection.
pub struct Request {
    pub method: Method,
    pub version: String,
    flags: RequestFlags,
    status: Option<crate::http::response::StatusCode>,
    start: Instant,
    end: Option<Instant>,
    host: String,
    path: String,
    agent: Option<String>,
    owner: ConnectionId,
    stream: Option<StreamId>,
    post_data: Option<BytesMut>,
    hdlr_extra: Option<Box<dyn Any>>,
    req_headers: HeaderTable,
    resp_headers: HeaderTable,
    arguments: ArgumentStore,
    arguments_populated: bool,
    response_started: bool,
    content_length: usize,
}

impl Request {
    /// Creates an empty request after validating the request line.
    ///
    /// The method must be GET or POST, the path must start with `/` and be
    /// shorter than [`URI_LEN`], and the host must be non-empty and shorter
    /// than [`DOMAIN_NAME_LEN`].
    pub fn new(
        owner: ConnectionId,
        stream: Option<StreamId>,
        method: &str,
        path: &str,
        host: &str,
    ) -> Result<Self, HttpError> {
        let method = Method::from_str(method)
            .ok_or_else(|| HttpError::UnsupportedMethod(method.to_string()))?;

        if !path.starts_with('/') {
            return Err(HttpError::MalformedRequestLine);
        }
        if path.len() >= URI_LEN {
            return Err(HttpError::UriTooLong);
        }
        if host.is_empty() || host.len() >= DOMAIN_NAME_LEN {
            return Err(HttpError::MissingHost);
        }

        Ok(Self {
            method,
            version: "HTTP/1.1".to_string(),
            flags: RequestFlags::default(),
            status: None,
            start: Instant::now(),
            end: None,
            host: host.to_string(),
            path: path.to_string(),
            agent: None,
            owner,
            stream,
            post_data: None,
            hdlr_extra: None,
            req_headers: HeaderTable::new(),
            resp_headers: HeaderTable::new(),
            arguments: ArgumentStore::new(),
            arguments_populated: false,
            response_started: false,
            content_length: 0,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Full request target, query string included.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Request target without its query string.
    pub fn route(&self) -> &str {
        self.path.split_once('?').map_or(self.path.as_str(), |(route, _)| route)
    }

    /// Raw query string, if the path carries one.
    pub fn query(&self) -> Option<&str> {
        self.path.split_once('?').map(|(_, query)| query)
    }

    pub fn agent(&self) -> Option<&str> {
        self.agent.as_deref()
    }

    pub fn owner(&self) -> ConnectionId {
        self.owner
    }

    pub fn stream(&self) -> Option<StreamId> {
        self.stream
    }

    pub fn flags(&self) -> RequestFlags {
        self.flags
    }

    pub fn is_complete(&self) -> bool {
        self.flags.contains(RequestFlags::COMPLETE)
    }

    pub fn is_delete_pending(&self) -> bool {
        self.flags.contains(RequestFlags::DELETE_PENDING)
    }

    pub fn status(&self) -> Option<crate::http::response::StatusCode> {
        self.status
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn end(&self) -> Option<Instant> {
        self.end
    }

    /// Whether a response was handed to the transport, even partly.
    pub fn response_started(&self) -> bool {
        self.response_started
    }

    /// Time from creation to response, if a response was sent.
    pub fn elapsed(&self) -> Option<Duration> {
        self.end.map(|end| end.duration_since(self.start))
    }

    pub fn headers(&self) -> &HeaderTable {
        &self.req_headers
    }

    pub fn response_headers(&self) -> &HeaderTable {
        &self.resp_headers
    }

    /// Retrieves an inbound header value by name, ignoring case.
    ///
    /// # Returns
    ///
    /// `Some(&str)` with the first matching value, `None` otherwise.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.req_headers.get(key)
    }

    /// Header `key` read as an HTTP date, in Unix seconds.
    pub fn header_date(&self, key: &str) -> Option<i64> {
        self.header(key).and_then(parse_http_date)
    }

    /// Declared body length as validated by the parser; 0 without a body.
    pub fn content_length(&self) -> usize {
        self.content_length
    }

    /// Determines whether the connection should remain open after the response.
    ///
    /// HTTP/1.1 defaults to keep-alive unless `Connection: close` is sent;
    /// HTTP/1.0 closes unless `Connection: keep-alive` is sent.
    pub fn keep_alive(&self) -> bool {
        match self.header("Connection") {
            Some(v) if v.eq_ignore_ascii_case("close") => false,
            Some(v) if v.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version != "HTTP/1.0",
        }
    }

    /// Appends a header to the outbound table. Duplicates are kept.
    pub fn add_response_header(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), HttpError> {
        let name = name.into();
        let value = value.into();

        if name.is_empty() || has_line_break(&name) || has_line_break(&value) {
            return Err(HttpError::InvalidHeaderValue);
        }

        self.resp_headers.push(name, value)
    }

    /// Request body, if one was received.
    pub fn post_data(&self) -> Option<&[u8]> {
        self.post_data.as_deref()
    }

    /// Request body as text, if it is valid UTF-8.
    pub fn post_data_text(&self) -> Option<&str> {
        self.post_data
            .as_deref()
            .and_then(|body| std::str::from_utf8(body).ok())
    }

    /// Whether the body is `application/x-www-form-urlencoded`.
    pub fn is_form_encoded(&self) -> bool {
        self.header("Content-Type")
            .and_then(|v| v.split(';').next())
            .map(|mime| mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"))
            .unwrap_or(false)
    }

    /// Decodes arguments from the query string and, for form-encoded bodies,
    /// from the body.
    ///
    /// Runs once; later calls return the existing count. At most
    /// [`crate::http::MAX_QUERY_ARGS`] entries are kept and further pairs are
    /// dropped silently. On a decoding failure the store stays empty.
    pub fn populate_arguments(&mut self) -> Result<usize, HttpError> {
        if self.arguments_populated {
            return Ok(self.arguments.len());
        }

        let mut store = ArgumentStore::new();

        if let Some(query) = self.query() {
            store.extend_from_encoded(query)?;
        }

        if self.method == Method::POST && self.is_form_encoded() {
            if let Some(body) = self.post_data.as_deref() {
                let text = std::str::from_utf8(body).map_err(|_| HttpError::MalformedEncoding)?;
                store.extend_from_encoded(text)?;
            }
        }

        self.arguments = store;
        self.arguments_populated = true;
        Ok(self.arguments.len())
    }

    pub fn arguments(&self) -> &ArgumentStore {
        &self.arguments
    }

    /// First value of argument `name`. Requires [`Self::populate_arguments`].
    pub fn argument(&self, name: &str) -> Option<&str> {
        self.arguments.lookup(name)
    }

    /// All values for each of `names`. Requires [`Self::populate_arguments`].
    pub fn arguments_multiple<'a>(&'a self, names: &[&'a str]) -> HashMap<&'a str, Vec<&'a str>> {
        self.arguments.lookup_multiple(names)
    }

    /// Attaches handler state to the request.
    ///
    /// The request only stores it; the dispatcher hands it back to the
    /// handler's `release_extra` when the request is reclaimed.
    pub fn set_extra<T: Any>(&mut self, extra: T) {
        self.hdlr_extra = Some(Box::new(extra));
    }

    pub fn extra<T: Any>(&self) -> Option<&T> {
        self.hdlr_extra.as_ref().and_then(|e| e.downcast_ref())
    }

    pub fn extra_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.hdlr_extra.as_mut().and_then(|e| e.downcast_mut())
    }

    pub fn take_extra(&mut self) -> Option<Box<dyn Any>> {
        self.hdlr_extra.take()
    }

    pub(crate) fn set_agent(&mut self, agent: &str) {
        let mut end = agent.len().min(USERAGENT_LEN - 1);
        while !agent.is_char_boundary(end) {
            end -= 1;
        }
        self.agent = Some(agent[..end].to_string());
    }

    pub(crate) fn set_headers(&mut self, headers: HeaderTable) {
        self.req_headers = headers;
    }

    pub(crate) fn reserve_body(&mut self, len: usize) {
        self.content_length = len;
        self.post_data = Some(BytesMut::with_capacity(len));
    }

    pub(crate) fn append_body(&mut self, chunk: &[u8]) {
        self.post_data
            .get_or_insert_with(BytesMut::new)
            .extend_from_slice(chunk);
    }

    pub(crate) fn mark_complete(&mut self) {
        self.flags.insert(RequestFlags::COMPLETE);
    }

    pub(crate) fn mark_delete(&mut self) {
        self.flags.insert(RequestFlags::DELETE_PENDING);
    }

    pub(crate) fn mark_response_started(&mut self) {
        self.response_started = true;
    }

    pub(crate) fn set_status(&mut self, status: crate::http::response::StatusCode) {
        self.status = Some(status);
    }

    pub(crate) fn set_end(&mut self, end: Instant) {
        self.end = Some(end);
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("host", &self.host)
            .field("owner", &self.owner)
            .field("stream", &self.stream)
            .field("flags", &self.flags)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

fn has_line_break(s: &str) -> bool {
    s.contains(['\r', '\n'])
}

/// Live requests of one worker, in creation order.
#[derive(Debug, Default)]
pub struct RequestRegistry {
    requests: BTreeMap<RequestId, Request>,
    next_id: u64,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers a new request.
    pub fn create(
        &mut self,
        owner: ConnectionId,
        stream: Option<StreamId>,
        method: &str,
        path: &str,
        host: &str,
    ) -> Result<RequestId, HttpError> {
        let request = Request::new(owner, stream, method, path, host)?;

        self.next_id += 1;
        let id = RequestId(self.next_id);
        self.requests.insert(id, request);
        Ok(id)
    }

    /// Deregisters a request and hands it back so its owner can release
    /// handler state before dropping it. A second call for the same id
    /// returns `None`.
    pub fn free(&mut self, id: RequestId) -> Option<Request> {
        self.requests.remove(&id)
    }

    pub fn get(&self, id: RequestId) -> Option<&Request> {
        self.requests.get(&id)
    }

    pub fn get_mut(&mut self, id: RequestId) -> Option<&mut Request> {
        self.requests.get_mut(&id)
    }

    pub fn ids(&self) -> Vec<RequestId> {
        self.requests.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RequestId, &Request)> {
        self.requests.iter().map(|(id, req)| (*id, req))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RequestId, &mut Request)> {
        self.requests.iter_mut().map(|(id, req)| (*id, req))
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
