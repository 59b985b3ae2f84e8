//! Incremental request parser.
//!
//! Bytes are consumed from the connection buffer as they arrive, one line at
//! a time. A partial line stays in the buffer until its terminator shows up,
//! so a head split across any number of reads parses the same as one that
//! arrives whole. Line length and header count are checked on every call.

use bytes::{Bytes, BytesMut};

use crate::http::error::HttpError;
use crate::http::headers::HeaderTable;
use crate::http::request::Method;
use crate::http::{HEADER_MAX_LEN, URI_LEN};

/// Request line and headers of a request whose head is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub version: String,
    pub host: String,
    pub headers: HeaderTable,
    pub content_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// More bytes are needed.
    Incomplete,
    /// Blank line reached. The body, if any, follows as `Body` events.
    Head(RequestHead),
    /// A slice of the body; `done` marks its last byte.
    Body { chunk: Bytes, done: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    RequestLine,
    Headers,
    Body { remaining: usize },
}

struct RequestLine {
    method: String,
    path: String,
    version: String,
}

/// Per-connection (or per-stream) parse state.
pub struct HeaderParser {
    state: State,
    request_line: Option<RequestLine>,
    headers: HeaderTable,
    max_body: usize,
    failed: Option<HttpError>,
}

impl HeaderParser {
    pub fn new(max_body: usize) -> Self {
        Self {
            state: State::RequestLine,
            request_line: None,
            headers: HeaderTable::new(),
            max_body,
            failed: None,
        }
    }

    /// Consumes what it can from `buf` and reports the next event.
    ///
    /// Call repeatedly until it returns [`ParseEvent::Incomplete`]. After an
    /// error the parser is poisoned and keeps returning that error.
    pub fn advance(&mut self, buf: &mut BytesMut) -> Result<ParseEvent, HttpError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }

        let result = self.step(buf);
        if let Err(err) = &result {
            tracing::debug!(error = %err, "Request parse failed");
            self.failed = Some(err.clone());
        }
        result
    }

    /// True between requests, with no partial head held.
    pub fn is_idle(&self) -> bool {
        self.state == State::RequestLine && self.failed.is_none()
    }

    fn step(&mut self, buf: &mut BytesMut) -> Result<ParseEvent, HttpError> {
        loop {
            match self.state {
                State::RequestLine => {
                    let line = match take_line(buf) {
                        Ok(Some(line)) => line,
                        Ok(None) => return Ok(ParseEvent::Incomplete),
                        Err(LineTooLong) => return Err(HttpError::UriTooLong),
                    };

                    // Stray line breaks between pipelined requests are ignored.
                    if line.is_empty() {
                        continue;
                    }

                    self.request_line = Some(parse_request_line(&line)?);
                    self.state = State::Headers;
                }

                State::Headers => {
                    let line = match take_line(buf) {
                        Ok(Some(line)) => line,
                        Ok(None) => return Ok(ParseEvent::Incomplete),
                        Err(LineTooLong) => return Err(HttpError::HeaderTooLong),
                    };

                    if line.is_empty() {
                        return self.finish_head().map(ParseEvent::Head);
                    }

                    let (name, value) = parse_header_line(&line)?;
                    self.headers.push(name, value)?;
                }

                State::Body { remaining } => {
                    if buf.is_empty() {
                        return Ok(ParseEvent::Incomplete);
                    }

                    let n = remaining.min(buf.len());
                    let chunk = buf.split_to(n).freeze();
                    let remaining = remaining - n;

                    self.state = if remaining == 0 {
                        State::RequestLine
                    } else {
                        State::Body { remaining }
                    };

                    return Ok(ParseEvent::Body {
                        chunk,
                        done: remaining == 0,
                    });
                }
            }
        }
    }

    fn finish_head(&mut self) -> Result<RequestHead, HttpError> {
        let line = self
            .request_line
            .take()
            .ok_or(HttpError::MalformedRequestLine)?;
        let headers = std::mem::take(&mut self.headers);

        if headers.contains("Transfer-Encoding") {
            return Err(HttpError::UnsupportedTransferEncoding);
        }

        let host = headers
            .get("Host")
            .map(str::to_string)
            .ok_or(HttpError::MissingHost)?;

        let content_length = content_length(&headers)?;
        let content_length = match content_length {
            Some(len) => len,
            None if line.method == Method::POST.as_str() => return Err(HttpError::LengthRequired),
            None => 0,
        };

        if content_length > self.max_body {
            return Err(HttpError::BodyTooLarge {
                limit: self.max_body,
            });
        }

        self.state = if content_length > 0 {
            State::Body {
                remaining: content_length,
            }
        } else {
            State::RequestLine
        };

        tracing::trace!(
            method = %line.method,
            path = %line.path,
            headers = headers.len(),
            content_length,
            "Request head parsed"
        );

        Ok(RequestHead {
            method: line.method,
            path: line.path,
            version: line.version,
            host,
            headers,
            content_length,
        })
    }
}

#[derive(Debug)]
struct LineTooLong;

/// Splits one terminated line off `buf`, without its `\n` or `\r\n`.
fn take_line(buf: &mut BytesMut) -> Result<Option<BytesMut>, LineTooLong> {
    match buf.iter().position(|&b| b == b'\n') {
        Some(idx) => {
            let mut line = buf.split_to(idx + 1);
            line.truncate(idx);
            if line.last() == Some(&b'\r') {
                line.truncate(idx - 1);
            }

            if line.len() > HEADER_MAX_LEN {
                return Err(LineTooLong);
            }
            Ok(Some(line))
        }
        None => {
            // A trailing '\r' may be the first half of the terminator.
            let pending = match buf.last() {
                Some(b'\r') => buf.len() - 1,
                _ => buf.len(),
            };

            if pending > HEADER_MAX_LEN {
                return Err(LineTooLong);
            }
            Ok(None)
        }
    }
}

fn parse_request_line(line: &[u8]) -> Result<RequestLine, HttpError> {
    let line = std::str::from_utf8(line).map_err(|_| HttpError::MalformedRequestLine)?;

    let parts: Vec<&str> = line.split(' ').collect();
    let [method, path, version] = parts.as_slice() else {
        return Err(HttpError::MalformedRequestLine);
    };

    if method.is_empty() || path.is_empty() || version.is_empty() {
        return Err(HttpError::MalformedRequestLine);
    }

    if Method::from_str(method).is_none() {
        return Err(HttpError::UnsupportedMethod(method.to_string()));
    }

    if path.len() >= URI_LEN {
        return Err(HttpError::UriTooLong);
    }
    if !path.starts_with('/') {
        return Err(HttpError::MalformedRequestLine);
    }

    match *version {
        "HTTP/1.1" | "HTTP/1.0" => {}
        v if v.starts_with("HTTP/") => return Err(HttpError::BadVersion(v.to_string())),
        _ => return Err(HttpError::MalformedRequestLine),
    }

    Ok(RequestLine {
        method: method.to_string(),
        path: path.to_string(),
        version: version.to_string(),
    })
}

fn parse_header_line(line: &[u8]) -> Result<(String, String), HttpError> {
    let line = std::str::from_utf8(line).map_err(|_| HttpError::MalformedHeader)?;

    let (name, value) = line.split_once(':').ok_or(HttpError::MalformedHeader)?;
    let name = name.trim();

    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(HttpError::MalformedHeader);
    }

    Ok((name.to_string(), value.trim().to_string()))
}

/// Content-Length, if present. Repeated headers must agree.
fn content_length(headers: &HeaderTable) -> Result<Option<usize>, HttpError> {
    let mut found: Option<usize> = None;

    for entry in headers.iter().filter(|e| e.name_matches("Content-Length")) {
        let value = entry.value.as_str();
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(HttpError::InvalidContentLength);
        }

        let len = value
            .parse::<usize>()
            .map_err(|_| HttpError::InvalidContentLength)?;

        match found {
            Some(prev) if prev != len => return Err(HttpError::InvalidContentLength),
            _ => found = Some(len),
        }
    }

    Ok(found)
}
