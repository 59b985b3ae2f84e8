use std::time::Instant;

use crate::http::error::HttpError;
use crate::http::headers::HeaderEntry;
use crate::http::request::Request;
use crate::http::writer::{self, Frame, Transport};

/// HTTP status codes.
///
/// Discriminants are the wire values, so `StatusCode::NotFound as u16 == 404`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    Continue = 100,
    SwitchingProtocols = 101,
    Ok = 200,
    Created = 201,
    Accepted = 202,
    NonAuthoritative = 203,
    NoContent = 204,
    ResetContent = 205,
    PartialContent = 206,
    MultipleChoices = 300,
    MovedPermanently = 301,
    Found = 302,
    SeeOther = 303,
    NotModified = 304,
    UseProxy = 305,
    TemporaryRedirect = 307,
    BadRequest = 400,
    Unauthorized = 401,
    PaymentRequired = 402,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    NotAcceptable = 406,
    ProxyAuthRequired = 407,
    RequestTimeout = 408,
    Conflict = 409,
    Gone = 410,
    LengthRequired = 411,
    PreconditionFailed = 412,
    RequestEntityTooLarge = 413,
    RequestUriTooLarge = 414,
    UnsupportedMediaType = 415,
    RequestRangeInvalid = 416,
    ExpectationFailed = 417,
    InternalError = 500,
    NotImplemented = 501,
    BadGateway = 502,
    ServiceUnavailable = 503,
    GatewayTimeout = 504,
    BadVersion = 505,
}

const ALL_STATUS_CODES: [StatusCode; 40] = [
    StatusCode::Continue,
    StatusCode::SwitchingProtocols,
    StatusCode::Ok,
    StatusCode::Created,
    StatusCode::Accepted,
    StatusCode::NonAuthoritative,
    StatusCode::NoContent,
    StatusCode::ResetContent,
    StatusCode::PartialContent,
    StatusCode::MultipleChoices,
    StatusCode::MovedPermanently,
    StatusCode::Found,
    StatusCode::SeeOther,
    StatusCode::NotModified,
    StatusCode::UseProxy,
    StatusCode::TemporaryRedirect,
    StatusCode::BadRequest,
    StatusCode::Unauthorized,
    StatusCode::PaymentRequired,
    StatusCode::Forbidden,
    StatusCode::NotFound,
    StatusCode::MethodNotAllowed,
    StatusCode::NotAcceptable,
    StatusCode::ProxyAuthRequired,
    StatusCode::RequestTimeout,
    StatusCode::Conflict,
    StatusCode::Gone,
    StatusCode::LengthRequired,
    StatusCode::PreconditionFailed,
    StatusCode::RequestEntityTooLarge,
    StatusCode::RequestUriTooLarge,
    StatusCode::UnsupportedMediaType,
    StatusCode::RequestRangeInvalid,
    StatusCode::ExpectationFailed,
    StatusCode::InternalError,
    StatusCode::NotImplemented,
    StatusCode::BadGateway,
    StatusCode::ServiceUnavailable,
    StatusCode::GatewayTimeout,
    StatusCode::BadVersion,
];

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use keel::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Looks up a code in the status table.
    pub fn from_u16(code: u16) -> Option<Self> {
        ALL_STATUS_CODES.iter().copied().find(|s| s.as_u16() == code)
    }

    /// Every code in the table, in ascending order.
    pub fn all() -> &'static [StatusCode] {
        &ALL_STATUS_CODES
    }

    /// Returns the standard HTTP reason phrase for this status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use keel::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::RequestUriTooLarge.reason_phrase(), "Request-URI Too Large");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Continue => "Continue",
            StatusCode::SwitchingProtocols => "Switching Protocols",
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::Accepted => "Accepted",
            StatusCode::NonAuthoritative => "Non-Authoritative Information",
            StatusCode::NoContent => "No Content",
            StatusCode::ResetContent => "Reset Content",
            StatusCode::PartialContent => "Partial Content",
            StatusCode::MultipleChoices => "Multiple Choices",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::Found => "Found",
            StatusCode::SeeOther => "See Other",
            StatusCode::NotModified => "Not Modified",
            StatusCode::UseProxy => "Use Proxy",
            StatusCode::TemporaryRedirect => "Temporary Redirect",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::PaymentRequired => "Payment Required",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::NotAcceptable => "Not Acceptable",
            StatusCode::ProxyAuthRequired => "Proxy Authentication Required",
            StatusCode::RequestTimeout => "Request Timeout",
            StatusCode::Conflict => "Conflict",
            StatusCode::Gone => "Gone",
            StatusCode::LengthRequired => "Length Required",
            StatusCode::PreconditionFailed => "Precondition Failed",
            StatusCode::RequestEntityTooLarge => "Request Entity Too Large",
            StatusCode::RequestUriTooLarge => "Request-URI Too Large",
            StatusCode::UnsupportedMediaType => "Unsupported Media Type",
            StatusCode::RequestRangeInvalid => "Requested Range Not Satisfiable",
            StatusCode::ExpectationFailed => "Expectation Failed",
            StatusCode::InternalError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::BadGateway => "Bad Gateway",
            StatusCode::ServiceUnavailable => "Service Unavailable",
            StatusCode::GatewayTimeout => "Gateway Timeout",
            StatusCode::BadVersion => "HTTP Version Not Supported",
        }
    }
}

impl Request {
    /// Sends the response for this request through `transport`.
    ///
    /// Byte-stream connections get a serialized HTTP/1.1 message; streams of
    /// a multiplexed connection get a reply frame followed by a final data
    /// frame. `Content-Length` and `Connection` are added unless the handler
    /// already set them.
    ///
    /// Once the transport has accepted every byte the request records its
    /// status and end time and becomes DELETE_PENDING. A second call fails
    /// with [`HttpError::AlreadyResponded`], including after a failed write:
    /// the transport may already hold part of the message, so the request
    /// becomes DELETE_PENDING without an end time and the dispatcher drops
    /// its connection or stream.
    pub fn respond(
        &mut self,
        transport: &mut dyn Transport,
        status: StatusCode,
        body: &[u8],
    ) -> Result<(), HttpError> {
        if self.response_started() || self.is_delete_pending() {
            return Err(HttpError::AlreadyResponded);
        }

        let headers = self.outgoing_headers(body.len());
        self.mark_response_started();

        let sent = match self.stream() {
            None => {
                let message = writer::serialize_response(status, &headers, body);
                writer::write_all(transport, self.owner(), &message)
            }
            Some(stream) => transport
                .write_frame(self.owner(), stream, Frame::Reply { status, headers: &headers })
                .and_then(|_| transport.write_frame(self.owner(), stream, Frame::Data { body, fin: true })),
        };

        if let Err(e) = sent {
            tracing::debug!(conn = %self.owner(), status = status.as_u16(), error = %e, "Response write failed");
            self.mark_delete();
            return Err(e.into());
        }

        tracing::debug!(
            conn = %self.owner(),
            status = status.as_u16(),
            path = %self.path(),
            bytes = body.len(),
            "Response handed to transport"
        );

        self.set_status(status);
        self.set_end(Instant::now());
        self.mark_delete();
        Ok(())
    }

    /// Responds 404 with an empty body.
    pub fn generic_404(&mut self, transport: &mut dyn Transport) -> Result<(), HttpError> {
        self.respond(transport, StatusCode::NotFound, &[])
    }

    fn outgoing_headers(&self, body_len: usize) -> Vec<HeaderEntry> {
        let mut headers: Vec<HeaderEntry> = self.response_headers().iter().cloned().collect();
        let table = self.response_headers();

        if !table.contains("Content-Length") {
            headers.push(HeaderEntry::new("Content-Length", body_len.to_string()));
        }

        // Multiplexed streams have no per-connection persistence header.
        if self.stream().is_none() && !table.contains("Connection") {
            let value = if self.keep_alive() { "keep-alive" } else { "close" };
            headers.push(HeaderEntry::new("Connection", value));
        }

        headers
    }
}
