use thiserror::Error;

use crate::http::response::StatusCode;
use crate::http::{DOMAIN_NAME_LEN, HEADER_MAX_LEN, REQ_HEADER_MAX, URI_LEN};

/// Failures raised while parsing a request or emitting its response.
///
/// Two bounded-resource situations are not errors:
/// argument population past [`crate::http::MAX_QUERY_ARGS`] drops the extra
/// pairs silently, and an unparseable HTTP date yields `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    #[error("malformed request line")]
    MalformedRequestLine,

    #[error("header line longer than {} bytes", HEADER_MAX_LEN)]
    HeaderTooLong,

    #[error("more than {} headers", REQ_HEADER_MAX)]
    TooManyHeaders,

    #[error("request uri must be shorter than {} bytes", URI_LEN)]
    UriTooLong,

    #[error("malformed percent-encoding")]
    MalformedEncoding,

    #[error("unsupported method `{0}`")]
    UnsupportedMethod(String),

    #[error("unsupported protocol version `{0}`")]
    BadVersion(String),

    #[error("malformed header line")]
    MalformedHeader,

    #[error("missing or oversized host (limit {} bytes)", DOMAIN_NAME_LEN)]
    MissingHost,

    #[error("request body without content-length")]
    LengthRequired,

    #[error("invalid content-length")]
    InvalidContentLength,

    #[error("request body larger than {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("transfer-encoding is not supported")]
    UnsupportedTransferEncoding,

    #[error("response header contains a line break")]
    InvalidHeaderValue,

    #[error("response already sent")]
    AlreadyResponded,

    #[error("transport: {0}")]
    Transport(#[from] TransportError),
}

/// Failures reported by the byte-accepting side of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("transport accepted no bytes")]
    Stalled,

    #[error("framed writes are not supported on this connection")]
    Unsupported,
}

impl HttpError {
    /// Status code sent to the client when this error aborts a request.
    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::MalformedRequestLine
            | HttpError::TooManyHeaders
            | HttpError::MalformedEncoding
            | HttpError::MalformedHeader
            | HttpError::MissingHost
            | HttpError::InvalidContentLength => StatusCode::BadRequest,
            HttpError::HeaderTooLong | HttpError::BodyTooLarge { .. } => {
                StatusCode::RequestEntityTooLarge
            }
            HttpError::UriTooLong => StatusCode::RequestUriTooLarge,
            HttpError::UnsupportedMethod(token) => {
                if crate::http::request::Method::is_known_token(token) {
                    StatusCode::MethodNotAllowed
                } else {
                    StatusCode::NotImplemented
                }
            }
            HttpError::BadVersion(_) => StatusCode::BadVersion,
            HttpError::LengthRequired => StatusCode::LengthRequired,
            HttpError::UnsupportedTransferEncoding => StatusCode::NotImplemented,
            HttpError::InvalidHeaderValue
            | HttpError::AlreadyResponded
            | HttpError::Transport(_) => StatusCode::InternalError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_errors_split_between_405_and_501() {
        let known = HttpError::UnsupportedMethod("DELETE".to_string());
        let unknown = HttpError::UnsupportedMethod("BREW".to_string());

        assert_eq!(known.status(), StatusCode::MethodNotAllowed);
        assert_eq!(unknown.status(), StatusCode::NotImplemented);
    }

    #[test]
    fn oversize_errors_map_to_413_and_414() {
        assert_eq!(HttpError::HeaderTooLong.status().as_u16(), 413);
        assert_eq!(HttpError::UriTooLong.status().as_u16(), 414);
        assert_eq!(HttpError::TooManyHeaders.status().as_u16(), 400);
    }
}
