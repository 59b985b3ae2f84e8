//! HTTP request parsing and request lifecycle.
//!
//! This module turns raw header bytes into bounded [`request::Request`]
//! objects and carries them from parsing to reclamation. It works the same
//! way for plain byte-stream connections and for connections multiplexed into
//! streams by an outer framing layer.
//!
//! # Architecture
//!
//! - **`parser`**: incremental header-line parser fed from a connection buffer
//! - **`headers`**: bounded, ordered header tables (inbound and outbound)
//! - **`decode`**: `%XX` / `+` decoding for query strings and form bodies
//! - **`arguments`**: bounded argument store built on demand
//! - **`request`**: the request object, its flags and the request registry
//! - **`response`**: status table and the response-emission contract
//! - **`writer`**: the transport boundary and response serialization
//! - **`date`**: HTTP-date parsing
//! - **`dispatcher`**: per-worker loop driving parsing, handlers and sweeping
//! - **`accesslog`**: access-log sink boundary
//! - **`connection`**: tokio glue between sockets and a dispatcher
//!
//! # Request Lifecycle
//!
//! ```text
//!        ┌─────────────┐
//!        │   Parsing   │ ← header lines arrive in any number of chunks
//!        └──────┬──────┘
//!               │ end of headers (+ body)  → COMPLETE
//!               ▼
//!        ┌──────────────────┐
//!        │    Handling      │ ← handler reads headers/arguments, responds
//!        └──────┬───────────┘
//!               │ response handed to transport → DELETE_PENDING
//!               ▼
//!        ┌──────────────────┐
//!        │    Reclaimed     │ ← freed by the next dispatcher pass
//!        └──────────────────┘
//! ```
//!
//! A connection closing before COMPLETE takes the request straight to
//! DELETE_PENDING without a handler ever seeing it.

pub mod accesslog;
pub mod arguments;
pub mod connection;
pub mod date;
pub mod decode;
pub mod dispatcher;
pub mod error;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;

pub use error::{HttpError, TransportError};

/// Longest raw header line accepted, terminator excluded.
pub const HEADER_MAX_LEN: usize = 4096;
/// Request paths must be strictly shorter than this.
pub const URI_LEN: usize = 2000;
/// User agents are kept strictly shorter than this.
pub const USERAGENT_LEN: usize = 256;
/// Maximum number of entries in a header table.
pub const REQ_HEADER_MAX: usize = 25;
/// Maximum number of decoded arguments kept per request.
pub const MAX_QUERY_ARGS: usize = 10;
/// Hosts must be strictly shorter than this.
pub const DOMAIN_NAME_LEN: usize = 255;
