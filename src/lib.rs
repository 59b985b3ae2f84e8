//! Keel - event-driven HTTP request engine
//!
//! Core library for request parsing, request lifecycle and response emission.

pub mod config;
pub mod http;
pub mod server;
