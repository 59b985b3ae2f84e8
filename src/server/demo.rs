use std::fmt::Write;

use crate::http::dispatcher::{Handler, HandlerOutcome};
use crate::http::request::Request;
use crate::http::response::StatusCode;
use crate::http::writer::Transport;

/// Handler shipped with the binary.
///
/// - `/` answers a greeting, or 304 to any valid `If-Modified-Since`
/// - `/echo` answers its decoded arguments, one `name=value` per line
/// - anything else is a 404
#[derive(Debug, Default, Clone, Copy)]
pub struct DemoHandler;

impl Handler for DemoHandler {
    fn handle(&mut self, req: &mut Request, transport: &mut dyn Transport) -> HandlerOutcome {
        let route = req.route().to_string();
        let result = match route.as_str() {
            "/" => greet(req, transport),
            "/echo" => echo(req, transport),
            _ => req.generic_404(transport),
        };

        match result {
            Ok(()) => HandlerOutcome::Done,
            Err(e) => {
                tracing::warn!(path = %req.path(), error = %e, "Response failed");
                HandlerOutcome::Error
            }
        }
    }
}

fn greet(req: &mut Request, transport: &mut dyn Transport) -> Result<(), crate::http::HttpError> {
    // The greeting never changes.
    if req.header_date("If-Modified-Since").is_some() {
        return req.respond(transport, StatusCode::NotModified, &[]);
    }

    req.add_response_header("Content-Type", "text/plain")?;
    req.respond(transport, StatusCode::Ok, b"Hello from keel\n")
}

fn echo(req: &mut Request, transport: &mut dyn Transport) -> Result<(), crate::http::HttpError> {
    if let Err(e) = req.populate_arguments() {
        return req.respond(transport, e.status(), e.to_string().as_bytes());
    }

    let mut body = String::new();
    for arg in req.arguments().iter() {
        let _ = writeln!(body, "{}={}", arg.name, arg.value);
    }

    req.add_response_header("Content-Type", "text/plain")?;
    req.respond(transport, StatusCode::Ok, body.as_bytes())
}
