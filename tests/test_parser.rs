use bytes::BytesMut;
use keel::http::parser::{HeaderParser, ParseEvent, RequestHead};
use keel::http::{HttpError, HEADER_MAX_LEN, REQ_HEADER_MAX, URI_LEN};

const MAX_BODY: usize = 64 * 1024;

/// Feeds `input` in pieces of `chunk` bytes and collects the events.
fn parse_in_chunks(input: &[u8], chunk: usize) -> Result<Vec<ParseEvent>, HttpError> {
    let mut parser = HeaderParser::new(MAX_BODY);
    let mut buf = BytesMut::new();
    let mut events = Vec::new();

    for piece in input.chunks(chunk) {
        buf.extend_from_slice(piece);
        loop {
            match parser.advance(&mut buf)? {
                ParseEvent::Incomplete => break,
                event => events.push(event),
            }
        }
    }

    Ok(events)
}

fn single_head(input: &[u8]) -> Result<RequestHead, HttpError> {
    let events = parse_in_chunks(input, input.len().max(1))?;
    match events.into_iter().next() {
        Some(ParseEvent::Head(head)) => Ok(head),
        other => panic!("expected a head, got {:?}", other),
    }
}

fn request_with_headers(count: usize) -> String {
    let mut req = String::from("GET / HTTP/1.1\r\nHost: example.com\r\n");
    for i in 1..count {
        req.push_str(&format!("X-Header-{}: value-{}\r\n", i, i));
    }
    req.push_str("\r\n");
    req
}

#[test]
fn test_parse_simple_get_request() {
    let head = single_head(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();

    assert_eq!(head.method, "GET");
    assert_eq!(head.path, "/");
    assert_eq!(head.version, "HTTP/1.1");
    assert_eq!(head.host, "example.com");
    assert_eq!(head.headers.get("Host"), Some("example.com"));
    assert_eq!(head.content_length, 0);
}

#[test]
fn test_parse_post_request_with_body() {
    let events =
        parse_in_chunks(b"POST /api HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello", 64).unwrap();

    assert_eq!(events.len(), 2);
    let ParseEvent::Head(head) = &events[0] else {
        panic!("expected head first");
    };
    assert_eq!(head.method, "POST");
    assert_eq!(head.content_length, 5);

    let ParseEvent::Body { chunk, done } = &events[1] else {
        panic!("expected body second");
    };
    assert_eq!(&chunk[..], b"hello");
    assert!(*done);
}

#[test]
fn test_parse_trims_names_and_values() {
    let head = single_head(b"GET / HTTP/1.1\r\nHost:   example.com  \r\n  X-Padded\t:\tvalue here \r\n\r\n").unwrap();

    let names: Vec<&str> = head.headers.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Host", "X-Padded"]);
    assert_eq!(head.headers.get("x-padded"), Some("value here"));
    assert_eq!(head.host, "example.com");
}

#[test]
fn test_parse_value_keeps_later_colons() {
    let head = single_head(b"GET / HTTP/1.1\r\nHost: example.com:8080\r\n\r\n").unwrap();
    assert_eq!(head.host, "example.com:8080");
}

#[test]
fn test_parse_header_names_case_insensitive() {
    let head = single_head(b"GET / HTTP/1.1\r\nhOsT: example.com\r\ncontent-TYPE: text/plain\r\n\r\n").unwrap();

    assert_eq!(head.headers.get("Content-Type"), Some("text/plain"));
    assert_eq!(head.headers.get("HOST"), Some("example.com"));
}

#[test]
fn test_parse_split_at_every_position() {
    let input = b"POST /form?x=1 HTTP/1.1\r\nHost: example.com\r\nUser-Agent: test-client\r\nContent-Length: 7\r\n\r\na=1&b=2";
    let whole = parse_in_chunks(input, input.len()).unwrap();

    for chunk in 1..input.len() {
        let mut events = parse_in_chunks(input, chunk).unwrap();

        // Body may arrive in several slices; glue them back together.
        let head = events.remove(0);
        let body: Vec<u8> = events
            .iter()
            .flat_map(|e| match e {
                ParseEvent::Body { chunk, .. } => chunk.to_vec(),
                other => panic!("unexpected event {:?}", other),
            })
            .collect();

        assert_eq!(head, whole[0], "chunk size {}", chunk);
        assert_eq!(body, b"a=1&b=2", "chunk size {}", chunk);
        assert!(matches!(events.last(), Some(ParseEvent::Body { done: true, .. })));
    }
}

#[test]
fn test_parse_incomplete_request_missing_blank_line() {
    let events = parse_in_chunks(b"GET / HTTP/1.1\r\nHost: example.com\r\n", 8).unwrap();
    assert!(events.is_empty());
}

#[test]
fn test_parse_incomplete_request_partial_body() {
    let events = parse_in_chunks(b"POST /api HTTP/1.1\r\nHost: h\r\nContent-Length: 10\r\n\r\nhello", 128).unwrap();

    assert_eq!(events.len(), 2);
    assert!(matches!(&events[1], ParseEvent::Body { done: false, .. }));
}

#[test]
fn test_parse_twenty_five_headers_accepted() {
    let head = single_head(request_with_headers(REQ_HEADER_MAX).as_bytes()).unwrap();

    assert_eq!(head.headers.len(), REQ_HEADER_MAX);
    assert_eq!(head.headers.get("X-Header-24"), Some("value-24"));
}

#[test]
fn test_parse_twenty_sixth_header_rejected() {
    let input = request_with_headers(REQ_HEADER_MAX + 1);
    let result = parse_in_chunks(input.as_bytes(), 16);

    assert_eq!(result, Err(HttpError::TooManyHeaders));
}

#[test]
fn test_parse_header_too_long_split_delivery() {
    let mut input = b"GET / HTTP/1.1\r\nHost: h\r\nX-Long: ".to_vec();
    input.extend(std::iter::repeat_n(b'x', HEADER_MAX_LEN));
    input.extend_from_slice(b"\r\n\r\n");

    for chunk in [1, 7, 512, input.len()] {
        assert_eq!(parse_in_chunks(&input, chunk), Err(HttpError::HeaderTooLong), "chunk size {}", chunk);
    }
}

#[test]
fn test_parse_uri_too_long() {
    let path = format!("/{}", "a".repeat(URI_LEN));
    let input = format!("GET {} HTTP/1.1\r\nHost: h\r\n\r\n", path);

    assert_eq!(parse_in_chunks(input.as_bytes(), 100), Err(HttpError::UriTooLong));
}

#[test]
fn test_parse_request_line_without_terminator_too_long() {
    let input = format!("GET /{}", "a".repeat(HEADER_MAX_LEN + 10));
    assert_eq!(parse_in_chunks(input.as_bytes(), 1024), Err(HttpError::UriTooLong));
}

#[test]
fn test_parse_invalid_http_method() {
    let result = parse_in_chunks(b"INVALID / HTTP/1.1\r\n\r\n", 64);
    assert_eq!(result, Err(HttpError::UnsupportedMethod("INVALID".to_string())));
}

#[test]
fn test_parse_known_but_unserved_methods() {
    for method in ["PUT", "DELETE", "HEAD", "OPTIONS", "PATCH"] {
        let req = format!("{} / HTTP/1.1\r\nHost: h\r\n\r\n", method);
        let err = parse_in_chunks(req.as_bytes(), 64).unwrap_err();
        assert_eq!(err.status().as_u16(), 405, "method {}", method);
    }
}

#[test]
fn test_parse_malformed_request_lines() {
    for line in ["GET /\r\n\r\n", "GET  / HTTP/1.1\r\n\r\n", "GET / HTTP/1.1 extra\r\n\r\n", "GET nopath HTTP/1.1\r\n\r\n"] {
        assert_eq!(
            parse_in_chunks(line.as_bytes(), 64),
            Err(HttpError::MalformedRequestLine),
            "line {:?}",
            line
        );
    }
}

#[test]
fn test_parse_missing_host() {
    let result = parse_in_chunks(b"GET / HTTP/1.1\r\nAccept: */*\r\n\r\n", 64);
    assert_eq!(result, Err(HttpError::MissingHost));
}

#[test]
fn test_parse_post_without_length() {
    let result = parse_in_chunks(b"POST /api HTTP/1.1\r\nHost: h\r\n\r\n", 64);
    assert_eq!(result, Err(HttpError::LengthRequired));
}

#[test]
fn test_parse_request_with_binary_body() {
    let events =
        parse_in_chunks(b"POST /upload HTTP/1.1\r\nHost: h\r\nContent-Length: 4\r\n\r\n\x00\x01\x02\x03", 256).unwrap();

    let ParseEvent::Body { chunk, done } = &events[1] else {
        panic!("expected body");
    };
    assert_eq!(&chunk[..], &[0, 1, 2, 3]);
    assert!(*done);
}

#[test]
fn test_parse_leaves_next_request_in_buffer() {
    let mut parser = HeaderParser::new(MAX_BODY);
    let mut buf = BytesMut::from(&b"GET /a HTTP/1.1\r\nHost: h\r\n\r\nGET /b HT"[..]);

    assert!(matches!(parser.advance(&mut buf), Ok(ParseEvent::Head(_))));
    assert!(parser.is_idle());
    assert_eq!(parser.advance(&mut buf), Ok(ParseEvent::Incomplete));
    assert_eq!(&buf[..], b"GET /b HT");

    buf.extend_from_slice(b"TP/1.1\r\nHost: h\r\n\r\n");
    let Ok(ParseEvent::Head(head)) = parser.advance(&mut buf) else {
        panic!("second request should parse");
    };
    assert_eq!(head.path, "/b");
}
