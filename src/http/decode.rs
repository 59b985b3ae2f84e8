use crate::http::error::HttpError;

/// Decodes `+` and `%XX` escapes in query strings and form bodies.
///
/// A `%` that is trailing or not followed by two hex digits is rejected, as
/// is an escape decoding to NUL or a result that is not valid UTF-8. Input
/// is never truncated.
///
/// # Example
///
/// ```
/// # use keel::http::decode::urldecode;
/// assert_eq!(urldecode("a%20b").unwrap(), "a b");
/// assert_eq!(urldecode("a+b").unwrap(), "a b");
/// assert!(urldecode("100%").is_err());
/// ```
pub fn urldecode(s: &str) -> Result<String, HttpError> {
    if !s.contains(['%', '+']) {
        return Ok(s.to_string());
    }

    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let hi = bytes.get(i + 1).and_then(|b| hex_value(*b));
                let lo = bytes.get(i + 2).and_then(|b| hex_value(*b));

                let (Some(hi), Some(lo)) = (hi, lo) else {
                    return Err(HttpError::MalformedEncoding);
                };

                let decoded = (hi << 4) | lo;
                if decoded == 0 {
                    return Err(HttpError::MalformedEncoding);
                }

                out.push(decoded);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8(out).map_err(|_| HttpError::MalformedEncoding)
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
