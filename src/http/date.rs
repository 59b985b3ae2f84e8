use chrono::{NaiveDateTime, TimeZone, Utc};

/// Accepted HTTP-date layouts: RFC 1123, RFC 850 and asctime.
const HTTP_DATE_FORMATS: [&str; 3] = [
    "%a, %d %b %Y %H:%M:%S GMT",
    "%A, %d-%b-%y %H:%M:%S GMT",
    "%a %b %d %H:%M:%S %Y",
];

/// Parses an HTTP date into Unix seconds.
///
/// Returns `None` for anything unparseable, including impossible dates and
/// weekdays that disagree with the date. Callers use this for optional
/// conditional-request checks, so a bad date never fails the request.
///
/// # Example
///
/// ```
/// # use keel::http::date::parse_http_date;
/// assert_eq!(parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT"), Some(784111777));
/// assert_eq!(parse_http_date("yesterday"), None);
/// ```
pub fn parse_http_date(s: &str) -> Option<i64> {
    // asctime pads single-digit days with a space
    let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");

    HTTP_DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(&normalized, fmt)
            .ok()
            .map(|ndt| Utc.from_utc_datetime(&ndt).timestamp())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPECTED: i64 = 784111777;

    #[test]
    fn parses_all_three_formats() {
        assert_eq!(parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT"), Some(EXPECTED));
        assert_eq!(parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT"), Some(EXPECTED));
        assert_eq!(parse_http_date("Sun Nov  6 08:49:37 1994"), Some(EXPECTED));
    }

    #[test]
    fn rejects_garbage_and_out_of_range() {
        assert_eq!(parse_http_date(""), None);
        assert_eq!(parse_http_date("not a date"), None);
        assert_eq!(parse_http_date("Sun, 32 Nov 1994 08:49:37 GMT"), None);
        assert_eq!(parse_http_date("Sun, 06 Nov 1994 25:49:37 GMT"), None);
        assert_eq!(parse_http_date("Mon, 06 Nov 1994 08:49:37 GMT"), None);
    }
}
