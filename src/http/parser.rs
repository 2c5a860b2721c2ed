use std::fmt;

use crate::http::request::{Method, Request};

/// Sequence that ends the header block.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

const LINE_SEPARATOR: &str = "\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No `\r\n\r\n` yet; read more bytes.
    Incomplete,
    EmptyRequestLine,
    /// Method token shorter than two characters.
    MethodTooShort,
    MissingPath,
    /// Header block is not valid UTF-8.
    InvalidEncoding,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Incomplete => write!(f, "incomplete request"),
            ParseError::EmptyRequestLine => write!(f, "empty request line"),
            ParseError::MethodTooShort => write!(f, "method token shorter than 2 characters"),
            ParseError::MissingPath => write!(f, "request line has no path"),
            ParseError::InvalidEncoding => write!(f, "request head is not valid UTF-8"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parses one request head from the front of `buf`.
///
/// Returns the request and the number of bytes it occupied (head plus
/// terminator). Any bytes after the terminator are left to the caller; request
/// bodies are never parsed.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let headers_end = find_headers_end(buf).ok_or(ParseError::Incomplete)?;
    let head = std::str::from_utf8(&buf[..headers_end]).map_err(|_| ParseError::InvalidEncoding)?;

    let mut lines = head.split(LINE_SEPARATOR);

    let request_line = lines.next().unwrap_or_default();
    let (method, path, version) = parse_request_line(request_line)?;

    let mut headers = Vec::new();
    let mut raw_header_lines = Vec::new();

    for line in lines {
        raw_header_lines.push(line.to_string());

        match split_header(line) {
            Some((name, value)) => headers.push((name.to_string(), value.to_string())),
            None => tracing::debug!(line, "Ignoring header line without ':'"),
        }
    }

    let request = Request {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
        raw_header_lines,
    };

    Ok((request, headers_end + HEADER_TERMINATOR.len()))
}

/// Splits `METHOD SP PATH SP VERSION` on single spaces.
///
/// The version token is optional and never validated.
pub fn parse_request_line(line: &str) -> Result<(Method, &str, &str), ParseError> {
    if line.is_empty() {
        return Err(ParseError::EmptyRequestLine);
    }

    let mut parts = line.split(' ');

    let method = parts.next().unwrap_or_default();
    if method.chars().count() < 2 {
        return Err(ParseError::MethodTooShort);
    }

    let path = match parts.next() {
        Some(p) if !p.is_empty() => p,
        _ => return Err(ParseError::MissingPath),
    };

    let version = parts.next().unwrap_or_default();

    Ok((Method::from_token(method), path, version))
}

/// Splits a header line on its first `:`, trimming whitespace around the value.
pub fn split_header(line: &str) -> Option<(&str, &str)> {
    line.split_once(':').map(|(name, value)| (name, value.trim()))
}

pub fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

        let (parsed, consumed) = parse_http_request(req).unwrap();

        assert_eq!(parsed.path, "/");
        assert_eq!(parsed.header("Host"), Some("example.com"));
        assert_eq!(consumed, req.len());
    }

    #[test]
    fn consumed_excludes_trailing_bytes() {
        let req = b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n";

        let (parsed, consumed) = parse_http_request(req).unwrap();

        assert_eq!(parsed.path, "/a");
        assert_eq!(&req[consumed..], b"GET /b HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn header_value_keeps_later_colons() {
        assert_eq!(split_header("Host: localhost:4221"), Some(("Host", "localhost:4221")));
    }
}
