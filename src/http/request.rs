use crate::error::{ServerError, ServerResult};
use std::collections::HashMap;
use std::fmt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

#[derive(Eq, Hash, PartialEq, Clone, Debug)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    CONNECT,
    OPTIONS,
    TRACE,
    PATCH,
    Other(String),
}

impl Method {
    /// Parses a request-line method token. Extension methods are kept as
    /// [`Method::Other`]; anything that is not a valid token is rejected.
    pub fn from_string(s: &str) -> ServerResult<Method> {
        if s.is_empty() || !s.bytes().all(is_token_byte) {
            return Err(ServerError::MalformedRequest(format!("invalid method {:?}", s)));
        }
        Ok(match s {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "HEAD" => Method::HEAD,
            "CONNECT" => Method::CONNECT,
            "OPTIONS" => Method::OPTIONS,
            "TRACE" => Method::TRACE,
            "PATCH" => Method::PATCH,
            other => Method::Other(other.to_string()),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::CONNECT => "CONNECT",
            Method::OPTIONS => "OPTIONS",
            Method::TRACE => "TRACE",
            Method::PATCH => "PATCH",
            Method::Other(name) => name.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    /// Parses `HTTP/<major>.<minor>`. Any 1.x above 1.0 is answered as 1.1;
    /// other majors are well formed but unsupported.
    pub fn from_string(s: &str) -> ServerResult<Version> {
        let malformed = || ServerError::MalformedRequest(format!("invalid version {:?}", s));

        let numbers = s.strip_prefix("HTTP/").ok_or_else(malformed)?;
        let (major, minor) = numbers.split_once('.').ok_or_else(malformed)?;
        let major: u32 = parse_digits(major).ok_or_else(malformed)?;
        let minor: u32 = parse_digits(minor).ok_or_else(malformed)?;

        match (major, minor) {
            (1, 0) => Ok(Version::Http10),
            (1, _) => Ok(Version::Http11),
            _ => Err(ServerError::UnsupportedVersion(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounds applied while reading a request head.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_line_length: usize,
    pub max_headers: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_line_length: 65_536,
            max_headers: 100,
        }
    }
}

/// Request line and headers. Header names are stored lowercased; repeated
/// fields are joined with `", "`.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub target: String,
    pub version: Version,
    pub headers: HashMap<String, String>,
}

impl RequestHead {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn content_length(&self) -> ServerResult<Option<u64>> {
        match self.header("content-length") {
            None => Ok(None),
            Some(value) => parse_digits(value.trim())
                .map(Some)
                .ok_or_else(|| ServerError::MalformedRequest(format!("invalid content-length {:?}", value))),
        }
    }

    /// The body is framed by transfer coding rather than a length.
    pub fn has_transfer_encoding(&self) -> bool {
        self.headers.contains_key("transfer-encoding")
    }

    pub fn wants_keep_alive(&self) -> bool {
        let tokens: Vec<String> = self
            .header("connection")
            .map(|value| value.split(',').map(|t| t.trim().to_ascii_lowercase()).collect())
            .unwrap_or_default();

        if tokens.iter().any(|t| t == "close") {
            return false;
        }
        match self.version {
            Version::Http11 => true,
            Version::Http10 => tokens.iter().any(|t| t == "keep-alive"),
        }
    }

    pub fn request_line(&self) -> String {
        format!("{} {} {}", self.method, self.target, self.version)
    }
}

enum Line {
    Eof,
    Truncated,
    TooLong,
    Complete(Vec<u8>),
}

/// Reads one CRLF (or bare LF) terminated line of at most `max` bytes,
/// terminator excluded.
async fn read_line<R>(reader: &mut R, max: usize) -> ServerResult<Line>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    // room for the content plus "\r\n"
    let read = (&mut *reader)
        .take(max as u64 + 2)
        .read_until(b'\n', &mut buf)
        .await?;

    if read == 0 {
        return Ok(Line::Eof);
    }
    if buf.last() != Some(&b'\n') {
        return Ok(if buf.len() > max { Line::TooLong } else { Line::Truncated });
    }

    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    if buf.len() > max {
        return Ok(Line::TooLong);
    }
    Ok(Line::Complete(buf))
}

/// Reads a request head from `reader`.
///
/// Returns `Ok(None)` when the peer closed the connection before sending
/// anything, which is how an idle keep-alive connection normally ends.
pub async fn read_head<R>(reader: &mut R, limits: &Limits) -> ServerResult<Option<RequestHead>>
where
    R: AsyncBufRead + Unpin,
{
    let request_line = loop {
        match read_line(reader, limits.max_line_length).await? {
            Line::Eof => return Ok(None),
            Line::Truncated => return Err(ServerError::ClientDisconnect),
            Line::TooLong => return Err(ServerError::RequestLineTooLong(limits.max_line_length)),
            Line::Complete(line) if line.is_empty() => continue,
            Line::Complete(line) => break line,
        }
    };

    let request_line = String::from_utf8(request_line)
        .map_err(|_| ServerError::MalformedRequest("request line is not valid UTF-8".to_string()))?;
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    let (method, target, version) = match parts.as_slice() {
        [method, target, version] => (*method, *target, *version),
        _ => {
            return Err(ServerError::MalformedRequest(format!(
                "bad request line {:?}",
                request_line
            )))
        }
    };

    let method = Method::from_string(method)?;
    let version = Version::from_string(version)?;

    let mut headers: HashMap<String, String> = HashMap::new();
    let mut last_name: Option<String> = None;
    let mut count = 0;

    loop {
        let line = match read_line(reader, limits.max_line_length).await? {
            Line::Eof | Line::Truncated => return Err(ServerError::ClientDisconnect),
            Line::TooLong => return Err(ServerError::HeaderTooLarge("header line too long".to_string())),
            Line::Complete(line) => line,
        };
        if line.is_empty() {
            break;
        }

        // continuation lines count too
        count += 1;
        if count > limits.max_headers {
            return Err(ServerError::HeaderTooLarge(format!(
                "more than {} header lines",
                limits.max_headers
            )));
        }

        let line = String::from_utf8_lossy(&line);

        // obsolete line folding continues the previous field
        if line.starts_with(' ') || line.starts_with('\t') {
            let name = last_name
                .as_ref()
                .ok_or_else(|| ServerError::MalformedRequest("continuation before first header".to_string()))?;
            if let Some(value) = headers.get_mut(name) {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ServerError::MalformedRequest(format!("bad header line {:?}", line)))?;
        if name.is_empty() || !name.bytes().all(is_token_byte) {
            return Err(ServerError::MalformedRequest(format!("bad header name {:?}", name)));
        }

        let name = name.to_ascii_lowercase();
        let value = value.trim();
        headers
            .entry(name.clone())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
        last_name = Some(name);
    }

    Ok(Some(RequestHead {
        method,
        target: target.to_string(),
        version,
        headers,
    }))
}

fn parse_digits<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(raw: &[u8]) -> ServerResult<Option<RequestHead>> {
        let mut reader = raw;
        read_head(&mut reader, &Limits::default()).await
    }

    #[tokio::test]
    async fn parses_request_line_and_headers() {
        let head = parse(b"GET /index.html HTTP/1.1\r\nHost: x\r\nX-Trace:  abc \r\n\r\n")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(head.method, Method::GET);
        assert_eq!(head.target, "/index.html");
        assert_eq!(head.version, Version::Http11);
        assert_eq!(head.header("Host"), Some("x"));
        assert_eq!(head.header("x-trace"), Some("abc"));
        assert_eq!(head.request_line(), "GET /index.html HTTP/1.1");
    }

    #[tokio::test]
    async fn accepts_bare_lf_and_leading_blank_lines() {
        let head = parse(b"\r\n\nPOST /submit HTTP/1.0\nContent-Length: 3\n\n")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(head.method, Method::POST);
        assert_eq!(head.version, Version::Http10);
        assert_eq!(head.content_length().unwrap(), Some(3));
    }

    #[tokio::test]
    async fn keeps_extension_methods() {
        let head = parse(b"PURGE / HTTP/1.1\r\n\r\n").await.unwrap().unwrap();
        assert_eq!(head.method, Method::Other("PURGE".to_string()));
        assert_eq!(head.method.to_string(), "PURGE");
    }

    #[tokio::test]
    async fn joins_repeated_and_folded_headers() {
        let head = parse(b"GET / HTTP/1.1\r\nAccept: a\r\nAccept: b\r\nX-Long: one\r\n two\r\n\r\n")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(head.header("accept"), Some("a, b"));
        assert_eq!(head.header("x-long"), Some("one two"));
    }

    #[tokio::test]
    async fn empty_stream_is_not_a_request() {
        assert!(parse(b"").await.unwrap().is_none());
        assert!(parse(b"\r\n").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_inside_the_head_is_a_disconnect() {
        let err = parse(b"GET / HTTP/1.1\r\nHost: x\r\n").await.unwrap_err();
        assert!(matches!(err, ServerError::ClientDisconnect));

        let err = parse(b"GET / HT").await.unwrap_err();
        assert!(matches!(err, ServerError::ClientDisconnect));
    }

    #[tokio::test]
    async fn rejects_malformed_request_lines() {
        for raw in [
            "garbage\r\n\r\n",
            "GET /\r\n\r\n",
            "GET / HTTP/1.1 extra\r\n\r\n",
            "GET / FTP/1.0\r\n\r\n",
            "G(T / HTTP/1.1\r\n\r\n",
            "GET / HTTP/1.1\r\nno-colon\r\n\r\n",
            "GET / HTTP/1.1\r\n\tfolded-first\r\n\r\n",
        ] {
            let err = parse(raw.as_bytes()).await.unwrap_err();
            assert!(matches!(err, ServerError::MalformedRequest(_)), "{:?} gave {:?}", raw, err);
        }
    }

    #[tokio::test]
    async fn rejects_other_major_versions() {
        let err = parse(b"GET / HTTP/2.0\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, ServerError::UnsupportedVersion(_)));

        let head = parse(b"GET / HTTP/1.2\r\n\r\n").await.unwrap().unwrap();
        assert_eq!(head.version, Version::Http11);
    }

    #[tokio::test]
    async fn enforces_limits() {
        let limits = Limits {
            max_line_length: 32,
            max_headers: 2,
        };

        let long_target = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(64));
        let mut reader = long_target.as_bytes();
        let err = read_head(&mut reader, &limits).await.unwrap_err();
        assert!(matches!(err, ServerError::RequestLineTooLong(32)));

        let long_header = format!("GET / HTTP/1.1\r\nX: {}\r\n\r\n", "b".repeat(64));
        let mut reader = long_header.as_bytes();
        let err = read_head(&mut reader, &limits).await.unwrap_err();
        assert!(matches!(err, ServerError::HeaderTooLarge(_)));

        let mut reader = &b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\nC: 3\r\n\r\n"[..];
        let err = read_head(&mut reader, &limits).await.unwrap_err();
        assert!(matches!(err, ServerError::HeaderTooLarge(_)));

        let mut reader = &b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\n\r\n"[..];
        assert!(read_head(&mut reader, &limits).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn folded_lines_count_toward_the_header_limit() {
        let limits = Limits {
            max_line_length: 64,
            max_headers: 2,
        };
        let mut raw = String::from("GET / HTTP/1.1\r\nX: a\r\n");
        for i in 0..1000 {
            raw.push_str(&format!(" continuation-{}\r\n", i));
        }
        raw.push_str("\r\n");

        let mut reader = raw.as_bytes();
        let err = read_head(&mut reader, &limits).await.unwrap_err();
        assert!(matches!(err, ServerError::HeaderTooLarge(_)));

        let mut reader = &b"GET / HTTP/1.1\r\nX: a\r\n b\r\n\r\n"[..];
        let head = read_head(&mut reader, &limits).await.unwrap().unwrap();
        assert_eq!(head.header("x"), Some("a b"));
    }

    #[tokio::test]
    async fn bad_method_wins_over_unsupported_version() {
        let err = parse(b"G(T / HTTP/2.0\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, ServerError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn leaves_following_bytes_unread() {
        let mut reader = &b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n"[..];
        let limits = Limits::default();

        let first = read_head(&mut reader, &limits).await.unwrap().unwrap();
        let second = read_head(&mut reader, &limits).await.unwrap().unwrap();
        assert_eq!(first.target, "/a");
        assert_eq!(second.target, "/b");
        assert!(read_head(&mut reader, &limits).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn content_length_must_be_digits() {
        let head = parse(b"POST / HTTP/1.1\r\nContent-Length: -1\r\n\r\n").await.unwrap().unwrap();
        assert!(matches!(head.content_length(), Err(ServerError::MalformedRequest(_))));
    }

    #[tokio::test]
    async fn keep_alive_follows_version_and_connection_header() {
        let cases = [
            ("GET / HTTP/1.1\r\n\r\n", true),
            ("GET / HTTP/1.1\r\nConnection: close\r\n\r\n", false),
            ("GET / HTTP/1.1\r\nConnection: Upgrade, Close\r\n\r\n", false),
            ("GET / HTTP/1.0\r\n\r\n", false),
            ("GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n", true),
        ];
        for (raw, expected) in cases {
            let head = parse(raw.as_bytes()).await.unwrap().unwrap();
            assert_eq!(head.wants_keep_alive(), expected, "{:?}", raw);
        }
    }
}
