use crate::error::ServerError;
use crate::http::Version;
use bytes::Bytes;

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub version: Version,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16) -> Response {
        Response {
            status,
            version: Version::Http11,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn version(&mut self, version: Version) -> &mut Self {
        self.version = version;
        self
    }

    pub fn body<T: Into<Bytes>>(&mut self, body: T) -> &mut Self {
        self.body = body.into();
        self
    }

    /// Sets a header, replacing any earlier value with the same name.
    pub fn header<K: AsRef<str>, V: AsRef<str>>(&mut self, name: K, value: V) -> &mut Self {
        let name = name.as_ref();
        let value = value.as_ref().to_string();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name.to_string(), value)),
        }
        self
    }

    /// Plaintext response for a rejected request. The connection is always
    /// closed after it.
    pub fn error(err: &ServerError) -> Response {
        let status = err.status_code();
        let mut response = Response::new(status);
        response
            .header("Content-Type", "text/plain; charset=utf-8")
            .header("Connection", "close")
            .body(format!("{} {}: {}\n", status, reason_phrase(status), err));
        response
    }

    /// Serialises the status line, headers, framing and (unless `head_only`)
    /// the body. `Content-Length` always describes the full body.
    pub fn to_bytes(&self, head_only: bool) -> Vec<u8> {
        let mut head = format!(
            "{} {} {}\r\n",
            self.version,
            self.status,
            reason_phrase(self.status)
        );
        for (name, value) in &self.headers {
            head += &format!("{}: {}\r\n", name, value);
        }
        head += &format!("Content-Length: {}\r\n\r\n", self.body.len());

        let mut out = Vec::with_capacity(head.len() + self.body.len());
        out.extend_from_slice(head.as_bytes());
        if !head_only {
            out.extend_from_slice(&self.body);
        }
        out
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Content Too Large",
        414 => "URI Too Long",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}
