//! Static configuration of a stub origin instance.

use crate::http::Limits;
use bytes::Bytes;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const APP1_PORT: u16 = 3000;
pub const APP1_BODY: &str = "Hello from app1 on 3000\n";
pub const APP2_PORT: u16 = 4000;
pub const APP2_BODY: &str = "Hello from app2 on 4000\n";

/// Everything a stub origin needs to know about itself.
///
/// The value is frozen once handed to [`Server::bind`](crate::Server::bind)
/// and shared read-only by every connection.
///
/// # Example
///
/// ```rust
/// use stub_origin::ServerConfig;
/// use std::time::Duration;
///
/// let mut config = ServerConfig::new(8080, "pong\n");
/// config.keep_alive(Duration::from_secs(1)).max_connections(16);
/// assert_eq!(config.socket_addr().port(), 8080);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    pub response_body: Bytes,
    pub status_code: u16,
    pub content_type: String,
    pub server_name: String,
    pub keep_alive: Duration,
    pub max_connections: usize,
    pub max_line_length: usize,
    pub max_headers: usize,
}

impl ServerConfig {
    /// Creates a configuration answering `200` with `body` on all interfaces.
    pub fn new(port: u16, body: impl Into<Bytes>) -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port,
            response_body: body.into(),
            status_code: 200,
            content_type: "text/plain; charset=utf-8".to_string(),
            server_name: concat!("stub-origin/", env!("CARGO_PKG_VERSION")).to_string(),
            keep_alive: Duration::from_secs(5),
            max_connections: 256,
            max_line_length: 65_536,
            max_headers: 100,
        }
    }

    /// Instance A of the lab.
    pub fn app1() -> Self {
        Self::new(APP1_PORT, APP1_BODY)
    }

    /// Instance B of the lab.
    pub fn app2() -> Self {
        Self::new(APP2_PORT, APP2_BODY)
    }

    pub fn bind_address(&mut self, bind_address: IpAddr) -> &mut Self {
        self.bind_address = bind_address;
        self
    }

    pub fn port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    pub fn status_code(&mut self, status_code: u16) -> &mut Self {
        self.status_code = status_code;
        self
    }

    pub fn content_type<T: AsRef<str>>(&mut self, content_type: T) -> &mut Self {
        self.content_type = content_type.as_ref().to_string();
        self
    }

    pub fn server_name<T: AsRef<str>>(&mut self, server_name: T) -> &mut Self {
        self.server_name = server_name.as_ref().to_string();
        self
    }

    /// Idle time allowed between requests on one connection.
    pub fn keep_alive(&mut self, keep_alive: Duration) -> &mut Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Connections serviced at once, clamped to `1..=Semaphore::MAX_PERMITS`.
    pub fn max_connections(&mut self, max_connections: usize) -> &mut Self {
        self.max_connections = clamp_connections(max_connections);
        self
    }

    pub fn max_line_length(&mut self, max_line_length: usize) -> &mut Self {
        self.max_line_length = max_line_length;
        self
    }

    pub fn max_headers(&mut self, max_headers: usize) -> &mut Self {
        self.max_headers = max_headers;
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub(crate) fn connection_permits(&self) -> usize {
        clamp_connections(self.max_connections)
    }

    pub(crate) fn limits(&self) -> Limits {
        Limits {
            max_line_length: self.max_line_length,
            max_headers: self.max_headers,
        }
    }
}

fn clamp_connections(max_connections: usize) -> usize {
    max_connections.clamp(1, Semaphore::MAX_PERMITS)
}
