//! # stub-origin
//!
//! Fixed-response HTTP/1.x origin servers, used as upstream targets when
//! exercising a reverse proxy.
//!
//! ## Features
//!
//! - One configured status and body for every request, whatever the method
//!   or target (`HEAD` gets the headers only)
//! - Keep-alive with an idle timeout, pipelined requests
//! - One task per connection, bounded by `max_connections`
//! - 400/414/431/505 answers for requests that cannot be parsed
//! - Bind failures surface as [`ServerError::Bind`], never as a silent retry
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stub_origin::{Server, ServerConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     stub_origin::logging::init();
//!
//!     let mut config = ServerConfig::new(8080, "pong\n");
//!     config.max_connections(64);
//!
//!     match Server::listen(config)? {}
//! }
//! ```
//!
//! The two lab instances are available as [`ServerConfig::app1`] and
//! [`ServerConfig::app2`], and as the `app1` / `app2` binaries.

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use http::{Method, Response, Version};
pub use server::{start, Server};
