//! The stub origin server.
//!
//! A [`Server`] owns one listening socket and one frozen [`ServerConfig`].
//! Every accepted connection runs on its own task and gets the configured
//! response for every request it sends, whatever the method or target.
//!
//! # Examples
//!
//! ```rust,no_run
//! use stub_origin::{Server, ServerConfig};
//!
//! # async fn run() -> stub_origin::ServerResult<()> {
//! let server = Server::bind(ServerConfig::app1()).await?;
//! println!("serving on {}", server.local_addr()?);
//! match server.serve().await? {}
//! # }
//! ```

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::http::{read_head, Method, RequestHead, Response, Version};
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const LINGER: Duration = Duration::from_secs(2);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

pub struct Server {
    config: Arc<ServerConfig>,
    listener: TcpListener,
    permits: Arc<Semaphore>,
}

impl Server {
    /// Binds the configured address. Fails with [`ServerError::Bind`] when
    /// the port is taken or not permitted; there is no retry.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        let addr = config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let permits = Arc::new(Semaphore::new(config.connection_permits()));

        Ok(Self {
            config: Arc::new(config),
            listener,
            permits,
        })
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until the task is dropped or the process dies.
    pub async fn serve(self) -> ServerResult<Infallible> {
        let addr = self.local_addr()?;
        info!(%addr, max_connections = self.config.max_connections, "stub origin listening");

        loop {
            let permit = Arc::clone(&self.permits)
                .acquire_owned()
                .await
                .map_err(|e| ServerError::Io(io::Error::other(e)))?;

            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let _ = stream.set_nodelay(true);
                    let config = Arc::clone(&self.config);

                    tokio::spawn(async move {
                        match handle_connection(stream, peer, &config).await {
                            Ok(()) => {}
                            Err(ServerError::ClientDisconnect) => {
                                debug!(%peer, "client disconnected");
                            }
                            Err(err) => warn!(%peer, error = %err, "connection error"),
                        }
                        drop(permit);
                    });
                }
                Err(err) => accept_failed(err).await,
            }
        }
    }

    /// Blocking entry point: builds a multi-threaded runtime and serves on it.
    pub fn listen(config: ServerConfig) -> ServerResult<Infallible> {
        let runtime = Runtime::new().map_err(ServerError::Runtime)?;
        runtime.block_on(start(config))
    }
}

/// Logs a failed accept and pauses so a persistent error (EMFILE and the
/// like) does not spin the accept loop.
async fn accept_failed(err: io::Error) {
    warn!(error = %err, "accept failed");
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

/// Binds `config` and serves forever.
pub async fn start(config: ServerConfig) -> ServerResult<Infallible> {
    Server::bind(config).await?.serve().await
}

async fn handle_connection<S>(stream: S, peer: SocketAddr, config: &ServerConfig) -> ServerResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let limits = config.limits();

    loop {
        let head = match timeout(config.keep_alive, read_head(&mut reader, &limits)).await {
            Err(_) => {
                debug!(%peer, "idle connection timed out");
                return Ok(());
            }
            Ok(Ok(None)) => return Ok(()),
            Ok(Ok(Some(head))) => head,
            Ok(Err(err)) if err.is_rejection() => {
                reject(&mut writer, peer, err).await?;
                return close(&mut reader, &mut writer).await;
            }
            Ok(Err(err)) => return Err(err),
        };

        let length = match head.content_length() {
            Ok(length) => length,
            Err(err) => {
                reject(&mut writer, peer, err).await?;
                return close(&mut reader, &mut writer).await;
            }
        };
        if let Some(length) = length {
            match timeout(config.keep_alive, discard_body(&mut reader, length)).await {
                Ok(result) => result?,
                Err(_) => {
                    debug!(%peer, "request body timed out");
                    return Ok(());
                }
            }
        }

        // a transfer-coded body is never read, so its bytes cannot be framed
        let keep_alive = head.wants_keep_alive() && !head.has_transfer_encoding();
        let response = stub_response(config, &head, keep_alive);
        let head_only = head.method == Method::HEAD;

        writer.write_all(&response.to_bytes(head_only)).await?;
        writer.flush().await?;

        let sent = if head_only { 0 } else { response.body.len() };
        info!(
            %peer,
            request = %head.request_line(),
            status = response.status,
            bytes = sent,
            "served"
        );

        if !keep_alive {
            return close(&mut reader, &mut writer).await;
        }
    }
}

fn stub_response(config: &ServerConfig, head: &RequestHead, keep_alive: bool) -> Response {
    let mut response = Response::new(config.status_code);
    response
        .version(head.version)
        .header("Server", &config.server_name)
        .header("Date", httpdate::fmt_http_date(SystemTime::now()))
        .header("Content-Type", &config.content_type)
        .body(config.response_body.clone());

    match (keep_alive, head.version) {
        (false, _) => {
            response.header("Connection", "close");
        }
        (true, Version::Http10) => {
            response.header("Connection", "keep-alive");
        }
        (true, Version::Http11) => {}
    }
    response
}

async fn reject<W>(writer: &mut W, peer: SocketAddr, err: ServerError) -> ServerResult<()>
where
    W: AsyncWrite + Unpin,
{
    warn!(%peer, error = %err, "rejecting request");
    let mut response = Response::error(&err);
    response.header("Date", httpdate::fmt_http_date(SystemTime::now()));

    writer.write_all(&response.to_bytes(false)).await?;
    writer.flush().await?;
    Ok(())
}

/// Half-closes the connection, then drains the client for up to [`LINGER`].
/// Dropping a socket with unread input resets it, which can destroy a
/// response the client has not read yet.
async fn close<R, W>(reader: &mut R, writer: &mut W) -> ServerResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let _ = writer.shutdown().await;
    let _ = timeout(LINGER, tokio::io::copy(reader, &mut tokio::io::sink())).await;
    Ok(())
}

async fn discard_body<R>(reader: &mut R, length: u64) -> ServerResult<()>
where
    R: AsyncBufRead + Unpin,
{
    let copied = tokio::io::copy(&mut (&mut *reader).take(length), &mut tokio::io::sink()).await?;
    if copied < length {
        return Err(ServerError::ClientDisconnect);
    }
    Ok(())
}
