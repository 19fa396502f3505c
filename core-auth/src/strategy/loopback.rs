//! Loopback redirect flow for desktop platforms (RFC 8252 section 7.3).
//!
//! A one-shot HTTP listener is bound on the loopback interface at the
//! redirect URL's port (an ephemeral port when none is given, written back
//! into the redirect URL). The system browser is sent to the authorization
//! page; the first request whose path matches the redirect URL gets a static
//! confirmation page and ends the wait. Any other request gets a 404.
//!
//! The listener lives on the stack of [`LoopbackFlow::run`], so the port is
//! released as soon as the flow returns, whatever the outcome.

use super::LoginListener;
use crate::error::{AuthError, Result};
use crate::oauth::{ClientHandle, GrantClient};
use crate::redirect::{matches_redirect, resolve_redirect_url};
use bridge_traits::browser::{UrlLauncher, WindowController};
use bridge_traits::platform::Platform;
use core_async::sync::CancellationToken;
use core_async::time::{timeout, Duration};
use std::io;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, instrument, warn};
use url::{Host, Url};

/// Redirect used when `auth.platform.io.redirect_url` is not configured.
pub const DEFAULT_LOOPBACK_REDIRECT: &str = "http://localhost/callback";

const LOOPBACK_BASE: &str = "http://localhost";

/// Time a connected client gets to send its request head.
const REQUEST_HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for a request head.
const MAX_REQUEST_HEAD: usize = 16 * 1024;

const CONFIRMATION_PAGE: &str = "<!DOCTYPE html>\n\
<html>\n\
<head><meta charset=\"utf-8\"><title>Signed in</title></head>\n\
<body style=\"font-family: sans-serif; text-align: center; margin-top: 4em\">\n\
<h1>Sign-in complete</h1>\n\
<p>You can close this window and return to the application.</p>\n\
</body>\n\
</html>\n";

pub struct LoopbackFlow {
    launcher: Arc<dyn UrlLauncher>,
    window: Arc<dyn WindowController>,
}

impl LoopbackFlow {
    pub fn new(launcher: Arc<dyn UrlLauncher>, window: Arc<dyn WindowController>) -> Self {
        Self { launcher, window }
    }

    #[instrument(skip_all)]
    pub async fn run(
        &self,
        grant: &GrantClient,
        scopes: &[String],
        listener: Option<&dyn LoginListener>,
        cancel: &CancellationToken,
    ) -> Result<Option<ClientHandle>> {
        let base = Url::parse(LOOPBACK_BASE)
            .map_err(|e| AuthError::Configuration(e.to_string()))?;
        let mut redirect_url = resolve_redirect_url(
            grant.config().redirect_url(Platform::Io),
            &base,
            DEFAULT_LOOPBACK_REDIRECT,
        )?;

        let server = bind_loopback(&mut redirect_url).await?;
        let pending = grant.begin(&redirect_url, scopes)?;

        if let Some(listener) = listener {
            listener.on_authorization_url(pending.authorization_url());
        }

        if let Err(e) = self.window.minimize().await {
            warn!(error = %e, "Could not minimize the host window");
        }

        if let Err(e) = self
            .launcher
            .open_url(pending.authorization_url().as_str())
            .await
        {
            warn!(error = %e, "Could not open the system browser");
            self.restore_window().await;
            return Ok(None);
        }

        let received = tokio::select! {
            _ = cancel.cancelled() => None,
            query = accept_redirect(&server, &redirect_url) => Some(query),
        };
        drop(server);
        self.restore_window().await;

        let query = match received {
            Some(query) => query?,
            None => {
                debug!("Loopback login cancelled");
                return Ok(None);
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Loopback login cancelled during code exchange");
                Ok(None)
            }
            handle = grant.complete(&pending, &query) => handle.map(Some),
        }
    }

    async fn restore_window(&self) {
        if let Err(e) = self.window.restore_and_focus().await {
            warn!(error = %e, "Could not restore the host window");
        }
    }
}

/// Listening sockets for the redirect. `localhost` gets both loopback
/// families on one port, since browsers may resolve it to either.
struct LoopbackListener {
    v4: Option<TcpListener>,
    v6: Option<TcpListener>,
}

impl LoopbackListener {
    fn port(&self) -> io::Result<u16> {
        match self.v4.as_ref().or(self.v6.as_ref()) {
            Some(listener) => Ok(listener.local_addr()?.port()),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "no loopback socket")),
        }
    }

    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        match (&self.v4, &self.v6) {
            (Some(v4), Some(v6)) => tokio::select! {
                accepted = v4.accept() => accepted,
                accepted = v6.accept() => accepted,
            },
            (Some(listener), None) | (None, Some(listener)) => listener.accept().await,
            (None, None) => Err(io::Error::new(io::ErrorKind::NotConnected, "no loopback socket")),
        }
    }
}

fn bind_error(ip: IpAddr, port: u16, err: io::Error) -> AuthError {
    AuthError::Network(format!("Failed to bind loopback listener on {}:{}: {}", ip, port, err))
}

/// Bind on `first`, then on `second` at the same port. Only one of the two
/// has to succeed.
async fn bind_pair(first: IpAddr, second: IpAddr, port: u16) -> Result<(TcpListener, Option<TcpListener>)> {
    let primary = match TcpListener::bind((first, port)).await {
        Ok(listener) => listener,
        Err(first_err) => {
            debug!(%first, error = %first_err, "Loopback bind failed, trying the other family");
            let listener = TcpListener::bind((second, port))
                .await
                .map_err(|e| bind_error(second, port, e))?;
            return Ok((listener, None));
        }
    };

    let bound = primary
        .local_addr()
        .map_err(|e| AuthError::Network(e.to_string()))?
        .port();
    let secondary = match TcpListener::bind((second, bound)).await {
        Ok(listener) => Some(listener),
        Err(e) => {
            debug!(%second, port = bound, error = %e, "Second loopback family unavailable");
            None
        }
    };
    Ok((primary, secondary))
}

/// Bind the listener for `redirect_url`, filling in the port when it was
/// left open.
async fn bind_loopback(redirect_url: &mut Url) -> Result<LoopbackListener> {
    if redirect_url.scheme() != "http" {
        return Err(AuthError::Configuration(format!(
            "Loopback redirect must use http: {}",
            redirect_url
        )));
    }

    let port = redirect_url.port().unwrap_or(0);
    let server = match redirect_url.host() {
        Some(Host::Domain(domain)) if domain.eq_ignore_ascii_case("localhost") => {
            let v4 = IpAddr::V4(Ipv4Addr::LOCALHOST);
            let v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);
            let (primary, secondary) = bind_pair(v4, v6, port).await?;
            if primary.local_addr().is_ok_and(|addr| addr.is_ipv4()) {
                LoopbackListener { v4: Some(primary), v6: secondary }
            } else {
                LoopbackListener { v4: secondary, v6: Some(primary) }
            }
        }
        Some(Host::Ipv4(ip)) if ip.is_loopback() => LoopbackListener {
            v4: Some(
                TcpListener::bind((ip, port))
                    .await
                    .map_err(|e| bind_error(IpAddr::V4(ip), port, e))?,
            ),
            v6: None,
        },
        Some(Host::Ipv6(ip)) if ip.is_loopback() => LoopbackListener {
            v4: None,
            v6: Some(
                TcpListener::bind((ip, port))
                    .await
                    .map_err(|e| bind_error(IpAddr::V6(ip), port, e))?,
            ),
        },
        _ => {
            return Err(AuthError::Configuration(format!(
                "Loopback redirect host must be localhost, 127.0.0.1 or [::1]: {}",
                redirect_url
            )))
        }
    };

    if port == 0 {
        let bound = server
            .port()
            .map_err(|e| AuthError::Network(e.to_string()))?;
        redirect_url
            .set_port(Some(bound))
            .map_err(|_| AuthError::Configuration("Redirect URL cannot carry a port".to_string()))?;
    }

    info!(
        redirect_url = %redirect_url,
        ipv4 = server.v4.is_some(),
        ipv6 = server.v6.is_some(),
        "Loopback listener ready"
    );
    Ok(server)
}

/// Serve connections until one carries the redirect. Returns its query.
///
/// Connections are served concurrently, so an idle preconnect cannot hold
/// up the browser's real request.
async fn accept_redirect(server: &LoopbackListener, redirect_url: &Url) -> Result<String> {
    let mut connections: FuturesUnordered<BoxFuture<'_, Served>> = FuturesUnordered::new();
    loop {
        tokio::select! {
            accepted = server.accept() => {
                let (stream, peer) = accepted
                    .map_err(|e| AuthError::Network(format!("Loopback listener failed: {}", e)))?;
                connections.push(serve(stream, peer, redirect_url).boxed());
            }
            Some((peer, served)) = connections.next(), if !connections.is_empty() => {
                match served {
                    Ok(Some(query)) => {
                        debug!(%peer, "Received authorization response");
                        return Ok(query);
                    }
                    Ok(None) => debug!(%peer, "Rejected request for another path"),
                    Err(e) => debug!(%peer, error = %e, "Dropped loopback connection"),
                }
            }
        }
    }
}

type Served = (SocketAddr, io::Result<Option<String>>);

async fn serve(mut stream: TcpStream, peer: SocketAddr, redirect_url: &Url) -> Served {
    (peer, serve_connection(&mut stream, redirect_url).await)
}

async fn serve_connection(stream: &mut TcpStream, redirect_url: &Url) -> io::Result<Option<String>> {
    let target = timeout(REQUEST_HEAD_TIMEOUT, read_request_target(stream))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "request head timed out"))??;

    let query = target
        .as_deref()
        .and_then(|target| redirect_url.join(target).ok())
        .filter(|candidate| matches_redirect(redirect_url, candidate))
        .map(|candidate| candidate.query().unwrap_or("").to_string());

    match query {
        Some(query) => {
            write_response(stream, "200 OK", CONFIRMATION_PAGE).await?;
            Ok(Some(query))
        }
        None => {
            write_response(stream, "404 Not Found", "Not Found").await?;
            Ok(None)
        }
    }
}

/// Read the request head and return the target of a `GET` request.
async fn read_request_target(stream: &mut TcpStream) -> io::Result<Option<String>> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    let mut consumed = reader.read_line(&mut request_line).await?;

    let mut header = String::new();
    loop {
        header.clear();
        let read = reader.read_line(&mut header).await?;
        consumed += read;
        if read == 0 || header == "\r\n" || header == "\n" {
            break;
        }
        if consumed > MAX_REQUEST_HEAD {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "request head too large",
            ));
        }
    }

    let mut parts = request_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => Ok(Some(target.to_string())),
        _ => Ok(None),
    }
}

async fn write_response(stream: &mut TcpStream, status: &str, body: &str) -> io::Result<()> {
    let content_type = if body.starts_with("<!DOCTYPE") {
        "text/html; charset=utf-8"
    } else {
        "text/plain; charset=utf-8"
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ephemeral_port_is_written_back() {
        let mut redirect = Url::parse("http://127.0.0.1/callback").unwrap();
        let server = bind_loopback(&mut redirect).await.unwrap();

        let bound = server.port().unwrap();
        assert_ne!(bound, 0);
        assert_eq!(redirect.port(), Some(bound));
    }

    #[tokio::test]
    async fn non_loopback_hosts_are_rejected() {
        for raw in [
            "http://example.com/callback",
            "http://192.168.1.10/callback",
            "https://localhost/callback",
        ] {
            let mut redirect = Url::parse(raw).unwrap();
            assert!(
                matches!(
                    bind_loopback(&mut redirect).await,
                    Err(AuthError::Configuration(_))
                ),
                "{raw}"
            );
        }
    }

    #[tokio::test]
    async fn occupied_port_is_network_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let mut redirect = Url::parse(&format!("http://127.0.0.1:{port}/callback")).unwrap();

        assert!(matches!(
            bind_loopback(&mut redirect).await,
            Err(AuthError::Network(_))
        ));
    }

    #[tokio::test]
    async fn only_matching_request_is_accepted() {
        let mut redirect = Url::parse("http://127.0.0.1/callback").unwrap();
        let server = bind_loopback(&mut redirect).await.unwrap();
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, server.port().unwrap()));

        let client = tokio::spawn(async move {
            let mut responses = Vec::new();
            for target in ["/favicon.ico", "/callback?code=abc&state=xyz"] {
                let mut stream = TcpStream::connect(addr).await.unwrap();
                stream
                    .write_all(format!("GET {target} HTTP/1.1\r\nHost: {addr}\r\n\r\n").as_bytes())
                    .await
                    .unwrap();
                let mut response = String::new();
                tokio::io::AsyncReadExt::read_to_string(&mut stream, &mut response)
                    .await
                    .unwrap();
                responses.push(response);
            }
            responses
        });

        let query = accept_redirect(&server, &redirect).await.unwrap();
        assert_eq!(query, "code=abc&state=xyz");

        let responses = client.await.unwrap();
        assert!(responses[0].starts_with("HTTP/1.1 404"));
        assert!(responses[1].starts_with("HTTP/1.1 200"));
        assert!(responses[1].contains("Sign-in complete"));
    }

    #[tokio::test]
    async fn idle_connection_does_not_hold_up_the_redirect() {
        let mut redirect = Url::parse("http://127.0.0.1/callback").unwrap();
        let server = bind_loopback(&mut redirect).await.unwrap();
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, server.port().unwrap()));

        let client = tokio::spawn(async move {
            let idle = TcpStream::connect(addr).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;

            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(format!("GET /callback?code=c&state=s HTTP/1.1\r\nHost: {addr}\r\n\r\n").as_bytes())
                .await
                .unwrap();
            let mut response = String::new();
            tokio::io::AsyncReadExt::read_to_string(&mut stream, &mut response)
                .await
                .unwrap();
            drop(idle);
            response
        });

        let query = timeout(Duration::from_secs(3), accept_redirect(&server, &redirect))
            .await
            .expect("redirect stalled behind an idle connection")
            .unwrap();
        assert_eq!(query, "code=c&state=s");
        assert!(client.await.unwrap().starts_with("HTTP/1.1 200"));
    }

    #[tokio::test]
    async fn localhost_listens_on_both_loopback_families() {
        let mut redirect = Url::parse("http://localhost/callback").unwrap();
        let server = bind_loopback(&mut redirect).await.unwrap();
        let port = server.port().unwrap();
        assert_eq!(redirect.port(), Some(port));

        let v4 = server.v4.as_ref().expect("IPv4 loopback listener");
        assert_eq!(v4.local_addr().unwrap().port(), port);

        // Hosts without IPv6 only get the IPv4 socket.
        let Some(v6) = server.v6.as_ref() else {
            return;
        };
        assert_eq!(v6.local_addr().unwrap().port(), port);

        let client = tokio::spawn(async move {
            let addr = SocketAddr::from((Ipv6Addr::LOCALHOST, port));
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"GET /callback?code=v6&state=s HTTP/1.1\r\nHost: localhost\r\n\r\n")
                .await
                .unwrap();
            let mut response = String::new();
            tokio::io::AsyncReadExt::read_to_string(&mut stream, &mut response)
                .await
                .unwrap();
            response
        });

        let query = accept_redirect(&server, &redirect).await.unwrap();
        assert_eq!(query, "code=v6&state=s");
        assert!(client.await.unwrap().starts_with("HTTP/1.1 200"));
    }
}
