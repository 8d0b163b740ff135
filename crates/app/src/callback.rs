use anyhow::{bail, Context, Result};
use audion_backends::{BackendEvent, Inbox};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

const READ_TIMEOUT: Duration = Duration::from_secs(10);

const PAGE: &str = "<!doctype html><html><body><p>Audion is authorized. You can close this tab.</p></body></html>";

/// Accepts browser redirects for a loopback `redirect` URI and delivers each one to the inbox.
pub async fn listen(redirect: &Url, inbox: Inbox) -> Result<JoinHandle<()>> {
    if redirect.scheme() != "http" {
        bail!("redirect uri {redirect} is not a loopback http address");
    }
    let host = redirect
        .host_str()
        .context("redirect uri has no host")?
        .to_string();
    let port = redirect
        .port_or_known_default()
        .context("redirect uri has no port")?;
    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("failed to listen on {host}:{port}"))?;
    info!(%host, port, "waiting for authorization callback");

    let base = redirect.clone();
    Ok(tokio::spawn(async move {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(error=%err, "callback listener accept failed");
                    continue;
                }
            };
            debug!(%peer, "callback connection");
            if inbox.is_closed() {
                break;
            }
            let (base, inbox) = (base.clone(), inbox.clone());
            // Browsers open speculative connections that never send a request.
            tokio::spawn(async move {
                match serve(stream, &base).await {
                    Ok(Some(url)) => {
                        let _ = inbox.send(BackendEvent::Url(url));
                    }
                    Ok(None) => {}
                    Err(err) => debug!(%peer, error=%err, "callback connection dropped"),
                }
            });
        }
    }))
}

async fn serve(mut stream: TcpStream, base: &Url) -> Result<Option<Url>> {
    let mut buf = vec![0u8; 8 * 1024];
    let n = timeout(READ_TIMEOUT, stream.read(&mut buf))
        .await
        .context("no request before timeout")??;
    let head = String::from_utf8_lossy(&buf[..n]);
    let target = request_target(&head);

    let url = match target {
        Some(target) => Some(base.join(target)?),
        None => None,
    };
    let (status, body) = if url.is_some() {
        ("200 OK", PAGE)
    } else {
        ("400 Bad Request", "bad request")
    };
    let reply = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(reply.as_bytes()).await?;
    stream.shutdown().await?;

    // Favicon requests and other paths are answered but not delivered.
    Ok(url.filter(|u| u.path() == base.path()))
}

/// Path and query of a `GET` request line.
fn request_target(head: &str) -> Option<&str> {
    let line = head.lines().next()?;
    let mut parts = line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let target = parts.next()?;
    target.starts_with('/').then_some(target)
}
