//! Server preflight - confirm the reference and candidate servers answer
//! before spending browser time on them

use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{VisualError, VisualResult};

const PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Probe `base_url` until it answers or `timeout` elapses.
///
/// Any HTTP response counts as reachable; only connection-level failures
/// are retried. A zero timeout performs a single probe.
pub async fn wait_until_reachable(base_url: &str, timeout: Duration) -> VisualResult<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    let start = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;

        match client.get(base_url).send().await {
            Ok(resp) => {
                if !resp.status().is_success() {
                    warn!("{} answered preflight with {}", base_url, resp.status());
                }
                return Ok(());
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for {} to accept connections...", base_url);
                }
                // Connection refused is expected while a dev server is starting
                if !e.is_connect() && !e.is_timeout() {
                    warn!("Preflight error for {}: {}", base_url, e);
                }
            }
        }

        if start.elapsed() + PROBE_INTERVAL > timeout {
            break;
        }
        sleep(PROBE_INTERVAL).await;
    }

    Err(VisualError::ServerUnreachable {
        url: base_url.to_string(),
        attempts,
    })
}

/// Probe both servers concurrently
pub async fn preflight(reference_url: &str, candidate_url: &str, timeout: Duration) -> VisualResult<()> {
    let (reference, candidate) = tokio::join!(
        wait_until_reachable(reference_url, timeout),
        wait_until_reachable(candidate_url, timeout),
    );
    reference?;
    candidate?;
    info!("Reference {} and candidate {} are reachable", reference_url, candidate_url);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}/")
    }

    #[tokio::test]
    async fn test_unreachable_server_single_probe() {
        let url = closed_port_url();
        let err = wait_until_reachable(&url, Duration::ZERO).await.unwrap_err();
        match err {
            VisualError::ServerUnreachable { attempts, .. } => assert_eq!(attempts, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_reachable_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            }
        });

        wait_until_reachable(&format!("http://{addr}/"), Duration::from_secs(2))
            .await
            .unwrap();
    }
}
