// src/probe.rs

//! Network probes used after deployment and by the health check.

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

/// Whether something accepts TCP connections on `127.0.0.1:port`.
pub async fn port_open(port: u16, timeout: Duration) -> bool {
    let addr = format!("127.0.0.1:{port}");
    match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!(port, error = %e, "port not reachable");
            false
        }
        Err(_) => {
            debug!(port, "port probe timed out");
            false
        }
    }
}

/// Ports from `ports` that are not reachable.
pub async fn closed_ports(ports: &[u16], timeout: Duration) -> Vec<u16> {
    let mut closed = Vec::new();
    for &port in ports {
        if !port_open(port, timeout).await {
            closed.push(port);
        }
    }
    closed
}

/// GET `url` and report whether it answered with a 2xx status.
pub async fn http_healthy(url: &str, timeout: Duration) -> bool {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(c) => c,
        Err(e) => {
            debug!(error = %e, "failed to build HTTP client");
            return false;
        }
    };

    match client.get(url).send().await {
        Ok(resp) => {
            let ok = resp.status().is_success();
            debug!(url, status = %resp.status(), "health endpoint answered");
            ok
        }
        Err(e) => {
            debug!(url, error = %e, "health endpoint unreachable");
            false
        }
    }
}
