//! Network infrastructure — implements `NetworkProbe` using `spawn_blocking`.

use std::time::Duration;

use anyhow::Result;

use crate::application::ports::NetworkProbe;

/// Production implementation that performs real network checks.
pub struct TokioNetworkProbe;

impl NetworkProbe for TokioNetworkProbe {
    async fn check_tcp_connectivity(&self, host: &str, port: u16, timeout: Duration) -> Result<bool> {
        let addr = format!("{host}:{port}");
        let result = tokio::task::spawn_blocking(move || {
            let addr: std::net::SocketAddr = addr
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid address {addr}: {e}"))?;
            Ok::<bool, anyhow::Error>(std::net::TcpStream::connect_timeout(&addr, timeout).is_ok())
        })
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking panicked: {e}"))??;
        Ok(result)
    }
}
