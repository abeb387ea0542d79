//! Network probes used by the resolver and the health checks.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tokio::net::TcpStream;
use tracing::debug;

use warden_core::error::{WardenError, WardenResult};

/// Issues an HTTP GET and reports the status code
#[async_trait]
pub trait HttpProbe: Send + Sync {
    async fn get_status(&self, url: &str, timeout: Duration) -> WardenResult<u16>;
}

/// Opens a TCP connection and reports how long it took
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn connect(&self, host: &str, port: u16, timeout: Duration) -> WardenResult<Duration>;
}

/// [`HttpProbe`] backed by reqwest
#[derive(Clone)]
pub struct ReqwestHttpProbe {
    client: Client,
}

impl ReqwestHttpProbe {
    pub fn new() -> WardenResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .no_proxy()
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpProbe for ReqwestHttpProbe {
    async fn get_status(&self, url: &str, timeout: Duration) -> WardenResult<u16> {
        debug!(url, "Probing health endpoint");
        let response = self.client.get(url).timeout(timeout).send().await?;
        Ok(response.status().as_u16())
    }
}

/// [`ConnectivityProbe`] using a plain TCP connect
#[derive(Debug, Clone, Default)]
pub struct TcpConnectivityProbe;

#[async_trait]
impl ConnectivityProbe for TcpConnectivityProbe {
    async fn connect(&self, host: &str, port: u16, timeout: Duration) -> WardenResult<Duration> {
        let started = Instant::now();
        match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => Ok(started.elapsed()),
            Ok(Err(e)) => Err(WardenError::network(format!("{}:{}: {}", host, port, e))),
            Err(_) => Err(WardenError::timeout(format!("connect {}:{}", host, port), timeout)),
        }
    }
}

/// Whether an HTTP status counts as "reachable"
pub fn status_is_reachable(status: u16, accept_unauthorized: bool) -> bool {
    (200..300).contains(&status) || (accept_unauthorized && status == 401)
}
