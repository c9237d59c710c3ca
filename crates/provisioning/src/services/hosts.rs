//! Synchronous host-provisioning fallback.
//!
//! Used when a `tenant.created` event could not be confirmed on the bus, so
//! that routing for the new tenant still gets configured.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::TenantId;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;

use crate::error::ProvisioningError;

/// Body of a host-provisioning request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRequest {
    pub slug: String,
    pub tenant_id: TenantId,
    pub admin_host: String,
    pub storefront_host: String,
}

/// Configures routing hosts for a tenant.
#[async_trait]
pub trait HostProvisioner: Send + Sync {
    async fn provision_hosts(&self, request: &HostRequest) -> Result<(), ProvisioningError>;
}

/// Host provisioner that POSTs to the ingress controller's `/hosts` endpoint.
pub struct HttpHostProvisioner {
    client: Client,
    endpoint: Url,
}

impl HttpHostProvisioner {
    /// Builds a provisioner with an explicit request timeout.
    ///
    /// `endpoint` is the full URL of the hosts resource.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl HostProvisioner for HttpHostProvisioner {
    async fn provision_hosts(&self, request: &HostRequest) -> Result<(), ProvisioningError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.bytes().await.map_err(map_transport_error)?;
        Err(map_status_error(status, body.as_ref()))
    }
}

fn map_transport_error(error: reqwest::Error) -> ProvisioningError {
    if error.is_timeout() {
        ProvisioningError::HostProvisioning(format!("timed out: {error}"))
    } else {
        ProvisioningError::HostProvisioning(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> ProvisioningError {
    let preview = body_preview(body);
    if preview.is_empty() {
        ProvisioningError::HostProvisioning(format!("status {}", status.as_u16()))
    } else {
        ProvisioningError::HostProvisioning(format!("status {}: {}", status.as_u16(), preview))
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(PREVIEW_CHAR_LIMIT)
        .collect()
}

#[derive(Debug, Default)]
struct InMemoryHostState {
    requests: Vec<HostRequest>,
    fail: bool,
}

/// In-memory host provisioner for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHostProvisioner {
    state: Arc<RwLock<InMemoryHostState>>,
}

impl InMemoryHostProvisioner {
    /// Creates a new in-memory host provisioner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures requests to fail.
    pub fn set_fail(&self, fail: bool) {
        self.state.write().unwrap().fail = fail;
    }

    /// Returns the successfully handled requests.
    pub fn requests(&self) -> Vec<HostRequest> {
        self.state.read().unwrap().requests.clone()
    }
}

#[async_trait]
impl HostProvisioner for InMemoryHostProvisioner {
    async fn provision_hosts(&self, request: &HostRequest) -> Result<(), ProvisioningError> {
        let mut state = self.state.write().unwrap();
        if state.fail {
            return Err(ProvisioningError::HostProvisioning("status 503".to_string()));
        }
        state.requests.push(request.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    fn request() -> HostRequest {
        HostRequest {
            slug: "acme".to_string(),
            tenant_id: TenantId::new(),
            admin_host: "acme.admin.example.com".to_string(),
            storefront_host: "acme.example.com".to_string(),
        }
    }

    /// Serves a single canned response and returns the raw request received.
    async fn serve_once(response: &'static str) -> (Url, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&received);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if received.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&received).into_owned()
        });

        let url = Url::parse(&format!("http://{addr}/hosts")).unwrap();
        (url, handle)
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let json = serde_json::to_value(request()).unwrap();
        assert_eq!(json["adminHost"], "acme.admin.example.com");
        assert_eq!(json["storefrontHost"], "acme.example.com");
        assert!(json.get("tenantId").is_some());
    }

    #[tokio::test]
    async fn test_http_success() {
        let (url, server) =
            serve_once("HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n").await;
        let provisioner = HttpHostProvisioner::new(url, Duration::from_secs(5)).unwrap();

        provisioner.provision_hosts(&request()).await.unwrap();

        let received = server.await.unwrap();
        assert!(received.starts_with("POST /hosts"));
        assert!(received.contains("\"adminHost\":\"acme.admin.example.com\""));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let (url, server) = serve_once(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\nConnection: close\r\n\r\nboom",
        )
        .await;
        let provisioner = HttpHostProvisioner::new(url, Duration::from_secs(5)).unwrap();

        let err = provisioner.provision_hosts(&request()).await.unwrap_err();
        assert!(matches!(err, ProvisioningError::HostProvisioning(ref m) if m == "status 500: boom"));
        server.await.unwrap();
    }

    #[test]
    fn test_body_preview_compacts_whitespace() {
        assert_eq!(body_preview(b"  a \n b  "), "a b");
        assert_eq!(body_preview(&[b'x'; 500]).len(), 160);
    }
}
