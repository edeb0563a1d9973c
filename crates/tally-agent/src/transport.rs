use async_trait::async_trait;
use std::net::IpAddr;
use tally_common::crypto::CryptoError;
use tally_common::retry::is_connection_refused;
use tally_common::sign::{SignError, HASH_HEADER};

/// One encoded chunk, ready to go on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    /// Gzip-compressed JSON, RSA-encrypted when a public key is configured.
    pub body: Vec<u8>,
    /// Hex HMAC-SHA256 of the compressed bytes, when a key is configured.
    pub signature: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection refused: {0}")]
    ConnectionRefused(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to encode chunk: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to compress chunk: {0}")]
    Compress(#[source] std::io::Error),
    #[error("failed to sign chunk: {0}")]
    Sign(#[from] SignError),
    #[error("failed to encrypt chunk: {0}")]
    Encrypt(#[from] CryptoError),
}

impl DeliveryError {
    /// Only refused connections are retried; anything else fails the chunk.
    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::ConnectionRefused(_))
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        if is_connection_refused(&e) {
            DeliveryError::ConnectionRefused(e)
        } else {
            DeliveryError::Request(e)
        }
    }
}

/// Delivers encoded chunks to the collector service.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, payload: &Payload) -> Result<(), DeliveryError>;
}

/// POSTs chunks to `http://{address}/updates/`.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    real_ip: Option<IpAddr>,
}

impl HttpTransport {
    pub fn new(address: &str, real_ip: Option<IpAddr>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("http://{}/updates/", address.trim_end_matches('/')),
            real_ip,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn deliver(&self, payload: &Payload) -> Result<(), DeliveryError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::CONTENT_ENCODING, "gzip")
            .body(payload.body.clone());
        if let Some(ip) = self.real_ip {
            request = request.header("X-Real-IP", ip.to_string());
        }
        if let Some(signature) = &payload.signature {
            request = request.header(HASH_HEADER, signature);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// The local address the OS would use to reach `address`. No packets are
/// sent; a UDP socket is only connected to pick a route.
pub fn outbound_ip(address: &str) -> Option<IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect(address).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}
