//! # Handshake Negotiator
//!
//! Turns the first bytes of an accepted stream into a validated WebSocket
//! upgrade, or rejects it with `400 Bad Request`.
//!
//! The caller races [`accept_upgrade`] against the configured upgrade
//! timeout; a timeout sends nothing.

mod error;
mod request;
mod response;

pub use error::{HandshakeError, HandshakeResult};
pub use request::{read_request, Handshake, RequestParser};
pub use response::{accept_token, bad_request, negotiate_protocol, switching_protocols, WS_GUID};

use crate::config::ServerConfig;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Outcome of a successful upgrade.
#[derive(Debug, Clone)]
pub struct Negotiated {
    handshake: Handshake,
    accept: String,
    protocol: Option<String>,
}

impl Negotiated {
    /// The parsed upgrade request.
    #[must_use]
    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    /// Requested resource.
    #[must_use]
    pub fn resource(&self) -> &str {
        self.handshake.resource()
    }

    /// Configured host joined with the resource.
    #[must_use]
    pub fn url(&self) -> &str {
        self.handshake.url()
    }

    /// The `Sec-WebSocket-Accept` value that was sent.
    #[must_use]
    pub fn accept(&self) -> &str {
        &self.accept
    }

    /// Selected sub-protocol, if any.
    #[must_use]
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }
}

/// Read, parse and validate an upgrade request.
///
/// Writes nothing; see [`accept_upgrade`] for the full exchange.
///
/// # Errors
///
/// Any [`HandshakeError`] raised while reading or validating the request.
pub async fn negotiate<R>(
    reader: &mut R,
    parser: &RequestParser,
    config: &ServerConfig,
) -> HandshakeResult<Negotiated>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let raw = read_request(reader, config.max_handshake_size).await?;
    let handshake = parser.parse(&raw, config.host.as_deref())?;
    handshake.check_upgrade(config.require_origin)?;

    let accept = handshake.key().map(accept_token).unwrap_or_default();
    let protocol = negotiate_protocol(&handshake.requested_protocols(), &config.protocols);

    Ok(Negotiated {
        handshake,
        accept,
        protocol,
    })
}

/// Perform the server side of the opening handshake.
///
/// Answers `101 Switching Protocols` on success. A request that arrived but
/// is invalid gets `400 Bad Request` before the error is returned.
///
/// # Errors
///
/// Any [`HandshakeError`]; the stream should be dropped afterwards.
pub async fn accept_upgrade<R, W>(
    reader: &mut R,
    writer: &mut W,
    parser: &RequestParser,
    config: &ServerConfig,
) -> HandshakeResult<Negotiated>
where
    R: AsyncBufRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    match negotiate(reader, parser, config).await {
        Ok(negotiated) => {
            let response = switching_protocols(negotiated.accept(), negotiated.protocol());
            writer.write_all(&response).await?;
            writer.flush().await?;
            Ok(negotiated)
        },
        Err(e) if e.is_client_error() => {
            let response = bad_request(&e.to_string());
            if let Err(write_err) = writer.write_all(&response).await {
                debug!(error = %write_err, "Failed to send 400 response");
            } else if let Err(flush_err) = writer.flush().await {
                debug!(error = %flush_err, "Failed to flush 400 response");
            }
            Err(e)
        },
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, BufReader};

    const REQUEST: &str = "GET /chat HTTP/1.1\r\n\
                           Host: localhost\r\n\
                           Upgrade: websocket\r\n\
                           Connection: upgrade\r\n\
                           Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                           Sec-WebSocket-Protocol: v2, v1\r\n\
                           Sec-WebSocket-Version: 13\r\n\
                           \r\n";

    async fn exchange(
        request: &str,
        config: &ServerConfig,
    ) -> (HandshakeResult<Negotiated>, String) {
        let parser = RequestParser::new().unwrap();
        let (mut client, server) = tokio::io::duplex(16 * 1024);
        let (read_half, mut write_half) = tokio::io::split(server);
        let mut reader = BufReader::new(read_half);

        client.write_all(request.as_bytes()).await.unwrap();
        client.shutdown().await.unwrap();

        let result = accept_upgrade(&mut reader, &mut write_half, &parser, config).await;
        drop(write_half);
        drop(reader);

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        (result, response)
    }

    #[tokio::test]
    async fn test_accept_upgrade() {
        let config = ServerConfig::default()
            .with_host("ws://localhost")
            .with_protocols(["v1"]);
        let (result, response) = exchange(REQUEST, &config).await;

        let negotiated = result.unwrap();
        assert_eq!(negotiated.resource(), "/chat");
        assert_eq!(negotiated.url(), "ws://localhost/chat");
        assert_eq!(negotiated.protocol(), Some("v1"));
        assert_eq!(negotiated.accept(), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");

        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(response.contains("Sec-WebSocket-Protocol: v1\r\n"));
    }

    #[tokio::test]
    async fn test_invalid_upgrade_gets_400() {
        let request = REQUEST.replace("Sec-WebSocket-Version: 13", "Sec-WebSocket-Version: 8");
        let (result, response) = exchange(&request, &ServerConfig::default()).await;

        assert!(matches!(result, Err(HandshakeError::InvalidUpgrade(_))));
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn test_malformed_request_gets_400() {
        let (result, response) =
            exchange("DELETE / HTTP/1.1\r\n\r\n", &ServerConfig::default()).await;

        assert!(matches!(result, Err(HandshakeError::MalformedRequest(_))));
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn test_400_body_does_not_reflect_request() {
        let (_, response) = exchange(
            "GET /<script>alert(1)</script> HTTP/1.1 extra\r\n\r\n",
            &ServerConfig::default(),
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.contains("malformed request line"));
        assert!(!response.contains("script"));

        let request = REQUEST.replace("Host: localhost", "<b>injected</b>");
        let (_, response) = exchange(&request, &ServerConfig::default()).await;
        assert!(response.contains("malformed header line"));
        assert!(!response.contains("injected"));
    }

    #[tokio::test]
    async fn test_closed_stream_gets_no_response() {
        let (result, response) = exchange("GET / HTTP/1.1\r\n", &ServerConfig::default()).await;
        assert!(matches!(result, Err(HandshakeError::TimedOut)));
        assert!(response.is_empty());
    }
}
