//! Upgrade responses.

use base64::{engine::general_purpose::STANDARD, Engine};
use sha1::{Digest, Sha1};

/// GUID appended to the client key before hashing (RFC 6455 section 1.3).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Compute the `Sec-WebSocket-Accept` value for a client key.
#[must_use]
pub fn accept_token(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Build the `101 Switching Protocols` response.
#[must_use]
pub fn switching_protocols(accept: &str, protocol: Option<&str>) -> Vec<u8> {
    let mut response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n"
    );

    if let Some(protocol) = protocol {
        response.push_str("Sec-WebSocket-Protocol: ");
        response.push_str(protocol);
        response.push_str("\r\n");
    }

    response.push_str("\r\n");
    response.into_bytes()
}

/// Build a `400 Bad Request` response carrying `reason` as its body.
#[must_use]
pub fn bad_request(reason: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 400 Bad Request\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {reason}",
        reason.len()
    )
    .into_bytes()
}

/// Pick the first client-offered sub-protocol the server supports.
#[must_use]
pub fn negotiate_protocol(requested: &[&str], supported: &[String]) -> Option<String> {
    requested
        .iter()
        .find(|req| supported.iter().any(|s| s.eq_ignore_ascii_case(req)))
        .map(|req| (*req).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_token_rfc_vector() {
        assert_eq!(
            accept_token("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_accept_token_is_deterministic() {
        let key = "x3JJHMbDL1EzLkh9GBhXDw==";
        assert_eq!(accept_token(key), accept_token(key));
        assert_eq!(accept_token(key), "HSmrc0sMlYUkAGmm5OPpG2HaGWk=");
    }

    #[test]
    fn test_switching_protocols() {
        let response = String::from_utf8(switching_protocols("abc=", None)).unwrap();
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Upgrade: websocket\r\n"));
        assert!(response.contains("Connection: Upgrade\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: abc=\r\n"));
        assert!(!response.contains("Sec-WebSocket-Protocol"));
        assert!(response.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_switching_protocols_with_protocol() {
        let response = String::from_utf8(switching_protocols("abc=", Some("chat"))).unwrap();
        assert!(response.contains("Sec-WebSocket-Protocol: chat\r\n"));
    }

    #[test]
    fn test_bad_request() {
        let response = String::from_utf8(bad_request("missing Host header")).unwrap();
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.contains("Content-Length: 19\r\n"));
        assert!(response.ends_with("\r\n\r\nmissing Host header"));
    }

    #[test]
    fn test_negotiate_protocol() {
        let supported = vec!["json".to_string(), "graphql-ws".to_string()];

        assert_eq!(
            negotiate_protocol(&["graphql-ws", "json"], &supported),
            Some("graphql-ws".to_string())
        );
        assert_eq!(
            negotiate_protocol(&["JSON"], &supported),
            Some("JSON".to_string())
        );
        assert_eq!(negotiate_protocol(&["xml"], &supported), None);
        assert_eq!(negotiate_protocol(&[], &supported), None);
    }
}
