//! Upgrade request reading and parsing.

use super::error::{HandshakeError, HandshakeResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use regex::Regex;
use std::collections::HashMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tracing::debug;

const REQUEST_LINE: &str = r"(?i)^(GET)\s+(\S+)\s+HTTP/(\d\.\d)$";
const HEADER_LINE: &str = r"^([\w-]+):[ \t]*(.*?)[ \t]*$";

/// Compiled request-line and header-line patterns.
///
/// Built once per server and shared by all of its sessions.
#[derive(Debug, Clone)]
pub struct RequestParser {
    request_line: Regex,
    header_line: Regex,
}

impl RequestParser {
    /// Compile the request patterns.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error; the built-in patterns are valid so
    /// this only fails if the regex engine rejects them.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            request_line: Regex::new(REQUEST_LINE)?,
            header_line: Regex::new(HEADER_LINE)?,
        })
    }

    /// Parse a request header block.
    ///
    /// `host` is the advertised origin joined with the resource to form
    /// [`Handshake::url`].
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::MalformedRequest`] on the first line that
    /// does not match its pattern.
    pub fn parse(&self, request: &str, host: Option<&str>) -> HandshakeResult<Handshake> {
        let mut lines = request
            .trim_end_matches(['\r', '\n'])
            .split("\r\n")
            .map(|line| line.trim_end_matches('\n'));

        let first = lines.next().unwrap_or_default();
        let caps = self.request_line.captures(first).ok_or_else(|| {
            debug!(line = ?first, "Rejected request line");
            HandshakeError::MalformedRequest("malformed request line".to_string())
        })?;

        let method = caps[1].to_string();
        let resource = caps[2].to_string();
        let version = caps[3].to_string();

        let mut headers: HashMap<String, String> = HashMap::new();
        for line in lines {
            let caps = self.header_line.captures(line).ok_or_else(|| {
                debug!(line = ?line, "Rejected header line");
                HandshakeError::MalformedRequest("malformed header line".to_string())
            })?;

            let value = &caps[2];
            headers
                .entry(caps[1].to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }

        let url = match host {
            Some(host) => format!("{}{}", host.trim_end_matches('/'), resource),
            None => resource.clone(),
        };

        Ok(Handshake {
            method,
            version,
            resource,
            url,
            headers,
        })
    }
}

/// A parsed upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    method: String,
    version: String,
    resource: String,
    url: String,
    headers: HashMap<String, String>,
}

impl Handshake {
    /// Request method, as sent.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// HTTP version, e.g. `1.1`.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Requested resource, e.g. `/chat?room=1`.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Configured host joined with the resource.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Headers with names as received.
    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Look a header up by name, ignoring ASCII case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str).or_else(|| {
            self.headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        })
    }

    /// The `Sec-WebSocket-Key` header.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.header("Sec-WebSocket-Key")
    }

    /// Sub-protocols the client offered, in its order of preference.
    #[must_use]
    pub fn requested_protocols(&self) -> Vec<&str> {
        self.header("Sec-WebSocket-Protocol")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether this request is eligible for a WebSocket upgrade.
    #[must_use]
    pub fn verify_upgrade(&self) -> bool {
        self.check_upgrade(false).is_ok()
    }

    /// Check upgrade eligibility, returning the first failed requirement.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::InvalidUpgrade`] naming the failed check.
    pub fn check_upgrade(&self, require_origin: bool) -> HandshakeResult<()> {
        let invalid = |reason: &str| Err(HandshakeError::InvalidUpgrade(reason.to_string()));

        if self.header("Host").is_none() {
            return invalid("missing Host header");
        }

        if !self
            .header("Upgrade")
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
        {
            return invalid("Upgrade header must be websocket");
        }

        if !self
            .header("Connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("upgrade"))
        {
            return invalid("Connection header must be upgrade");
        }

        let key_ok = self
            .key()
            .and_then(|key| STANDARD.decode(key).ok())
            .is_some_and(|nonce| nonce.len() == 16);
        if !key_ok {
            return invalid("Sec-WebSocket-Key must be 16 base64 encoded bytes");
        }

        if self.header("Sec-WebSocket-Version") != Some("13") {
            return invalid("Sec-WebSocket-Version must be 13");
        }

        if require_origin && self.header("Origin").is_none() {
            return invalid("missing Origin header");
        }

        Ok(())
    }
}

/// Read a request header block, up to and including the blank line.
///
/// Bytes the client sends after the blank line stay in `reader`.
///
/// # Errors
///
/// - [`HandshakeError::TimedOut`] if the stream ends first
/// - [`HandshakeError::RequestTooLarge`] if `limit` bytes pass without a blank line
/// - [`HandshakeError::MalformedRequest`] if the block is not UTF-8
pub async fn read_request<R>(reader: &mut R, limit: usize) -> HandshakeResult<String>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut raw = Vec::with_capacity(limit.min(1024));

    while !raw.ends_with(b"\r\n\r\n") {
        let remaining = limit.saturating_sub(raw.len());
        if remaining == 0 {
            return Err(HandshakeError::RequestTooLarge { limit });
        }

        let read = (&mut *reader)
            .take(remaining as u64)
            .read_until(b'\n', &mut raw)
            .await?;
        if read == 0 {
            return Err(HandshakeError::TimedOut);
        }
    }

    String::from_utf8(raw)
        .map_err(|_| HandshakeError::MalformedRequest("request is not valid UTF-8".to_string()))
}
