//! Session lifecycle states.

use std::fmt;

/// Lifecycle of a connection.
///
/// States only move forward: `AwaitingHandshake → Open → Closing → Closed`.
/// A failed handshake goes straight to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    /// Waiting for the client's upgrade request.
    AwaitingHandshake,
    /// Upgrade complete; frames flow in both directions.
    Open,
    /// A Close frame has been sent; waiting for the peer's.
    Closing,
    /// Terminal.
    Closed,
}

impl SessionState {
    /// Whether a frame with the given control-ness may be sent.
    ///
    /// Data needs `Open`; control frames are still allowed while `Closing`
    /// so pings can be answered and the close handshake can finish.
    #[must_use]
    pub fn can_send(self, control: bool) -> bool {
        match self {
            Self::Open => true,
            Self::Closing => control,
            Self::AwaitingHandshake | Self::Closed => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingHandshake => "awaiting-handshake",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
