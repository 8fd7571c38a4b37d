//! Server counters.

use crate::frame::OpCode;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters shared by the listener and every session.
#[derive(Debug, Default)]
pub struct ServerStats {
    connections_accepted: AtomicU64,
    accept_errors: AtomicU64,
    tls_failures: AtomicU64,
    upgrades_succeeded: AtomicU64,
    upgrades_failed: AtomicU64,
    messages_received: AtomicU64,
    bytes_received: AtomicU64,
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
    pings_received: AtomicU64,
    pongs_received: AtomicU64,
    closes_received: AtomicU64,
    protocol_errors: AtomicU64,
    disconnects: AtomicU64,
}

impl ServerStats {
    /// Record an accepted TCP connection.
    pub fn record_accept(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transient accept failure.
    pub fn record_accept_error(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed or timed-out TLS handshake.
    pub fn record_tls_failure(&self) {
        self.tls_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of an opening handshake.
    pub fn record_upgrade(&self, success: bool) {
        if success {
            self.upgrades_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.upgrades_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a dispatched message or control frame.
    pub fn record_message_received(&self, opcode: OpCode, len: usize) {
        match opcode {
            OpCode::Ping => {
                self.pings_received.fetch_add(1, Ordering::Relaxed);
            },
            OpCode::Pong => {
                self.pongs_received.fetch_add(1, Ordering::Relaxed);
            },
            OpCode::Close => {},
            _ => {
                self.messages_received.fetch_add(1, Ordering::Relaxed);
            },
        }
        self.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Record an outgoing message.
    pub fn record_message_sent(&self, len: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Record a received Close frame.
    pub fn record_close(&self) {
        self.closes_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a protocol violation by a peer.
    pub fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session leaving the registry.
    pub fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            accept_errors: self.accept_errors.load(Ordering::Relaxed),
            tls_failures: self.tls_failures.load(Ordering::Relaxed),
            upgrades_succeeded: self.upgrades_succeeded.load(Ordering::Relaxed),
            upgrades_failed: self.upgrades_failed.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            pings_received: self.pings_received.load(Ordering::Relaxed),
            pongs_received: self.pongs_received.load(Ordering::Relaxed),
            closes_received: self.closes_received.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
        }
    }
}

/// A copy of [`ServerStats`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// TCP connections accepted.
    pub connections_accepted: u64,
    /// Transient accept failures.
    pub accept_errors: u64,
    /// Failed or timed-out TLS handshakes.
    pub tls_failures: u64,
    /// Completed upgrades.
    pub upgrades_succeeded: u64,
    /// Rejected or timed-out upgrades.
    pub upgrades_failed: u64,
    /// Text and binary messages received.
    pub messages_received: u64,
    /// Payload bytes received, control frames included.
    pub bytes_received: u64,
    /// Messages sent, control frames included.
    pub messages_sent: u64,
    /// Payload bytes sent.
    pub bytes_sent: u64,
    /// Pings received.
    pub pings_received: u64,
    /// Pongs received.
    pub pongs_received: u64,
    /// Close frames received.
    pub closes_received: u64,
    /// Protocol violations by peers.
    pub protocol_errors: u64,
    /// Sessions removed from the registry.
    pub disconnects: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_counters() {
        let stats = ServerStats::default();
        stats.record_message_received(OpCode::Text, 5);
        stats.record_message_received(OpCode::Binary, 10);
        stats.record_message_received(OpCode::Ping, 2);
        stats.record_message_received(OpCode::Close, 2);
        stats.record_message_sent(7);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.messages_received, 2);
        assert_eq!(snapshot.pings_received, 1);
        assert_eq!(snapshot.bytes_received, 19);
        assert_eq!(snapshot.messages_sent, 1);
        assert_eq!(snapshot.bytes_sent, 7);
    }

    #[test]
    fn test_upgrade_counters() {
        let stats = ServerStats::default();
        stats.record_upgrade(true);
        stats.record_upgrade(true);
        stats.record_upgrade(false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.upgrades_succeeded, 2);
        assert_eq!(snapshot.upgrades_failed, 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = ServerStats::default();
        stats.record_accept();
        let value = toml::to_string(&stats.snapshot()).unwrap();
        assert!(value.contains("connections_accepted = 1"));
    }
}
