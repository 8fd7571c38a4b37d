//! Random key material.
//!
//! One generator is owned by each server and shared with its sessions
//! through [`ServerHandle`](crate::server::ServerHandle); there is no
//! process-wide RNG state.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::Mutex;

/// Source of ping payloads and handshake keys.
#[derive(Debug)]
pub struct KeyGenerator {
    rng: Mutex<StdRng>,
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyGenerator {
    /// Create a generator seeded from the operating system.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Create a deterministic generator.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Fill `dst` with random bytes.
    pub fn fill(&self, dst: &mut [u8]) {
        // A poisoned lock still holds a usable RNG.
        let mut rng = match self.rng.lock() {
            Ok(rng) => rng,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.fill_bytes(dst);
    }

    /// A random ping payload of `len` bytes.
    #[must_use]
    pub fn ping_payload(&self, len: usize) -> Vec<u8> {
        let mut payload = vec![0u8; len];
        self.fill(&mut payload);
        payload
    }

    /// A `Sec-WebSocket-Key` value: 16 random bytes, base64 encoded.
    #[must_use]
    pub fn generate_client_key(&self) -> String {
        let mut nonce = [0u8; 16];
        self.fill(&mut nonce);
        STANDARD.encode(nonce)
    }
}
