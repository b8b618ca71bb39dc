//! Shared secret used by agents to authenticate socket connections.

use subtle::ConstantTimeEq;

/// Reply sent by the server after a successful handshake.
pub const AUTHENTICATED: &str = "authenticated";

/// Reply sent by the server before closing a connection that failed the handshake.
pub const AUTH_FAILED: &str = "Fail to authenticate";

/// The agent password. Compared in constant time and never printed.
#[derive(Clone)]
pub struct SharedSecret(String);

impl SharedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Check a candidate received from a peer.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0.as_bytes().ct_eq(candidate.as_bytes()).into()
    }

    /// The raw secret, for sending it to the server.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_only_exact_secret() {
        let secret = SharedSecret::new("hunter2");
        assert!(secret.matches("hunter2"));
        assert!(!secret.matches("hunter"));
        assert!(!secret.matches("hunter22"));
        assert!(!secret.matches(""));
    }

    #[test]
    fn debug_is_redacted() {
        assert_eq!(format!("{:?}", SharedSecret::new("hunter2")), "SharedSecret(***)");
    }
}
