//! Caller identity context for mutating operations.
//!
//! The connected identity is an explicit value passed into every write path
//! instead of process-wide state, so authorization checks run without a live
//! provider.

/// Source of the caller's address, e.g. a wallet or signer binding.
pub trait IdentityProvider {
    /// Returns the connected address, or `None` when disconnected.
    fn current_address(&self) -> Option<String>;
}

/// Identity context owned by one calling session until disconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    address: Option<String>,
}

impl Session {
    /// Session without an identity; mutating calls fail with `NotAuthorized`.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Session connected as `address`. Blank addresses stay anonymous.
    pub fn connected(address: impl Into<String>) -> Self {
        let mut session = Self::default();
        session.connect(address);
        session
    }

    /// Captures the provider's current address once.
    pub fn acquire(provider: &dyn IdentityProvider) -> Self {
        match provider.current_address() {
            Some(address) => Self::connected(address),
            None => Self::anonymous(),
        }
    }

    pub fn connect(&mut self, address: impl Into<String>) {
        let address = address.into();
        let trimmed = address.trim();
        self.address = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
    }

    pub fn disconnect(&mut self) {
        self.address = None;
    }

    pub fn current_address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn is_authorized(&self) -> bool {
        self.address.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::{IdentityProvider, Session};

    struct FixedProvider(Option<&'static str>);

    impl IdentityProvider for FixedProvider {
        fn current_address(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    #[test]
    fn blank_address_is_anonymous() {
        assert!(!Session::connected("   ").is_authorized());
        assert_eq!(Session::connected(" 0xabc ").current_address(), Some("0xabc"));
    }

    #[test]
    fn disconnect_drops_identity() {
        let mut session = Session::connected("0xabc");
        session.disconnect();
        assert!(!session.is_authorized());
        assert_eq!(session.current_address(), None);
    }

    #[test]
    fn acquire_reads_provider_once() {
        assert!(Session::acquire(&FixedProvider(Some("0x1"))).is_authorized());
        assert!(!Session::acquire(&FixedProvider(None)).is_authorized());
    }
}
