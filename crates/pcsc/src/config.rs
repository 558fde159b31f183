//! Configuration options for the PC/SC transport

use pcsc::{Protocols, ShareMode as PcscShareMode};

/// Sharing mode for card connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMode {
    /// Exclusive access to the card
    Exclusive,
    /// Shared access to the card (default)
    Shared,
}

impl From<ShareMode> for PcscShareMode {
    fn from(mode: ShareMode) -> Self {
        match mode {
            ShareMode::Exclusive => Self::Exclusive,
            ShareMode::Shared => Self::Shared,
        }
    }
}

/// Configuration options for the PC/SC transport
#[derive(Debug, Clone, Copy)]
pub struct PcscConfig {
    /// Sharing mode for card connections
    pub share_mode: ShareMode,

    /// Protocols the reader may negotiate with the card
    pub protocols: Protocols,

    /// Reconnect once and retry the command when the card was reset
    pub auto_reconnect: bool,
}

impl Default for PcscConfig {
    fn default() -> Self {
        Self {
            share_mode: ShareMode::Shared,
            protocols: Protocols::T0 | Protocols::T1,
            auto_reconnect: true,
        }
    }
}

impl PcscConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sharing mode
    pub const fn with_share_mode(mut self, mode: ShareMode) -> Self {
        self.share_mode = mode;
        self
    }

    /// Set the protocols
    pub const fn with_protocols(mut self, protocols: Protocols) -> Self {
        self.protocols = protocols;
        self
    }

    /// Set whether to reconnect after a card reset
    pub const fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PcscConfig::new();
        assert_eq!(config.share_mode, ShareMode::Shared);
        assert!(config.protocols.contains(Protocols::T0));
        assert!(config.protocols.contains(Protocols::T1));
        assert!(config.auto_reconnect);

        let config = config
            .with_share_mode(ShareMode::Exclusive)
            .with_protocols(Protocols::T0)
            .with_auto_reconnect(false);
        assert!(matches!(
            PcscShareMode::from(config.share_mode),
            PcscShareMode::Exclusive
        ));
        assert!(!config.protocols.contains(Protocols::T1));
        assert!(!config.auto_reconnect);
    }
}
