//! Terminal configuration
//!
//! A [`KernelConfig`] is built once and turned into the `config` and
//! `supported_aids` TLV lists a transaction context reads from.

use nexum_emv_tlv::{TlvFlags, TlvList, tags};
use nexum_emv_ttl::TransportMode;
use nexum_emv_ttl::commands::{MAX_DF_NAME_LEN, MIN_DF_NAME_LEN};

use crate::capk::CaPublicKey;
use crate::error::Error;

/// An application the terminal supports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedAid {
    /// Terminal AID
    pub aid: Vec<u8>,
    /// Application Selection Indicator: the card AID may extend the terminal AID
    pub partial_match: bool,
}

/// Biased random transaction selection parameters (EMV Book 3 section 10.6.2)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RandomSelection {
    /// Amounts below this value use the target percentage
    pub threshold: u32,
    /// Target percentage, 0 to 99
    pub target_percentage: u8,
    /// Maximum target percentage reached at the floor limit, 0 to 99
    pub max_target_percentage: u8,
}

/// Kernel configuration
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Reader framing
    pub transport_mode: TransportMode,
    /// Terminal Type (`9F35`)
    pub terminal_type: u8,
    /// Terminal Capabilities (`9F33`)
    pub terminal_capabilities: [u8; 3],
    /// Additional Terminal Capabilities (`9F40`)
    pub additional_terminal_capabilities: [u8; 5],
    /// Terminal Country Code (`9F1A`)
    pub terminal_country_code: [u8; 2],
    /// Terminal Floor Limit (`9F1B`)
    pub floor_limit: u32,
    /// Application Version Number of the terminal (`9F09`)
    pub application_version: [u8; 2],
    /// Terminal Action Code, default
    pub tac_default: [u8; 5],
    /// Terminal Action Code, denial
    pub tac_denial: [u8; 5],
    /// Terminal Action Code, online
    pub tac_online: [u8; 5],
    /// DDOL used when the card provides none
    pub default_ddol: Vec<u8>,
    /// Random transaction selection
    pub random_selection: RandomSelection,
    /// Applications the terminal supports, in order of preference
    pub supported_aids: Vec<SupportedAid>,
    /// Certification Authority public keys
    pub ca_public_keys: Vec<CaPublicKey>,
    /// PANs on the terminal exception file
    pub exception_file: Vec<Vec<u8>>,
    /// Whether extended data authentication may be selected
    pub xda_enabled: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            transport_mode: TransportMode::Apdu,
            // Attended, offline with online capability, merchant operated
            terminal_type: 0x22,
            terminal_capabilities: [0xE0, 0xF8, 0xC8],
            additional_terminal_capabilities: [0x60, 0x00, 0xF0, 0xA0, 0x01],
            terminal_country_code: [0x08, 0x40],
            floor_limit: 0,
            application_version: [0x00, 0x8C],
            tac_default: [0x00; 5],
            tac_denial: [0x00; 5],
            tac_online: [0x00; 5],
            default_ddol: vec![0x9F, 0x37, 0x04],
            random_selection: RandomSelection::default(),
            supported_aids: Vec::new(),
            ca_public_keys: Vec::new(),
            exception_file: Vec::new(),
            xda_enabled: false,
        }
    }
}

impl KernelConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reader framing
    pub const fn with_transport_mode(mut self, mode: TransportMode) -> Self {
        self.transport_mode = mode;
        self
    }

    /// Set the terminal type
    pub const fn with_terminal_type(mut self, terminal_type: u8) -> Self {
        self.terminal_type = terminal_type;
        self
    }

    /// Set the terminal capabilities
    pub const fn with_terminal_capabilities(mut self, capabilities: [u8; 3]) -> Self {
        self.terminal_capabilities = capabilities;
        self
    }

    /// Set the additional terminal capabilities
    pub const fn with_additional_terminal_capabilities(mut self, capabilities: [u8; 5]) -> Self {
        self.additional_terminal_capabilities = capabilities;
        self
    }

    /// Set the terminal country code
    pub const fn with_terminal_country_code(mut self, country_code: [u8; 2]) -> Self {
        self.terminal_country_code = country_code;
        self
    }

    /// Set the floor limit
    pub const fn with_floor_limit(mut self, floor_limit: u32) -> Self {
        self.floor_limit = floor_limit;
        self
    }

    /// Set the terminal application version number
    pub const fn with_application_version(mut self, version: [u8; 2]) -> Self {
        self.application_version = version;
        self
    }

    /// Set the terminal action codes
    pub const fn with_terminal_action_codes(
        mut self,
        default: [u8; 5],
        denial: [u8; 5],
        online: [u8; 5],
    ) -> Self {
        self.tac_default = default;
        self.tac_denial = denial;
        self.tac_online = online;
        self
    }

    /// Set the default DDOL
    pub fn with_default_ddol(mut self, ddol: impl Into<Vec<u8>>) -> Self {
        self.default_ddol = ddol.into();
        self
    }

    /// Set the random transaction selection parameters
    pub const fn with_random_selection(mut self, random_selection: RandomSelection) -> Self {
        self.random_selection = random_selection;
        self
    }

    /// Add a supported application
    pub fn with_supported_aid(mut self, aid: impl Into<Vec<u8>>, partial_match: bool) -> Self {
        self.supported_aids.push(SupportedAid {
            aid: aid.into(),
            partial_match,
        });
        self
    }

    /// Add a Certification Authority public key
    pub fn with_ca_public_key(mut self, key: CaPublicKey) -> Self {
        self.ca_public_keys.push(key);
        self
    }

    /// Add a PAN to the terminal exception file
    pub fn with_exception_file_entry(mut self, pan: impl Into<Vec<u8>>) -> Self {
        self.exception_file.push(pan.into());
        self
    }

    /// Allow extended data authentication
    pub const fn with_xda(mut self, enabled: bool) -> Self {
        self.xda_enabled = enabled;
        self
    }

    /// Check the configuration for values the kernel cannot work with
    pub fn validate(&self) -> Result<(), Error> {
        let random = &self.random_selection;
        if random.target_percentage > 99 || random.max_target_percentage > 99 {
            return Err(Error::InvalidConfig("random selection percentage above 99"));
        }
        if random.target_percentage > random.max_target_percentage {
            return Err(Error::InvalidConfig("random selection target above maximum"));
        }
        if self
            .supported_aids
            .iter()
            .any(|s| !(MIN_DF_NAME_LEN..=MAX_DF_NAME_LEN).contains(&s.aid.len()))
        {
            return Err(Error::InvalidConfig("supported AID length"));
        }
        if self.exception_file.iter().any(|pan| pan.is_empty() || pan.len() > 10) {
            return Err(Error::InvalidConfig("exception file PAN length"));
        }
        Ok(())
    }

    /// Terminal resident data objects as a TLV list
    pub fn config_list(&self) -> Result<TlvList, Error> {
        let mut list = TlvList::new();
        list.push(tags::TERMINAL_TYPE, [self.terminal_type], TlvFlags::NONE)?;
        list.push(tags::TERMINAL_CAPABILITIES, self.terminal_capabilities, TlvFlags::NONE)?;
        list.push(
            tags::ADDITIONAL_TERMINAL_CAPABILITIES,
            self.additional_terminal_capabilities,
            TlvFlags::NONE,
        )?;
        list.push(tags::TERMINAL_COUNTRY_CODE, self.terminal_country_code, TlvFlags::NONE)?;
        list.push(tags::TERMINAL_FLOOR_LIMIT, self.floor_limit.to_be_bytes(), TlvFlags::NONE)?;
        list.push(tags::APPLICATION_VERSION_NUMBER_TERMINAL, self.application_version, TlvFlags::NONE)?;

        use tags::proprietary::*;
        list.push(TAC_DEFAULT, self.tac_default, TlvFlags::NONE)?;
        list.push(TAC_DENIAL, self.tac_denial, TlvFlags::NONE)?;
        list.push(TAC_ONLINE, self.tac_online, TlvFlags::NONE)?;
        list.push(DEFAULT_DDOL, self.default_ddol.clone(), TlvFlags::NONE)?;
        let random = &self.random_selection;
        list.push(
            RANDOM_SELECTION_THRESHOLD,
            random.threshold.to_be_bytes(),
            TlvFlags::NONE,
        )?;
        list.push(
            RANDOM_SELECTION_TARGET_PERCENTAGE,
            [random.target_percentage],
            TlvFlags::NONE,
        )?;
        list.push(
            RANDOM_SELECTION_MAX_TARGET_PERCENTAGE,
            [random.max_target_percentage],
            TlvFlags::NONE,
        )?;
        Ok(list)
    }

    /// Supported applications as a TLV list of terminal AIDs (`9F06`)
    ///
    /// Partially matching entries carry [`TlvFlags::ASI_PARTIAL_MATCH`].
    pub fn supported_aids_list(&self) -> Result<TlvList, Error> {
        let mut list = TlvList::new();
        for supported in &self.supported_aids {
            let flags = if supported.partial_match {
                TlvFlags::ASI_PARTIAL_MATCH
            } else {
                TlvFlags::NONE
            };
            list.push(tags::AID_TERMINAL, supported.aid.clone(), flags)?;
        }
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_default_config_list() {
        let config = KernelConfig::default();
        config.validate().unwrap();
        let list = config.config_list().unwrap();
        assert_eq!(list.value(tags::TERMINAL_TYPE), Some(&[0x22][..]));
        assert_eq!(list.value(tags::TERMINAL_CAPABILITIES), Some(&hex!("E0F8C8")[..]));
        assert_eq!(list.value(tags::TERMINAL_FLOOR_LIMIT), Some(&hex!("00000000")[..]));
        assert_eq!(
            list.value(tags::proprietary::DEFAULT_DDOL),
            Some(&hex!("9F3704")[..])
        );
    }

    #[test]
    fn test_supported_aids_flags() {
        let config = KernelConfig::new()
            .with_supported_aid(hex!("A0000000031010"), false)
            .with_supported_aid(hex!("A000000004"), true);
        let list = config.supported_aids_list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].flags(), TlvFlags::NONE);
        assert!(list[1].flags().contains(TlvFlags::ASI_PARTIAL_MATCH));
    }

    #[test]
    fn test_validate() {
        let config = KernelConfig::new().with_random_selection(RandomSelection {
            threshold: 1000,
            target_percentage: 50,
            max_target_percentage: 20,
        });
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = KernelConfig::new().with_random_selection(RandomSelection {
            threshold: 1000,
            target_percentage: 20,
            max_target_percentage: 100,
        });
        assert!(config.validate().is_err());

        let config = KernelConfig::new().with_supported_aid(hex!("A0000000"), false);
        assert!(config.validate().is_err());

        let config = KernelConfig::new().with_exception_file_entry(vec![0x47; 11]);
        assert!(config.validate().is_err());
    }
}
