//! Certification Authority public keys

use crate::error::Error;

/// Length of a Registered Application Provider Identifier
pub const RID_LEN: usize = 5;

/// Largest modulus EMV allows for any key in the chain, in bytes
pub const MAX_MODULUS_LEN: usize = 248;

/// A Certification Authority public key, identified by RID and index
#[derive(Clone, PartialEq, Eq)]
pub struct CaPublicKey {
    rid: [u8; RID_LEN],
    index: u8,
    modulus: Vec<u8>,
    exponent: Vec<u8>,
}

impl CaPublicKey {
    /// Create a key
    ///
    /// The modulus must not exceed 248 bytes and the exponent must be one to
    /// three bytes long.
    pub fn new(
        rid: [u8; RID_LEN],
        index: u8,
        modulus: impl Into<Vec<u8>>,
        exponent: impl Into<Vec<u8>>,
    ) -> Result<Self, Error> {
        let modulus = modulus.into();
        let exponent = exponent.into();
        if modulus.is_empty() || modulus.len() > MAX_MODULUS_LEN {
            return Err(Error::InvalidConfig("CA public key modulus length"));
        }
        if exponent.is_empty() || exponent.len() > 3 {
            return Err(Error::InvalidConfig("CA public key exponent length"));
        }
        Ok(Self {
            rid,
            index,
            modulus,
            exponent,
        })
    }

    /// Registered Application Provider Identifier
    pub const fn rid(&self) -> &[u8; RID_LEN] {
        &self.rid
    }

    /// Certification Authority Public Key Index (`8F`)
    pub const fn index(&self) -> u8 {
        self.index
    }

    /// Modulus, big endian
    pub fn modulus(&self) -> &[u8] {
        &self.modulus
    }

    /// Public exponent, big endian
    pub fn exponent(&self) -> &[u8] {
        &self.exponent
    }

    /// Whether this key belongs to the application `aid` and has `index`
    pub fn matches(&self, aid: &[u8], index: u8) -> bool {
        aid.starts_with(&self.rid) && self.index == index
    }
}

impl std::fmt::Debug for CaPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaPublicKey")
            .field("rid", &hex::encode_upper(self.rid))
            .field("index", &format_args!("{:02X}", self.index))
            .field("modulus_len", &self.modulus.len())
            .finish()
    }
}

/// Find the key for application `aid` and key `index`
pub fn find<'a>(keys: &'a [CaPublicKey], aid: &[u8], index: u8) -> Option<&'a CaPublicKey> {
    keys.iter().find(|key| key.matches(aid, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_key_lookup() {
        let keys = vec![
            CaPublicKey::new(hex!("A000000003"), 0x92, vec![0xFF; 176], [0x03]).unwrap(),
            CaPublicKey::new(hex!("A000000004"), 0x05, vec![0xFF; 128], [0x01, 0x00, 0x01]).unwrap(),
        ];
        let key = find(&keys, &hex!("A0000000031010"), 0x92).unwrap();
        assert_eq!(key.modulus().len(), 176);
        assert!(find(&keys, &hex!("A0000000031010"), 0x05).is_none());
        assert!(find(&keys, &hex!("A0000000041010"), 0x05).is_some());
    }

    #[test]
    fn test_key_validation() {
        assert!(CaPublicKey::new(hex!("A000000003"), 1, vec![0xFF; 249], [0x03]).is_err());
        assert!(CaPublicKey::new(hex!("A000000003"), 1, vec![0xFF; 128], []).is_err());
        assert!(CaPublicKey::new(hex!("A000000003"), 1, vec![0xFF; 128], [1, 0, 1, 0]).is_err());
    }
}
