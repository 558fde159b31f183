//! RSA public key recovery
//!
//! EMV signatures use message recovery: the signed block is raised to the
//! public exponent and the plain block is inspected directly, without any
//! PKCS#1 padding.

use rsa::BigUint;

use super::OdaError;

/// An RSA public key in the certificate chain
#[derive(Clone, PartialEq, Eq)]
pub struct RsaKey {
    modulus: BigUint,
    exponent: BigUint,
    len: usize,
}

impl RsaKey {
    /// Create a key from big endian modulus and exponent
    ///
    /// The key length is the length of `modulus` in bytes.
    pub fn new(modulus: &[u8], exponent: &[u8]) -> Result<Self, OdaError> {
        if modulus.is_empty() || exponent.is_empty() || modulus[0] == 0 {
            return Err(OdaError::InvalidKey);
        }
        Ok(Self {
            modulus: BigUint::from_bytes_be(modulus),
            exponent: BigUint::from_bytes_be(exponent),
            len: modulus.len(),
        })
    }

    /// Key length in bytes
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the key has no modulus bytes; never true for a constructed key
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Apply the public key to a signed block of exactly the key length
    pub fn recover(&self, signed: &[u8]) -> Result<Vec<u8>, OdaError> {
        if signed.len() != self.len {
            return Err(OdaError::KeyLengthMismatch {
                expected: self.len,
                actual: signed.len(),
            });
        }
        let block = BigUint::from_bytes_be(signed);
        if block >= self.modulus {
            return Err(OdaError::InvalidFormat("signed block not below modulus"));
        }
        let recovered = block.modpow(&self.exponent, &self.modulus).to_bytes_be();

        // Restore leading zeros dropped by the big integer conversion
        let mut out = vec![0u8; self.len - recovered.len()];
        out.extend_from_slice(&recovered);
        Ok(out)
    }
}

impl std::fmt::Debug for RsaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaKey").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_recover_identity_exponent() {
        let key = RsaKey::new(&[0xFF; 16], &[0x01]).unwrap();
        let block = hex!("6A0102030405060708090A0B0C0D0EBC");
        assert_eq!(key.recover(&block).unwrap(), block);
    }

    #[test]
    fn test_recover_textbook() {
        // n = 3233 (61 * 53), e = 17, d = 2753; 65^d mod n = 588
        let key = RsaKey::new(&hex!("0CA1"), &[17]).unwrap();
        let recovered = key.recover(&588u16.to_be_bytes()).unwrap();
        assert_eq!(recovered, 65u16.to_be_bytes());
    }

    #[test]
    fn test_recover_rejects_bad_input() {
        let key = RsaKey::new(&[0xFF; 16], &[0x03]).unwrap();
        assert_eq!(
            key.recover(&[0x01; 15]),
            Err(OdaError::KeyLengthMismatch {
                expected: 16,
                actual: 15
            })
        );
        assert!(matches!(
            key.recover(&[0xFF; 16]),
            Err(OdaError::InvalidFormat(_))
        ));
        assert_eq!(RsaKey::new(&hex!("00FF"), &[0x03]), Err(OdaError::InvalidKey));
    }
}
