//! Recovery of EMV certificates and signed data (EMV Book 2)
//!
//! Every recovered block has the same frame: header `6A`, a format byte, the
//! format specific body, a 20 byte SHA-1 hash result and the trailer `BC`.

use nexum_emv_tlv::format::EmvDate;
use sha1::{Digest, Sha1};
use tracing::trace;

use super::OdaError;
use super::rsa::RsaKey;

const HEADER: u8 = 0x6A;
const TRAILER: u8 = 0xBC;
const HASH_LEN: usize = 20;
const SHA1_INDICATOR: u8 = 0x01;
const RSA_INDICATOR: u8 = 0x01;
/// Header, format, algorithm, two data bytes, hash and trailer
const MIN_BLOCK_LEN: usize = 5 + HASH_LEN + 1;

/// Issuer public key certificate format
pub const FORMAT_ISSUER_CERTIFICATE: u8 = 0x02;
/// Signed static application data format
pub const FORMAT_SIGNED_STATIC_DATA: u8 = 0x03;
/// ICC public key certificate format
pub const FORMAT_ICC_CERTIFICATE: u8 = 0x04;
/// Signed dynamic application data format
pub const FORMAT_SIGNED_DYNAMIC_DATA: u8 = 0x05;

/// Public key material as found on the card
#[derive(Debug, Clone, Copy)]
pub struct KeyData<'a> {
    /// Public key certificate
    pub certificate: &'a [u8],
    /// Public key remainder, if the card has one
    pub remainder: Option<&'a [u8]>,
    /// Public key exponent
    pub exponent: &'a [u8],
}

/// Apply `key`, check the frame and format, and verify the hash over the
/// recovered body followed by `extra`
fn recover_block(
    key: &RsaKey,
    signed: &[u8],
    format: u8,
    extra: &[&[u8]],
) -> Result<Vec<u8>, OdaError> {
    let recovered = key.recover(signed)?;
    let len = recovered.len();
    if len < MIN_BLOCK_LEN {
        return Err(OdaError::InvalidFormat("recovered block too short"));
    }
    if recovered[0] != HEADER || recovered[len - 1] != TRAILER {
        return Err(OdaError::InvalidFormat("recovered header or trailer"));
    }
    if recovered[1] != format {
        return Err(OdaError::InvalidFormat("recovered data format"));
    }
    let body_end = len - HASH_LEN - 1;
    let mut hasher = Sha1::new();
    hasher.update(&recovered[1..body_end]);
    for data in extra {
        hasher.update(data);
    }
    if hasher.finalize().as_slice() != &recovered[body_end..len - 1] {
        return Err(OdaError::HashMismatch);
    }
    trace!(format, len, "Recovered signed block");
    Ok(recovered)
}

/// Certificate expiry `MMYY` is valid up to and including the last day of that month
fn check_expiry(mmyy: &[u8], today: EmvDate) -> Result<(), OdaError> {
    let [mm, yy] = <[u8; 2]>::try_from(mmyy).map_err(|_| OdaError::InvalidFormat("expiry"))?;
    let expiry = EmvDate::from_yymmdd(&[yy, mm, 0x01])
        .map_err(|_| OdaError::InvalidFormat("certificate expiry date"))?;
    if (expiry.year(), expiry.month()) < (today.year(), today.month()) {
        return Err(OdaError::CertificateExpired);
    }
    Ok(())
}

/// Combine the key bytes held in the certificate with the remainder
fn assemble_modulus(
    field: &[u8],
    key_len: usize,
    remainder: Option<&[u8]>,
) -> Result<Vec<u8>, OdaError> {
    if key_len <= field.len() {
        if field[key_len..].iter().any(|&b| b != 0xBB) {
            return Err(OdaError::InvalidFormat("public key padding"));
        }
        return Ok(field[..key_len].to_vec());
    }
    let remainder = remainder.ok_or(OdaError::MissingData("public key remainder"))?;
    if field.len() + remainder.len() != key_len {
        return Err(OdaError::InvalidFormat("public key remainder length"));
    }
    let mut modulus = field.to_vec();
    modulus.extend_from_slice(remainder);
    Ok(modulus)
}

/// Issuer identifier: 3 to 8 leftmost PAN digits, padded with `F`
fn issuer_id_matches(issuer_id: &[u8], pan: &[u8]) -> bool {
    let id_digits = nibbles(issuer_id).take_while(|&d| d != 0x0F);
    let mut count = 0;
    let mut pan_digits = nibbles(pan);
    for digit in id_digits {
        if pan_digits.next() != Some(digit) {
            return false;
        }
        count += 1;
    }
    (3..=8).contains(&count) && nibbles(issuer_id).skip(count).all(|d| d == 0x0F)
}

/// Application PAN in the ICC certificate is padded with `F` to ten bytes
fn pan_matches(certificate_pan: &[u8], pan: &[u8]) -> bool {
    let cert_digits: Vec<u8> = nibbles(certificate_pan).take_while(|&d| d != 0x0F).collect();
    let pan_digits: Vec<u8> = nibbles(pan).take_while(|&d| d != 0x0F).collect();
    !cert_digits.is_empty()
        && cert_digits == pan_digits
        && nibbles(certificate_pan).skip(cert_digits.len()).all(|d| d == 0x0F)
}

fn nibbles(data: &[u8]) -> impl Iterator<Item = u8> + '_ {
    data.iter().flat_map(|b| [b >> 4, b & 0x0F])
}

/// Recover the issuer public key with the Certification Authority key
pub fn recover_issuer_key(
    ca_key: &RsaKey,
    data: KeyData<'_>,
    pan: &[u8],
    today: EmvDate,
) -> Result<RsaKey, OdaError> {
    let remainder = data.remainder.unwrap_or_default();
    let recovered = recover_block(
        ca_key,
        data.certificate,
        FORMAT_ISSUER_CERTIFICATE,
        &[remainder, data.exponent],
    )?;
    let len = recovered.len();
    if len < 36 + 1 {
        return Err(OdaError::InvalidFormat("issuer certificate too short"));
    }
    if !issuer_id_matches(&recovered[2..6], pan) {
        return Err(OdaError::InvalidFormat("issuer identifier does not match PAN"));
    }
    check_expiry(&recovered[6..8], today)?;
    if recovered[11] != SHA1_INDICATOR || recovered[12] != RSA_INDICATOR {
        return Err(OdaError::InvalidFormat("issuer certificate algorithm"));
    }
    let key_len = usize::from(recovered[13]);
    if key_len < MIN_BLOCK_LEN {
        return Err(OdaError::InvalidFormat("issuer public key too short"));
    }
    let exponent_len = usize::from(recovered[14]);
    if exponent_len != data.exponent.len() {
        return Err(OdaError::InvalidFormat("issuer public key exponent length"));
    }
    let modulus = assemble_modulus(&recovered[15..len - HASH_LEN - 1], key_len, data.remainder)?;
    RsaKey::new(&modulus, data.exponent)
}

/// Recover the ICC public key with the issuer key
///
/// `static_data` is the static data to be authenticated.
pub fn recover_icc_key(
    issuer_key: &RsaKey,
    data: KeyData<'_>,
    pan: &[u8],
    static_data: &[u8],
    today: EmvDate,
) -> Result<RsaKey, OdaError> {
    let remainder = data.remainder.unwrap_or_default();
    let recovered = recover_block(
        issuer_key,
        data.certificate,
        FORMAT_ICC_CERTIFICATE,
        &[remainder, data.exponent, static_data],
    )?;
    let len = recovered.len();
    if len < 42 + 1 {
        return Err(OdaError::InvalidFormat("ICC certificate too short"));
    }
    if !pan_matches(&recovered[2..12], pan) {
        return Err(OdaError::InvalidFormat("ICC certificate PAN"));
    }
    check_expiry(&recovered[12..14], today)?;
    if recovered[17] != SHA1_INDICATOR || recovered[18] != RSA_INDICATOR {
        return Err(OdaError::InvalidFormat("ICC certificate algorithm"));
    }
    let key_len = usize::from(recovered[19]);
    if key_len < MIN_BLOCK_LEN {
        return Err(OdaError::InvalidFormat("ICC public key too short"));
    }
    if usize::from(recovered[20]) != data.exponent.len() {
        return Err(OdaError::InvalidFormat("ICC public key exponent length"));
    }
    let modulus = assemble_modulus(&recovered[21..len - HASH_LEN - 1], key_len, data.remainder)?;
    RsaKey::new(&modulus, data.exponent)
}

/// Verify Signed Static Application Data and return the Data Authentication Code
pub fn verify_static_data(
    issuer_key: &RsaKey,
    ssad: &[u8],
    static_data: &[u8],
) -> Result<[u8; 2], OdaError> {
    let recovered = recover_block(issuer_key, ssad, FORMAT_SIGNED_STATIC_DATA, &[static_data])?;
    let len = recovered.len();
    if len < MIN_BLOCK_LEN {
        return Err(OdaError::InvalidFormat("signed static data too short"));
    }
    if recovered[2] != SHA1_INDICATOR {
        return Err(OdaError::InvalidFormat("signed static data algorithm"));
    }
    if recovered[5..len - HASH_LEN - 1].iter().any(|&b| b != 0xBB) {
        return Err(OdaError::InvalidFormat("signed static data padding"));
    }
    Ok([recovered[3], recovered[4]])
}

/// Verify Signed Dynamic Application Data and return the ICC Dynamic Data
///
/// `terminal_data` is the DDOL data for DDA or the Unpredictable Number for CDA.
pub fn verify_dynamic_data(
    icc_key: &RsaKey,
    sdad: &[u8],
    terminal_data: &[u8],
) -> Result<Vec<u8>, OdaError> {
    let recovered = recover_block(icc_key, sdad, FORMAT_SIGNED_DYNAMIC_DATA, &[terminal_data])?;
    let len = recovered.len();
    if len < MIN_BLOCK_LEN {
        return Err(OdaError::InvalidFormat("signed dynamic data too short"));
    }
    if recovered[2] != SHA1_INDICATOR {
        return Err(OdaError::InvalidFormat("signed dynamic data algorithm"));
    }
    let dynamic_len = usize::from(recovered[3]);
    let end = 4 + dynamic_len;
    if end > len - HASH_LEN - 1 {
        return Err(OdaError::InvalidFormat("ICC dynamic data length"));
    }
    Ok(recovered[4..end].to_vec())
}

/// ICC Dynamic Number at the start of the ICC Dynamic Data
pub fn icc_dynamic_number(dynamic_data: &[u8]) -> Result<&[u8], OdaError> {
    let (&len, rest) = dynamic_data
        .split_first()
        .ok_or(OdaError::InvalidFormat("ICC dynamic data empty"))?;
    let len = usize::from(len);
    if !(2..=8).contains(&len) || rest.len() < len {
        return Err(OdaError::InvalidFormat("ICC dynamic number length"));
    }
    Ok(&rest[..len])
}

/// ICC Dynamic Data of a CDA signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdaDynamicData {
    /// ICC Dynamic Number
    pub icc_dynamic_number: Vec<u8>,
    /// Cryptogram Information Data
    pub cid: u8,
    /// Application Cryptogram
    pub cryptogram: [u8; 8],
    /// Transaction Data Hash Code
    pub transaction_data_hash: [u8; HASH_LEN],
}

impl CdaDynamicData {
    /// Split CDA ICC Dynamic Data into its fields
    pub fn parse(dynamic_data: &[u8]) -> Result<Self, OdaError> {
        let number = icc_dynamic_number(dynamic_data)?;
        let rest = &dynamic_data[1 + number.len()..];
        if rest.len() < 1 + 8 + HASH_LEN {
            return Err(OdaError::InvalidFormat("CDA dynamic data length"));
        }
        let mut cryptogram = [0u8; 8];
        cryptogram.copy_from_slice(&rest[1..9]);
        let mut transaction_data_hash = [0u8; HASH_LEN];
        transaction_data_hash.copy_from_slice(&rest[9..9 + HASH_LEN]);
        Ok(Self {
            icc_dynamic_number: number.to_vec(),
            cid: rest[0],
            cryptogram,
            transaction_data_hash,
        })
    }
}

/// SHA-1 over the concatenation of `parts`
pub fn sha1(parts: &[&[u8]]) -> [u8; HASH_LEN] {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(&hasher.finalize());
    out
}
