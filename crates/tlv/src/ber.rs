//! ISO/IEC 8825-1 BER-TLV decoding and encoding
//!
//! Only the definite length form is accepted. Tags are limited to four bytes and
//! lengths to four subsequent length bytes, which covers every data object EMV
//! defines. `00` bytes between objects are padding and are skipped.

use bytes::{BufMut, BytesMut};

use crate::error::TlvError;

/// Maximum number of bytes in an encoded tag
pub const MAX_TAG_LEN: usize = 4;

/// Maximum number of subsequent bytes in a long form length field
pub const MAX_LENGTH_BYTES: usize = 4;

/// A single decoded BER-TLV object borrowing from the input buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BerTlv<'a> {
    /// Tag including class and constructed bits
    pub tag: u32,
    /// Value field
    pub value: &'a [u8],
    /// Complete encoding of this object (tag, length and value)
    pub raw: &'a [u8],
}

impl BerTlv<'_> {
    /// Whether the value field contains further BER-TLV objects
    pub const fn is_constructed(&self) -> bool {
        tag_is_constructed(self.tag)
    }
}

/// Whether a tag has the constructed bit (b6 of the first byte) set
pub const fn tag_is_constructed(tag: u32) -> bool {
    let (bytes, len) = tag_bytes(tag);
    bytes[4 - len] & 0x20 != 0
}

/// Number of bytes the tag occupies when encoded
pub const fn tag_len(tag: u32) -> usize {
    tag_bytes(tag).1
}

/// Big endian tag bytes, right aligned, together with the significant length
const fn tag_bytes(tag: u32) -> ([u8; 4], usize) {
    let bytes = tag.to_be_bytes();
    let len = if tag > 0x00FF_FFFF {
        4
    } else if tag > 0xFFFF {
        3
    } else if tag > 0xFF {
        2
    } else {
        1
    };
    (bytes, len)
}

/// Decode a tag from the start of `data`
///
/// Returns the tag and the number of bytes it occupies.
pub fn decode_tag(data: &[u8]) -> Result<(u32, usize), TlvError> {
    let first = *data.first().ok_or(TlvError::Truncated)?;
    if first == 0x00 {
        return Err(TlvError::InvalidTag);
    }

    let mut tag = u32::from(first);
    let mut len = 1;

    if first & 0x1F == 0x1F {
        // Subsequent bytes follow while b8 is set
        loop {
            let byte = *data.get(len).ok_or(TlvError::Truncated)?;
            tag = (tag << 8) | u32::from(byte);
            len += 1;
            if byte & 0x80 == 0 {
                break;
            }
            if len == MAX_TAG_LEN {
                return Err(TlvError::TagTooLong);
            }
        }
    }

    Ok((tag, len))
}

/// Decode a definite length field from the start of `data`
///
/// Returns the length value and the number of bytes the length field occupies.
pub fn decode_length(data: &[u8]) -> Result<(usize, usize), TlvError> {
    let first = *data.first().ok_or(TlvError::Truncated)?;
    if first & 0x80 == 0 {
        return Ok((usize::from(first), 1));
    }

    let count = usize::from(first & 0x7F);
    if count == 0 {
        return Err(TlvError::IndefiniteLength);
    }
    if count > MAX_LENGTH_BYTES {
        return Err(TlvError::LengthTooLong);
    }

    let bytes = data.get(1..=count).ok_or(TlvError::Truncated)?;
    let length = bytes
        .iter()
        .fold(0usize, |acc, byte| (acc << 8) | usize::from(*byte));

    Ok((length, 1 + count))
}

/// Decode exactly one BER-TLV object from the start of `data`
///
/// Returns the object and whatever follows it.
pub fn decode_one(data: &[u8]) -> Result<(BerTlv<'_>, &[u8]), TlvError> {
    let (tag, tag_len) = decode_tag(data)?;
    let (length, length_len) = decode_length(&data[tag_len..])?;

    let header_len = tag_len + length_len;
    let end = header_len
        .checked_add(length)
        .filter(|end| *end <= data.len())
        .ok_or(TlvError::Truncated)?;

    let tlv = BerTlv {
        tag,
        value: &data[header_len..end],
        raw: &data[..end],
    };
    Ok((tlv, &data[end..]))
}

/// Decode a single outer template that must span the whole buffer
///
/// Any byte after the template is rejected, including padding.
pub fn decode_exact(data: &[u8]) -> Result<BerTlv<'_>, TlvError> {
    let (tlv, rest) = decode_one(data)?;
    if !rest.is_empty() {
        return Err(TlvError::TrailingData(rest.len()));
    }
    Ok(tlv)
}

/// Iterate over consecutive BER-TLV objects in `data`
pub const fn decode(data: &[u8]) -> BerIter<'_> {
    BerIter { data, offset: 0 }
}

/// Iterator over consecutive BER-TLV objects
///
/// The iterator is fused after the first error.
#[derive(Debug, Clone)]
pub struct BerIter<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for BerIter<'a> {
    type Item = Result<BerTlv<'a>, TlvError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.data.get(self.offset) == Some(&0x00) {
            self.offset += 1;
        }
        if self.offset >= self.data.len() {
            return None;
        }

        match decode_one(&self.data[self.offset..]) {
            Ok((tlv, _)) => {
                self.offset += tlv.raw.len();
                Some(Ok(tlv))
            }
            Err(e) => {
                self.offset = self.data.len();
                Some(Err(e))
            }
        }
    }
}

/// Append the encoded tag to `buf`
pub fn encode_tag(tag: u32, buf: &mut BytesMut) {
    let (bytes, len) = tag_bytes(tag);
    buf.put_slice(&bytes[4 - len..]);
}

/// Append the encoded definite length to `buf`
pub fn encode_length(length: usize, buf: &mut BytesMut) {
    if length < 0x80 {
        buf.put_u8(length as u8);
        return;
    }

    let bytes = (length as u32).to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    buf.put_u8(0x80 | (4 - skip) as u8);
    buf.put_slice(&bytes[skip..]);
}

/// Append a complete BER-TLV object to `buf`
pub fn encode(tag: u32, value: &[u8], buf: &mut BytesMut) {
    encode_tag(tag, buf);
    encode_length(value.len(), buf);
    buf.put_slice(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_decode_tag() {
        assert_eq!(decode_tag(&hex!("5A")).unwrap(), (0x5A, 1));
        assert_eq!(decode_tag(&hex!("9F38")).unwrap(), (0x9F38, 2));
        assert_eq!(decode_tag(&hex!("DF8101")).unwrap(), (0xDF8101, 3));
        assert_eq!(decode_tag(&hex!("DF818101")).unwrap(), (0xDF81_8101, 4));
        assert_eq!(decode_tag(&hex!("DF81818101")), Err(TlvError::TagTooLong));
        assert_eq!(decode_tag(&hex!("9F")), Err(TlvError::Truncated));
        assert_eq!(decode_tag(&hex!("00")), Err(TlvError::InvalidTag));
    }

    #[test]
    fn test_decode_length() {
        assert_eq!(decode_length(&hex!("7F")).unwrap(), (0x7F, 1));
        assert_eq!(decode_length(&hex!("8180")).unwrap(), (0x80, 2));
        assert_eq!(decode_length(&hex!("820100")).unwrap(), (0x100, 3));
        assert_eq!(decode_length(&hex!("80")), Err(TlvError::IndefiniteLength));
        assert_eq!(
            decode_length(&hex!("850000000001")),
            Err(TlvError::LengthTooLong)
        );
        assert_eq!(decode_length(&hex!("82 01")), Err(TlvError::Truncated));
    }

    #[test]
    fn test_decode_constructed() {
        let data = hex!("77 0A 82 02 7800 94 04 08020200");
        let tlv = decode_exact(&data).unwrap();
        assert_eq!(tlv.tag, 0x77);
        assert!(tlv.is_constructed());

        let inner: Vec<_> = decode(tlv.value).collect::<Result<_, _>>().unwrap();
        assert_eq!(inner.len(), 2);
        assert_eq!(inner[0].tag, 0x82);
        assert_eq!(inner[0].value, &hex!("7800"));
        assert_eq!(inner[1].tag, 0x94);
        assert_eq!(inner[1].raw, &hex!("94 04 08020200"));
    }

    #[test]
    fn test_decode_skips_padding() {
        let data = hex!("00 00 5A 02 1234 00 5F34 01 01 00");
        let tags: Vec<u32> = decode(&data).map(|t| t.unwrap().tag).collect();
        assert_eq!(tags, vec![0x5A, 0x5F34]);
    }

    #[test]
    fn test_decode_exact_rejects_trailing_bytes() {
        let data = hex!("70 03 5A 01 12 FF");
        assert_eq!(decode_exact(&data), Err(TlvError::TrailingData(1)));
    }

    #[test]
    fn test_iterator_fuses_on_error() {
        let data = hex!("5A 05 1234");
        let mut iter = decode(&data);
        assert_eq!(iter.next(), Some(Err(TlvError::Truncated)));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_encode() {
        let mut buf = BytesMut::new();
        encode(0x9F02, &hex!("000000001000"), &mut buf);
        assert_eq!(buf.as_ref(), hex!("9F02 06 000000001000"));

        let mut buf = BytesMut::new();
        encode_length(0x80, &mut buf);
        encode_length(0x1234, &mut buf);
        assert_eq!(buf.as_ref(), hex!("8180 821234"));
    }

    #[test]
    fn test_tag_properties() {
        assert!(tag_is_constructed(0x70));
        assert!(tag_is_constructed(0xBF0C));
        assert!(!tag_is_constructed(0x9F38));
        assert_eq!(tag_len(0x5A), 1);
        assert_eq!(tag_len(0xDF8101), 3);
    }
}
