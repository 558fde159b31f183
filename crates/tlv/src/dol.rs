//! Data Object List processing
//!
//! A DOL is a concatenation of tag and length pairs without values. The card
//! uses it to ask the terminal for data in a fixed layout, for example the
//! PDOL sent with GET PROCESSING OPTIONS or CDOL1 sent with GENERATE AC.

use tracing::trace;

use crate::ber;
use crate::error::TlvError;
use crate::list::TlvList;
use crate::tags::{self, FieldFormat};

/// Maximum number of bytes produced when building DOL data
///
/// This is the largest command data field of a short APDU.
pub const MAX_DOL_DATA_LEN: usize = 255;

/// A single requested data object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DolEntry {
    /// Requested tag
    pub tag: u32,
    /// Requested length of the value
    pub length: usize,
}

/// Iterate over the entries of a DOL
pub const fn entries(dol: &[u8]) -> DolIter<'_> {
    DolIter { dol, offset: 0 }
}

/// Iterator over the entries of a DOL
///
/// The iterator is fused after the first error.
#[derive(Debug, Clone)]
pub struct DolIter<'a> {
    dol: &'a [u8],
    offset: usize,
}

impl Iterator for DolIter<'_> {
    type Item = Result<DolEntry, TlvError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.dol.len() {
            return None;
        }

        let rest = &self.dol[self.offset..];
        let parsed = ber::decode_tag(rest).and_then(|(tag, tag_len)| {
            let length = *rest.get(tag_len).ok_or(TlvError::Truncated)?;
            Ok((
                DolEntry {
                    tag,
                    length: usize::from(length),
                },
                tag_len + 1,
            ))
        });

        match parsed {
            Ok((entry, consumed)) => {
                self.offset += consumed;
                Some(Ok(entry))
            }
            Err(e) => {
                self.offset = self.dol.len();
                Some(Err(e))
            }
        }
    }
}

/// Total number of data bytes the DOL requests
pub fn data_length(dol: &[u8]) -> Result<usize, TlvError> {
    entries(dol).try_fold(0, |acc, entry| Ok(acc + entry?.length))
}

/// Whether the DOL requests the given tag
pub fn contains(dol: &[u8], tag: u32) -> Result<bool, TlvError> {
    for entry in entries(dol) {
        if entry?.tag == tag {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Build the data for a DOL
///
/// Each requested tag is looked up in `sources` in order and the first match
/// wins. Values are formatted to the requested length following the data
/// format of the tag:
///
/// - numeric (`n`) values are right justified: padded or truncated on the left
/// - compressed numeric (`cn`) values are padded with trailing `FF`
/// - other values are padded with trailing `00` and truncated on the right
///
/// Tags that are not found, and constructed tags, are filled with zeros.
pub fn build(dol: &[u8], sources: &[&TlvList]) -> Result<Vec<u8>, TlvError> {
    let mut data = Vec::new();

    for entry in entries(dol) {
        let entry = entry?;
        if data.len() + entry.length > MAX_DOL_DATA_LEN {
            return Err(TlvError::DolDataTooLong(MAX_DOL_DATA_LEN));
        }

        let value = if ber::tag_is_constructed(entry.tag) {
            None
        } else {
            sources.iter().find_map(|list| list.value(entry.tag))
        };

        match value {
            Some(value) => {
                append_formatted(&mut data, tags::format_of(entry.tag), value, entry.length)
            }
            None => {
                trace!(
                    tag = format_args!("{:02X}", entry.tag),
                    "DOL tag not available, zero filled"
                );
                data.resize(data.len() + entry.length, 0x00);
            }
        }
    }

    Ok(data)
}

fn append_formatted(data: &mut Vec<u8>, format: FieldFormat, value: &[u8], length: usize) {
    match format {
        FieldFormat::Numeric if value.len() >= length => {
            data.extend_from_slice(&value[value.len() - length..]);
        }
        FieldFormat::Numeric => {
            data.resize(data.len() + length - value.len(), 0x00);
            data.extend_from_slice(value);
        }
        FieldFormat::CompressedNumeric | FieldFormat::Binary => {
            let fill = if format == FieldFormat::CompressedNumeric {
                0xFF
            } else {
                0x00
            };
            let take = value.len().min(length);
            data.extend_from_slice(&value[..take]);
            data.resize(data.len() + length - take, fill);
        }
    }
}
