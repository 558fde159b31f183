//! Ordered TLV list
//!
//! A [`TlvList`] owns its entries and keeps them in insertion order. Pushing
//! never merges or replaces an existing entry; callers that must reject
//! redundant fields check for duplicates themselves.

use std::fmt;
use std::ops::BitOr;

use bytes::{Bytes, BytesMut};
use derive_more::Deref;
use tracing::trace;

use crate::ber;
use crate::error::TlvError;

/// Auxiliary flags attached to a TLV entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TlvFlags(u8);

impl TlvFlags {
    /// No flags
    pub const NONE: Self = Self(0x00);

    /// Application Selection Indicator: the terminal AID may match a longer card AID
    pub const ASI_PARTIAL_MATCH: Self = Self(0x01);

    /// Create flags from raw bits
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TlvFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A single TLV entry with an owned value
#[derive(Clone, PartialEq, Eq)]
pub struct TlvEntry {
    tag: u32,
    value: Vec<u8>,
    flags: TlvFlags,
}

impl TlvEntry {
    /// Create a new entry
    ///
    /// Tag zero is rejected.
    pub fn new(tag: u32, value: impl Into<Vec<u8>>, flags: TlvFlags) -> Result<Self, TlvError> {
        if tag == 0 {
            return Err(TlvError::InvalidTag);
        }
        Ok(Self {
            tag,
            value: value.into(),
            flags,
        })
    }

    /// Tag of this entry
    pub const fn tag(&self) -> u32 {
        self.tag
    }

    /// Value of this entry
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Mutable access to the value, used for bit registers such as TVR and TSI
    pub fn value_mut(&mut self) -> &mut [u8] {
        &mut self.value
    }

    /// Flags of this entry
    pub const fn flags(&self) -> TlvFlags {
        self.flags
    }

    /// Append the BER encoding of this entry to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        ber::encode(self.tag, &self.value, buf);
    }
}

impl fmt::Debug for TlvEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlvEntry")
            .field("tag", &format_args!("{:02X}", self.tag))
            .field("value", &hex::encode_upper(&self.value))
            .field("flags", &self.flags.bits())
            .finish()
    }
}

/// Ordered list of TLV entries
///
/// Dereferences to the underlying entries for iteration and inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref)]
pub struct TlvList {
    entries: Vec<TlvEntry>,
}

impl TlvList {
    /// Create an empty list
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Decode BER-TLV data into a new list
    pub fn from_ber(data: &[u8]) -> Result<Self, TlvError> {
        let mut list = Self::new();
        list.parse_ber(data)?;
        Ok(list)
    }

    /// Append a new entry at the end of the list
    pub fn push(
        &mut self,
        tag: u32,
        value: impl Into<Vec<u8>>,
        flags: TlvFlags,
    ) -> Result<&mut TlvEntry, TlvError> {
        let entry = TlvEntry::new(tag, value, flags)?;
        Ok(self.push_entry(entry))
    }

    /// Append an existing entry at the end of the list
    pub fn push_entry(&mut self, entry: TlvEntry) -> &mut TlvEntry {
        self.entries.push(entry);
        let last = self.entries.len() - 1;
        &mut self.entries[last]
    }

    /// Find the first entry with the given tag
    pub fn find(&self, tag: u32) -> Option<&TlvEntry> {
        self.entries.iter().find(|entry| entry.tag == tag)
    }

    /// Find the first entry with the given tag for modification
    pub fn find_mut(&mut self, tag: u32) -> Option<&mut TlvEntry> {
        self.entries.iter_mut().find(|entry| entry.tag == tag)
    }

    /// Value of the first entry with the given tag
    pub fn value(&self, tag: u32) -> Option<&[u8]> {
        self.find(tag).map(TlvEntry::value)
    }

    /// Whether an entry with the given tag exists
    pub fn contains(&self, tag: u32) -> bool {
        self.find(tag).is_some()
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Move all entries of `other` to the end of this list, leaving `other` empty
    pub fn append(&mut self, other: &mut Self) {
        self.entries.append(&mut other.entries);
    }

    /// First tag that occurs more than once, if any
    pub fn find_duplicate(&self) -> Option<u32> {
        self.entries.iter().enumerate().find_map(|(i, entry)| {
            self.entries[i + 1..]
                .iter()
                .any(|other| other.tag == entry.tag)
                .then_some(entry.tag)
        })
    }

    /// Decode BER-TLV data and append every primitive object
    ///
    /// Constructed objects are descended into; the templates themselves are
    /// not added. On error the list may already contain the objects decoded
    /// before the malformed one.
    pub fn parse_ber(&mut self, data: &[u8]) -> Result<(), TlvError> {
        for tlv in ber::decode(data) {
            let tlv = tlv?;
            if tlv.is_constructed() {
                self.parse_ber(tlv.value)?;
            } else {
                trace!(
                    tag = format_args!("{:02X}", tlv.tag),
                    value = %hex::encode_upper(tlv.value),
                    "Parsed field"
                );
                self.push(tlv.tag, tlv.value, TlvFlags::NONE)?;
            }
        }
        Ok(())
    }

    /// BER encoding of every entry, in order
    pub fn to_ber(&self) -> Bytes {
        let mut buf = BytesMut::new();
        for entry in &self.entries {
            entry.encode(&mut buf);
        }
        buf.freeze()
    }
}

impl<'a> IntoIterator for &'a TlvList {
    type Item = &'a TlvEntry;
    type IntoIter = std::slice::Iter<'a, TlvEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<TlvEntry> for TlvList {
    fn from_iter<I: IntoIterator<Item = TlvEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
