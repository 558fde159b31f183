//! Candidate applications
//!
//! Candidates are built from PSE directory entries or from the FCI returned
//! when probing the terminal's supported AIDs, and kept ordered by their
//! Application Priority Indicator.

use derive_more::Deref;
use nexum_emv_tlv::{TlvList, tags};

use crate::error::Error;
use crate::fields::{PriorityIndicator, additional_capabilities};

/// An application mutually supported by the card and the terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    aid: Vec<u8>,
    priority: PriorityIndicator,
    display_name: String,
    data: TlvList,
}

impl Candidate {
    /// Build a candidate from a directory entry or FCI
    ///
    /// The AID is taken from the ADF name (`4F`) or, failing that, the DF name
    /// (`84`). `additional_capabilities` decides whether the Application
    /// Preferred Name may be shown.
    pub fn from_tlv(data: TlvList, additional_capabilities: &[u8]) -> Result<Self, Error> {
        let aid = data
            .value(tags::AID)
            .or_else(|| data.value(tags::DF_NAME))
            .ok_or(Error::Parse("candidate without AID"))?
            .to_vec();
        let priority = data
            .value(tags::APPLICATION_PRIORITY_INDICATOR)
            .and_then(|v| v.first().copied())
            .map(PriorityIndicator)
            .unwrap_or_default();
        let display_name = display_name(&aid, &data, additional_capabilities);
        Ok(Self {
            aid,
            priority,
            display_name,
            data,
        })
    }

    /// Application identifier
    pub fn aid(&self) -> &[u8] {
        &self.aid
    }

    /// Application Priority Indicator
    pub const fn priority(&self) -> PriorityIndicator {
        self.priority
    }

    /// Name to show the cardholder
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Directory entry or FCI data the candidate was built from
    pub const fn data(&self) -> &TlvList {
        &self.data
    }
}

/// Application Preferred Name when its code table is supported, then the
/// Application Label, then the AID in hex
fn display_name(aid: &[u8], data: &TlvList, additional_capabilities: &[u8]) -> String {
    let code_table_supported = data
        .value(tags::ISSUER_CODE_TABLE_INDEX)
        .and_then(|v| v.first().copied())
        .and_then(additional_capabilities::code_table)
        .is_some_and(|bit| bit.is_set(additional_capabilities));

    let preferred = data
        .value(tags::APPLICATION_PREFERRED_NAME)
        .filter(|_| code_table_supported);

    match preferred.or_else(|| data.value(tags::APPLICATION_LABEL)) {
        // ISO/IEC 8859 code points below 0x100 map to the same Unicode scalars
        Some(name) if !name.is_empty() => name.iter().map(|&b| char::from(b)).collect(),
        _ => hex::encode_upper(aid),
    }
}

/// Candidate applications ordered by priority
///
/// Applications without a priority sort after every prioritised one; ties
/// keep discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref)]
pub struct CandidateList {
    candidates: Vec<Candidate>,
}

impl CandidateList {
    /// Create an empty list
    pub const fn new() -> Self {
        Self {
            candidates: Vec::new(),
        }
    }

    /// Add a candidate, keeping the list ordered
    pub fn insert(&mut self, candidate: Candidate) {
        let key = sort_key(&candidate);
        let position = self.candidates.partition_point(|c| sort_key(c) <= key);
        self.candidates.insert(position, candidate);
    }

    /// Remove and return the candidate at `index`
    pub fn remove(&mut self, index: usize) -> Result<Candidate, Error> {
        if index >= self.candidates.len() {
            return Err(Error::InvalidParameter);
        }
        Ok(self.candidates.remove(index))
    }

    /// Whether the cardholder has to choose or confirm an application
    pub fn selection_required(&self) -> bool {
        self.candidates.len() > 1
            || self
                .candidates
                .iter()
                .any(|c| c.priority.confirmation_required())
    }

    /// Drop every candidate
    pub fn clear(&mut self) {
        self.candidates.clear();
    }
}

fn sort_key(candidate: &Candidate) -> u8 {
    candidate.priority.priority().unwrap_or(u8::MAX)
}

impl FromIterator<Candidate> for CandidateList {
    fn from_iter<I: IntoIterator<Item = Candidate>>(iter: I) -> Self {
        let mut list = Self::new();
        for candidate in iter {
            list.insert(candidate);
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use nexum_emv_tlv::TlvFlags;

    fn candidate(aid: &[u8], priority: Option<u8>) -> Candidate {
        let mut data = TlvList::new();
        data.push(tags::AID, aid, TlvFlags::NONE).unwrap();
        if let Some(priority) = priority {
            data.push(tags::APPLICATION_PRIORITY_INDICATOR, [priority], TlvFlags::NONE)
                .unwrap();
        }
        Candidate::from_tlv(data, &[0; 5]).unwrap()
    }

    #[test]
    fn test_sorted_by_priority() {
        let list: CandidateList = [
            candidate(&hex!("A000000001"), Some(3)),
            candidate(&hex!("A000000002"), Some(1)),
            candidate(&hex!("A000000003"), Some(4)),
            candidate(&hex!("A000000004"), Some(2)),
        ]
        .into_iter()
        .collect();
        let order: Vec<_> = list.iter().map(|c| c.aid()[4]).collect();
        assert_eq!(order, vec![2, 4, 1, 3]);
    }

    #[test]
    fn test_ties_keep_discovery_order() {
        let list: CandidateList = [
            candidate(&hex!("A000000001"), None),
            candidate(&hex!("A000000002"), Some(0x02)),
            candidate(&hex!("A000000003"), Some(0x82)),
            candidate(&hex!("A000000004"), Some(0x01)),
            candidate(&hex!("A000000005"), None),
        ]
        .into_iter()
        .collect();
        let order: Vec<_> = list.iter().map(|c| c.aid()[4]).collect();
        assert_eq!(order, vec![4, 2, 3, 1, 5]);
    }

    #[test]
    fn test_remove() {
        let mut list: CandidateList = [
            candidate(&hex!("A000000001"), Some(1)),
            candidate(&hex!("A000000002"), Some(2)),
        ]
        .into_iter()
        .collect();
        assert!(list.selection_required());
        assert!(matches!(list.remove(2), Err(Error::InvalidParameter)));
        assert_eq!(list.len(), 2);
        assert_eq!(list.remove(0).unwrap().aid(), hex!("A000000001"));
        assert_eq!(list.len(), 1);
        assert!(!list.selection_required());
    }

    #[test]
    fn test_confirmation_required() {
        let list: CandidateList = [candidate(&hex!("A000000001"), Some(0x81))]
            .into_iter()
            .collect();
        assert!(list.selection_required());
    }

    #[test]
    fn test_display_name() {
        let mut data = TlvList::new();
        data.push(tags::AID, hex!("A0000000031010"), TlvFlags::NONE).unwrap();
        assert_eq!(
            Candidate::from_tlv(data.clone(), &[0; 5]).unwrap().display_name(),
            "A0000000031010"
        );

        data.push(tags::APPLICATION_LABEL, *b"VISA CREDIT", TlvFlags::NONE).unwrap();
        data.push(tags::ISSUER_CODE_TABLE_INDEX, [0x01], TlvFlags::NONE).unwrap();
        data.push(tags::APPLICATION_PREFERRED_NAME, *b"Cr\xE9dit", TlvFlags::NONE).unwrap();

        // Code table 1 not supported
        let name = Candidate::from_tlv(data.clone(), &hex!("6000F0A000")).unwrap();
        assert_eq!(name.display_name(), "VISA CREDIT");

        let name = Candidate::from_tlv(data, &hex!("6000F0A001")).unwrap();
        assert_eq!(name.display_name(), "Crédit");
    }
}
