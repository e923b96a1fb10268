//! Fragment reassembly and duplicate suppression by payload hash
//! (spec §4.1 "Fragment reassembly").

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use dashmap::DashMap;

use concord_types::error::TransportError;
use concord_types::Hash;

use crate::framing::FragmentHeader;

struct PartialMessage {
    fragments: Vec<Option<Vec<u8>>>,
    received: u16,
}

impl PartialMessage {
    fn new(fragment_count: u16) -> Self {
        PartialMessage {
            fragments: vec![None; fragment_count as usize],
            received: 0,
        }
    }
}

/// A capped ring of recently delivered message hashes, so a resend of
/// an already-reassembled message is dropped rather than redelivered.
struct SeenRing {
    seen: HashSet<Hash>,
    order: VecDeque<Hash>,
    capacity: usize,
}

impl SeenRing {
    fn new(capacity: usize) -> Self {
        SeenRing {
            seen: HashSet::new(),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn contains(&self, hash: &Hash) -> bool {
        self.seen.contains(hash)
    }

    fn insert(&mut self, hash: Hash) {
        if self.seen.insert(hash) {
            if self.order.len() == self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.seen.remove(&oldest);
                }
            }
            self.order.push_back(hash);
        }
    }
}

pub struct MessageAssembler {
    partial: DashMap<Hash, PartialMessage>,
    delivered: Mutex<SeenRing>,
}

impl MessageAssembler {
    pub fn new() -> Self {
        MessageAssembler {
            partial: DashMap::new(),
            delivered: Mutex::new(SeenRing::new(4096)),
        }
    }

    /// Deposits one fragment. Returns the reassembled payload once
    /// every fragment for `header.header_hash` has arrived; `Ok(None)`
    /// both while still incomplete and when the message was already
    /// fully delivered (a resent fragment of a done message).
    pub fn insert(&self, header: &FragmentHeader, payload: &[u8]) -> Result<Option<Vec<u8>>, TransportError> {
        if self.delivered.lock().unwrap().contains(&header.header_hash) {
            return Ok(None);
        }

        let mut entry = self
            .partial
            .entry(header.header_hash)
            .or_insert_with(|| PartialMessage::new(header.fragment_count));

        if entry.fragments.len() != header.fragment_count as usize {
            return Err(TransportError::MalformedHeader);
        }

        let slot = &mut entry.fragments[header.fragment_index as usize];
        if slot.is_none() {
            *slot = Some(payload.to_vec());
            entry.received += 1;
        }

        if entry.received < header.fragment_count {
            return Ok(None);
        }

        drop(entry);
        let (_, complete) = self.partial.remove(&header.header_hash).expect("just inserted");
        let mut full = Vec::new();
        for fragment in complete.fragments {
            full.extend(fragment.expect("all fragments present once received == fragment_count"));
        }
        self.delivered.lock().unwrap().insert(header.header_hash);
        Ok(Some(full))
    }

    /// Bitmask of up to 64 fragments, starting at `start`, still
    /// missing for an in-flight message — the payload of a
    /// `PackRequest` (spec §4.1).
    pub fn missing_bitmask(&self, header_hash: &Hash, start: u16) -> u64 {
        let Some(entry) = self.partial.get(header_hash) else {
            return 0;
        };
        let mut mask = 0u64;
        for bit in 0..64u16 {
            let idx = start as usize + bit as usize;
            if idx >= entry.fragments.len() {
                break;
            }
            if entry.fragments[idx].is_none() {
                mask |= 1 << bit;
            }
        }
        mask
    }
}

impl Default for MessageAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{fragment_message, MessageKind};
    use concord_types::Round;

    #[test]
    fn reassembles_once_all_fragments_arrive() {
        let payload = vec![0x7u8; crate::framing::MAX_FRAGMENT_PAYLOAD * 2 + 1];
        let datagrams = fragment_message(Round(1), MessageKind::TransactionsPacket, &payload).unwrap();
        let assembler = MessageAssembler::new();

        let mut result = None;
        for datagram in &datagrams {
            let (header, body) = crate::framing::decode_fragment(datagram).unwrap();
            result = assembler.insert(&header, body).unwrap();
        }
        assert_eq!(result, Some(payload));
    }

    #[test]
    fn resent_fragment_of_a_delivered_message_is_dropped_silently() {
        let payload = b"short".to_vec();
        let datagrams = fragment_message(Round(1), MessageKind::Ping, &payload).unwrap();
        let assembler = MessageAssembler::new();
        let (header, body) = crate::framing::decode_fragment(&datagrams[0]).unwrap();

        assert_eq!(assembler.insert(&header, body).unwrap(), Some(payload));
        assert_eq!(assembler.insert(&header, body).unwrap(), None);
    }

    #[test]
    fn missing_bitmask_reports_unreceived_fragments() {
        let payload = vec![0x9u8; crate::framing::MAX_FRAGMENT_PAYLOAD * 3 + 1];
        let datagrams = fragment_message(Round(1), MessageKind::TransactionsPacket, &payload).unwrap();
        let assembler = MessageAssembler::new();

        let (header0, body0) = crate::framing::decode_fragment(&datagrams[0]).unwrap();
        assembler.insert(&header0, body0).unwrap();
        let (header2, body2) = crate::framing::decode_fragment(&datagrams[2]).unwrap();
        assembler.insert(&header2, body2).unwrap();

        // fragments 1 and 3 are still missing.
        let mask = assembler.missing_bitmask(&header0.header_hash, 0);
        assert_eq!(mask, 0b1010);
    }
}
