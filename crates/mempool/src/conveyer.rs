use std::collections::VecDeque;
use std::sync::RwLock;

use dashmap::DashMap;

use concord_types::error::MempoolError;
use concord_types::{CharacteristicMask, Hash, Transaction, TransactionsPacket};

/// Past rounds' manifests, retained to answer late sync queries (spec
/// §4.2 "a capacity ring of MetaCapacity past-round manifests").
struct ManifestHistory {
    ring: VecDeque<Vec<Hash>>,
    capacity: usize,
}

impl ManifestHistory {
    fn new(capacity: usize) -> Self {
        ManifestHistory {
            ring: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, manifest: Vec<Hash>) {
        if self.ring.len() == self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(manifest);
    }

    /// `rounds_back == 0` is the manifest that just closed; larger
    /// values walk further into the past.
    fn get(&self, rounds_back: usize) -> Option<&Vec<Hash>> {
        let len = self.ring.len();
        if rounds_back >= len {
            return None;
        }
        self.ring.get(len - 1 - rounds_back)
    }
}

pub struct Conveyer {
    packets: DashMap<Hash, TransactionsPacket>,
    manifest: RwLock<Option<Vec<Hash>>>,
    history: RwLock<ManifestHistory>,
}

impl Conveyer {
    pub fn new(meta_capacity: usize) -> Self {
        Conveyer {
            packets: DashMap::new(),
            manifest: RwLock::new(None),
            history: RwLock::new(ManifestHistory::new(meta_capacity.max(16))),
        }
    }

    /// Inserts a packet. A packet with the zero hash is rejected per
    /// spec §4.2 invariants.
    pub fn add(&self, packet: TransactionsPacket) -> Result<(), MempoolError> {
        if packet.hash == Hash::default() {
            return Err(MempoolError::EmptyHash);
        }
        self.packets.entry(packet.hash).or_insert(packet);
        Ok(())
    }

    pub fn have(&self, hash: &Hash) -> bool {
        self.packets.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<TransactionsPacket> {
        self.packets.get(hash).map(|entry| entry.clone())
    }

    /// Sets this round's manifest. May only be called once per round;
    /// callers must call [`Conveyer::advance_round`] before a
    /// subsequent call.
    pub fn set_manifest(&self, hashes: Vec<Hash>) -> Result<(), MempoolError> {
        let mut manifest = self.manifest.write().unwrap();
        if manifest.is_some() {
            return Err(MempoolError::ManifestAlreadySet);
        }
        *manifest = Some(hashes);
        Ok(())
    }

    pub fn current_manifest(&self) -> Vec<Hash> {
        self.manifest.read().unwrap().clone().unwrap_or_default()
    }

    /// Manifest entries whose packet hasn't arrived yet.
    pub fn missing_from_manifest(&self) -> Vec<Hash> {
        self.current_manifest()
            .into_iter()
            .filter(|hash| !self.have(hash))
            .collect()
    }

    /// Applies a characteristic mask to the manifest's concatenated
    /// transactions, returning the accepted ones in manifest order.
    /// Rejected transactions are dropped from further consideration.
    /// Archives the closing round's manifest and opens a fresh one.
    pub fn flush_accepted(&self, transactions: &[Transaction], mask: &CharacteristicMask) -> Vec<Transaction> {
        let accepted: Vec<Transaction> = transactions
            .iter()
            .zip(mask.reasons.iter())
            .filter(|(_, reason)| reason.is_accepted())
            .map(|(tx, _)| tx.clone())
            .collect();

        self.advance_round();
        accepted
    }

    /// Archives the current manifest (if any) into history and clears
    /// it so the next round may set a fresh one.
    pub fn advance_round(&self) {
        let mut manifest = self.manifest.write().unwrap();
        if let Some(closed) = manifest.take() {
            self.history.write().unwrap().push(closed);
        }
    }

    /// Looks up a past round's manifest for late sync replies.
    pub fn historical_manifest(&self, rounds_back: usize) -> Option<Vec<Hash>> {
        self.history.read().unwrap().get(rounds_back).cloned()
    }
}
