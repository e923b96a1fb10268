//! Neighbour lifecycle (spec §4.1): a three-step registration
//! handshake, periodic liveness, and a strikes-based blacklist.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use concord_types::PublicKey;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NeighbourState {
    Unknown,
    RegistrationRequested,
    Registered,
    Confirmed,
    Silent,
    Dropped,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RefusalReason {
    BadClientVersion,
    IncompatibleBlockchainUuid,
    LimitReached,
}

pub struct Neighbour {
    pub public_key: PublicKey,
    pub addr: SocketAddr,
    pub state: NeighbourState,
    pub strikes: u32,
    pub last_seen: Instant,
}

impl Neighbour {
    fn new(public_key: PublicKey, addr: SocketAddr) -> Self {
        Neighbour {
            public_key,
            addr,
            state: NeighbourState::Unknown,
            strikes: 0,
            last_seen: Instant::now(),
        }
    }
}

const MAX_STRIKES: u32 = 8;

/// The local node's view of every peer it has exchanged packets with.
pub struct NeighbourTable {
    neighbours: DashMap<PublicKey, Neighbour>,
    silence_threshold: Duration,
}

impl NeighbourTable {
    pub fn new(silence_threshold: Duration) -> Self {
        NeighbourTable {
            neighbours: DashMap::new(),
            silence_threshold,
        }
    }

    /// Records an inbound `Registration` and moves the neighbour to
    /// `RegistrationRequested` if it wasn't already known.
    pub fn request_registration(&self, public_key: PublicKey, addr: SocketAddr) {
        self.neighbours.entry(public_key).or_insert_with(|| Neighbour::new(public_key, addr));
        if let Some(mut entry) = self.neighbours.get_mut(&public_key) {
            if entry.state == NeighbourState::Unknown {
                entry.state = NeighbourState::RegistrationRequested;
            }
            entry.last_seen = Instant::now();
        }
    }

    /// Completes the handshake on receipt of `RegistrationConfirmed`.
    pub fn confirm_registration(&self, public_key: &PublicKey) {
        if let Some(mut entry) = self.neighbours.get_mut(public_key) {
            entry.state = NeighbourState::Confirmed;
            entry.last_seen = Instant::now();
        }
    }

    pub fn refuse(&self, public_key: &PublicKey) {
        self.neighbours.remove(public_key);
    }

    /// Admits a `RegistrationRequested` neighbour up to
    /// `max_neighbours`, advancing it to `Registered` — the caller
    /// replies with `RegistrationConfirmed` on `Ok`, and with
    /// `RegistrationRefused` (and tears the entry down via
    /// [`NeighbourTable::refuse`]) on `Err`.
    pub fn accept_registration(&self, public_key: &PublicKey, max_neighbours: usize) -> Result<(), RefusalReason> {
        if !self.neighbours.contains_key(public_key) {
            return Err(RefusalReason::LimitReached);
        }
        if self.neighbours.len() > max_neighbours {
            return Err(RefusalReason::LimitReached);
        }
        let mut entry = self.neighbours.get_mut(public_key).expect("checked contains_key above");
        entry.state = NeighbourState::Registered;
        Ok(())
    }

    pub fn touch(&self, public_key: &PublicKey) {
        if let Some(mut entry) = self.neighbours.get_mut(public_key) {
            entry.last_seen = Instant::now();
            if entry.state == NeighbourState::Silent {
                entry.state = NeighbourState::Confirmed;
            }
        }
    }

    /// Marks neighbours silent beyond the threshold, then dropped
    /// beyond a second threshold past that. Returns the addresses of
    /// neighbours that were just dropped, for the caller to tear down
    /// sockets/state for.
    pub fn sweep_silence(&self) -> Vec<PublicKey> {
        let mut dropped = Vec::new();
        let now = Instant::now();
        for mut entry in self.neighbours.iter_mut() {
            let elapsed = now.duration_since(entry.last_seen);
            match entry.state {
                NeighbourState::Confirmed | NeighbourState::Registered if elapsed > self.silence_threshold => {
                    entry.state = NeighbourState::Silent;
                }
                NeighbourState::Silent if elapsed > self.silence_threshold * 2 => {
                    entry.state = NeighbourState::Dropped;
                    dropped.push(*entry.key());
                }
                _ => {}
            }
        }
        for key in &dropped {
            self.neighbours.remove(key);
        }
        dropped
    }

    /// Records a strike (malformed header, invalid command); returns
    /// `true` once the neighbour crosses the blacklist threshold.
    pub fn strike(&self, public_key: &PublicKey) -> bool {
        if let Some(mut entry) = self.neighbours.get_mut(public_key) {
            entry.strikes += 1;
            if entry.strikes >= MAX_STRIKES {
                entry.state = NeighbourState::Dropped;
                return true;
            }
        }
        false
    }

    pub fn is_blacklisted(&self, public_key: &PublicKey) -> bool {
        self.neighbours
            .get(public_key)
            .map(|n| n.state == NeighbourState::Dropped)
            .unwrap_or(false)
    }

    pub fn state_of(&self, public_key: &PublicKey) -> Option<NeighbourState> {
        self.neighbours.get(public_key).map(|n| n.state)
    }

    pub fn addr_of(&self, public_key: &PublicKey) -> Option<SocketAddr> {
        self.neighbours.get(public_key).map(|n| n.addr)
    }

    pub fn confirmed_addrs(&self) -> Vec<SocketAddr> {
        self.neighbours
            .iter()
            .filter(|n| n.state == NeighbourState::Confirmed)
            .map(|n| n.addr)
            .collect()
    }
}
