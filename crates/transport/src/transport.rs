//! The send/receive surface (spec §4.1): direct, confidants and
//! broadcast delivery over UDP, with fragmentation and reassembly
//! applied transparently.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use concord_types::error::TransportError;
use concord_types::{Hash, PublicKey, Round};

use crate::framing::{decode_fragment, fragment_message, MessageKind};
use crate::neighbour::NeighbourTable;
use crate::reassembly::MessageAssembler;

/// A fully reassembled, not-yet-dispatched inbound message.
#[derive(Debug)]
pub struct InboundMessage {
    pub round: Round,
    pub kind: MessageKind,
    pub header_hash: Hash,
    pub payload: Vec<u8>,
    pub from: SocketAddr,
}

pub struct Transport {
    socket: UdpSocket,
    neighbours: Arc<NeighbourTable>,
    assembler: Arc<MessageAssembler>,
    /// Who last `PackInform`-ed us about a message hash — the
    /// next-requestee for that hash's missing fragments (spec §4.1
    /// "Redirect protocol").
    advertisers: DashMap<Hash, SocketAddr>,
}

impl Transport {
    pub async fn bind(addr: SocketAddr, silence_threshold: Duration) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Transport {
            socket,
            neighbours: Arc::new(NeighbourTable::new(silence_threshold)),
            assembler: Arc::new(MessageAssembler::new()),
            advertisers: DashMap::new(),
        })
    }

    pub fn neighbours(&self) -> &NeighbourTable {
        &self.neighbours
    }

    async fn send_datagram(&self, addr: SocketAddr, datagram: &[u8]) -> Result<(), TransportError> {
        match self.socket.send_to(datagram, addr).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(TransportError::WouldBlock),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    async fn send_fragments(&self, addr: SocketAddr, round: Round, kind: MessageKind, payload: &[u8]) -> Result<(), TransportError> {
        for datagram in fragment_message(round, kind, payload)? {
            if let Err(e) = self.send_datagram(addr, &datagram).await {
                warn!(target: "transport", %addr, error = %e, "send failed, dropping fragment");
            }
        }
        Ok(())
    }

    /// One neighbour, by public key.
    pub async fn send_direct(&self, to: &PublicKey, round: Round, kind: MessageKind, payload: &[u8]) -> Result<(), TransportError> {
        if self.neighbours.is_blacklisted(to) {
            return Err(TransportError::PeerBlacklisted(format!("{:?}", to)));
        }
        let addr = self
            .neighbours
            .addr_of(to)
            .ok_or_else(|| TransportError::UnknownPeer(format!("{:?}", to)))?;
        self.send_fragments(addr, round, kind, payload).await
    }

    /// The current round's trusted committee.
    pub async fn send_confidants(&self, confidants: &[PublicKey], round: Round, kind: MessageKind, payload: &[u8]) -> Result<(), TransportError> {
        for confidant in confidants {
            if let Err(e) = self.send_direct(confidant, round, kind, payload).await {
                debug!(target: "transport", peer = ?confidant, error = %e, "confidant send failed");
            }
        }
        Ok(())
    }

    /// Every confirmed neighbour.
    pub async fn broadcast(&self, round: Round, kind: MessageKind, payload: &[u8]) -> Result<(), TransportError> {
        for addr in self.neighbours.confirmed_addrs() {
            if let Err(e) = self.send_fragments(addr, round, kind, payload).await {
                debug!(target: "transport", %addr, error = %e, "broadcast fragment send failed");
            }
        }
        Ok(())
    }

    /// Sends a `PackInform` carrying only the hash, per the redirect
    /// protocol: any peer receiving a non-direct packet advertises it
    /// so others can source missing fragments from it.
    pub async fn inform(&self, header_hash: Hash, round: Round) -> Result<(), TransportError> {
        self.broadcast(round, MessageKind::PackInform, &header_hash.0).await
    }

    /// Requests missing fragments of `header_hash` from whichever
    /// peer last advertised it, falling back to broadcast if unknown.
    pub async fn request_missing(&self, header_hash: Hash, round: Round, start: u16) -> Result<(), TransportError> {
        let bitmask = self.assembler.missing_bitmask(&header_hash, start);
        if bitmask == 0 {
            return Ok(());
        }
        let mut body = Vec::with_capacity(32 + 2 + 8);
        body.extend_from_slice(&header_hash.0);
        body.extend_from_slice(&start.to_le_bytes());
        body.extend_from_slice(&bitmask.to_le_bytes());

        match self.advertisers.get(&header_hash).map(|e| *e) {
            Some(addr) => self.send_fragments(addr, round, MessageKind::PackRequest, &body).await,
            None => self.broadcast(round, MessageKind::PackRequest, &body).await,
        }
    }

    /// Receives and reassembles the next message, applying duplicate
    /// suppression and error-counter/blacklist bookkeeping. Returns
    /// `Ok(None)` while a message is still incomplete.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<Option<InboundMessage>, TransportError> {
        let (len, from) = match self.socket.recv_from(buf).await {
            Ok(pair) => pair,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Err(TransportError::WouldBlock),
            Err(e) => return Err(TransportError::Io(e)),
        };

        let (header, fragment_payload) = match decode_fragment(&buf[..len]) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(target: "transport", %from, error = %e, "dropping malformed fragment");
                return Err(e);
            }
        };

        if header.kind == MessageKind::PackInform {
            self.advertisers.insert(header.header_hash, from);
        }

        match self.assembler.insert(&header, fragment_payload)? {
            Some(payload) => Ok(Some(InboundMessage {
                round: header.round,
                kind: header.kind,
                header_hash: header.header_hash,
                payload,
                from,
            })),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn bound(port: u16) -> Transport {
        Transport::bind(format!("127.0.0.1:{port}").parse().unwrap(), Duration::from_secs(30))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn direct_send_to_unknown_peer_is_rejected() {
        let transport = bound(38001).await;
        let result = transport.send_direct(&PublicKey([1u8; 32]), Round(1), MessageKind::Ping, b"hi").await;
        assert!(matches!(result, Err(TransportError::UnknownPeer(_))));
    }

    #[tokio::test]
    async fn roundtrips_a_single_fragment_message_between_two_sockets() {
        let receiver = bound(38002).await;
        let sender_addr: SocketAddr = "127.0.0.1:38003".parse().unwrap();
        let sender = UdpSocket::bind(sender_addr).await.unwrap();

        let receiver_addr = receiver.socket.local_addr().unwrap();
        let datagrams = fragment_message(Round(3), MessageKind::Ping, b"ping-body").unwrap();
        sender.send_to(&datagrams[0], receiver_addr).await.unwrap();

        let mut buf = vec![0u8; 2048];
        let message = receiver.recv(&mut buf).await.unwrap().expect("single fragment completes immediately");
        assert_eq!(message.kind, MessageKind::Ping);
        assert_eq!(message.payload, b"ping-body");
        assert_eq!(message.from.port(), sender_addr.port());
    }
}
