//! Wire framing (spec §4.1, §6): a fixed header in front of every
//! fragment, little-endian throughout like the rest of the wire
//! formats in this node.

use concord_crypto::hash::blake2b_256;
use concord_types::error::TransportError;
use concord_types::{Hash, Round};

pub const HEADER_LEN: usize = 1 + 8 + 1 + 32 + 2 + 2;
pub const MAX_FRAGMENT_PAYLOAD: usize = 1200;
pub const MAX_FRAGMENTS: u16 = 4096;
const WIRE_VERSION: u8 = 1;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum MessageKind {
    Registration = 1,
    RegistrationConfirmed = 2,
    RegistrationRefused = 3,
    Ping = 4,
    Stage1 = 10,
    Stage2 = 11,
    Stage3 = 12,
    StageRequest = 13,
    RoundTable = 14,
    TransactionsPacket = 15,
    PackInform = 20,
    PackRequest = 21,
    BlockRequest = 22,
    RequestedBlock = 23,
    NewCharacteristic = 24,
    BigBang = 25,
    NextRoundRequest = 26,
}

impl TryFrom<u8> for MessageKind {
    type Error = TransportError;

    fn try_from(byte: u8) -> Result<Self, TransportError> {
        use MessageKind::*;
        Ok(match byte {
            1 => Registration,
            2 => RegistrationConfirmed,
            3 => RegistrationRefused,
            4 => Ping,
            10 => Stage1,
            11 => Stage2,
            12 => Stage3,
            13 => StageRequest,
            14 => RoundTable,
            15 => TransactionsPacket,
            20 => PackInform,
            21 => PackRequest,
            22 => BlockRequest,
            23 => RequestedBlock,
            24 => NewCharacteristic,
            25 => BigBang,
            26 => NextRoundRequest,
            other => return Err(TransportError::UnknownCommand(other)),
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FragmentHeader {
    pub round: Round,
    pub kind: MessageKind,
    pub header_hash: Hash,
    pub fragment_index: u16,
    pub fragment_count: u16,
}

fn encode_header(header: &FragmentHeader, out: &mut Vec<u8>) {
    out.push(WIRE_VERSION);
    out.extend_from_slice(&header.round.0.to_le_bytes());
    out.push(header.kind as u8);
    out.extend_from_slice(&header.header_hash.0);
    out.extend_from_slice(&header.fragment_index.to_le_bytes());
    out.extend_from_slice(&header.fragment_count.to_le_bytes());
}

/// Splits `payload` into `HEADER_LEN`-prefixed fragments, each no
/// larger than [`MAX_FRAGMENT_PAYLOAD`] bytes of payload.
pub fn fragment_message(round: Round, kind: MessageKind, payload: &[u8]) -> Result<Vec<Vec<u8>>, TransportError> {
    let header_hash = blake2b_256(payload);
    let chunks: Vec<&[u8]> = if payload.is_empty() {
        vec![&[]]
    } else {
        payload.chunks(MAX_FRAGMENT_PAYLOAD).collect()
    };
    if chunks.len() > MAX_FRAGMENTS as usize {
        return Err(TransportError::PayloadTooLarge);
    }

    let fragment_count = chunks.len() as u16;
    let mut datagrams = Vec::with_capacity(chunks.len());
    for (index, chunk) in chunks.into_iter().enumerate() {
        let header = FragmentHeader {
            round,
            kind,
            header_hash,
            fragment_index: index as u16,
            fragment_count,
        };
        let mut datagram = Vec::with_capacity(HEADER_LEN + chunk.len());
        encode_header(&header, &mut datagram);
        datagram.extend_from_slice(chunk);
        datagrams.push(datagram);
    }
    Ok(datagrams)
}

/// Decodes a fragment's header, returning it alongside the remaining
/// payload slice.
pub fn decode_fragment(bytes: &[u8]) -> Result<(FragmentHeader, &[u8]), TransportError> {
    if bytes.len() < HEADER_LEN {
        return Err(TransportError::MalformedHeader);
    }
    let mut cursor = 0usize;
    let version = bytes[cursor];
    cursor += 1;
    if version != WIRE_VERSION {
        return Err(TransportError::MalformedHeader);
    }

    let round = Round(u64::from_le_bytes(bytes[cursor..cursor + 8].try_into().unwrap()));
    cursor += 8;

    let kind = MessageKind::try_from(bytes[cursor])?;
    cursor += 1;

    let mut hash_bytes = [0u8; 32];
    hash_bytes.copy_from_slice(&bytes[cursor..cursor + 32]);
    let header_hash = Hash(hash_bytes);
    cursor += 32;

    let fragment_index = u16::from_le_bytes(bytes[cursor..cursor + 2].try_into().unwrap());
    cursor += 2;
    let fragment_count = u16::from_le_bytes(bytes[cursor..cursor + 2].try_into().unwrap());
    cursor += 2;

    if fragment_count == 0 || fragment_index >= fragment_count {
        return Err(TransportError::MalformedHeader);
    }

    Ok((
        FragmentHeader {
            round,
            kind,
            header_hash,
            fragment_index,
            fragment_count,
        },
        &bytes[cursor..],
    ))
}
