pub mod framing;
pub mod neighbour;
pub mod reassembly;
pub mod transport;

pub use concord_types::error::TransportError;
pub use framing::{decode_fragment, fragment_message, FragmentHeader, MessageKind, HEADER_LEN, MAX_FRAGMENTS, MAX_FRAGMENT_PAYLOAD};
pub use neighbour::{Neighbour, NeighbourState, NeighbourTable, RefusalReason};
pub use reassembly::MessageAssembler;
pub use transport::{InboundMessage, Transport};
