pub mod bigbang;
pub mod machine;
pub mod role;
pub mod stages;

pub use concord_types::error::ConsensusError;
pub use bigbang::{accept_big_bang, build_big_bang, BigBang};
pub use machine::RoundMachine;
pub use role::{assign_role, Event, NodeState, Role};
pub use stages::{build_stage1, build_stage2, build_stage3, elect_writer, has_quorum, true_trusted_mask, verify_stage1, verify_stage2, verify_stage3};
