//! Round states and the confidant/writer role a node takes on
//! (spec §4.5 "States" / "Role assignment" / "Event alphabet").

use concord_types::PublicKey;

/// A round's lifecycle state (spec §4.5 "States"). `Collect` is a
/// sub-role of `Writer`: the writer also assembles the round's
/// transaction packet while its confidants exchange stages.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NodeState {
    Normal,
    Trusted,
    Collect,
    Writer,
    /// Transient: processing a big-bang reset.
    HandleBB,
    /// Fewer than `MinTrustedNodes` confidants were available this
    /// round; the round is aborted and the node waits for the next
    /// round table.
    NoTrusted,
}

/// The event alphabet driving [`NodeState`] transitions.
#[derive(Clone, Debug)]
pub enum Event {
    Start,
    BigBang,
    RoundTable,
    Transactions,
    Hashes,
    Stage1Enough,
    Stage2Enough,
    Stage3Enough,
    SmartDeploy,
    SmartResult,
    Expired,
    SetNormal,
    SetTrusted,
    SetWriter,
}

/// The role a node takes on for a round, derived from its key's
/// position in the round table (spec §4.5 "Role assignment").
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Role {
    Writer,
    Trusted,
    Normal,
}

pub fn assign_role(self_key: &PublicKey, general: &PublicKey, confidants: &[PublicKey]) -> Role {
    if self_key == general {
        Role::Writer
    } else if confidants.contains(self_key) {
        Role::Trusted
    } else {
        Role::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> PublicKey {
        PublicKey([byte; 32])
    }

    #[test]
    fn writer_key_outranks_confidant_membership() {
        let general = key(1);
        let confidants = vec![key(1), key(2)];
        assert_eq!(assign_role(&key(1), &general, &confidants), Role::Writer);
    }

    #[test]
    fn confidant_membership_without_writer_match_is_trusted() {
        let general = key(1);
        let confidants = vec![key(1), key(2), key(3)];
        assert_eq!(assign_role(&key(3), &general, &confidants), Role::Trusted);
    }

    #[test]
    fn unlisted_key_is_normal() {
        let general = key(1);
        let confidants = vec![key(1), key(2)];
        assert_eq!(assign_role(&key(9), &general, &confidants), Role::Normal);
    }
}
