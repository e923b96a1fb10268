//! Next-round-table election from the writer's collected Stage3s
//! (spec §4.6 "Next-round table").

use std::collections::HashMap;

use concord_types::PublicKey;

/// Unions every Stage3 sender's proposed candidate list, keeps only
/// currently-connected keys, then takes `min_trusted..=max_trusted` by
/// proposal count (tie-break: public key lexicographic order). The
/// writer is the candidate with the highest proposal count.
pub fn next_round_table(proposed: &[Vec<PublicKey>], connected: &dyn Fn(&PublicKey) -> bool, min_trusted: usize, max_trusted: usize) -> (PublicKey, Vec<PublicKey>) {
    let mut counts: HashMap<PublicKey, usize> = HashMap::new();
    for list in proposed {
        for key in list {
            if connected(key) {
                *counts.entry(*key).or_insert(0) += 1;
            }
        }
    }

    let mut ranked: Vec<(PublicKey, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.0.cmp(&b.0.0)));

    let take = ranked.len().clamp(min_trusted.min(ranked.len()), max_trusted);
    let confidants: Vec<PublicKey> = ranked.iter().take(take).map(|(key, _)| *key).collect();
    let writer = ranked.first().map(|(key, _)| *key).unwrap_or_default();

    (writer, confidants)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_disconnected_and_caps_at_max() {
        let k = |b: u8| PublicKey([b; 32]);
        let proposed = vec![vec![k(1), k(2), k(3)], vec![k(1), k(2), k(4)], vec![k(1), k(5)]];
        let connected = |key: &PublicKey| key.0[0] != 5;
        let (writer, confidants) = next_round_table(&proposed, &connected, 2, 3);
        assert_eq!(writer, k(1));
        assert_eq!(confidants.len(), 3);
        assert!(!confidants.contains(&k(5)));
    }

    #[test]
    fn empty_proposals_yield_empty_table() {
        let (writer, confidants) = next_round_table(&[], &|_| true, 3, 5);
        assert_eq!(writer, PublicKey([0u8; 32]));
        assert!(confidants.is_empty());
    }
}
