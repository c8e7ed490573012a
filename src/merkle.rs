//! Merkle commitment over a block's ordered transaction list.

use crate::hash::{sha256d, Hash, TxId};

/// Compute the merkle root of a transaction id list, reporting whether the
/// list is a mutation of itself.
///
/// The tree duplicates the last node of every odd-length level. That makes
/// a list ending in a duplicated pair hash to the same root as the honest
/// list without it, so root equality alone cannot distinguish the two. Any
/// level that hashes two identical subtrees sets `mutated`, and callers
/// must reject the block rather than trust the colliding root.
pub fn merkle_root_and_mutation(txids: &[TxId]) -> (Hash, bool) {
    if txids.is_empty() {
        return ([0u8; 32], false);
    }

    let mut level: Vec<Hash> = txids.iter().map(|id| *id.as_bytes()).collect();
    let mut mutated = false;

    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            let left = pair[0];
            let right = if pair.len() == 2 { pair[1] } else { pair[0] };
            if pair.len() == 2 && left == right {
                mutated = true;
            }
            let mut buf = [0u8; 64];
            buf[..32].copy_from_slice(&left);
            buf[32..].copy_from_slice(&right);
            next.push(sha256d(&buf));
        }
        level = next;
    }

    (level[0], mutated)
}

/// Root without the mutation flag, for callers that only build trees from
/// lists they constructed themselves.
pub fn merkle_root(txids: &[TxId]) -> Hash {
    merkle_root_and_mutation(txids).0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> TxId {
        TxId::from_bytes([byte; 32])
    }

    #[test]
    fn test_single_leaf_is_its_own_root() {
        let (root, mutated) = merkle_root_and_mutation(&[id(9)]);
        assert_eq!(root, [9u8; 32]);
        assert!(!mutated);
    }

    #[test]
    fn test_empty_list() {
        let (root, mutated) = merkle_root_and_mutation(&[]);
        assert_eq!(root, [0u8; 32]);
        assert!(!mutated);
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        // Three leaves: the last is paired with itself without tripping the
        // mutation flag, since no *distinct* positions repeat.
        let (_, mutated) = merkle_root_and_mutation(&[id(1), id(2), id(3)]);
        assert!(!mutated);
    }

    #[test]
    fn test_duplicated_adjacent_pair_is_flagged() {
        // [a, b, c, c] collides with the root of [a, b, c] but must be
        // reported as mutated.
        let honest = merkle_root(&[id(1), id(2), id(3)]);
        let (root, mutated) = merkle_root_and_mutation(&[id(1), id(2), id(3), id(3)]);
        assert_eq!(root, honest);
        assert!(mutated);
    }

    #[test]
    fn test_duplicated_two_leaf_suffix_is_flagged() {
        // Six leaves end in the duplicated pair [5, 6]. The honest list
        // duplicates its last inner node to pad the odd level, so the two
        // roots collide one level up; only the flag tells them apart.
        let honest = merkle_root(&[id(1), id(2), id(3), id(4), id(5), id(6)]);
        let (root, mutated) = merkle_root_and_mutation(&[
            id(1),
            id(2),
            id(3),
            id(4),
            id(5),
            id(6),
            id(5),
            id(6),
        ]);
        assert_eq!(root, honest);
        assert!(mutated);
    }

    #[test]
    fn test_order_sensitivity() {
        assert_ne!(
            merkle_root(&[id(1), id(2)]),
            merkle_root(&[id(2), id(1)])
        );
    }
}
