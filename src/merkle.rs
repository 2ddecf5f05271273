//! Canonical binary Merkle tree (C4).
//!
//! Leaves are chunk hashes in chunk-index order. Internal nodes are
//! `SHA3-256(left ‖ right)` via [`crate::hash::hash_pair`]. An odd node
//! count at any level is fixed by duplicating the last node before pairing,
//! per `spec.md` §4.4. The empty-list root is the all-zero hash; a
//! single-leaf tree's root is that leaf's own hash.

use crate::hash::{hash_pair, Hash};

/// Which side of a sibling pair a proof step's hash sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// One step of an inclusion proof: the sibling hash and which side it was
/// on relative to the node being proven.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProofStep {
    pub sibling: Hash,
    pub side: Side,
}

/// An inclusion proof for a single leaf.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MerkleProof {
    pub leaf: Hash,
    pub steps: Vec<ProofStep>,
}

/// A fully materialized Merkle tree, level 0 being the leaves.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|top| top.first().copied())
            .unwrap_or(Hash::ZERO)
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(Vec::len).unwrap_or(0)
    }

    /// Generate an inclusion proof for the leaf at `index`. Returns `None`
    /// if `index` is out of range.
    pub fn generate_proof(&self, index: usize) -> Option<MerkleProof> {
        let leaves = self.levels.first()?;
        if index >= leaves.len() {
            return None;
        }

        let leaf = leaves[index];
        let mut steps = Vec::new();
        let mut pos = index;

        for level in &self.levels[..self.levels.len().saturating_sub(1)] {
            // Odd levels are padded by duplicating the last node before
            // pairing; mirror that here so the sibling lookup matches the
            // parent-level construction exactly.
            let padded_len = level.len() + (level.len() % 2);
            let sibling_pos = if pos % 2 == 0 { pos + 1 } else { pos - 1 };
            let sibling = if sibling_pos < level.len() {
                level[sibling_pos]
            } else if sibling_pos < padded_len {
                level[level.len() - 1]
            } else {
                break;
            };

            let side = if pos % 2 == 0 { Side::Right } else { Side::Left };
            steps.push(ProofStep { sibling, side });
            pos /= 2;
        }

        Some(MerkleProof { leaf, steps })
    }
}

/// Build a canonical Merkle tree over `leaves`, in the given order.
pub fn build_tree(leaves: &[Hash]) -> MerkleTree {
    if leaves.is_empty() {
        return MerkleTree {
            levels: vec![vec![]],
        };
    }

    let mut levels = vec![leaves.to_vec()];
    while levels.last().unwrap().len() > 1 {
        let current = levels.last().unwrap();
        let mut next = Vec::with_capacity(current.len().div_ceil(2));
        let mut i = 0;
        while i < current.len() {
            let left = current[i];
            let right = if i + 1 < current.len() {
                current[i + 1]
            } else {
                current[i]
            };
            next.push(hash_pair(&left, &right));
            i += 2;
        }
        levels.push(next);
    }

    MerkleTree { levels }
}

/// Verify an inclusion proof against a known root.
pub fn verify_proof(proof: &MerkleProof, root: &Hash) -> bool {
    let mut current = proof.leaf;
    for step in &proof.steps {
        current = match step.side {
            Side::Left => hash_pair(&step.sibling, &current),
            Side::Right => hash_pair(&current, &step.sibling),
        };
    }
    &current == root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash;

    fn leaf(s: &str) -> Hash {
        hash(s.as_bytes())
    }

    #[test]
    fn empty_list_root_is_all_zero() {
        let tree = build_tree(&[]);
        assert_eq!(tree.root(), Hash::ZERO);
    }

    #[test]
    fn single_leaf_root_is_the_leaf_itself() {
        let a = leaf("a");
        let tree = build_tree(&[a]);
        assert_eq!(tree.root(), a);
    }

    #[test]
    fn two_leaves_root_is_hash_pair() {
        let a = leaf("a");
        let b = leaf("b");
        let tree = build_tree(&[a, b]);
        assert_eq!(tree.root(), hash_pair(&a, &b));
    }

    #[test]
    fn odd_leaf_count_duplicates_last_node() {
        let a = leaf("a");
        let b = leaf("b");
        let c = leaf("c");
        let tree = build_tree(&[a, b, c]);
        // level 1: [hash_pair(a,b), hash_pair(c,c)]
        let expected = hash_pair(&hash_pair(&a, &b), &hash_pair(&c, &c));
        assert_eq!(tree.root(), expected);
    }

    #[test]
    fn proof_verifies_for_every_leaf_across_several_sizes() {
        for n in 1..=9usize {
            let leaves: Vec<Hash> = (0..n).map(|i| leaf(&format!("leaf-{i}"))).collect();
            let tree = build_tree(&leaves);
            for i in 0..n {
                let proof = tree.generate_proof(i).unwrap();
                assert_eq!(proof.leaf, leaves[i]);
                assert!(
                    verify_proof(&proof, &tree.root()),
                    "proof for leaf {i} of {n} failed to verify"
                );
            }
        }
    }

    #[test]
    fn tampered_proof_fails_verification() {
        let leaves: Vec<Hash> = (0..5).map(|i| leaf(&format!("leaf-{i}"))).collect();
        let tree = build_tree(&leaves);
        let mut proof = tree.generate_proof(2).unwrap();
        proof.leaf = leaf("not-the-real-leaf");
        assert!(!verify_proof(&proof, &tree.root()));
    }

    #[test]
    fn proof_out_of_range_is_none() {
        let leaves: Vec<Hash> = (0..3).map(|i| leaf(&format!("leaf-{i}"))).collect();
        let tree = build_tree(&leaves);
        assert!(tree.generate_proof(3).is_none());
    }

    proptest::proptest! {
        /// R2: every leaf of every tree size in a reasonable range produces
        /// a proof that verifies against that tree's own root.
        #[test]
        fn every_proof_verifies_for_arbitrary_leaf_sets(labels in proptest::collection::vec("[a-z]{1,8}", 1..40)) {
            let leaves: Vec<Hash> = labels.iter().map(|s| leaf(s)).collect();
            let tree = build_tree(&leaves);
            for i in 0..leaves.len() {
                let proof = tree.generate_proof(i).unwrap();
                proptest::prop_assert!(verify_proof(&proof, &tree.root()));
            }
        }

        /// Flipping any single leaf changes the root (determinism /
        /// tamper-evidence), unless the flip happens to collide with an
        /// existing leaf hash.
        #[test]
        fn reordering_leaves_changes_root_when_not_a_palindrome(labels in proptest::collection::vec("[a-z]{1,8}", 2..10)) {
            let leaves: Vec<Hash> = labels.iter().map(|s| leaf(s)).collect();
            let forward = build_tree(&leaves).root();
            let mut reversed = leaves.clone();
            reversed.reverse();
            let backward = build_tree(&reversed).root();
            if leaves != reversed {
                proptest::prop_assert_ne!(forward, backward);
            }
        }
    }
}
