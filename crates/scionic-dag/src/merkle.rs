//! Classic binary merkle tree over a leaf's children
//!
//! Layer 0 holds the input hashes. Each following layer hashes adjacent
//! pairs left to right as SHA256(left || right). An odd node at the end of a
//! layer is promoted to the next layer unchanged: it is neither duplicated
//! nor padded, and proofs record no sibling for that level.

use sha2::{Digest, Sha256};

use crate::types::{Hash, MerkleProof};

/// Error type for merkle tree construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MerkleError {
    #[error("Cannot build a merkle tree from zero leaves")]
    EmptyInput,
    #[error("Leaf index {index} out of range for tree with {leaf_count} leaves")]
    IndexOutOfRange { index: usize, leaf_count: usize },
}

/// Compute hash of two concatenated hashes (parent = H(left || right))
pub fn merkle_hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Classic merkle tree with all layers retained for proof generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    /// layers[0] = leaves, last layer = [root]
    layers: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Build the tree over an ordered, non-empty list of hashes
    pub fn new(leaves: Vec<Hash>) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::EmptyInput);
        }

        let mut layers = vec![leaves];
        while layers[layers.len() - 1].len() > 1 {
            let current = &layers[layers.len() - 1];
            let mut next = Vec::with_capacity((current.len() + 1) / 2);
            for pair in current.chunks(2) {
                match pair {
                    [left, right] => next.push(merkle_hash_pair(left, right)),
                    // Odd node - promoted as is
                    [odd] => next.push(*odd),
                    _ => unreachable!("chunks(2) yields one or two items"),
                }
            }
            layers.push(next);
        }

        Ok(Self { layers })
    }

    /// Root hash
    pub fn root(&self) -> Hash {
        self.layers[self.layers.len() - 1][0]
    }

    /// Number of input leaves
    pub fn leaf_count(&self) -> usize {
        self.layers[0].len()
    }

    /// Input leaf at `index`
    pub fn leaf(&self, index: usize) -> Option<&Hash> {
        self.layers[0].get(index)
    }

    /// Number of layers including leaves and root
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Generate the inclusion proof for the leaf at `index`
    pub fn proof(&self, index: usize) -> Result<MerkleProof, MerkleError> {
        let leaf_count = self.leaf_count();
        if index >= leaf_count {
            return Err(MerkleError::IndexOutOfRange { index, leaf_count });
        }

        let mut proof = MerkleProof::default();
        let mut idx = index;

        for layer in &self.layers[..self.layers.len() - 1] {
            if idx % 2 == 1 {
                // Right child, sibling on the left: bit stays clear
                proof.siblings.push(layer[idx - 1]);
            } else if idx + 1 < layer.len() {
                // Left child, sibling on the right
                proof.path |= 1 << proof.siblings.len();
                proof.siblings.push(layer[idx + 1]);
            }
            // else: promoted odd node, no sibling at this level
            idx /= 2;
        }

        Ok(proof)
    }

    /// Verify an inclusion proof against a root
    ///
    /// Malformed or mismatching proofs return false.
    pub fn verify(leaf: &Hash, proof: &MerkleProof, root: &Hash) -> bool {
        verify_proof(leaf, proof, root)
    }
}

/// Replay a proof from `leaf` and compare the result with `root`
pub fn verify_proof(leaf: &Hash, proof: &MerkleProof, root: &Hash) -> bool {
    if proof.siblings.len() > u64::BITS as usize {
        return false;
    }
    // Bits beyond the sibling count must be clear
    if proof.siblings.len() < u64::BITS as usize && proof.path >> proof.siblings.len() != 0 {
        return false;
    }

    let mut current = *leaf;
    for (i, sibling) in proof.siblings.iter().enumerate() {
        current = if proof.path & (1 << i) != 0 {
            merkle_hash_pair(&current, sibling)
        } else {
            merkle_hash_pair(sibling, &current)
        };
    }

    current == *root
}
