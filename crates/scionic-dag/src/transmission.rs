//! Incremental transfer as a stream of self-verifying packets
//!
//! The sender walks the DAG breadth-first from the root, so a receiver that
//! applies packets in emission order always holds a packet's parent before
//! the packet itself arrives. Children of a parent with several links carry
//! a proof against the parent's classic merkle root.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::codec::{decode_packet_cbor, encode_packet_cbor};
use crate::dag::{Dag, DagError};
use crate::hash::link_hash;
use crate::types::{ClassicTreeBranch, Leaf, TransmissionPacket};

impl TransmissionPacket {
    pub fn to_cbor(&self) -> Result<Vec<u8>, DagError> {
        Ok(encode_packet_cbor(self)?)
    }

    pub fn from_cbor(data: &[u8]) -> Result<Self, DagError> {
        Ok(decode_packet_cbor(data)?)
    }
}

impl Dag {
    /// Express the DAG as an ordered packet stream, root first
    ///
    /// Children are visited in sorted-hash order; a leaf reachable from
    /// several parents is sent once, under the first parent that reaches it.
    /// Links to leaves not held locally are skipped.
    pub fn get_leaf_sequence(&self) -> Result<Vec<TransmissionPacket>, DagError> {
        let root = self.root_leaf()?;
        let mut packets = vec![TransmissionPacket {
            leaf: root.clone(),
            parent_hash: String::new(),
            proofs: BTreeMap::new(),
        }];

        let mut visited: HashSet<&str> = HashSet::from([root.hash.as_str()]);
        let mut queue: VecDeque<&Leaf> = VecDeque::from([root]);

        while let Some(parent) = queue.pop_front() {
            let branches = self.branches_of(parent)?;

            let mut children: Vec<&String> = parent.links.iter().collect();
            children.sort();
            children.dedup();

            for child_hash in children {
                if !visited.insert(child_hash.as_str()) {
                    continue;
                }
                let Some(child) = self.leaves.get(child_hash) else {
                    tracing::debug!("Skipping {} under {}: not held locally", child_hash, parent.hash);
                    continue;
                };

                let mut proofs = BTreeMap::new();
                if let Some(branches) = &branches {
                    let branch = branches.get(child_hash.as_str()).ok_or_else(|| DagError::MissingProof {
                        parent: parent.hash.clone(),
                        child: child_hash.clone(),
                    })?;
                    proofs.insert(child_hash.clone(), branch.clone());
                }

                packets.push(TransmissionPacket {
                    leaf: child.clone(),
                    parent_hash: parent.hash.clone(),
                    proofs,
                });
                queue.push_back(child);
            }
        }

        tracing::debug!("Built {} transmission packets for DAG {}", packets.len(), self.root);
        Ok(packets)
    }

    /// Branches for every child of `parent`, or None when no proof is needed
    ///
    /// A parent with its full link list gets a fresh tree; a pruned parent
    /// can only offer the proofs stored alongside it.
    fn branches_of<'a>(
        &'a self,
        parent: &'a Leaf,
    ) -> Result<Option<HashMap<&'a str, ClassicTreeBranch>>, DagError> {
        if parent.current_link_count <= 1 {
            return Ok(None);
        }

        if parent.links.len() != parent.current_link_count {
            let stored: HashMap<&str, ClassicTreeBranch> = self
                .proofs
                .get(&parent.hash)
                .map(|branches| {
                    branches
                        .iter()
                        .map(|(child, branch)| (child.as_str(), branch.clone()))
                        .collect()
                })
                .unwrap_or_default();
            return Ok(Some(stored));
        }

        let Some(tree) = parent.classic_merkle_tree()? else {
            return Ok(None);
        };
        let mut branches = HashMap::with_capacity(parent.links.len());
        for (index, link) in parent.links.iter().enumerate() {
            branches.entry(link.as_str()).or_insert(ClassicTreeBranch {
                leaf: link.clone(),
                proof: tree.proof(index)?,
            });
        }
        Ok(Some(branches))
    }

    /// Check a packet against what this (receiving) DAG already holds
    ///
    /// Every packet's leaf must reproduce its own CID and content hash. A
    /// non-root packet's parent must already be present; when the parent
    /// has several links the packet must carry a proof for its leaf.
    pub fn verify_transmission_packet(&self, packet: &TransmissionPacket) -> Result<(), DagError> {
        let leaf = &packet.leaf;
        if leaf.hash.is_empty() {
            return Err(DagError::integrity("", "packet leaf has no hash"));
        }
        if leaf.item_name.is_empty() {
            return Err(DagError::integrity(&leaf.hash, "packet leaf has no item name"));
        }

        if packet.is_root() {
            return leaf.verify_root_leaf();
        }
        leaf.verify_leaf()?;

        let parent = self
            .leaves
            .get(&packet.parent_hash)
            .ok_or_else(|| DagError::NotFound(format!("parent {} of {}", packet.parent_hash, leaf.hash)))?;

        let invalid = || DagError::InvalidProof {
            parent: parent.hash.clone(),
            child: leaf.hash.clone(),
        };

        if parent.current_link_count > 1 {
            let branch = packet.proofs.get(&leaf.hash).ok_or_else(|| DagError::MissingProof {
                parent: parent.hash.clone(),
                child: leaf.hash.clone(),
            })?;
            if branch.leaf != leaf.hash || !parent.verify_branch(branch) {
                return Err(invalid());
            }
        } else if parent.classic_merkle_root != Some(link_hash(&leaf.hash)) {
            return Err(invalid());
        }

        Ok(())
    }

    /// Insert a packet's leaf, linking it under its parent
    ///
    /// Does not verify; receivers should use
    /// [`Dag::apply_and_verify_transmission_packet`].
    pub fn apply_transmission_packet(&mut self, packet: TransmissionPacket) {
        let TransmissionPacket {
            leaf,
            parent_hash,
            proofs,
        } = packet;
        let hash = leaf.hash.clone();

        if parent_hash.is_empty() {
            tracing::info!("Receiving DAG {}", hash);
            self.root = hash.clone();
        } else if let Some(parent) = self.leaves.get_mut(&parent_hash) {
            if !parent.has_link(&hash) {
                parent.links.push(hash.clone());
                parent.current_link_count = parent.links.len();
            }
            if !proofs.is_empty() {
                self.proofs.entry(parent_hash).or_default().extend(proofs);
            }
        }

        tracing::debug!("Applied packet {} ({})", hash, leaf.item_name);
        self.leaves.insert(hash, leaf);
    }

    /// Verify, then apply; a rejected packet leaves the DAG untouched
    pub fn apply_and_verify_transmission_packet(&mut self, packet: TransmissionPacket) -> Result<(), DagError> {
        if let Err(e) = self.verify_transmission_packet(&packet) {
            tracing::warn!("Rejected packet {}: {}", packet.leaf.hash, e);
            return Err(e);
        }
        self.apply_transmission_packet(packet);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuilderConfig, DagBuilder};
    use crate::source::SourceEntry;

    fn sample_dag() -> Dag {
        DagBuilder::new(BuilderConfig::new().with_chunk_size(3))
            .build(&SourceEntry::directory(
                "root",
                vec![
                    SourceEntry::file("big", b"abcdefghij".to_vec()),
                    SourceEntry::directory("only", vec![SourceEntry::file("x", b"x".to_vec())]),
                    SourceEntry::file("small", b"s".to_vec()),
                ],
            ))
            .unwrap()
    }

    fn replay(packets: Vec<TransmissionPacket>) -> Result<Dag, DagError> {
        let mut receiver = Dag::new();
        for packet in packets {
            receiver.apply_and_verify_transmission_packet(packet)?;
        }
        Ok(receiver)
    }

    #[test]
    fn test_sequence_is_breadth_first() {
        let dag = sample_dag();
        let packets = dag.get_leaf_sequence().unwrap();

        assert_eq!(packets.len(), dag.len());
        assert!(packets[0].is_root());
        assert_eq!(packets[0].leaf.hash, dag.root);

        let mut seen = HashSet::new();
        for packet in &packets {
            if !packet.is_root() {
                assert!(seen.contains(&packet.parent_hash), "parent sent first");
            }
            seen.insert(packet.leaf.hash.clone());
        }
    }

    #[test]
    fn test_proofs_only_for_multi_link_parents() {
        let dag = sample_dag();
        for packet in dag.get_leaf_sequence().unwrap().iter().skip(1) {
            let parent = dag.leaf(&packet.parent_hash).unwrap();
            if parent.links.len() > 1 {
                assert!(parent.verify_branch(&packet.proofs[&packet.leaf.hash]));
            } else {
                assert!(packet.proofs.is_empty());
            }
        }
    }

    #[test]
    fn test_replay_rebuilds_dag() {
        let dag = sample_dag();
        let receiver = replay(dag.get_leaf_sequence().unwrap()).unwrap();

        assert_eq!(receiver.root, dag.root);
        assert_eq!(receiver.leaves, dag.leaves);
        receiver.verify().unwrap();
    }

    #[test]
    fn test_missing_proof_rejected() {
        let dag = sample_dag();
        let mut packets = dag.get_leaf_sequence().unwrap();
        let index = packets.iter().position(|p| !p.proofs.is_empty()).unwrap();
        packets[index].proofs.clear();

        assert!(matches!(replay(packets), Err(DagError::MissingProof { .. })));
    }

    #[test]
    fn test_wrong_proof_rejected() {
        let dag = sample_dag();
        let mut packets = dag.get_leaf_sequence().unwrap();
        let index = packets.iter().position(|p| !p.proofs.is_empty()).unwrap();
        let hash = packets[index].leaf.hash.clone();
        let branch = packets[index].proofs.get_mut(&hash).unwrap();
        branch.proof.path ^= 1;

        assert!(matches!(replay(packets), Err(DagError::InvalidProof { .. })));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let dag = sample_dag();
        let packets = dag.get_leaf_sequence().unwrap();
        let receiver = Dag::new();
        assert!(matches!(
            receiver.verify_transmission_packet(&packets[1]),
            Err(DagError::NotFound(_))
        ));
    }

    #[test]
    fn test_single_link_parent_checked_against_root() {
        let dag = sample_dag();
        let packets = dag.get_leaf_sequence().unwrap();
        let only = packets.iter().find(|p| p.leaf.item_name == "only").unwrap();
        let small = packets.iter().find(|p| p.leaf.item_name == "small").unwrap();

        let mut receiver = Dag::new();
        for packet in packets.iter().take_while(|p| p.leaf.item_name != "x").cloned() {
            receiver.apply_and_verify_transmission_packet(packet).unwrap();
        }

        // "only" has a single link, so no proof travels; the child must
        // still hash to the parent's classic merkle root.
        let forged = TransmissionPacket {
            leaf: small.leaf.clone(),
            parent_hash: only.leaf.hash.clone(),
            proofs: BTreeMap::new(),
        };
        assert!(matches!(
            receiver.verify_transmission_packet(&forged),
            Err(DagError::InvalidProof { .. })
        ));
    }

    #[test]
    fn test_tampered_leaf_rejected_and_not_applied() {
        let dag = sample_dag();
        let mut packets = dag.get_leaf_sequence().unwrap();
        let mut receiver = Dag::new();
        receiver
            .apply_and_verify_transmission_packet(packets.remove(0))
            .unwrap();

        let mut bad = packets.remove(0);
        bad.leaf.item_name.push('!');
        let hash = bad.leaf.hash.clone();
        assert!(matches!(
            receiver.apply_and_verify_transmission_packet(bad),
            Err(DagError::Integrity { .. })
        ));
        assert!(receiver.get_leaf(&hash).is_none());
    }

    #[test]
    fn test_apply_appends_missing_link() {
        let dag = sample_dag();
        let packets = dag.get_leaf_sequence().unwrap();

        let mut receiver = Dag::new();
        let mut root_packet = packets[0].clone();
        let child = packets[1].clone();
        root_packet.leaf.links.retain(|l| *l != child.leaf.hash);
        receiver.apply_transmission_packet(root_packet);
        receiver.apply_transmission_packet(child.clone());

        let root = receiver.root_leaf().unwrap();
        assert!(root.has_link(&child.leaf.hash));
        assert_eq!(root.current_link_count, root.links.len());
        assert!(receiver
            .stored_proofs(&root.hash)
            .is_some_and(|p| p.contains_key(&child.leaf.hash)));
    }

    #[test]
    fn test_packet_cbor_roundtrip() {
        let dag = sample_dag();
        for packet in dag.get_leaf_sequence().unwrap() {
            let decoded = TransmissionPacket::from_cbor(&packet.to_cbor().unwrap()).unwrap();
            assert_eq!(decoded, packet);
        }
    }
}
