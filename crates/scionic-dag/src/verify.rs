//! DAG verification
//!
//! All-or-nothing: the first inconsistency is returned as
//! [`DagError::Integrity`] naming the offending leaf.

use crate::dag::{Dag, DagError};
use crate::types::Leaf;

/// What `Dag::verify_with` checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Accept links to leaves that are not held locally
    pub allow_partial: bool,
    /// Re-derive every CID from the leaf fields (strong form)
    pub check_hashes: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            allow_partial: false,
            check_hashes: true,
        }
    }
}

impl VerifyOptions {
    /// Full DAG, every CID recomputed
    pub fn strict() -> Self {
        Self::default()
    }

    /// Declared-partial DAG, every CID recomputed
    pub fn partial() -> Self {
        Self {
            allow_partial: true,
            ..Self::default()
        }
    }

    /// Links and content hashes only
    pub fn lightweight() -> Self {
        Self {
            check_hashes: false,
            ..Self::default()
        }
    }

    pub fn with_allow_partial(mut self, allow_partial: bool) -> Self {
        self.allow_partial = allow_partial;
        self
    }

    pub fn with_check_hashes(mut self, check_hashes: bool) -> Self {
        self.check_hashes = check_hashes;
        self
    }
}

impl Leaf {
    /// Check a non-root leaf against its own hash and content hash
    pub fn verify_leaf(&self) -> Result<(), DagError> {
        if self.is_root() {
            return Err(DagError::integrity(&self.hash, "non-root leaf carries root statistics"));
        }
        self.verify_fields()
    }

    /// Check a root leaf against its own hash and content hash
    pub fn verify_root_leaf(&self) -> Result<(), DagError> {
        if !self.is_root() {
            return Err(DagError::integrity(&self.hash, "root leaf has no root statistics"));
        }
        self.verify_fields()
    }

    fn verify_fields(&self) -> Result<(), DagError> {
        self.verify_content_fields()?;
        if !self.verify_hash()? {
            return Err(DagError::integrity(&self.hash, "recomputed CID does not match"));
        }
        Ok(())
    }

    fn verify_content_fields(&self) -> Result<(), DagError> {
        if self.content.is_some() && self.content_hash.is_none() {
            return Err(DagError::integrity(&self.hash, "content present without ContentHash"));
        }
        if !self.verify_content() {
            return Err(DagError::integrity(&self.hash, "content hash mismatch"));
        }
        Ok(())
    }
}

impl Dag {
    /// Verify a complete DAG, recomputing every CID
    pub fn verify(&self) -> Result<(), DagError> {
        self.verify_with(VerifyOptions::strict())
    }

    /// Verify a DAG that may link to leaves it does not hold
    pub fn verify_partial(&self) -> Result<(), DagError> {
        self.verify_with(VerifyOptions::partial())
    }

    pub fn verify_with(&self, options: VerifyOptions) -> Result<(), DagError> {
        let result = self.check(options);
        match &result {
            Ok(()) => tracing::debug!("Verified DAG {} ({} leaves)", self.root, self.leaves.len()),
            Err(e) => tracing::warn!("Verification of DAG {} failed: {}", self.root, e),
        }
        result
    }

    fn check(&self, options: VerifyOptions) -> Result<(), DagError> {
        let root = self
            .leaves
            .get(&self.root)
            .ok_or_else(|| DagError::integrity(&self.root, "root leaf missing"))?;
        if !root.is_root() {
            return Err(DagError::integrity(&self.root, "root leaf has no root statistics"));
        }

        for (key, leaf) in &self.leaves {
            if *key != leaf.hash {
                return Err(DagError::integrity(
                    key,
                    format!("stored under a different hash than its own ({})", leaf.hash),
                ));
            }
            if *key != self.root && leaf.is_root() {
                return Err(DagError::integrity(key, "non-root leaf carries root statistics"));
            }

            if options.check_hashes {
                leaf.verify_fields()?;
            } else {
                leaf.verify_content_fields()?;
            }
            self.check_links(leaf, options)?;
        }

        Ok(())
    }

    fn check_links(&self, leaf: &Leaf, options: VerifyOptions) -> Result<(), DagError> {
        if !options.allow_partial {
            if let Some(missing) = leaf.links.iter().find(|l| !self.leaves.contains_key(*l)) {
                return Err(DagError::integrity(&leaf.hash, format!("broken link to {}", missing)));
            }
        }

        if leaf.links.len() == leaf.current_link_count {
            if leaf.recompute_merkle_root()? != leaf.classic_merkle_root {
                return Err(DagError::integrity(&leaf.hash, "classic merkle root does not match links"));
            }
            return Ok(());
        }

        // Pruned link list: each remaining link must be proven against the
        // unchanged classic merkle root.
        if !options.allow_partial || leaf.links.len() > leaf.current_link_count {
            return Err(DagError::integrity(
                &leaf.hash,
                format!(
                    "{} links but CurrentLinkCount is {}",
                    leaf.links.len(),
                    leaf.current_link_count
                ),
            ));
        }
        for link in &leaf.links {
            let proven = self
                .proofs
                .get(&leaf.hash)
                .and_then(|branches| branches.get(link))
                .is_some_and(|branch| branch.leaf == *link && leaf.verify_branch(branch));
            if !proven {
                return Err(DagError::integrity(
                    &leaf.hash,
                    format!("no valid proof for retained link {}", link),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuilderConfig, DagBuilder};
    use crate::source::SourceEntry;

    fn sample_dag() -> Dag {
        DagBuilder::new(BuilderConfig::new().with_chunk_size(4))
            .build(&SourceEntry::directory(
                "root",
                vec![
                    SourceEntry::file("big.bin", b"0123456789abcdef".to_vec()),
                    SourceEntry::directory("sub", vec![SourceEntry::file("small", b"hi".to_vec())]),
                ],
            ))
            .unwrap()
    }

    fn find_by_name(dag: &Dag, name: &str) -> String {
        dag.leaves
            .values()
            .find(|l| l.item_name == name)
            .map(|l| l.hash.clone())
            .unwrap()
    }

    #[test]
    fn test_built_dag_verifies() {
        let dag = sample_dag();
        dag.verify().unwrap();
        dag.verify_partial().unwrap();
        dag.verify_with(VerifyOptions::lightweight()).unwrap();
    }

    #[test]
    fn test_empty_dag_fails() {
        assert!(matches!(Dag::new().verify(), Err(DagError::Integrity { .. })));
    }

    #[test]
    fn test_tampered_content_names_hash() {
        let mut dag = sample_dag();
        let hash = find_by_name(&dag, "small");
        dag.leaves.get_mut(&hash).unwrap().content = Some(b"evil".to_vec());

        match dag.verify_with(VerifyOptions::lightweight()) {
            Err(DagError::Integrity { hash: bad, .. }) => assert_eq!(bad, hash),
            other => panic!("expected integrity error, got {:?}", other),
        }
    }

    #[test]
    fn test_tampered_name_caught_by_hash_check() {
        let mut dag = sample_dag();
        let hash = find_by_name(&dag, "small");
        dag.leaves.get_mut(&hash).unwrap().item_name = "renamed".to_string();

        assert!(dag.verify_with(VerifyOptions::lightweight()).is_ok());
        assert!(matches!(dag.verify(), Err(DagError::Integrity { .. })));
    }

    #[test]
    fn test_broken_link() {
        let mut dag = sample_dag();
        let hash = find_by_name(&dag, "small");
        dag.leaves.remove(&hash);

        assert!(matches!(dag.verify(), Err(DagError::Integrity { .. })));
        dag.verify_partial().unwrap();
    }

    #[test]
    fn test_rekeyed_leaf_rejected() {
        let mut dag = sample_dag();
        let hash = find_by_name(&dag, "small");
        let leaf = dag.leaves.remove(&hash).unwrap();
        dag.leaves.insert("bafyother".to_string(), leaf);
        assert!(matches!(dag.verify_partial(), Err(DagError::Integrity { .. })));
    }

    #[test]
    fn test_stats_on_non_root_rejected() {
        let mut dag = sample_dag();
        let hash = find_by_name(&dag, "sub");
        dag.leaves.get_mut(&hash).unwrap().leaf_count = Some(1);
        assert!(matches!(
            dag.verify_with(VerifyOptions::lightweight()),
            Err(DagError::Integrity { .. })
        ));
    }

    #[test]
    fn test_pruned_links_need_proofs() {
        let mut dag = sample_dag();
        let big = find_by_name(&dag, "big.bin");
        let kept = dag.leaves[&big].links[1].clone();
        let branch = dag.leaves[&big].branch_for(&kept).unwrap();
        dag.leaves.get_mut(&big).unwrap().links = vec![kept.clone()];

        assert!(matches!(dag.verify_partial(), Err(DagError::Integrity { .. })));

        dag.proofs.entry(big.clone()).or_default().insert(kept.clone(), branch);
        dag.verify_partial().unwrap();
        // Strict mode never accepts a pruned link list
        assert!(matches!(dag.verify(), Err(DagError::Integrity { .. })));
    }

    #[test]
    fn test_leaf_level_checks() {
        let dag = sample_dag();
        dag.root_leaf().unwrap().verify_root_leaf().unwrap();
        assert!(dag.root_leaf().unwrap().verify_leaf().is_err());

        let small = dag.leaves[&find_by_name(&dag, "small")].clone();
        small.verify_leaf().unwrap();
        assert!(small.verify_root_leaf().is_err());
    }
}
