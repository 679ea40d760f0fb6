//! Partial DAGs: a requested subset plus every ancestor back to the root

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::dag::{Dag, DagError};
use crate::types::{ClassicTreeBranch, Leaf};

impl Dag {
    /// Extract the leaves in `hashes` together with their paths to the root
    ///
    /// With `prune_links`, kept leaves only link to kept leaves. Their
    /// `CurrentLinkCount` and classic merkle root are hashed fields and stay
    /// as they were; each retained link is instead backed by a proof in the
    /// result's proof table so the partial DAG still verifies.
    pub fn get_partial(&self, hashes: &[String], prune_links: bool) -> Result<Dag, DagError> {
        if hashes.is_empty() {
            return Err(DagError::EmptyInput("no hashes requested".to_string()));
        }
        for hash in hashes {
            self.leaf(hash)?;
        }

        let parents = self.parent_map();
        let mut kept: HashSet<&str> = HashSet::new();
        for hash in hashes {
            let mut current = hash.as_str();
            while kept.insert(current) && current != self.root {
                current = parents
                    .get(current)
                    .copied()
                    .ok_or_else(|| DagError::NotFound(format!("path from root to {}", hash)))?;
            }
        }
        kept.insert(self.root.as_str());

        let mut leaves = BTreeMap::new();
        let mut proofs: BTreeMap<String, BTreeMap<String, ClassicTreeBranch>> = BTreeMap::new();
        for hash in &kept {
            let Some(original) = self.leaves.get(*hash) else {
                continue;
            };
            let mut leaf = original.clone();

            if prune_links {
                leaf.links.retain(|l| kept.contains(l.as_str()));
            }
            if leaf.links.len() != leaf.current_link_count && !leaf.links.is_empty() {
                let mut branches = BTreeMap::new();
                for link in &leaf.links {
                    branches.insert(link.clone(), self.child_branch(original, link)?);
                }
                proofs.insert(leaf.hash.clone(), branches);
            }

            leaves.insert(leaf.hash.clone(), leaf);
        }

        tracing::debug!(
            "Partial DAG of {} for {} requested leaves: kept {} of {}",
            self.root,
            hashes.len(),
            leaves.len(),
            self.leaves.len()
        );

        Ok(Dag {
            root: self.root.clone(),
            leaves,
            labels: None,
            label_index: HashMap::new(),
            proofs,
        })
    }

    /// Whether any leaf links to a leaf that is not held locally
    pub fn is_partial(&self) -> bool {
        self.leaves
            .values()
            .flat_map(|leaf| leaf.links.iter())
            .any(|link| !self.leaves.contains_key(link))
    }

    /// child -> first parent reaching it, breadth-first from the root
    fn parent_map(&self) -> HashMap<&str, &str> {
        let mut parents = HashMap::new();
        let mut visited: HashSet<&str> = HashSet::from([self.root.as_str()]);
        let mut queue = VecDeque::from([self.root.as_str()]);

        while let Some(hash) = queue.pop_front() {
            let Some(leaf) = self.leaves.get(hash) else {
                continue;
            };
            for link in &leaf.links {
                if visited.insert(link.as_str()) {
                    parents.insert(link.as_str(), hash);
                    queue.push_back(link.as_str());
                }
            }
        }
        parents
    }

    /// Proof of `child` against `parent`, from the tree when the parent still
    /// holds all of its links, otherwise from the stored proofs
    fn child_branch(&self, parent: &Leaf, child: &str) -> Result<ClassicTreeBranch, DagError> {
        if parent.links.len() == parent.current_link_count {
            return parent.branch_for(child);
        }
        self.proofs
            .get(&parent.hash)
            .and_then(|branches| branches.get(child))
            .cloned()
            .ok_or_else(|| DagError::MissingProof {
                parent: parent.hash.clone(),
                child: child.to_string(),
            })
    }
}
