//! DAG diff by hash set
//!
//! Leaves are content-addressed, so a diff is a set comparison: a hash only
//! in the new DAG is added, a hash only in the old DAG is removed. An edited
//! file shows up as one removed and one added leaf, never as an update.
//!
//! Applying a diff merges the added leaves into the old ones, finds the new
//! root among the additions and keeps only what that root reaches.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::dag::{Dag, DagError};
use crate::types::Leaf;

/// Direction of a single leaf difference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffType {
    Added,
    Removed,
}

/// One leaf present on only one side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafDiff {
    pub diff_type: DiffType,
    pub leaf: Leaf,
}

/// Counts of a diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub total: usize,
}

/// Result of comparing two DAGs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DagDiff {
    /// Leaf hash -> difference
    pub diffs: BTreeMap<String, LeafDiff>,
    pub summary: DiffSummary,
}

impl DagDiff {
    /// Check if there are any changes
    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    /// Leaves only in the new DAG, by hash
    pub fn get_added_leaves(&self) -> BTreeMap<&str, &Leaf> {
        self.leaves_of(DiffType::Added)
    }

    /// Leaves only in the old DAG, by hash
    pub fn get_removed_leaves(&self) -> BTreeMap<&str, &Leaf> {
        self.leaves_of(DiffType::Removed)
    }

    fn leaves_of(&self, diff_type: DiffType) -> BTreeMap<&str, &Leaf> {
        self.diffs
            .iter()
            .filter(|(_, d)| d.diff_type == diff_type)
            .map(|(hash, d)| (hash.as_str(), &d.leaf))
            .collect()
    }
}

/// Compare two DAGs by leaf hash
pub fn diff(old: &Dag, new: &Dag) -> DagDiff {
    let mut diffs = BTreeMap::new();
    let mut summary = DiffSummary::default();

    for (hash, leaf) in &new.leaves {
        if !old.leaves.contains_key(hash) {
            diffs.insert(
                hash.clone(),
                LeafDiff {
                    diff_type: DiffType::Added,
                    leaf: leaf.clone(),
                },
            );
            summary.added += 1;
        }
    }
    for (hash, leaf) in &old.leaves {
        if !new.leaves.contains_key(hash) {
            diffs.insert(
                hash.clone(),
                LeafDiff {
                    diff_type: DiffType::Removed,
                    leaf: leaf.clone(),
                },
            );
            summary.removed += 1;
        }
    }
    summary.total = summary.added + summary.removed;

    tracing::debug!(
        "Diff {} -> {}: {} added, {} removed",
        old.root,
        new.root,
        summary.added,
        summary.removed
    );
    DagDiff { diffs, summary }
}

/// Rebuild the new DAG from the old one plus a diff
///
/// The new root is the single added leaf that no pooled leaf links to and
/// that carries a positive `LeafCount`. An empty diff returns `old` as is.
pub fn apply_diff_to_dag(diff: &DagDiff, old: &Dag) -> Result<Dag, DagError> {
    if diff.is_empty() {
        return Ok(old.clone());
    }

    let added = diff.get_added_leaves();
    let mut pool: BTreeMap<&str, &Leaf> = old.leaves.iter().map(|(h, l)| (h.as_str(), l)).collect();
    pool.extend(added.iter().map(|(h, l)| (*h, *l)));

    let referenced: HashSet<&str> = pool
        .values()
        .flat_map(|leaf| leaf.links.iter().map(String::as_str))
        .collect();
    let candidates: Vec<&str> = added
        .iter()
        .filter(|(hash, leaf)| !referenced.contains(*hash) && leaf.leaf_count.is_some_and(|n| n > 0))
        .map(|(hash, _)| *hash)
        .collect();

    let root = match candidates.as_slice() {
        [root] => *root,
        [] => return Err(DagError::AmbiguousRoot("no added leaf qualifies as root".to_string())),
        many => {
            return Err(DagError::AmbiguousRoot(format!(
                "{} added leaves qualify as root",
                many.len()
            )))
        }
    };

    let mut leaves = BTreeMap::new();
    let mut queue = VecDeque::from([root]);
    while let Some(hash) = queue.pop_front() {
        if leaves.contains_key(hash) {
            continue;
        }
        let Some(leaf) = pool.get(hash) else {
            continue;
        };
        queue.extend(leaf.links.iter().map(String::as_str));
        leaves.insert(hash.to_string(), (*leaf).clone());
    }

    tracing::info!("Applied diff: {} -> {} ({} leaves)", old.root, root, leaves.len());
    Ok(Dag {
        root: root.to_string(),
        leaves,
        labels: None,
        label_index: HashMap::new(),
        proofs: BTreeMap::new(),
    })
}

impl Dag {
    /// Diff from `self` (old) to `other` (new)
    pub fn diff(&self, other: &Dag) -> DagDiff {
        diff(self, other)
    }

    /// Apply a diff computed against `self`
    pub fn apply_diff(&self, diff: &DagDiff) -> Result<Dag, DagError> {
        apply_diff_to_dag(diff, self)
    }
}
