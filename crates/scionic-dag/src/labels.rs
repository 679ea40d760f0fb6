//! Leaf labels for range-addressed sync
//!
//! Labels number the non-root leaves 1..=N in depth-first pre-order from
//! the root, following links in stored order. The root is always "0".

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::dag::{Dag, DagError};

/// Label of the root leaf
pub const ROOT_LABEL: &str = "0";

impl Dag {
    /// Assign labels to every reachable non-root leaf, replacing any existing map
    ///
    /// Returns the number of labels assigned. Links to leaves that are not
    /// held locally are skipped.
    pub fn calculate_labels(&mut self) -> u64 {
        let mut labels = BTreeMap::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![self.root.as_str()];
        let mut next = 0u64;

        while let Some(hash) = stack.pop() {
            if !visited.insert(hash) {
                continue;
            }
            let Some(leaf) = self.leaves.get(hash) else {
                continue;
            };

            if hash != self.root {
                next += 1;
                labels.insert(next.to_string(), hash.to_string());
            }
            stack.extend(leaf.links.iter().rev().map(String::as_str));
        }

        tracing::debug!("Assigned {} labels for DAG {}", next, self.root);
        self.label_index = invert_labels(&labels);
        self.labels = Some(labels);
        next
    }

    pub fn clear_labels(&mut self) {
        self.labels = None;
        self.label_index.clear();
    }

    /// Number of labels assigned, if labels have been calculated
    pub fn label_count(&self) -> Option<u64> {
        self.labels.as_ref().map(|l| l.len() as u64)
    }

    /// Hashes for labels `start..=end`, in label order
    pub fn get_hashes_by_label_range(&self, start: u64, end: u64) -> Result<Vec<String>, DagError> {
        let labels = self.labels.as_ref().ok_or(DagError::LabelsNotCalculated)?;
        let count = labels.len() as u64;
        if start < 1 || end < start || end > count {
            return Err(DagError::InvalidLabelRange { start, end, count });
        }

        (start..=end)
            .map(|label| {
                labels
                    .get(&label.to_string())
                    .cloned()
                    .ok_or_else(|| DagError::NotFound(format!("label {}", label)))
            })
            .collect()
    }

    /// Label of `hash`; "0" for the root
    pub fn get_label(&self, hash: &str) -> Result<String, DagError> {
        if hash == self.root {
            return Ok(ROOT_LABEL.to_string());
        }
        if self.labels.is_none() {
            return Err(DagError::LabelsNotCalculated);
        }
        self.label_index
            .get(hash)
            .cloned()
            .ok_or_else(|| DagError::NotFound(format!("label for {}", hash)))
    }

    /// Hash carrying `label`; "0" is the root
    pub fn get_hash_by_label(&self, label: &str) -> Result<String, DagError> {
        if label == ROOT_LABEL {
            return Ok(self.root.clone());
        }
        let labels = self.labels.as_ref().ok_or(DagError::LabelsNotCalculated)?;
        labels
            .get(label)
            .cloned()
            .ok_or_else(|| DagError::NotFound(format!("hash for label {}", label)))
    }
}

/// Hash -> label view of a label map
pub(crate) fn invert_labels(labels: &BTreeMap<String, String>) -> HashMap<String, String> {
    labels
        .iter()
        .map(|(label, hash)| (hash.clone(), label.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuilderConfig, DagBuilder};
    use crate::source::SourceEntry;

    fn sample_dag() -> Dag {
        DagBuilder::new(BuilderConfig::new().with_chunk_size(2))
            .build(&SourceEntry::directory(
                "root",
                vec![
                    SourceEntry::file("a", b"abcde".to_vec()),
                    SourceEntry::directory("d", vec![SourceEntry::file("b", b"b".to_vec())]),
                    SourceEntry::file("c", b"c".to_vec()),
                ],
            ))
            .unwrap()
    }

    #[test]
    fn test_labels_cover_every_non_root_leaf() {
        let mut dag = sample_dag();
        let count = dag.calculate_labels();

        assert_eq!(count, dag.len() as u64 - 1);
        let labels = dag.labels.as_ref().unwrap();
        for n in 1..=count {
            assert!(labels.contains_key(&n.to_string()));
        }
        assert!(!labels.values().any(|h| *h == dag.root));
    }

    #[test]
    fn test_labels_are_preorder() {
        let mut dag = sample_dag();
        dag.calculate_labels();

        let root = dag.root_leaf().unwrap().clone();
        // First root link is labelled 1, its own first link (if any) is 2
        assert_eq!(dag.get_hash_by_label("1").unwrap(), root.links[0]);
        let first = dag.leaf(&root.links[0]).unwrap().clone();
        if let Some(grandchild) = first.links.first() {
            assert_eq!(dag.get_label(grandchild).unwrap(), "2");
        }
    }

    #[test]
    fn test_labels_idempotent() {
        let mut dag = sample_dag();
        dag.calculate_labels();
        let first = dag.labels.clone();
        dag.calculate_labels();
        assert_eq!(dag.labels, first);
    }

    #[test]
    fn test_root_label() {
        let dag = sample_dag();
        assert_eq!(dag.get_label(&dag.root).unwrap(), ROOT_LABEL);
        assert_eq!(dag.get_hash_by_label(ROOT_LABEL).unwrap(), dag.root);
    }

    #[test]
    fn test_range_queries() {
        let mut dag = sample_dag();
        assert!(matches!(
            dag.get_hashes_by_label_range(1, 1),
            Err(DagError::LabelsNotCalculated)
        ));

        let count = dag.calculate_labels();
        let all = dag.get_hashes_by_label_range(1, count).unwrap();
        assert_eq!(all.len() as u64, count);
        assert_eq!(all[0], dag.get_hash_by_label("1").unwrap());

        let some = dag.get_hashes_by_label_range(2, 3).unwrap();
        assert_eq!(some, all[1..3].to_vec());

        for (start, end) in [(0, 1), (3, 2), (1, count + 1)] {
            assert!(matches!(
                dag.get_hashes_by_label_range(start, end),
                Err(DagError::InvalidLabelRange { .. })
            ));
        }
    }

    #[test]
    fn test_clear_labels() {
        let mut dag = sample_dag();
        dag.calculate_labels();
        dag.clear_labels();
        assert_eq!(dag.label_count(), None);
        assert!(matches!(dag.get_hash_by_label("1"), Err(DagError::LabelsNotCalculated)));
    }

    #[test]
    fn test_label_and_hash_lookups_agree() {
        let mut dag = sample_dag();
        let count = dag.calculate_labels();
        for n in 1..=count {
            let label = n.to_string();
            let hash = dag.get_hash_by_label(&label).unwrap();
            assert_eq!(dag.get_label(&hash).unwrap(), label);
        }

        dag.clear_labels();
        let first = dag.root_leaf().unwrap().links[0].clone();
        assert!(matches!(dag.get_label(&first), Err(DagError::LabelsNotCalculated)));
    }

    #[test]
    fn test_labels_survive_json_roundtrip() {
        let mut dag = sample_dag();
        dag.calculate_labels();
        let decoded = Dag::from_json(&dag.to_json().unwrap()).unwrap();
        let hash = dag.get_hash_by_label("2").unwrap();
        assert_eq!(decoded.get_label(&hash).unwrap(), "2");
        assert_eq!(decoded, dag);
    }

    #[test]
    fn test_unknown_lookups() {
        let mut dag = sample_dag();
        dag.calculate_labels();
        assert!(matches!(dag.get_label("bafynothere"), Err(DagError::NotFound(_))));
        assert!(matches!(dag.get_hash_by_label("999"), Err(DagError::NotFound(_))));
    }
}
