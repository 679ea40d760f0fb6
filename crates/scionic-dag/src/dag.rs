//! The DAG container: a root hash plus an arena of leaves keyed by hash
//!
//! Leaves are immutable values. Anything that changes a hashed field builds
//! a new leaf with a new hash; the only mutable side state is the label map
//! and the per-parent proof side-table.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::{decode_dag_cbor, decode_dag_json, encode_dag_cbor, encode_dag_json, CodecError};
use crate::merkle::MerkleError;
use crate::types::{ClassicTreeBranch, Leaf};

/// Crate-wide error type
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    #[error("Encoding error: {0}")]
    Encoding(#[from] CodecError),
    #[error("Empty input: {0}")]
    EmptyInput(String),
    #[error("Index {index} out of range for {leaf_count} leaves")]
    IndexOutOfRange { index: usize, leaf_count: usize },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Integrity error in leaf {hash}: {reason}")]
    Integrity { hash: String, reason: String },
    #[error("Missing proof for {child} under parent {parent}")]
    MissingProof { parent: String, child: String },
    #[error("Invalid proof for {child} under parent {parent}")]
    InvalidProof { parent: String, child: String },
    #[error("Cannot identify new root: {0}")]
    AmbiguousRoot(String),
    #[error("Labels have not been calculated")]
    LabelsNotCalculated,
    #[error("Invalid label range {start}..={end} ({count} labels assigned)")]
    InvalidLabelRange { start: u64, end: u64, count: u64 },
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DagError {
    pub(crate) fn integrity(hash: &str, reason: impl Into<String>) -> Self {
        DagError::Integrity {
            hash: hash.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        DagError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<MerkleError> for DagError {
    fn from(e: MerkleError) -> Self {
        match e {
            MerkleError::EmptyInput => DagError::EmptyInput("merkle tree leaves".to_string()),
            MerkleError::IndexOutOfRange { index, leaf_count } => {
                DagError::IndexOutOfRange { index, leaf_count }
            }
        }
    }
}

/// A Scionic Merkle DAG
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dag {
    /// Hash of the root leaf
    pub root: String,
    /// Arena of leaves by hash
    pub leaves: BTreeMap<String, Leaf>,
    /// Decimal label -> hash; the root is implicitly "0" and never stored
    pub labels: Option<BTreeMap<String, String>>,
    /// Hash -> label, rebuilt whenever `labels` is assigned
    pub(crate) label_index: HashMap<String, String>,
    /// Parent hash -> child hash -> branch against the parent's classic merkle root
    pub proofs: BTreeMap<String, BTreeMap<String, ClassicTreeBranch>>,
}

impl Dag {
    /// Empty DAG, e.g. a receiver waiting for transmission packets
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a DAG from a root hash and its leaves
    pub fn from_leaves(root: impl Into<String>, leaves: impl IntoIterator<Item = Leaf>) -> Self {
        Self {
            root: root.into(),
            leaves: leaves.into_iter().map(|l| (l.hash.clone(), l)).collect(),
            labels: None,
            label_index: HashMap::new(),
            proofs: BTreeMap::new(),
        }
    }

    /// Look up a leaf by hash
    pub fn get_leaf(&self, hash: &str) -> Option<&Leaf> {
        self.leaves.get(hash)
    }

    /// Look up a leaf by hash, failing with `NotFound`
    pub fn leaf(&self, hash: &str) -> Result<&Leaf, DagError> {
        self.leaves
            .get(hash)
            .ok_or_else(|| DagError::NotFound(format!("leaf {}", hash)))
    }

    /// The root leaf
    pub fn root_leaf(&self) -> Result<&Leaf, DagError> {
        self.leaves
            .get(&self.root)
            .ok_or_else(|| DagError::NotFound(format!("root leaf {}", self.root)))
    }

    /// Number of leaves held locally
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Stored proofs for the children of `parent`
    pub fn stored_proofs(&self, parent: &str) -> Option<&BTreeMap<String, ClassicTreeBranch>> {
        self.proofs.get(parent)
    }

    /// Serialize to CBOR (the save-file format)
    pub fn to_cbor(&self) -> Result<Vec<u8>, DagError> {
        Ok(encode_dag_cbor(self)?)
    }

    pub fn from_cbor(data: &[u8]) -> Result<Self, DagError> {
        Ok(decode_dag_cbor(data)?)
    }

    /// Serialize to JSON with byte fields as integer arrays
    pub fn to_json(&self) -> Result<String, DagError> {
        Ok(encode_dag_json(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, DagError> {
        Ok(decode_dag_json(json)?)
    }

    /// Write the CBOR container to `path`
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), DagError> {
        let path = path.as_ref();
        let data = self.to_cbor()?;
        fs::write(path, &data).map_err(|e| DagError::io(path, e))?;
        tracing::debug!("Saved DAG {} ({} bytes) to {}", self.root, data.len(), path.display());
        Ok(())
    }

    /// Read a CBOR container from `path`
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, DagError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| DagError::io(path, e))?;
        Self::from_cbor(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_root_leaf() {
        let dag = Dag::new();
        assert!(matches!(dag.root_leaf(), Err(DagError::NotFound(_))));
        assert!(dag.is_empty());
    }

    #[test]
    fn test_merkle_error_conversion() {
        let err: DagError = MerkleError::IndexOutOfRange { index: 4, leaf_count: 2 }.into();
        assert!(matches!(err, DagError::IndexOutOfRange { index: 4, leaf_count: 2 }));
        let err: DagError = MerkleError::EmptyInput.into();
        assert!(matches!(err, DagError::EmptyInput(_)));
    }

    #[test]
    fn test_integrity_message_names_hash() {
        let err = DagError::integrity("bafyfoo", "content hash mismatch");
        assert!(err.to_string().contains("bafyfoo"));
        assert!(err.to_string().contains("content hash mismatch"));
    }
}
