//! Scionic Merkle DAG - core value types
//!
//! Core principle: every leaf is named by CID(SHA256(cbor(canonical record)))
//! and links to its children by their CID strings. A leaf with children also
//! carries the root of a classic binary merkle tree over those links so a
//! single child can be proven without shipping its siblings.

use std::collections::BTreeMap;

/// 32-byte SHA256 digest
pub type Hash = [u8; 32];

/// Convert hash to hex string
pub fn to_hex(hash: &Hash) -> String {
    hex::encode(hash)
}

/// Convert hex string to hash
pub fn from_hex(hex_str: &str) -> Result<Hash, hex::FromHexError> {
    let bytes = hex::decode(hex_str)?;
    if bytes.len() != 32 {
        return Err(hex::FromHexError::InvalidStringLength);
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes);
    Ok(hash)
}

/// Leaf type - part of the hashed record, encoded as a lowercase string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LeafType {
    /// A whole file, or the parent of a chunked file's chunks
    File,
    /// One fixed-size slice of a chunked file
    Chunk,
    /// A directory; links are kept sorted
    Directory,
}

impl LeafType {
    /// Wire string used in both the canonical record and storage format
    pub fn as_str(&self) -> &'static str {
        match self {
            LeafType::File => "file",
            LeafType::Chunk => "chunk",
            LeafType::Directory => "directory",
        }
    }

    /// Parse from the wire string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(LeafType::File),
            "chunk" => Some(LeafType::Chunk),
            "directory" => Some(LeafType::Directory),
            _ => None,
        }
    }

    /// Whether leaves of this type carry raw content bytes
    pub fn carries_content(&self) -> bool {
        matches!(self, LeafType::File | LeafType::Chunk)
    }
}

impl std::fmt::Display for LeafType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusion proof in a classic merkle tree
///
/// Bit `i` of `path` set means the running node was the LEFT child when
/// `siblings[i]` was applied (sibling on the right).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MerkleProof {
    pub siblings: Vec<Hash>,
    pub path: u64,
}

/// A child hash together with its proof against the parent's classic merkle root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassicTreeBranch {
    /// CID of the child leaf this branch proves
    pub leaf: String,
    pub proof: MerkleProof,
}

/// Aggregate statistics carried only by the DAG root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RootStats {
    /// Total number of leaves including the root
    pub leaf_count: u64,
    /// Sum of raw content bytes over all file and chunk leaves
    pub content_size: u64,
    /// Sum of canonical encoding sizes over all leaves
    pub dag_size: u64,
}

/// A single node in the DAG
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    /// CID of this leaf's canonical record
    pub hash: String,
    pub item_name: String,
    pub leaf_type: LeafType,
    /// SHA256 of `content`; present iff the leaf was built with content
    pub content_hash: Option<Hash>,
    /// Raw content; may be dropped from in-memory copies that don't need it
    pub content: Option<Vec<u8>>,
    pub classic_merkle_root: Option<Hash>,
    pub current_link_count: usize,
    /// Root-only aggregate statistics
    pub leaf_count: Option<u64>,
    pub content_size: Option<u64>,
    pub dag_size: Option<u64>,
    /// Child CIDs: sorted for directories, chunk order for files
    pub links: Vec<String>,
    pub additional_data: BTreeMap<String, String>,
}

impl Leaf {
    /// Whether this leaf carries the root-only statistics
    pub fn is_root(&self) -> bool {
        self.leaf_count.is_some()
    }

    /// Root statistics, if this is a root leaf
    pub fn root_stats(&self) -> Option<RootStats> {
        self.leaf_count.map(|leaf_count| RootStats {
            leaf_count,
            content_size: self.content_size.unwrap_or(0),
            dag_size: self.dag_size.unwrap_or(0),
        })
    }

    /// Check if `hash` is one of this leaf's links
    pub fn has_link(&self, hash: &str) -> bool {
        self.links.iter().any(|l| l == hash)
    }

    /// Copy of this leaf without its raw content (hash fields untouched)
    pub fn without_content(&self) -> Self {
        Self {
            content: None,
            ..self.clone()
        }
    }
}

/// One unit of incremental transfer: a leaf, the parent it hangs under and
/// any proof needed to check it against that parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmissionPacket {
    pub leaf: Leaf,
    /// Empty for the root packet
    pub parent_hash: String,
    /// Child hash -> branch against the parent's classic merkle root
    pub proofs: BTreeMap<String, ClassicTreeBranch>,
}

impl TransmissionPacket {
    /// Whether this packet carries the DAG root
    pub fn is_root(&self) -> bool {
        self.parent_hash.is_empty()
    }
}
