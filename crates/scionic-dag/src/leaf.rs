//! Leaf construction and per-leaf checks
//!
//! Building a leaf:
//! 1. order links (sorted for directories, as given for files)
//! 2. compute the classic merkle root over SHA256(link string) per link
//! 3. hash attached content
//! 4. encode the canonical record and derive the CID

use std::collections::BTreeMap;

use crate::codec::{encode_and_cid, encode_canonical_leaf, encode_canonical_root, CodecError};
use crate::cid::cid_for_bytes;
use crate::dag::DagError;
use crate::hash::{self, link_hash, sha256};
use crate::merkle::{verify_proof, MerkleError, MerkleTree};
use crate::types::{ClassicTreeBranch, Hash, Leaf, LeafType, RootStats};

/// Classic merkle root over an ordered link list
///
/// None for no links, SHA256(link) for a single link, the tree root otherwise.
pub fn classic_merkle_root(links: &[String]) -> Result<Option<Hash>, MerkleError> {
    match links {
        [] => Ok(None),
        [single] => Ok(Some(link_hash(single))),
        _ => Ok(Some(link_tree(links)?.root())),
    }
}

fn link_tree(links: &[String]) -> Result<MerkleTree, MerkleError> {
    MerkleTree::new(links.iter().map(|l| link_hash(l)).collect())
}

/// Builder for a single leaf
#[derive(Debug, Clone, Default)]
pub struct LeafBuilder {
    item_name: String,
    leaf_type: Option<LeafType>,
    data: Option<Vec<u8>>,
    links: Vec<String>,
    additional_data: BTreeMap<String, String>,
}

impl LeafBuilder {
    pub fn new(item_name: impl Into<String>) -> Self {
        Self {
            item_name: item_name.into(),
            ..Default::default()
        }
    }

    pub fn set_type(mut self, leaf_type: LeafType) -> Self {
        self.leaf_type = Some(leaf_type);
        self
    }

    pub fn set_data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn add_link(mut self, hash: impl Into<String>) -> Self {
        self.links.push(hash.into());
        self
    }

    pub fn with_links(mut self, links: impl IntoIterator<Item = String>) -> Self {
        self.links.extend(links);
        self
    }

    pub fn add_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_data.insert(key.into(), value.into());
        self
    }

    pub fn with_additional_data(mut self, data: BTreeMap<String, String>) -> Self {
        self.additional_data.extend(data);
        self
    }

    /// Assemble the leaf fields without hashing
    fn assemble(self) -> Result<Leaf, DagError> {
        let leaf_type = self
            .leaf_type
            .ok_or_else(|| CodecError::MissingType(self.item_name.clone()))?;

        let mut links = self.links;
        if leaf_type == LeafType::Directory {
            links.sort();
        }

        let classic_merkle_root = classic_merkle_root(&links)?;
        let content_hash = self.data.as_deref().map(sha256);

        Ok(Leaf {
            hash: String::new(),
            item_name: self.item_name,
            leaf_type,
            content_hash,
            content: self.data,
            classic_merkle_root,
            current_link_count: links.len(),
            leaf_count: None,
            content_size: None,
            dag_size: None,
            links,
            additional_data: self.additional_data,
        })
    }

    /// Build a non-root leaf
    pub fn build(self) -> Result<Leaf, DagError> {
        let mut leaf = self.assemble()?;
        let (_, cid) = encode_and_cid(&leaf)?;
        leaf.hash = cid;
        Ok(leaf)
    }

    /// Build a root leaf given the summed canonical size of all other leaves
    pub fn build_root(
        self,
        leaf_count: u64,
        content_size: u64,
        children_size: u64,
    ) -> Result<Leaf, DagError> {
        finalize_root(self.assemble()?, leaf_count, content_size, children_size)
    }
}

/// Turn a built leaf into the DAG root
///
/// DagSize is computed in two passes: encode the root record with DagSize
/// zero to learn its own length, add the children's size, then encode
/// again with the real value. The second encoding is the one hashed.
pub fn finalize_root(
    mut leaf: Leaf,
    leaf_count: u64,
    content_size: u64,
    children_size: u64,
) -> Result<Leaf, DagError> {
    let mut stats = RootStats {
        leaf_count,
        content_size,
        dag_size: 0,
    };
    let own_size = encode_canonical_root(&leaf, stats)?.len() as u64;
    stats.dag_size = children_size + own_size;

    let data = encode_canonical_root(&leaf, stats)?;
    leaf.hash = cid_for_bytes(&data).map_err(CodecError::from)?;
    leaf.leaf_count = Some(stats.leaf_count);
    leaf.content_size = Some(stats.content_size);
    leaf.dag_size = Some(stats.dag_size);

    tracing::debug!(
        "Finalized root {} (leaves={}, content={}, dag={})",
        leaf.hash,
        stats.leaf_count,
        stats.content_size,
        stats.dag_size
    );
    Ok(leaf)
}

/// Length of a leaf's non-root canonical record, as summed into DagSize
pub fn canonical_size(leaf: &Leaf) -> Result<u64, DagError> {
    Ok(encode_canonical_leaf(leaf)?.len() as u64)
}

impl Leaf {
    /// Recompute the CID from the hashed fields as they are now
    pub fn compute_hash(&self) -> Result<String, DagError> {
        Ok(encode_and_cid(self)?.1)
    }

    /// Whether the stored hash matches the hashed fields
    pub fn verify_hash(&self) -> Result<bool, DagError> {
        Ok(self.compute_hash()? == self.hash)
    }

    /// Whether the stored content matches the content hash
    ///
    /// Leaves without content (or without a content hash) pass.
    pub fn verify_content(&self) -> bool {
        match (&self.content, &self.content_hash) {
            (Some(content), Some(expected)) => hash::verify(expected, content),
            _ => true,
        }
    }

    /// Classic merkle tree over this leaf's links, in stored order
    pub fn classic_merkle_tree(&self) -> Result<Option<MerkleTree>, DagError> {
        if self.links.is_empty() {
            return Ok(None);
        }
        Ok(Some(link_tree(&self.links)?))
    }

    /// Recompute the classic merkle root from the links as stored
    pub fn recompute_merkle_root(&self) -> Result<Option<Hash>, DagError> {
        Ok(classic_merkle_root(&self.links)?)
    }

    /// Inclusion proof of `child` against this leaf's classic merkle root
    pub fn branch_for(&self, child: &str) -> Result<ClassicTreeBranch, DagError> {
        let index = self
            .links
            .iter()
            .position(|l| l == child)
            .ok_or_else(|| DagError::NotFound(format!("link {} in leaf {}", child, self.hash)))?;
        let tree = link_tree(&self.links)?;
        Ok(ClassicTreeBranch {
            leaf: child.to_string(),
            proof: tree.proof(index)?,
        })
    }

    /// Check a branch against this leaf's classic merkle root
    pub fn verify_branch(&self, branch: &ClassicTreeBranch) -> bool {
        match &self.classic_merkle_root {
            Some(root) => verify_proof(&link_hash(&branch.leaf), &branch.proof, root),
            None => false,
        }
    }
}
