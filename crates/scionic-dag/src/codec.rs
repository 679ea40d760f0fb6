//! CBOR encoding for leaves and DAG containers
//!
//! Two formats live here:
//!
//! **Canonical record** - the bytes a leaf's CID is computed from. Field set,
//! field order and empty/null conventions are fixed and must match every
//! other implementation bit for bit:
//!
//! ```text
//! ItemName, Type, MerkleRoot, CurrentLinkCount,
//!     [LeafCount, ContentSize, DagSize]   (root only)
//! ContentHash, AdditionalData
//! ```
//!
//! - `MerkleRoot` is an empty byte string when the leaf has no links
//! - `ContentHash` is CBOR null (not an empty byte string) without content
//! - `AdditionalData` is an array of `{Key, Value}` maps sorted by key, an
//!   empty array when there is no metadata
//! - byte fields are CBOR byte strings, never arrays of integers
//!
//! **Storage format** - the save file / wire container. Carries the
//! non-hashed convenience fields (`Hash`, `Content`, `Proofs`) too, and
//! round-trips through JSON with byte fields as integer arrays.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_bytes::{ByteBuf, Bytes};

use crate::cid::{cid_for_bytes, parse_cid, CidError};
use crate::dag::Dag;
use crate::labels::invert_labels;
use crate::types::{ClassicTreeBranch, Hash, Leaf, LeafType, MerkleProof, RootStats, TransmissionPacket};

/// Error type for codec operations
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Leaf {0:?} has no type set")]
    MissingType(String),
    #[error("CBOR encoding error: {0}")]
    CborEncode(String),
    #[error("CBOR decoding error: {0}")]
    CborDecode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid {field} length in leaf {hash}: expected 32, got {len}")]
    InvalidHashLength {
        hash: String,
        field: &'static str,
        len: usize,
    },
    #[error("Unknown leaf type {value:?} in leaf {hash}")]
    InvalidLeafType { hash: String, value: String },
    #[error("CID error: {0}")]
    Cid(#[from] CidError),
}

// ============================================================================
// Canonical record
// ============================================================================

#[derive(Serialize)]
struct KeyValue<'a> {
    #[serde(rename = "Key")]
    key: &'a str,
    #[serde(rename = "Value")]
    value: &'a str,
}

#[derive(Serialize)]
struct CanonicalLeaf<'a> {
    #[serde(rename = "ItemName")]
    item_name: &'a str,
    #[serde(rename = "Type")]
    leaf_type: &'static str,
    #[serde(rename = "MerkleRoot")]
    merkle_root: &'a Bytes,
    #[serde(rename = "CurrentLinkCount")]
    current_link_count: u64,
    #[serde(rename = "ContentHash")]
    content_hash: Option<&'a Bytes>,
    #[serde(rename = "AdditionalData")]
    additional_data: Vec<KeyValue<'a>>,
}

/// Root variant: the three statistics sit between CurrentLinkCount and ContentHash
#[derive(Serialize)]
struct CanonicalRootLeaf<'a> {
    #[serde(rename = "ItemName")]
    item_name: &'a str,
    #[serde(rename = "Type")]
    leaf_type: &'static str,
    #[serde(rename = "MerkleRoot")]
    merkle_root: &'a Bytes,
    #[serde(rename = "CurrentLinkCount")]
    current_link_count: u64,
    #[serde(rename = "LeafCount")]
    leaf_count: u64,
    #[serde(rename = "ContentSize")]
    content_size: u64,
    #[serde(rename = "DagSize")]
    dag_size: u64,
    #[serde(rename = "ContentHash")]
    content_hash: Option<&'a Bytes>,
    #[serde(rename = "AdditionalData")]
    additional_data: Vec<KeyValue<'a>>,
}

/// BTreeMap iterates in key order, which is exactly the order hashed
fn sorted_pairs(data: &BTreeMap<String, String>) -> Vec<KeyValue<'_>> {
    data.iter()
        .map(|(key, value)| KeyValue { key, value })
        .collect()
}

fn merkle_root_bytes(root: &Option<Hash>) -> &Bytes {
    match root {
        Some(root) => Bytes::new(root),
        None => Bytes::new(&[]),
    }
}

/// Encode the non-root canonical record of a leaf (root statistics ignored)
pub fn encode_canonical_leaf(leaf: &Leaf) -> Result<Vec<u8>, CodecError> {
    let record = CanonicalLeaf {
        item_name: &leaf.item_name,
        leaf_type: leaf.leaf_type.as_str(),
        merkle_root: merkle_root_bytes(&leaf.classic_merkle_root),
        current_link_count: leaf.current_link_count as u64,
        content_hash: leaf.content_hash.as_ref().map(|h| Bytes::new(h)),
        additional_data: sorted_pairs(&leaf.additional_data),
    };
    to_cbor(&record)
}

/// Encode the root canonical record of a leaf with the given statistics
pub fn encode_canonical_root(leaf: &Leaf, stats: RootStats) -> Result<Vec<u8>, CodecError> {
    let record = CanonicalRootLeaf {
        item_name: &leaf.item_name,
        leaf_type: leaf.leaf_type.as_str(),
        merkle_root: merkle_root_bytes(&leaf.classic_merkle_root),
        current_link_count: leaf.current_link_count as u64,
        leaf_count: stats.leaf_count,
        content_size: stats.content_size,
        dag_size: stats.dag_size,
        content_hash: leaf.content_hash.as_ref().map(|h| Bytes::new(h)),
        additional_data: sorted_pairs(&leaf.additional_data),
    };
    to_cbor(&record)
}

/// Encode the record a leaf's hash is derived from: the root form when the
/// leaf carries root statistics, the plain form otherwise
pub fn encode_canonical(leaf: &Leaf) -> Result<Vec<u8>, CodecError> {
    match leaf.root_stats() {
        Some(stats) => encode_canonical_root(leaf, stats),
        None => encode_canonical_leaf(leaf),
    }
}

/// Encode a leaf's canonical record and derive its CID
pub fn encode_and_cid(leaf: &Leaf) -> Result<(Vec<u8>, String), CodecError> {
    let data = encode_canonical(leaf)?;
    let cid = cid_for_bytes(&data)?;
    Ok((data, cid))
}

// ============================================================================
// Storage format
// ============================================================================

/// Helper module for optional bytes serialization
mod option_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match data {
            Some(bytes) => serde_bytes::serialize(bytes, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<serde_bytes::ByteBuf>::deserialize(deserializer)
            .map(|opt| opt.map(|bb| bb.into_vec()))
    }
}

#[derive(Serialize, Deserialize)]
struct WireProof {
    #[serde(rename = "Siblings")]
    siblings: Vec<ByteBuf>,
    #[serde(rename = "Path")]
    path: u64,
}

#[derive(Serialize, Deserialize)]
struct WireBranch {
    #[serde(rename = "Leaf")]
    leaf: String,
    #[serde(rename = "Proof")]
    proof: WireProof,
}

impl WireBranch {
    fn from_branch(branch: &ClassicTreeBranch) -> Self {
        Self {
            leaf: branch.leaf.clone(),
            proof: WireProof {
                siblings: branch
                    .proof
                    .siblings
                    .iter()
                    .map(|s| ByteBuf::from(s.to_vec()))
                    .collect(),
                path: branch.proof.path,
            },
        }
    }

    fn into_branch(self, owner: &str) -> Result<ClassicTreeBranch, CodecError> {
        let siblings = self
            .proof
            .siblings
            .into_iter()
            .map(|s| to_hash(owner, "Proof sibling", s.into_vec()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ClassicTreeBranch {
            leaf: self.leaf,
            proof: MerkleProof {
                siblings,
                path: self.proof.path,
            },
        })
    }
}

#[derive(Serialize, Deserialize)]
struct WireLeaf {
    #[serde(rename = "Hash")]
    hash: String,
    #[serde(rename = "ItemName")]
    item_name: String,
    #[serde(rename = "Type")]
    leaf_type: String,
    #[serde(
        rename = "ContentHash",
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_bytes"
    )]
    content_hash: Option<Vec<u8>>,
    #[serde(
        rename = "Content",
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_bytes"
    )]
    content: Option<Vec<u8>>,
    #[serde(
        rename = "ClassicMerkleRoot",
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_bytes"
    )]
    classic_merkle_root: Option<Vec<u8>>,
    #[serde(rename = "CurrentLinkCount")]
    current_link_count: u64,
    #[serde(rename = "LeafCount", default, skip_serializing_if = "Option::is_none")]
    leaf_count: Option<u64>,
    #[serde(rename = "ContentSize", default, skip_serializing_if = "Option::is_none")]
    content_size: Option<u64>,
    #[serde(rename = "DagSize", default, skip_serializing_if = "Option::is_none")]
    dag_size: Option<u64>,
    #[serde(rename = "Links", default)]
    links: Vec<String>,
    #[serde(rename = "AdditionalData", default, skip_serializing_if = "BTreeMap::is_empty")]
    additional_data: BTreeMap<String, String>,
    #[serde(rename = "Proofs", default, skip_serializing_if = "BTreeMap::is_empty")]
    proofs: BTreeMap<String, WireBranch>,
}

fn to_hash(owner: &str, field: &'static str, bytes: Vec<u8>) -> Result<Hash, CodecError> {
    Hash::try_from(bytes.as_slice()).map_err(|_| CodecError::InvalidHashLength {
        hash: owner.to_string(),
        field,
        len: bytes.len(),
    })
}

impl WireLeaf {
    fn from_leaf(leaf: &Leaf, proofs: Option<&BTreeMap<String, ClassicTreeBranch>>) -> Self {
        Self {
            hash: leaf.hash.clone(),
            item_name: leaf.item_name.clone(),
            leaf_type: leaf.leaf_type.as_str().to_string(),
            content_hash: leaf.content_hash.map(|h| h.to_vec()),
            content: leaf.content.clone(),
            classic_merkle_root: leaf.classic_merkle_root.map(|h| h.to_vec()),
            current_link_count: leaf.current_link_count as u64,
            leaf_count: leaf.leaf_count,
            content_size: leaf.content_size,
            dag_size: leaf.dag_size,
            links: leaf.links.clone(),
            additional_data: leaf.additional_data.clone(),
            proofs: proofs
                .map(|p| {
                    p.iter()
                        .map(|(child, branch)| (child.clone(), WireBranch::from_branch(branch)))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    fn into_leaf(self) -> Result<(Leaf, BTreeMap<String, ClassicTreeBranch>), CodecError> {
        let leaf_type = LeafType::parse(&self.leaf_type).ok_or_else(|| CodecError::InvalidLeafType {
            hash: self.hash.clone(),
            value: self.leaf_type.clone(),
        })?;
        let content_hash = self
            .content_hash
            .map(|b| to_hash(&self.hash, "ContentHash", b))
            .transpose()?;
        let classic_merkle_root = self
            .classic_merkle_root
            .map(|b| to_hash(&self.hash, "ClassicMerkleRoot", b))
            .transpose()?;

        parse_cid(&self.hash)?;
        for link in &self.links {
            parse_cid(link)?;
        }

        let mut proofs = BTreeMap::new();
        for (child, branch) in self.proofs {
            proofs.insert(child, branch.into_branch(&self.hash)?);
        }

        let leaf = Leaf {
            hash: self.hash,
            item_name: self.item_name,
            leaf_type,
            content_hash,
            content: self.content,
            classic_merkle_root,
            current_link_count: self.current_link_count as usize,
            leaf_count: self.leaf_count,
            content_size: self.content_size,
            dag_size: self.dag_size,
            links: self.links,
            additional_data: self.additional_data,
        };
        Ok((leaf, proofs))
    }
}

#[derive(Serialize, Deserialize)]
struct WireDag {
    #[serde(rename = "Root")]
    root: String,
    #[serde(rename = "Leafs")]
    leafs: BTreeMap<String, WireLeaf>,
    #[serde(rename = "Labels", default, skip_serializing_if = "Option::is_none")]
    labels: Option<BTreeMap<String, String>>,
}

impl WireDag {
    fn from_dag(dag: &Dag) -> Self {
        Self {
            root: dag.root.clone(),
            leafs: dag
                .leaves
                .iter()
                .map(|(hash, leaf)| (hash.clone(), WireLeaf::from_leaf(leaf, dag.proofs.get(hash))))
                .collect(),
            labels: dag.labels.clone(),
        }
    }

    fn into_dag(self) -> Result<Dag, CodecError> {
        let mut leaves = BTreeMap::new();
        let mut proofs = BTreeMap::new();
        for (hash, wire) in self.leafs {
            let (leaf, leaf_proofs) = wire.into_leaf()?;
            if !leaf_proofs.is_empty() {
                proofs.insert(hash.clone(), leaf_proofs);
            }
            leaves.insert(hash, leaf);
        }
        // An empty receiver has no root yet
        if !(self.root.is_empty() && leaves.is_empty()) {
            parse_cid(&self.root)?;
        }
        Ok(Dag {
            root: self.root,
            leaves,
            label_index: self.labels.as_ref().map(invert_labels).unwrap_or_default(),
            labels: self.labels,
            proofs,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct WirePacket {
    #[serde(rename = "Leaf")]
    leaf: WireLeaf,
    #[serde(rename = "ParentHash")]
    parent_hash: String,
    #[serde(rename = "Proofs", default, skip_serializing_if = "BTreeMap::is_empty")]
    proofs: BTreeMap<String, WireBranch>,
}

fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf).map_err(|e| CodecError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn from_cbor<T: DeserializeOwned>(data: &[u8]) -> Result<T, CodecError> {
    ciborium::de::from_reader(data).map_err(|e| CodecError::CborDecode(e.to_string()))
}

/// Encode a DAG container to CBOR (the save-file format)
pub fn encode_dag_cbor(dag: &Dag) -> Result<Vec<u8>, CodecError> {
    to_cbor(&WireDag::from_dag(dag))
}

/// Decode a DAG container from CBOR
pub fn decode_dag_cbor(data: &[u8]) -> Result<Dag, CodecError> {
    from_cbor::<WireDag>(data)?.into_dag()
}

/// Encode a DAG container to JSON, byte fields as integer arrays
pub fn encode_dag_json(dag: &Dag) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&WireDag::from_dag(dag))?)
}

/// Decode a DAG container from JSON
pub fn decode_dag_json(json: &str) -> Result<Dag, CodecError> {
    serde_json::from_str::<WireDag>(json)?.into_dag()
}

/// Encode a transmission packet to CBOR
pub fn encode_packet_cbor(packet: &TransmissionPacket) -> Result<Vec<u8>, CodecError> {
    let wire = WirePacket {
        leaf: WireLeaf::from_leaf(&packet.leaf, None),
        parent_hash: packet.parent_hash.clone(),
        proofs: packet
            .proofs
            .iter()
            .map(|(child, branch)| (child.clone(), WireBranch::from_branch(branch)))
            .collect(),
    };
    to_cbor(&wire)
}

/// Decode a transmission packet from CBOR
pub fn decode_packet_cbor(data: &[u8]) -> Result<TransmissionPacket, CodecError> {
    let wire: WirePacket = from_cbor(data)?;
    let (leaf, _) = wire.leaf.into_leaf()?;
    if !wire.parent_hash.is_empty() {
        parse_cid(&wire.parent_hash)?;
    }
    let mut proofs = BTreeMap::new();
    for (child, branch) in wire.proofs {
        proofs.insert(child, branch.into_branch(&leaf.hash)?);
    }
    Ok(TransmissionPacket {
        leaf,
        parent_hash: wire.parent_hash,
        proofs,
    })
}
