//! Scionic Merkle DAG - content-addressed file trees with per-child proofs
//!
//! Files and directories become leaves named by CID:
//! CID(SHA256(cbor(canonical leaf record)))
//!
//! # Overview
//!
//! Every leaf links to its children by CID string. A leaf with children also
//! carries a classic binary merkle root over those links, so one child can
//! be proven against its parent without shipping the siblings. That makes
//! the DAG suitable for incremental transfer, partial extraction and
//! range-addressed sync.
//!
//! # Core Concepts
//!
//! - **Leaves**: `file`, `chunk` or `directory` records; large files are split into chunks
//! - **Root**: the one leaf carrying `LeafCount`, `ContentSize` and `DagSize`
//! - **Classic merkle root**: binary SHA256 tree over SHA256(child CID) per link
//! - **Labels**: depth-first numbering of non-root leaves for range queries
//! - **Transmission packets**: one leaf plus its parent and proof, sent root first
//!
//! # Example
//!
//! ```rust
//! use scionic_dag::{BuilderConfig, Dag, DagBuilder, SourceEntry};
//!
//! fn main() -> Result<(), scionic_dag::DagError> {
//!     let source = SourceEntry::directory(
//!         "docs",
//!         vec![
//!             SourceEntry::file("a.txt", b"hello".to_vec()),
//!             SourceEntry::file("b.txt", b"world".to_vec()),
//!         ],
//!     );
//!     let dag = DagBuilder::new(BuilderConfig::new()).build(&source)?;
//!     dag.verify()?;
//!
//!     // Replay into an empty receiver, checking every packet
//!     let mut receiver = Dag::new();
//!     for packet in dag.get_leaf_sequence()? {
//!         receiver.apply_and_verify_transmission_packet(packet)?;
//!     }
//!     assert_eq!(receiver.root, dag.root);
//!
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod cid;
pub mod codec;
pub mod dag;
pub mod diff;
pub mod hash;
pub mod labels;
pub mod leaf;
pub mod merkle;
pub mod partial;
pub mod reader;
pub mod source;
pub mod transmission;
pub mod types;
pub mod verify;

// Main API
pub use builder::{
    create_dag, create_dag_with_config, BuilderConfig, DagBuilder, DEFAULT_CHUNK_SIZE, TIMESTAMP_KEY,
};
pub use dag::{Dag, DagError};
pub use source::SourceEntry;
pub use verify::VerifyOptions;

// Leaves and proofs
pub use leaf::{canonical_size, classic_merkle_root, finalize_root, LeafBuilder};
pub use merkle::{merkle_hash_pair, verify_proof, MerkleError, MerkleTree};
pub use types::{
    from_hex, to_hex, ClassicTreeBranch, Hash, Leaf, LeafType, MerkleProof, RootStats,
    TransmissionPacket,
};

// Low-level codec
pub use crate::cid::{cid_for_bytes, cid_from_digest, parse_cid, CidError};
pub use codec::{encode_and_cid, encode_canonical, CodecError};
pub use hash::{link_hash, sha256};

pub use diff::{apply_diff_to_dag, diff, DagDiff, DiffSummary, DiffType, LeafDiff};
pub use labels::ROOT_LABEL;
