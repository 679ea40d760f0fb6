//! DAG builder with chunking
//!
//! - Files up to `chunk_size` become a single File leaf carrying content
//! - Larger files are split into Chunk leaves linked in chunk order
//! - Directories link their children sorted by hash
//! - The top entry is finalized as the root with aggregate statistics

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::dag::{Dag, DagError};
use crate::leaf::{canonical_size, finalize_root, LeafBuilder};
use crate::source::SourceEntry;
use crate::types::{Leaf, LeafType};

/// Default chunk size: 2MB
pub const DEFAULT_CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// Key used for the optional root timestamp
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Builder configuration
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub chunk_size: usize,
    /// Add an RFC 3339 `timestamp` to the root's additional data
    pub timestamp_root: bool,
    /// Extra metadata hashed into the root leaf
    pub additional_data: BTreeMap<String, String>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            timestamp_root: false,
            additional_data: BTreeMap::new(),
        }
    }
}

impl BuilderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_timestamp(mut self, timestamp_root: bool) -> Self {
        self.timestamp_root = timestamp_root;
        self
    }

    pub fn with_additional_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_data.insert(key.into(), value.into());
        self
    }
}

/// Build a DAG from a file or directory on disk
pub fn create_dag(path: impl AsRef<Path>, timestamp_root: bool) -> Result<Dag, DagError> {
    create_dag_with_config(path, BuilderConfig::new().with_timestamp(timestamp_root))
}

/// Build a DAG from a file or directory on disk with explicit config
pub fn create_dag_with_config(path: impl AsRef<Path>, config: BuilderConfig) -> Result<Dag, DagError> {
    let source = SourceEntry::from_path(path)?;
    DagBuilder::new(config).build(&source)
}

enum Step<'a> {
    Enter(&'a SourceEntry),
    CloseDirectory {
        entry: &'a SourceEntry,
        name: &'a str,
        children: usize,
    },
}

/// DagBuilder - turns a source tree into leaves, bottom-up
pub struct DagBuilder {
    config: BuilderConfig,
    leaves: BTreeMap<String, Leaf>,
}

impl DagBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        Self {
            config,
            leaves: BTreeMap::new(),
        }
    }

    /// Build the full DAG for `source`; the top entry becomes the root
    pub fn build(mut self, source: &SourceEntry) -> Result<Dag, DagError> {
        if self.config.chunk_size == 0 {
            return Err(DagError::InvalidConfig("chunk_size must be positive".to_string()));
        }

        // Post-order walk: children are finished before their directory and
        // their hashes sit on `finished` in entry order.
        let mut stack = vec![Step::Enter(source)];
        let mut finished: Vec<String> = Vec::new();
        let mut root_builder = None;

        while let Some(step) = stack.pop() {
            let (entry, builder) = match step {
                Step::Enter(entry) => match entry {
                    SourceEntry::File { name, data } => (entry, self.file_builder(name, data)?),
                    SourceEntry::Directory { name, entries } => {
                        stack.push(Step::CloseDirectory {
                            entry,
                            name,
                            children: entries.len(),
                        });
                        stack.extend(entries.iter().rev().map(Step::Enter));
                        continue;
                    }
                },
                Step::CloseDirectory {
                    entry,
                    name,
                    children,
                } => {
                    let links = finished.split_off(finished.len() - children);
                    let builder = LeafBuilder::new(name)
                        .set_type(LeafType::Directory)
                        .with_links(links);
                    (entry, builder)
                }
            };

            if std::ptr::eq(entry, source) {
                root_builder = Some(builder);
            } else {
                let leaf = builder.build()?;
                tracing::debug!("Built {} leaf {} ({})", leaf.leaf_type, leaf.item_name, leaf.hash);
                finished.push(leaf.hash.clone());
                self.leaves.insert(leaf.hash.clone(), leaf);
            }
        }

        let root_builder =
            root_builder.ok_or_else(|| DagError::EmptyInput("source tree has no root entry".to_string()))?;
        self.finish(root_builder)
    }

    fn file_builder(&mut self, name: &str, data: &[u8]) -> Result<LeafBuilder, DagError> {
        let builder = LeafBuilder::new(name).set_type(LeafType::File);
        if data.len() <= self.config.chunk_size {
            return Ok(builder.set_data(data.to_vec()));
        }

        let mut links = Vec::with_capacity(data.len().div_ceil(self.config.chunk_size));
        for (index, chunk) in data.chunks(self.config.chunk_size).enumerate() {
            let leaf = LeafBuilder::new(format!("{}/{}", name, index))
                .set_type(LeafType::Chunk)
                .set_data(chunk.to_vec())
                .build()?;
            links.push(leaf.hash.clone());
            self.leaves.insert(leaf.hash.clone(), leaf);
        }
        tracing::debug!("Chunked {} into {} chunks", name, links.len());

        Ok(builder.with_links(links))
    }

    /// Attach root metadata, compute statistics and hash the root
    fn finish(mut self, root_builder: LeafBuilder) -> Result<Dag, DagError> {
        let mut root_builder = root_builder.with_additional_data(self.config.additional_data.clone());
        if self.config.timestamp_root {
            let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
            root_builder = root_builder.add_data(TIMESTAMP_KEY, now);
        }
        let root = root_builder.build()?;

        let mut children_size = 0u64;
        let mut content_size = root.content.as_ref().map_or(0, |c| c.len() as u64);
        for leaf in self.leaves.values() {
            children_size += canonical_size(leaf)?;
            content_size += leaf.content.as_ref().map_or(0, |c| c.len() as u64);
        }
        let leaf_count = self.leaves.len() as u64 + 1;

        let root = finalize_root(root, leaf_count, content_size, children_size)?;
        tracing::info!(
            "Built DAG {} ({} leaves, {} content bytes)",
            root.hash,
            leaf_count,
            content_size
        );

        let root_hash = root.hash.clone();
        self.leaves.insert(root_hash.clone(), root);
        Ok(Dag {
            root: root_hash,
            leaves: self.leaves,
            labels: None,
            label_index: HashMap::new(),
            proofs: BTreeMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;

    fn build(source: &SourceEntry) -> Dag {
        DagBuilder::new(BuilderConfig::new()).build(source).unwrap()
    }

    #[test]
    fn test_empty_file() {
        let dag = build(&SourceEntry::file("empty.txt", Vec::new()));
        let root = dag.root_leaf().unwrap();

        assert_eq!(dag.len(), 1);
        assert_eq!(root.leaf_type, LeafType::File);
        assert_eq!(root.content, Some(vec![]));
        assert_eq!(root.content_hash, Some(sha256(b"")));
        assert_eq!(root.leaf_count, Some(1));
        assert_eq!(root.content_size, Some(0));
        assert_eq!(dag.root, "bafireihevljst63am5blmmnmbuxhggqjokm5uh2fxpcv6iagtl2ppdxjva");
    }

    #[test]
    fn test_directory_golden() {
        let dag = build(&SourceEntry::directory(
            "dir",
            vec![
                SourceEntry::file("a.txt", b"x".to_vec()),
                SourceEntry::file("b.txt", b"y".to_vec()),
            ],
        ));
        let root = dag.root_leaf().unwrap();

        assert_eq!(root.leaf_count, Some(3));
        assert_eq!(root.content_size, Some(2));
        assert_eq!(root.dag_size, Some(390));
        assert_eq!(root.current_link_count, 2);
        assert_eq!(
            root.links,
            vec![
                "bafireibp2vxoadkpjtw7qosvodtxvbcmzuh5vt44i3ze27kldyzbvihlze".to_string(),
                "bafireid2yg6lqicee25zlv5iicyypunv2glqobdmar77lcqbqoayy6jy44".to_string(),
            ]
        );
        assert_eq!(dag.root, "bafireihxevhky7y6tnrfyf34aj46hge43bdbqtpi4re5awtmatzsh6z6lu");
    }

    #[test]
    fn test_chunked_file() {
        let data: Vec<u8> = (0..50).map(|i| i as u8).collect();
        let dag = DagBuilder::new(BuilderConfig::new().with_chunk_size(10))
            .build(&SourceEntry::file("big.bin", data.clone()))
            .unwrap();
        let root = dag.root_leaf().unwrap();

        assert_eq!(root.links.len(), 5);
        assert_eq!(root.content, None);
        assert_eq!(root.content_hash, None);
        assert_eq!(root.content_size, Some(50));
        assert_eq!(root.leaf_count, Some(6));
        assert_eq!(root.classic_merkle_root.map(|r| r.len()), Some(32));

        // Chunk order, not sorted order
        for (i, link) in root.links.iter().enumerate() {
            let chunk = dag.get_leaf(link).unwrap();
            assert_eq!(chunk.leaf_type, LeafType::Chunk);
            assert_eq!(chunk.item_name, format!("big.bin/{}", i));
            assert_eq!(chunk.content.as_deref(), Some(&data[i * 10..(i + 1) * 10]));
        }
    }

    #[test]
    fn test_last_chunk_shorter() {
        let data = vec![7u8; 25];
        let dag = DagBuilder::new(BuilderConfig::new().with_chunk_size(10))
            .build(&SourceEntry::file("f", data))
            .unwrap();
        let root = dag.root_leaf().unwrap();
        let last = dag.get_leaf(&root.links[2]).unwrap();
        assert_eq!(last.content.as_ref().map(|c| c.len()), Some(5));
    }

    #[test]
    fn test_file_at_threshold_not_chunked() {
        let dag = DagBuilder::new(BuilderConfig::new().with_chunk_size(10))
            .build(&SourceEntry::file("f", vec![1u8; 10]))
            .unwrap();
        assert_eq!(dag.len(), 1);
    }

    #[test]
    fn test_nested_directories() {
        let dag = build(&SourceEntry::directory(
            "root",
            vec![
                SourceEntry::file("a", b"a".to_vec()),
                SourceEntry::directory(
                    "sub",
                    vec![
                        SourceEntry::file("b", b"b".to_vec()),
                        SourceEntry::directory("deeper", vec![SourceEntry::file("c", b"c".to_vec())]),
                    ],
                ),
                SourceEntry::directory("empty", vec![]),
            ],
        ));

        // root, a, sub, b, deeper, c, empty
        assert_eq!(dag.len(), 7);
        let root = dag.root_leaf().unwrap();
        assert_eq!(root.links.len(), 3);
        assert_eq!(root.leaf_count, Some(7));
        assert_eq!(root.content_size, Some(3));

        let sub = root
            .links
            .iter()
            .filter_map(|l| dag.get_leaf(l))
            .find(|l| l.item_name == "sub")
            .unwrap();
        assert_eq!(sub.links.len(), 2);
        assert!(!sub.is_root());
    }

    #[test]
    fn test_only_root_has_stats() {
        let dag = build(&SourceEntry::directory(
            "d",
            vec![SourceEntry::directory("s", vec![SourceEntry::file("f", b"1".to_vec())])],
        ));
        let roots: Vec<_> = dag.leaves.values().filter(|l| l.is_root()).collect();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].hash, dag.root);
    }

    #[test]
    fn test_timestamp_and_metadata_hashed_into_root() {
        let source = SourceEntry::file("f", b"data".to_vec());
        let plain = build(&source);
        let stamped = DagBuilder::new(BuilderConfig::new().with_timestamp(true))
            .build(&source)
            .unwrap();
        let tagged = DagBuilder::new(BuilderConfig::new().with_additional_data("author", "me"))
            .build(&source)
            .unwrap();

        let stamped_root = stamped.root_leaf().unwrap();
        assert!(stamped_root.additional_data.contains_key(TIMESTAMP_KEY));
        assert!(stamped_root.verify_hash().unwrap());
        assert_ne!(stamped.root, plain.root);
        assert_ne!(tagged.root, plain.root);
        assert_eq!(
            tagged.root_leaf().unwrap().additional_data.get("author"),
            Some(&"me".to_string())
        );
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let result = DagBuilder::new(BuilderConfig::new().with_chunk_size(0))
            .build(&SourceEntry::file("f", b"x".to_vec()));
        assert!(matches!(result, Err(DagError::InvalidConfig(_))));
    }

    #[test]
    fn test_duplicate_files_share_leaf() {
        let dag = build(&SourceEntry::directory(
            "d",
            vec![
                SourceEntry::file("same", b"1".to_vec()),
                SourceEntry::directory("s", vec![SourceEntry::file("same", b"1".to_vec())]),
            ],
        ));
        // root, same, s
        assert_eq!(dag.len(), 3);
        assert_eq!(dag.root_leaf().unwrap().leaf_count, Some(3));
    }
}
