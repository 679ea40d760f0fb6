//! Read content back out of a DAG
//!
//! Reassemble file bytes from chunk leaves and write the whole tree back
//! to disk.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::dag::{Dag, DagError};
use crate::types::{Leaf, LeafType};

impl Dag {
    /// Child leaves of `hash`, in link order
    pub fn list_children(&self, hash: &str) -> Result<Vec<&Leaf>, DagError> {
        self.leaf(hash)?
            .links
            .iter()
            .map(|link| self.leaf(link))
            .collect()
    }

    /// Content of a file leaf, reassembling chunks in link order
    pub fn get_content(&self, hash: &str) -> Result<Vec<u8>, DagError> {
        let leaf = self.leaf(hash)?;
        if leaf.leaf_type == LeafType::Directory {
            return Err(DagError::NotFound(format!("content of directory {}", hash)));
        }

        if leaf.links.is_empty() {
            return checked_content(leaf).map(<[u8]>::to_vec);
        }

        let mut data = Vec::new();
        for chunk in self.list_children(hash)? {
            data.extend_from_slice(checked_content(chunk)?);
        }
        Ok(data)
    }

    /// Write the DAG's tree to `path`
    ///
    /// A directory root becomes the directory at `path`; a file root becomes
    /// the file at `path`. Every leaf needed must be held locally.
    pub fn create_directory(&self, path: impl AsRef<Path>) -> Result<(), DagError> {
        let mut stack: Vec<(&str, PathBuf)> = vec![(self.root.as_str(), path.as_ref().to_path_buf())];
        let mut files = 0usize;

        while let Some((hash, dest)) = stack.pop() {
            let leaf = self.leaf(hash)?;
            match leaf.leaf_type {
                LeafType::Directory => {
                    fs::create_dir_all(&dest).map_err(|e| DagError::io(&dest, e))?;
                    for child in self.list_children(hash)? {
                        let name = safe_name(child)?;
                        stack.push((child.hash.as_str(), dest.join(name)));
                    }
                }
                LeafType::File => {
                    let data = self.get_content(hash)?;
                    fs::write(&dest, &data).map_err(|e| DagError::io(&dest, e))?;
                    files += 1;
                }
                LeafType::Chunk => {
                    return Err(DagError::integrity(hash, "chunk outside of a file"));
                }
            }
        }

        tracing::info!("Wrote DAG {} to {} ({} files)", self.root, path.as_ref().display(), files);
        Ok(())
    }
}

fn checked_content(leaf: &Leaf) -> Result<&[u8], DagError> {
    let content = leaf
        .content
        .as_deref()
        .ok_or_else(|| DagError::NotFound(format!("content of {}", leaf.hash)))?;
    if !leaf.verify_content() {
        return Err(DagError::integrity(&leaf.hash, "content hash mismatch"));
    }
    Ok(content)
}

/// Item name as a single path component
fn safe_name(leaf: &Leaf) -> Result<&str, DagError> {
    let mut components = Path::new(&leaf.item_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(leaf.item_name.as_str()),
        _ => Err(DagError::integrity(
            &leaf.hash,
            format!("unsafe item name {:?}", leaf.item_name),
        )),
    }
}
