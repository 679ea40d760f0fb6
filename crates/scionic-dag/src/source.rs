//! Source tree fed to the DAG builder
//!
//! The builder never touches the filesystem directly; it consumes a
//! [`SourceEntry`] tree. [`SourceEntry::from_path`] is the filesystem
//! adapter that produces one.

use std::fs;
use std::io;
use std::path::Path;

use ignore::WalkBuilder;

use crate::dag::DagError;

/// A file or directory to be turned into leaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEntry {
    File { name: String, data: Vec<u8> },
    Directory { name: String, entries: Vec<SourceEntry> },
}

impl SourceEntry {
    pub fn file(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        SourceEntry::File {
            name: name.into(),
            data: data.into(),
        }
    }

    pub fn directory(name: impl Into<String>, entries: Vec<SourceEntry>) -> Self {
        SourceEntry::Directory {
            name: name.into(),
            entries,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SourceEntry::File { name, .. } | SourceEntry::Directory { name, .. } => name,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, SourceEntry::Directory { .. })
    }

    /// Read a file or directory tree from disk
    ///
    /// Directory entries are sorted by name. Hidden files are included and
    /// ignore files are not consulted. Symlinks are never followed and are
    /// left out of the tree. Any unreadable entry aborts the whole read.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DagError> {
        let path = path.as_ref();
        let name = entry_name(path)?;
        let metadata = fs::metadata(path).map_err(|e| DagError::io(path, e))?;

        if !metadata.is_dir() {
            let data = fs::read(path).map_err(|e| DagError::io(path, e))?;
            return Ok(SourceEntry::File { name, data });
        }

        let entries = read_directory(path)?;
        Ok(SourceEntry::Directory { name, entries })
    }
}

fn entry_name(path: &Path) -> Result<String, DagError> {
    if let Some(name) = path.file_name() {
        return Ok(name.to_string_lossy().into_owned());
    }
    // "." or ".." - name it after the resolved directory
    let canonical = path.canonicalize().map_err(|e| DagError::io(path, e))?;
    Ok(canonical
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "/".to_string()))
}

/// Entries below `root`, built from one depth-first walk
fn read_directory(root: &Path) -> Result<Vec<SourceEntry>, DagError> {
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .ignore(false)
        .parents(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut entries = Vec::new();
    // Directories between the root and the current walk position
    let mut open: Vec<(String, Vec<SourceEntry>)> = Vec::new();
    let mut skipped = 0usize;

    for result in walker {
        let entry = result.map_err(|e| DagError::io(root, io::Error::other(e.to_string())))?;
        let depth = entry.depth();
        if depth == 0 {
            continue;
        }
        while open.len() >= depth {
            close_directory(&mut open, &mut entries);
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        match entry.file_type() {
            Some(file_type) if file_type.is_dir() => open.push((name, Vec::new())),
            Some(file_type) if file_type.is_file() => {
                let data = fs::read(path).map_err(|e| DagError::io(path, e))?;
                let parent = match open.last_mut() {
                    Some((_, children)) => children,
                    None => &mut entries,
                };
                parent.push(SourceEntry::File { name, data });
            }
            _ => {
                tracing::debug!("Skipping {}: not a regular file or directory", path.display());
                skipped += 1;
            }
        }
    }
    while !open.is_empty() {
        close_directory(&mut open, &mut entries);
    }

    if skipped > 0 {
        tracing::info!("Skipped {} symlinks or special files under {}", skipped, root.display());
    }
    Ok(entries)
}

fn close_directory(open: &mut Vec<(String, Vec<SourceEntry>)>, entries: &mut Vec<SourceEntry>) {
    if let Some((name, children)) = open.pop() {
        let directory = SourceEntry::Directory {
            name,
            entries: children,
        };
        match open.last_mut() {
            Some((_, parent)) => parent.push(directory),
            None => entries.push(directory),
        }
    }
}
