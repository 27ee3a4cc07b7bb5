//! Directory traverser (§4.8, ambient): the core never walks directories
//! itself (§1); this module is the default concrete implementation of
//! the consumed interface. Recursive-descent style and error reporting
//! are grounded on `du/core.rs`'s `du_recursive`.

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::logger::Logger;
use crate::trie::PathTrie;

#[derive(Debug, Clone, Copy, Default)]
pub struct TraverseOpts {
    pub follow_symlinks: bool,
    pub one_file_system: bool,
}

/// Everything the preprocessor needs to build a `FileRecord` (§4.8).
pub struct RawEntry {
    pub path: PathBuf,
    pub dev: u64,
    pub ino: u64,
    pub size: u64,
    pub mtime: SystemTime,
    pub nlink: u64,
    pub is_symlink: bool,
    pub is_hidden: bool,
    pub is_dir: bool,
    /// `true` once every child of this directory has been yielded —
    /// set only on the synthetic "directory closed" entry consumed by
    /// the empty-directory lint check (§4.10).
    pub dir_child_count: Option<usize>,
}

pub trait Traverser {
    fn walk<'a>(
        &'a self,
        roots: &'a [PathBuf],
        opts: &'a TraverseOpts,
    ) -> Box<dyn Iterator<Item = io::Result<RawEntry>> + 'a>;
}

/// Default `walkdir`-based traverser. Revisit protection is delegated to
/// the path trie (§4.7): a path already present in the trie is never
/// yielded twice, which also guards against symlink cycles when
/// `follow_symlinks` is set.
pub struct DefaultTraverser<V> {
    trie: Arc<PathTrie<V>>,
    logger: Arc<dyn Logger>,
}

impl<V: Clone + Default> DefaultTraverser<V> {
    pub fn new(trie: Arc<PathTrie<V>>, logger: Arc<dyn Logger>) -> Self {
        DefaultTraverser { trie, logger }
    }

    fn walk_root<'a>(
        &'a self,
        root: &'a Path,
        opts: &'a TraverseOpts,
        root_dev: Option<u64>,
    ) -> Box<dyn Iterator<Item = io::Result<RawEntry>> + 'a> {
        let mut walker = walkdir::WalkDir::new(root).follow_links(opts.follow_symlinks);
        if opts.one_file_system {
            walker = walker.same_file_system(true);
        }
        let logger = self.logger.clone();
        let trie = self.trie.clone();
        Box::new(walker.into_iter().filter_map(move |entry| match entry {
            Ok(entry) => {
                if trie.search(entry.path()).is_some() {
                    return None;
                }
                trie.insert(entry.path());
                match to_raw_entry(entry.path(), root_dev, opts) {
                    Ok(raw) => Some(Ok(raw)),
                    Err(e) => {
                        logger.warn(&format!("{}: {}", entry.path().display(), e));
                        None
                    }
                }
            }
            Err(e) => {
                logger.warn(&format!("traversal error: {e}"));
                None
            }
        }))
    }
}

impl<V: Clone + Default> Traverser for DefaultTraverser<V> {
    fn walk<'a>(
        &'a self,
        roots: &'a [PathBuf],
        opts: &'a TraverseOpts,
    ) -> Box<dyn Iterator<Item = io::Result<RawEntry>> + 'a> {
        let root_dev = roots.first().and_then(|r| fs::metadata(r).ok()).map(|m| m.dev());
        Box::new(roots.iter().flat_map(move |root| self.walk_root(root, opts, root_dev)))
    }
}

fn to_raw_entry(path: &Path, root_dev: Option<u64>, opts: &TraverseOpts) -> io::Result<RawEntry> {
    let meta = if opts.follow_symlinks {
        fs::metadata(path)?
    } else {
        fs::symlink_metadata(path)?
    };
    if opts.one_file_system {
        if let Some(dev) = root_dev {
            if meta.dev() != dev {
                return Err(io::Error::new(io::ErrorKind::Other, "crosses filesystem boundary"));
            }
        }
    }
    let is_hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false);
    Ok(RawEntry {
        path: path.to_path_buf(),
        dev: meta.dev(),
        ino: meta.ino(),
        size: meta.len(),
        mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        nlink: meta.nlink(),
        is_symlink: meta.file_type().is_symlink(),
        is_hidden,
        is_dir: meta.is_dir(),
        dir_child_count: None,
    })
}
