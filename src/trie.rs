//! Path trie (component G, §4.7).
//!
//! A Patricia-style trie over path components. Real pointers don't make
//! sense to hand out from behind a shared mutex in Rust, so "pointer
//! comparison" from the spec becomes comparison of arena indices
//! (`NodeId`) — same O(1) property, no unsafe aliasing. File records
//! store a `NodeId` rather than a path string; basename-equality checks
//! used by the unique-basename rule (§4.4) compare `NodeId`s directly.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

struct Node<V> {
    parent: Option<NodeId>,
    basename: OsString,
    children: HashMap<OsString, NodeId>,
    value: Option<V>,
}

struct Inner<V> {
    nodes: Vec<Node<V>>,
    root: NodeId,
}

/// Shared, mutex-guarded path trie. `V` is the per-path user payload
/// (traversal flags, hidden/tagged bits, etc).
pub struct PathTrie<V> {
    inner: Mutex<Inner<V>>,
}

impl<V> Default for PathTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> PathTrie<V> {
    pub fn new() -> Self {
        let root = Node {
            parent: None,
            basename: OsString::new(),
            children: HashMap::new(),
            value: None,
        };
        PathTrie {
            inner: Mutex::new(Inner {
                nodes: vec![root],
                root: NodeId(0),
            }),
        }
    }

    pub fn root(&self) -> NodeId {
        self.inner.lock().unwrap().root
    }

    /// Insert `path`, creating intermediate nodes as needed, and return
    /// the leaf node id. Idempotent: inserting the same path twice
    /// returns the same id.
    pub fn insert(&self, path: &Path) -> NodeId {
        let mut inner = self.inner.lock().unwrap();
        let mut current = inner.root;
        for component in path.components() {
            let seg: OsString = component.as_os_str().to_os_string();
            let existing = inner.nodes[current.0].children.get(&seg).copied();
            current = match existing {
                Some(id) => id,
                None => {
                    let id = NodeId(inner.nodes.len());
                    inner.nodes.push(Node {
                        parent: Some(current),
                        basename: seg.clone(),
                        children: HashMap::new(),
                        value: None,
                    });
                    inner.nodes[current.0].children.insert(seg, id);
                    id
                }
            };
        }
        current
    }

    /// Search without mutating the trie.
    pub fn search(&self, path: &Path) -> Option<NodeId> {
        let inner = self.inner.lock().unwrap();
        let mut current = inner.root;
        for component in path.components() {
            let seg = component.as_os_str();
            current = *inner.nodes[current.0].children.get(seg)?;
        }
        Some(current)
    }

    pub fn set_value(&self, id: NodeId, value: V) {
        let mut inner = self.inner.lock().unwrap();
        inner.nodes[id.0].value = Some(value);
    }

    pub fn basename(&self, id: NodeId) -> OsString {
        self.inner.lock().unwrap().nodes[id.0].basename.clone()
    }

    /// Reconstruct the full path by walking parent pointers into a
    /// caller-owned buffer (mirrors `rm_trie_rebuild_path`'s reverse
    /// walk into a fixed buffer).
    pub fn rebuild_path(&self, id: NodeId) -> PathBuf {
        let inner = self.inner.lock().unwrap();
        let mut segments = Vec::new();
        let mut cur = Some(id);
        while let Some(nid) = cur {
            if nid == inner.root {
                break;
            }
            segments.push(inner.nodes[nid.0].basename.clone());
            cur = inner.nodes[nid.0].parent;
        }
        segments.reverse();
        let mut buf = PathBuf::new();
        for seg in segments {
            buf.push(seg);
        }
        buf
    }

    /// Pre-order traversal of all nodes reachable from `id` (inclusive).
    pub fn pre_order(&self, id: NodeId) -> Vec<NodeId> {
        let inner = self.inner.lock().unwrap();
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            let mut children: Vec<NodeId> = inner.nodes[n.0].children.values().copied().collect();
            children.sort_by_key(|c| c.0);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Post-order traversal, used by the empty-directory lint check
    /// (§4.10) to visit children before their parent.
    pub fn post_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut pre = self.pre_order(id);
        pre.reverse();
        pre
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.inner.lock().unwrap().nodes[id.0].children.len()
    }
}

impl<V: Clone> PathTrie<V> {
    pub fn get_value(&self, id: NodeId) -> Option<V> {
        self.inner.lock().unwrap().nodes[id.0].value.clone()
    }
}

/// Compare two node ids for basename equality. `NodeId` equality is a
/// plain integer comparison — the Rust analog of the original's pointer
/// comparison on interned basenames (§4.4's unique-basename rule).
#[inline]
pub fn same_basename(a: NodeId, b: NodeId) -> bool {
    a == b
}
