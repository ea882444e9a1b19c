//! Fixed in-memory directory trees for the non-backend views.

use secretsfs_core::FsError;
use secretsfs_core::provider::{DirEntry, NodeKind, RequestContext};

/// The parent of a `/`-separated sub-path; `""` for top-level entries.
fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

/// The last segment of a `/`-separated sub-path.
pub fn base_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

/// Entries of `paths` that sit directly inside `root`.
///
/// # Examples
/// ```
/// # use secretsfs_providers::tree::direct_children;
/// let paths = ["dir1/test1.txt", "dir1/test2.txt", "dir1/sub/test3.txt"];
/// assert_eq!(direct_children("dir1", paths), vec!["dir1/test1.txt", "dir1/test2.txt"]);
/// ```
pub fn direct_children<'a, I>(root: &str, paths: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let root = root.trim_matches('/');
    paths
        .into_iter()
        .filter(|p| *p != root && parent_of(p) == root)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    /// Sub-path inside the provider, without leading `/`.
    pub path: String,
    pub kind: NodeKind,
    pub perm: u16,
    /// Only privileged callers may open or list this node.
    pub privileged: bool,
}

impl TreeNode {
    pub fn dir(path: impl Into<String>, perm: u16) -> Self {
        Self {
            path: path.into(),
            kind: NodeKind::Directory,
            perm,
            privileged: false,
        }
    }

    pub fn file(path: impl Into<String>, perm: u16) -> Self {
        Self {
            path: path.into(),
            kind: NodeKind::File,
            perm,
            privileged: false,
        }
    }

    pub fn privileged(self) -> Self {
        Self {
            privileged: true,
            ..self
        }
    }

    pub fn name(&self) -> &str {
        base_name(&self.path)
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// A flat list of nodes; the provider root `""` is implicit.
#[derive(Debug, Clone, Default)]
pub struct StaticTree {
    nodes: Vec<TreeNode>,
}

impl StaticTree {
    pub fn new(nodes: Vec<TreeNode>) -> Self {
        Self { nodes }
    }

    pub fn get(&self, sub_path: &str) -> Option<&TreeNode> {
        self.nodes.iter().find(|n| n.path == sub_path)
    }

    /// Fails with `NotFound` for unknown paths and `NotADirectory` for files.
    pub fn children(&self, sub_path: &str) -> Result<Vec<&TreeNode>, FsError> {
        if !sub_path.is_empty() {
            match self.get(sub_path) {
                None => return Err(FsError::NotFound),
                Some(node) if !node.is_dir() => return Err(FsError::NotADirectory),
                Some(_) => {}
            }
        }
        let wanted = direct_children(sub_path, self.nodes.iter().map(|n| n.path.as_str()));
        Ok(self
            .nodes
            .iter()
            .filter(|n| wanted.contains(&n.path.as_str()))
            .collect())
    }

    pub fn child(&self, sub_path: &str, name: &str) -> Result<&TreeNode, FsError> {
        self.children(sub_path)?
            .into_iter()
            .find(|n| n.name() == name)
            .ok_or(FsError::NotFound)
    }

    /// Listing entries for `sub_path`, inodes registered through `ctx`.
    pub fn entries(&self, ctx: &RequestContext<'_>, sub_path: &str) -> Result<Vec<DirEntry>, FsError> {
        Ok(self
            .children(sub_path)?
            .into_iter()
            .map(|n| ctx.dir_entry(sub_path, n.name(), n.kind))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> StaticTree {
        StaticTree::new(vec![
            TreeNode::file("a.txt", 0o444),
            TreeNode::dir("d", 0o555),
            TreeNode::file("d/b.txt", 0o444),
            TreeNode::dir("d/e", 0o555),
            TreeNode::file("d/e/c.txt", 0o444).privileged(),
        ])
    }

    #[test]
    fn direct_children_of_dir1() {
        let paths = ["dir1/test1.txt", "dir1/test2.txt", "dir1/sub/test3.txt"];
        assert_eq!(
            direct_children("dir1", paths),
            vec!["dir1/test1.txt", "dir1/test2.txt"]
        );
    }

    #[test]
    fn direct_children_does_not_match_prefix_siblings() {
        let paths = ["tests/a", "testsdir1/b", "tests"];
        assert_eq!(direct_children("tests", paths), vec!["tests/a"]);
        assert_eq!(direct_children("", paths), vec!["tests"]);
    }

    #[test]
    fn children_of_root_and_subdirs() {
        let t = tree();
        let root: Vec<&str> = t.children("").unwrap().iter().map(|n| n.name()).collect();
        assert_eq!(root, vec!["a.txt", "d"]);
        let d: Vec<&str> = t.children("d").unwrap().iter().map(|n| n.name()).collect();
        assert_eq!(d, vec!["b.txt", "e"]);
    }

    #[test]
    fn children_errors() {
        let t = tree();
        assert!(matches!(t.children("a.txt"), Err(FsError::NotADirectory)));
        assert!(matches!(t.children("zzz"), Err(FsError::NotFound)));
        assert!(matches!(t.child("d", "nope"), Err(FsError::NotFound)));
        assert!(t.child("d/e", "c.txt").unwrap().privileged);
    }
}
