//! The `tests` view: a fixed tree with predictable content, useful to check
//! that a mount works without touching the store.
//!
//! ```text
//! tests/
//! ├── test1.txt
//! ├── test2.txt
//! └── testdir/
//!     ├── test3.txt
//!     ├── test4.txt
//!     └── test5.txt
//! ```

use async_trait::async_trait;
use secretsfs_core::FsError;
use secretsfs_core::provider::{DirEntry, LookupEntry, NodeAttr, Provider, RequestContext};

use crate::tree::{StaticTree, TreeNode};

pub const NAME: &str = "tests";

const DIR_PERM: u16 = 0o555;
const FILE_PERM: u16 = 0o444;

pub struct SelfTestProvider {
    tree: StaticTree,
}

impl Default for SelfTestProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SelfTestProvider {
    pub fn new() -> Self {
        Self {
            tree: StaticTree::new(vec![
                TreeNode::file("test1.txt", FILE_PERM),
                TreeNode::file("test2.txt", FILE_PERM),
                TreeNode::dir("testdir", DIR_PERM),
                TreeNode::file("testdir/test3.txt", FILE_PERM),
                TreeNode::file("testdir/test4.txt", FILE_PERM),
                TreeNode::file("testdir/test5.txt", FILE_PERM),
            ]),
        }
    }

    fn content(sub_path: &str) -> String {
        format!("This is the content of the file /{NAME}/{sub_path}\n")
    }

    fn attr(&self, sub_path: &str) -> Result<NodeAttr, FsError> {
        if sub_path.is_empty() {
            return Ok(NodeAttr::directory(DIR_PERM));
        }
        let node = self.tree.get(sub_path).ok_or(FsError::NotFound)?;
        Ok(if node.is_dir() {
            NodeAttr::directory(node.perm)
        } else {
            NodeAttr::file(Self::content(sub_path).len() as u64, node.perm)
        })
    }
}

#[async_trait]
impl Provider for SelfTestProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_directory(
        &self,
        ctx: &RequestContext<'_>,
        sub_path: &str,
    ) -> Result<Vec<DirEntry>, FsError> {
        self.tree.entries(ctx, sub_path)
    }

    async fn lookup(
        &self,
        ctx: &RequestContext<'_>,
        sub_path: &str,
        name: &str,
    ) -> Result<LookupEntry, FsError> {
        let node = self.tree.child(sub_path, name)?;
        Ok(ctx.lookup_entry(sub_path, name, self.attr(&node.path)?))
    }

    async fn read(&self, _ctx: &RequestContext<'_>, sub_path: &str) -> Result<Vec<u8>, FsError> {
        match self.tree.get(sub_path) {
            Some(node) if node.is_dir() => Err(FsError::IsADirectory),
            Some(_) => Ok(Self::content(sub_path).into_bytes()),
            None if sub_path.is_empty() => Err(FsError::IsADirectory),
            None => Err(FsError::NotFound),
        }
    }

    async fn get_attributes(
        &self,
        _ctx: &RequestContext<'_>,
        sub_path: &str,
    ) -> Result<NodeAttr, FsError> {
        self.attr(sub_path)
    }
}
