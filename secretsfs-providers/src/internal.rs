//! The `internal` view: read-only diagnostics about the running mount.
//!
//! ```text
//! internal/
//! ├── user              caller identity (JSON)
//! ├── privileged        whether the caller may read restricted nodes
//! ├── inodes            path → inode table (restricted)
//! └── store/
//!     ├── <store kind>  store configuration (restricted)
//!     └── credential    caller's role credential path
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use secretsfs_core::config::InternalConfig;
use secretsfs_core::provider::{DirEntry, LookupEntry, NodeAttr, Provider, RequestContext};
use secretsfs_core::{Caller, FsError, SecretStore};
use serde::Serialize;
use tracing::debug;

use crate::tree::{StaticTree, TreeNode};

pub const NAME: &str = "internal";

const ROOT_PERM: u16 = 0o755;

pub struct InternalProvider {
    tree: StaticTree,
    store: Arc<dyn SecretStore>,
    privileged_users: Vec<String>,
    privileged_groups: Vec<String>,
}

impl InternalProvider {
    pub fn new(config: &InternalConfig, store: Arc<dyn SecretStore>) -> Self {
        let tree = StaticTree::new(vec![
            TreeNode::file("user", 0o644),
            TreeNode::file("privileged", 0o644),
            TreeNode::file("inodes", 0o640).privileged(),
            TreeNode::dir("store", 0o755),
            TreeNode::file(format!("store/{}", store.kind()), 0o640).privileged(),
            TreeNode::file("store/credential", 0o644),
        ]);
        Self {
            tree,
            store,
            privileged_users: config.privileged_users.clone(),
            privileged_groups: config.privileged_groups.clone(),
        }
    }

    pub fn is_privileged(&self, caller: &Caller) -> bool {
        self.privileged_users.contains(&caller.name) || caller.in_any_group(&self.privileged_groups)
    }

    /// The node at `sub_path`, after the privilege check for restricted ones.
    fn accessible(&self, caller: &Caller, sub_path: &str) -> Result<Option<&TreeNode>, FsError> {
        if sub_path.is_empty() {
            return Ok(None);
        }
        let node = self.tree.get(sub_path).ok_or(FsError::NotFound)?;
        if node.privileged && !self.is_privileged(caller) {
            debug!(path = sub_path, user = %caller.name, "unprivileged access to restricted node");
            return Err(FsError::Forbidden);
        }
        Ok(Some(node))
    }

    fn content(&self, ctx: &RequestContext<'_>, sub_path: &str) -> Result<Vec<u8>, FsError> {
        match sub_path {
            "user" => pretty(ctx.caller),
            "privileged" => Ok(format!("{}\n", self.is_privileged(ctx.caller)).into_bytes()),
            "inodes" => pretty(&ctx.inodes.snapshot()),
            "store/credential" => Ok(format!(
                "{}\n",
                self.store.credential_path(ctx.caller).display()
            )
            .into_bytes()),
            other if other.strip_prefix("store/") == Some(self.store.kind()) => {
                pretty(&self.store.describe())
            }
            _ => Err(FsError::NotFound),
        }
    }

    fn attr(&self, ctx: &RequestContext<'_>, node: &TreeNode) -> Result<NodeAttr, FsError> {
        if node.is_dir() {
            return Ok(NodeAttr::directory(node.perm));
        }
        // Restricted content is not evaluated for callers who cannot read it.
        let size = if node.privileged && !self.is_privileged(ctx.caller) {
            0
        } else {
            self.content(ctx, &node.path)?.len() as u64
        };
        Ok(NodeAttr::file(size, node.perm))
    }
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, FsError> {
    let mut out = serde_json::to_vec_pretty(value)
        .map_err(|e| FsError::Unavailable(format!("serialise diagnostics: {e}")))?;
    out.push(b'\n');
    Ok(out)
}

#[async_trait]
impl Provider for InternalProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_directory(
        &self,
        ctx: &RequestContext<'_>,
        sub_path: &str,
    ) -> Result<Vec<DirEntry>, FsError> {
        self.accessible(ctx.caller, sub_path)?;
        self.tree.entries(ctx, sub_path)
    }

    async fn lookup(
        &self,
        ctx: &RequestContext<'_>,
        sub_path: &str,
        name: &str,
    ) -> Result<LookupEntry, FsError> {
        let node = self.tree.child(sub_path, name)?;
        Ok(ctx.lookup_entry(sub_path, name, self.attr(ctx, node)?))
    }

    async fn open(&self, ctx: &RequestContext<'_>, sub_path: &str) -> Result<u64, FsError> {
        self.accessible(ctx.caller, sub_path)?;
        Ok(0)
    }

    async fn read(&self, ctx: &RequestContext<'_>, sub_path: &str) -> Result<Vec<u8>, FsError> {
        match self.accessible(ctx.caller, sub_path)? {
            None => Err(FsError::IsADirectory),
            Some(node) if node.is_dir() => Err(FsError::IsADirectory),
            Some(_) => self.content(ctx, sub_path),
        }
    }

    async fn get_attributes(
        &self,
        ctx: &RequestContext<'_>,
        sub_path: &str,
    ) -> Result<NodeAttr, FsError> {
        if sub_path.is_empty() {
            return Ok(NodeAttr::directory(ROOT_PERM));
        }
        let node = self.tree.get(sub_path).ok_or(FsError::NotFound)?;
        self.attr(ctx, node)
    }
}
