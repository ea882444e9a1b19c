//! Request entry point.
//!
//! Every filesystem operation arrives here with a mount path.  The first
//! segment picks the provider; the rest is handed to it unchanged.  The mount
//! root itself is answered directly from the provider registry.

use std::sync::Arc;

use tracing::debug;

use crate::Caller;
use crate::error::FsError;
use crate::inode::{InodeRegistry, ROOT_INODE};
use crate::provider::{DirEntry, NodeAttr, NodeKind, Provider, ProviderRegistry, RequestContext};

/// Permission bits reported for the mount root and provider roots.
const DIR_PERM: u16 = 0o555;

/// A path inside the mounted tree and its stable inode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualNode {
    pub path: String,
    pub inode: u64,
}

impl VirtualNode {
    pub fn is_root(&self) -> bool {
        self.inode == ROOT_INODE
    }
}

/// Split a mount path into `(provider_name, sub_path)`.
///
/// # Examples
/// ```
/// # use secretsfs_core::router::split;
/// assert_eq!(split("/secrets/db/prod"), ("secrets", "db/prod"));
/// assert_eq!(split("/secrets"), ("secrets", ""));
/// assert_eq!(split("/"), ("", ""));
/// ```
pub fn split(path: &str) -> (&str, &str) {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    match trimmed.split_once('/') {
        Some((provider, rest)) => (provider, rest),
        None => (trimmed, ""),
    }
}

/// Join a mount path and a child name.
pub fn join(parent: &str, name: &str) -> String {
    let parent = parent.strip_suffix('/').unwrap_or(parent);
    format!("{parent}/{name}")
}

fn is_root_path(path: &str) -> bool {
    path.is_empty() || path == "/"
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

pub struct Router {
    providers: Arc<ProviderRegistry>,
    inodes: Arc<InodeRegistry>,
}

impl Router {
    pub fn new(providers: Arc<ProviderRegistry>, inodes: Arc<InodeRegistry>) -> Self {
        Self { providers, inodes }
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn inodes(&self) -> &InodeRegistry {
        &self.inodes
    }

    pub fn root(&self) -> VirtualNode {
        VirtualNode {
            path: String::new(),
            inode: ROOT_INODE,
        }
    }

    /// Map a kernel inode back to its node.
    pub fn node(&self, inode: u64) -> Option<VirtualNode> {
        if inode == ROOT_INODE {
            return Some(self.root());
        }
        self.inodes
            .path_of(inode)
            .map(|path| VirtualNode { path, inode })
    }

    /// The enabled provider owning `path`, with the sub-path it should see.
    fn owner<'p>(&self, path: &'p str) -> Result<(Arc<dyn Provider>, &'p str, &'p str), FsError> {
        let (name, sub) = split(path);
        match self.providers.resolve_enabled(name) {
            Some(provider) => Ok((provider, name, sub)),
            None => {
                debug!(provider = name, path, "no enabled provider for path");
                Err(FsError::NotFound)
            }
        }
    }

    fn context<'a>(&'a self, caller: &'a Caller, provider: &'a str) -> RequestContext<'a> {
        RequestContext {
            caller,
            inodes: &self.inodes,
            provider,
        }
    }

    pub async fn list_directory(&self, path: &str, caller: &Caller) -> Result<Vec<DirEntry>, FsError> {
        if is_root_path(path) {
            return Ok(self
                .providers
                .enabled_names()
                .into_iter()
                .map(|name| DirEntry {
                    inode: self.inodes.get_or_create(&format!("/{name}")),
                    name,
                    kind: NodeKind::Directory,
                })
                .collect());
        }
        let (provider, name, sub) = self.owner(path)?;
        provider.list_directory(&self.context(caller, name), sub).await
    }

    pub async fn lookup(
        &self,
        parent: &str,
        name: &str,
        caller: &Caller,
    ) -> Result<(VirtualNode, NodeAttr), FsError> {
        if !valid_name(name) {
            return Err(FsError::NotFound);
        }
        let path = join(parent, name);

        if is_root_path(parent) {
            if !self.providers.is_enabled(name) {
                return Err(FsError::NotFound);
            }
            let node = VirtualNode {
                inode: self.inodes.get_or_create(&path),
                path,
            };
            return Ok((node, NodeAttr::directory(DIR_PERM)));
        }

        let (provider, provider_name, sub) = self.owner(parent)?;
        let found = provider
            .lookup(&self.context(caller, provider_name), sub, name)
            .await?;
        debug!(path = %path, inode = found.entry.inode, "lookup");
        Ok((
            VirtualNode {
                path,
                inode: found.entry.inode,
            },
            found.attr,
        ))
    }

    pub async fn open(&self, path: &str, caller: &Caller) -> Result<u64, FsError> {
        if is_root_path(path) {
            return Err(FsError::IsADirectory);
        }
        let (provider, name, sub) = self.owner(path)?;
        provider.open(&self.context(caller, name), sub).await
    }

    /// Read up to `size` bytes at `offset`.
    pub async fn read(
        &self,
        path: &str,
        caller: &Caller,
        offset: u64,
        size: u32,
    ) -> Result<Vec<u8>, FsError> {
        if is_root_path(path) {
            return Err(FsError::IsADirectory);
        }
        let (provider, name, sub) = self.owner(path)?;
        let content = provider.read(&self.context(caller, name), sub).await?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(content.len());
        let end = start.saturating_add(size as usize).min(content.len());
        Ok(content[start..end].to_vec())
    }

    pub async fn get_attributes(&self, path: &str, caller: &Caller) -> Result<NodeAttr, FsError> {
        if is_root_path(path) {
            return Ok(NodeAttr::directory(DIR_PERM));
        }
        let (provider, name, sub) = self.owner(path)?;
        if sub.is_empty() {
            return Ok(NodeAttr::directory(DIR_PERM));
        }
        provider.get_attributes(&self.context(caller, name), sub).await
    }
}
