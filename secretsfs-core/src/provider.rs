//! Namespace providers and their registry.
//!
//! A provider owns one top-level directory of the mount and answers the
//! five filesystem operations for every path beneath it.  Providers are
//! registered explicitly at startup; which of them are visible is decided by
//! the configured enabled-list and can be recomputed on reload.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::Caller;
use crate::error::FsError;
use crate::inode::InodeRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeKind {
    Directory,
    File,
}

/// What `getattr` reports for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    pub kind: NodeKind,
    pub size: u64,
    /// Permission bits only (no file type bits).
    pub perm: u16,
}

impl NodeAttr {
    pub const fn directory(perm: u16) -> Self {
        Self {
            kind: NodeKind::Directory,
            size: 0,
            perm,
        }
    }

    pub const fn file(size: u64, perm: u16) -> Self {
        Self {
            kind: NodeKind::File,
            size,
            perm,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// One line of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
    pub inode: u64,
}

/// Result of resolving a child name: its listing entry plus the attributes
/// the kernel needs in the same reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupEntry {
    pub entry: DirEntry,
    pub attr: NodeAttr,
}

/// Per-request state handed to a provider.
pub struct RequestContext<'a> {
    pub caller: &'a Caller,
    pub inodes: &'a InodeRegistry,
    /// Name of the provider handling the request.
    pub provider: &'a str,
}

impl RequestContext<'_> {
    /// Absolute mount path of `sub_path` inside this provider.
    pub fn node_path(&self, sub_path: &str) -> String {
        if sub_path.is_empty() {
            format!("/{}", self.provider)
        } else {
            format!("/{}/{}", self.provider, sub_path)
        }
    }

    pub fn inode(&self, sub_path: &str) -> u64 {
        self.inodes.get_or_create(&self.node_path(sub_path))
    }

    /// Listing entry for `name` inside directory `parent`.
    pub fn dir_entry(&self, parent: &str, name: &str, kind: NodeKind) -> DirEntry {
        DirEntry {
            name: name.to_string(),
            kind,
            inode: self.inode(&join_sub(parent, name)),
        }
    }

    pub fn lookup_entry(&self, parent: &str, name: &str, attr: NodeAttr) -> LookupEntry {
        LookupEntry {
            entry: self.dir_entry(parent, name, attr.kind),
            attr,
        }
    }
}

/// Join a provider sub-path and a child name.
pub fn join_sub(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// The top-level directory this provider owns.
    fn name(&self) -> &str;

    async fn list_directory(
        &self,
        ctx: &RequestContext<'_>,
        sub_path: &str,
    ) -> Result<Vec<DirEntry>, FsError>;

    async fn lookup(
        &self,
        ctx: &RequestContext<'_>,
        sub_path: &str,
        name: &str,
    ) -> Result<LookupEntry, FsError>;

    /// Content is produced at read time, so the default hands out a dummy
    /// handle.
    async fn open(&self, _ctx: &RequestContext<'_>, _sub_path: &str) -> Result<u64, FsError> {
        Ok(0)
    }

    async fn read(&self, ctx: &RequestContext<'_>, sub_path: &str) -> Result<Vec<u8>, FsError>;

    async fn get_attributes(
        &self,
        ctx: &RequestContext<'_>,
        sub_path: &str,
    ) -> Result<NodeAttr, FsError>;
}

/// Every registered provider plus the current enabled set.
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
    configured: Vec<String>,
    enabled: RwLock<BTreeSet<String>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("enabled", &self.enabled_names())
            .finish()
    }
}

impl ProviderRegistry {
    /// Create an empty registry that will enable providers named in `enabled`.
    pub fn new(enabled: &[String]) -> Self {
        Self {
            providers: BTreeMap::new(),
            configured: enabled.to_vec(),
            enabled: RwLock::new(BTreeSet::new()),
        }
    }

    /// Add a provider, enabling it if the configured list names it.
    ///
    /// A provider registered under an existing name replaces it.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        let enabled = self.configured.contains(&name);
        debug!(provider = %name, enabled, "registering provider");
        {
            let mut set = self.enabled.write().unwrap_or_else(PoisonError::into_inner);
            if enabled {
                set.insert(name.clone());
            } else {
                set.remove(&name);
            }
        }
        self.providers.insert(name, provider);
    }

    /// Recompute enablement for every registered provider.
    pub fn reload(&self, enabled: &[String]) {
        let next: BTreeSet<String> = self
            .providers
            .keys()
            .filter(|name| enabled.contains(name))
            .cloned()
            .collect();
        let mut set = self.enabled.write().unwrap_or_else(PoisonError::into_inner);
        if *set != next {
            info!(
                before = ?set.iter().collect::<Vec<_>>(),
                after = ?next.iter().collect::<Vec<_>>(),
                "provider enablement changed"
            );
        }
        *set = next;
    }

    /// The provider registered as `name`, enabled or not.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// The provider registered as `name` if it is currently enabled.
    pub fn resolve_enabled(&self, name: &str) -> Option<Arc<dyn Provider>> {
        if self.is_enabled(name) {
            self.resolve(name)
        } else {
            None
        }
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    pub fn enabled_names(&self) -> Vec<String> {
        self.enabled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Every registered provider name, sorted.
    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Provider with a single file `hello` at its root.
    pub(crate) struct StubProvider(pub &'static str);

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            self.0
        }

        async fn list_directory(
            &self,
            ctx: &RequestContext<'_>,
            sub_path: &str,
        ) -> Result<Vec<DirEntry>, FsError> {
            match sub_path {
                "" => Ok(vec![ctx.dir_entry("", "hello", NodeKind::File)]),
                "hello" => Err(FsError::NotADirectory),
                _ => Err(FsError::NotFound),
            }
        }

        async fn lookup(
            &self,
            ctx: &RequestContext<'_>,
            sub_path: &str,
            name: &str,
        ) -> Result<LookupEntry, FsError> {
            if sub_path.is_empty() && name == "hello" {
                Ok(ctx.lookup_entry("", "hello", NodeAttr::file(6, 0o444)))
            } else {
                Err(FsError::NotFound)
            }
        }

        async fn read(&self, _ctx: &RequestContext<'_>, sub_path: &str) -> Result<Vec<u8>, FsError> {
            match sub_path {
                "hello" => Ok(b"hello\n".to_vec()),
                "" => Err(FsError::IsADirectory),
                _ => Err(FsError::NotFound),
            }
        }

        async fn get_attributes(
            &self,
            _ctx: &RequestContext<'_>,
            sub_path: &str,
        ) -> Result<NodeAttr, FsError> {
            match sub_path {
                "hello" => Ok(NodeAttr::file(6, 0o444)),
                "" => Ok(NodeAttr::directory(0o555)),
                _ => Err(FsError::NotFound),
            }
        }
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn registry(enabled: &[&str]) -> ProviderRegistry {
        let mut reg = ProviderRegistry::new(&names(enabled));
        reg.register(Arc::new(StubProvider("secrets")));
        reg.register(Arc::new(StubProvider("tests")));
        reg.register(Arc::new(StubProvider("internal")));
        reg
    }

    #[test]
    fn enabled_follows_configured_list() {
        let reg = registry(&["secrets", "internal"]);
        assert!(reg.is_enabled("secrets"));
        assert!(reg.is_enabled("internal"));
        assert!(!reg.is_enabled("tests"));
        assert_eq!(reg.enabled_names(), names(&["internal", "secrets"]));
        assert_eq!(reg.names(), names(&["internal", "secrets", "tests"]));
    }

    #[test]
    fn unknown_names_in_list_are_ignored() {
        let reg = registry(&["secrets", "nonexistent"]);
        assert_eq!(reg.enabled_names(), names(&["secrets"]));
        assert!(reg.resolve("nonexistent").is_none());
    }

    #[test]
    fn reload_enables_and_disables() {
        let reg = registry(&["secrets"]);
        reg.reload(&names(&["tests"]));
        assert!(!reg.is_enabled("secrets"));
        assert!(reg.is_enabled("tests"));
        assert!(reg.resolve_enabled("secrets").is_none());
        assert!(reg.resolve("secrets").is_some());
    }

    #[test]
    fn context_paths_and_inodes() {
        let inodes = InodeRegistry::new();
        let caller = Caller {
            uid: 0,
            gid: 0,
            name: "root".into(),
            home: "/root".into(),
            groups: vec![],
        };
        let ctx = RequestContext {
            caller: &caller,
            inodes: &inodes,
            provider: "secrets",
        };
        assert_eq!(ctx.node_path(""), "/secrets");
        assert_eq!(ctx.node_path("a/b"), "/secrets/a/b");
        let e = ctx.dir_entry("a", "b", NodeKind::File);
        assert_eq!(e.inode, inodes.get_or_create("/secrets/a/b"));
        assert_eq!(join_sub("", "x"), "x");
    }
}
