//! The `templates` view: files on disk rendered with secrets from the store.
//!
//! Each configured root (logical name → directory) becomes a directory under
//! the provider; below it the on-disk tree is mirrored.  Files are rendered
//! on every read, as the caller.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use secretsfs_core::provider::{
    DirEntry, LookupEntry, NodeAttr, NodeKind, Provider, RequestContext, join_sub,
};
use secretsfs_core::{FsError, SecretStore};
use tracing::{debug, warn};

use crate::template;

pub const NAME: &str = "templates";

const DIR_PERM: u16 = 0o555;
const FILE_PERM: u16 = 0o444;

/// What a sub-path of this provider points at.
#[derive(Debug, PartialEq, Eq)]
enum Location {
    /// The provider root, listing the logical root names.
    Top,
    /// A configured root directory itself.
    Root(PathBuf),
    /// Something below a root.
    Disk(PathBuf),
}

pub struct TemplatesProvider {
    roots: BTreeMap<String, PathBuf>,
    store: Arc<dyn SecretStore>,
}

impl TemplatesProvider {
    pub fn new(roots: BTreeMap<String, PathBuf>, store: Arc<dyn SecretStore>) -> Self {
        Self { roots, store }
    }

    fn locate(&self, sub_path: &str) -> Result<Location, FsError> {
        if sub_path.is_empty() {
            return Ok(Location::Top);
        }
        let mut segments = sub_path.split('/');
        let root_name = segments.next().unwrap_or_default();
        let root = self.roots.get(root_name).ok_or(FsError::NotFound)?;

        let mut path = root.clone();
        let mut below = false;
        for segment in segments {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(FsError::NotFound);
            }
            path.push(segment);
            below = true;
        }
        Ok(if below {
            Location::Disk(path)
        } else {
            Location::Root(path)
        })
    }

    async fn secret_content(&self, ctx: &RequestContext<'_>, path: String) -> Result<Vec<u8>, FsError> {
        let secret = self.store.get_secret(&path, ctx.caller).await?;
        if secret.is_container() || secret.content_bytes().is_empty() {
            return Err(FsError::Configuration(format!("secret '{path}' is empty")));
        }
        Ok(secret.content_bytes().to_vec())
    }

    async fn render(&self, ctx: &RequestContext<'_>, file: &Path) -> Result<Vec<u8>, FsError> {
        let src = tokio::fs::read_to_string(file).await.map_err(|e| {
            warn!(path = %file.display(), error = %e, "cannot read template");
            io_error(&e)
        })?;
        template::render(&src, |path| self.secret_content(ctx, path)).await
    }

    async fn attr_of(&self, ctx: &RequestContext<'_>, location: &Location) -> Result<NodeAttr, FsError> {
        let path = match location {
            Location::Top | Location::Root(_) => return Ok(NodeAttr::directory(DIR_PERM)),
            Location::Disk(path) => path,
        };
        let meta = tokio::fs::metadata(path).await.map_err(|e| io_error(&e))?;
        if meta.is_dir() {
            return Ok(NodeAttr::directory(DIR_PERM));
        }
        let size = match self.render(ctx, path).await {
            Ok(content) => content.len() as u64,
            Err(e) => {
                warn!(path = %path.display(), user = %ctx.caller.name, error = %e, "template render failed");
                0
            }
        };
        Ok(NodeAttr::file(size, FILE_PERM))
    }
}

fn io_error(e: &std::io::Error) -> FsError {
    match e.kind() {
        std::io::ErrorKind::NotFound => FsError::NotFound,
        std::io::ErrorKind::PermissionDenied => FsError::PermissionDenied(e.to_string()),
        std::io::ErrorKind::NotADirectory => FsError::NotADirectory,
        _ => FsError::Unavailable(e.to_string()),
    }
}

#[async_trait]
impl Provider for TemplatesProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_directory(
        &self,
        ctx: &RequestContext<'_>,
        sub_path: &str,
    ) -> Result<Vec<DirEntry>, FsError> {
        let dir = match self.locate(sub_path)? {
            Location::Top => {
                return Ok(self
                    .roots
                    .keys()
                    .map(|name| ctx.dir_entry("", name, NodeKind::Directory))
                    .collect());
            }
            Location::Root(dir) | Location::Disk(dir) => dir,
        };

        let mut read_dir = tokio::fs::read_dir(&dir).await.map_err(|e| {
            debug!(path = %dir.display(), error = %e, "cannot list template directory");
            io_error(&e)
        })?;
        let mut found = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(|e| io_error(&e))? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let is_dir = tokio::fs::metadata(entry.path())
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            let kind = if is_dir { NodeKind::Directory } else { NodeKind::File };
            found.push((name, kind));
        }
        found.sort();
        Ok(found
            .into_iter()
            .map(|(name, kind)| ctx.dir_entry(sub_path, &name, kind))
            .collect())
    }

    async fn lookup(
        &self,
        ctx: &RequestContext<'_>,
        sub_path: &str,
        name: &str,
    ) -> Result<LookupEntry, FsError> {
        let child = join_sub(sub_path, name);
        let attr = self.attr_of(ctx, &self.locate(&child)?).await?;
        Ok(ctx.lookup_entry(sub_path, name, attr))
    }

    async fn read(&self, ctx: &RequestContext<'_>, sub_path: &str) -> Result<Vec<u8>, FsError> {
        match self.locate(sub_path)? {
            Location::Top | Location::Root(_) => Err(FsError::IsADirectory),
            Location::Disk(path) => {
                if tokio::fs::metadata(&path).await.map_err(|e| io_error(&e))?.is_dir() {
                    return Err(FsError::IsADirectory);
                }
                self.render(ctx, &path).await.inspect_err(|e| {
                    warn!(path = %path.display(), user = %ctx.caller.name, error = %e, "template render failed");
                })
            }
        }
    }

    async fn get_attributes(
        &self,
        ctx: &RequestContext<'_>,
        sub_path: &str,
    ) -> Result<NodeAttr, FsError> {
        self.attr_of(ctx, &self.locate(sub_path)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockStore, caller, context};
    use secretsfs_core::SecretKind;
    use secretsfs_core::inode::InodeRegistry;

    struct Fixture {
        _dir: tempfile::TempDir,
        provider: TemplatesProvider,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let apps = dir.path().join("apps");
        std::fs::create_dir_all(apps.join("nested")).unwrap();
        std::fs::write(
            apps.join("db.conf"),
            "user={{ .Get \"app/user\" }}\npass={{ get \"app/tls_cert\" }}\n",
        )
        .unwrap();
        std::fs::write(apps.join("nested/static.txt"), "static\n").unwrap();
        std::fs::write(apps.join("broken.conf"), "x={{ .Get \"app/missing\" }}\n").unwrap();
        std::fs::write(apps.join("bad.conf"), "x={{ .Env \"HOME\" }}\n").unwrap();

        let store = MockStore::default()
            .container("app", &[("user", SecretKind::Value)])
            .value("app/user", "admin")
            .value("app/tls_cert", "PEM");
        let roots = BTreeMap::from([("apps".to_string(), apps)]);
        Fixture {
            _dir: dir,
            provider: TemplatesProvider::new(roots, Arc::new(store)),
        }
    }

    #[tokio::test]
    async fn top_lists_root_names() {
        let f = fixture();
        let inodes = InodeRegistry::new();
        let c = caller("alice");
        let ctx = context(&c, &inodes, NAME);
        let entries = f.provider.list_directory(&ctx, "").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "apps");
        assert_eq!(entries[0].inode, inodes.get_or_create("/templates/apps"));
    }

    #[tokio::test]
    async fn mirrors_disk_tree() {
        let f = fixture();
        let inodes = InodeRegistry::new();
        let c = caller("alice");
        let ctx = context(&c, &inodes, NAME);
        let entries = f.provider.list_directory(&ctx, "apps").await.unwrap();
        let names: Vec<(&str, NodeKind)> = entries.iter().map(|e| (e.name.as_str(), e.kind)).collect();
        assert_eq!(
            names,
            vec![
                ("bad.conf", NodeKind::File),
                ("broken.conf", NodeKind::File),
                ("db.conf", NodeKind::File),
                ("nested", NodeKind::Directory),
            ]
        );
        let nested = f.provider.list_directory(&ctx, "apps/nested").await.unwrap();
        assert_eq!(nested[0].name, "static.txt");
    }

    #[tokio::test]
    async fn renders_secrets_into_file() {
        let f = fixture();
        let inodes = InodeRegistry::new();
        let c = caller("alice");
        let ctx = context(&c, &inodes, NAME);
        let expected = b"user=admin\npass=PEM\n";
        assert_eq!(f.provider.read(&ctx, "apps/db.conf").await.unwrap(), expected);
        let found = f.provider.lookup(&ctx, "apps", "db.conf").await.unwrap();
        assert_eq!(found.attr, NodeAttr::file(expected.len() as u64, FILE_PERM));
    }

    #[tokio::test]
    async fn failed_render_reads_as_error_with_zero_size() {
        let f = fixture();
        let inodes = InodeRegistry::new();
        let c = caller("alice");
        let ctx = context(&c, &inodes, NAME);
        assert!(matches!(
            f.provider.read(&ctx, "apps/broken.conf").await,
            Err(FsError::Configuration(_))
        ));
        assert!(matches!(
            f.provider.read(&ctx, "apps/bad.conf").await,
            Err(FsError::Configuration(_))
        ));
        let attr = f.provider.get_attributes(&ctx, "apps/broken.conf").await.unwrap();
        assert_eq!(attr, NodeAttr::file(0, FILE_PERM));
    }

    #[tokio::test]
    async fn traversal_and_unknown_roots_are_not_found() {
        let f = fixture();
        let inodes = InodeRegistry::new();
        let c = caller("alice");
        let ctx = context(&c, &inodes, NAME);
        assert!(matches!(
            f.provider.read(&ctx, "apps/../apps/db.conf").await,
            Err(FsError::NotFound)
        ));
        assert!(matches!(
            f.provider.list_directory(&ctx, "other").await,
            Err(FsError::NotFound)
        ));
        assert!(matches!(
            f.provider.lookup(&ctx, "apps", "absent.conf").await,
            Err(FsError::NotFound)
        ));
        assert!(matches!(
            f.provider.read(&ctx, "apps/nested").await,
            Err(FsError::IsADirectory)
        ));
    }
}
