//! The `secrets` view: the store's hierarchy, one directory per container
//! and one file per value.

use std::sync::Arc;

use async_trait::async_trait;
use secretsfs_core::provider::{
    DirEntry, LookupEntry, NodeAttr, NodeKind, Provider, RequestContext, join_sub,
};
use secretsfs_core::{FsError, Secret, SecretKind, SecretStore};
use tracing::debug;

pub const NAME: &str = "secrets";

const DIR_PERM: u16 = 0o550;
const FILE_PERM: u16 = 0o440;
/// Containers no type check could classify.
const HIDDEN_PERM: u16 = 0o000;

pub struct SecretsProvider {
    store: Arc<dyn SecretStore>,
}

impl SecretsProvider {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    async fn fetch(&self, ctx: &RequestContext<'_>, sub_path: &str) -> Result<Secret, FsError> {
        self.store
            .get_secret(sub_path, ctx.caller)
            .await
            .map_err(|e| {
                debug!(path = sub_path, user = %ctx.caller.name, error = %e, "store request failed");
                FsError::from(e)
            })
    }
}

fn attr_of(secret: &Secret) -> NodeAttr {
    match secret.kind {
        SecretKind::Value => NodeAttr::file(secret.content_bytes().len() as u64, FILE_PERM),
        SecretKind::Container if secret.hidden => NodeAttr::directory(HIDDEN_PERM),
        SecretKind::Container => NodeAttr::directory(DIR_PERM),
    }
}

fn node_kind(kind: SecretKind) -> NodeKind {
    match kind {
        SecretKind::Container => NodeKind::Directory,
        SecretKind::Value => NodeKind::File,
    }
}

#[async_trait]
impl Provider for SecretsProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_directory(
        &self,
        ctx: &RequestContext<'_>,
        sub_path: &str,
    ) -> Result<Vec<DirEntry>, FsError> {
        let secret = self.fetch(ctx, sub_path).await?;
        if !secret.is_container() {
            return Err(FsError::NotADirectory);
        }
        Ok(secret
            .children
            .iter()
            .map(|child| ctx.dir_entry(sub_path, &child.name, node_kind(child.kind)))
            .collect())
    }

    async fn lookup(
        &self,
        ctx: &RequestContext<'_>,
        sub_path: &str,
        name: &str,
    ) -> Result<LookupEntry, FsError> {
        let secret = self.fetch(ctx, &join_sub(sub_path, name)).await?;
        Ok(ctx.lookup_entry(sub_path, name, attr_of(&secret)))
    }

    async fn read(&self, ctx: &RequestContext<'_>, sub_path: &str) -> Result<Vec<u8>, FsError> {
        let secret = self.fetch(ctx, sub_path).await?;
        if secret.is_container() {
            return Err(FsError::IsADirectory);
        }
        Ok(secret.content_bytes().to_vec())
    }

    async fn get_attributes(
        &self,
        ctx: &RequestContext<'_>,
        sub_path: &str,
    ) -> Result<NodeAttr, FsError> {
        let secret = self.fetch(ctx, sub_path).await?;
        Ok(attr_of(&secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockStore, caller, context};
    use secretsfs_core::inode::InodeRegistry;

    fn provider() -> SecretsProvider {
        let store = MockStore::default()
            .container(
                "",
                &[("app", SecretKind::Container), ("motd", SecretKind::Value)],
            )
            .container(
                "app",
                &[("db", SecretKind::Container), ("tls_cert", SecretKind::Value)],
            )
            .value("app/tls_cert", "-----BEGIN CERTIFICATE-----\n")
            .value("motd", "hello")
            .deny("locked");
        SecretsProvider::new(Arc::new(store))
    }

    #[tokio::test]
    async fn lists_children_with_kinds() {
        let p = provider();
        let inodes = InodeRegistry::new();
        let c = caller("alice");
        let ctx = context(&c, &inodes, NAME);

        let entries = p.list_directory(&ctx, "app").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "db");
        assert_eq!(entries[0].kind, NodeKind::Directory);
        assert_eq!(entries[1].name, "tls_cert");
        assert_eq!(entries[1].kind, NodeKind::File);
        assert_eq!(entries[1].inode, inodes.get_or_create("/secrets/app/tls_cert"));
    }

    #[tokio::test]
    async fn value_reads_and_reports_size() {
        let p = provider();
        let inodes = InodeRegistry::new();
        let c = caller("alice");
        let ctx = context(&c, &inodes, NAME);

        let found = p.lookup(&ctx, "app", "tls_cert").await.unwrap();
        assert_eq!(found.attr, NodeAttr::file(28, FILE_PERM));
        assert_eq!(
            p.read(&ctx, "app/tls_cert").await.unwrap(),
            b"-----BEGIN CERTIFICATE-----\n"
        );
        assert!(matches!(
            p.list_directory(&ctx, "motd").await,
            Err(FsError::NotADirectory)
        ));
    }

    #[tokio::test]
    async fn container_read_is_rejected() {
        let p = provider();
        let inodes = InodeRegistry::new();
        let c = caller("alice");
        let ctx = context(&c, &inodes, NAME);
        assert!(matches!(p.read(&ctx, "app").await, Err(FsError::IsADirectory)));
        assert_eq!(
            p.get_attributes(&ctx, "app").await.unwrap(),
            NodeAttr::directory(DIR_PERM)
        );
    }

    #[tokio::test]
    async fn unresolvable_path_is_hidden_empty_directory() {
        let p = provider();
        let inodes = InodeRegistry::new();
        let c = caller("alice");
        let ctx = context(&c, &inodes, NAME);

        let found = p.lookup(&ctx, "app", "unknown").await.unwrap();
        assert_eq!(found.attr, NodeAttr::directory(HIDDEN_PERM));
        assert_eq!(
            p.get_attributes(&ctx, "app/unknown").await.unwrap(),
            NodeAttr::directory(HIDDEN_PERM)
        );
        assert!(p.list_directory(&ctx, "app/unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_denial_maps_to_permission_denied() {
        let p = provider();
        let inodes = InodeRegistry::new();
        let c = caller("alice");
        let ctx = context(&c, &inodes, NAME);
        assert!(matches!(
            p.lookup(&ctx, "", "locked").await,
            Err(FsError::PermissionDenied(_))
        ));
    }
}
