//! Classifies KV paths into containers and values.
//!
//! A KV path can at once be a listable sub-tree, hold a value-map of its
//! own, and be a key inside its parent's value-map.  All three are checked
//! concurrently on every request; the union decides what the filesystem
//! sees.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use secretsfs_core::config::{RoleIdConfig, VaultConfig};
use secretsfs_core::naming::{expose_key, resolve_key, validate_pair};
use secretsfs_core::{Caller, Secret, SecretBytes, SecretChild, SecretKind, SecretStore, StoreError};
use tracing::{debug, warn};

use crate::api::{VaultApiError, VaultClient};
use crate::backend::{AccessToken, KvBackend};
use crate::credential::{has_override, read_role_id, role_id_path};

pub const STORE_KIND: &str = "vault_kv";

pub struct VaultStore {
    backend: Arc<dyn KvBackend>,
    role_id: RoleIdConfig,
    bad: char,
    subst: char,
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultStore")
            .field("bad", &self.bad)
            .field("subst", &self.subst)
            .finish_non_exhaustive()
    }
}

impl VaultStore {
    pub fn new(backend: Arc<dyn KvBackend>, config: &VaultConfig) -> Result<Self, StoreError> {
        validate_pair(config.bad_char, config.subst_char).map_err(StoreError::Configuration)?;
        Ok(Self {
            backend,
            role_id: config.role_id.clone(),
            bad: config.bad_char,
            subst: config.subst_char,
        })
    }

    /// Build a store talking to a real Vault server.
    pub fn from_config(config: &VaultConfig) -> Result<Self, StoreError> {
        let client = VaultClient::new(config).map_err(|e| StoreError::Configuration(e.to_string()))?;
        Self::new(Arc::new(client), config)
    }

    async fn acquire(&self, caller: &Caller) -> Result<ScopedToken<'_>, StoreError> {
        let path = role_id_path(&self.role_id, caller);
        let allow_root = has_override(&self.role_id, caller);
        let role_id = read_role_id(&path, caller, allow_root).await?;
        let token = self.backend.login(&role_id).await.map_err(|e| {
            warn!(user = %caller.name, error = %e, "backend login failed");
            StoreError::PermissionDenied(format!("login as {} failed", caller.name))
        })?;
        Ok(ScopedToken {
            backend: self.backend.as_ref(),
            token: Some(token),
        })
    }

    async fn classify(&self, token: &AccessToken, path: &str) -> Result<Secret, StoreError> {
        let (parent, last) = match path.rsplit_once('/') {
            Some((parent, last)) => (parent, last),
            None => ("", path),
        };

        let parent_read = async {
            if path.is_empty() {
                Ok(None)
            } else {
                self.backend.read(token, parent).await
            }
        };
        let (listed, own, parent_map) = tokio::join!(
            self.backend.list(token, path),
            self.backend.read(token, path),
            parent_read,
        );
        let listed = listed.map_err(unavailable)?;
        let own = own.map_err(unavailable)?;
        let mut parent_map = parent_map.map_err(unavailable)?;

        let value_key = parent_map.as_ref().and_then(|map| {
            resolve_key(last, map.keys().map(String::as_str), self.bad, self.subst)
        });
        debug!(
            path,
            container_of_containers = listed.is_some(),
            container_of_values = own.is_some(),
            value = value_key.is_some(),
            "classified"
        );

        if listed.is_some() || own.is_some() {
            let mut children: BTreeMap<String, SecretKind> = BTreeMap::new();
            for key in own.iter().flat_map(|map| map.keys()) {
                let name = expose_key(key, self.bad, self.subst);
                if name.contains('/') {
                    debug!(path, key = %key, "value key cannot be a file name, skipping");
                    continue;
                }
                children.insert(name, SecretKind::Value);
            }
            for entry in listed.iter().flatten() {
                let name = entry.trim_end_matches('/');
                if !name.is_empty() {
                    children.insert(name.to_string(), SecretKind::Container);
                }
            }
            let children = children
                .into_iter()
                .map(|(name, kind)| SecretChild { name, kind })
                .collect();
            return Ok(Secret::container(path, children));
        }

        if let (Some(key), Some(map)) = (value_key, parent_map.as_mut())
            && let Some(value) = map.get_mut(&key)
        {
            let content = SecretBytes::from(std::mem::take(&mut **value));
            return Ok(Secret::value(path, content));
        }

        debug!(path, "no filetype matched, hiding path");
        Ok(Secret::hidden(path))
    }
}

fn unavailable(e: VaultApiError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// Hands the token back to the backend on every exit path.
struct ScopedToken<'a> {
    backend: &'a dyn KvBackend,
    token: Option<AccessToken>,
}

impl ScopedToken<'_> {
    fn get(&self) -> Result<&AccessToken, StoreError> {
        self.token
            .as_ref()
            .ok_or_else(|| StoreError::PermissionDenied("token already released".to_string()))
    }
}

impl Drop for ScopedToken<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.backend.release(token);
        }
    }
}

#[async_trait]
impl SecretStore for VaultStore {
    fn kind(&self) -> &str {
        STORE_KIND
    }

    async fn get_secret(&self, path: &str, caller: &Caller) -> Result<Secret, StoreError> {
        let path = path.trim_matches('/');
        let scoped = self.acquire(caller).await?;
        self.classify(scoped.get()?, path).await
    }

    fn describe(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": STORE_KIND,
            "backend": self.backend.describe(),
            "bad_char": self.bad.to_string(),
            "subst_char": self.subst.to_string(),
            "role_id_file": self.role_id.file,
            "role_id_overrides": self.role_id.user_override.keys().collect::<Vec<_>>(),
        })
    }

    fn credential_path(&self, caller: &Caller) -> PathBuf {
        role_id_path(&self.role_id, caller)
    }
}
