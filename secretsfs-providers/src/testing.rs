//! Shared fixtures for provider tests.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use secretsfs_core::inode::InodeRegistry;
use secretsfs_core::provider::RequestContext;
use secretsfs_core::{Caller, Secret, SecretBytes, SecretChild, SecretKind, SecretStore, StoreError};

pub(crate) fn caller(name: &str) -> Caller {
    Caller {
        uid: 1000,
        gid: 1000,
        name: name.to_string(),
        home: PathBuf::from(format!("/home/{name}")),
        groups: vec![name.to_string()],
    }
}

pub(crate) fn context<'a>(
    caller: &'a Caller,
    inodes: &'a InodeRegistry,
    provider: &'a str,
) -> RequestContext<'a> {
    RequestContext {
        caller,
        inodes,
        provider,
    }
}

/// In-memory store.  Paths not registered resolve to a hidden container.
#[derive(Default)]
pub(crate) struct MockStore {
    containers: BTreeMap<String, Vec<SecretChild>>,
    values: BTreeMap<String, String>,
    denied: BTreeSet<String>,
    pub(crate) requests: Mutex<Vec<String>>,
}

impl MockStore {
    pub(crate) fn container(mut self, path: &str, children: &[(&str, SecretKind)]) -> Self {
        self.containers.insert(
            path.to_string(),
            children
                .iter()
                .map(|(name, kind)| SecretChild {
                    name: name.to_string(),
                    kind: *kind,
                })
                .collect(),
        );
        self
    }

    pub(crate) fn value(mut self, path: &str, content: &str) -> Self {
        self.values.insert(path.to_string(), content.to_string());
        self
    }

    pub(crate) fn deny(mut self, path: &str) -> Self {
        self.denied.insert(path.to_string());
        self
    }
}

#[async_trait]
impl SecretStore for MockStore {
    fn kind(&self) -> &str {
        "mock"
    }

    async fn get_secret(&self, path: &str, _caller: &Caller) -> Result<Secret, StoreError> {
        let path = path.trim_matches('/');
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(path.to_string());
        if self.denied.contains(path) {
            return Err(StoreError::PermissionDenied(format!("denied: {path}")));
        }
        if let Some(children) = self.containers.get(path) {
            return Ok(Secret::container(path, children.clone()));
        }
        if let Some(content) = self.values.get(path) {
            return Ok(Secret::value(path, SecretBytes::from(content.clone())));
        }
        Ok(Secret::hidden(path))
    }

    fn describe(&self) -> serde_json::Value {
        serde_json::json!({"kind": "mock", "paths": self.values.len()})
    }

    fn credential_path(&self, caller: &Caller) -> PathBuf {
        caller.home.join(".vault-roleid")
    }
}
