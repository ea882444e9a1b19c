use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use zeroize::Zeroizing;

pub mod config;
pub mod error;
pub mod inode;
pub mod naming;
pub mod provider;
pub mod router;

pub use error::FsError;

/// Crate-wide mutex used by tests that mutate process environment variables.
///
/// `config` tests call `unsafe { env::set_var(...) }`; a single lock keeps
/// them from racing when run in parallel in the same test binary.
#[cfg(test)]
pub(crate) static TEST_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// The identity a filesystem request is issued under.
///
/// Resolved once per request by the transport from the kernel-supplied uid
/// and gid.  Stores scope their backend credentials to this identity;
/// providers use it for privilege checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Caller {
    pub uid: u32,
    pub gid: u32,
    /// Login name.
    pub name: String,
    pub home: PathBuf,
    /// Names of every group the caller belongs to, primary group included.
    pub groups: Vec<String>,
}

impl Caller {
    pub fn in_any_group(&self, groups: &[String]) -> bool {
        self.groups.iter().any(|g| groups.contains(g))
    }
}

/// Bytes that must be scrubbed from memory once dropped.
pub struct SecretBytes(Zeroizing<Vec<u8>>);

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for SecretBytes {
    fn from(s: String) -> Self {
        Self::new(s.into_bytes())
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretBytes([redacted])")
    }
}

impl Clone for SecretBytes {
    fn clone(&self) -> Self {
        Self(Zeroizing::new(self.0.to_vec()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    Container,
    Value,
}

/// Summary of one child of a container secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretChild {
    pub name: String,
    pub kind: SecretKind,
}

/// A store's answer for one path.
///
/// `content` is only set for [`SecretKind::Value`]; `children` is only
/// populated for [`SecretKind::Container`].  `hidden` marks a container the
/// caller could not classify (no type check succeeded); it is exposed with no
/// permission bits.
#[derive(Debug, Clone)]
pub struct Secret {
    pub path: String,
    pub kind: SecretKind,
    pub content: Option<SecretBytes>,
    pub children: Vec<SecretChild>,
    pub hidden: bool,
}

impl Secret {
    pub fn container(path: impl Into<String>, children: Vec<SecretChild>) -> Self {
        Self {
            path: path.into(),
            kind: SecretKind::Container,
            content: None,
            children,
            hidden: false,
        }
    }

    pub fn value(path: impl Into<String>, content: SecretBytes) -> Self {
        Self {
            path: path.into(),
            kind: SecretKind::Value,
            content: Some(content),
            children: Vec::new(),
            hidden: false,
        }
    }

    /// An empty container for a path none of the type checks could resolve.
    pub fn hidden(path: impl Into<String>) -> Self {
        Self {
            hidden: true,
            ..Self::container(path, Vec::new())
        }
    }

    pub fn is_container(&self) -> bool {
        self.kind == SecretKind::Container
    }

    /// Content bytes, empty for containers.
    pub fn content_bytes(&self) -> &[u8] {
        self.content.as_ref().map(SecretBytes::as_slice).unwrap_or(&[])
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// A secrets backend as seen by the providers.
///
/// Every call acquires and releases its own credential; implementations must
/// not carry backend sessions across calls.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Short machine-readable identifier, e.g. `vault_kv`.
    fn kind(&self) -> &str;

    async fn get_secret(&self, path: &str, caller: &Caller) -> Result<Secret, StoreError>;

    /// Non-sensitive description of the store's configuration.
    fn describe(&self) -> serde_json::Value;

    /// Where the caller's role credential is read from.
    fn credential_path(&self, caller: &Caller) -> PathBuf;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_bytes_debug_is_redacted() {
        let b = SecretBytes::from("hunter2".to_string());
        let dbg = format!("{b:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("redacted"));
    }

    #[test]
    fn secret_debug_does_not_leak_content() {
        let s = Secret::value("a/b", SecretBytes::from("s3cr3t".to_string()));
        assert!(!format!("{s:?}").contains("s3cr3t"));
    }

    #[test]
    fn hidden_secret_is_empty_container() {
        let s = Secret::hidden("x");
        assert!(s.is_container());
        assert!(s.hidden);
        assert!(s.children.is_empty());
        assert!(s.content_bytes().is_empty());
    }

    #[test]
    fn caller_group_membership() {
        let c = Caller {
            uid: 1000,
            gid: 1000,
            name: "alice".into(),
            home: PathBuf::from("/home/alice"),
            groups: vec!["alice".into(), "wheel".into()],
        };
        assert!(c.in_any_group(&["wheel".to_string()]));
        assert!(!c.in_any_group(&["admin".to_string()]));
    }
}
