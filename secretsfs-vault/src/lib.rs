//! HashiCorp Vault KV store for secretsfs.
//!
//! Talks to the Vault HTTP API directly with `reqwest`.  Each request logs
//! in with the calling user's AppRole `role_id`, classifies the KV path,
//! and hands the token back before returning:
//!
//! ```text
//! role_id file ──login──▶ token ──list / read / read(parent)──▶ Secret
//!                           └──────────── released on drop ─────────┘
//! ```
//!
//! # Layout
//!
//! - [`api`]: HTTP client and wire types ([`VaultClient`])
//! - [`backend`]: the [`KvBackend`] trait the store is written against
//! - [`credential`]: role credential path expansion and file checks
//! - [`store`]: [`VaultStore`], the [`secretsfs_core::SecretStore`] implementation

pub mod api;
pub mod backend;
pub mod credential;
pub mod store;

pub use api::{VaultApiError, VaultClient};
pub use backend::{AccessToken, KvBackend};
pub use store::{STORE_KIND, VaultStore};
