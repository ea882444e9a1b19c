//! Vault HTTP API client.
//!
//! Covers the three calls the store needs, against a KV secrets engine:
//!
//! 1. POST `{addr}/v1/auth/{approle}/login` with `{"role_id": …}` → `auth.client_token`
//! 2. GET  `{addr}/v1/{mount}/metadata/{path}?list=true` → `data.keys`      (KV v2)
//! 3. GET  `{addr}/v1/{mount}/data/{path}`               → `data.data`      (KV v2)
//!
//! KV v1 mounts drop the `metadata`/`data` infix and return the value-map
//! directly under `data`.  A 403 or 404 on a list or read means "nothing the
//! caller may see here" and is returned as `Ok(None)`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode, Url};
use secretsfs_core::config::VaultConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::backend::{AccessToken, KvBackend, ValueMap};

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

pub struct VaultClient {
    http: HttpClient,
    base: Url,
    mount: String,
    kv_version: u8,
    approle_mount: String,
    insecure: bool,
    server_name: Option<String>,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("base", &self.base.as_str())
            .field("mount", &self.mount)
            .field("kv_version", &self.kv_version)
            .finish_non_exhaustive()
    }
}

impl VaultClient {
    pub fn new(config: &VaultConfig) -> Result<Self, VaultApiError> {
        let base = Url::parse(&config.addr)
            .map_err(|e| VaultApiError::Config(format!("invalid address '{}': {e}", config.addr)))?;
        if base.cannot_be_a_base() {
            return Err(VaultApiError::Config(format!(
                "address '{}' cannot be used as a base URL",
                config.addr
            )));
        }
        if !matches!(config.kv_version, 1 | 2) {
            return Err(VaultApiError::Config(format!(
                "unsupported KV version {} (expected 1 or 2)",
                config.kv_version
            )));
        }

        let mut builder = HttpClient::builder()
            .user_agent(format!("secretsfs/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10));

        let tls = &config.tls;
        if let Some(ca) = &tls.ca_cert {
            for cert in load_ca_bundle(ca)? {
                builder = builder.add_root_certificate(cert);
            }
        }
        if let Some(dir) = &tls.ca_path {
            let entries = std::fs::read_dir(dir)
                .map_err(|e| VaultApiError::Tls(format!("read CA directory {}: {e}", dir.display())))?;
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() {
                    for cert in load_ca_bundle(&path)? {
                        builder = builder.add_root_certificate(cert);
                    }
                }
            }
        }
        match (&tls.client_cert, &tls.client_key) {
            (Some(cert), Some(key)) => {
                let mut pem = Zeroizing::new(read_pem(cert)?);
                pem.extend_from_slice(&read_pem(key)?);
                let identity = reqwest::Identity::from_pem(&pem)
                    .map_err(|e| VaultApiError::Tls(format!("client identity: {e}")))?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(VaultApiError::Tls(
                    "client_cert and client_key must be set together".to_string(),
                ));
            }
        }
        if tls.insecure {
            warn!(addr = %config.addr, "TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let base = match tls.server_name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => {
                let (url, addrs) = pin_server_name(&base, name)?;
                debug!(server_name = name, ?addrs, "pinning TLS server name");
                builder = builder.resolve_to_addrs(name, &addrs);
                url
            }
            None => base,
        };

        let http = builder.build().map_err(VaultApiError::Http)?;
        Ok(Self {
            http,
            base,
            mount: config.mount.trim_matches('/').to_string(),
            kv_version: config.kv_version,
            approle_mount: config.approle_mount.trim_matches('/').to_string(),
            insecure: tls.insecure,
            server_name: tls.server_name.clone(),
        })
    }

    /// `{addr}/v1/<segments…>`, each segment percent-encoded on its own.
    fn url<'a, I>(&self, segments: I) -> Result<Url, VaultApiError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| VaultApiError::Config("address cannot be a base URL".to_string()))?
            .pop_if_empty()
            .push("v1")
            .extend(segments.into_iter().filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn kv_url(&self, infix: &str, path: &str) -> Result<Url, VaultApiError> {
        let mut segments = vec![self.mount.as_str()];
        if self.kv_version == 2 {
            segments.push(infix);
        }
        segments.extend(path.split('/'));
        self.url(segments)
    }

    fn list_url(&self, path: &str) -> Result<Url, VaultApiError> {
        let mut url = self.kv_url("metadata", path)?;
        url.query_pairs_mut().append_pair("list", "true");
        Ok(url)
    }

    fn read_url(&self, path: &str) -> Result<Url, VaultApiError> {
        self.kv_url("data", path)
    }

    async fn get(&self, url: Url, token: &AccessToken) -> Result<Option<serde_json::Value>, VaultApiError> {
        let resp = self
            .http
            .get(url.clone())
            .header("X-Vault-Token", token.expose())
            .send()
            .await
            .map_err(VaultApiError::Http)?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::FORBIDDEN {
            debug!(path = url.path(), %status, "vault path not visible");
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VaultApiError::Api(format!(
                "GET {} failed ({status}): {body}",
                url.path()
            )));
        }
        let value = resp.json().await.map_err(VaultApiError::Http)?;
        Ok(Some(value))
    }
}

#[async_trait]
impl KvBackend for VaultClient {
    async fn login(&self, role_id: &str) -> Result<AccessToken, VaultApiError> {
        let url = self.url(["auth", self.approle_mount.as_str(), "login"])?;
        debug!(path = url.path(), "vault approle login");

        let resp = self
            .http
            .post(url)
            .json(&LoginRequest { role_id })
            .send()
            .await
            .map_err(VaultApiError::Http)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(VaultApiError::Denied(format!(
                "approle login failed ({status}): {body}"
            )));
        }

        let login: LoginResponse = resp.json().await.map_err(VaultApiError::Http)?;
        let auth = login
            .auth
            .ok_or_else(|| VaultApiError::Denied("login response carried no auth block".to_string()))?;
        debug!("vault approle login ok");
        Ok(auth.into_token())
    }

    async fn list(&self, token: &AccessToken, path: &str) -> Result<Option<Vec<String>>, VaultApiError> {
        let Some(body) = self.get(self.list_url(path)?, token).await? else {
            return Ok(None);
        };
        let list: ListResponse = serde_json::from_value(body)
            .map_err(|e| VaultApiError::Api(format!("unexpected list response: {e}")))?;
        Ok(Some(list.data.keys))
    }

    async fn read(&self, token: &AccessToken, path: &str) -> Result<Option<ValueMap>, VaultApiError> {
        if path.is_empty() {
            return Ok(None);
        }
        let Some(body) = self.get(self.read_url(path)?, token).await? else {
            return Ok(None);
        };
        let data = match self.kv_version {
            2 => body.get("data").and_then(|d| d.get("data")),
            _ => body.get("data"),
        };
        // KV v2 returns `data: null` for soft-deleted versions.
        Ok(data.and_then(|d| d.as_object()).map(|obj| {
            obj.iter()
                .map(|(k, v)| (k.clone(), Zeroizing::new(value_to_string(v))))
                .collect()
        }))
    }

    fn describe(&self) -> serde_json::Value {
        serde_json::json!({
            "addr": self.base.as_str(),
            "mount": self.mount,
            "kv_version": self.kv_version,
            "approle_mount": self.approle_mount,
            "tls_insecure": self.insecure,
            "tls_server_name": self.server_name,
        })
    }
}

fn value_to_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Address the server as `server_name` while still connecting to the
/// configured host, so SNI and certificate checks use `server_name`.
fn pin_server_name(base: &Url, server_name: &str) -> Result<(Url, Vec<SocketAddr>), VaultApiError> {
    let addrs = base
        .socket_addrs(|| None)
        .map_err(|e| VaultApiError::Config(format!("resolve {base}: {e}")))?;
    let mut url = base.clone();
    url.set_host(Some(server_name))
        .map_err(|e| VaultApiError::Config(format!("invalid server_name '{server_name}': {e}")))?;
    Ok((url, addrs))
}

fn read_pem(path: &Path) -> Result<Vec<u8>, VaultApiError> {
    std::fs::read(path).map_err(|e| VaultApiError::Tls(format!("read {}: {e}", path.display())))
}

fn load_ca_bundle(path: &Path) -> Result<Vec<reqwest::Certificate>, VaultApiError> {
    let pem = read_pem(path)?;
    reqwest::Certificate::from_pem_bundle(&pem)
        .map_err(|e| VaultApiError::Tls(format!("parse CA bundle {}: {e}", path.display())))
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct LoginRequest<'a> {
    role_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    auth: Option<LoginAuth>,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
}

impl std::fmt::Debug for LoginAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginAuth")
            .field("client_token", &"[redacted]")
            .finish()
    }
}

impl LoginAuth {
    /// Move the raw token straight into a zeroizing wrapper.
    fn into_token(self) -> AccessToken {
        AccessToken::new(self.client_token)
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    data: ListData,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    keys: Vec<String>,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum VaultApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("authentication failed: {0}")]
    Denied(String),

    #[error("TLS configuration: {0}")]
    Tls(String),

    #[error("configuration: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
