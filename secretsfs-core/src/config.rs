use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Names of the providers visible at the mount root.
    #[serde(default = "default_enabled_providers")]
    pub enabled: Vec<String>,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub internal: InternalConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_providers(),
            templates: TemplatesConfig::default(),
            internal: InternalConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Logical name → directory holding template files.  Each name becomes a
    /// directory under the templates provider.
    #[serde(default = "default_template_roots")]
    pub roots: BTreeMap<String, PathBuf>,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            roots: default_template_roots(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalConfig {
    #[serde(default = "default_privileged_users")]
    pub privileged_users: Vec<String>,
    #[serde(default = "default_privileged_groups")]
    pub privileged_groups: Vec<String>,
}

impl Default for InternalConfig {
    fn default() -> Self {
        Self {
            privileged_users: default_privileged_users(),
            privileged_groups: default_privileged_groups(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_kind")]
    pub kind: String,
    #[serde(default)]
    pub vault: VaultConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: default_store_kind(),
            vault: VaultConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default = "default_vault_addr")]
    pub addr: String,
    /// Mount point of the KV secrets engine, without slashes.
    #[serde(default = "default_vault_mount")]
    pub mount: String,
    #[serde(default = "default_kv_version")]
    pub kv_version: u8,
    #[serde(default = "default_approle_mount")]
    pub approle_mount: String,
    /// Character in backend keys that cannot appear in a file name.
    #[serde(default = "default_bad_char")]
    pub bad_char: char,
    /// Stand-in used for `bad_char` in exposed names.
    #[serde(default = "default_subst_char")]
    pub subst_char: char,
    #[serde(default)]
    pub role_id: RoleIdConfig,
    #[serde(default)]
    pub tls: TlsConfig,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            addr: default_vault_addr(),
            mount: default_vault_mount(),
            kv_version: default_kv_version(),
            approle_mount: default_approle_mount(),
            bad_char: default_bad_char(),
            subst_char: default_subst_char(),
            role_id: RoleIdConfig::default(),
            tls: TlsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleIdConfig {
    /// Role credential file.  The first `$HOME` is replaced with the calling
    /// user's home directory.
    #[serde(default = "default_role_id_file")]
    pub file: String,
    /// Per-login-name replacement for `file`.  No fallback to `file` happens
    /// for users listed here.
    #[serde(default)]
    pub user_override: BTreeMap<String, String>,
}

impl Default for RoleIdConfig {
    fn default() -> Self {
        Self {
            file: default_role_id_file(),
            user_override: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM CA bundle.
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
    /// Directory of PEM CA files.
    #[serde(default)]
    pub ca_path: Option<PathBuf>,
    #[serde(default)]
    pub client_cert: Option<PathBuf>,
    #[serde(default)]
    pub client_key: Option<PathBuf>,
    /// Name used for SNI and certificate verification instead of the
    /// address host.
    #[serde(default)]
    pub server_name: Option<String>,
    /// Disable certificate verification.
    #[serde(default)]
    pub insecure: bool,
}

impl Config {
    /// Apply environment overrides on top of file values.
    ///
    /// `VAULT_ADDR` replaces `store.vault.addr`; `SFS_LOG_LEVEL` replaces
    /// `general.log_level`.
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("VAULT_ADDR")
            && !addr.is_empty()
        {
            self.store.vault.addr = addr;
        }
        if let Ok(level) = std::env::var("SFS_LOG_LEVEL")
            && !level.is_empty()
        {
            self.general.log_level = level;
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_enabled_providers() -> Vec<String> {
    vec![
        "secrets".to_string(),
        "templates".to_string(),
        "internal".to_string(),
    ]
}

fn default_template_roots() -> BTreeMap<String, PathBuf> {
    BTreeMap::from([(
        "default".to_string(),
        PathBuf::from("/etc/secretsfs/templates/"),
    )])
}

fn default_privileged_users() -> Vec<String> {
    vec!["root".to_string()]
}

fn default_privileged_groups() -> Vec<String> {
    vec!["admin".to_string()]
}

fn default_store_kind() -> String {
    "vault_kv".to_string()
}

fn default_vault_addr() -> String {
    "http://127.0.0.1:8200".to_string()
}

fn default_vault_mount() -> String {
    "secret".to_string()
}

fn default_kv_version() -> u8 {
    2
}

fn default_approle_mount() -> String {
    "approle".to_string()
}

fn default_bad_char() -> char {
    '/'
}

fn default_subst_char() -> char {
    '_'
}

fn default_role_id_file() -> String {
    "$HOME/.vault-roleid".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.general.log_level, "info");
        assert_eq!(cfg.providers.enabled, vec!["secrets", "templates", "internal"]);
        assert_eq!(
            cfg.providers.templates.roots.get("default"),
            Some(&PathBuf::from("/etc/secretsfs/templates/"))
        );
        assert_eq!(cfg.providers.internal.privileged_users, vec!["root"]);
        assert_eq!(cfg.providers.internal.privileged_groups, vec!["admin"]);
        assert_eq!(cfg.store.kind, "vault_kv");
        assert_eq!(cfg.store.vault.addr, "http://127.0.0.1:8200");
        assert_eq!(cfg.store.vault.mount, "secret");
        assert_eq!(cfg.store.vault.kv_version, 2);
        assert_eq!(cfg.store.vault.bad_char, '/');
        assert_eq!(cfg.store.vault.subst_char, '_');
        assert_eq!(cfg.store.vault.role_id.file, "$HOME/.vault-roleid");
        assert!(cfg.store.vault.role_id.user_override.is_empty());
        assert!(!cfg.store.vault.tls.insecure);
    }

    #[test]
    fn parse_providers_section() {
        let toml_str = r#"
            [providers]
            enabled = ["secrets", "tests"]

            [providers.templates.roots]
            apps = "/srv/templates/apps"

            [providers.internal]
            privileged_users = ["ops"]
            privileged_groups = []
        "#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.providers.enabled, vec!["secrets", "tests"]);
        assert_eq!(cfg.providers.templates.roots.len(), 1);
        assert_eq!(
            cfg.providers.templates.roots.get("apps"),
            Some(&PathBuf::from("/srv/templates/apps"))
        );
        assert_eq!(cfg.providers.internal.privileged_users, vec!["ops"]);
        assert!(cfg.providers.internal.privileged_groups.is_empty());
    }

    #[test]
    fn parse_vault_section() {
        let toml_str = r#"
            [store.vault]
            addr = "https://vault.example.com:8200"
            mount = "kv"
            kv_version = 1
            subst_char = "%"

            [store.vault.role_id]
            file = "/etc/roles/$HOME"

            [store.vault.role_id.user_override]
            alice = "/srv/roles/alice"

            [store.vault.tls]
            ca_cert = "/etc/ssl/vault-ca.pem"
            server_name = "vault.internal"
            insecure = true
        "#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        let v = &cfg.store.vault;
        assert_eq!(v.addr, "https://vault.example.com:8200");
        assert_eq!(v.mount, "kv");
        assert_eq!(v.kv_version, 1);
        assert_eq!(v.subst_char, '%');
        assert_eq!(v.bad_char, '/');
        assert_eq!(v.approle_mount, "approle");
        assert_eq!(v.role_id.file, "/etc/roles/$HOME");
        assert_eq!(
            v.role_id.user_override.get("alice").map(String::as_str),
            Some("/srv/roles/alice")
        );
        assert_eq!(v.tls.ca_cert, Some(PathBuf::from("/etc/ssl/vault-ca.pem")));
        assert!(v.tls.insecure);
        assert!(v.tls.client_cert.is_none());
        assert_eq!(v.tls.server_name.as_deref(), Some("vault.internal"));
    }

    #[test]
    fn multi_char_subst_is_rejected() {
        let toml_str = r#"
            [store.vault]
            subst_char = "__"
        "#;
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }

    #[test]
    fn config_roundtrip_serialize() {
        let cfg = Config::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.providers.enabled, cfg.providers.enabled);
        assert_eq!(back.store.vault.subst_char, cfg.store.vault.subst_char);
        assert_eq!(back.store.vault.role_id.file, cfg.store.vault.role_id.file);
    }

    #[test]
    fn env_overrides_addr_and_level() {
        let _guard = crate::TEST_ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // SAFETY: serialised by TEST_ENV_MUTEX.
        unsafe {
            std::env::set_var("VAULT_ADDR", "https://vault.internal:8200");
            std::env::set_var("SFS_LOG_LEVEL", "debug");
        }
        let mut cfg = Config::default();
        cfg.apply_env();
        unsafe {
            std::env::remove_var("VAULT_ADDR");
            std::env::remove_var("SFS_LOG_LEVEL");
        }
        assert_eq!(cfg.store.vault.addr, "https://vault.internal:8200");
        assert_eq!(cfg.general.log_level, "debug");
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let _guard = crate::TEST_ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        unsafe {
            std::env::set_var("VAULT_ADDR", "");
            std::env::remove_var("SFS_LOG_LEVEL");
        }
        let mut cfg = Config::default();
        cfg.apply_env();
        unsafe {
            std::env::remove_var("VAULT_ADDR");
        }
        assert_eq!(cfg.store.vault.addr, "http://127.0.0.1:8200");
        assert_eq!(cfg.general.log_level, "info");
    }
}
