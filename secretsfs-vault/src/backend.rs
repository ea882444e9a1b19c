use std::collections::BTreeMap;

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::api::VaultApiError;

/// One stored value-map: key → value text.
pub type ValueMap = BTreeMap<String, Zeroizing<String>>;

/// A short-lived backend token, scrubbed from memory on drop.
pub struct AccessToken(Zeroizing<String>);

impl AccessToken {
    pub fn new(token: String) -> Self {
        Self(Zeroizing::new(token))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken([redacted])")
    }
}

/// The three queries the store issues against a KV hierarchy.
///
/// `Ok(None)` from `list` or `read` means the path is absent or the token is
/// not allowed to see it; both make the corresponding type check false.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Exchange a role credential for an access token.
    async fn login(&self, role_id: &str) -> Result<AccessToken, VaultApiError>;

    /// Child names under `path`.  Sub-trees carry a trailing `/`.
    async fn list(&self, token: &AccessToken, path: &str) -> Result<Option<Vec<String>>, VaultApiError>;

    /// The value-map stored at `path`.
    async fn read(&self, token: &AccessToken, path: &str) -> Result<Option<ValueMap>, VaultApiError>;

    /// Give a token back once a request is done with it.
    ///
    /// The default just drops it, which zeroizes the buffer.
    fn release(&self, token: AccessToken) {
        drop(token);
    }

    /// Non-sensitive connection settings.
    fn describe(&self) -> serde_json::Value;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_debug_is_redacted() {
        let t = AccessToken::new("hvs.secret-token".to_string());
        let dbg = format!("{t:?}");
        assert!(!dbg.contains("hvs.secret-token"));
        assert_eq!(t.expose(), "hvs.secret-token");
    }
}
