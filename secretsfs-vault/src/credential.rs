//! Per-caller role credential lookup.

use std::path::{Path, PathBuf};

use secretsfs_core::config::RoleIdConfig;
use secretsfs_core::{Caller, StoreError};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Where `caller`'s role credential lives.
///
/// A per-user override replaces the configured template entirely.  The
/// first `$HOME` in the chosen template expands to the caller's home
/// directory.
pub fn role_id_path(config: &RoleIdConfig, caller: &Caller) -> PathBuf {
    let template = config
        .user_override
        .get(&caller.name)
        .unwrap_or(&config.file);
    let home = caller.home.to_string_lossy();
    PathBuf::from(template.replacen("$HOME", &home, 1))
}

/// Whether an administrator assigned `caller` a credential path.
pub fn has_override(config: &RoleIdConfig, caller: &Caller) -> bool {
    config.user_override.contains_key(&caller.name)
}

/// Read the role credential at `path` on behalf of `caller`.
///
/// The final path component must not be a symlink, and the opened file
/// must belong to the caller.  Root-owned files are accepted only when
/// `allow_root` is set, i.e. for a per-user override an administrator
/// provisioned.  A credential readable by group or others is still
/// accepted, with a warning.
pub async fn read_role_id(
    path: &Path,
    caller: &Caller,
    allow_root: bool,
) -> Result<Zeroizing<String>, StoreError> {
    let denied = |e: std::io::Error| {
        debug!(path = %path.display(), error = %e, "role credential not readable");
        StoreError::PermissionDenied(format!("role credential {}: {e}", path.display()))
    };

    let mut options = tokio::fs::OpenOptions::new();
    options.read(true);
    #[cfg(unix)]
    options.custom_flags(libc::O_NOFOLLOW);
    let mut file = options.open(path).await.map_err(denied)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let meta = file.metadata().await.map_err(denied)?;
        let owner = meta.uid();
        if owner != caller.uid && !(allow_root && owner == 0) {
            warn!(
                path = %path.display(),
                owner,
                caller = caller.uid,
                "role credential is owned by another user"
            );
            return Err(StoreError::PermissionDenied(format!(
                "role credential {} is not owned by {}",
                path.display(),
                caller.name
            )));
        }
        if meta.mode() & 0o077 != 0 {
            warn!(
                path = %path.display(),
                mode = format!("{:o}", meta.mode() & 0o777),
                "role credential is accessible by group or others, recommend: chmod 600 {}",
                path.display()
            );
        }
    }
    #[cfg(not(unix))]
    let _ = (caller, allow_root);

    let mut raw = Zeroizing::new(String::new());
    file.read_to_string(&mut *raw).await.map_err(denied)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(StoreError::PermissionDenied(format!(
            "role credential {} is empty",
            path.display()
        )));
    }
    Ok(Zeroizing::new(trimmed.to_string()))
}
