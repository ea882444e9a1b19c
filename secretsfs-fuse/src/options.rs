//! `-o` mount option parsing.

use fuser::{MountOption, SessionACL};
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountOptions {
    pub allow_other: bool,
    pub allow_root: bool,
    pub auto_unmount: bool,
    /// Verbose per-request logging.
    pub debug: bool,
    /// Anything else, passed to the kernel unchanged.
    pub custom: Vec<String>,
}

impl MountOptions {
    /// Parse one or more comma-separated option strings.
    ///
    /// # Examples
    /// ```
    /// # use secretsfs_fuse::MountOptions;
    /// let opts = MountOptions::parse(["allow_other,debug", "noatime"]);
    /// assert!(opts.allow_other && opts.debug);
    /// assert_eq!(opts.custom, vec!["noatime"]);
    /// ```
    pub fn parse<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut opts = Self::default();
        for opt in values.into_iter().flat_map(|v| v.split(',')) {
            match opt.trim() {
                "" => {}
                "allow_other" => opts.allow_other = true,
                "allow_root" => opts.allow_root = true,
                "auto_unmount" => opts.auto_unmount = true,
                "debug" => opts.debug = true,
                other => opts.custom.push(other.to_string()),
            }
        }
        opts
    }

    /// Who besides the mounting user may use the mount.
    pub fn acl(&self) -> SessionACL {
        if self.allow_other {
            SessionACL::All
        } else if self.allow_root {
            SessionACL::RootAndOwner
        } else {
            SessionACL::Owner
        }
    }

    /// Kernel options for a read-only mount.
    pub fn mount_options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::RO,
            MountOption::FSName("secretsfs".to_string()),
        ];
        if self.auto_unmount {
            if matches!(self.acl(), SessionACL::Owner) {
                // fuser 0.17 refuses AutoUnmount together with an owner-only ACL.
                warn!("auto_unmount needs allow_other or allow_root, ignoring");
            } else {
                options.push(MountOption::AutoUnmount);
            }
        }
        options.extend(self.custom.iter().cloned().map(MountOption::CUSTOM));
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_custom_options() {
        let opts = MountOptions::parse(["allow_root, auto_unmount", "max_read=4096"]);
        assert!(opts.allow_root);
        assert!(opts.auto_unmount);
        assert!(!opts.allow_other);
        assert_eq!(opts.custom, vec!["max_read=4096"]);
    }

    #[test]
    fn acl_follows_allow_flags() {
        assert!(matches!(MountOptions::default().acl(), SessionACL::Owner));
        assert!(matches!(MountOptions::parse(["allow_root"]).acl(), SessionACL::RootAndOwner));
        assert!(matches!(
            MountOptions::parse(["allow_root,allow_other"]).acl(),
            SessionACL::All
        ));
    }

    #[test]
    fn mount_is_read_only_and_named() {
        let opts = MountOptions::parse(["auto_unmount"]).mount_options();
        assert_eq!(opts.len(), 2);
        assert!(matches!(opts[0], MountOption::RO));
        assert!(matches!(&opts[1], MountOption::FSName(name) if name == "secretsfs"));

        let opts = MountOptions::parse(["allow_other,auto_unmount,ro"]).mount_options();
        assert!(opts.iter().any(|o| matches!(o, MountOption::AutoUnmount)));
        assert!(opts.iter().any(|o| matches!(o, MountOption::CUSTOM(c) if c == "ro")));
    }
}
