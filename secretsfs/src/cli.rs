use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "secretsfs")]
#[command(about = "Mount a Vault KV secrets engine as a read-only filesystem")]
#[command(version)]
pub struct Cli {
    /// Directory to mount on
    pub mountpoint: Option<PathBuf>,

    /// Config file (default: $SFS_CONFIG_FILE, then
    /// $HOME/.secretsfs/secretsfs.toml, then /etc/secretsfs/secretsfs.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Comma-separated mount options: allow_other, allow_root, auto_unmount,
    /// debug; anything else is passed to the kernel
    #[arg(short = 'o', value_name = "OPTS")]
    pub options: Vec<String>,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    pub print_defaults: bool,

    /// List providers and whether they are enabled, then exit
    #[arg(long)]
    pub print_providers: bool,

    /// List the available store kinds and exit
    #[arg(long)]
    pub print_stores: bool,

    /// Print the configured store kind and exit
    #[arg(long)]
    pub print_store: bool,

    /// Log as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl Cli {
    /// Whether an informational flag was given; these never mount.
    pub fn is_info_query(&self) -> bool {
        self.print_defaults || self.print_providers || self.print_stores || self.print_store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_mount_invocation() {
        let cli = Cli::try_parse_from([
            "secretsfs",
            "-c",
            "/tmp/sfs.toml",
            "-o",
            "allow_other,debug",
            "-o",
            "noatime",
            "/mnt/secrets",
        ])
        .unwrap();
        assert_eq!(cli.mountpoint, Some(PathBuf::from("/mnt/secrets")));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/sfs.toml")));
        assert_eq!(cli.options, vec!["allow_other,debug", "noatime"]);
        assert!(!cli.is_info_query());
    }

    #[test]
    fn info_flags_need_no_mountpoint() {
        let cli = Cli::try_parse_from(["secretsfs", "--print-stores"]).unwrap();
        assert!(cli.is_info_query());
        assert!(cli.mountpoint.is_none());
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(Cli::try_parse_from(["secretsfs", "--frobnicate"]).is_err());
    }
}
