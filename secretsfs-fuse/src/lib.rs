//! FUSE transport for secretsfs.
//!
//! Mounts a [`secretsfs_core::router::Router`] as a read-only filesystem.
//! Kernel inodes map to router paths through the shared inode registry;
//! inode 1 is the mount root.
//!
//! Call [`mount`] to start the background FUSE session.  The returned
//! [`MountHandle`] keeps the filesystem alive; drop it to unmount.

pub mod caller;
pub mod fs;
pub mod options;

pub use fs::{DEFAULT_REQUEST_TIMEOUT, MountHandle, SecretsFuse, errno, mount};
pub use options::MountOptions;
