//! FUSE filesystem implementation.
//!
//! Every kernel request is translated into a [`Router`] call.  The router is
//! async and may hit the network, so each request is spawned onto the tokio
//! runtime with its reply moved into the task; the FUSE session thread
//! never blocks on the store.
//!
//! ```text
//! kernel ──▶ SecretsFuse (session thread) ──spawn──▶ Router ──▶ Provider
//!                                                      │
//!   reply ◀────────────────────────────────────────────┘
//! ```

use std::ffi::OsStr;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context as _;
use fuser::{
    AccessFlags, BackgroundSession, Config, Errno, FileAttr, FileHandle, FileType, Filesystem,
    FopenFlags, Generation, INodeNo, LockOwner, OpenFlags, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, Request,
};
use secretsfs_core::inode::ROOT_INODE;
use secretsfs_core::provider::{DirEntry, NodeAttr, NodeKind};
use secretsfs_core::router::{Router, VirtualNode};
use secretsfs_core::{Caller, FsError};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::caller;
use crate::options::MountOptions;

/// Attribute and entry cache lifetime handed to the kernel.
const TTL: Duration = Duration::from_secs(1);

/// Default upper bound on a single request, backend round-trips included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// errno reported for a filesystem error.
pub fn errno(e: &FsError) -> Errno {
    match e {
        FsError::NotFound => Errno::ENOENT,
        FsError::NotADirectory => Errno::ENOTDIR,
        FsError::IsADirectory => Errno::EISDIR,
        FsError::PermissionDenied(_) => Errno::EACCES,
        FsError::Forbidden => Errno::EPERM,
        FsError::Unavailable(_) | FsError::Configuration(_) => Errno::EIO,
    }
}

fn file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::File => FileType::RegularFile,
    }
}

fn make_attr(ino: u64, attr: NodeAttr, caller: &Caller, mtime: SystemTime) -> FileAttr {
    let (size, nlink) = match attr.kind {
        NodeKind::Directory => (4096u64, 2u32),
        NodeKind::File => (attr.size, 1u32),
    };
    FileAttr {
        ino: INodeNo(ino),
        size,
        blocks: size.div_ceil(512),
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: UNIX_EPOCH,
        kind: file_type(attr.kind),
        perm: attr.perm,
        nlink,
        uid: caller.uid,
        gid: caller.gid,
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}

/// `.` and `..` followed by `children`, as `(inode, type, name)`.
fn dir_listing(
    router: &Router,
    node: &VirtualNode,
    children: Vec<DirEntry>,
) -> Vec<(u64, FileType, String)> {
    let parent = if node.is_root() {
        node.inode
    } else {
        parent_inode(router, &node.path)
    };
    let mut entries = Vec::with_capacity(children.len() + 2);
    entries.push((node.inode, FileType::Directory, ".".to_string()));
    entries.push((parent, FileType::Directory, "..".to_string()));
    entries.extend(
        children
            .into_iter()
            .map(|e| (e.inode, file_type(e.kind), e.name)),
    );
    entries
}

/// Inode of the directory containing `path`.
fn parent_inode(router: &Router, path: &str) -> u64 {
    match path.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => router.inodes().get_or_create(parent),
        _ => ROOT_INODE,
    }
}

/// The FUSE filesystem object.
pub struct SecretsFuse {
    router: Arc<Router>,
    runtime: Handle,
    timeout: Duration,
    mounted_at: SystemTime,
}

impl SecretsFuse {
    pub fn new(router: Arc<Router>, runtime: Handle) -> Self {
        Self {
            router,
            runtime,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            mounted_at: SystemTime::now(),
        }
    }

    fn caller(&self, req: &Request) -> Result<Caller, Errno> {
        caller::resolve(req.uid(), req.gid()).ok_or_else(|| {
            debug!(uid = req.uid(), "refusing request from unknown user");
            Errno::EACCES
        })
    }

    /// Resolve the caller and the node a request addresses.
    fn prepare(&self, req: &Request, ino: INodeNo) -> Result<(Caller, VirtualNode), Errno> {
        let node = self.router.node(ino.0).ok_or(Errno::ENOENT)?;
        Ok((self.caller(req)?, node))
    }

    /// Run `fut` on the runtime and hand its outcome to `respond`.
    fn dispatch<T, Fut, R>(&self, op: &'static str, fut: Fut, respond: R)
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, FsError>> + Send + 'static,
        R: FnOnce(Result<T, Errno>) + Send + 'static,
    {
        let timeout = self.timeout;
        self.runtime.spawn(async move {
            let result = match tokio::time::timeout(timeout, fut).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => {
                    debug!(op, error = %e, "request failed");
                    Err(errno(&e))
                }
                Err(_) => {
                    warn!(op, timeout_secs = timeout.as_secs(), "request timed out");
                    Err(Errno::ETIMEDOUT)
                }
            };
            respond(result);
        });
    }
}

impl Filesystem for SecretsFuse {
    fn lookup(&self, req: &Request, parent: INodeNo, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str().map(str::to_owned) else {
            reply.error(Errno::ENOENT);
            return;
        };
        let (caller, parent) = match self.prepare(req, parent) {
            Ok(v) => v,
            Err(e) => return reply.error(e),
        };
        let router = Arc::clone(&self.router);
        let mtime = self.mounted_at;
        self.dispatch(
            "lookup",
            async move {
                let (node, attr) = router.lookup(&parent.path, &name, &caller).await?;
                debug!(path = %node.path, ino = node.inode, "fuse lookup");
                Ok(make_attr(node.inode, attr, &caller, mtime))
            },
            move |result| match result {
                Ok(attr) => reply.entry(&TTL, &attr, Generation(0)),
                Err(e) => reply.error(e),
            },
        );
    }

    fn getattr(&self, req: &Request, ino: INodeNo, _fh: Option<FileHandle>, reply: ReplyAttr) {
        let (caller, node) = match self.prepare(req, ino) {
            Ok(v) => v,
            Err(e) => return reply.error(e),
        };
        let router = Arc::clone(&self.router);
        let mtime = self.mounted_at;
        self.dispatch(
            "getattr",
            async move {
                let attr = router.get_attributes(&node.path, &caller).await?;
                Ok(make_attr(node.inode, attr, &caller, mtime))
            },
            move |result| match result {
                Ok(attr) => reply.attr(&TTL, &attr),
                Err(e) => reply.error(e),
            },
        );
    }

    fn access(&self, _req: &Request, ino: INodeNo, _mask: AccessFlags, reply: ReplyEmpty) {
        // Authorisation is the store's business; only check the inode exists.
        match self.router.node(ino.0) {
            Some(_) => reply.ok(),
            None => reply.error(Errno::ENOENT),
        }
    }

    fn open(&self, req: &Request, ino: INodeNo, _flags: OpenFlags, reply: ReplyOpen) {
        let (caller, node) = match self.prepare(req, ino) {
            Ok(v) => v,
            Err(e) => return reply.error(e),
        };
        let router = Arc::clone(&self.router);
        self.dispatch(
            "open",
            async move { router.open(&node.path, &caller).await },
            // Content is fetched per read and its length may change.
            move |result| match result {
                Ok(fh) => reply.opened(FileHandle(fh), FopenFlags::FOPEN_DIRECT_IO),
                Err(e) => reply.error(e),
            },
        );
    }

    fn opendir(&self, _req: &Request, ino: INodeNo, _flags: OpenFlags, reply: ReplyOpen) {
        match self.router.node(ino.0) {
            Some(_) => reply.opened(FileHandle(0), FopenFlags::empty()),
            None => reply.error(Errno::ENOENT),
        }
    }

    fn read(
        &self,
        req: &Request,
        ino: INodeNo,
        _fh: FileHandle,
        offset: u64,
        size: u32,
        _flags: OpenFlags,
        _lock_owner: Option<LockOwner>,
        reply: ReplyData,
    ) {
        let (caller, node) = match self.prepare(req, ino) {
            Ok(v) => v,
            Err(e) => return reply.error(e),
        };
        let router = Arc::clone(&self.router);
        self.dispatch(
            "read",
            async move { router.read(&node.path, &caller, offset, size).await },
            move |result| match result {
                Ok(data) => reply.data(&data),
                Err(e) => reply.error(e),
            },
        );
    }

    fn readdir(
        &self,
        req: &Request,
        ino: INodeNo,
        _fh: FileHandle,
        offset: u64,
        mut reply: ReplyDirectory,
    ) {
        let (caller, node) = match self.prepare(req, ino) {
            Ok(v) => v,
            Err(e) => return reply.error(e),
        };
        let router = Arc::clone(&self.router);
        self.dispatch(
            "readdir",
            async move {
                let children = router.list_directory(&node.path, &caller).await?;
                Ok(dir_listing(&router, &node, children))
            },
            move |result| {
                let entries = match result {
                    Ok(entries) => entries,
                    Err(e) => return reply.error(e),
                };
                for (i, (child_ino, kind, name)) in entries.iter().enumerate() {
                    if (i as u64) < offset {
                        continue;
                    }
                    if reply.add(INodeNo(*child_ino), (i + 1) as u64, *kind, name) {
                        break;
                    }
                }
                reply.ok();
            },
        );
    }

    fn statfs(&self, _req: &Request, _ino: INodeNo, reply: ReplyStatfs) {
        let files = self.router.inodes().len() as u64;
        // blocks=0 (virtual); bfree/bavail=0 (read-only); namelen=255
        reply.statfs(0, 0, 0, files, 0, 4096, 255, 0);
    }
}

/// A handle to a mounted filesystem.
///
/// Dropping it unmounts: the `BackgroundSession` drop performs the kernel
/// unmount and `fusermount3 -u` cleans up if the session could not.
pub struct MountHandle {
    session: Option<BackgroundSession>,
    mountpoint: PathBuf,
}

impl MountHandle {
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }
}

impl std::fmt::Debug for MountHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountHandle")
            .field("mountpoint", &self.mountpoint)
            .finish_non_exhaustive()
    }
}

impl Drop for MountHandle {
    fn drop(&mut self) {
        drop(self.session.take());

        let _ = std::process::Command::new("fusermount3")
            .args(["-u", self.mountpoint.to_string_lossy().as_ref()])
            .output();
        info!(mountpoint = %self.mountpoint.display(), "unmounted");
    }
}

/// Mount `router` read-only at `mountpoint` and return a [`MountHandle`].
///
/// Requests are executed on `runtime`.
pub fn mount(
    router: Arc<Router>,
    runtime: Handle,
    mountpoint: &Path,
    options: &MountOptions,
) -> anyhow::Result<MountHandle> {
    let fuse = Arc::new(SecretsFuse::new(router, runtime));

    let mut config = Config::default();
    config.mount_options = options.mount_options();
    config.acl = options.acl();

    let session = fuser::spawn_mount2(ArcFuse(Arc::clone(&fuse)), mountpoint, &config)
        .with_context(|| format!("mount FUSE at {}", mountpoint.display()))?;
    info!(mountpoint = %mountpoint.display(), "mounted");

    Ok(MountHandle {
        session: Some(session),
        mountpoint: mountpoint.to_path_buf(),
    })
}

/// Newtype wrapper so we can pass `Arc<SecretsFuse>` as a `Filesystem`.
struct ArcFuse(Arc<SecretsFuse>);

impl Filesystem for ArcFuse {
    fn lookup(&self, req: &Request, parent: INodeNo, name: &OsStr, reply: ReplyEntry) {
        self.0.lookup(req, parent, name, reply);
    }

    fn getattr(&self, req: &Request, ino: INodeNo, fh: Option<FileHandle>, reply: ReplyAttr) {
        self.0.getattr(req, ino, fh, reply);
    }

    fn access(&self, req: &Request, ino: INodeNo, mask: AccessFlags, reply: ReplyEmpty) {
        self.0.access(req, ino, mask, reply);
    }

    fn open(&self, req: &Request, ino: INodeNo, flags: OpenFlags, reply: ReplyOpen) {
        self.0.open(req, ino, flags, reply);
    }

    fn opendir(&self, req: &Request, ino: INodeNo, flags: OpenFlags, reply: ReplyOpen) {
        self.0.opendir(req, ino, flags, reply);
    }

    fn read(
        &self,
        req: &Request,
        ino: INodeNo,
        fh: FileHandle,
        offset: u64,
        size: u32,
        flags: OpenFlags,
        lock_owner: Option<LockOwner>,
        reply: ReplyData,
    ) {
        self.0
            .read(req, ino, fh, offset, size, flags, lock_owner, reply);
    }

    fn readdir(
        &self,
        req: &Request,
        ino: INodeNo,
        fh: FileHandle,
        offset: u64,
        reply: ReplyDirectory,
    ) {
        self.0.readdir(req, ino, fh, offset, reply);
    }

    fn statfs(&self, req: &Request, ino: INodeNo, reply: ReplyStatfs) {
        self.0.statfs(req, ino, reply);
    }
}
