/// Process hardening applied before any secret is fetched.
///
/// Best-effort: each step logs a warning on failure and the mount goes on.
///
/// 1. **`PR_SET_DUMPABLE 0`**: no core dumps and no `/proc/<pid>/mem` reads
///    by other unprivileged processes, so secrets rendered for a caller are
///    not written to disk on a crash.
///
/// 2. **`mlockall(MCL_CURRENT)`**: pins the pages mapped so far.  Future
///    mappings are left swappable; locking them would make every allocation
///    fail once `RLIMIT_MEMLOCK` is reached, which a long-lived mount serving
///    many callers would hit.
#[cfg(target_os = "linux")]
pub fn secure_bootstrap() {
    set_not_dumpable();
    lock_current_memory();
}

/// No-op outside Linux.
#[cfg(not(target_os = "linux"))]
pub fn secure_bootstrap() {}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
fn set_not_dumpable() {
    // SAFETY: PR_SET_DUMPABLE takes plain integer arguments.
    let ret = unsafe { libc::prctl(libc::PR_SET_DUMPABLE, 0i64, 0i64, 0i64, 0i64) };
    if ret == 0 {
        tracing::debug!("PR_SET_DUMPABLE=0");
    } else {
        let err = std::io::Error::last_os_error();
        tracing::warn!(error = %err, "PR_SET_DUMPABLE=0 failed (non-fatal)");
    }
}

#[cfg(target_os = "linux")]
fn lock_current_memory() {
    // SAFETY: mlockall has no memory-safety preconditions.
    let ret = unsafe { libc::mlockall(libc::MCL_CURRENT) };
    if ret == 0 {
        tracing::debug!("mlockall(MCL_CURRENT)");
    } else {
        let err = std::io::Error::last_os_error();
        // EPERM / ENOMEM without CAP_IPC_LOCK or with a small RLIMIT_MEMLOCK.
        tracing::warn!(error = %err, "mlockall failed (non-fatal), pages may be swapped");
    }
}
