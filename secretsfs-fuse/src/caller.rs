//! Kernel uid/gid → [`Caller`].

use std::ffi::{CStr, CString, OsStr};
use std::mem::MaybeUninit;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use secretsfs_core::Caller;
use tracing::debug;

const INITIAL_BUF: usize = 1024;
const MAX_BUF: usize = 1 << 20;

/// Resolve the account behind a request.
///
/// `None` when the uid has no passwd entry; requests from such callers are
/// refused.  Supplementary groups that cannot be named are skipped.
pub fn resolve(uid: u32, gid: u32) -> Option<Caller> {
    let (name, home) = passwd_entry(uid)?;

    let gids = CString::new(name.as_str())
        .map(|c| group_ids(&c, gid))
        .unwrap_or_else(|_| vec![gid]);

    let mut groups = Vec::with_capacity(gids.len());
    for g in gids {
        if let Some(group) = group_name(g)
            && !groups.contains(&group)
        {
            groups.push(group);
        }
    }

    Some(Caller {
        uid,
        gid,
        name,
        home,
        groups,
    })
}

fn passwd_entry(uid: u32) -> Option<(String, PathBuf)> {
    let mut buf = vec![0 as libc::c_char; INITIAL_BUF];
    loop {
        let mut pwd = MaybeUninit::<libc::passwd>::uninit();
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        // SAFETY: every pointer refers to live storage and `buf.len()` is its size.
        let rc = unsafe {
            libc::getpwuid_r(uid, pwd.as_mut_ptr(), buf.as_mut_ptr(), buf.len(), &mut result)
        };
        if rc == libc::ERANGE && buf.len() < MAX_BUF {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 {
            debug!(uid, error = %std::io::Error::from_raw_os_error(rc), "passwd lookup failed");
            return None;
        }
        if result.is_null() {
            debug!(uid, "no passwd entry for caller");
            return None;
        }
        // SAFETY: a non-null result means `pwd` was filled in and its strings
        // point into `buf`, which is still alive.
        let (name, dir) = unsafe {
            let pwd = pwd.assume_init();
            (CStr::from_ptr(pwd.pw_name), CStr::from_ptr(pwd.pw_dir))
        };
        return Some((
            name.to_string_lossy().into_owned(),
            PathBuf::from(OsStr::from_bytes(dir.to_bytes())),
        ));
    }
}

fn group_name(gid: u32) -> Option<String> {
    let mut buf = vec![0 as libc::c_char; INITIAL_BUF];
    loop {
        let mut grp = MaybeUninit::<libc::group>::uninit();
        let mut result: *mut libc::group = std::ptr::null_mut();
        // SAFETY: as in `passwd_entry`.
        let rc = unsafe {
            libc::getgrgid_r(gid, grp.as_mut_ptr(), buf.as_mut_ptr(), buf.len(), &mut result)
        };
        if rc == libc::ERANGE && buf.len() < MAX_BUF {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || result.is_null() {
            return None;
        }
        // SAFETY: filled in by a successful getgrgid_r; `gr_name` points into `buf`.
        let name = unsafe { CStr::from_ptr(grp.assume_init().gr_name) };
        return Some(name.to_string_lossy().into_owned());
    }
}

/// Every group id `user` belongs to, `primary` included.
#[cfg(target_os = "linux")]
fn group_ids(user: &CStr, primary: u32) -> Vec<u32> {
    let mut capacity: libc::c_int = 32;
    loop {
        let mut gids = vec![0 as libc::gid_t; capacity as usize];
        let mut count = capacity;
        // SAFETY: `gids` holds `count` elements; `user` is NUL-terminated.
        let rc = unsafe { libc::getgrouplist(user.as_ptr(), primary, gids.as_mut_ptr(), &mut count) };
        if rc >= 0 {
            gids.truncate(count.max(0) as usize);
            return gids;
        }
        // glibc reports the required size in `count`.
        capacity = if count > capacity { count } else { capacity * 2 };
        if capacity > 1 << 16 {
            return vec![primary];
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn group_ids(_user: &CStr, primary: u32) -> Vec<u32> {
    vec![primary]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_current_process_user() {
        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };
        let Some(caller) = resolve(uid, gid) else {
            // Sandboxes without a passwd entry for the test uid.
            return;
        };
        assert_eq!(caller.uid, uid);
        assert!(!caller.name.is_empty());
    }

    #[test]
    fn root_is_resolvable() {
        let Some(caller) = resolve(0, 0) else {
            return;
        };
        assert_eq!(caller.name, "root");
    }

    #[test]
    fn unknown_uid_is_refused() {
        assert!(resolve(u32::MAX - 7, u32::MAX - 7).is_none());
    }
}
