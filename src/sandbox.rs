//! Confining child processes to the offline root. Non-root callers get
//! a single-mapping user namespace first, so the chroot is permitted and
//! files the scripts create come out owned by the calling user.

use crate::config::Config;
use nix::sched::{unshare, CloneFlags};
use nix::unistd::{chdir, chroot, getgid, getuid, Uid};
use std::fs;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// The child could not enter the namespace or the chroot.
pub const EXIT_SETUP_FAILED: i32 = 254;
/// The chroot worked but exec did not.
pub const EXIT_EXEC_FAILED: i32 = 255;

/// Arrange for `cmd` to run inside `offline_root`, if one is configured.
/// With euid 0 only the chroot is performed; without a root the command
/// is left untouched.
pub fn confine(cfg: &Config, cmd: &mut Command) {
    let Some(root) = cfg.offline_root.clone() else { return };
    let map_user = !Uid::effective().is_root();
    let uid = getuid().as_raw();
    let gid = getgid().as_raw();
    // Runs between fork and exec; everything here is plain syscalls.
    unsafe {
        cmd.pre_exec(move || {
            if map_user {
                unshare(CloneFlags::CLONE_NEWUSER).map_err(io::Error::from)?;
                fs::write("/proc/self/uid_map", format!("0 {uid} 1"))?;
                fs::write("/proc/self/setgroups", "deny")?;
                fs::write("/proc/self/gid_map", format!("0 {gid} 1"))?;
            }
            chroot(root.as_path()).map_err(io::Error::from)?;
            chdir("/").map_err(io::Error::from)?;
            Ok(())
        });
    }
}

/// Translate a real filesystem path into the path the confined child
/// will see. Outside an offline root the two are the same.
pub fn in_root_path(cfg: &Config, real: &Path) -> PathBuf {
    match &cfg.offline_root {
        Some(root) => match real.strip_prefix(root) {
            Ok(rel) => Path::new("/").join(rel),
            Err(_) => real.to_path_buf(),
        },
        None => real.to_path_buf(),
    }
}
