//! Writing a package's tarballs onto a destination tree, with the
//! per-entry path transforms and bookkeeping the transaction engine
//! depends on.

use crate::config::Config;
use crate::error::{AResult, AeptError};
use crate::fileset::FileSet;
use crate::ipk::ar::PkgArchive;
use crate::listener::Listener;
use crate::pathcheck::{is_safe_link_target, sanitize_entry_path};
use enumflags2::{bitflags, BitFlags};
use nix::sys::stat::lutimes;
use nix::sys::time::{TimeVal, TimeValLike};
use nix::unistd::{fchownat, Gid, Uid};
use std::fs;
use std::io::{self, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tar::EntryType;

#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ExtractFlag {
    /// chown entries to the archive's uid/gid. Dropped when not running
    /// as root or when `ignore_uid` is configured.
    Owner = 1 << 0,
    Perm = 1 << 1,
    Time = 1 << 2,
    /// Remove an existing destination before writing.
    Unlink = 1 << 3,
    /// Skip entries whose destination already exists.
    NoOverwrite = 1 << 4,
}

pub fn default_flags() -> BitFlags<ExtractFlag> {
    ExtractFlag::Owner | ExtractFlag::Perm | ExtractFlag::Time | ExtractFlag::Unlink
}

/// Unpack the whole data tarball under `dest_prefix`. When `conffiles`
/// and `cf_suffix` are given, entries whose absolute path is in the set
/// land at `<path><suffix>` instead, leaving the live file alone.
/// Returns the number of payload bytes written.
pub fn extract_all(
    cfg: &Config,
    archive: &PkgArchive,
    dest_prefix: &Path,
    mut conffiles: Option<&mut FileSet>,
    cf_suffix: Option<&str>,
    flags: BitFlags<ExtractFlag>,
    listener: &dyn Listener,
) -> AResult<u64> {
    extract_entries(cfg, archive, dest_prefix, &mut |rel| {
        if let (Some(set), Some(suffix)) = (conffiles.as_deref_mut(), cf_suffix) {
            if set.contains(&abs_of(rel)) {
                let mut shadowed = rel.as_os_str().to_os_string();
                shadowed.push(suffix);
                return Some(PathBuf::from(shadowed));
            }
        }
        Some(rel.to_path_buf())
    }, flags, listener)
}

/// Unpack only the entries whose absolute path is in `wanted`, with
/// `NoOverwrite` cleared. Used to stage conffile candidates.
pub fn extract_selected(
    cfg: &Config,
    archive: &PkgArchive,
    wanted: &mut FileSet,
    dest_prefix: &Path,
    flags: BitFlags<ExtractFlag>,
    listener: &dyn Listener,
) -> AResult<u64> {
    let flags = flags & !ExtractFlag::NoOverwrite;
    extract_entries(cfg, archive, dest_prefix, &mut |rel| {
        wanted.contains(&abs_of(rel)).then(|| rel.to_path_buf())
    }, flags, listener)
}

/// Copy one file out of the control tarball into a writer, or `None` if
/// the control archive carries no member of that name.
pub fn control_member_to_stream(
    archive: &PkgArchive,
    name: &str,
    out: &mut dyn Write,
) -> AResult<Option<u64>> {
    let mut tar = archive.control_tar()?;
    for entry in tar.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let Some(rel) = sanitize_entry_path(&path) else {
            return Err(AeptError::UnsafePath(path.display().to_string()));
        };
        if rel.as_os_str() == name {
            let copied = io::copy(&mut entry, out)?;
            return Ok(Some(copied));
        }
    }
    Ok(None)
}

pub fn control_member_string(archive: &PkgArchive, name: &str) -> AResult<Option<String>> {
    let mut buf = Vec::new();
    match control_member_to_stream(archive, name, &mut buf)? {
        Some(_) => Ok(Some(String::from_utf8_lossy(&buf).into_owned())),
        None => Ok(None),
    }
}

/// Unpack the control tarball's regular files flat into a directory
/// (`control`, `conffiles`, maintainer scripts).
pub fn extract_control_to_dir(archive: &PkgArchive, dest: &Path) -> AResult<()> {
    let mut tar = archive.control_tar()?;
    for entry in tar.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type() != EntryType::Regular {
            continue;
        }
        let path = entry.path()?.into_owned();
        let Some(rel) = sanitize_entry_path(&path) else {
            return Err(AeptError::UnsafePath(path.display().to_string()));
        };
        let Some(name) = rel.file_name() else { continue };
        let dest_path = dest.join(name);
        let mut file = fs::File::create(&dest_path)?;
        io::copy(&mut entry, &mut file)?;
        let mode = entry.header().mode().unwrap_or(0o644);
        fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

/// Emit one `path\tmode[\tsymlink_target]` line per data-archive entry.
/// This is exactly the `.list` format; the trailing newline on the last
/// line matters to every reader downstream.
pub fn list_paths_to_stream(archive: &PkgArchive, out: &mut dyn Write) -> AResult<()> {
    let mut tar = archive.data_tar()?;
    for entry in tar.entries()? {
        let entry = entry?;
        let path = entry.path()?.into_owned();
        let Some(rel) = sanitize_entry_path(&path) else {
            return Err(AeptError::UnsafePath(path.display().to_string()));
        };
        if rel.as_os_str().is_empty() {
            continue;
        }
        let mode = entry.header().mode().unwrap_or(0);
        match entry.link_name()? {
            Some(target) if entry.header().entry_type() == EntryType::Symlink => {
                writeln!(out, "./{}\t{:o}\t{}", rel.display(), mode, target.display())?;
            }
            _ => writeln!(out, "./{}\t{:o}", rel.display(), mode)?,
        }
    }
    Ok(())
}

fn abs_of(rel: &Path) -> String {
    format!("/{}", rel.display())
}

fn extract_entries(
    cfg: &Config,
    archive: &PkgArchive,
    dest_prefix: &Path,
    transform: &mut dyn FnMut(&Path) -> Option<PathBuf>,
    mut flags: BitFlags<ExtractFlag>,
    listener: &dyn Listener,
) -> AResult<u64> {
    if cfg.ignore_uid || !Uid::effective().is_root() {
        flags &= !ExtractFlag::Owner;
    }
    let mut bytes: u64 = 0;
    let mut tar = archive.data_tar()?;
    for entry in tar.entries()? {
        let mut entry = entry?;
        let raw_path = entry.path()?.into_owned();
        let Some(rel) = sanitize_entry_path(&raw_path) else {
            return Err(AeptError::UnsafePath(raw_path.display().to_string()));
        };
        if rel.as_os_str().is_empty() {
            continue;
        }
        let Some(out_rel) = transform(&rel) else { continue };
        let dest = dest_prefix.join(&out_rel);
        let header = entry.header();
        let mode = header.mode().unwrap_or(0o644);
        let mtime = header.mtime().unwrap_or(0);
        let uid = header.uid().unwrap_or(0);
        let gid = header.gid().unwrap_or(0);

        match header.entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&dest)?;
            }
            EntryType::Symlink => {
                let target = entry
                    .link_name()?
                    .ok_or_else(|| AeptError::UnsafePath(rel.display().to_string()))?
                    .into_owned();
                if !is_safe_link_target(&rel, &target) {
                    return Err(AeptError::UnsafePath(format!(
                        "{} -> {}",
                        rel.display(),
                        target.display()
                    )));
                }
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                if dest.symlink_metadata().is_ok() {
                    if flags.contains(ExtractFlag::NoOverwrite) {
                        continue;
                    }
                    remove_quiet(&dest);
                }
                std::os::unix::fs::symlink(&target, &dest)?;
                if flags.contains(ExtractFlag::Owner) {
                    let _ = fchownat(
                        None,
                        &dest,
                        Some(Uid::from_raw(uid as u32)),
                        Some(Gid::from_raw(gid as u32)),
                        nix::unistd::FchownatFlags::NoFollowSymlink,
                    );
                }
                if flags.contains(ExtractFlag::Time) {
                    let t = TimeVal::seconds(mtime as i64);
                    let _ = lutimes(&dest, &t, &t);
                }
                continue; // no perms on symlinks
            }
            EntryType::Link => {
                let target = entry
                    .link_name()?
                    .ok_or_else(|| AeptError::UnsafePath(rel.display().to_string()))?
                    .into_owned();
                let Some(target_rel) = sanitize_entry_path(&target) else {
                    return Err(AeptError::UnsafePath(target.display().to_string()));
                };
                let Some(target_out) = transform(&target_rel) else {
                    listener.warning(format!(
                        "hardlink {} target {} not extracted, skipping",
                        rel.display(),
                        target_rel.display()
                    ));
                    continue;
                };
                let link_src = dest_prefix.join(target_out);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                if dest.symlink_metadata().is_ok() {
                    if flags.contains(ExtractFlag::NoOverwrite) {
                        continue;
                    }
                    remove_quiet(&dest);
                }
                if let Err(e) = fs::hard_link(&link_src, &dest) {
                    listener.warning(format!(
                        "cannot hardlink {} -> {}: {e}",
                        dest.display(),
                        link_src.display()
                    ));
                }
                continue;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                if dest.symlink_metadata().is_ok() {
                    if flags.contains(ExtractFlag::NoOverwrite) {
                        continue;
                    }
                    if flags.contains(ExtractFlag::Unlink) {
                        remove_quiet(&dest);
                    }
                }
                let mut file = fs::File::create(&dest)?;
                bytes += copy_with_retry(&mut entry, &mut file)?;
            }
            other => {
                log::debug!("skipping {:?} entry {}", other, rel.display());
                continue;
            }
        }

        if flags.contains(ExtractFlag::Perm) {
            fs::set_permissions(&dest, fs::Permissions::from_mode(mode))?;
        }
        if flags.contains(ExtractFlag::Owner) {
            let _ = nix::unistd::chown(
                &dest,
                Some(Uid::from_raw(uid as u32)),
                Some(Gid::from_raw(gid as u32)),
            );
        }
        if flags.contains(ExtractFlag::Time) {
            let t = TimeVal::seconds(mtime as i64);
            let _ = nix::sys::stat::utimes(&dest, &t, &t);
        }
    }
    Ok(bytes)
}

/// ENOENT is not an error here; anything else is logged and ignored so a
/// single stubborn path cannot wedge the whole entry loop.
fn remove_quiet(path: &Path) {
    let res = match path.symlink_metadata() {
        Ok(meta) if meta.is_dir() => fs::remove_dir(path),
        Ok(_) => fs::remove_file(path),
        Err(_) => return,
    };
    if let Err(e) = res {
        if e.kind() != io::ErrorKind::NotFound {
            log::debug!("cannot remove {}: {e}", path.display());
        }
    }
}

fn copy_with_retry(entry: &mut dyn Read, file: &mut fs::File) -> AResult<u64> {
    let mut written = 0u64;
    let mut buf = [0u8; 64 * 1024];
    let mut failures = 0;
    loop {
        match entry.read(&mut buf) {
            Ok(0) => return Ok(written),
            Ok(n) => {
                file.write_all(&buf[..n])?;
                written += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                failures += 1;
                if failures >= 3 {
                    return Err(e.into());
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}
