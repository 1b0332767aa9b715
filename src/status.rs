//! The installed-package database: the Debian-style status file, the
//! per-package info directory, and the flat auto-installed and pin sets.
//! Every mutation goes through write-to-temp-then-rename so a crash
//! leaves either the old file or a stray temp, never a torn one.

use crate::config::Config;
use crate::control::{parse_paragraphs, Paragraph};
use crate::error::{AResult, AeptError};
use crate::version::Version;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

pub const STATE_INSTALLED: &str = "installed";
pub const STATE_UNPACKED: &str = "unpacked";

pub const SCRIPTS: &[&str] = &["preinst", "postinst", "prerm", "postrm"];

pub struct StatusDb {
    status_file: PathBuf,
    info_dir: PathBuf,
    auto_file: PathBuf,
    pin_file: PathBuf,
}

/// One line of a `.list` file: `path\tmode[\tsymlink_target]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry {
    pub path: String,
    pub mode: u32,
    pub link_target: Option<String>,
}

impl StatusDb {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            status_file: cfg.status_file.clone(),
            info_dir: cfg.info_dir.clone(),
            auto_file: cfg.auto_file.clone(),
            pin_file: cfg.pin_file.clone(),
        }
    }

    /// All installed stanzas, with `unpacked` normalized to `installed`
    /// so a half-configured package still counts as present for
    /// resolution. The on-disk file keeps the distinction.
    pub fn load(&self) -> AResult<Vec<Paragraph>> {
        let file = match fs::File::open(&self.status_file) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AeptError::IoFile("cannot read status", e, self.status_file.clone())),
        };
        let mut paras = parse_paragraphs(BufReader::new(file))?;
        for para in &mut paras {
            if para.get("Status").is_some_and(|s| s.ends_with(STATE_UNPACKED)) {
                para.set("Status", format!("install ok {STATE_INSTALLED}"));
            }
        }
        Ok(paras)
    }

    pub fn installed_version(&self, name: &str) -> AResult<Option<Version>> {
        for para in self.load()? {
            if para.name()? == name {
                return match para.get("Version") {
                    Some(v) => Ok(Some(v.parse()?)),
                    None => Err(AeptError::MalformedControl(format!("{name} stanza has no Version"))),
                };
            }
        }
        Ok(None)
    }

    /// Append a stanza with `Status: install ok <state>`.
    pub fn add(&self, stanza: &Paragraph, state: &str) -> AResult<()> {
        let mut text = match fs::read_to_string(&self.status_file) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(AeptError::IoFile("cannot read status", e, self.status_file.clone())),
        };
        if !text.is_empty() && !text.ends_with("\n\n") {
            while text.ends_with('\n') {
                text.pop();
            }
            text.push_str("\n\n");
        }
        let mut stanza = stanza.clone();
        stanza.set("Status", format!("install ok {state}"));
        text.push_str(&stanza.to_string());
        text.push('\n');
        self.write_atomic(&self.status_file, text.as_bytes())
    }

    /// Drop the stanza whose `Package:` matches. Removing an absent name
    /// is a no-op.
    pub fn remove(&self, name: &str) -> AResult<()> {
        let paras = match fs::File::open(&self.status_file) {
            Ok(f) => parse_paragraphs(BufReader::new(f))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(AeptError::IoFile("cannot read status", e, self.status_file.clone())),
        };
        let mut out = String::new();
        for para in paras {
            if para.get("Package") == Some(name) {
                continue;
            }
            out.push_str(&para.to_string());
            out.push('\n');
        }
        self.write_atomic(&self.status_file, out.as_bytes())
    }

    pub fn replace(&self, name: &str, stanza: &Paragraph, state: &str) -> AResult<()> {
        self.remove(name)?;
        self.add(stanza, state)
    }

    // Per-package info directory -------------------------------------

    pub fn info_path(&self, name: &str, ext: &str) -> PathBuf {
        self.info_dir.join(format!("{name}.{ext}"))
    }

    pub fn script_path(&self, name: &str, script: &str) -> PathBuf {
        self.info_path(name, script)
    }

    pub fn has_info(&self, name: &str) -> bool {
        self.info_path(name, "control").exists()
    }

    pub fn read_list(&self, name: &str) -> AResult<Vec<ListEntry>> {
        let path = self.info_path(name, "list");
        let text = fs::read_to_string(&path)
            .map_err(|e| AeptError::IoFile("cannot read file list", e, path))?;
        let mut entries = Vec::new();
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let mut cols = line.split('\t');
            let path = cols.next().unwrap_or("").to_string();
            let mode = u32::from_str_radix(cols.next().unwrap_or("0"), 8).unwrap_or(0);
            let link_target = cols.next().map(str::to_string);
            entries.push(ListEntry { path, mode, link_target });
        }
        Ok(entries)
    }

    /// `md5  /abs/path` lines; absent file means no conffiles.
    pub fn read_conffiles(&self, name: &str) -> AResult<BTreeMap<String, String>> {
        let path = self.info_path(name, "conffiles");
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(AeptError::IoFile("cannot read conffiles", e, path)),
        };
        let mut map = BTreeMap::new();
        for line in text.lines() {
            if let Some((md5, p)) = line.split_once(' ') {
                map.insert(p.trim().to_string(), md5.trim().to_string());
            }
        }
        Ok(map)
    }

    pub fn write_conffiles(&self, name: &str, entries: &BTreeMap<String, String>) -> AResult<()> {
        if entries.is_empty() {
            return remove_if_exists(&self.info_path(name, "conffiles")).map_err(Into::into);
        }
        let mut out = String::new();
        for (path, md5) in entries {
            out.push_str(md5);
            out.push_str("  ");
            out.push_str(path);
            out.push('\n');
        }
        self.write_atomic(&self.info_path(name, "conffiles"), out.as_bytes())
    }

    pub fn write_list(&self, name: &str, bytes: &[u8]) -> AResult<()> {
        self.write_atomic(&self.info_path(name, "list"), bytes)
    }

    pub fn write_control(&self, name: &str, stanza: &Paragraph) -> AResult<()> {
        self.write_atomic(&self.info_path(name, "control"), stanza.to_string().as_bytes())
    }

    /// Install the maintainer scripts found in `dir`, replacing (or
    /// clearing) whatever the previous version left behind.
    pub fn install_scripts_from(&self, name: &str, dir: &Path) -> AResult<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::create_dir_all(&self.info_dir)?;
        for script in SCRIPTS {
            let src = dir.join(script);
            let dest = self.script_path(name, script);
            if src.exists() {
                fs::copy(&src, &dest)
                    .map_err(|e| AeptError::IoFile("cannot install script", e, dest.clone()))?;
                fs::set_permissions(&dest, fs::Permissions::from_mode(0o755))?;
            } else {
                remove_if_exists(&dest)?;
            }
        }
        Ok(())
    }

    /// Delete every `info_dir/<name>.*` file.
    pub fn remove_info(&self, name: &str) -> AResult<()> {
        for ext in ["control", "list", "conffiles"].iter().chain(SCRIPTS) {
            remove_if_exists(&self.info_path(name, ext))?;
        }
        Ok(())
    }

    // Auto-installed set ----------------------------------------------

    pub fn load_auto(&self) -> AResult<BTreeSet<String>> {
        Ok(read_lines(&self.auto_file)?.into_iter().collect())
    }

    pub fn is_auto(&self, name: &str) -> AResult<bool> {
        Ok(self.load_auto()?.contains(name))
    }

    pub fn mark_auto(&self, name: &str) -> AResult<()> {
        let mut set = self.load_auto()?;
        if set.insert(name.to_string()) {
            self.store_auto(&set)?;
        }
        Ok(())
    }

    pub fn unmark_auto(&self, name: &str) -> AResult<()> {
        let mut set = self.load_auto()?;
        if set.remove(name) {
            self.store_auto(&set)?;
        }
        Ok(())
    }

    pub fn clear_auto(&self) -> AResult<()> {
        self.store_auto(&BTreeSet::new())
    }

    fn store_auto(&self, set: &BTreeSet<String>) -> AResult<()> {
        let mut out = String::new();
        for name in set {
            out.push_str(name);
            out.push('\n');
        }
        self.write_atomic(&self.auto_file, out.as_bytes())
    }

    // Pin set ---------------------------------------------------------

    pub fn load_pins(&self) -> AResult<BTreeMap<String, String>> {
        let mut pins = BTreeMap::new();
        for line in read_lines(&self.pin_file)? {
            if let Some((name, version)) = line.split_once(' ') {
                pins.insert(name.to_string(), version.trim().to_string());
            }
        }
        Ok(pins)
    }

    pub fn pin_add(&self, name: &str, version: &str) -> AResult<()> {
        let mut pins = self.load_pins()?;
        pins.insert(name.to_string(), version.to_string());
        self.store_pins(&pins)
    }

    pub fn pin_remove(&self, name: &str) -> AResult<()> {
        let mut pins = self.load_pins()?;
        if pins.remove(name).is_some() {
            self.store_pins(&pins)?;
        }
        Ok(())
    }

    fn store_pins(&self, pins: &BTreeMap<String, String>) -> AResult<()> {
        let mut out = String::new();
        for (name, version) in pins {
            out.push_str(name);
            out.push(' ');
            out.push_str(version);
            out.push('\n');
        }
        self.write_atomic(&self.pin_file, out.as_bytes())
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> AResult<()> {
        let parent = path.parent().ok_or("status path has no parent")?;
        fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| AeptError::IoFile("cannot create temp file", e, parent.to_path_buf()))?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .map_err(|e| AeptError::IoFile("cannot replace", e.error.into(), path.to_path_buf()))?;
        Ok(())
    }
}

fn read_lines(path: &Path) -> AResult<Vec<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(AeptError::IoFile("cannot read", e, path.to_path_buf())),
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
