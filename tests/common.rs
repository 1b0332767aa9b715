//! Shared fixtures: build real `.ipk` files and a `file://` repository,
//! then drive transactions against a throwaway offline root.
#![allow(dead_code)] // each test crate uses a different subset

use aept::conffile::NonInteractive;
use aept::config::{Config, Source};
use aept::error::AResult;
use aept::fetch::{StdFetcher, UsignVerifier};
use aept::listener::NoOpListener;
use aept::status::StatusDb;
use aept::transaction::{Ctx, TransactionOpts};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tar::EntryType;

pub struct PkgBuilder {
    name: String,
    version: String,
    fields: Vec<(String, String)>,
    files: Vec<(String, Vec<u8>, u32)>,
    symlinks: Vec<(String, String)>,
    conffiles: Vec<String>,
    scripts: Vec<(&'static str, String)>,
}

impl PkgBuilder {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            fields: Vec::new(),
            files: Vec::new(),
            symlinks: Vec::new(),
            conffiles: Vec::new(),
            scripts: Vec::new(),
        }
    }

    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    pub fn depends(self, value: &str) -> Self {
        self.field("Depends", value)
    }

    pub fn file(mut self, path: &str, content: &[u8], mode: u32) -> Self {
        self.files.push((path.to_string(), content.to_vec(), mode));
        self
    }

    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        self.symlinks.push((path.to_string(), target.to_string()));
        self
    }

    pub fn conffile(mut self, path: &str, content: &[u8]) -> Self {
        self.conffiles.push(path.to_string());
        self.files.push((path.to_string(), content.to_vec(), 0o644));
        self
    }

    pub fn script(mut self, which: &'static str, body: &str) -> Self {
        self.scripts.push((which, body.to_string()));
        self
    }

    pub fn control_stanza(&self) -> String {
        let mut out = format!(
            "Package: {}\nVersion: {}\nArchitecture: all\n",
            self.name, self.version
        );
        for (name, value) in &self.fields {
            out.push_str(&format!("{name}: {value}\n"));
        }
        out
    }

    pub fn filename(&self) -> String {
        format!("{}_{}.ipk", self.name, self.version)
    }

    pub fn build(&self) -> Vec<u8> {
        let control_tar = {
            let mut tar = tar::Builder::new(Vec::new());
            append_file(&mut tar, "./control", self.control_stanza().as_bytes(), 0o644);
            if !self.conffiles.is_empty() {
                let list = self.conffiles.join("\n") + "\n";
                append_file(&mut tar, "./conffiles", list.as_bytes(), 0o644);
            }
            for (which, body) in &self.scripts {
                append_file(&mut tar, &format!("./{which}"), body.as_bytes(), 0o755);
            }
            tar.into_inner().unwrap()
        };
        let data_tar = {
            let mut tar = tar::Builder::new(Vec::new());
            let mut dirs_done: Vec<String> = Vec::new();
            for (path, _, _) in &self.files {
                append_parent_dirs(&mut tar, path, &mut dirs_done);
            }
            for (path, _) in &self.symlinks {
                append_parent_dirs(&mut tar, path, &mut dirs_done);
            }
            for (path, content, mode) in &self.files {
                append_file(&mut tar, &format!("./{}", path.trim_start_matches('/')), content, *mode);
            }
            for (path, target) in &self.symlinks {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(EntryType::Symlink);
                header.set_size(0);
                header.set_mode(0o777);
                header.set_cksum();
                tar.append_link(&mut header, format!("./{}", path.trim_start_matches('/')), target)
                    .unwrap();
            }
            tar.into_inner().unwrap()
        };

        let mut out = Vec::new();
        {
            let mut ar = ar::Builder::new(&mut out);
            for (member, data) in [
                ("debian-binary", b"2.0\n".to_vec()),
                ("control.tar.gz", gz(&control_tar)),
                ("data.tar.gz", gz(&data_tar)),
            ] {
                let header = ar::Header::new(member.as_bytes().to_vec(), data.len() as u64);
                ar.append(&header, data.as_slice()).unwrap();
            }
        }
        out
    }
}

fn gz(data: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn append_file(tar: &mut tar::Builder<Vec<u8>>, path: &str, content: &[u8], mode: u32) {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(mode);
    header.set_mtime(1_700_000_000);
    header.set_cksum();
    tar.append_data(&mut header, path, content).unwrap();
}

fn append_parent_dirs(tar: &mut tar::Builder<Vec<u8>>, path: &str, done: &mut Vec<String>) {
    let rel = path.trim_start_matches('/');
    let parts: Vec<&str> = rel.split('/').collect();
    let mut dir = String::new();
    for part in &parts[..parts.len().saturating_sub(1)] {
        dir.push_str(part);
        dir.push('/');
        if done.contains(&dir) {
            continue;
        }
        done.push(dir.clone());
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_cksum();
        tar.append_data(&mut header, format!("./{dir}"), std::io::empty()).unwrap();
    }
}

pub struct Repo {
    pub dir: tempfile::TempDir,
}

impl Repo {
    pub fn new() -> Self {
        Self { dir: tempfile::tempdir().unwrap() }
    }

    /// Write the `.ipk` and append its stanza to the `Packages` index.
    pub fn publish(&self, pkg: &PkgBuilder) {
        let bytes = pkg.build();
        let filename = pkg.filename();
        fs::write(self.dir.path().join(&filename), &bytes).unwrap();

        let sha256 = hex::encode(Sha256::digest(&bytes));
        let mut stanza = pkg.control_stanza();
        stanza.push_str(&format!("Filename: {filename}\n"));
        stanza.push_str(&format!("Size: {}\n", bytes.len()));
        stanza.push_str(&format!("SHA256: {sha256}\n"));
        stanza.push('\n');

        let mut index = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.path().join("Packages"))
            .unwrap();
        index.write_all(stanza.as_bytes()).unwrap();
    }

    pub fn url(&self) -> String {
        format!("file://{}", self.dir.path().display())
    }
}

pub struct Rig {
    pub root: tempfile::TempDir,
    pub cfg: Config,
}

impl Rig {
    pub fn new(repo: &Repo) -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.offline_root = Some(root.path().to_path_buf());
        cfg.sources.push(Source { name: "test".to_string(), url: repo.url(), gzip: false });
        cfg.apply_offline_root();
        Self { root, cfg }
    }

    pub fn with_ctx<T>(&self, f: impl FnOnce(&Ctx<'_>) -> AResult<T>) -> AResult<T> {
        let listener = NoOpListener;
        let fetcher = StdFetcher { timeout: 5 };
        let verifier = UsignVerifier { keydir: PathBuf::from("/nonexistent") };
        let prompter = NonInteractive;
        let ctx = Ctx {
            cfg: &self.cfg,
            listener: &listener,
            fetcher: &fetcher,
            verifier: &verifier,
            prompter: &prompter,
            interrupted: Arc::new(AtomicBool::new(false)),
        };
        f(&ctx)
    }

    pub fn update(&self) -> AResult<()> {
        let fetcher = StdFetcher { timeout: 5 };
        let verifier = UsignVerifier { keydir: PathBuf::from("/nonexistent") };
        aept::index::update(&self.cfg, &NoOpListener, &fetcher, &verifier)
    }

    pub fn install(&self, names: &[&str]) -> AResult<()> {
        self.install_with(names, &opts())
    }

    pub fn install_with(&self, names: &[&str], opts: &TransactionOpts) -> AResult<()> {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        self.with_ctx(|ctx| aept::transaction::install(ctx, &names, &[], opts))
    }

    pub fn install_local(&self, files: &[PathBuf]) -> AResult<()> {
        self.with_ctx(|ctx| aept::transaction::install(ctx, &[], files, &opts()))
    }

    pub fn remove(&self, names: &[&str]) -> AResult<()> {
        self.remove_with(names, &opts())
    }

    pub fn remove_with(&self, names: &[&str], opts: &TransactionOpts) -> AResult<()> {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        self.with_ctx(|ctx| aept::transaction::remove(ctx, &names, opts))
    }

    pub fn upgrade_all(&self) -> AResult<()> {
        self.with_ctx(|ctx| aept::transaction::upgrade_all(ctx, &opts()))
    }

    pub fn autoremove(&self) -> AResult<()> {
        self.with_ctx(|ctx| aept::transaction::autoremove(ctx, &opts()))
    }

    pub fn db(&self) -> StatusDb {
        StatusDb::from_config(&self.cfg)
    }

    pub fn real(&self, abs: &str) -> PathBuf {
        self.cfg.real_path(Path::new(abs))
    }

    pub fn status_text(&self) -> String {
        fs::read_to_string(&self.cfg.status_file).unwrap_or_default()
    }

    pub fn installed_names(&self) -> Vec<String> {
        self.db()
            .load()
            .unwrap()
            .iter()
            .filter_map(|p| p.get("Package").map(str::to_string))
            .collect()
    }
}

/// Non-interactive defaults for tests.
pub fn opts() -> TransactionOpts {
    TransactionOpts { interactive: false, ..Default::default() }
}
