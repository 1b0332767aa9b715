use crate::error::{AResult, AeptError};
use crate::listener::Listener;
use crate::pathcheck::is_valid_name;
use std::path::{Path, PathBuf};

/// One configured repository. The name doubles as the index file name
/// under `lists_dir`; `gzip` selects `Packages.gz` over `Packages`.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub name: String,
    pub url: String,
    pub gzip: bool,
}

/// Everything the engine needs to know about the machine it is driving.
/// Built once at the top of every public operation and passed by
/// reference; there is no global configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub offline_root: Option<PathBuf>,
    pub status_file: PathBuf,
    pub info_dir: PathBuf,
    pub lists_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub auto_file: PathBuf,
    pub pin_file: PathBuf,
    pub lock_file: PathBuf,
    pub tmp_dir: PathBuf,
    /// Trusted key directory for index signatures. Always a host path,
    /// never placed under the offline root.
    pub usign_keydir: PathBuf,
    pub check_signature: bool,
    pub ignore_uid: bool,
    pub http_timeout: u64,
    pub arch_list: Vec<String>,
    pub sources: Vec<Source>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            offline_root: None,
            status_file: "/var/lib/aept/status".into(),
            info_dir: "/var/lib/aept/info".into(),
            lists_dir: "/var/lib/aept/lists".into(),
            cache_dir: "/var/cache/aept".into(),
            auto_file: "/var/lib/aept/auto".into(),
            pin_file: "/var/lib/aept/pin".into(),
            lock_file: "/var/lib/aept/lock".into(),
            tmp_dir: "/var/lib/aept/tmp".into(),
            usign_keydir: "/etc/aept/trusted".into(),
            check_signature: false,
            ignore_uid: false,
            http_timeout: 30,
            arch_list: Vec::new(),
            sources: Vec::new(),
        }
    }
}

impl Config {
    /// Parse a configuration file. Directives: `src NAME URL`,
    /// `src/gz NAME URL`, `arch NAME`, `option KEY VALUE`. `#` starts a
    /// comment, tokens are whitespace-separated. Unknown option keys
    /// warn and are ignored.
    pub fn load(path: &Path, listener: &dyn Listener) -> AResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AeptError::IoFile("cannot read configuration", e, path.to_path_buf()))?;
        Self::parse(&text, listener)
    }

    pub fn parse(text: &str, listener: &dyn Listener) -> AResult<Self> {
        let mut cfg = Self::default();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let directive = tokens.next().unwrap_or("");
            match directive {
                "src" | "src/gz" => {
                    let (name, url) = match (tokens.next(), tokens.next()) {
                        (Some(n), Some(u)) => (n, u),
                        _ => {
                            return Err(AeptError::MalformedControl(format!(
                                "line {}: src needs NAME URL",
                                lineno + 1
                            )))
                        }
                    };
                    if !is_valid_name(name) {
                        return Err(AeptError::UnsafeName(name.to_string()));
                    }
                    cfg.sources.push(Source {
                        name: name.to_string(),
                        url: url.trim_end_matches('/').to_string(),
                        gzip: directive == "src/gz",
                    });
                }
                "arch" => {
                    let name = tokens
                        .next()
                        .ok_or_else(|| AeptError::Str("arch directive needs a name"))?;
                    cfg.arch_list.push(name.to_string());
                }
                "option" => {
                    let key = tokens
                        .next()
                        .ok_or_else(|| AeptError::Str("option directive needs a key"))?;
                    let value = tokens.next().unwrap_or("");
                    cfg.set_option(key, value, listener);
                }
                other => {
                    listener.warning(format!("ignoring unknown configuration directive '{other}'"));
                }
            }
        }
        Ok(cfg)
    }

    fn set_option(&mut self, key: &str, value: &str, listener: &dyn Listener) {
        let flag = |v: &str| matches!(v, "1" | "true" | "yes" | "on");
        match key {
            "offline_root" => self.offline_root = Some(PathBuf::from(value)),
            "status_file" => self.status_file = value.into(),
            "info_dir" => self.info_dir = value.into(),
            "lists_dir" => self.lists_dir = value.into(),
            "cache_dir" => self.cache_dir = value.into(),
            "auto_file" => self.auto_file = value.into(),
            "pin_file" => self.pin_file = value.into(),
            "lock_file" => self.lock_file = value.into(),
            "tmp_dir" => self.tmp_dir = value.into(),
            "usign_keydir" => self.usign_keydir = value.into(),
            "check_signature" => self.check_signature = flag(value),
            "ignore_uid" => self.ignore_uid = flag(value),
            "http_timeout" => self.http_timeout = value.parse().unwrap_or(30),
            other => listener.warning(format!("ignoring unknown option '{other}'")),
        }
    }

    /// Re-root every path option under `offline_root`. `usign_keydir`
    /// stays a host path so signature checking works before the root has
    /// any content. The `OFFLINE_ROOT` environment variable is
    /// deliberately not consulted.
    pub fn apply_offline_root(&mut self) {
        let Some(root) = self.offline_root.clone() else { return };
        for path in [
            &mut self.status_file,
            &mut self.info_dir,
            &mut self.lists_dir,
            &mut self.cache_dir,
            &mut self.auto_file,
            &mut self.pin_file,
            &mut self.lock_file,
            &mut self.tmp_dir,
        ] {
            *path = join_root(&root, path);
        }
    }

    /// The target root files are installed under.
    pub fn root(&self) -> &Path {
        self.offline_root.as_deref().unwrap_or_else(|| Path::new("/"))
    }

    /// Absolute on-target path -> real filesystem path.
    pub fn real_path(&self, abs: &Path) -> PathBuf {
        join_root(self.root(), abs)
    }

    /// Smaller rank is preferred; `all` always fits last.
    pub fn arch_rank(&self, arch: &str) -> Option<usize> {
        if let Some(at) = self.arch_list.iter().position(|a| a == arch) {
            return Some(at);
        }
        if arch == "all" || arch == "noarch" || self.arch_list.is_empty() {
            return Some(usize::MAX);
        }
        None
    }
}

pub(crate) fn join_root(root: &Path, abs: &Path) -> PathBuf {
    match abs.strip_prefix("/") {
        Ok(rel) => root.join(rel),
        Err(_) => root.join(abs),
    }
}
