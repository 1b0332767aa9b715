//! Read-only queries. These run without the lock and treat read errors
//! the way they treat absence, so a concurrent transaction can at worst
//! make a package look not-found for a moment.

use crate::config::Config;
use crate::control::Paragraph;
use crate::error::{AResult, AeptError};
use crate::resolve::available_stanzas;
use crate::status::StatusDb;
use crate::version::Version;
use std::fs;
use std::path::Path;

fn installed_stanzas(cfg: &Config) -> Vec<Paragraph> {
    StatusDb::from_config(cfg).load().unwrap_or_default()
}

/// Print the control stanza: the installed one if present, otherwise the
/// best version any source publishes.
pub fn show(cfg: &Config, name: &str) -> AResult<()> {
    if let Some(para) = installed_stanzas(cfg)
        .into_iter()
        .find(|p| p.get("Package") == Some(name))
    {
        print!("{para}");
        return Ok(());
    }
    let best = available_stanzas(cfg)
        .into_iter()
        .filter(|p| p.get("Package") == Some(name))
        .max_by_key(|p| p.get("Version").and_then(|v| v.parse::<Version>().ok()));
    match best {
        Some(para) => {
            print!("{para}");
            Ok(())
        }
        None => Err(AeptError::NotInstalled(name.to_string())),
    }
}

/// One line per package: `name - version - summary`.
pub fn list(cfg: &Config, pattern: Option<&str>, available: bool) -> AResult<()> {
    let stanzas = if available {
        available_stanzas(cfg)
    } else {
        installed_stanzas(cfg)
    };
    let mut lines: Vec<String> = stanzas
        .iter()
        .filter_map(|p| {
            let name = p.get("Package")?;
            if let Some(pat) = pattern {
                if !wildcard_match(pat, name) {
                    return None;
                }
            }
            let version = p.get("Version").unwrap_or("?");
            match p.get_line("Description") {
                Some(desc) if !desc.is_empty() => Some(format!("{name} - {version} - {desc}")),
                _ => Some(format!("{name} - {version}")),
            }
        })
        .collect();
    lines.sort();
    lines.dedup();
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

/// Print every filesystem path the package installed.
pub fn files(cfg: &Config, name: &str) -> AResult<()> {
    let db = StatusDb::from_config(cfg);
    let list = db
        .read_list(name)
        .map_err(|_| AeptError::NotInstalled(name.to_string()))?;
    for entry in list {
        println!("{}", entry.path.trim_start_matches('.'));
    }
    Ok(())
}

/// Which installed package owns a path.
pub fn owns(cfg: &Config, path: &str) -> AResult<()> {
    let wanted = normalize_query_path(path);
    let mut found = false;
    for para in installed_stanzas(cfg) {
        let Some(name) = para.get("Package") else { continue };
        let db = StatusDb::from_config(cfg);
        let Ok(list) = db.read_list(name) else { continue };
        if list.iter().any(|e| e.path == wanted) {
            println!("{name}");
            found = true;
        }
    }
    if found {
        Ok(())
    } else {
        Err(AeptError::Str("no installed package owns that path"))
    }
}

pub fn print_architecture(cfg: &Config) {
    if cfg.arch_list.is_empty() {
        println!("all");
        return;
    }
    for (priority, arch) in cfg.arch_list.iter().enumerate() {
        println!("{arch} {}", cfg.arch_list.len() - priority);
    }
}

/// Integrity sweep used by tests and `aept list -v` debugging: every
/// `.list` must have a status stanza and vice versa.
pub fn consistency_issues(cfg: &Config) -> Vec<String> {
    let mut issues = Vec::new();
    let db = StatusDb::from_config(cfg);
    let installed: Vec<String> = installed_stanzas(cfg)
        .iter()
        .filter_map(|p| p.get("Package").map(str::to_string))
        .collect();
    for name in &installed {
        if db.read_list(name).is_err() {
            issues.push(format!("{name}: status stanza without a file list"));
        }
        if !db.has_info(name) {
            issues.push(format!("{name}: status stanza without a control file"));
        }
    }
    if let Ok(entries) = fs::read_dir(&cfg.info_dir) {
        for entry in entries.flatten() {
            let file = entry.file_name();
            let file = file.to_string_lossy();
            if let Some(name) = file.strip_suffix(".list") {
                if !installed.iter().any(|n| n == name) {
                    issues.push(format!("{name}: file list without a status stanza"));
                }
            }
        }
    }
    issues
}

fn normalize_query_path(path: &str) -> String {
    let stripped = path.trim_start_matches("./").trim_start_matches('/');
    format!("./{stripped}")
}

/// `*` matches any run of characters; everything else is literal.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    fn inner(p: &[u8], t: &[u8]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some(b'*') => inner(&p[1..], t) || (!t.is_empty() && inner(p, &t[1..])),
            Some(c) => t.first() == Some(c) && inner(&p[1..], &t[1..]),
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}
