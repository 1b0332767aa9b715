//! Configuration-file conflict resolution during upgrades.
//!
//! Three digests drive the decision for every conffile the new package
//! declares: the file on disk (`cur`), the freshly staged candidate
//! (`new`), and what this tool last installed (`old`, from
//! `<name>.conffiles`). The live file is never touched until the
//! decision says so; `extract_all` has already parked the candidate next
//! to it with the `.aept-new` suffix.

use crate::config::Config;
use crate::digest::md5_file;
use crate::error::AResult;
use crate::listener::Listener;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const NEW_SUFFIX: &str = ".aept-new";

/// Answer to the interactive conffile question.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PromptChoice {
    InstallNew,
    KeepOld,
    /// Show a diff, then ask again.
    Diff,
    /// Drop into a shell to examine the situation, then ask again.
    Shell,
    /// Keep the old file, leave the candidate for review.
    Default,
}

/// Interaction capability the environment provides. Queries beyond the
/// conffile question (the transaction confirmation) live here too, so
/// non-interactive runs swap in one value.
pub trait Prompter {
    fn conffile_choice(&self, path: &Path, old_version: &str, new_version: &str) -> PromptChoice;
    fn confirm(&self, question: &str) -> bool;
}

/// Answers every question with its default: keep the old conffile (the
/// candidate stays on disk for review) and proceed with the plan.
pub struct NonInteractive;
impl Prompter for NonInteractive {
    fn conffile_choice(&self, _path: &Path, _old: &str, _new: &str) -> PromptChoice {
        PromptChoice::Default
    }

    fn confirm(&self, _question: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConffilePolicy {
    pub force_confnew: bool,
    pub force_confold: bool,
    pub interactive: bool,
}

/// Resolve every conffile of `new_paths` and return the records for the
/// new `.conffiles` file. `staging` holds the candidates laid down by
/// `extract_selected`; `old_records` is the `.conffiles` content
/// snapshotted at the start of the upgrade.
#[allow(clippy::too_many_arguments)]
pub fn resolve_conffiles(
    cfg: &Config,
    old_records: &BTreeMap<String, String>,
    new_paths: &[String],
    staging: &Path,
    old_version: &str,
    new_version: &str,
    policy: &ConffilePolicy,
    prompter: &dyn Prompter,
    listener: &dyn Listener,
) -> AResult<BTreeMap<String, String>> {
    let mut records = BTreeMap::new();
    for path in new_paths {
        let live = cfg.real_path(Path::new(path));
        let candidate = staging.join(path.trim_start_matches('/'));
        let shadow = shadow_path(&live);

        let cur_md5 = md5_if_exists(&live)?;
        let new_md5 = md5_if_exists(&candidate)?;
        let old_md5 = old_records.get(path);

        let decision = match (&cur_md5, &new_md5) {
            (None, _) => Decision::InstallNew,
            (Some(_), None) => Decision::KeepOld,
            (Some(cur), Some(new)) if cur == new => Decision::NoOp,
            (Some(cur), Some(_)) if old_md5 == Some(cur) => Decision::InstallNew,
            (Some(_), Some(new)) if old_md5 == Some(new) => Decision::KeepOld,
            _ => Decision::Ask,
        };

        let decision = match decision {
            Decision::Ask if policy.force_confnew => Decision::InstallNew,
            Decision::Ask if policy.force_confold => Decision::KeepOld,
            Decision::Ask if !policy.interactive => {
                listener.warning(format!(
                    "{path} was modified; keeping your version, new version saved as {path}{NEW_SUFFIX}"
                ));
                Decision::KeepOldLeaveCandidate
            }
            Decision::Ask => ask(&live, &candidate, old_version, new_version, prompter),
            other => other,
        };

        match decision {
            Decision::InstallNew => {
                install_candidate(&live, &shadow, &candidate)?;
                record(&mut records, path, new_md5.or(cur_md5));
            }
            Decision::KeepOld => {
                remove_shadow(&shadow);
                record(&mut records, path, cur_md5.or(new_md5));
            }
            Decision::KeepOldLeaveCandidate => {
                record(&mut records, path, cur_md5.or(new_md5));
            }
            Decision::NoOp => {
                remove_shadow(&shadow);
                record(&mut records, path, cur_md5);
            }
            Decision::Ask => unreachable!(),
        }
    }
    Ok(records)
}

#[derive(Debug, PartialEq)]
enum Decision {
    InstallNew,
    KeepOld,
    KeepOldLeaveCandidate,
    NoOp,
    Ask,
}

fn ask(
    live: &Path,
    candidate: &Path,
    old_version: &str,
    new_version: &str,
    prompter: &dyn Prompter,
) -> Decision {
    loop {
        match prompter.conffile_choice(live, old_version, new_version) {
            PromptChoice::InstallNew => return Decision::InstallNew,
            PromptChoice::KeepOld => return Decision::KeepOld,
            PromptChoice::Default => return Decision::KeepOldLeaveCandidate,
            PromptChoice::Diff => {
                let _ = Command::new("diff").arg("-u").arg(live).arg(candidate).status();
            }
            PromptChoice::Shell => {
                let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".into());
                let cwd = live.parent().unwrap_or_else(|| Path::new("/"));
                let _ = Command::new(shell).current_dir(cwd).status();
            }
        }
    }
}

fn install_candidate(live: &Path, shadow: &Path, candidate: &Path) -> AResult<()> {
    if shadow.exists() {
        fs::rename(shadow, live)?;
    } else if candidate.exists() {
        if let Some(parent) = live.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(candidate, live)?;
    }
    Ok(())
}

fn remove_shadow(shadow: &Path) {
    if let Err(e) = fs::remove_file(shadow) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::debug!("cannot remove {}: {e}", shadow.display());
        }
    }
}

fn record(records: &mut BTreeMap<String, String>, path: &str, md5: Option<String>) {
    if let Some(md5) = md5 {
        records.insert(path.to_string(), md5);
    }
}

pub fn shadow_path(live: &Path) -> PathBuf {
    let mut s = live.as_os_str().to_os_string();
    s.push(NEW_SUFFIX);
    PathBuf::from(s)
}

fn md5_if_exists(path: &Path) -> AResult<Option<String>> {
    match md5_file(path) {
        Ok(md5) => Ok(Some(md5)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Parse the control archive's `conffiles` member: one absolute path
/// per line.
pub fn parse_declared(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && l.starts_with('/'))
        .map(str::to_string)
        .collect()
}
