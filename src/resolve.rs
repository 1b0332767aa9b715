//! Assembling the solver pool from everything the engine knows about:
//! the status database, the downloaded indices, local package files and
//! the pin set; plus the job building and the force-depends retry.

use crate::config::Config;
use crate::control::{parse_one, parse_paragraphs};
use crate::error::{AResult, AeptError};
use crate::ipk::ar::PkgArchive;
use crate::ipk::extract::control_member_string;
use crate::listener::Listener;
use crate::pathcheck::is_valid_name;
use crate::solver::{solve, Job, Pool, RepoKind, Resolution, Solvable, SolvableId, SolveOptions};
use crate::status::StatusDb;
use std::collections::HashMap;
use std::fs;
use std::io::BufReader;
use std::path::PathBuf;

/// The pool plus what the engine needs to find package payloads again.
pub struct LoadedPool {
    pub pool: Pool,
    /// Command-line solvable -> the local file it came from.
    pub local_files: HashMap<SolvableId, PathBuf>,
}

/// Load installed + one repo per source + a commandline repo, and
/// register the pins.
pub fn load_pool(
    cfg: &Config,
    db: &StatusDb,
    listener: &dyn Listener,
    locals: &[PathBuf],
) -> AResult<LoadedPool> {
    let mut pool = Pool::new(cfg.arch_list.clone());

    for para in db.load()? {
        pool.add(Solvable::from_paragraph(&para, RepoKind::Installed)?);
    }

    for (at, source) in cfg.sources.iter().enumerate() {
        let list = cfg.lists_dir.join(&source.name);
        let file = match fs::File::open(&list) {
            Ok(f) => f,
            Err(_) => {
                listener.warning(format!(
                    "no package list for source {} (run `aept update`)",
                    source.name
                ));
                continue;
            }
        };
        for para in parse_paragraphs(BufReader::new(file))? {
            match Solvable::from_paragraph(&para, RepoKind::Remote(at)) {
                Ok(s) => {
                    pool.add(s);
                }
                Err(e) => listener.warning(format!("source {}: skipping stanza: {e}", source.name)),
            }
        }
    }

    let mut local_files = HashMap::new();
    for path in locals {
        let archive = PkgArchive::open(path)
            .map_err(|e| e.context(format!("cannot read package {}", path.display())))?;
        let control = control_member_string(&archive, "control")?
            .ok_or_else(|| AeptError::MemberNotFound("control", path.clone()))?;
        let para = parse_one(&control)?;
        let mut solvable = Solvable::from_paragraph(&para, RepoKind::Commandline)?;
        solvable.location = Some(path.display().to_string());
        if let Some(id) = pool.add(solvable) {
            local_files.insert(id, path.clone());
        } else {
            listener.warning(format!(
                "{}: architecture not installable here, ignoring",
                path.display()
            ));
        }
    }

    pool.set_pins(db.load_pins()?.into_iter().collect());
    Ok(LoadedPool { pool, local_files })
}

/// Jobs for an explicit install: pinned names translate to the exact
/// published solvable, falling back to best-available with a warning.
pub fn install_jobs(
    pool: &Pool,
    names: &[String],
    local_ids: &[SolvableId],
    listener: &dyn Listener,
) -> AResult<Vec<Job>> {
    let mut jobs = Vec::new();
    for name in names {
        if !is_valid_name(name) {
            return Err(AeptError::UnsafeName(name.clone()));
        }
        match pool.pinned_version(name).map(str::to_string) {
            Some(version) => match pool.exact_candidate(name, &version) {
                Some(id) => jobs.push(Job::InstallExact(id)),
                None => {
                    listener.warning(format!(
                        "{name} is pinned to {version} which no source publishes; using best available"
                    ));
                    jobs.push(Job::Install(name.clone()));
                }
            },
            None => jobs.push(Job::Install(name.clone())),
        }
    }
    for &id in local_ids {
        jobs.push(Job::InstallExact(id));
    }
    Ok(jobs)
}

pub fn remove_jobs(names: &[String]) -> AResult<Vec<Job>> {
    names
        .iter()
        .map(|name| {
            if is_valid_name(name) {
                Ok(Job::Erase(name.clone()))
            } else {
                Err(AeptError::UnsafeName(name.clone()))
            }
        })
        .collect()
}

/// Upgrade-all: every pin contributes a lock.
pub fn upgrade_jobs(db: &StatusDb) -> AResult<Vec<Job>> {
    let mut jobs: Vec<Job> = db.load_pins()?.into_keys().map(Job::Lock).collect();
    jobs.push(Job::UpdateAll);
    Ok(jobs)
}

/// First solve is strict. With `force_depends`, problems degrade to
/// accepting each one's first solution (the relaxed pass); a second
/// failure is fatal even under force.
pub fn resolve(
    pool: &Pool,
    jobs: &[Job],
    force_depends: bool,
    allow_downgrade: bool,
    listener: &dyn Listener,
) -> AResult<Resolution> {
    let strict = SolveOptions { relaxed: false, allow_downgrade };
    match solve(pool, jobs, strict) {
        Ok(res) => Ok(res),
        Err(problems) if force_depends => {
            for p in &problems {
                listener.warning(format!("ignoring dependency problem: {p}"));
            }
            let relaxed = SolveOptions { relaxed: true, allow_downgrade };
            solve(pool, jobs, relaxed).map_err(to_resolve_error)
        }
        Err(problems) => Err(to_resolve_error(problems)),
    }
}

fn to_resolve_error(problems: Vec<crate::solver::Problem>) -> AeptError {
    AeptError::ResolveFailed(problems.into_iter().map(|p| p.what).collect())
}

/// Convenience used by `show`/`list`: every stanza of every downloaded
/// index, tolerating missing or torn lists.
pub fn available_stanzas(cfg: &Config) -> Vec<crate::control::Paragraph> {
    let mut out = Vec::new();
    for source in &cfg.sources {
        let list = cfg.lists_dir.join(&source.name);
        let Ok(file) = fs::File::open(&list) else { continue };
        if let Ok(paras) = parse_paragraphs(BufReader::new(file)) {
            out.extend(paras);
        }
    }
    out
}
