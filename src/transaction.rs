//! The transaction engine: one strictly sequential state machine from a
//! user request to a committed installed set. Everything here runs under
//! the advisory lock; the solver decides the step order and this module
//! honors it verbatim.

use crate::conffile::{self, ConffilePolicy, Prompter, NEW_SUFFIX};
use crate::config::Config;
use crate::control::parse_one;
use crate::digest::md5_file;
use crate::error::{AResult, AeptError};
use crate::fetch::{Fetcher, SigVerifier};
use crate::fileset::FileSet;
use crate::ipk::ar::PkgArchive;
use crate::ipk::extract::{
    control_member_string, default_flags, extract_all, extract_control_to_dir, extract_selected,
    list_paths_to_stream,
};
use crate::listener::Listener;
use crate::lock;
use crate::resolve::{self, LoadedPool};
use crate::script;
use crate::solver::{self, Pool, RepoKind, SolvableId, Step, StepKind, Transaction};
use crate::status::{StatusDb, STATE_INSTALLED, STATE_UNPACKED};
use crate::version::Possibility;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The engine context: configuration plus every capability the
/// environment provides, built at the top of each public operation and
/// threaded through everything beneath it.
pub struct Ctx<'a> {
    pub cfg: &'a Config,
    pub listener: &'a dyn Listener,
    pub fetcher: &'a dyn Fetcher,
    pub verifier: &'a dyn SigVerifier,
    pub prompter: &'a dyn Prompter,
    pub interrupted: Arc<AtomicBool>,
}

impl Ctx<'_> {
    fn check_interrupted(&self) -> AResult<()> {
        if self.interrupted.load(Ordering::Relaxed) {
            self.listener.warning("interrupted, stopping between steps".into());
            Err(AeptError::Interrupted)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransactionOpts {
    pub force_depends: bool,
    pub noaction: bool,
    pub download_only: bool,
    pub allow_downgrade: bool,
    pub reinstall: bool,
    pub no_cache: bool,
    pub purge: bool,
    pub force_confnew: bool,
    pub force_confold: bool,
    pub interactive: bool,
}

impl Default for TransactionOpts {
    fn default() -> Self {
        Self {
            force_depends: false,
            noaction: false,
            download_only: false,
            allow_downgrade: false,
            reinstall: false,
            no_cache: false,
            purge: false,
            force_confnew: false,
            force_confold: false,
            interactive: true,
        }
    }
}

impl TransactionOpts {
    fn conffile_policy(&self) -> ConffilePolicy {
        ConffilePolicy {
            force_confnew: self.force_confnew,
            force_confold: self.force_confold,
            interactive: self.interactive,
        }
    }
}

// ---------------------------------------------------------------- install

pub fn install(
    ctx: &Ctx<'_>,
    names: &[String],
    locals: &[PathBuf],
    opts: &TransactionOpts,
) -> AResult<()> {
    let mut opts = *opts;
    if opts.no_cache && opts.download_only {
        // download-only wants the cache populated; no-cache would defeat it
        opts.no_cache = false;
    }
    let _lock = lock::acquire(&ctx.cfg.lock_file)?;
    let db = StatusDb::from_config(ctx.cfg);
    let loaded = resolve::load_pool(ctx.cfg, &db, ctx.listener, locals)?;
    let mut local_ids: Vec<SolvableId> = loaded.local_files.keys().copied().collect();
    local_ids.sort_unstable();

    let jobs = resolve::install_jobs(&loaded.pool, names, &local_ids, ctx.listener)?;
    let res = resolve::resolve(
        &loaded.pool,
        &jobs,
        opts.force_depends,
        opts.allow_downgrade,
        ctx.listener,
    )?;
    for warning in &res.warnings {
        ctx.listener.warning(warning.clone());
    }

    let mut explicit: HashSet<String> = names.iter().cloned().collect();
    for &id in &local_ids {
        explicit.insert(loaded.pool.get(id).name.clone());
    }

    let proceed = present(ctx, &loaded.pool, &res.transaction, &explicit, &opts, true)?;
    if opts.noaction {
        return Ok(());
    }
    // explicit names drop their auto mark even when there is nothing to do
    mark_intents(&db, &loaded.pool, &explicit)?;
    if proceed {
        let mut protected = execute(ctx, &db, &loaded, &res.transaction, &explicit, &opts)?;
        if opts.download_only {
            return Ok(());
        }
        if opts.reinstall {
            reinstall_pass(ctx, &db, &loaded, &res.transaction, names, &mut protected, &opts)?;
        }
    } else if opts.reinstall && !opts.download_only {
        // nothing for the solver to do, but --reinstall still applies to
        // the packages named on the command line
        let mut protected = FileSet::new();
        reinstall_pass(ctx, &db, &loaded, &res.transaction, names, &mut protected, &opts)?;
    }
    Ok(())
}

// ---------------------------------------------------------------- remove

pub fn remove(ctx: &Ctx<'_>, names: &[String], opts: &TransactionOpts) -> AResult<()> {
    let _lock = lock::acquire(&ctx.cfg.lock_file)?;
    let db = StatusDb::from_config(ctx.cfg);
    let loaded = resolve::load_pool(ctx.cfg, &db, ctx.listener, &[])?;
    let jobs = resolve::remove_jobs(names)?;
    let res = resolve::resolve(&loaded.pool, &jobs, opts.force_depends, opts.allow_downgrade, ctx.listener)?;
    for warning in &res.warnings {
        ctx.listener.warning(warning.clone());
    }
    let explicit: HashSet<String> = names.iter().cloned().collect();
    if !present(ctx, &loaded.pool, &res.transaction, &explicit, opts, true)? {
        return Ok(());
    }
    execute(ctx, &db, &loaded, &res.transaction, &explicit, opts)?;
    Ok(())
}

// ----------------------------------------------------------- upgrade-all

pub fn upgrade_all(ctx: &Ctx<'_>, opts: &TransactionOpts) -> AResult<()> {
    let _lock = lock::acquire(&ctx.cfg.lock_file)?;
    let db = StatusDb::from_config(ctx.cfg);
    let loaded = resolve::load_pool(ctx.cfg, &db, ctx.listener, &[])?;
    let jobs = resolve::upgrade_jobs(&db)?;
    let res = resolve::resolve(&loaded.pool, &jobs, opts.force_depends, opts.allow_downgrade, ctx.listener)?;
    for warning in &res.warnings {
        ctx.listener.warning(warning.clone());
    }
    let explicit = HashSet::new();
    if !present(ctx, &loaded.pool, &res.transaction, &explicit, opts, false)? {
        return Ok(());
    }
    execute(ctx, &db, &loaded, &res.transaction, &explicit, opts)?;
    Ok(())
}

// ------------------------------------------------------------ autoremove

pub fn autoremove(ctx: &Ctx<'_>, opts: &TransactionOpts) -> AResult<()> {
    let _lock = lock::acquire(&ctx.cfg.lock_file)?;
    let db = StatusDb::from_config(ctx.cfg);
    let loaded = resolve::load_pool(ctx.cfg, &db, ctx.listener, &[])?;
    let auto = db.load_auto()?;
    let orphans = solver::unreachable_auto(&loaded.pool, &auto);
    let tx = Transaction {
        steps: orphans
            .into_iter()
            .map(|id| Step { kind: StepKind::Erase, id, partner: None })
            .collect(),
    };
    if !present(ctx, &loaded.pool, &tx, &HashSet::new(), opts, false)? {
        return Ok(());
    }
    execute(ctx, &db, &loaded, &tx, &HashSet::new(), opts)?;
    Ok(())
}

/// Empty the package cache.
pub fn clean(cfg: &Config, listener: &dyn Listener) -> AResult<()> {
    let entries = match fs::read_dir(&cfg.cache_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(AeptError::IoFile("cannot read cache", e, cfg.cache_dir.clone())),
    };
    let mut freed = 0u64;
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            freed += entry.metadata()?.len();
            fs::remove_file(entry.path())?;
        }
    }
    listener.info(format!("freed {freed} bytes from {}", cfg.cache_dir.display()));
    Ok(())
}

// ------------------------------------------------------------- the plan

/// Render the plan and decide whether to go on. `Ok(false)` means stop
/// without error (empty plan, or `--noaction`). With `confirm_expansion`
/// an interactive run asks before acting on packages the user never
/// named.
fn present(
    ctx: &Ctx<'_>,
    pool: &Pool,
    tx: &Transaction,
    explicit: &HashSet<String>,
    opts: &TransactionOpts,
    confirm_expansion: bool,
) -> AResult<bool> {
    if tx.is_empty() {
        println!("Nothing to do.");
        return Ok(false);
    }
    let mut installs = Vec::new();
    let mut upgrades = Vec::new();
    let mut downgrades = Vec::new();
    let mut removes = Vec::new();
    let mut expands = false;
    for step in &tx.steps {
        let s = pool.get(step.id);
        match step.kind {
            StepKind::Install => {
                if !explicit.contains(&s.name) {
                    expands = true;
                }
                match step.partner {
                    Some(old_id) => {
                        let old = pool.get(old_id);
                        if s.version >= old.version {
                            upgrades.push(format!("{} ({} -> {})", s.name, old.version, s.version));
                        } else {
                            downgrades.push(format!("{} ({} -> {})", s.name, old.version, s.version));
                        }
                    }
                    None => installs.push(format!("{} ({})", s.name, s.version)),
                }
            }
            StepKind::Erase => {
                if step.partner.is_none() {
                    if !explicit.contains(&s.name) {
                        expands = true;
                    }
                    removes.push(format!("{} ({})", s.name, s.version));
                }
            }
        }
    }
    for (title, list) in [
        ("The following packages will be installed:", &installs),
        ("The following packages will be upgraded:", &upgrades),
        ("The following packages will be downgraded:", &downgrades),
        ("The following packages will be removed:", &removes),
    ] {
        if !list.is_empty() {
            println!("{title}");
            for line in list {
                println!("  {line}");
            }
        }
    }
    println!(
        "{} to install, {} to upgrade, {} to remove.",
        installs.len(),
        upgrades.len() + downgrades.len(),
        removes.len()
    );
    if opts.noaction {
        return Ok(false);
    }
    if opts.interactive && confirm_expansion && expands && !ctx.prompter.confirm("Continue?") {
        return Err(AeptError::Str("aborted by user"));
    }
    Ok(true)
}

/// Explicitly named packages stop being "only here as a dependency", and
/// so does every installed package providing that name.
fn mark_intents(db: &StatusDb, pool: &Pool, explicit: &HashSet<String>) -> AResult<()> {
    for name in explicit {
        db.unmark_auto(name)?;
        for id in pool.installed_providers(name) {
            db.unmark_auto(&pool.get(id).name)?;
        }
    }
    Ok(())
}

// ------------------------------------------------------------- execution

fn execute(
    ctx: &Ctx<'_>,
    db: &StatusDb,
    loaded: &LoadedPool,
    tx: &Transaction,
    explicit: &HashSet<String>,
    opts: &TransactionOpts,
) -> AResult<FileSet> {
    let pool = &loaded.pool;
    let mut packages: HashMap<SolvableId, PathBuf> = HashMap::new();

    // pre-download into the cache unless asked not to
    if !opts.no_cache {
        for step in &tx.steps {
            if step.kind == StepKind::Install {
                ctx.check_interrupted()?;
                let path = fetch_package(ctx, pool, &loaded.local_files, step.id, false)?;
                packages.insert(step.id, path);
            }
        }
    }
    let mut protected = FileSet::new();
    if opts.download_only {
        return Ok(protected);
    }

    for step in &tx.steps {
        ctx.check_interrupted()?;
        match step.kind {
            StepKind::Install => {
                let inline = !packages.contains_key(&step.id);
                let path = match packages.get(&step.id) {
                    Some(path) => path.clone(),
                    None => fetch_package(ctx, pool, &loaded.local_files, step.id, true)?,
                };
                let result = match step.partner {
                    Some(old_id) => {
                        upgrade_step(ctx, db, pool, step.id, old_id, &path, &mut protected, opts)
                    }
                    None => install_step(ctx, db, pool, step.id, &path, &mut protected, None),
                };
                if inline && pool.get(step.id).repo != RepoKind::Commandline {
                    let _ = fs::remove_file(&path);
                }
                result?;
            }
            StepKind::Erase => {
                // the erase half of an upgrade was processed with its install
                if step.partner.is_none() {
                    remove_step(ctx, db, &pool.get(step.id).name, &mut protected, opts)?;
                }
            }
        }
    }

    // fresh installs the user never asked for by name are dependencies
    for step in &tx.steps {
        if step.kind != StepKind::Install || step.partner.is_some() {
            continue;
        }
        let s = pool.get(step.id);
        let wanted = explicit.iter().any(|name| {
            s.satisfies(&Possibility { name: name.clone(), constraint: None })
        });
        if !wanted {
            db.mark_auto(&s.name)?;
        }
    }
    Ok(protected)
}

/// Locate the payload for one install step: the named local file, or the
/// cache (validated against the published checksum), or a fresh
/// download. `inline` puts the file in `tmp_dir` instead of the cache.
fn fetch_package(
    ctx: &Ctx<'_>,
    pool: &Pool,
    local_files: &HashMap<SolvableId, PathBuf>,
    id: SolvableId,
    inline: bool,
) -> AResult<PathBuf> {
    let s = pool.get(id);
    let source_at = match s.repo {
        RepoKind::Commandline => {
            return local_files
                .get(&id)
                .cloned()
                .ok_or(AeptError::Str("command-line package has no file"));
        }
        RepoKind::Installed => return Err(AeptError::Str("installed package has no payload")),
        RepoKind::Remote(at) => at,
    };
    let location = s
        .location
        .clone()
        .ok_or_else(|| AeptError::MalformedControl(format!("{} has no Filename", s.name)))?;
    let base = Path::new(&location)
        .file_name()
        .ok_or_else(|| AeptError::MalformedControl(format!("bad Filename '{location}'")))?
        .to_os_string();
    let dir = if inline { &ctx.cfg.tmp_dir } else { &ctx.cfg.cache_dir };
    fs::create_dir_all(dir)?;
    let dest = dir.join(&base);

    if dest.exists() {
        match &s.checksum {
            Some(checksum) => match checksum.verify(&dest) {
                Ok(()) => {
                    ctx.listener.progress("cached", dest.display().to_string());
                    return Ok(dest);
                }
                Err(AeptError::ChecksumMismatch(..)) => {
                    ctx.listener.warning(format!(
                        "cached {} fails its checksum, fetching again",
                        dest.display()
                    ));
                    let _ = fs::remove_file(&dest);
                }
                Err(e) => return Err(e), // unknown algorithm is hard
            },
            None => return Ok(dest),
        }
    }

    let url = format!("{}/{location}", ctx.cfg.sources[source_at].url);
    ctx.listener.progress("downloading", url.clone());
    if let Err(e) = ctx.fetcher.fetch(&url, &dest) {
        let _ = fs::remove_file(&dest);
        return Err(e);
    }
    match &s.checksum {
        Some(checksum) => {
            if let Err(e) = checksum.verify(&dest) {
                let _ = fs::remove_file(&dest);
                return Err(e);
            }
        }
        None => ctx
            .listener
            .warning(format!("no checksum published for {}", base.to_string_lossy())),
    }
    Ok(dest)
}

// ---------------------------------------------------- per-step machines

/// Fresh install. With `old_version` set this is the `--reinstall` form:
/// same machine, scripts told about the version being replaced.
fn install_step(
    ctx: &Ctx<'_>,
    db: &StatusDb,
    pool: &Pool,
    id: SolvableId,
    pkg_path: &Path,
    protected: &mut FileSet,
    old_version: Option<&str>,
) -> AResult<()> {
    let s = pool.get(id);
    let name = s.name.clone();
    let archive = PkgArchive::open(pkg_path)?;
    fs::create_dir_all(&ctx.cfg.tmp_dir)?;
    let tmp = tempfile::Builder::new()
        .prefix("aept-")
        .tempdir_in(&ctx.cfg.tmp_dir)?;
    let ctl = tmp.path().join("control");
    fs::create_dir_all(&ctl)?;
    extract_control_to_dir(&archive, &ctl)?;
    let stanza_text = fs::read_to_string(ctl.join("control"))
        .map_err(|e| AeptError::IoFile("package has no control file", e, pkg_path.to_path_buf()))?;
    let stanza = parse_one(&stanza_text)?;

    let mut preinst_args = vec!["install"];
    if let Some(old) = old_version {
        preinst_args.push(old);
    }
    script::run(ctx.cfg, ctx.listener, &name, "preinst", &ctl.join("preinst"), &preinst_args)?;

    ctx.listener.progress("unpacking", format!("{name} ({})", s.version));
    extract_all(ctx.cfg, &archive, ctx.cfg.root(), None, None, default_flags(), ctx.listener)?;

    let mut list_buf = Vec::new();
    list_paths_to_stream(&archive, &mut list_buf)?;
    db.write_list(&name, &list_buf)?;

    let declared = control_member_string(&archive, "conffiles")?
        .map(|text| conffile::parse_declared(&text))
        .unwrap_or_default();
    let mut records = BTreeMap::new();
    for path in &declared {
        if let Ok(md5) = md5_file(&ctx.cfg.real_path(Path::new(path))) {
            records.insert(path.clone(), md5);
        }
    }
    db.write_conffiles(&name, &records)?;
    db.write_control(&name, &stanza)?;
    db.install_scripts_from(&name, &ctl)?;

    for entry in db.read_list(&name)? {
        protected.insert(entry.path);
    }

    let mut postinst_args = vec!["configure"];
    if let Some(old) = old_version {
        postinst_args.push(old);
    }
    let state = match script::run(
        ctx.cfg,
        ctx.listener,
        &name,
        "postinst",
        &db.script_path(&name, "postinst"),
        &postinst_args,
    ) {
        Ok(()) => STATE_INSTALLED,
        Err(AeptError::ScriptFailed(..)) => {
            ctx.listener
                .warning(format!("postinst of {name} failed; package left unconfigured"));
            STATE_UNPACKED
        }
        Err(e) => return Err(e),
    };
    db.replace(&name, &stanza, state)?;
    Ok(())
}

/// Upgrade or downgrade: INSTALL paired with the ERASE of the same name
/// at another version. The old package's prerm/postrm run from its still
/// installed scripts; files the new version no longer ships are cleaned
/// up unless another step of this transaction now owns them.
#[allow(clippy::too_many_arguments)]
fn upgrade_step(
    ctx: &Ctx<'_>,
    db: &StatusDb,
    pool: &Pool,
    new_id: SolvableId,
    old_id: SolvableId,
    pkg_path: &Path,
    protected: &mut FileSet,
    opts: &TransactionOpts,
) -> AResult<()> {
    let new = pool.get(new_id);
    let old = pool.get(old_id);
    let name = new.name.clone();
    let archive = PkgArchive::open(pkg_path)?;
    fs::create_dir_all(&ctx.cfg.tmp_dir)?;
    let tmp = tempfile::Builder::new()
        .prefix("aept-")
        .tempdir_in(&ctx.cfg.tmp_dir)?;
    let ctl = tmp.path().join("control");
    fs::create_dir_all(&ctl)?;
    extract_control_to_dir(&archive, &ctl)?;
    let stanza_text = fs::read_to_string(ctl.join("control"))
        .map_err(|e| AeptError::IoFile("package has no control file", e, pkg_path.to_path_buf()))?;
    let stanza = parse_one(&stanza_text)?;

    script::run(
        ctx.cfg,
        ctx.listener,
        &name,
        "prerm",
        &db.script_path(&name, "prerm"),
        &["upgrade", new.evr()],
    )?;
    script::run(
        ctx.cfg,
        ctx.listener,
        &name,
        "preinst",
        &ctl.join("preinst"),
        &["upgrade", old.evr()],
    )?;

    let old_list = db.read_list(&name).unwrap_or_default();
    let old_records = db.read_conffiles(&name)?;
    let declared = control_member_string(&archive, "conffiles")?
        .map(|text| conffile::parse_declared(&text))
        .unwrap_or_default();

    ctx.listener
        .progress("upgrading", format!("{name} ({} -> {})", old.version, new.version));
    let mut shadow_set: FileSet = declared.iter().cloned().collect();
    let conffiles = (!declared.is_empty()).then_some(&mut shadow_set);
    extract_all(
        ctx.cfg,
        &archive,
        ctx.cfg.root(),
        conffiles,
        Some(NEW_SUFFIX),
        default_flags(),
        ctx.listener,
    )?;

    let staging = tmp.path().join("conffiles");
    if !declared.is_empty() {
        fs::create_dir_all(&staging)?;
        let mut wanted: FileSet = declared.iter().cloned().collect();
        extract_selected(ctx.cfg, &archive, &mut wanted, &staging, default_flags(), ctx.listener)?;
    }
    let records = conffile::resolve_conffiles(
        ctx.cfg,
        &old_records,
        &declared,
        &staging,
        old.evr(),
        new.evr(),
        &opts.conffile_policy(),
        ctx.prompter,
        ctx.listener,
    )?;

    let mut list_buf = Vec::new();
    list_paths_to_stream(&archive, &mut list_buf)?;
    db.write_list(&name, &list_buf)?;
    let new_list = db.read_list(&name)?;
    let mut new_set = FileSet::new();
    for entry in &new_list {
        new_set.insert(entry.path.clone());
        protected.insert(entry.path.clone());
    }

    // old − new − protected, with the modified-conffile guard
    let mut stale = old_list;
    stale.sort_by(|a, b| b.path.cmp(&a.path));
    for entry in &stale {
        if new_set.contains(&entry.path) || protected.contains(&entry.path) {
            continue;
        }
        let abs = entry.path.trim_start_matches('.');
        if !opts.purge {
            if let Some(recorded) = old_records.get(abs) {
                match md5_file(&ctx.cfg.real_path(Path::new(abs))) {
                    Ok(disk) if &disk != recorded => {
                        ctx.listener
                            .info(format!("preserving locally modified {abs}"));
                        continue;
                    }
                    _ => {}
                }
            }
        }
        unlink_listed(ctx.cfg, &entry.path);
    }

    if let Err(e) = script::run(
        ctx.cfg,
        ctx.listener,
        &name,
        "postrm",
        &db.script_path(&name, "postrm"),
        &["upgrade", new.evr()],
    ) {
        ctx.listener.warning(e.to_string());
    }

    db.write_control(&name, &stanza)?;
    db.install_scripts_from(&name, &ctl)?;
    db.write_conffiles(&name, &records)?;

    let state = match script::run(
        ctx.cfg,
        ctx.listener,
        &name,
        "postinst",
        &db.script_path(&name, "postinst"),
        &["configure", old.evr()],
    ) {
        Ok(()) => STATE_INSTALLED,
        Err(AeptError::ScriptFailed(..)) => {
            ctx.listener
                .warning(format!("postinst of {name} failed; package left unconfigured"));
            STATE_UNPACKED
        }
        Err(e) => return Err(e),
    };
    db.replace(&name, &stanza, state)?;
    Ok(())
}

/// Pure removal of an installed package.
fn remove_step(
    ctx: &Ctx<'_>,
    db: &StatusDb,
    name: &str,
    protected: &mut FileSet,
    opts: &TransactionOpts,
) -> AResult<()> {
    script::run(
        ctx.cfg,
        ctx.listener,
        name,
        "prerm",
        &db.script_path(name, "prerm"),
        &["remove"],
    )?;
    ctx.listener.progress("removing", name.to_string());

    let records = db.read_conffiles(name)?;
    let mut list = db.read_list(name).unwrap_or_default();
    list.sort_by(|a, b| b.path.cmp(&a.path));
    for entry in &list {
        if protected.contains(&entry.path) {
            continue;
        }
        let abs = entry.path.trim_start_matches('.');
        if !opts.purge {
            if let Some(recorded) = records.get(abs) {
                match md5_file(&ctx.cfg.real_path(Path::new(abs))) {
                    Ok(disk) if &disk != recorded => {
                        ctx.listener
                            .info(format!("preserving locally modified {abs}"));
                        continue;
                    }
                    _ => {}
                }
            }
        }
        unlink_listed(ctx.cfg, &entry.path);
    }

    if let Err(e) = script::run(
        ctx.cfg,
        ctx.listener,
        name,
        "postrm",
        &db.script_path(name, "postrm"),
        &["remove"],
    ) {
        ctx.listener.warning(e.to_string());
    }
    db.remove_info(name)?;
    db.remove(name)?;
    db.unmark_auto(name)?;
    if opts.purge {
        db.pin_remove(name)?;
    }
    Ok(())
}

/// Remove one `.list` path under the root. ENOENT is fine; any other
/// failure is logged at debug level and processing continues.
fn unlink_listed(cfg: &Config, list_path: &str) {
    let abs = list_path.trim_start_matches('.');
    let real = cfg.real_path(Path::new(abs));
    let res = match real.symlink_metadata() {
        Err(_) => return,
        Ok(meta) if meta.is_dir() => fs::remove_dir(&real),
        Ok(_) => fs::remove_file(&real),
    };
    if let Err(e) = res {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::debug!("cannot remove {}: {e}", real.display());
        }
    }
}

/// `--reinstall`: explicitly named packages the solver had no work for
/// are re-run through the install machine at their current version.
fn reinstall_pass(
    ctx: &Ctx<'_>,
    db: &StatusDb,
    loaded: &LoadedPool,
    tx: &Transaction,
    names: &[String],
    protected: &mut FileSet,
    opts: &TransactionOpts,
) -> AResult<()> {
    let touched: HashSet<&str> = tx
        .steps
        .iter()
        .map(|step| loaded.pool.get(step.id).name.as_str())
        .collect();
    for name in names {
        if touched.contains(name.as_str()) {
            continue;
        }
        ctx.check_interrupted()?;
        let Some(installed) = db.installed_version(name)? else { continue };
        let poss = Possibility { name: name.clone(), constraint: None };
        let candidate = loaded
            .pool
            .exact_candidate(name, installed.as_str())
            .or_else(|| loaded.pool.best_candidate(&poss));
        let Some(id) = candidate else {
            ctx.listener
                .warning(format!("cannot reinstall {name}: no source publishes it"));
            continue;
        };
        let path = fetch_package(ctx, &loaded.pool, &loaded.local_files, id, opts.no_cache)?;
        install_step(ctx, db, &loaded.pool, id, &path, protected, Some(installed.as_str()))?;
        if opts.no_cache && loaded.pool.get(id).repo != RepoKind::Commandline {
            let _ = fs::remove_file(&path);
        }
    }
    Ok(())
}
