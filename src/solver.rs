//! The dependency solver contract the transaction engine consumes: a
//! pool of solvables assembled from the installed set, the repository
//! indices and any command-line packages; a job queue; and either a
//! problem list or an ordered step transaction with obsoleted-partner
//! links.

use crate::control::Paragraph;
use crate::digest::Checksum;
use crate::error::AResult;
use crate::version::{parse_dependency_list, Dependency, Possibility, Version};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

pub type SolvableId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoKind {
    Installed,
    /// Index position of the configured source.
    Remote(usize),
    /// Local package files named on the command line.
    Commandline,
}

/// One package at one version from one repo.
#[derive(Debug, Clone)]
pub struct Solvable {
    pub name: String,
    pub version: Version,
    pub arch: String,
    pub repo: RepoKind,
    /// `Filename:` relative to the source URL, or the local file path
    /// for command-line packages.
    pub location: Option<String>,
    pub checksum: Option<Checksum>,
    pub depends: Vec<Dependency>,
    pub pre_depends: Vec<Dependency>,
    pub recommends: Vec<Dependency>,
    pub suggests: Vec<Dependency>,
    pub provides: Vec<Possibility>,
    pub conflicts: Vec<Dependency>,
    pub replaces: Vec<Dependency>,
}

impl Solvable {
    pub fn from_paragraph(para: &Paragraph, repo: RepoKind) -> AResult<Self> {
        let deps = |field: &str| -> AResult<Vec<Dependency>> {
            match para.get(field) {
                Some(value) => parse_dependency_list(value),
                None => Ok(Vec::new()),
            }
        };
        Ok(Self {
            name: para.name()?.to_string(),
            version: para.get("Version").unwrap_or("0").parse()?,
            arch: para.get("Architecture").unwrap_or("all").to_string(),
            repo,
            location: para.get("Filename").map(str::to_string),
            checksum: para
                .get("SHA256")
                .map(|h| Checksum { algo: "sha256".into(), hex: h.to_ascii_lowercase() })
                .or_else(|| para.get("MD5sum").map(|h| Checksum { algo: "md5".into(), hex: h.to_ascii_lowercase() })),
            depends: deps("Depends")?,
            pre_depends: deps("Pre-Depends")?,
            recommends: deps("Recommends")?,
            suggests: deps("Suggests")?,
            provides: deps("Provides")?.into_iter().flat_map(|d| d.alternatives).collect(),
            conflicts: deps("Conflicts")?,
            replaces: deps("Replaces")?,
        })
    }

    pub fn evr(&self) -> &str {
        self.version.as_str()
    }

    /// Does this package satisfy `poss`, by its own name or a provide?
    pub fn satisfies(&self, poss: &Possibility) -> bool {
        if poss.satisfied_by(&self.name, Some(&self.version)) {
            return true;
        }
        self.provides.iter().any(|p| {
            p.name == poss.name && {
                let provided = p.constraint.as_ref().map(|(_, v)| v);
                poss.satisfied_by(&p.name, provided)
            }
        })
    }

    pub fn solve_deps(&self) -> impl Iterator<Item = &Dependency> {
        self.pre_depends.iter().chain(self.depends.iter())
    }
}

impl fmt::Display for Solvable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.version)
    }
}

#[derive(Debug, Clone)]
pub enum Job {
    /// Solve by name or provides.
    Install(String),
    /// Exact solvable: local files and pinned-version installs.
    InstallExact(SolvableId),
    Erase(String),
    UpdateAll,
    /// Prevent any modification of the named package.
    Lock(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Install,
    Erase,
}

/// One transaction step. An `Install` whose `partner` points at an
/// installed solvable is an upgrade or downgrade; the matching `Erase`
/// step carries the reverse link and is skipped by the executor.
#[derive(Debug, Clone)]
pub struct Step {
    pub kind: StepKind,
    pub id: SolvableId,
    pub partner: Option<SolvableId>,
}

#[derive(Debug, Default)]
pub struct Transaction {
    pub steps: Vec<Step>,
}

impl Transaction {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug)]
pub struct Problem {
    pub what: String,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.what)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SolveOptions {
    /// Accept missing dependencies and conflicts, reporting them as
    /// warnings. This is the second force-depends pass.
    pub relaxed: bool,
    pub allow_downgrade: bool,
}

#[derive(Default)]
pub struct Pool {
    solvables: Vec<Solvable>,
    installed_by_name: HashMap<String, SolvableId>,
    arch_list: Vec<String>,
    pins: HashMap<String, String>,
}

impl Pool {
    pub fn new(arch_list: Vec<String>) -> Self {
        Self { arch_list, ..Default::default() }
    }

    /// Smaller is better; `all` ranks after every configured arch, and
    /// an empty arch list accepts everything.
    fn arch_rank(&self, arch: &str) -> Option<usize> {
        if let Some(at) = self.arch_list.iter().position(|a| a == arch) {
            return Some(at);
        }
        if arch == "all" || arch == "noarch" || self.arch_list.is_empty() {
            return Some(usize::MAX);
        }
        None
    }

    /// Add one solvable. Remote solvables for foreign architectures are
    /// dropped; the installed repo is always accepted.
    pub fn add(&mut self, s: Solvable) -> Option<SolvableId> {
        if s.repo != RepoKind::Installed && self.arch_rank(&s.arch).is_none() {
            return None;
        }
        let id = self.solvables.len();
        if s.repo == RepoKind::Installed {
            self.installed_by_name.insert(s.name.clone(), id);
        }
        self.solvables.push(s);
        Some(id)
    }

    /// Pins registered before solving; cleared with the pool.
    pub fn set_pins(&mut self, pins: HashMap<String, String>) {
        self.pins = pins;
    }

    pub fn pinned_version(&self, name: &str) -> Option<&str> {
        self.pins.get(name).map(String::as_str)
    }

    pub fn get(&self, id: SolvableId) -> &Solvable {
        &self.solvables[id]
    }

    pub fn installed(&self, name: &str) -> Option<SolvableId> {
        self.installed_by_name.get(name).copied()
    }

    pub fn installed_ids(&self) -> Vec<SolvableId> {
        let mut ids: Vec<SolvableId> = self.installed_by_name.values().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The installed solvable satisfying `poss`, if any, skipping ids in
    /// `gone` (packages the current plan erases or obsoletes).
    pub fn installed_satisfier(&self, poss: &Possibility, gone: &HashSet<SolvableId>) -> Option<SolvableId> {
        self.installed_ids()
            .into_iter()
            .find(|&id| !gone.contains(&id) && self.solvables[id].satisfies(poss))
    }

    /// Best non-installed candidate for `poss`: pinned version first if
    /// published, then architecture rank, then highest version.
    pub fn best_candidate(&self, poss: &Possibility) -> Option<SolvableId> {
        let mut best: Option<SolvableId> = None;
        let mut best_key: Option<(bool, usize, &Version)> = None;
        for (id, s) in self.solvables.iter().enumerate() {
            if s.repo == RepoKind::Installed || !s.satisfies(poss) {
                continue;
            }
            let pinned = self
                .pins
                .get(&s.name)
                .is_some_and(|want| want == s.version.as_str());
            let rank = match self.arch_rank(&s.arch) {
                Some(r) => r,
                None => continue,
            };
            // pinned wins, then lower arch rank, then higher version
            let better = match best_key {
                None => true,
                Some((bp, br, bv)) => {
                    (pinned, std::cmp::Reverse(rank), &s.version) > (bp, std::cmp::Reverse(br), bv)
                }
            };
            if better {
                best = Some(id);
                best_key = Some((pinned, rank, &s.version));
            }
        }
        best
    }

    /// Exact candidate for a pinned explicit install.
    pub fn exact_candidate(&self, name: &str, version: &str) -> Option<SolvableId> {
        self.solvables.iter().enumerate().find_map(|(id, s)| {
            (s.repo != RepoKind::Installed && s.name == name && s.version.as_str() == version)
                .then_some(id)
        })
    }

    /// All installed solvables providing `name` (including by their own
    /// name); used to clear auto marks for explicitly named packages.
    pub fn installed_providers(&self, name: &str) -> Vec<SolvableId> {
        let poss = Possibility { name: name.to_string(), constraint: None };
        self.installed_ids()
            .into_iter()
            .filter(|&id| self.solvables[id].satisfies(&poss))
            .collect()
    }
}

struct Solve<'p> {
    pool: &'p Pool,
    opts: SolveOptions,
    locked: HashSet<String>,
    planned: HashMap<String, SolvableId>,
    planned_order: Vec<SolvableId>,
    /// installed ids going away: key erased, value optional new partner
    gone: HashMap<SolvableId, Option<SolvableId>>,
    problems: Vec<Problem>,
    warnings: Vec<String>,
}

#[derive(Debug)]
pub struct Resolution {
    pub transaction: Transaction,
    pub warnings: Vec<String>,
}

pub fn solve(pool: &Pool, jobs: &[Job], opts: SolveOptions) -> Result<Resolution, Vec<Problem>> {
    let mut s = Solve {
        pool,
        opts,
        locked: HashSet::new(),
        planned: HashMap::new(),
        planned_order: Vec::new(),
        gone: HashMap::new(),
        problems: Vec::new(),
        warnings: Vec::new(),
    };
    // locks and erasures register up front so job order cannot make one
    // erased package look like it still needs another
    for job in jobs {
        match job {
            Job::Lock(name) => {
                s.locked.insert(name.clone());
            }
            Job::Erase(name) => s.mark_erase(name),
            _ => {}
        }
    }
    for job in jobs {
        match job {
            Job::Lock(_) | Job::Erase(_) => {}
            Job::Install(name) => s.install_by_name(name),
            Job::InstallExact(id) => s.install_exact(*id),
            Job::UpdateAll => s.update_all(),
        }
    }
    s.check_erase_dependents();
    if !s.problems.is_empty() {
        return Err(s.problems);
    }
    let warnings = std::mem::take(&mut s.warnings);
    Ok(Resolution { transaction: s.into_transaction(), warnings })
}

impl<'p> Solve<'p> {
    fn problem(&mut self, what: String) {
        if self.opts.relaxed {
            self.warnings.push(what);
        } else {
            self.problems.push(Problem { what });
        }
    }

    fn gone_set(&self) -> HashSet<SolvableId> {
        self.gone.keys().copied().collect()
    }

    fn install_by_name(&mut self, name: &str) {
        let poss = Possibility { name: name.to_string(), constraint: None };
        let installed = self.pool.installed_satisfier(&poss, &self.gone_set());
        if let Some(inst) = installed {
            let inst_s = self.pool.get(inst);
            if inst_s.name != name {
                // satisfied through provides; nothing to do
                return;
            }
            // explicit install of an installed package follows available
            // upgrades, but never walks past a lock
            if self.locked.contains(name) {
                return;
            }
            if let Some(cand) = self.pool.best_candidate(&poss) {
                if self.pool.get(cand).version > inst_s.version {
                    self.plan_install(cand);
                }
            }
            return;
        }
        match self.pool.best_candidate(&poss) {
            Some(cand) => {
                self.plan_install(cand);
            }
            None => {
                // hard even under force-depends: there is nothing to do
                self.problems.push(Problem { what: format!("cannot find package {name}") });
            }
        }
    }

    fn install_exact(&mut self, id: SolvableId) {
        let cand = self.pool.get(id);
        if let Some(inst) = self.pool.installed(&cand.name) {
            if self.pool.get(inst).version == cand.version {
                return; // already at the requested version
            }
        }
        self.plan_install(id);
    }

    fn mark_erase(&mut self, name: &str) {
        let Some(inst) = self.pool.installed(name) else {
            self.problems.push(Problem { what: format!("package {name} is not installed") });
            return;
        };
        self.gone.entry(inst).or_insert(None);
    }

    /// After all jobs are planned: anything left installed that needed an
    /// erased package, with no surviving or planned satisfier, is a
    /// problem.
    fn check_erase_dependents(&mut self) {
        let gone = self.gone_set();
        let erased: Vec<SolvableId> = gone.iter().copied().collect();
        for dep_id in self.pool.installed_ids() {
            if gone.contains(&dep_id) {
                continue;
            }
            let dependent = self.pool.get(dep_id);
            for dep in dependent.solve_deps() {
                let uses_erased = erased
                    .iter()
                    .any(|&e| dep.alternatives.iter().any(|p| self.pool.get(e).satisfies(p)));
                if uses_erased && !dep.alternatives.iter().any(|p| self.satisfier_remains(p)) {
                    self.problem(format!("{} depends on {dep}", dependent.name));
                }
            }
        }
    }

    fn update_all(&mut self) {
        for inst in self.pool.installed_ids() {
            let inst_s = self.pool.get(inst);
            if self.locked.contains(&inst_s.name) || self.gone.contains_key(&inst) {
                continue;
            }
            let poss = Possibility { name: inst_s.name.clone(), constraint: None };
            if let Some(cand) = self.pool.best_candidate(&poss) {
                let cand_s = self.pool.get(cand);
                if cand_s.name == inst_s.name && cand_s.version > inst_s.version {
                    self.plan_install(cand);
                }
            }
        }
    }

    fn plan_install(&mut self, id: SolvableId) {
        let cand = self.pool.get(id);
        if self.planned.contains_key(&cand.name) {
            return;
        }
        if let Some(inst) = self.pool.installed(&cand.name) {
            let inst_s = self.pool.get(inst);
            if cand.version < inst_s.version && !self.opts.allow_downgrade {
                self.problems.push(Problem {
                    what: format!(
                        "{} would downgrade {} to {}; pass --allow-downgrade to permit it",
                        cand.name, inst_s.version, cand.version
                    ),
                });
                return;
            }
            self.gone.insert(inst, Some(id));
        }
        self.planned.insert(cand.name.clone(), id);
        self.planned_order.push(id);
        self.resolve_deps(id);
        self.check_conflicts(id);
    }

    fn satisfier_remains(&self, poss: &Possibility) -> bool {
        self.planned.values().any(|&id| self.pool.get(id).satisfies(poss))
            || self
                .pool
                .installed_satisfier(poss, &self.gone_set())
                .is_some()
    }

    fn resolve_deps(&mut self, id: SolvableId) {
        let deps: Vec<Dependency> = self.pool.get(id).solve_deps().cloned().collect();
        for dep in deps {
            if dep.alternatives.iter().any(|p| self.satisfier_remains(p)) {
                continue;
            }
            let candidate = dep
                .alternatives
                .iter()
                .find_map(|p| self.pool.best_candidate(p));
            match candidate {
                Some(cand) => self.plan_install(cand),
                None => {
                    let what = format!("{} depends on {dep}", self.pool.get(id).name);
                    self.problem(what);
                }
            }
        }
    }

    fn check_conflicts(&mut self, id: SolvableId) {
        let conflicts: Vec<Dependency> = self.pool.get(id).conflicts.clone();
        let gone = self.gone_set();
        for dep in conflicts {
            for poss in &dep.alternatives {
                if let Some(other) = self.pool.installed_satisfier(poss, &gone) {
                    if self.pool.get(other).name == self.pool.get(id).name {
                        continue;
                    }
                    // conflicts + replaces on an installed package means
                    // this install supersedes it
                    let replaces = self
                        .pool
                        .get(id)
                        .replaces
                        .iter()
                        .flat_map(|d| &d.alternatives)
                        .any(|p| self.pool.get(other).satisfies(p));
                    if replaces {
                        self.gone.insert(other, Some(id));
                    } else if self.opts.relaxed {
                        self.warnings.push(format!(
                            "{} conflicts with installed {}",
                            self.pool.get(id).name,
                            self.pool.get(other).name
                        ));
                    } else {
                        self.problems.push(Problem {
                            what: format!(
                                "{} conflicts with installed {}",
                                self.pool.get(id).name,
                                self.pool.get(other).name
                            ),
                        });
                    }
                }
                let planned_clash = self
                    .planned
                    .values()
                    .find(|&&p| p != id && self.pool.get(p).satisfies(poss))
                    .copied();
                if let Some(other) = planned_clash {
                    self.problem(format!(
                        "{} conflicts with {}",
                        self.pool.get(id).name,
                        self.pool.get(other).name
                    ));
                }
            }
        }
    }

    /// Install steps in dependency order, each same-name upgrade's erase
    /// half right after it, then pure erases with dependents going first.
    /// An obsoletion by a *different* package (replaces + conflicts)
    /// becomes a pure erase ordered after the installs, so the protected
    /// file-set can shield whatever the replacement now owns.
    fn into_transaction(mut self) -> Transaction {
        let mut steps = Vec::new();
        let planned_set: HashSet<SolvableId> = self.planned.values().copied().collect();
        let mut emitted: HashSet<SolvableId> = HashSet::new();
        let order = std::mem::take(&mut self.planned_order);
        for id in &order {
            self.emit_install(*id, &planned_set, &mut emitted, &mut steps, 0);
        }
        // pure erases: dependents before their dependencies
        let mut pure: Vec<SolvableId> = self
            .gone
            .iter()
            .filter(|(&old, new)| match new {
                None => true,
                Some(new_id) => self.pool.get(*new_id).name != self.pool.get(old).name,
            })
            .map(|(&old, _)| old)
            .collect();
        pure.sort_unstable();
        let mut erase_order = Vec::new();
        let mut seen = HashSet::new();
        for &id in &pure {
            self.erase_post_order(id, &pure, &mut seen, &mut erase_order);
        }
        erase_order.reverse();
        for id in erase_order {
            steps.push(Step { kind: StepKind::Erase, id, partner: None });
        }
        Transaction { steps }
    }

    fn emit_install(
        &self,
        id: SolvableId,
        planned: &HashSet<SolvableId>,
        emitted: &mut HashSet<SolvableId>,
        steps: &mut Vec<Step>,
        depth: usize,
    ) {
        if !emitted.insert(id) || depth > 64 {
            return;
        }
        for dep in self.pool.get(id).solve_deps() {
            for poss in &dep.alternatives {
                for &other in planned {
                    if other != id && self.pool.get(other).satisfies(poss) {
                        self.emit_install(other, planned, emitted, steps, depth + 1);
                    }
                }
            }
        }
        // only a same-name replacement is an upgrade pair
        let partner = self
            .gone
            .iter()
            .find(|(&old, new)| {
                **new == Some(id) && self.pool.get(old).name == self.pool.get(id).name
            })
            .map(|(&old, _)| old);
        steps.push(Step { kind: StepKind::Install, id, partner });
        if let Some(old) = partner {
            steps.push(Step { kind: StepKind::Erase, id: old, partner: Some(id) });
        }
    }

    fn erase_post_order(
        &self,
        id: SolvableId,
        pure: &[SolvableId],
        seen: &mut HashSet<SolvableId>,
        out: &mut Vec<SolvableId>,
    ) {
        if !seen.insert(id) {
            return;
        }
        for dep in self.pool.get(id).solve_deps() {
            for poss in &dep.alternatives {
                for &other in pure {
                    if other != id && self.pool.get(other).satisfies(poss) {
                        self.erase_post_order(other, pure, seen, out);
                    }
                }
            }
        }
        out.push(id);
    }
}

/// Breadth-first reachability from every manually installed package over
/// its dependencies. Installed auto packages that nothing manual reaches
/// are the autoremove candidates, in status-file order.
pub fn unreachable_auto(pool: &Pool, auto: &std::collections::BTreeSet<String>) -> Vec<SolvableId> {
    let installed = pool.installed_ids();
    let mut reached: HashSet<SolvableId> = HashSet::new();
    let mut queue: VecDeque<SolvableId> = VecDeque::new();
    for &id in &installed {
        if !auto.contains(&pool.get(id).name) {
            reached.insert(id);
            queue.push_back(id);
        }
    }
    while let Some(id) = queue.pop_front() {
        for dep in pool.get(id).solve_deps() {
            for poss in &dep.alternatives {
                for &cand in &installed {
                    if pool.get(cand).satisfies(poss) && reached.insert(cand) {
                        queue.push_back(cand);
                    }
                }
            }
        }
    }
    installed
        .into_iter()
        .filter(|id| !reached.contains(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::parse_one;

    fn solvable(repo: RepoKind, fields: &str) -> Solvable {
        Solvable::from_paragraph(&parse_one(fields).unwrap(), repo).unwrap()
    }

    fn pool_with(installed: &[&str], available: &[&str]) -> Pool {
        let mut pool = Pool::new(vec![]);
        for text in installed {
            pool.add(solvable(RepoKind::Installed, text));
        }
        for text in available {
            pool.add(solvable(RepoKind::Remote(0), text));
        }
        pool
    }

    fn names(pool: &Pool, tx: &Transaction) -> Vec<String> {
        tx.steps
            .iter()
            .map(|s| {
                let tag = match s.kind {
                    StepKind::Install => "+",
                    StepKind::Erase => "-",
                };
                format!("{tag}{}", pool.get(s.id).name)
            })
            .collect()
    }

    const A1: &str = "Package: a\nVersion: 1.0\nArchitecture: all\nFilename: a_1.0.ipk\n";
    const A2: &str = "Package: a\nVersion: 2.0\nArchitecture: all\nFilename: a_2.0.ipk\n";
    const A2_NEEDS_B: &str =
        "Package: a\nVersion: 2.0\nArchitecture: all\nDepends: b\nFilename: a_2.0.ipk\n";
    const B1: &str = "Package: b\nVersion: 1.0\nArchitecture: all\nFilename: b_1.0.ipk\n";

    #[test]
    fn fresh_install_pulls_dependencies_first() {
        let pool = pool_with(&[], &[A2_NEEDS_B, B1]);
        let jobs = [Job::Install("a".into())];
        let res = solve(&pool, &jobs, SolveOptions::default()).unwrap();
        assert_eq!(names(&pool, &res.transaction), vec!["+b", "+a"]);
    }

    #[test]
    fn missing_dependency_is_a_problem_unless_relaxed() {
        let pool = pool_with(&[], &[A2_NEEDS_B]);
        let jobs = [Job::Install("a".into())];
        let problems = solve(&pool, &jobs, SolveOptions::default()).unwrap_err();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].what.contains("depends on b"));

        let relaxed = SolveOptions { relaxed: true, ..Default::default() };
        let res = solve(&pool, &jobs, relaxed).unwrap();
        assert_eq!(names(&pool, &res.transaction), vec!["+a"]);
        assert_eq!(res.warnings.len(), 1);
    }

    #[test]
    fn installed_package_satisfies_without_action() {
        let pool = pool_with(&[A1], &[A1]);
        let res = solve(&pool, &[Job::Install("a".into())], SolveOptions::default()).unwrap();
        assert!(res.transaction.is_empty());
    }

    #[test]
    fn provided_name_is_a_noop() {
        let py3 = "Package: python3.9\nVersion: 3.9\nArchitecture: all\nProvides: python\n";
        let py = "Package: python\nVersion: 1\nArchitecture: all\nFilename: p.ipk\n";
        let pool = pool_with(&[py3], &[py]);
        let res = solve(&pool, &[Job::Install("python".into())], SolveOptions::default()).unwrap();
        assert!(res.transaction.is_empty());
    }

    #[test]
    fn explicit_install_upgrades_to_newer() {
        let pool = pool_with(&[A1], &[A2]);
        let res = solve(&pool, &[Job::Install("a".into())], SolveOptions::default()).unwrap();
        assert_eq!(names(&pool, &res.transaction), vec!["+a", "-a"]);
        let install = &res.transaction.steps[0];
        let erase = &res.transaction.steps[1];
        assert_eq!(install.partner, Some(erase.id));
        assert_eq!(erase.partner, Some(install.id));
        assert_eq!(pool.get(install.id).evr(), "2.0");
        assert_eq!(pool.get(erase.id).evr(), "1.0");
    }

    #[test]
    fn update_all_respects_locks() {
        let pool = pool_with(&[A1, B1], &[A2]);
        let res = solve(&pool, &[Job::UpdateAll], SolveOptions::default()).unwrap();
        assert_eq!(names(&pool, &res.transaction), vec!["+a", "-a"]);

        let res = solve(
            &pool,
            &[Job::Lock("a".into()), Job::UpdateAll],
            SolveOptions::default(),
        )
        .unwrap();
        assert!(res.transaction.is_empty());
    }

    #[test]
    fn downgrade_needs_permission() {
        let pool = pool_with(&[A2], &[A1]);
        let exact = pool.exact_candidate("a", "1.0").unwrap();
        let problems = solve(&pool, &[Job::InstallExact(exact)], SolveOptions::default()).unwrap_err();
        assert!(problems[0].what.contains("downgrade"));

        let opts = SolveOptions { allow_downgrade: true, ..Default::default() };
        let res = solve(&pool, &[Job::InstallExact(exact)], opts).unwrap();
        assert_eq!(names(&pool, &res.transaction), vec!["+a", "-a"]);
    }

    #[test]
    fn erase_with_dependents_is_refused() {
        let a_needs_b = "Package: a\nVersion: 1.0\nArchitecture: all\nDepends: b\n";
        let pool = pool_with(&[a_needs_b, B1], &[]);
        let problems = solve(&pool, &[Job::Erase("b".into())], SolveOptions::default()).unwrap_err();
        assert!(problems[0].what.contains("a depends on b"));

        // erasing both at once is fine, dependent first
        let res = solve(
            &pool,
            &[Job::Erase("a".into()), Job::Erase("b".into())],
            SolveOptions::default(),
        )
        .unwrap();
        assert_eq!(names(&pool, &res.transaction), vec!["-a", "-b"]);
    }

    #[test]
    fn erase_of_missing_package_is_hard() {
        let pool = pool_with(&[], &[]);
        let problems = solve(&pool, &[Job::Erase("ghost".into())], SolveOptions::default()).unwrap_err();
        assert!(problems[0].what.contains("not installed"));
    }

    #[test]
    fn pinned_version_wins_candidate_selection() {
        let mut pool = pool_with(&[], &[A1, A2]);
        pool.set_pins([("a".to_string(), "1.0".to_string())].into());
        let res = solve(&pool, &[Job::Install("a".into())], SolveOptions::default()).unwrap();
        assert_eq!(res.transaction.steps.len(), 1);
        assert_eq!(pool.get(res.transaction.steps[0].id).evr(), "1.0");
    }

    #[test]
    fn conflicts_block_and_replaces_obsoletes() {
        let c_conf = "Package: c\nVersion: 1.0\nArchitecture: all\nConflicts: a\nFilename: c.ipk\n";
        let pool = pool_with(&[A1], &[c_conf]);
        let problems = solve(&pool, &[Job::Install("c".into())], SolveOptions::default()).unwrap_err();
        assert!(problems[0].what.contains("conflicts"));

        let c_repl =
            "Package: c\nVersion: 1.0\nArchitecture: all\nConflicts: a\nReplaces: a\nFilename: c.ipk\n";
        let pool = pool_with(&[A1], &[c_repl]);
        let res = solve(&pool, &[Job::Install("c".into())], SolveOptions::default()).unwrap();
        assert_eq!(names(&pool, &res.transaction), vec!["+c", "-a"]);
        // a different-name obsoletion runs as a pure erase after the
        // install, under protected-file-set cover
        assert!(res.transaction.steps[1].partner.is_none());
    }

    #[test]
    fn unreachable_auto_finds_orphans() {
        let a_needs_b = "Package: a\nVersion: 1.0\nArchitecture: all\nDepends: b\n";
        let c1 = "Package: c\nVersion: 1.0\nArchitecture: all\n";
        let pool = pool_with(&[a_needs_b, B1, c1], &[]);
        let auto: std::collections::BTreeSet<String> =
            ["b".to_string(), "c".to_string()].into_iter().collect();
        let orphans = unreachable_auto(&pool, &auto);
        assert_eq!(orphans.len(), 1);
        assert_eq!(pool.get(orphans[0]).name, "c");
    }

    #[test]
    fn versioned_provides() {
        let prov = "Package: impl\nVersion: 5\nArchitecture: all\nProvides: api (= 2.0)\nFilename: impl.ipk\n";
        let api_user =
            "Package: user\nVersion: 1\nArchitecture: all\nDepends: api (>= 1.5)\nFilename: u.ipk\n";
        let pool = pool_with(&[], &[prov, api_user]);
        let res = solve(&pool, &[Job::Install("user".into())], SolveOptions::default()).unwrap();
        assert_eq!(names(&pool, &res.transaction), vec!["+impl", "+user"]);
    }
}
