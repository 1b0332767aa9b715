#![allow(clippy::redundant_closure_for_method_calls)]

use aept::conffile::{NonInteractive, PromptChoice, Prompter};
use aept::config::Config;
use aept::error::{AResult, AeptError};
use aept::fetch::{StdFetcher, UsignVerifier};
use aept::listener::{Listener, NoOpListener, StdErrListener};
use aept::status::StatusDb;
use aept::transaction::{Ctx, TransactionOpts};
use aept::{index, lock, query, signals, transaction};
use std::env;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const DEFAULT_CONF: &str = "/etc/aept/aept.conf";

fn main() -> ExitCode {
    // debug lines carry file:line
    env_logger::Builder::from_default_env()
        .format_file(true)
        .format_line_number(true)
        .init();

    let args: Vec<String> = env::args().collect();

    let mut cli_opts = getopts::Options::new();
    cli_opts.optopt("f", "conf", "Use this configuration file", "path");
    cli_opts.optopt("o", "offline-root", "Operate on a root directory instead of /", "dir");
    cli_opts.optflag("", "force-depends", "Ignore unresolved dependencies and conflicts");
    cli_opts.optflag("", "noaction", "Resolve and print the plan, change nothing");
    cli_opts.optflag("", "download-only", "Fetch packages into the cache and stop");
    cli_opts.optflag("", "allow-downgrade", "Permit replacing a package with an older version");
    cli_opts.optflag("", "reinstall", "Reinstall named packages even if up to date");
    cli_opts.optflag("", "no-cache", "Fetch each package just in time and discard it");
    cli_opts.optflag("", "purge", "Also remove modified conffiles and pins");
    cli_opts.optflag("", "force-confnew", "Always install new conffile versions");
    cli_opts.optflag("", "force-confold", "Always keep existing conffile versions");
    cli_opts.optflag("", "non-interactive", "Never prompt; take every default");
    cli_opts.optflag("", "autoremove", "After a remove, drop no-longer-needed dependencies");
    cli_opts.optflag("", "available", "With list: show packages from the indices");
    cli_opts.optflag("q", "quiet", "Don't print warnings");
    cli_opts.optflag("v", "verbose", "Print progress");
    cli_opts.optflag("", "version", "Show the aept version");
    cli_opts.optflag("h", "help", "Print this help menu");

    let matches = match cli_opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(err) => {
            eprintln!("aept: error: {err}. See --help for details.");
            return ExitCode::FAILURE;
        }
    };
    if matches.opt_present("version") {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }
    if matches.opt_present("h") || matches.free.is_empty() {
        print!("{}", cli_opts.usage(USAGE_BRIEF));
        return if matches.opt_present("h") { ExitCode::SUCCESS } else { ExitCode::FAILURE };
    }

    match run(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            print_error(&err);
            ExitCode::FAILURE
        }
    }
}

const USAGE_BRIEF: &str = "\
Usage: aept [options] <command> [arguments]

Commands:
    update                      Fetch the package indices of every source
    install <pkg|file>...       Install packages by name or local file
    remove <pkg>...             Remove installed packages
    upgrade                     Upgrade every installed package
    autoremove                  Remove dependencies nothing needs anymore
    mark <manual|auto> <pkg>... Change the auto-installed marking
    pin <pkg> [version]         Hold a package at a version
    unpin <pkg>                 Drop a hold
    show <pkg>                  Print a package's control stanza
    list [pattern]              List installed packages
    files <pkg>                 List the files a package installed
    owns <path>                 Find the package owning a path
    print-architecture          Show the configured architectures
    clean                       Empty the package cache";

#[allow(deprecated)]
fn err_cause(err: &dyn std::error::Error, max: usize) {
    if let Some(reason) = err.cause() {
        eprintln!("  because: {reason}");
        if max > 0 {
            err_cause(reason, max - 1);
        }
    }
}

fn print_error(err: &dyn std::error::Error) {
    eprintln!("aept: error: {err}");
    err_cause(err, 3);
}

fn run(matches: &getopts::Matches) -> AResult<()> {
    let quiet = matches.opt_present("quiet");
    let verbose = matches.opt_present("verbose")
        || env::var_os("RUST_LOG").is_some_and(|v| v == "debug");

    // Listener conditionally prints warnings
    let listener_tmp1;
    let listener_tmp2;
    let listener: &dyn Listener = if quiet {
        listener_tmp1 = NoOpListener;
        &listener_tmp1
    } else {
        listener_tmp2 = StdErrListener { verbose, quiet };
        &listener_tmp2
    };

    let mut cfg = match matches.opt_str("conf") {
        Some(path) => Config::load(Path::new(&path), listener)?,
        None if Path::new(DEFAULT_CONF).exists() => Config::load(Path::new(DEFAULT_CONF), listener)?,
        None => Config::default(),
    };
    if let Some(root) = matches.opt_str("offline-root") {
        cfg.offline_root = Some(PathBuf::from(root));
    }
    cfg.apply_offline_root();

    let opts = TransactionOpts {
        force_depends: matches.opt_present("force-depends"),
        noaction: matches.opt_present("noaction"),
        download_only: matches.opt_present("download-only"),
        allow_downgrade: matches.opt_present("allow-downgrade"),
        reinstall: matches.opt_present("reinstall"),
        no_cache: matches.opt_present("no-cache"),
        purge: matches.opt_present("purge"),
        force_confnew: matches.opt_present("force-confnew"),
        force_confold: matches.opt_present("force-confold"),
        interactive: !matches.opt_present("non-interactive"),
    };

    let fetcher = StdFetcher { timeout: cfg.http_timeout };
    let verifier = UsignVerifier { keydir: cfg.usign_keydir.clone() };
    let prompter_tmp1;
    let prompter_tmp2;
    let prompter: &dyn Prompter = if opts.interactive {
        prompter_tmp1 = CliPrompter;
        &prompter_tmp1
    } else {
        prompter_tmp2 = NonInteractive;
        &prompter_tmp2
    };
    let ctx = Ctx {
        cfg: &cfg,
        listener,
        fetcher: &fetcher,
        verifier: &verifier,
        prompter,
        interrupted: signals::install_handlers(),
    };

    let command = matches.free[0].as_str();
    let args = &matches.free[1..];
    match command {
        "update" => index::update(&cfg, listener, &fetcher, &verifier),
        "install" => {
            let (names, locals) = split_install_args(args);
            if names.is_empty() && locals.is_empty() {
                return Err(AeptError::Str("install needs at least one package"));
            }
            transaction::install(&ctx, &names, &locals, &opts)
        }
        "remove" => {
            if args.is_empty() {
                return Err(AeptError::Str("remove needs at least one package"));
            }
            transaction::remove(&ctx, args, &opts)?;
            if matches.opt_present("autoremove") {
                transaction::autoremove(&ctx, &opts)?;
            }
            Ok(())
        }
        "upgrade" => transaction::upgrade_all(&ctx, &opts),
        "autoremove" => transaction::autoremove(&ctx, &opts),
        "mark" => mark(&cfg, args),
        "pin" => pin(&cfg, args),
        "unpin" => unpin(&cfg, args),
        "show" => query::show(&cfg, one_arg(args, "show needs a package name")?),
        "list" => query::list(&cfg, args.first().map(String::as_str), matches.opt_present("available")),
        "files" => query::files(&cfg, one_arg(args, "files needs a package name")?),
        "owns" => query::owns(&cfg, one_arg(args, "owns needs a path")?),
        "print-architecture" => {
            query::print_architecture(&cfg);
            Ok(())
        }
        "clean" => transaction::clean(&cfg, listener),
        other => Err(AeptError::Context(
            format!("unknown command '{other}'"),
            Box::new(AeptError::Str("see --help for the command list")),
        )),
    }
}

fn one_arg<'a>(args: &'a [String], msg: &'static str) -> AResult<&'a str> {
    args.first().map(String::as_str).ok_or(AeptError::Str(msg))
}

/// Arguments that name an existing file are local packages; the rest are
/// names to solve. The package reader keys on magic bytes, so any
/// extension works.
fn split_install_args(args: &[String]) -> (Vec<String>, Vec<PathBuf>) {
    let mut names = Vec::new();
    let mut locals = Vec::new();
    for arg in args {
        let path = Path::new(arg);
        if path.exists() && (arg.contains('/') || arg.contains('.')) {
            locals.push(path.to_path_buf());
        } else {
            names.push(arg.clone());
        }
    }
    (names, locals)
}

fn mark(cfg: &Config, args: &[String]) -> AResult<()> {
    let Some((which, names)) = args.split_first() else {
        return Err(AeptError::Str("mark needs 'manual' or 'auto' and package names"));
    };
    let _lock = lock::acquire(&cfg.lock_file)?;
    let db = StatusDb::from_config(cfg);
    for name in names {
        if db.installed_version(name)?.is_none() {
            return Err(AeptError::NotInstalled(name.clone()));
        }
        match which.as_str() {
            "manual" => db.unmark_auto(name)?,
            "auto" => db.mark_auto(name)?,
            _ => return Err(AeptError::Str("mark needs 'manual' or 'auto'")),
        }
    }
    Ok(())
}

fn pin(cfg: &Config, args: &[String]) -> AResult<()> {
    let name = one_arg(args, "pin needs a package name")?;
    let _lock = lock::acquire(&cfg.lock_file)?;
    let db = StatusDb::from_config(cfg);
    let version = match args.get(1) {
        Some(version) => version.clone(),
        None => db
            .installed_version(name)?
            .ok_or_else(|| AeptError::NotInstalled(name.to_string()))?
            .as_str()
            .to_string(),
    };
    db.pin_add(name, &version)
}

fn unpin(cfg: &Config, args: &[String]) -> AResult<()> {
    let name = one_arg(args, "unpin needs a package name")?;
    let _lock = lock::acquire(&cfg.lock_file)?;
    StatusDb::from_config(cfg).pin_remove(name)
}

/// The stdin/stderr prompter of the interactive CLI.
struct CliPrompter;

impl Prompter for CliPrompter {
    fn conffile_choice(&self, path: &Path, old_version: &str, new_version: &str) -> PromptChoice {
        eprintln!(
            "Configuration file {} (installed by {old_version}, {new_version} ships a new version)",
            path.display()
        );
        eprintln!("    Y : install the new version");
        eprintln!("    N : keep your currently installed version");
        eprintln!("    D : show the differences");
        eprintln!("    Z : start a shell to examine the situation");
        eprint!("Keep your version unless you answer otherwise [N/y/d/z]? ");
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line).is_err() {
            return PromptChoice::Default;
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "i" => PromptChoice::InstallNew,
            "n" | "o" => PromptChoice::KeepOld,
            "d" => PromptChoice::Diff,
            "z" | "s" => PromptChoice::Shell,
            _ => PromptChoice::Default,
        }
    }

    fn confirm(&self, question: &str) -> bool {
        eprint!("{question} [Y/n] ");
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        !matches!(line.trim().to_ascii_lowercase().as_str(), "n" | "no")
    }
}
