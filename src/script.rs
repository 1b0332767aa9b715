//! Maintainer-script execution with the Debian calling convention.

use crate::config::Config;
use crate::error::{AResult, AeptError};
use crate::listener::Listener;
use crate::sandbox;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

/// Run one maintainer script as `/bin/sh <path> <args…>` inside the
/// configured root. A missing script is success; a non-zero exit is
/// `ScriptFailed` and the caller classifies it (preinst/prerm abort,
/// postinst demotes, postrm warns).
pub fn run(
    cfg: &Config,
    listener: &dyn Listener,
    pkg: &str,
    script: &'static str,
    path: &Path,
    args: &[&str],
) -> AResult<()> {
    if !path.exists() {
        return Ok(());
    }
    listener.progress("running", format!("{pkg} {script} {}", args.join(" ")));
    let mut cmd = Command::new("/bin/sh");
    cmd.arg(sandbox::in_root_path(cfg, path))
        .args(args)
        .stdin(Stdio::null());
    sandbox::confine(cfg, &mut cmd);
    let status = match cmd.status() {
        Ok(status) => status,
        Err(e) => {
            // pre-exec setup errors surface here rather than as a real
            // child exit; report them with the reserved code
            log::debug!("{pkg} {script}: spawn failed: {e}");
            ExitStatus::from_raw(sandbox::EXIT_SETUP_FAILED << 8)
        }
    };
    if status.success() {
        Ok(())
    } else {
        Err(AeptError::ScriptFailed(script, pkg.to_string(), status))
    }
}
