use quick_error::quick_error;
use std::borrow::Cow;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::{fmt, io};

quick_error! {
    #[derive(Debug)]
    #[non_exhaustive]
    pub enum AeptError {
        Io(err: io::Error) {
            from()
            display("I/O error: {}", err)
            source(err)
        }
        IoFile(msg: &'static str, err: io::Error, file: PathBuf) {
            display("{msg}: {}", file.display())
            source(err)
        }
        Str(msg: &'static str) {
            display("{msg}")
            from()
        }
        UnsafeName(name: String) {
            display("'{name}' is not a valid package or source name")
        }
        UnsafePath(path: String) {
            display("archive entry '{path}' escapes the install root")
        }
        InvalidVersion(msg: &'static str, ver: String) {
            display("version '{ver}' is invalid: {msg}")
        }
        MalformedControl(msg: String) {
            display("malformed control data: {msg}")
        }
        MemberNotFound(member: &'static str, file: PathBuf) {
            display("no {member} member found in {}", file.display())
        }
        UnsupportedCompression(member: String) {
            display("member '{member}' uses a compression this build does not support")
        }
        ResolveFailed(problems: Vec<String>) {
            display("cannot resolve dependencies:\n{}", problems.join("\n"))
        }
        DownloadFailed(url: String, reason: String) {
            display("download of {url} failed: {reason}")
        }
        ChecksumMismatch(file: PathBuf, expected: String, got: String) {
            display("checksum mismatch for {}: expected {expected}, got {got}", file.display())
        }
        UnknownChecksum(algo: String) {
            display("unknown checksum algorithm '{algo}'")
        }
        SignatureFailed(file: PathBuf) {
            display("signature verification failed for {}", file.display())
        }
        CommandFailed(err: io::Error, cmd: Cow<'static, str>) {
            display("command `{cmd}` failed to launch")
            source(err)
        }
        ScriptFailed(script: &'static str, pkg: String, status: ExitStatus) {
            display("{script} script of package {pkg} failed with {status}")
        }
        NotInstalled(name: String) {
            display("package {name} is not installed")
        }
        LockHeld(file: PathBuf) {
            display("could not lock {}: another aept instance is running", file.display())
        }
        Interrupted {
            display("interrupted")
        }
        UpdateFailed(failed: usize, total: usize) {
            display("failed to update {failed} out of {total} package lists")
        }
        Context(msg: String, err: Box<AeptError>) {
            display("{msg}")
            source(err)
        }
    }
}

impl AeptError {
    pub(crate) fn context(self, msg: impl fmt::Display) -> Self {
        Self::Context(msg.to_string(), Box::new(self))
    }
}

impl From<fmt::Error> for AeptError {
    fn from(_: fmt::Error) -> Self {
        Self::Str("fmt")
    }
}

pub type AResult<T> = Result<T, AeptError>;
