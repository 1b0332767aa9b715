//! The download and signature collaborators. Both are traits so tests
//! and embedders can swap them; the defaults cover local paths
//! themselves and delegate the rest to the usual external tools.

use crate::error::{AResult, AeptError};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub trait Fetcher {
    fn fetch(&self, url: &str, dest: &Path) -> AResult<()>;
}

pub trait SigVerifier {
    fn verify(&self, file: &Path, sig: &Path) -> AResult<()>;
}

/// Copies `file://` URLs and bare paths directly; anything with a real
/// scheme goes through `curl`.
pub struct StdFetcher {
    pub timeout: u64,
}

impl Fetcher for StdFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> AResult<()> {
        if let Some(path) = local_path(url) {
            fs::copy(&path, dest).map_err(|e| {
                AeptError::DownloadFailed(url.to_string(), e.to_string())
            })?;
            return Ok(());
        }
        let status = Command::new("curl")
            .arg("-fsSL")
            .arg("--max-time")
            .arg(self.timeout.to_string())
            .arg("-o")
            .arg(dest)
            .arg(url)
            .status()
            .map_err(|e| AeptError::CommandFailed(e, "curl".into()))?;
        if status.success() {
            Ok(())
        } else {
            Err(AeptError::DownloadFailed(url.to_string(), format!("curl exited with {status}")))
        }
    }
}

fn local_path(url: &str) -> Option<PathBuf> {
    if let Some(rest) = url.strip_prefix("file://") {
        return Some(PathBuf::from(rest));
    }
    if url.starts_with('/') || url.starts_with("./") {
        return Some(PathBuf::from(url));
    }
    None
}

/// Checks a detached usign signature against the trusted key directory.
/// The key directory is resolved on the host, never under the offline
/// root.
pub struct UsignVerifier {
    pub keydir: PathBuf,
}

impl SigVerifier for UsignVerifier {
    fn verify(&self, file: &Path, sig: &Path) -> AResult<()> {
        let status = Command::new("usign")
            .arg("-V")
            .arg("-q")
            .arg("-P")
            .arg(&self.keydir)
            .arg("-x")
            .arg(sig)
            .arg("-m")
            .arg(file)
            .status()
            .map_err(|e| AeptError::CommandFailed(e, "usign".into()))?;
        if status.success() {
            Ok(())
        } else {
            Err(AeptError::SignatureFailed(file.to_path_buf()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_urls_are_copied() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("Packages");
        fs::write(&src, b"Package: x\n").unwrap();
        let dest = dir.path().join("out");

        let fetcher = StdFetcher { timeout: 5 };
        fetcher.fetch(&format!("file://{}", src.display()), &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"Package: x\n");

        fetcher.fetch(&src.display().to_string(), &dest).unwrap();
    }

    #[test]
    fn missing_local_file_reports_download_failure() {
        let fetcher = StdFetcher { timeout: 5 };
        let err = fetcher.fetch("file:///no/such/index", Path::new("/tmp/aept-test-out"));
        assert!(matches!(err, Err(AeptError::DownloadFailed(..))));
    }
}
