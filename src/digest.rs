use crate::error::{AResult, AeptError};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;

/// Hex MD5 of a file's contents. MD5 is only used for conffile identity,
/// never for transport integrity.
pub fn md5_file(path: &Path) -> io::Result<String> {
    let data = std::fs::read(path)?;
    Ok(format!("{:x}", md5::compute(data)))
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// A checksum as published by a repository index: an algorithm tag and a
/// lowercase hex digest. A bare hex string is taken as SHA256.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algo: String,
    pub hex: String,
}

impl Checksum {
    pub fn parse(text: &str) -> Self {
        match text.split_once(':') {
            Some((algo, hex)) => Self {
                algo: algo.to_ascii_lowercase(),
                hex: hex.to_ascii_lowercase(),
            },
            None => Self {
                algo: "sha256".into(),
                hex: text.to_ascii_lowercase(),
            },
        }
    }

    /// Errors with `UnknownChecksum` for algorithms this build cannot
    /// compute; a mismatch is `ChecksumMismatch`.
    pub fn verify(&self, path: &Path) -> AResult<()> {
        let got = match self.algo.as_str() {
            "sha256" => sha256_file(path)?,
            "md5" | "md5sum" => md5_file(path)?,
            other => return Err(AeptError::UnknownChecksum(other.to_string())),
        };
        if got == self.hex {
            Ok(())
        } else {
            Err(AeptError::ChecksumMismatch(path.to_path_buf(), self.hex.clone(), got))
        }
    }
}
