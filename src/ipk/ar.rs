//! The outer `ar` container of a package file and the decompression of
//! its inner tarballs. Which filter applies is decided by trial opens of
//! the canonical member names, not by the file extension; `.ipk`,
//! `.deb` and friends are all the same thing to this reader.

use crate::error::{AResult, AeptError};
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

const RETRIES: u32 = 3;

/// Inner member names in the order they are tried.
const DATA_MEMBERS: &[&str] = &[
    "data.tar.gz",
    "data.tar.xz",
    "data.tar.bz2",
    "data.tar.lz4",
    "data.tar.zst",
    "data.tar",
];
const CONTROL_MEMBERS: &[&str] = &[
    "control.tar.gz",
    "control.tar.xz",
    "control.tar.bz2",
    "control.tar.lz4",
    "control.tar.zst",
    "control.tar",
];

/// A package file on disk. Opening is cheap; each tarball access re-reads
/// the outer archive, since both `ar` and tar are forward-only streams.
pub struct PkgArchive {
    path: PathBuf,
}

impl PkgArchive {
    pub fn open(path: &Path) -> AResult<Self> {
        // surface unreadable or truncated files before any step starts
        let mut magic = [0u8; 8];
        let mut file = File::open(path)
            .map_err(|e| AeptError::IoFile("cannot open package", e, path.to_path_buf()))?;
        file.read_exact(&mut magic)
            .map_err(|e| AeptError::IoFile("cannot read package", e, path.to_path_buf()))?;
        if &magic != b"!<arch>\n" {
            return Err(AeptError::MalformedControl(format!(
                "{} is not an ar archive",
                path.display()
            )));
        }
        Ok(Self { path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Streaming reader over the decompressed data tarball.
    pub fn data_tar(&self) -> AResult<tar::Archive<Decoder>> {
        self.member_tar(DATA_MEMBERS, "data.tar")
    }

    /// Streaming reader over the decompressed control tarball.
    pub fn control_tar(&self) -> AResult<tar::Archive<Decoder>> {
        self.member_tar(CONTROL_MEMBERS, "control.tar")
    }

    fn member_tar(&self, candidates: &[&'static str], what: &'static str) -> AResult<tar::Archive<Decoder>> {
        for name in candidates {
            match self.member_bytes(name)? {
                Some(raw) => {
                    let decoder = Decoder::for_member(name, raw)?;
                    return Ok(tar::Archive::new(decoder));
                }
                None => continue,
            }
        }
        Err(AeptError::MemberNotFound(what, self.path.clone()))
    }

    /// The raw (still compressed) bytes of one outer member, or `None`
    /// if the archive has no member of that name. Transient read errors
    /// are retried a few times before giving up.
    fn member_bytes(&self, name: &str) -> AResult<Option<Vec<u8>>> {
        let mut attempt = 0;
        loop {
            match self.member_bytes_once(name) {
                Ok(found) => return Ok(found),
                Err(e) if attempt + 1 < RETRIES && is_transient(&e) => {
                    attempt += 1;
                    log::debug!("retrying read of {} ({e})", self.path.display());
                }
                Err(e) => {
                    return Err(AeptError::IoFile("cannot read package member", e, self.path.clone()))
                }
            }
        }
    }

    fn member_bytes_once(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let mut outer = ar::Archive::new(File::open(&self.path)?);
        while let Some(entry) = outer.next_entry() {
            let mut entry = entry?;
            if entry.header().identifier() == name.as_bytes() {
                let mut raw = Vec::with_capacity(entry.header().size() as usize);
                entry.read_to_end(&mut raw)?;
                return Ok(Some(raw));
            }
        }
        Ok(None)
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock)
}

/// Tagged decompressor over an in-memory member. gzip support is
/// unconditional; the rest mirror the compile-time feature set.
pub enum Decoder {
    Plain(Cursor<Vec<u8>>),
    Gz(flate2::read::GzDecoder<Cursor<Vec<u8>>>),
    #[cfg(feature = "lzma")]
    Xz(xz2::read::XzDecoder<Cursor<Vec<u8>>>),
    #[cfg(feature = "bzip2")]
    Bz2(bzip2::read::BzDecoder<Cursor<Vec<u8>>>),
    #[cfg(feature = "lz4")]
    Lz4(lz4_flex::frame::FrameDecoder<Cursor<Vec<u8>>>),
    #[cfg(feature = "zstd")]
    Zstd(zstd::stream::read::Decoder<'static, io::BufReader<Cursor<Vec<u8>>>>),
}

impl Decoder {
    fn for_member(name: &str, raw: Vec<u8>) -> AResult<Self> {
        let cursor = Cursor::new(raw);
        Ok(match name.rsplit('.').next().unwrap_or("") {
            "tar" => Self::Plain(cursor),
            "gz" => Self::Gz(flate2::read::GzDecoder::new(cursor)),
            #[cfg(feature = "lzma")]
            "xz" => Self::Xz(xz2::read::XzDecoder::new(cursor)),
            #[cfg(feature = "bzip2")]
            "bz2" => Self::Bz2(bzip2::read::BzDecoder::new(cursor)),
            #[cfg(feature = "lz4")]
            "lz4" => Self::Lz4(lz4_flex::frame::FrameDecoder::new(cursor)),
            #[cfg(feature = "zstd")]
            "zst" => Self::Zstd(
                zstd::stream::read::Decoder::new(cursor)
                    .map_err(|e| AeptError::IoFile("zstd init", e, name.into()))?,
            ),
            _ => return Err(AeptError::UnsupportedCompression(name.to_string())),
        })
    }
}

impl Read for Decoder {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(r) => r.read(buf),
            Self::Gz(r) => r.read(buf),
            #[cfg(feature = "lzma")]
            Self::Xz(r) => r.read(buf),
            #[cfg(feature = "bzip2")]
            Self::Bz2(r) => r.read(buf),
            #[cfg(feature = "lz4")]
            Self::Lz4(r) => r.read(buf),
            #[cfg(feature = "zstd")]
            Self::Zstd(r) => r.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn gz(data: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn tiny_tar(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *content).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn write_pkg(members: &[(&str, &[u8])]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut builder = ar::Builder::new(file.reopen().unwrap());
        for (name, data) in members {
            let header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
            builder.append(&header, *data).unwrap();
        }
        file
    }

    #[test]
    fn finds_gz_data_member() {
        let data = tiny_tar(&[("./usr/bin/x", b"bin")]);
        let pkg = write_pkg(&[
            ("debian-binary", b"2.0\n"),
            ("control.tar.gz", &gz(&tiny_tar(&[("./control", b"Package: x\n")]))),
            ("data.tar.gz", &gz(&data)),
        ]);
        let archive = PkgArchive::open(pkg.path()).unwrap();
        let mut tar = archive.data_tar().unwrap();
        let names: Vec<String> = tar
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        assert_eq!(names, vec!["usr/bin/x"]);
    }

    #[test]
    fn plain_tar_member_works_too() {
        let pkg = write_pkg(&[
            ("debian-binary", b"2.0\n"),
            ("data.tar", &tiny_tar(&[("./etc/a", b"a")])),
        ]);
        let archive = PkgArchive::open(pkg.path()).unwrap();
        assert!(archive.data_tar().is_ok());
        assert!(matches!(archive.control_tar(), Err(AeptError::MemberNotFound(..))));
    }

    #[test]
    fn rejects_non_ar_files() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"definitely not an archive").unwrap();
        assert!(PkgArchive::open(f.path()).is_err());
    }
}
