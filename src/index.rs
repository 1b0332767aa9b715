//! Fetching repository indices into `lists_dir`. Each source is
//! independent: one bad feed marks the update failed but the rest still
//! land, atomically, under their source names.

use crate::config::{Config, Source};
use crate::error::{AResult, AeptError};
use crate::fetch::{Fetcher, SigVerifier};
use crate::listener::Listener;
use std::fs;
use std::io::{Read, Write};

pub fn update(
    cfg: &Config,
    listener: &dyn Listener,
    fetcher: &dyn Fetcher,
    verifier: &dyn SigVerifier,
) -> AResult<()> {
    fs::create_dir_all(&cfg.lists_dir)?;
    let mut failed = 0;
    for source in &cfg.sources {
        match update_source(cfg, listener, fetcher, verifier, source) {
            Ok(()) => listener.progress("updated", source.name.clone()),
            Err(e) => {
                listener.warning(format!("source {}: {e}", source.name));
                failed += 1;
            }
        }
    }
    if failed > 0 {
        Err(AeptError::UpdateFailed(failed, cfg.sources.len()))
    } else {
        Ok(())
    }
}

fn update_source(
    cfg: &Config,
    _listener: &dyn Listener,
    fetcher: &dyn Fetcher,
    verifier: &dyn SigVerifier,
    source: &Source,
) -> AResult<()> {
    let index_name = if source.gzip { "Packages.gz" } else { "Packages" };
    let url = format!("{}/{index_name}", source.url);

    // temp files in lists_dir so a failure leaves nothing behind and the
    // final rename cannot cross filesystems
    let mut download = tempfile::NamedTempFile::new_in(&cfg.lists_dir)?;
    fetcher.fetch(&url, download.path())?;

    let plain = if source.gzip {
        let mut decompressed = tempfile::NamedTempFile::new_in(&cfg.lists_dir)?;
        let mut decoder = flate2::read::GzDecoder::new(fs::File::open(download.path())?);
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = decoder
                .read(&mut buf)
                .map_err(|e| AeptError::DownloadFailed(url.clone(), format!("bad gzip: {e}")))?;
            if n == 0 {
                break;
            }
            decompressed.write_all(&buf[..n])?;
        }
        decompressed
    } else {
        download.flush()?;
        download
    };

    if cfg.check_signature {
        let sig_url = format!("{}/Packages.sig", source.url);
        let sig = tempfile::NamedTempFile::new_in(&cfg.lists_dir)?;
        fetcher.fetch(&sig_url, sig.path())?;
        verifier.verify(plain.path(), sig.path())?;
    }

    let dest = cfg.lists_dir.join(&source.name);
    plain
        .persist(&dest)
        .map_err(|e| AeptError::IoFile("cannot install package list", e.error, dest.clone()))?;
    Ok(())
}
