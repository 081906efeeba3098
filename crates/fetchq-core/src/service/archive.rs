//! Packaging finished downloads into zip or tar.gz archives.

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::types::ArchiveFormat;
use crate::transfer::temp_path;

/// One file to pack: where it is, and its name inside the archive.
#[derive(Debug, Clone)]
pub(crate) struct ArchiveEntry {
    pub source: PathBuf,
    pub name: String,
}

/// Write `entries` to `archive` (via a `.part` file renamed on success) and
/// return the archive size in bytes. Blocking.
pub(crate) fn write_archive(archive: &Path, format: ArchiveFormat, entries: &[ArchiveEntry]) -> Result<u64> {
    if let Some(parent) = archive.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let part = temp_path(archive);
    let written = File::create(&part)
        .with_context(|| format!("create {}", part.display()))
        .and_then(|file| match format {
            ArchiveFormat::Zip => write_zip(file, entries),
            ArchiveFormat::TarGz => write_tar_gz(file, entries),
        })
        .and_then(|file| file.sync_all().context("sync archive"))
        .and_then(|()| {
            std::fs::rename(&part, archive).with_context(|| format!("rename to {}", archive.display()))
        });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&part);
        return Err(e);
    }
    Ok(std::fs::metadata(archive)?.len())
}

fn write_zip(file: File, entries: &[ArchiveEntry]) -> Result<File> {
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .large_file(true);
    for entry in entries {
        let mut src = File::open(&entry.source)
            .with_context(|| format!("open {}", entry.source.display()))?;
        zip.start_file(entry.name.as_str(), options)
            .with_context(|| format!("zip entry {}", entry.name))?;
        io::copy(&mut src, &mut zip).with_context(|| format!("write zip entry {}", entry.name))?;
    }
    zip.finish().context("finish zip")
}

fn write_tar_gz(file: File, entries: &[ArchiveEntry]) -> Result<File> {
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for entry in entries {
        builder.append_path_with_name(&entry.source, &entry.name)
            .with_context(|| format!("tar entry {}", entry.name))?;
    }
    let mut writer = builder
        .into_inner()
        .context("finish tar")?
        .finish()
        .context("finish gzip")?;
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flush archive: {}", e.error()))
}
