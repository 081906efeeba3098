//! Streaming file sink for one transfer attempt.
//!
//! Bytes go to `<destination>.part` and through a SHA-256 hasher as they
//! arrive; `finish` syncs and atomically renames to the destination. A sink
//! dropped without `finish` removes its `.part` file, so failed attempts never
//! leave corrupt artifacts behind.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::checksum::ChecksumHasher;

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `scene.tif` → `scene.tif.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// What a finished sink delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub filepath: PathBuf,
    pub size: u64,
    pub checksum: String,
}

pub struct FileSink {
    writer: Option<BufWriter<File>>,
    hasher: ChecksumHasher,
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl FileSink {
    /// Create (truncating) the `.part` file for `final_path`, creating parent dirs.
    pub fn create(final_path: &Path) -> io::Result<Self> {
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = temp_path(final_path);
        let file = File::create(&temp_path)?;
        Ok(Self {
            writer: Some(BufWriter::new(file)),
            hasher: ChecksumHasher::new(),
            temp_path,
            final_path: final_path.to_path_buf(),
        })
    }

    /// Append a chunk of the response body.
    pub fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "sink already closed"))?;
        writer.write_all(data)?;
        self.hasher.update(data);
        Ok(())
    }

    /// Bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.hasher.bytes()
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Flush, fsync and rename the `.part` file onto the destination.
    pub fn finish(mut self) -> io::Result<Delivered> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "sink already closed"))?;
        let committed = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .and_then(|file| file.sync_all())
            .and_then(|()| std::fs::rename(&self.temp_path, &self.final_path));
        if let Err(e) = committed {
            let _ = std::fs::remove_file(&self.temp_path);
            return Err(e);
        }
        let (size, checksum) = std::mem::take(&mut self.hasher).finish();
        Ok(Delivered {
            filepath: self.final_path.clone(),
            size,
            checksum,
        })
    }

    /// Close and remove the `.part` file.
    pub fn discard(mut self) {
        self.remove_partial();
    }

    fn remove_partial(&mut self) {
        if self.writer.take().is_none() {
            return;
        }
        match std::fs::remove_file(&self.temp_path) {
            Ok(()) => tracing::debug!(path = %self.temp_path.display(), "removed partial file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.temp_path.display(), "could not remove partial file: {}", e),
        }
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        self.remove_partial();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_path_appends_part() {
        let p = temp_path(Path::new("scene.tif"));
        assert_eq!(p.to_string_lossy(), "scene.tif.part");
        let p2 = temp_path(Path::new("/tmp/archive.zip"));
        assert_eq!(p2.to_string_lossy(), "/tmp/archive.zip.part");
    }

    #[test]
    fn finish_renames_and_reports_digest() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("nested").join("out.bin");
        let mut sink = FileSink::create(&final_path).unwrap();
        assert!(sink.temp_path().exists());
        sink.write_chunk(b"hel").unwrap();
        sink.write_chunk(b"lo\n").unwrap();
        assert_eq!(sink.bytes_written(), 6);
        let delivered = sink.finish().unwrap();

        assert_eq!(delivered.size, 6);
        assert_eq!(
            delivered.checksum,
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
        assert!(!temp_path(&final_path).exists());
        assert_eq!(std::fs::read(&final_path).unwrap(), b"hello\n");
    }

    #[test]
    fn discard_and_drop_remove_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("a.bin");

        let mut sink = FileSink::create(&final_path).unwrap();
        sink.write_chunk(b"partial").unwrap();
        sink.discard();
        assert!(!temp_path(&final_path).exists());
        assert!(!final_path.exists());

        {
            let mut sink = FileSink::create(&final_path).unwrap();
            sink.write_chunk(b"partial").unwrap();
        }
        assert!(!temp_path(&final_path).exists());
        assert!(!final_path.exists());
    }
}
