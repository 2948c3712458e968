//! Output file that only appears at its final path once fully written.
//!
//! In atomic mode the data goes to `<path>.part` and is renamed over `<path>`
//! on [`PartialFile::commit`]. A guard dropped without commit (early return,
//! panic) removes whatever it was writing, so a failed run never leaves a
//! truncated file behind.

use crate::output_error::OutputError;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const PARTIAL_SUFFIX: &str = ".part";

/// Buffered writer for one output file with remove-unless-committed semantics.
#[derive(Debug)]
pub struct PartialFile {
    final_path: PathBuf,
    write_path: PathBuf,
    inner: Option<BufWriter<File>>,
    committed: bool,
}

/// `path` with [`PARTIAL_SUFFIX`] appended to its file name.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(PARTIAL_SUFFIX);
    PathBuf::from(os)
}

impl PartialFile {
    /// Create the file (and missing parent directories).
    pub fn create(path: impl AsRef<Path>, atomic: bool) -> Result<Self, OutputError> {
        let final_path = path.as_ref().to_path_buf();
        let write_path = if atomic {
            partial_path(&final_path)
        } else {
            final_path.clone()
        };
        if let Some(dir) = final_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| OutputError::io(dir, e))?;
        }
        let file = File::create(&write_path).map_err(|e| OutputError::io(&write_path, e))?;
        log::debug!("opened {}", write_path.display());
        Ok(Self {
            final_path,
            write_path,
            inner: Some(BufWriter::new(file)),
            committed: false,
        })
    }

    /// Path the data is currently written to.
    pub fn write_path(&self) -> &Path {
        &self.write_path
    }

    /// Flush, sync and move the file to its final path.
    pub fn commit(mut self) -> Result<PathBuf, OutputError> {
        if let Some(writer) = self.inner.take() {
            let file = writer
                .into_inner()
                .map_err(|e| OutputError::io(&self.write_path, e.into_error()))?;
            file.sync_all()
                .map_err(|e| OutputError::io(&self.write_path, e))?;
        }
        if self.write_path != self.final_path {
            fs::rename(&self.write_path, &self.final_path)
                .map_err(|e| OutputError::io(&self.final_path, e))?;
        }
        self.committed = true;
        Ok(std::mem::take(&mut self.final_path))
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("partial file already committed"))
    }
}

impl Write for PartialFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed {
            drop(self.inner.take());
            match fs::remove_file(&self.write_path) {
                Ok(()) => log::warn!("removed incomplete {}", self.write_path.display()),
                Err(e) => log::warn!(
                    "could not remove incomplete {}: {e}",
                    self.write_path.display()
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_renames_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.csv");
        let mut f = PartialFile::create(&path, true).unwrap();
        assert_eq!(f.write_path(), partial_path(&path));
        writeln!(f, "hello").unwrap();
        assert!(!path.exists());
        let done = f.commit().unwrap();
        assert_eq!(done, path);
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn drop_without_commit_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        for atomic in [true, false] {
            {
                let mut f = PartialFile::create(&path, atomic).unwrap();
                writeln!(f, "half a row").unwrap();
            }
            assert!(!path.exists());
            assert!(!partial_path(&path).exists());
        }
    }

    #[test]
    fn in_place_mode_writes_final_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut f = PartialFile::create(&path, false).unwrap();
        assert_eq!(f.write_path(), path.as_path());
        f.write_all(b"x").unwrap();
        f.commit().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"x");
    }
}
