//! File target: a regular file standing in for an opened namespace handle.
//!
//! Device discovery/attach is out of scope; the engine consumes whatever
//! `Target` was already opened for a namespace. `FileTarget` is the
//! file-backed handle used when a `-r` spec names a local path instead of a
//! real NVMe-oF target.

use super::{FadviseFlags, FileLockMode, LockGuard, OpenFlags, Target};
use crate::Result;
use anyhow::Context;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;

pub struct FileTarget {
    path: PathBuf,
    file_size: Option<u64>,
    fd: Option<RawFd>,
    actual_size: u64,
    preallocate: bool,
    logical_block_size: u64,
}

impl FileTarget {
    pub fn new(path: PathBuf, file_size: Option<u64>) -> Self {
        Self {
            path,
            file_size,
            fd: None,
            actual_size: 0,
            preallocate: false,
            logical_block_size: 512,
        }
    }

    pub fn set_preallocate(&mut self, preallocate: bool) {
        self.preallocate = preallocate;
    }

    fn preallocate_space(&self) -> Result<()> {
        let fd = self.fd.ok_or_else(|| anyhow::anyhow!("File not open"))?;
        let size = self.file_size.ok_or_else(|| anyhow::anyhow!("No file size specified"))?;
        let result = unsafe { libc::posix_fallocate(fd, 0, size as i64) };
        if result != 0 {
            let err = std::io::Error::from_raw_os_error(result);
            return Err(err).context(format!(
                "posix_fallocate failed: path={}, size={}",
                self.path.display(),
                size
            ));
        }
        Ok(())
    }

    fn detect_logical_block_size(&mut self) -> Result<()> {
        let fd = self.fd.ok_or_else(|| anyhow::anyhow!("File not open"))?;
        let mut block_size: libc::c_int = 0;
        let result = unsafe { libc::ioctl(fd, libc::BLKSSZGET, &mut block_size) };
        if result == 0 && block_size > 0 {
            self.logical_block_size = block_size as u64;
            return Ok(());
        }
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        let result = unsafe { libc::fstat(fd, &mut stat) };
        self.logical_block_size = if result == 0 && stat.st_blksize >= 512 && (stat.st_blksize as u64).is_power_of_two() {
            stat.st_blksize as u64
        } else {
            512
        };
        Ok(())
    }
}

impl Target for FileTarget {
    fn open(&mut self, flags: OpenFlags) -> Result<()> {
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if flags.create {
            options.create(true);
        }
        if flags.truncate {
            options.truncate(true);
        }

        let mut custom_flags = 0;
        if flags.direct {
            custom_flags |= libc::O_DIRECT;
        }
        if flags.sync {
            custom_flags |= libc::O_SYNC;
        }
        if custom_flags != 0 {
            options.custom_flags(custom_flags);
        }

        let file = options
            .open(&self.path)
            .with_context(|| format!("Failed to open file: {}", self.path.display()))?;
        let fd = file.as_raw_fd();
        self.actual_size = file
            .metadata()
            .with_context(|| format!("Failed to get file metadata: {}", self.path.display()))?
            .len();
        self.fd = Some(fd);
        std::mem::forget(file);

        self.detect_logical_block_size()?;

        if self.preallocate && self.file_size.is_some_and(|s| s > self.actual_size) {
            self.preallocate_space()?;
            self.actual_size = self.file_size.unwrap();
        }

        Ok(())
    }

    fn fd(&self) -> RawFd {
        self.fd.expect("File not open")
    }

    fn size(&self) -> u64 {
        self.file_size.unwrap_or(self.actual_size)
    }

    fn apply_fadvise(&self, flags: &FadviseFlags) -> Result<()> {
        let fd = self.fd.ok_or_else(|| anyhow::anyhow!("File not open"))?;
        let hints: &[(bool, libc::c_int, &str)] = &[
            (flags.sequential, libc::POSIX_FADV_SEQUENTIAL, "SEQUENTIAL"),
            (flags.random, libc::POSIX_FADV_RANDOM, "RANDOM"),
            (flags.willneed, libc::POSIX_FADV_WILLNEED, "WILLNEED"),
            (flags.dontneed, libc::POSIX_FADV_DONTNEED, "DONTNEED"),
            (flags.noreuse, libc::POSIX_FADV_NOREUSE, "NOREUSE"),
        ];
        for &(enabled, advice, name) in hints {
            if !enabled {
                continue;
            }
            let result = unsafe { libc::posix_fadvise(fd, 0, 0, advice) };
            if result != 0 {
                let err = std::io::Error::from_raw_os_error(result);
                return Err(err).context(format!("posix_fadvise({}) failed", name));
            }
        }
        Ok(())
    }

    fn lock(&self, mode: FileLockMode, offset: u64, len: u64) -> Result<LockGuard> {
        if mode == FileLockMode::None {
            return Ok(LockGuard::new(0, FileLockMode::None, 0, 0));
        }
        let fd = self.fd.ok_or_else(|| anyhow::anyhow!("File not open"))?;
        let (start, length) = match mode {
            FileLockMode::None => (0, 0),
            FileLockMode::Range => (offset, len),
            FileLockMode::Full => (0, 0),
        };
        let flock = libc::flock {
            l_type: libc::F_WRLCK as i16,
            l_whence: libc::SEEK_SET as i16,
            l_start: start as i64,
            l_len: length as i64,
            l_pid: 0,
        };
        let result = unsafe { libc::fcntl(fd, libc::F_SETLKW, &flock) };
        if result < 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).context(format!(
                "fcntl(F_SETLKW) failed: mode={:?}, offset={}, len={}",
                mode, offset, len
            ));
        }
        Ok(LockGuard::new(fd, mode, start, length))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(fd) = self.fd {
            let result = unsafe { libc::close(fd) };
            if result < 0 {
                let err = std::io::Error::last_os_error();
                return Err(err).context(format!("close failed: path={}", self.path.display()));
            }
            self.fd = None;
        }
        Ok(())
    }

    fn logical_block_size(&self) -> u64 {
        self.logical_block_size
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn open_and_preallocate_sets_size() {
        let tmp = NamedTempFile::new().unwrap();
        let mut target = FileTarget::new(tmp.path().to_path_buf(), Some(1024 * 1024));
        target.set_preallocate(true);
        target
            .open(OpenFlags { direct: false, sync: false, create: true, truncate: false })
            .unwrap();
        assert_eq!(target.size(), 1024 * 1024);
        target.close().unwrap();
    }
}
