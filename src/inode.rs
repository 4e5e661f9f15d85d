//! Target-file metadata capture.

use std::path::Path;

use nix::errno::Errno;
use nix::sys::stat::{self, Mode};

use crate::error::Error;
use crate::timestamp::Instant;

/// The inode state captured immediately before a mutation: the mode bits the
/// touch step rewrites, and the existing timestamps a derived instant may be
/// copied from.
///
/// One snapshot belongs to one mutation and is discarded when it completes.
#[derive(Debug, Clone, Copy)]
pub struct InodeSnapshot {
    pub mode: Mode,
    pub atime: Instant,
    pub mtime: Instant,
    pub ctime: Instant,
}

impl InodeSnapshot {
    /// Stats `path`, retrying transparently when the call is interrupted by a
    /// signal.
    pub fn capture(path: &Path) -> Result<Self, Error> {
        let stat = loop {
            match stat::stat(path) {
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    return Err(Error::Stat {
                        path: path.to_path_buf(),
                        errno,
                    })
                }
                Ok(stat) => break stat,
            }
        };

        Ok(Self {
            mode: Mode::from_bits_truncate(stat.st_mode as libc::mode_t),
            atime: Instant::new(stat.st_atime as i64, subsecond::atime_usec(&stat)),
            mtime: Instant::new(stat.st_mtime as i64, subsecond::mtime_usec(&stat)),
            ctime: Instant::new(stat.st_ctime as i64, subsecond::ctime_usec(&stat)),
        })
    }
}

/// Sub-second fractions of the stat timestamps, as microseconds. Platforms
/// whose stat structure has no sub-second fields report zero; the field names
/// vary per platform, so the variance stays contained here.
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd"
))]
mod subsecond {
    use nix::sys::stat::FileStat;

    pub fn atime_usec(stat: &FileStat) -> i64 {
        (stat.st_atime_nsec / 1000) as i64
    }

    pub fn mtime_usec(stat: &FileStat) -> i64 {
        (stat.st_mtime_nsec / 1000) as i64
    }

    pub fn ctime_usec(stat: &FileStat) -> i64 {
        (stat.st_ctime_nsec / 1000) as i64
    }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd"
)))]
mod subsecond {
    use nix::sys::stat::FileStat;

    pub fn atime_usec(_stat: &FileStat) -> i64 {
        0
    }

    pub fn mtime_usec(_stat: &FileStat) -> i64 {
        0
    }

    pub fn ctime_usec(_stat: &FileStat) -> i64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::MetadataExt;

    use super::*;

    #[test]
    fn test_capture_matches_std_metadata() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let metadata = file.as_file().metadata().unwrap();

        let snapshot = InodeSnapshot::capture(file.path()).unwrap();

        assert_eq!(
            snapshot.mode,
            Mode::from_bits_truncate(metadata.mode() as libc::mode_t)
        );
        assert_eq!(snapshot.atime.sec, metadata.atime());
        assert_eq!(snapshot.atime.usec, metadata.atime_nsec() / 1000);
        assert_eq!(snapshot.mtime.sec, metadata.mtime());
        assert_eq!(snapshot.mtime.usec, metadata.mtime_nsec() / 1000);
        assert_eq!(snapshot.ctime.sec, metadata.ctime());
        assert_eq!(snapshot.ctime.usec, metadata.ctime_nsec() / 1000);
    }

    #[test]
    fn test_capture_missing_file() {
        let result = InodeSnapshot::capture(Path::new("/definitely/not/a/file"));

        assert!(matches!(
            result,
            Err(Error::Stat {
                errno: Errno::ENOENT,
                ..
            })
        ));
    }
}
