//! Polling file follower
//!
//! Yields lines from a growing file the way `tail -f` does, with
//! truncation and rotation handling:
//!
//! - starts at end of file in follow mode (configurable)
//! - truncation (size < read position) reopens at offset 0
//! - rotation (inode or creation-time change, or a size-divergence
//!   fallback for platforms without stable inodes) reopens at the new end
//! - a temporarily missing file is polled until it reappears
//!
//! Bytes are decoded permissively; malformed sequences are replaced.

use std::fs::{File, Metadata};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

#[cfg(unix)]
fn file_id(meta: &Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn file_id(_meta: &Metadata) -> Option<u64> {
    None
}

/// Iterator over the lines of a followed file. Line terminators are
/// stripped from the yielded strings.
pub struct TailReader {
    path: PathBuf,
    follow: bool,
    start_at_end: bool,
    poll_interval: Duration,
    stop: Option<Arc<AtomicBool>>,
    reader: Option<BufReader<File>>,
    position: u64,
    inode: Option<u64>,
    created: Option<SystemTime>,
    done: bool,
}

impl TailReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            follow: true,
            start_at_end: true,
            poll_interval: Duration::from_millis(250),
            stop: None,
            reader: None,
            position: 0,
            inode: None,
            created: None,
            done: false,
        }
    }

    /// Keep polling for new lines after EOF (default true). Without
    /// follow, existing content is yielded once and iteration ends.
    pub fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    /// Start reading at the end of the file (default true in follow mode).
    pub fn start_at_end(mut self, start_at_end: bool) -> Self {
        self.start_at_end = start_at_end;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Cooperative stop: checked between reads and polling sleeps.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    fn stopped(&self) -> bool {
        self.stop
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Open the file, waiting for it to appear when following.
    fn open_initial(&mut self) -> bool {
        loop {
            if self.stopped() {
                return false;
            }
            match File::open(&self.path) {
                Ok(file) => {
                    let meta = file.metadata().ok();
                    let mut reader = BufReader::new(file);
                    self.position = if self.start_at_end {
                        reader.seek(SeekFrom::End(0)).unwrap_or(0)
                    } else {
                        0
                    };
                    self.inode = meta.as_ref().and_then(file_id);
                    self.created = meta.as_ref().and_then(|m| m.created().ok());
                    self.reader = Some(reader);
                    return true;
                }
                Err(_) => {
                    if !self.follow {
                        return false;
                    }
                    std::thread::sleep(self.poll_interval);
                }
            }
        }
    }

    /// Re-stat the path and reopen when the underlying file changed.
    fn check_rotation(&mut self) {
        // Missing file: likely mid-rotation, keep waiting on the old handle
        let Ok(meta) = std::fs::metadata(&self.path) else {
            return;
        };

        let truncated = meta.len() < self.position;
        let inode_changed = match (self.inode, file_id(&meta)) {
            (Some(old), Some(new)) => old != new,
            _ => false,
        };
        let created_changed = match (self.created, meta.created().ok()) {
            (Some(old), Some(new)) => old != new,
            _ => false,
        };
        // Fallback for platforms without stable inodes: the path grew past
        // what the open handle sees, so a new file replaced it
        let handle_len = self
            .reader
            .as_ref()
            .and_then(|r| r.get_ref().metadata().ok())
            .map(|m| m.len());
        let replaced = !truncated
            && !inode_changed
            && matches!(handle_len, Some(len) if meta.len() != len && meta.len() > len);

        if !(truncated || inode_changed || created_changed || replaced) {
            return;
        }

        let Ok(file) = File::open(&self.path) else {
            return;
        };
        let mut reader = BufReader::new(file);
        if truncated {
            // Truncation restarts from the top so nothing is missed
            self.position = 0;
        } else {
            // Rotation mimics tail -F: start at the end of the new file
            self.position = reader.seek(SeekFrom::End(0)).unwrap_or(0);
        }
        self.inode = file_id(&meta);
        self.created = meta.created().ok();
        self.reader = Some(reader);
    }

    /// One read attempt; None at EOF.
    fn try_read_line(&mut self) -> Option<String> {
        let reader = self.reader.as_mut()?;
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => None,
            Ok(n) => {
                self.position += n as u64;
                let mut line = String::from_utf8_lossy(&buf).into_owned();
                if line.ends_with('\n') {
                    line.pop();
                    if line.ends_with('\r') {
                        line.pop();
                    }
                }
                Some(line)
            }
        }
    }
}

impl Iterator for TailReader {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        if self.reader.is_none() && !self.open_initial() {
            self.done = true;
            return None;
        }
        loop {
            if self.stopped() {
                self.done = true;
                return None;
            }
            if let Some(line) = self.try_read_line() {
                return Some(line);
            }
            if !self.follow {
                self.done = true;
                return None;
            }
            std::thread::sleep(self.poll_interval);
            if self.stopped() {
                self.done = true;
                return None;
            }
            self.check_rotation();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_no_follow_yields_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "one\ntwo\nthree\n").unwrap();

        let lines: Vec<String> = TailReader::new(&path)
            .follow(false)
            .start_at_end(false)
            .collect();
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_no_follow_missing_file_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.log");
        let lines: Vec<String> = TailReader::new(&path).follow(false).collect();
        assert!(lines.is_empty());
    }

    #[test]
    fn test_start_at_end_skips_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "old\n").unwrap();

        // start_at_end with no-follow: nothing left to read
        let lines: Vec<String> = TailReader::new(&path).follow(false).collect();
        assert!(lines.is_empty());
    }

    #[test]
    fn test_crlf_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "one\r\ntwo\r\n").unwrap();
        let lines: Vec<String> = TailReader::new(&path)
            .follow(false)
            .start_at_end(false)
            .collect();
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"ok \xff\xfe bytes\n").unwrap();
        drop(file);
        let lines: Vec<String> = TailReader::new(&path)
            .follow(false)
            .start_at_end(false)
            .collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ok "));
        assert!(lines[0].contains('\u{FFFD}'));
    }
}
