//! Log file tailing
//!
//! Byte-offset cursor over an append-only alert log. Each sweep reads from
//! the last offset to EOF and splits the new content into alert blocks on
//! blank lines.
//!
//! Invariants:
//! - truncation (file shrank below the cursor) resets the cursor to 0
//! - no new bytes means no work
//! - the first sweep processes the whole existing file

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

pub struct LogTail {
    path: PathBuf,
    offset: u64,
}

impl LogTail {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if let Ok(meta) = std::fs::metadata(&path) {
            log::info!("Log path exists: {:?}, size: {} bytes", path, meta.len());
        } else {
            log::warn!("Log file {:?} not found", path);
        }
        // Cursor starts at 0 so the existing backlog is processed first
        Self { path, offset: 0 }
    }

    /// Read new alert blocks since the last sweep.
    pub fn read_new_blocks(&mut self) -> std::io::Result<Vec<String>> {
        let current_size = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Log file {:?} not found", self.path);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        // Truncated or rotated in place
        if current_size < self.offset {
            log::debug!(
                "Log file was truncated, resetting position from {} to 0",
                self.offset
            );
            self.offset = 0;
        }

        if current_size == self.offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;

        let mut new_content = String::new();
        file.read_to_string(&mut new_content)?;
        log::debug!("Read {} bytes of new content from log file", new_content.len());

        self.offset = current_size;

        Ok(split_blocks(&new_content))
    }
}

/// Split raw log text into alert blocks on blank lines.
fn split_blocks(content: &str) -> Vec<String> {
    content
        .split("\n\n")
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;

    fn write_all(path: &Path, content: &str) {
        let mut f = File::create(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    fn append(path: &Path, content: &str) {
        let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_first_sweep_reads_backlog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alert");
        write_all(&path, "block one\nline two\n\nblock two\n");

        let mut tail = LogTail::new(&path);
        let blocks = tail.read_new_blocks().unwrap();
        assert_eq!(blocks, vec!["block one\nline two", "block two"]);
    }

    #[test]
    fn test_only_new_content_on_second_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alert");
        write_all(&path, "first\n\n");

        let mut tail = LogTail::new(&path);
        assert_eq!(tail.read_new_blocks().unwrap(), vec!["first"]);

        append(&path, "second\n\n");
        assert_eq!(tail.read_new_blocks().unwrap(), vec!["second"]);
    }

    #[test]
    fn test_no_new_content_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alert");
        write_all(&path, "first\n\n");

        let mut tail = LogTail::new(&path);
        tail.read_new_blocks().unwrap();
        assert!(tail.read_new_blocks().unwrap().is_empty());
    }

    #[test]
    fn test_truncation_resets_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alert");
        write_all(&path, "a much longer first generation of content\n\n");

        let mut tail = LogTail::new(&path);
        tail.read_new_blocks().unwrap();

        // Truncate and write a shorter second generation
        write_all(&path, "fresh\n\n");
        assert_eq!(tail.read_new_blocks().unwrap(), vec!["fresh"]);
    }

    #[test]
    fn test_missing_file_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alert");

        let mut tail = LogTail::new(&path);
        assert!(tail.read_new_blocks().unwrap().is_empty());

        // File appears later
        write_all(&path, "late arrival\n\n");
        assert_eq!(tail.read_new_blocks().unwrap(), vec!["late arrival"]);
    }

    #[test]
    fn test_split_blocks_ignores_stray_blank_lines() {
        let blocks = split_blocks("\n\none\n\n\n\ntwo\n\n");
        assert_eq!(blocks, vec!["one", "two"]);
    }
}
