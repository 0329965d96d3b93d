//! In-memory mock filesystem for testing collectors without real `/proc`.

use crate::collector::traits::FileSystem;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem for testing.
///
/// Every file holds a queue of contents. Each read consumes the front of the
/// queue until one entry is left, which is then returned on every later read.
/// This lets a test script how a pseudo-file like `/proc/self/status`
/// changes between two probes.
#[derive(Debug, Default)]
pub struct MockFs {
    files: RefCell<HashMap<PathBuf, VecDeque<String>>>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the content of a file, dropping any scripted reads.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.files
            .get_mut()
            .insert(path.as_ref().to_path_buf(), VecDeque::from([content.into()]));
    }

    /// Appends contents returned by successive reads of `path`.
    pub fn push_reads<I, S>(&mut self, path: impl AsRef<Path>, contents: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files
            .get_mut()
            .entry(path.as_ref().to_path_buf())
            .or_default()
            .extend(contents.into_iter().map(Into::into));
    }

    /// Scripts `<proc_path>/self/status` to report the given `VmRSS` values
    /// (in kB) on successive reads.
    pub fn with_rss_sequence(proc_path: impl AsRef<Path>, rss_kb: &[u64]) -> Self {
        let mut fs = Self::new();
        let path = proc_path.as_ref().join("self").join("status");
        fs.push_reads(path, rss_kb.iter().map(|&kb| status_content(kb)));
        fs
    }
}

/// Minimal `/proc/[pid]/status` content with the given resident set size.
pub fn status_content(vm_rss_kb: u64) -> String {
    format!(
        "Name:\tcallprobe\nPid:\t4242\nVmSize:\t{:>8} kB\nVmHWM:\t{:>8} kB\nVmRSS:\t{:>8} kB\n",
        vm_rss_kb * 4,
        vm_rss_kb,
        vm_rss_kb
    )
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let mut files = self.files.borrow_mut();
        let queue = files
            .get_mut(path)
            .filter(|queue| !queue.is_empty())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("file not found: {:?}", path),
                )
            })?;

        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap_or_default())
        } else {
            Ok(queue[0].clone())
        }
    }
}
