//! Progress reporting module

use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::time::Duration;

/// What a progress total counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Total {
    /// Bytes of the source file
    Bytes(u64),
    /// Archive entries
    Items(u64),
    /// Sequential formats that cannot tell up front
    Unknown,
}

/// Observer of extraction progress.
///
/// `begin` may be called more than once per install: the session announces
/// the source size, and formats with an entry count replace it with that.
pub trait Progress: Send + Sync {
    /// Announce the total for the work that follows
    fn begin(&self, total: Total);

    /// Record `delta` bytes or items of progress
    fn advance(&self, delta: u64);

    /// Called once the install has finished, successfully or not
    fn finish(&self) {}
}

/// No-op progress observer
pub struct NoProgress;

impl Progress for NoProgress {
    fn begin(&self, _total: Total) {}

    fn advance(&self, _delta: u64) {}
}

/// Reader that reports every byte read to a progress observer
pub struct ProgressReader<R> {
    inner: R,
    progress: Arc<dyn Progress>,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, progress: Arc<dyn Progress>) -> Self {
        Self { inner, progress }
    }

    /// Unwrap the reader, dropping the observer
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.progress.advance(n as u64);
        }
        Ok(n)
    }
}

impl<R: Seek> Seek for ProgressReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Terminal progress bar for installs
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a reporter labelled with `message`; hidden when not `enabled`
    pub fn new(message: &str, enabled: bool) -> Self {
        let bar = if enabled {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(message.to_string());
        Self { bar }
    }

    fn style(total: Total) -> ProgressStyle {
        let template = match total {
            Total::Bytes(_) => {
                "{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})"
            }
            Total::Items(_) => {
                "{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)"
            }
            Total::Unknown => "{spinner:.green} {msg} [{elapsed_precise}] {pos}",
        };
        ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
    }
}

impl Progress for ProgressReporter {
    fn begin(&self, total: Total) {
        if let Total::Bytes(n) | Total::Items(n) = total {
            self.bar.set_length(n);
        }
        self.bar.set_position(0);
        self.bar.set_style(Self::style(total));
        self.bar.enable_steady_tick(Duration::from_millis(100));
    }

    fn advance(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}
