//! Read and write a file that another process may be holding open.
//!
//! There is no cross-process lock for the target file, so sharing violations
//! are expected. Every I/O error is retried until the strategy runs out of
//! attempts; only the last error reaches the caller.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::thread;

use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::retry::RetryStrategy;

/// Raw file access, so contention can be simulated in tests.
pub trait FileAccess: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace the file's contents. Must not return before the data is durable.
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsAccess;

impl FileAccess for FsAccess {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.sync_all()
    }
}

pub fn read_with_retry<A: FileAccess + ?Sized>(
    access: &A,
    path: &Path,
    strategy: &dyn RetryStrategy,
) -> Result<Vec<u8>> {
    run("read", path, strategy, || access.read(path))
}

pub fn write_with_retry<A: FileAccess + ?Sized>(
    access: &A,
    path: &Path,
    bytes: &[u8],
    strategy: &dyn RetryStrategy,
) -> Result<()> {
    run("write", path, strategy, || access.write(path, bytes))
}

fn run<T>(
    op: &'static str,
    path: &Path,
    strategy: &dyn RetryStrategy,
    mut attempt_fn: impl FnMut() -> io::Result<T>,
) -> Result<T> {
    let max = strategy.max_attempts();
    let mut attempt = 1;
    loop {
        match attempt_fn() {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} {} succeeded on attempt {}", op, path.display(), attempt);
                }
                return Ok(value);
            }
            Err(e) if strategy.can_retry(attempt) => {
                let delay = strategy.delay(attempt);
                warn!(
                    "Failed to {} {} (attempt {}/{}): {}, retrying in {}ms",
                    op,
                    path.display(),
                    attempt,
                    max,
                    e,
                    delay.as_millis()
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(source) => {
                error!(
                    "Giving up on {} {} after {} attempts: {}",
                    op,
                    path.display(),
                    attempt,
                    source
                );
                return Err(Error::RetriesExhausted {
                    op,
                    path: path.to_path_buf(),
                    attempts: attempt,
                    source,
                });
            }
        }
    }
}
