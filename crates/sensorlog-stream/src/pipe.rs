//! Forward-only decompression sources

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use tracing::{debug, warn};

use crate::config::Decompressor;
use crate::error::StreamError;

/// Decompressed bytes of a single-file archive, readable front to back only.
///
/// Owns the decompressor child process (if any); dropping the source kills and
/// reaps it. When the pipe reaches end of data the child is waited for, and
/// an unsuccessful exit is reported by that read and every read after it as
/// a [`StreamError::ProcessFailed`] carried in the `io::Error`.
pub struct PipeSource {
    reader: BufReader<Box<dyn Read + Send>>,
    child: Option<Child>,
    program: String,
    archive: PathBuf,
    failure: Option<ExitStatus>,
}

impl PipeSource {
    /// Start decompressing `archive` (already canonicalised).
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Spawn`] if the decompressor cannot be started.
    pub fn spawn(archive: &Path, decompressor: &Decompressor) -> Result<Self, StreamError> {
        let spawn_error = |source: io::Error| StreamError::Spawn {
            program: decompressor.name().to_string(),
            archive: archive.to_path_buf(),
            source,
        };

        match decompressor {
            Decompressor::Command { program, args } => {
                let mut command = Command::new(program);
                command.args(args).arg(archive);
                Self::from_command(command, program, archive).map_err(spawn_error)
            }
            Decompressor::Gzip => {
                let file = File::open(archive).map_err(spawn_error)?;
                debug!(archive = ?archive, "Gzip decoder started");
                Ok(Self {
                    reader: BufReader::new(Box::new(MultiGzDecoder::new(file))),
                    child: None,
                    program: decompressor.name().to_string(),
                    archive: archive.to_path_buf(),
                    failure: None,
                })
            }
        }
    }

    /// Run a prepared command and read its stdout.
    ///
    /// stdin and stderr are discarded; `source` names the file the command
    /// decodes.
    pub(crate) fn from_command(mut command: Command, program: &str, source: &Path) -> io::Result<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let Some(stdout) = child.stdout.take() else {
            reap(&mut child);
            return Err(io::Error::other("child stdout unavailable"));
        };

        debug!(program = %program, source = ?source, pid = child.id(), "Decoder process started");
        Ok(Self {
            reader: BufReader::new(Box::new(stdout)),
            child: Some(child),
            program: program.to_string(),
            archive: source.to_path_buf(),
            failure: None,
        })
    }

    /// Canonical path of the archive being decompressed
    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// Stop the decompressor and release the pipe
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            reap(&mut child);
        }
    }

    /// Called at end of data: wait for the child and fail if it did not succeed
    fn check_exit(&mut self) -> io::Result<()> {
        if let Some(mut child) = self.child.take() {
            let status = child.wait()?;
            if status.success() {
                debug!(program = %self.program, archive = ?self.archive, "Decoder process finished");
            } else {
                warn!(program = %self.program, archive = ?self.archive, %status, "Decoder process failed");
                self.failure = Some(status);
            }
        }
        match self.failure {
            Some(status) => Err(io::Error::other(StreamError::process_failed(&self.program, status))),
            None => Ok(()),
        }
    }
}

/// Kill (if still running) and wait for a decompressor child.
pub(crate) fn reap(child: &mut Child) {
    match child.try_wait() {
        Ok(Some(_)) => {}
        Ok(None) => {
            if let Err(e) = child.kill() {
                debug!(pid = child.id(), error = %e, "Decompressor already gone");
            }
            if let Err(e) = child.wait() {
                warn!(pid = child.id(), error = %e, "Failed to reap decompressor");
            }
        }
        Err(e) => warn!(pid = child.id(), error = %e, "Failed to query decompressor state"),
    }
}

impl Read for PipeSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.check_exit()?;
        }
        Ok(n)
    }
}

impl BufRead for PipeSource {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.reader.fill_buf()?.is_empty() {
            self.check_exit()?;
        }
        self.reader.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.reader.consume(amt);
    }
}

impl Drop for PipeSource {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PipeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeSource")
            .field("program", &self.program)
            .field("archive", &self.archive)
            .field("pid", &self.child.as_ref().map(Child::id))
            .finish()
    }
}
