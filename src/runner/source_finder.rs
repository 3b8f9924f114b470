//! # External source finder
//!
//! The [`SourceFinder`] trait is the seam between the batch driver and the process that
//! actually searches a sub-cube. [`SofiaExecutable`] runs the SoFiA 2 binary; tests
//! substitute an in-process implementation.
//!
//! Process handling
//! -----------------
//! * The executable is invoked as `<exe> <parameter file>` in the current directory.
//! * stdout and stderr are drained on two scoped threads so that a verbose child never
//!   blocks on a full pipe.
//! * With a timeout, the child is polled with `try_wait`; once the limit is exceeded it
//!   is killed and the result is flagged `timed_out`.
use std::{
    env,
    io::{self, Read},
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;

use crate::{
    optifind_errors::OptifindError,
    runner::run_config::{RunConfig, RunResult},
};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs the source finder on one prepared [`RunConfig`].
pub trait SourceFinder {
    /// Name used in log messages.
    fn name(&self) -> &str;

    /// Check that the finder can be run at all, before the first source.
    fn preflight(&self) -> Result<(), OptifindError> {
        Ok(())
    }

    /// Run the finder on `config`, whose parameter file has already been written.
    ///
    /// Return
    /// ----------
    /// * A [`RunResult`] describing the process outcome. A non-zero exit is a result,
    ///   not an error. `output_catalogue` is filled in by the caller.
    /// * [`OptifindError::ExecutableNotFound`] if the process cannot be started.
    fn execute(&self, config: &RunConfig) -> Result<RunResult, OptifindError>;
}

/// The SoFiA 2 executable, given as a path or as a name looked up in `PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SofiaExecutable {
    executable: Utf8PathBuf,
}

impl SofiaExecutable {
    pub fn new(executable: impl Into<Utf8PathBuf>) -> Self {
        SofiaExecutable {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Utf8Path {
        &self.executable
    }

    /// Resolve the executable to an existing file.
    ///
    /// A value containing a path separator is used as is; a bare name is searched in
    /// the directories of `PATH`.
    pub fn resolve(&self) -> Result<Utf8PathBuf, OptifindError> {
        let not_found = || OptifindError::ExecutableNotFound(self.executable.to_string());

        if self.executable.components().count() > 1 || self.executable.is_absolute() {
            return is_executable(&self.executable)
                .then(|| self.executable.clone())
                .ok_or_else(not_found);
        }

        let path_var = env::var_os("PATH").ok_or_else(not_found)?;
        env::split_paths(&path_var)
            .filter_map(|dir| Utf8PathBuf::from_path_buf(dir).ok())
            .map(|dir| dir.join(&self.executable))
            .find(|candidate| is_executable(candidate))
            .ok_or_else(not_found)
    }

    fn spawn(&self, config: &RunConfig) -> Result<Child, OptifindError> {
        Command::new(&self.executable)
            .arg(&config.parameter_file)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                    OptifindError::ExecutableNotFound(format!("{} ({e})", self.executable))
                }
                _ => OptifindError::IoError(e),
            })
    }
}

#[cfg(unix)]
fn is_executable(path: &Utf8Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Utf8Path) -> bool {
    path.is_file()
}

fn drain(mut pipe: impl Read) -> String {
    let mut buf = Vec::new();
    // a read error only truncates the captured log
    let _ = pipe.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

fn join_drain(handle: Option<thread::ScopedJoinHandle<'_, String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Wait for `child`, killing it once `timeout` has elapsed. Returns the exit code
/// (`None` when killed) and whether the timeout fired.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Option<Duration>,
) -> io::Result<(Option<i32>, bool)> {
    let Some(timeout) = timeout else {
        return Ok((child.wait()?.code(), false));
    };

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status.code(), false));
        }
        if start.elapsed() >= timeout {
            child.kill()?;
            child.wait()?;
            return Ok((None, true));
        }
        thread::sleep(WAIT_POLL_INTERVAL.min(timeout));
    }
}

impl SourceFinder for SofiaExecutable {
    fn name(&self) -> &str {
        self.executable.as_str()
    }

    fn preflight(&self) -> Result<(), OptifindError> {
        let resolved = self.resolve()?;
        debug!("Using source finder {resolved}");
        Ok(())
    }

    fn execute(&self, config: &RunConfig) -> Result<RunResult, OptifindError> {
        let start = Instant::now();
        let mut child = self.spawn(config)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (status, out, err) = thread::scope(|scope| {
            let out = stdout.map(|pipe| scope.spawn(move || drain(pipe)));
            let err = stderr.map(|pipe| scope.spawn(move || drain(pipe)));

            let status = wait_with_timeout(&mut child, config.timeout);
            (status, join_drain(out), join_drain(err))
        });
        let (exit_code, timed_out) = status?;

        debug!("[{}] stdout:\n{out}", config.source_id);
        if !err.is_empty() {
            debug!("[{}] stderr:\n{err}", config.source_id);
        }

        Ok(RunResult {
            exit_code,
            timed_out,
            stdout: out,
            stderr: err,
            elapsed: start.elapsed(),
            ..RunResult::for_config(config)
        })
    }
}
