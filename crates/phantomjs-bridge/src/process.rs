//! Spawning, locating, and terminating the PhantomJS executable.

use std::env;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::config::SessionConfig;
use crate::error::Error;

/// Environment variable that overrides executable discovery.
pub const EXECUTABLE_ENV: &str = "PHANTOMJS_EXECUTABLE";

const BINARY_NAME: &str = if cfg!(windows) {
    "phantomjs.exe"
} else {
    "phantomjs"
};

/// Install locations checked after `PATH`.
const COMMON_LOCATIONS: &[&str] = &[
    "/usr/local/bin/phantomjs",
    "/usr/bin/phantomjs",
    "/opt/phantomjs/bin/phantomjs",
];

/// The process surface the session needs: exit observation and force kill.
///
/// `tokio::process::Child` is the real implementation; tests drive sessions
/// with scripted handles instead of spawning anything.
#[async_trait]
pub trait PhantomProcess: Send {
    /// Wait for the process to exit. `None` means it died to a signal.
    async fn wait(&mut self) -> io::Result<Option<i32>>;

    /// Begin forced termination without waiting for it to complete.
    fn start_kill(&mut self) -> io::Result<()>;
}

#[async_trait]
impl PhantomProcess for Child {
    async fn wait(&mut self) -> io::Result<Option<i32>> {
        Child::wait(self).await.map(|status| status.code())
    }

    fn start_kill(&mut self) -> io::Result<()> {
        Child::start_kill(self)
    }
}

/// Spawn PhantomJS with fully piped stdio.
pub(crate) fn spawn(config: &SessionConfig) -> Result<Child, Error> {
    let path = &config.executable;
    tracing::debug!(
        executable = %path.display(),
        args = ?config.args,
        "Spawning phantomjs"
    );
    Command::new(path)
        .args(&config.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| classify_spawn_error(path, e))
}

fn classify_spawn_error(path: &Path, err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::NotFound => {
            Error::Launch(format!("executable not found: {}", path.display()))
        }
        io::ErrorKind::PermissionDenied => {
            Error::Launch(format!("executable not runnable: {}", path.display()))
        }
        _ => Error::Launch(format!("failed to spawn {}: {err}", path.display())),
    }
}

/// Locate the PhantomJS binary.
///
/// Order: the [`EXECUTABLE_ENV`] override (which must point at an existing
/// file), then `PATH`, then the usual install locations.
pub fn find_executable() -> Result<PathBuf, Error> {
    discover(
        env::var_os(EXECUTABLE_ENV),
        env::var_os("PATH"),
        COMMON_LOCATIONS,
    )
}

fn discover(
    override_path: Option<OsString>,
    path_var: Option<OsString>,
    fallbacks: &[&str],
) -> Result<PathBuf, Error> {
    if let Some(raw) = override_path {
        let path = PathBuf::from(raw);
        if path.is_file() {
            return Ok(path);
        }
        return Err(Error::Launch(format!(
            "{EXECUTABLE_ENV} points at {}, which does not exist",
            path.display()
        )));
    }

    if let Some(paths) = path_var {
        if let Some(found) = env::split_paths(&paths)
            .map(|dir| dir.join(BINARY_NAME))
            .find(|candidate| candidate.is_file())
        {
            return Ok(found);
        }
    }

    for candidate in fallbacks {
        let path = Path::new(candidate);
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
    }

    Err(Error::Launch(format!(
        "phantomjs not found; install it on PATH or set {EXECUTABLE_ENV}"
    )))
}
