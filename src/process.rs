use log::{info, warn};
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::SpawnError;
use crate::secret::Secret;

#[derive(Deserialize, Copy, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    #[default]
    Standard,
    Suspended,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RawHandle(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SuspendedProcess {
    pub process: RawHandle,
    pub thread: RawHandle,
    pub pid: u32,
}

pub struct SpawnRequest<'a> {
    pub executable: &'a Path,
    /// Argument string exactly as the client expects it, without the executable.
    pub arguments: &'a str,
    /// Quoted executable followed by the arguments.
    pub command_line: &'a str,
    pub working_dir: &'a Path,
}

/// The OS process-creation primitives.
pub trait ProcessApi: Send + Sync {
    fn spawn(&self, request: &SpawnRequest) -> io::Result<u32>;
    fn create_suspended(&self, request: &SpawnRequest) -> io::Result<SuspendedProcess>;
    fn resume_thread(&self, thread: RawHandle) -> io::Result<()>;
    fn terminate(&self, process: RawHandle) -> io::Result<()>;
    fn close_handle(&self, handle: RawHandle);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InputIdle {
    Ready,
    Busy,
    /// The process has no message loop (console or headless start).
    NoMessageLoop,
}

/// A running process held open for polling. Dropping it releases the process.
pub trait WatchedProcess {
    /// `Ok(None)` while the process is still running.
    fn exit_code(&mut self) -> io::Result<Option<i32>>;
    fn wait_for_input_idle(&mut self, timeout: Duration) -> InputIdle;
    fn kill(&mut self) -> io::Result<()>;
}

pub trait ProcessMonitor: Send + Sync {
    /// The exit code stays readable through the returned watch even after the
    /// process ends, until the watch is dropped.
    fn attach(&self, pid: u32) -> io::Result<Box<dyn WatchedProcess + '_>>;
}

/// Process and primary thread handles of a suspended start.
struct OwnedProcess<'a> {
    api: &'a dyn ProcessApi,
    process: Option<RawHandle>,
    thread: Option<RawHandle>,
    pid: u32,
}

impl<'a> OwnedProcess<'a> {
    fn new(api: &'a dyn ProcessApi, raw: SuspendedProcess) -> Self {
        Self {
            api,
            process: Some(raw.process),
            thread: Some(raw.thread),
            pid: raw.pid,
        }
    }
}

impl Drop for OwnedProcess<'_> {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.api.close_handle(thread);
        }
        if let Some(process) = self.process.take() {
            self.api.close_handle(process);
        }
    }
}

pub fn command_line(executable: &Path, arguments: &str) -> Secret {
    Secret::new(format!("\"{}\" {}", executable.display(), arguments))
}

pub fn default_working_dir(executable: &Path) -> PathBuf {
    executable
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn classify_spawn_error(error: &io::Error, executable: &Path) -> SpawnError {
    match (error.raw_os_error(), error.kind()) {
        (Some(2) | Some(3), _) | (_, io::ErrorKind::NotFound) => {
            SpawnError::NotFound(executable.to_path_buf())
        }
        (Some(5), _) | (_, io::ErrorKind::PermissionDenied) => {
            SpawnError::AccessDenied(executable.to_path_buf())
        }
        (_, io::ErrorKind::Unsupported) => SpawnError::Unsupported,
        (code, _) => SpawnError::Os {
            path: executable.to_path_buf(),
            code: code.unwrap_or(-1),
        },
    }
}

pub struct ProcessLauncher {
    api: Arc<dyn ProcessApi>,
}

impl ProcessLauncher {
    pub fn new(api: Arc<dyn ProcessApi>) -> Self {
        Self { api }
    }

    pub fn launch(
        &self,
        executable: &Path,
        arguments: &str,
        working_dir: Option<&Path>,
        mode: LaunchMode,
    ) -> Result<u32, SpawnError> {
        let working_dir = working_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_working_dir(executable));
        let command_line = command_line(executable, arguments);
        let request = SpawnRequest {
            executable,
            arguments,
            command_line: command_line.expose(),
            working_dir: &working_dir,
        };

        let pid = match mode {
            LaunchMode::Standard => self
                .api
                .spawn(&request)
                .map_err(|e| classify_spawn_error(&e, executable))?,
            LaunchMode::Suspended => self.launch_suspended(&request)?,
        };

        if pid == 0 {
            return Err(SpawnError::Os {
                path: executable.to_path_buf(),
                code: -1,
            });
        }

        info!(
            "Started {} with pid {} ({:?} mode)",
            executable.display(),
            pid,
            mode
        );
        Ok(pid)
    }

    fn launch_suspended(&self, request: &SpawnRequest) -> Result<u32, SpawnError> {
        let raw = self
            .api
            .create_suspended(request)
            .map_err(|e| classify_spawn_error(&e, request.executable))?;
        let owned = OwnedProcess::new(self.api.as_ref(), raw);

        if let Err(e) = self.api.resume_thread(raw.thread) {
            warn!("Could not resume pid {}: {}", owned.pid, e);
            if let Err(e) = self.api.terminate(raw.process) {
                warn!("Could not terminate suspended pid {}: {}", owned.pid, e);
            }
            return Err(classify_spawn_error(&e, request.executable));
        }

        Ok(owned.pid)
    }
}
