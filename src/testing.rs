use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::client::GameLauncher;
use crate::clock::Clock;
use crate::config::{DecalSettings, GameSettings, VerifySettings};
use crate::constants::DEFAULT_MAX_CLIENTS;
use crate::history::LaunchHistory;
use crate::inject::{InjectionProvider, Injector};
use crate::process::{
    InputIdle, LaunchMode, ProcessApi, ProcessLauncher, ProcessMonitor, RawHandle,
    SpawnRequest, SuspendedProcess, WatchedProcess,
};
use crate::secret::{ConfigCredentials, Secret};
use crate::task::{Account, Credential, LaunchResult, LaunchTask, ServerConnection, ServerType};

pub struct FakeClock {
    base: Instant,
    offset_ms: AtomicU64,
    cancel_on_sleep: Mutex<Option<CancelToken>>,
}

impl FakeClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            base: Instant::now(),
            offset_ms: AtomicU64::new(0),
            cancel_on_sleep: Mutex::new(None),
        })
    }

    /// The next `sleep` cancels `token` halfway through instead of completing.
    pub fn cancel_on_next_sleep(&self, token: CancelToken) {
        *self.cancel_on_sleep.lock().unwrap() = Some(token);
    }

    pub fn advance(&self, by: Duration) {
        self.offset_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            return true;
        }
        if let Some(token) = self.cancel_on_sleep.lock().unwrap().take() {
            self.advance(duration / 2);
            token.cancel();
            return cancel.is_cancelled();
        }
        self.advance(duration);
        cancel.is_cancelled()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiCall {
    Spawn(String),
    CreateSuspended(String),
    Resume(RawHandle),
    Terminate(RawHandle),
    Close(RawHandle),
}

#[derive(Default)]
pub struct FakeProcessApi {
    calls: Mutex<Vec<ApiCall>>,
    working_dirs: Mutex<Vec<PathBuf>>,
    create_error: Option<i32>,
    resume_error: bool,
    resume_panics: bool,
}

impl FakeProcessApi {
    pub const PID: u32 = 4242;
    pub const PROCESS_HANDLE: RawHandle = RawHandle(0x10);
    pub const THREAD_HANDLE: RawHandle = RawHandle(0x20);

    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_create(mut self, code: i32) -> Self {
        self.create_error = Some(code);
        self
    }

    pub fn failing_resume(mut self) -> Self {
        self.resume_error = true;
        self
    }

    pub fn panicking_resume(mut self) -> Self {
        self.resume_panics = true;
        self
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_command_line(&self) -> Option<String> {
        self.calls().into_iter().rev().find_map(|c| match c {
            ApiCall::Spawn(line) | ApiCall::CreateSuspended(line) => Some(line),
            _ => None,
        })
    }

    pub fn last_working_dir(&self) -> Option<PathBuf> {
        self.working_dirs.lock().unwrap().last().cloned()
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn start(&self, request: &SpawnRequest) -> io::Result<()> {
        self.working_dirs
            .lock()
            .unwrap()
            .push(request.working_dir.to_path_buf());
        match self.create_error {
            Some(code) => Err(io::Error::from_raw_os_error(code)),
            None => Ok(()),
        }
    }
}

impl ProcessApi for FakeProcessApi {
    fn spawn(&self, request: &SpawnRequest) -> io::Result<u32> {
        self.record(ApiCall::Spawn(request.command_line.to_string()));
        self.start(request)?;
        Ok(Self::PID)
    }

    fn create_suspended(&self, request: &SpawnRequest) -> io::Result<SuspendedProcess> {
        self.record(ApiCall::CreateSuspended(request.command_line.to_string()));
        self.start(request)?;
        Ok(SuspendedProcess {
            process: Self::PROCESS_HANDLE,
            thread: Self::THREAD_HANDLE,
            pid: Self::PID,
        })
    }

    fn resume_thread(&self, thread: RawHandle) -> io::Result<()> {
        self.record(ApiCall::Resume(thread));
        if self.resume_panics {
            panic!("resume exploded");
        }
        if self.resume_error {
            return Err(io::Error::from_raw_os_error(6));
        }
        Ok(())
    }

    fn terminate(&self, process: RawHandle) -> io::Result<()> {
        self.record(ApiCall::Terminate(process));
        Ok(())
    }

    fn close_handle(&self, handle: RawHandle) {
        self.record(ApiCall::Close(handle));
    }
}

/// Scripted behaviour for one pid, expressed against a shared fake clock.
#[derive(Clone, Debug)]
pub enum Script {
    ReadyAfter(Duration),
    ExitAfter(Duration, i32),
    Headless,
    NeverReady,
    /// Requests cancellation the first time the process is polled.
    CancelOnPoll(CancelToken),
}

pub struct FakeMonitor {
    clock: Arc<FakeClock>,
    scripts: Mutex<HashMap<u32, (Script, Duration)>>,
    kills: Mutex<Vec<u32>>,
    attaches: AtomicUsize,
    open_watches: AtomicUsize,
    released: Mutex<HashSet<u32>>,
}

impl FakeMonitor {
    pub fn new(clock: Arc<FakeClock>) -> Self {
        Self {
            clock,
            scripts: Mutex::new(HashMap::new()),
            kills: Mutex::new(Vec::new()),
            attaches: AtomicUsize::new(0),
            open_watches: AtomicUsize::new(0),
            released: Mutex::new(HashSet::new()),
        }
    }

    /// Scripts are timed from the moment they are registered.
    pub fn script(&self, pid: u32, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(pid, (script, self.clock.elapsed()));
    }

    pub fn kills(&self) -> Vec<u32> {
        self.kills.lock().unwrap().clone()
    }

    pub fn attaches(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn open_watches(&self) -> usize {
        self.open_watches.load(Ordering::SeqCst)
    }

    fn lookup(&self, pid: u32) -> Option<(Script, Duration)> {
        let (script, start) = self.scripts.lock().unwrap().get(&pid).cloned()?;
        Some((script, self.clock.elapsed().saturating_sub(start)))
    }
}

impl ProcessMonitor for FakeMonitor {
    /// Like the OS, a process that exits after its last watch was dropped can no
    /// longer be opened by id.
    fn attach(&self, pid: u32) -> io::Result<Box<dyn WatchedProcess + '_>> {
        let gone = match self.lookup(pid) {
            None => true,
            Some((Script::ExitAfter(after, _), age)) => {
                age >= after && self.released.lock().unwrap().contains(&pid)
            }
            Some(_) => false,
        };
        if gone {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such process"));
        }

        self.attaches.fetch_add(1, Ordering::SeqCst);
        self.open_watches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeWatch { monitor: self, pid }))
    }
}

struct FakeWatch<'a> {
    monitor: &'a FakeMonitor,
    pid: u32,
}

impl WatchedProcess for FakeWatch<'_> {
    fn exit_code(&mut self) -> io::Result<Option<i32>> {
        match self.monitor.lookup(self.pid) {
            Some((Script::ExitAfter(after, code), age)) if age >= after => Ok(Some(code)),
            Some(_) => Ok(None),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "unknown pid")),
        }
    }

    fn wait_for_input_idle(&mut self, _timeout: Duration) -> InputIdle {
        match self.monitor.lookup(self.pid) {
            Some((Script::ReadyAfter(after), age)) if age >= after => InputIdle::Ready,
            Some((Script::Headless, _)) => InputIdle::NoMessageLoop,
            Some((Script::CancelOnPoll(token), _)) => {
                token.cancel();
                InputIdle::Busy
            }
            _ => InputIdle::Busy,
        }
    }

    fn kill(&mut self) -> io::Result<()> {
        self.monitor.kills.lock().unwrap().push(self.pid);
        Ok(())
    }
}

impl Drop for FakeWatch<'_> {
    fn drop(&mut self) {
        self.monitor.open_watches.fetch_sub(1, Ordering::SeqCst);
        self.monitor.released.lock().unwrap().insert(self.pid);
    }
}

/// Injector returning scripted pids keyed by the username in the command line.
#[derive(Default)]
pub struct FakeInjector {
    pub pids: HashMap<String, i32>,
    pub calls: Mutex<Vec<InjectCall>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InjectCall {
    pub command_line: String,
    pub working_dir: PathBuf,
    pub dll_path: PathBuf,
    pub entry_point: String,
}

impl FakeInjector {
    pub fn with_pid(mut self, username: &str, pid: i32) -> Self {
        self.pids.insert(username.to_string(), pid);
        self
    }

    pub fn calls(&self) -> Vec<InjectCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Injector for FakeInjector {
    fn launch_injected(
        &self,
        command_line: &str,
        working_dir: &Path,
        dll_path: &Path,
        entry_point: &str,
    ) -> i32 {
        self.calls.lock().unwrap().push(InjectCall {
            command_line: command_line.to_string(),
            working_dir: working_dir.to_path_buf(),
            dll_path: dll_path.to_path_buf(),
            entry_point: entry_point.to_string(),
        });

        self.pids
            .iter()
            .find(|(user, _)| command_line.contains(&format!("-a {} ", user)))
            .map(|(_, pid)| *pid)
            .unwrap_or(0)
    }
}

/// Scratch directory removed on drop.
pub struct TestDir {
    path: PathBuf,
}

impl TestDir {
    pub fn new(name: &str) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let unique = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "ac-launcher-{}-{}-{}",
            name,
            std::process::id(),
            unique
        ));
        std::fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

pub fn connection(id: &str, server_type: ServerType) -> ServerConnection {
    ServerConnection {
        id: id.to_string(),
        name: id.to_uppercase(),
        host: "127.0.0.1".to_string(),
        port: 9000,
        server_type,
    }
}

pub fn task(username: &str, order: u32, delay_seconds: u64) -> LaunchTask {
    LaunchTask {
        connection: connection("coldeve", ServerType::Ace),
        account: Account {
            username: username.to_string(),
            credential: Credential::Stored(Secret::new(format!("{}-pw", username))),
        },
        order,
        delay_seconds,
        notes: None,
    }
}

pub fn game_settings(client_path: impl Into<PathBuf>) -> GameSettings {
    GameSettings {
        client_path: client_path.into(),
        preferences_ini: None,
        multi_client: false,
        max_clients: DEFAULT_MAX_CLIENTS,
        launch_mode: LaunchMode::default(),
        injector_path: None,
        hook_dll_path: None,
        decal: DecalSettings::default(),
        verify: VerifySettings::default(),
    }
}

pub fn game_launcher(
    settings: GameSettings,
    api: Arc<FakeProcessApi>,
    injector: Arc<FakeInjector>,
    facility: PathBuf,
) -> GameLauncher {
    GameLauncher::new(
        settings,
        ProcessLauncher::new(api),
        InjectionProvider::new(injector, facility),
        Arc::new(ConfigCredentials),
    )
}

/// Keeps entries in memory, newest last.
#[derive(Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<(String, LaunchResult)>>,
}

impl MemoryHistory {
    pub fn entries(&self) -> Vec<(String, LaunchResult)> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl LaunchHistory for MemoryHistory {
    fn record(&self, task: &LaunchTask, result: &LaunchResult) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((task.account.username.clone(), result.clone()));
    }
}
