use log::debug;
use std::collections::HashMap;
use std::io;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use crate::process::{
    InputIdle, ProcessApi, ProcessMonitor, RawHandle, SpawnRequest, SuspendedProcess,
    WatchedProcess,
};

#[derive(Default)]
pub struct NativeProcesses {
    children: Mutex<HashMap<u32, Child>>,
}

impl NativeProcesses {
    pub fn new() -> Self {
        Self::default()
    }

    fn children(&self) -> MutexGuard<'_, HashMap<u32, Child>> {
        self.children.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `None` when `pid` is not a child of this launcher. Exited children are
    /// dropped from the map.
    fn try_wait_child(&self, pid: u32) -> Option<io::Result<Option<i32>>> {
        let mut children = self.children();
        let status = match children.get_mut(&pid)?.try_wait() {
            Ok(status) => status,
            Err(e) => return Some(Err(e)),
        };

        if status.is_some() {
            children.remove(&pid);
            debug!("Released exited pid {}", pid);
        }

        Some(Ok(status.map(|status| status.code().unwrap_or(-1))))
    }
}

impl ProcessApi for NativeProcesses {
    fn spawn(&self, request: &SpawnRequest) -> io::Result<u32> {
        let mut cmd = Command::new(request.executable);

        #[cfg(windows)]
        {
            cmd.raw_arg(request.arguments);
        }

        #[cfg(not(windows))]
        {
            let args = shlex::split(request.arguments).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "Invalid client arguments")
            })?;
            cmd.args(args);
        }

        cmd.current_dir(request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = cmd.spawn()?;
        let pid = child.id();
        self.children().insert(pid, child);
        Ok(pid)
    }

    fn create_suspended(&self, request: &SpawnRequest) -> io::Result<SuspendedProcess> {
        #[cfg(windows)]
        {
            win::create_suspended(request)
        }

        #[cfg(not(windows))]
        {
            let _ = request;
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "suspended launch needs Windows",
            ))
        }
    }

    fn resume_thread(&self, thread: RawHandle) -> io::Result<()> {
        #[cfg(windows)]
        {
            win::resume_thread(thread)
        }

        #[cfg(not(windows))]
        {
            let _ = thread;
            Err(io::Error::from(io::ErrorKind::Unsupported))
        }
    }

    fn terminate(&self, process: RawHandle) -> io::Result<()> {
        #[cfg(windows)]
        {
            win::terminate_handle(process)
        }

        #[cfg(not(windows))]
        {
            let _ = process;
            Err(io::Error::from(io::ErrorKind::Unsupported))
        }
    }

    fn close_handle(&self, handle: RawHandle) {
        #[cfg(windows)]
        win::close_handle(handle);

        #[cfg(not(windows))]
        let _ = handle;
    }
}

impl ProcessMonitor for NativeProcesses {
    fn attach(&self, pid: u32) -> io::Result<Box<dyn WatchedProcess + '_>> {
        #[cfg(windows)]
        let handle = win::Opened::open(pid, win::WATCH_ACCESS)?;

        #[cfg(not(windows))]
        if !self.children().contains_key(&pid) {
            return Err(not_tracked(pid));
        }

        debug!("Watching pid {}", pid);
        Ok(Box::new(Watched {
            owner: self,
            pid,
            exited: None,
            #[cfg(windows)]
            handle,
        }))
    }
}

#[cfg(not(windows))]
fn not_tracked(pid: u32) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("pid {} was not started by this launcher", pid),
    )
}

struct Watched<'a> {
    owner: &'a NativeProcesses,
    pid: u32,
    exited: Option<i32>,
    #[cfg(windows)]
    handle: win::Opened,
}

impl WatchedProcess for Watched<'_> {
    fn exit_code(&mut self) -> io::Result<Option<i32>> {
        if self.exited.is_some() {
            return Ok(self.exited);
        }

        let code = match self.owner.try_wait_child(self.pid) {
            Some(code) => code?,
            None => {
                #[cfg(windows)]
                {
                    win::exit_code(&self.handle)?
                }

                #[cfg(not(windows))]
                {
                    return Err(not_tracked(self.pid))
                }
            }
        };

        self.exited = code;
        Ok(code)
    }

    fn wait_for_input_idle(&mut self, timeout: Duration) -> InputIdle {
        #[cfg(windows)]
        {
            win::wait_for_input_idle(&self.handle, timeout)
        }

        #[cfg(not(windows))]
        {
            debug!("No input-idle signal for pid {} on this platform", self.pid);
            std::thread::sleep(timeout);
            InputIdle::NoMessageLoop
        }
    }

    fn kill(&mut self) -> io::Result<()> {
        if let Some(mut child) = self.owner.children().remove(&self.pid) {
            child.kill()?;
            let _ = child.wait();
            debug!("Killed pid {}", self.pid);
            return Ok(());
        }

        #[cfg(windows)]
        {
            win::terminate(&self.handle)
        }

        #[cfg(not(windows))]
        {
            Err(not_tracked(self.pid))
        }
    }
}

impl Drop for Watched<'_> {
    fn drop(&mut self) {
        // A client left running keeps going, only our copy of its handles goes
        self.owner.children().remove(&self.pid);
    }
}

#[cfg(windows)]
mod win {
    use log::debug;
    use std::io;
    use std::time::Duration;
    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, WAIT_TIMEOUT};
    use windows_sys::Win32::System::Threading::{
        CREATE_SUSPENDED, CreateProcessW, GetExitCodeProcess, OpenProcess, PROCESS_INFORMATION,
        PROCESS_QUERY_INFORMATION, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_SYNCHRONIZE,
        PROCESS_TERMINATE, ResumeThread, STARTUPINFOW, TerminateProcess,
    };
    use windows_sys::Win32::UI::WindowsAndMessaging::WaitForInputIdle;

    use crate::process::{InputIdle, RawHandle, SpawnRequest, SuspendedProcess};

    const STILL_ACTIVE: u32 = 259;

    pub const WATCH_ACCESS: u32 = PROCESS_QUERY_LIMITED_INFORMATION
        | PROCESS_QUERY_INFORMATION
        | PROCESS_SYNCHRONIZE
        | PROCESS_TERMINATE;

    /// Handle from `OpenProcess`, closed on drop.
    pub struct Opened(HANDLE);

    impl Opened {
        pub fn open(pid: u32, access: u32) -> io::Result<Self> {
            let handle = unsafe { OpenProcess(access, 0, pid) };
            if handle.is_null() {
                Err(io::Error::last_os_error())
            } else {
                Ok(Self(handle))
            }
        }
    }

    impl Drop for Opened {
        fn drop(&mut self) {
            unsafe { CloseHandle(self.0) };
        }
    }

    fn wide(value: &str) -> Vec<u16> {
        value.encode_utf16().chain(std::iter::once(0)).collect()
    }

    pub fn create_suspended(request: &SpawnRequest) -> io::Result<SuspendedProcess> {
        // CreateProcessW may write into the command line buffer
        let mut command_line = wide(request.command_line);
        let working_dir = wide(&request.working_dir.to_string_lossy());

        let mut startup: STARTUPINFOW = unsafe { std::mem::zeroed() };
        startup.cb = std::mem::size_of::<STARTUPINFOW>() as u32;
        let mut info: PROCESS_INFORMATION = unsafe { std::mem::zeroed() };

        let created = unsafe {
            CreateProcessW(
                std::ptr::null(),
                command_line.as_mut_ptr(),
                std::ptr::null(),
                std::ptr::null(),
                0,
                CREATE_SUSPENDED,
                std::ptr::null(),
                working_dir.as_ptr(),
                &startup,
                &mut info,
            )
        };
        let error = io::Error::last_os_error();

        for unit in command_line.iter_mut() {
            unsafe { std::ptr::write_volatile(unit, 0) };
        }

        if created == 0 {
            return Err(error);
        }

        debug!("Created suspended pid {}", info.dwProcessId);
        Ok(SuspendedProcess {
            process: RawHandle(info.hProcess as usize),
            thread: RawHandle(info.hThread as usize),
            pid: info.dwProcessId,
        })
    }

    pub fn resume_thread(thread: RawHandle) -> io::Result<()> {
        if unsafe { ResumeThread(thread.0 as HANDLE) } == u32::MAX {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn terminate_handle(process: RawHandle) -> io::Result<()> {
        if unsafe { TerminateProcess(process.0 as HANDLE, 1) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn close_handle(handle: RawHandle) {
        unsafe { CloseHandle(handle.0 as HANDLE) };
    }

    pub fn exit_code(process: &Opened) -> io::Result<Option<i32>> {
        let mut code = 0u32;
        if unsafe { GetExitCodeProcess(process.0, &mut code) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((code != STILL_ACTIVE).then_some(code as i32))
    }

    pub fn wait_for_input_idle(process: &Opened, timeout: Duration) -> InputIdle {
        match unsafe { WaitForInputIdle(process.0, timeout.as_millis() as u32) } {
            0 => InputIdle::Ready,
            WAIT_TIMEOUT => InputIdle::Busy,
            _ => InputIdle::NoMessageLoop,
        }
    }

    pub fn terminate(process: &Opened) -> io::Result<()> {
        if unsafe { TerminateProcess(process.0, 1) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
