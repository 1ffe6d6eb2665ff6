//! Launching the client through the external injector library.
//!
//! The injector starts the client itself, loads a DLL into it and calls an
//! exported entry point inside the new process. Two DLLs are used: the Decal
//! compatibility layer and the multi-client hook that disables the client's
//! single-instance check.

use libloading::{Library, Symbol};
use log::{info, warn};
use std::ffi::{CString, c_char};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::constants::{DECAL_ENTRY_POINT, HOOK_ENTRY_POINT, INJECTOR_EXPORT};
use crate::error::InjectionError;
use crate::process::command_line;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InjectionKind {
    None,
    Compatibility,
    MutexBypass,
}

impl InjectionKind {
    /// A compatibility layer wins because it can provide multi-instance support itself.
    pub fn select(compatibility_enabled: bool, multi_client: bool) -> Self {
        if compatibility_enabled {
            InjectionKind::Compatibility
        } else if multi_client {
            InjectionKind::MutexBypass
        } else {
            InjectionKind::None
        }
    }

    pub fn entry_point(self) -> Option<&'static str> {
        match self {
            InjectionKind::None => None,
            InjectionKind::Compatibility => Some(DECAL_ENTRY_POINT),
            InjectionKind::MutexBypass => Some(HOOK_ENTRY_POINT),
        }
    }
}

/// The native injector facility.
pub trait Injector: Send + Sync {
    /// Returns the new process id, or a value `<= 0` on failure.
    fn launch_injected(
        &self,
        command_line: &str,
        working_dir: &Path,
        dll_path: &Path,
        entry_point: &str,
    ) -> i32;
}

type LaunchInjectedFn =
    unsafe extern "system" fn(*const u16, *const u16, *const u16, *const c_char) -> i32;

/// Calls `LaunchInjected` from the injector library found at `path`.
pub struct NativeInjector {
    path: PathBuf,
}

impl NativeInjector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn wide(value: &str) -> Vec<u16> {
    value.encode_utf16().chain(std::iter::once(0)).collect()
}

impl Injector for NativeInjector {
    fn launch_injected(
        &self,
        command_line: &str,
        working_dir: &Path,
        dll_path: &Path,
        entry_point: &str,
    ) -> i32 {
        let lib = match unsafe { Library::new(&self.path) } {
            Ok(lib) => lib,
            Err(e) => {
                warn!("Could not load injector {}: {}", self.path.display(), e);
                return 0;
            }
        };

        let launch: Symbol<LaunchInjectedFn> = match unsafe { lib.get(INJECTOR_EXPORT) } {
            Ok(symbol) => symbol,
            Err(e) => {
                warn!("Injector {} has no LaunchInjected export: {}", self.path.display(), e);
                return 0;
            }
        };

        let Ok(entry_point) = CString::new(entry_point) else {
            warn!("Entry point name contains a NUL byte");
            return 0;
        };

        let mut command_line = wide(command_line);
        let working_dir = wide(&working_dir.to_string_lossy());
        let dll_path = wide(&dll_path.to_string_lossy());

        let pid = unsafe {
            launch(
                command_line.as_ptr(),
                working_dir.as_ptr(),
                dll_path.as_ptr(),
                entry_point.as_ptr(),
            )
        };

        // the command line carries the account password
        for unit in command_line.iter_mut() {
            unsafe { std::ptr::write_volatile(unit, 0) };
        }

        pid
    }
}

pub struct InjectionProvider {
    injector: Arc<dyn Injector>,
    facility_path: PathBuf,
}

impl InjectionProvider {
    pub fn new(injector: Arc<dyn Injector>, facility_path: impl Into<PathBuf>) -> Self {
        Self {
            injector,
            facility_path: facility_path.into(),
        }
    }

    pub fn facility_path(&self) -> &Path {
        &self.facility_path
    }

    pub fn launch(
        &self,
        executable: &Path,
        arguments: &str,
        working_dir: &Path,
        dll_path: &Path,
        entry_point: &str,
    ) -> Result<u32, InjectionError> {
        if !self.facility_path.is_file() {
            return Err(InjectionError::MissingFacility(self.facility_path.clone()));
        }

        if !dll_path.is_file() {
            return Err(InjectionError::MissingDll(dll_path.to_path_buf()));
        }

        let command_line = command_line(executable, arguments);
        let pid = self.injector.launch_injected(
            command_line.expose(),
            working_dir,
            dll_path,
            entry_point,
        );

        if pid <= 0 {
            warn!(
                "Injector returned {} for {} with {}",
                pid,
                executable.display(),
                dll_path.display()
            );
            return Err(InjectionError::Failed(dll_path.to_path_buf()));
        }

        info!(
            "Started {} with pid {} and injected {}",
            executable.display(),
            pid,
            dll_path.display()
        );
        Ok(pid as u32)
    }
}
