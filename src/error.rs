use std::path::PathBuf;

use thiserror::Error;

use crate::secret::CredentialError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Multi-client mode is disabled, enable it before launching a sequence")]
    MultiClientDisabled,

    #[error(
        "ComputeUniquePort is not enabled in {0}, set it to True under [Net] to run several clients"
    )]
    UniquePortDisabled(PathBuf),

    #[error("Game client not found at {0}")]
    ClientNotFound(PathBuf),

    #[error("A launch sequence needs at least 2 tasks, got {0}")]
    TooFewTasks(usize),

    #[error("Too many launch tasks: {count} exceeds the configured maximum of {max}")]
    TooManyTasks { count: usize, max: usize },

    #[error("Injector not found at {0}")]
    InjectorNotFound(PathBuf),

    #[error("Multi-client hook DLL not found at {0}")]
    HookDllNotFound(PathBuf),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpawnError {
    #[error("Game client not found: {0}")]
    NotFound(PathBuf),

    #[error("Access denied starting {0}, try running the launcher with matching privileges")]
    AccessDenied(PathBuf),

    #[error("Could not start {path} (OS error {code})")]
    Os { path: PathBuf, code: i32 },

    #[error("Suspended launch is not supported on this platform")]
    Unsupported,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InjectionError {
    #[error("Injector not found at {0}")]
    MissingFacility(PathBuf),

    #[error("Injection DLL not found at {0}")]
    MissingDll(PathBuf),

    #[error("Injector failed to launch the client with {0}")]
    Failed(PathBuf),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Client crashed immediately after launch (exit code {exit_code})")]
    CrashedEarly { exit_code: i32 },

    #[error("Client failed to start (exit code {exit_code}) after {elapsed_secs}s")]
    FailedLater { exit_code: i32, elapsed_secs: u64 },

    #[error("Client did not become ready within {timeout_secs}s, it may still be loading")]
    TimedOut { timeout_secs: u64 },
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Injection(#[from] InjectionError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Launch cancelled")]
    Cancelled,

    #[error("A launch sequence is already running")]
    SequenceInProgress,
}
