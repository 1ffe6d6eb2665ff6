pub const DEFAULT_CONFIG_FILE: &str = "launcher.yaml";
pub const DEFAULT_MAX_CLIENTS: usize = 12;
pub const MAX_TASK_DELAY_SECONDS: u64 = 30;

pub const VERIFY_TIMEOUT_SECONDS: u64 = 30;
pub const VERIFY_POLL_INTERVAL_MS: u64 = 1000;
pub const VERIFY_CRASH_WINDOW_SECONDS: u64 = 5;
pub const VERIFY_HEADLESS_TICKS: u32 = 3;
pub const INPUT_IDLE_PROBE_MS: u64 = 100;

pub const PROBE_TIMEOUT_SECONDS: u64 = 3;
pub const PROBE_ONLINE_INTERVAL_SECONDS: u64 = 60;
pub const PROBE_OFFLINE_INTERVAL_SECONDS: u64 = 15;
pub const PROBE_MIN_RESPONSE_BYTES: usize = 4;
pub const MAX_PLAUSIBLE_PLAYERS: u32 = 1000;

pub const INJECTOR_FILE_NAME: &str = "injector.dll";
pub const INJECTOR_EXPORT: &[u8] = b"LaunchInjected";
pub const HOOK_DLL_FILE_NAME: &str = "ac_multiclient_hook.dll";
pub const HOOK_ENTRY_POINT: &str = "HookStartup";
pub const DECAL_ENTRY_POINT: &str = "DecalStartup";

pub const PREFERENCES_SECTION: &str = "Net";
pub const PREFERENCES_UNIQUE_PORT_KEY: &str = "ComputeUniquePort";
