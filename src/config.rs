use anyhow::{Context, bail};
use log::info;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::constants::{
    DEFAULT_MAX_CLIENTS, HOOK_DLL_FILE_NAME, INJECTOR_FILE_NAME, MAX_TASK_DELAY_SECONDS,
    VERIFY_CRASH_WINDOW_SECONDS, VERIFY_HEADLESS_TICKS, VERIFY_POLL_INTERVAL_MS,
    VERIFY_TIMEOUT_SECONDS,
};
use crate::process::LaunchMode;
use crate::secret::Secret;
use crate::task::{Account, Credential, LaunchTask, ServerConnection, ServerType};

#[derive(Deserialize, Clone, Debug, Default)]
pub struct DecalSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub inject_path: Option<PathBuf>,
    #[serde(default)]
    pub wrap_command_line: bool,
}

#[derive(Deserialize, Clone, Debug)]
pub struct VerifySettings {
    #[serde(default = "default_verify_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_crash_window")]
    pub crash_window_seconds: u64,
    #[serde(default = "default_headless_ticks")]
    pub headless_ticks: u32,
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            timeout_seconds: VERIFY_TIMEOUT_SECONDS,
            poll_interval_ms: VERIFY_POLL_INTERVAL_MS,
            crash_window_seconds: VERIFY_CRASH_WINDOW_SECONDS,
            headless_ticks: VERIFY_HEADLESS_TICKS,
        }
    }
}

fn default_verify_timeout() -> u64 {
    VERIFY_TIMEOUT_SECONDS
}

fn default_poll_interval() -> u64 {
    VERIFY_POLL_INTERVAL_MS
}

fn default_crash_window() -> u64 {
    VERIFY_CRASH_WINDOW_SECONDS
}

fn default_headless_ticks() -> u32 {
    VERIFY_HEADLESS_TICKS
}

fn default_max_clients() -> usize {
    DEFAULT_MAX_CLIENTS
}

#[derive(Deserialize, Clone, Debug)]
pub struct GameSettings {
    pub client_path: PathBuf,
    #[serde(default)]
    pub preferences_ini: Option<PathBuf>,
    #[serde(default)]
    pub multi_client: bool,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    #[serde(default)]
    pub launch_mode: LaunchMode,
    #[serde(default)]
    pub injector_path: Option<PathBuf>,
    #[serde(default)]
    pub hook_dll_path: Option<PathBuf>,
    #[serde(default)]
    pub decal: DecalSettings,
    #[serde(default)]
    pub verify: VerifySettings,
}

impl GameSettings {
    pub fn injector_path(&self) -> PathBuf {
        self.injector_path
            .clone()
            .unwrap_or_else(|| application_dir().join(INJECTOR_FILE_NAME))
    }

    pub fn hook_dll_path(&self) -> PathBuf {
        self.hook_dll_path
            .clone()
            .unwrap_or_else(|| application_dir().join(HOOK_DLL_FILE_NAME))
    }

    pub fn preferences_ini(&self) -> PathBuf {
        self.preferences_ini
            .clone()
            .unwrap_or_else(default_preferences_ini)
    }

    pub fn decal_dll_path(&self) -> Option<&Path> {
        self.decal.inject_path.as_deref()
    }
}

/// Directory holding the launcher executable; helper DLLs live next to it.
pub fn application_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_preferences_ini() -> PathBuf {
    let home = env::var_os("USERPROFILE")
        .or_else(|| env::var_os("HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    home.join("Documents")
        .join("Asheron's Call")
        .join("UserPreferences.ini")
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerEntry {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub server_type: ServerType,
}

impl ServerEntry {
    pub fn connection(&self) -> ServerConnection {
        ServerConnection {
            id: self.id.clone(),
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port,
            server_type: self.server_type,
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct AccountEntry {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_env: Option<String>,
}

impl AccountEntry {
    pub fn account(&self) -> Account {
        let credential = match (&self.password_env, &self.password) {
            (Some(var), _) => Credential::Env(var.clone()),
            (None, Some(password)) => Credential::Stored(Secret::new(password.as_str())),
            (None, None) => Credential::Stored(Secret::default()),
        };

        Account {
            username: self.username.clone(),
            credential,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct TaskEntry {
    pub server: String,
    pub account: String,
    pub order: u32,
    #[serde(default)]
    pub delay_seconds: u64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Deserialize, Clone)]
pub struct Config {
    pub game: GameSettings,
    #[serde(default)]
    pub servers: Vec<ServerEntry>,
    #[serde(default)]
    pub accounts: Vec<AccountEntry>,
    #[serde(default)]
    pub tasks: Vec<TaskEntry>,
}

impl Config {
    pub fn server(&self, id: &str) -> Option<&ServerEntry> {
        self.servers.iter().find(|s| s.id == id)
    }

    pub fn account(&self, username: &str) -> Option<&AccountEntry> {
        self.accounts.iter().find(|a| a.username == username)
    }

    pub fn task(
        &self,
        username: &str,
        server_id: &str,
        order: u32,
        delay_seconds: u64,
        notes: Option<String>,
    ) -> anyhow::Result<LaunchTask> {
        let server = self
            .server(server_id)
            .context(format!("Unknown server {}", server_id))?;
        let account = self
            .account(username)
            .context(format!("Unknown account {}", username))?;

        Ok(LaunchTask {
            connection: server.connection(),
            account: account.account(),
            order,
            delay_seconds,
            notes,
        })
    }

    pub fn launch_tasks(&self) -> anyhow::Result<Vec<LaunchTask>> {
        self.tasks
            .iter()
            .map(|t| {
                self.task(
                    &t.account,
                    &t.server,
                    t.order,
                    t.delay_seconds,
                    t.notes.clone(),
                )
            })
            .collect()
    }
}

pub fn get_config(filename: &str) -> anyhow::Result<Config> {
    let cwd = env::current_dir()?;
    let tmp_path = cwd.join(filename);
    let config_file_path = tmp_path.to_str().context(format!(
        "Could not create String from Path {}",
        tmp_path.display()
    ))?;

    info!("Loading config file {}", config_file_path);

    let settings = config::Config::builder()
        .add_source(config::File::new(
            config_file_path,
            config::FileFormat::Yaml,
        ))
        .build()
        .context(format!("Could not find config file {}", filename))?;

    let config = settings
        .try_deserialize::<Config>()
        .context(format!("Could not parse config file {}", filename))?;

    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> anyhow::Result<()> {
    if config.game.client_path.as_os_str().is_empty() {
        bail!("Game client path cannot be empty");
    }

    if config.game.max_clients < 2 {
        bail!("max_clients must be at least 2");
    }

    let verify = &config.game.verify;
    if verify.timeout_seconds == 0 || verify.poll_interval_ms == 0 || verify.headless_ticks == 0 {
        bail!("Verification timings must be greater than 0");
    }

    if config.game.decal.enabled && config.game.decal.inject_path.is_none() {
        bail!("Decal is enabled but decal.inject_path is not set");
    }

    for server in &config.servers {
        if server.id.trim().is_empty() {
            bail!("Server id cannot be empty");
        }

        if server.name.trim().is_empty() {
            bail!("Server name cannot be empty");
        }

        if server.host.trim().is_empty() {
            bail!("Server {} host cannot be empty", server.id);
        }

        if server.port == 0 {
            bail!("Server {} port must be greater than 0", server.id);
        }
    }

    for account in &config.accounts {
        if account.username.trim().is_empty() {
            bail!("Account username cannot be empty");
        }
    }

    for task in &config.tasks {
        if task.order == 0 {
            bail!("Task order for {} must be greater than 0", task.account);
        }

        if task.delay_seconds > MAX_TASK_DELAY_SECONDS {
            bail!(
                "Task delay for {} cannot exceed {} seconds",
                task.account,
                MAX_TASK_DELAY_SECONDS
            );
        }

        if config.server(&task.server).is_none() {
            bail!("Task for {} references unknown server {}", task.account, task.server);
        }

        if config.account(&task.account).is_none() {
            bail!("Task references unknown account {}", task.account);
        }
    }

    Ok(())
}
