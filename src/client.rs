use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::GameSettings;
use crate::error::{InjectionError, LaunchError};
use crate::inject::{InjectionKind, InjectionProvider};
use crate::process::{ProcessLauncher, default_working_dir};
use crate::secret::{CredentialDecryptor, Secret};
use crate::task::{LaunchTask, ServerConnection, ServerType};

const MASK: &str = "****";

fn arguments(connection: &ServerConnection, username: &str, password: &str) -> String {
    match connection.server_type {
        ServerType::Ace => format!(
            "-a {} -v {} -h {}:{} -rodat off",
            username, password, connection.host, connection.port
        ),
        ServerType::Gdle => format!(
            "-h {} -p {} -a {}:{} -rodat off",
            connection.host, connection.port, username, password
        ),
    }
}

pub fn client_arguments(
    connection: &ServerConnection,
    username: &str,
    password: &Secret,
) -> Secret {
    Secret::new(arguments(connection, username, password.expose()))
}

/// Same shape as [`client_arguments`] with the password replaced, for logs.
pub fn masked_arguments(connection: &ServerConnection, username: &str) -> String {
    arguments(connection, username, MASK)
}

pub fn decal_wrapped(decal_path: &Path, arguments: &str) -> Secret {
    Secret::new(format!("/decal \"{}\" {}", decal_path.display(), arguments))
}

/// Starts one client for one task, picking plain, Decal or hooked launch.
pub struct GameLauncher {
    settings: GameSettings,
    processes: ProcessLauncher,
    injection: InjectionProvider,
    credentials: Arc<dyn CredentialDecryptor>,
}

impl GameLauncher {
    pub fn new(
        settings: GameSettings,
        processes: ProcessLauncher,
        injection: InjectionProvider,
        credentials: Arc<dyn CredentialDecryptor>,
    ) -> Self {
        Self {
            settings,
            processes,
            injection,
            credentials,
        }
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn injector_path(&self) -> &Path {
        self.injection.facility_path()
    }

    pub fn injection_kind(&self) -> InjectionKind {
        InjectionKind::select(self.settings.decal.enabled, self.settings.multi_client)
    }

    pub fn launch(&self, task: &LaunchTask) -> Result<u32, LaunchError> {
        let password = self.credentials.decrypt(&task.account)?;
        let username = &task.account.username;
        let mut arguments = client_arguments(&task.connection, username, &password);
        let mut logged = masked_arguments(&task.connection, username);

        let decal_path = self.settings.decal_dll_path().map(Path::to_path_buf);
        if let Some(decal) = &decal_path {
            if self.settings.decal.enabled && self.settings.decal.wrap_command_line {
                arguments = decal_wrapped(decal, arguments.expose());
                logged = format!("/decal \"{}\" {}", decal.display(), logged);
            }
        }

        let client = &self.settings.client_path;
        let working_dir = default_working_dir(client);
        let kind = self.injection_kind();

        info!(
            "Launching {} ({} server, {:?}): {}",
            task.label(),
            task.connection.server_type,
            kind,
            logged
        );

        let pid = match (kind.entry_point(), self.injection_dll(kind)) {
            (Some(entry), Some(dll)) => {
                self.injection
                    .launch(client, arguments.expose(), &working_dir, &dll, entry)?
            }
            (Some(_), None) => return Err(InjectionError::MissingDll(PathBuf::new()).into()),
            (None, _) => self.processes.launch(
                client,
                arguments.expose(),
                Some(&working_dir),
                self.settings.launch_mode,
            )?,
        };

        Ok(pid)
    }

    fn injection_dll(&self, kind: InjectionKind) -> Option<PathBuf> {
        match kind {
            InjectionKind::None => None,
            InjectionKind::Compatibility => self.settings.decal_dll_path().map(Path::to_path_buf),
            InjectionKind::MutexBypass => Some(self.settings.hook_dll_path()),
        }
    }
}
