use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::client::GameLauncher;
use crate::clock::Clock;
use crate::error::{ConfigurationError, LaunchError};
use crate::events::{EventSink, LaunchEvent};
use crate::history::LaunchHistory;
use crate::inject::InjectionKind;
use crate::preferences::unique_port_enabled;
use crate::task::{LaunchResult, LaunchSequenceResult, LaunchTask};
use crate::verify::{LaunchVerifier, Verification};

#[derive(Copy, Clone, Debug, Default)]
pub struct SequenceOptions {
    pub abort_on_failure: bool,
}

/// Clears the running flag when a run ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct LaunchSequencer {
    launcher: GameLauncher,
    verifier: LaunchVerifier,
    clock: Arc<dyn Clock>,
    history: Arc<dyn LaunchHistory>,
    events: EventSink<LaunchEvent>,
    running: AtomicBool,
}

impl LaunchSequencer {
    pub fn new(
        launcher: GameLauncher,
        verifier: LaunchVerifier,
        clock: Arc<dyn Clock>,
        history: Arc<dyn LaunchHistory>,
    ) -> Self {
        Self {
            launcher,
            verifier,
            clock,
            history,
            events: EventSink::disabled(),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_events(mut self, events: EventSink<LaunchEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn validate(&self, tasks: &[LaunchTask]) -> Result<(), ConfigurationError> {
        let settings = self.launcher.settings();

        if !settings.multi_client {
            return Err(ConfigurationError::MultiClientDisabled);
        }

        let ini = settings.preferences_ini();
        if !unique_port_enabled(&ini) {
            return Err(ConfigurationError::UniquePortDisabled(ini));
        }

        if !settings.client_path.exists() {
            return Err(ConfigurationError::ClientNotFound(
                settings.client_path.clone(),
            ));
        }

        if tasks.len() < 2 {
            return Err(ConfigurationError::TooFewTasks(tasks.len()));
        }

        if tasks.len() > settings.max_clients {
            return Err(ConfigurationError::TooManyTasks {
                count: tasks.len(),
                max: settings.max_clients,
            });
        }

        let injector = self.launcher.injector_path();
        if !injector.is_file() {
            return Err(ConfigurationError::InjectorNotFound(injector.to_path_buf()));
        }

        if self.launcher.injection_kind() == InjectionKind::MutexBypass {
            let hook = settings.hook_dll_path();
            if !hook.is_file() {
                return Err(ConfigurationError::HookDllNotFound(hook));
            }
        }

        Ok(())
    }

    pub fn run(
        &self,
        mut tasks: Vec<LaunchTask>,
        options: SequenceOptions,
        cancel: &CancelToken,
    ) -> Result<LaunchSequenceResult, LaunchError> {
        let _guard = RunningGuard::acquire(&self.running).ok_or(LaunchError::SequenceInProgress)?;

        self.validate(&tasks)?;
        tasks.sort_by_key(|t| t.order);

        let started = self.clock.now();
        let total = tasks.len();
        let mut summary = LaunchSequenceResult {
            total_tasks: total,
            ..Default::default()
        };

        info!("Launching {} clients", total);

        for (index, task) in tasks.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.was_cancelled = true;
                break;
            }

            let label = task.label();
            self.events.emit(LaunchEvent::TaskStarted {
                index,
                total,
                label: label.clone(),
            });

            let result = self.run_task(task, cancel);
            self.history.record(task, &result);

            if result.was_cancelled() {
                summary.was_cancelled = true;
            } else if result.is_success() {
                summary.success_count += 1;
            } else {
                summary.failure_count += 1;
                summary.errors.push(format!(
                    "{}: {}",
                    label,
                    result.error().unwrap_or("unknown error")
                ));
            }

            let failed = !result.is_success();
            self.events.emit(LaunchEvent::TaskCompleted {
                index,
                total,
                label,
                result,
            });

            if summary.was_cancelled {
                break;
            }

            if failed && options.abort_on_failure {
                warn!(
                    "Aborting the remaining {} tasks after a failure",
                    total - index - 1
                );
                break;
            }

            if index + 1 < total && task.delay_seconds > 0 {
                debug!("Waiting {}s before the next client", task.delay_seconds);
                if self
                    .clock
                    .sleep(Duration::from_secs(task.delay_seconds), cancel)
                {
                    summary.was_cancelled = true;
                    break;
                }
            }
        }

        summary.duration = self.clock.now().saturating_duration_since(started);
        info!("Launch sequence finished: {}", summary);
        self.events
            .emit(LaunchEvent::SequenceCompleted(summary.clone()));

        Ok(summary)
    }

    fn run_task(&self, task: &LaunchTask, cancel: &CancelToken) -> LaunchResult {
        let pid = match self.launcher.launch(task) {
            Ok(pid) => pid,
            Err(e) => {
                warn!("Could not launch {}: {}", task.label(), e);
                return LaunchResult::failure(&task.connection, e.to_string());
            }
        };

        match self.verifier.verify(pid, cancel, &self.events, false) {
            Verification::Cancelled => LaunchResult::cancelled(&task.connection, Some(pid)),
            outcome => match outcome.into_result() {
                Ok(()) => LaunchResult::success(&task.connection, pid),
                Err(e) => LaunchResult::failure_with_process(&task.connection, pid, e.to_string()),
            },
        }
    }
}
