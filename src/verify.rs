//! Polls a freshly started client until it is ready, exits, or runs out of time.
//!
//! A client that has not pumped its message loop yet is still loading. One that
//! has no message loop at all (started headless) never reports idle, so a few
//! consecutive ticks of that are accepted as ready.

use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::config::VerifySettings;
use crate::constants::INPUT_IDLE_PROBE_MS;
use crate::error::{LaunchError, VerificationError};
use crate::events::{EventSink, LaunchEvent};
use crate::process::{InputIdle, ProcessMonitor};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VerifyOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub crash_window: Duration,
    pub headless_ticks: u32,
    pub idle_probe: Duration,
}

impl From<&VerifySettings> for VerifyOptions {
    fn from(settings: &VerifySettings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.timeout_seconds),
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            crash_window: Duration::from_secs(settings.crash_window_seconds),
            headless_ticks: settings.headless_ticks,
            idle_probe: Duration::from_millis(INPUT_IDLE_PROBE_MS),
        }
    }
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self::from(&VerifySettings::default())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Verification {
    Ready { elapsed: Duration },
    CrashedEarly { exit_code: i32, elapsed: Duration },
    FailedLater { exit_code: i32, elapsed: Duration },
    TimedOut { timeout: Duration },
    Cancelled,
}

impl Verification {
    pub fn into_result(self) -> Result<(), LaunchError> {
        match self {
            Verification::Ready { .. } => Ok(()),
            Verification::CrashedEarly { exit_code, .. } => {
                Err(VerificationError::CrashedEarly { exit_code }.into())
            }
            Verification::FailedLater { exit_code, elapsed } => {
                Err(VerificationError::FailedLater {
                    exit_code,
                    elapsed_secs: elapsed.as_secs(),
                }
                .into())
            }
            Verification::TimedOut { timeout } => Err(VerificationError::TimedOut {
                timeout_secs: timeout.as_secs(),
            }
            .into()),
            Verification::Cancelled => Err(LaunchError::Cancelled),
        }
    }
}

pub struct LaunchVerifier {
    monitor: Arc<dyn ProcessMonitor>,
    clock: Arc<dyn Clock>,
    options: VerifyOptions,
}

impl LaunchVerifier {
    pub fn new(
        monitor: Arc<dyn ProcessMonitor>,
        clock: Arc<dyn Clock>,
        options: VerifyOptions,
    ) -> Self {
        Self {
            monitor,
            clock,
            options,
        }
    }

    /// Progress events are only sent when `report_progress` is set.
    pub fn verify(
        &self,
        pid: u32,
        cancel: &CancelToken,
        events: &EventSink<LaunchEvent>,
        report_progress: bool,
    ) -> Verification {
        let started = self.clock.now();
        let mut headless_ticks = 0;

        debug!("Verifying pid {}", pid);

        // Held for the whole loop so the exit code outlives the process
        let mut process = match self.monitor.attach(pid) {
            Ok(process) => process,
            Err(e) => {
                warn!("Could not attach to pid {}: {}", pid, e);
                return Verification::CrashedEarly {
                    exit_code: -1,
                    elapsed: Duration::ZERO,
                };
            }
        };

        loop {
            let elapsed = self.clock.now().saturating_duration_since(started);

            if elapsed >= self.options.timeout {
                warn!(
                    "pid {} not ready after {}s, leaving it running",
                    pid,
                    self.options.timeout.as_secs()
                );
                return Verification::TimedOut {
                    timeout: self.options.timeout,
                };
            }

            if cancel.is_cancelled() {
                info!("Launch cancelled, stopping pid {}", pid);
                if let Err(e) = process.kill() {
                    warn!("Could not stop pid {}: {}", pid, e);
                }
                return Verification::Cancelled;
            }

            let exit_code = match process.exit_code() {
                Ok(code) => code,
                Err(e) => {
                    warn!("Lost track of pid {}: {}", pid, e);
                    Some(-1)
                }
            };

            if let Some(exit_code) = exit_code {
                return if elapsed < self.options.crash_window {
                    warn!("pid {} crashed after launch with exit code {}", pid, exit_code);
                    Verification::CrashedEarly { exit_code, elapsed }
                } else {
                    warn!(
                        "pid {} exited with code {} after {}s",
                        pid,
                        exit_code,
                        elapsed.as_secs()
                    );
                    Verification::FailedLater { exit_code, elapsed }
                };
            }

            if report_progress {
                events.emit(LaunchEvent::Progress {
                    elapsed,
                    total: self.options.timeout,
                    status: format!(
                        "Waiting for client to load ({}s/{}s)",
                        elapsed.as_secs(),
                        self.options.timeout.as_secs()
                    ),
                });
            }

            match process.wait_for_input_idle(self.options.idle_probe) {
                InputIdle::Ready => {
                    info!("pid {} ready after {}s", pid, elapsed.as_secs());
                    return Verification::Ready { elapsed };
                }
                InputIdle::NoMessageLoop => {
                    headless_ticks += 1;
                    if headless_ticks >= self.options.headless_ticks {
                        info!("pid {} has no message loop, treating it as ready", pid);
                        return Verification::Ready { elapsed };
                    }
                }
                InputIdle::Busy => headless_ticks = 0,
            }

            self.clock.sleep(self.options.poll_interval, cancel);
        }
    }
}
