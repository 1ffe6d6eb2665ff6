use anyhow::{Context, bail};
use log::{info, warn};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::client::GameLauncher;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::events::{EventSink, LaunchEvent, ProbeEvent};
use crate::history::LogHistory;
use crate::inject::{InjectionProvider, NativeInjector};
use crate::native::NativeProcesses;
use crate::probe::{ServerProbe, StatusCache, UdpPinger};
use crate::process::ProcessLauncher;
use crate::secret::ConfigCredentials;
use crate::sequence::{LaunchSequencer, SequenceOptions};
use crate::task::ServerConnection;
use crate::verify::{LaunchVerifier, VerifyOptions};

/// Wires the real OS bindings together for one command invocation.
struct Launch {
    launcher: GameLauncher,
    verifier: LaunchVerifier,
    clock: Arc<dyn Clock>,
}

impl Launch {
    fn new(config: &Config) -> Self {
        let settings = config.game.clone();
        let native = Arc::new(NativeProcesses::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let injector_path = settings.injector_path();
        let verify = VerifyOptions::from(&settings.verify);

        let launcher = GameLauncher::new(
            settings,
            ProcessLauncher::new(native.clone()),
            InjectionProvider::new(
                Arc::new(NativeInjector::new(injector_path.clone())),
                injector_path,
            ),
            Arc::new(ConfigCredentials),
        );

        Self {
            launcher,
            verifier: LaunchVerifier::new(native, clock.clone(), verify),
            clock,
        }
    }
}

fn print_launch_event(event: &LaunchEvent) {
    match event {
        LaunchEvent::Progress { status, .. } => println!("  {}", status),
        LaunchEvent::TaskStarted {
            index,
            total,
            label,
        } => println!("[{}/{}] Launching {}", index + 1, total, label),
        LaunchEvent::TaskCompleted {
            index,
            total,
            label,
            result,
        } => match (result.is_success(), result.process_id()) {
            (true, Some(pid)) => println!("[{}/{}] {} running as pid {}", index + 1, total, label, pid),
            _ => println!(
                "[{}/{}] {} failed: {}",
                index + 1,
                total,
                label,
                result.error().unwrap_or("unknown error")
            ),
        },
        LaunchEvent::SequenceCompleted(summary) => println!("{}", summary),
    }
}

/// Prints events on a separate thread until every sender is gone.
fn spawn_printer<E: Send + 'static>(
    rx: mpsc::Receiver<E>,
    print: fn(&E),
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for event in rx {
            print(&event);
        }
    })
}

pub fn run_sequence(
    config: &Config,
    abort_on_failure: bool,
    cancel: &CancelToken,
) -> anyhow::Result<()> {
    let tasks = config.launch_tasks()?;
    let launch = Launch::new(config);
    let (tx, rx) = mpsc::channel();
    let printer = spawn_printer(rx, print_launch_event);

    let summary = {
        let sequencer = LaunchSequencer::new(
            launch.launcher,
            launch.verifier,
            launch.clock,
            Arc::new(LogHistory),
        )
        .with_events(EventSink::new(tx));

        sequencer.run(tasks, SequenceOptions { abort_on_failure }, cancel)
    };

    let _ = printer.join();
    let summary = summary?;

    if !summary.success() {
        bail!("Launch sequence did not complete: {}", summary);
    }

    Ok(())
}

pub fn run_launch(
    config: &Config,
    username: &str,
    server_id: &str,
    cancel: &CancelToken,
) -> anyhow::Result<()> {
    let task = config.task(username, server_id, 1, 0, None)?;

    let server = &task.connection;
    let reachable = ServerProbe::new(Arc::new(StatusCache::new()), UdpPinger)
        .probe_udp(&server.host, server.port);
    if !reachable {
        warn!(
            "{} ({}:{}) did not answer, launching anyway",
            server.name, server.host, server.port
        );
    }

    let launch = Launch::new(config);
    let (tx, rx) = mpsc::channel();
    let printer = spawn_printer(rx, print_launch_event);

    let outcome = {
        let events = EventSink::new(tx);
        launch.launcher.launch(&task).and_then(|pid| {
            launch
                .verifier
                .verify(pid, cancel, &events, true)
                .into_result()
                .map(|_| pid)
        })
    };

    let _ = printer.join();
    let pid = outcome.context(format!("Could not launch {}", task.label()))?;

    println!("{} running as pid {}", task.label(), pid);
    Ok(())
}

fn print_probe_event(event: &ProbeEvent) {
    let ProbeEvent::StatusChanged {
        server_id,
        previous,
        online,
        ..
    } = event;

    if previous.is_some() {
        println!(
            "{} went {}",
            server_id,
            if *online { "online" } else { "offline" }
        );
    }
}

fn print_statuses(probe: &ServerProbe, servers: &[ServerConnection]) {
    let mut results = probe.check_many_servers(servers);
    results.sort();

    for (id, online) in results {
        let Some(server) = servers.iter().find(|s| s.id == id) else {
            continue;
        };

        let players = probe
            .cache()
            .get(&id)
            .and_then(|s| s.player_count)
            .map(|count| format!(", {} players", count))
            .unwrap_or_default();

        println!(
            "{} ({}:{}): {}{}",
            server.name,
            server.host,
            server.port,
            if online { "online" } else { "offline" },
            players
        );
    }
}

pub fn run_probe(
    config: &Config,
    server_id: Option<&str>,
    watch: Option<u64>,
    timeout: Duration,
    cancel: &CancelToken,
) -> anyhow::Result<()> {
    let servers: Vec<ServerConnection> = match server_id {
        Some(id) => vec![
            config
                .server(id)
                .context(format!("Unknown server {}", id))?
                .connection(),
        ],
        None => config.servers.iter().map(|s| s.connection()).collect(),
    };

    if servers.is_empty() {
        bail!("No servers configured");
    }

    let (tx, rx) = mpsc::channel();
    let printer = spawn_printer(rx, print_probe_event);

    {
        let probe = ServerProbe::new(Arc::new(StatusCache::new()), UdpPinger)
            .with_timeout(timeout)
            .with_events(EventSink::new(tx));

        print_statuses(&probe, &servers);

        if let Some(seconds) = watch {
            info!("Watching {} servers every {}s", servers.len(), seconds);
            while !cancel.wait(Duration::from_secs(seconds)) {
                print_statuses(&probe, &servers);
            }
        }
    }

    let _ = printer.join();
    Ok(())
}
