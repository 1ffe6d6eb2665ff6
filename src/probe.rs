use log::{debug, info, warn};
use std::collections::HashMap;
use std::io;
use std::net::{ToSocketAddrs, UdpSocket};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crate::clock::{Clock, SystemClock};
use crate::constants::{
    PROBE_MIN_RESPONSE_BYTES, PROBE_OFFLINE_INTERVAL_SECONDS, PROBE_ONLINE_INTERVAL_SECONDS,
    PROBE_TIMEOUT_SECONDS,
};
use crate::events::{EventSink, ProbeEvent};
use crate::packet::{build_login_packet, try_extract_player_count};
use crate::task::ServerConnection;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerCheckStatus {
    pub last_checked: Instant,
    pub last_known_online: bool,
    pub online_interval: Duration,
    pub offline_interval: Duration,
    pub player_count: Option<u32>,
}

impl ServerCheckStatus {
    pub fn new(last_checked: Instant, online: bool) -> Self {
        Self {
            last_checked,
            last_known_online: online,
            online_interval: Duration::from_secs(PROBE_ONLINE_INTERVAL_SECONDS),
            offline_interval: Duration::from_secs(PROBE_OFFLINE_INTERVAL_SECONDS),
            player_count: None,
        }
    }

    pub fn interval(&self) -> Duration {
        if self.last_known_online {
            self.online_interval
        } else {
            self.offline_interval
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_checked) >= self.interval()
    }
}

/// Per-server probe results, shared between probes.
#[derive(Default)]
pub struct StatusCache {
    entries: Mutex<HashMap<String, ServerCheckStatus>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, server_id: &str) -> Option<ServerCheckStatus> {
        self.lock().get(server_id).cloned()
    }

    #[cfg(test)]
    pub fn set(&self, server_id: &str, status: ServerCheckStatus) {
        self.lock().insert(server_id.to_string(), status);
    }

    /// Stores a fresh probe result and returns the previously known state.
    pub fn record(
        &self,
        server_id: &str,
        online: bool,
        player_count: Option<u32>,
        at: Instant,
    ) -> Option<bool> {
        let mut entries = self.lock();
        let previous = entries.get(server_id).map(|s| s.last_known_online);
        let entry = entries
            .entry(server_id.to_string())
            .or_insert_with(|| ServerCheckStatus::new(at, online));

        entry.last_checked = at;
        entry.last_known_online = online;
        entry.player_count = if online { player_count } else { None };
        previous
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ServerCheckStatus>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Sends one datagram and waits for one reply.
pub trait Pinger: Send + Sync {
    fn ping(&self, host: &str, port: u16, packet: &[u8], timeout: Duration)
    -> io::Result<Vec<u8>>;
}

pub struct UdpPinger;

impl Pinger for UdpPinger {
    fn ping(
        &self,
        host: &str,
        port: u16,
        packet: &[u8],
        timeout: Duration,
    ) -> io::Result<Vec<u8>> {
        let addr = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("Could not resolve {}", host),
            )
        })?;

        let local = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local)?;
        socket.connect(addr)?;
        socket.set_read_timeout(Some(timeout))?;
        socket.send(packet)?;

        let mut buf = [0u8; 1024];
        let len = socket.recv(&mut buf)?;
        Ok(buf[..len].to_vec())
    }
}

pub struct ServerProbe<P: Pinger = UdpPinger> {
    cache: Arc<StatusCache>,
    pinger: P,
    clock: Arc<dyn Clock>,
    events: EventSink<ProbeEvent>,
    timeout: Duration,
}

impl<P: Pinger> ServerProbe<P> {
    pub fn new(cache: Arc<StatusCache>, pinger: P) -> Self {
        Self {
            cache,
            pinger,
            clock: Arc::new(SystemClock),
            events: EventSink::disabled(),
            timeout: Duration::from_secs(PROBE_TIMEOUT_SECONDS),
        }
    }

    pub fn with_events(mut self, events: EventSink<ProbeEvent>) -> Self {
        self.events = events;
        self
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache(&self) -> &StatusCache {
        &self.cache
    }

    pub fn check_server(&self, server_id: &str, host: &str, port: u16) -> bool {
        let now = self.clock.now();

        if let Some(status) = self.cache.get(server_id) {
            if !status.is_due(now) {
                debug!(
                    "Skipping probe of {}, last checked {}s ago",
                    server_id,
                    now.saturating_duration_since(status.last_checked).as_secs()
                );
                return status.last_known_online;
            }
        }

        let reply = self.exchange(host, port);
        let online = reply
            .as_ref()
            .is_some_and(|r| r.len() >= PROBE_MIN_RESPONSE_BYTES);
        let player_count = reply.as_deref().and_then(try_extract_player_count);

        let previous = self.cache.record(server_id, online, player_count, now);

        if previous != Some(online) {
            info!(
                "Server {} is now {}",
                server_id,
                if online { "online" } else { "offline" }
            );
            self.events.emit(ProbeEvent::StatusChanged {
                server_id: server_id.to_string(),
                previous,
                online,
                at: SystemTime::now(),
            });
        }

        online
    }

    pub fn probe_udp(&self, host: &str, port: u16) -> bool {
        self.exchange(host, port)
            .is_some_and(|r| r.len() >= PROBE_MIN_RESPONSE_BYTES)
    }

    /// Probes every server concurrently. Results are not in input order.
    pub fn check_many_servers(&self, servers: &[ServerConnection]) -> Vec<(String, bool)> {
        thread::scope(|scope| {
            let handles: Vec<_> = servers
                .iter()
                .map(|server| {
                    scope.spawn(move || {
                        let online = self.check_server(&server.id, &server.host, server.port);
                        (server.id.clone(), online)
                    })
                })
                .collect();

            handles
                .into_iter()
                .zip(servers)
                .map(|(handle, server)| {
                    handle.join().unwrap_or_else(|_| {
                        warn!("Probe worker for {} panicked", server.id);
                        (server.id.clone(), false)
                    })
                })
                .collect()
        })
    }

    fn exchange(&self, host: &str, port: u16) -> Option<Vec<u8>> {
        let packet = build_login_packet();

        match self.pinger.ping(host, port, &packet, self.timeout) {
            Ok(reply) => Some(reply),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock
                        | io::ErrorKind::TimedOut
                        | io::ErrorKind::ConnectionRefused
                        | io::ErrorKind::ConnectionReset
                ) =>
            {
                debug!("No reply from {}:{}: {}", host, port, e);
                None
            }
            Err(e) => {
                warn!("Probe of {}:{} failed: {}", host, port, e);
                None
            }
        }
    }
}
