//! The single writer thread that serializes outbound L2CAP frames and
//! drives the periodic status-request heartbeat (§4.2).

use crate::config::Config;
use crate::protocol::status_command;
use crate::session::DeviceSession;
use crossbeam_channel::{self, Receiver as ChanReceiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// One outbound frame, already addressed to the session that owns the
/// transport it should be sent on.
struct QueueItem {
    session: Arc<DeviceSession>,
    payload: Vec<u8>,
}

/// The set of live sessions the heartbeat sweep walks each idle tick.
/// Shared (non-owning) with [`crate::receiver::Receiver`] and owned by
/// [`crate::registry::SessionRegistry`].
pub type SessionList = Arc<Mutex<Vec<Arc<DeviceSession>>>>;

/// Roughly `heartbeat_every / poll_timeout` idle ticks between automatic
/// status-request heartbeats (§4.2: "counter >= 7").
fn heartbeat_ticks(cfg: &Config) -> u32 {
    let ticks = cfg.heartbeat_every.as_millis() / cfg.poll_timeout.as_millis().max(1);
    ticks.max(1) as u32
}

/// A cheaply cloneable handle sessions hold so they can enqueue their
/// own follow-up commands (DRM changes, heartbeats) without owning the
/// queue itself.
#[derive(Clone)]
pub struct CommandSender(Sender<QueueItem>);

impl CommandSender {
    /// Enqueues one command frame for `session`. Never blocks.
    pub fn enqueue(&self, session: Arc<DeviceSession>, payload: Vec<u8>) {
        let _ = self.0.send(QueueItem { session, payload });
    }
}

/// The dedicated writer thread and the handle callers enqueue frames
/// through.
pub struct CommandQueue {
    tx: Sender<QueueItem>,
    handle: Option<JoinHandle<()>>,
}

impl CommandQueue {
    /// Spawns the writer thread. `sessions` is swept every idle tick to
    /// advance each session's heartbeat counter.
    pub fn start(config: Config, sessions: SessionList) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = std::thread::spawn(move || run(rx, sessions, config));
        Self { tx, handle: Some(handle) }
    }

    /// A cloneable sender, handed to each session at construction.
    pub fn sender(&self) -> CommandSender {
        CommandSender(self.tx.clone())
    }

    /// Enqueues one command frame for `session`. Never blocks.
    pub fn enqueue(&self, session: Arc<DeviceSession>, payload: Vec<u8>) {
        let _ = self.tx.send(QueueItem { session, payload });
    }

    /// Stops the writer thread and joins it. Idempotent: dropping the
    /// sender closes the channel, so a second call is a harmless no-op
    /// once the handle has already been taken.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            drop(std::mem::replace(&mut self.tx, crossbeam_channel::unbounded().0));
            let _ = handle.join();
        }
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(rx: ChanReceiver<QueueItem>, sessions: SessionList, config: Config) {
    let ticks_per_heartbeat = heartbeat_ticks(&config);
    debug!("command queue started");
    loop {
        match rx.recv_timeout(config.poll_timeout) {
            Ok(item) => {
                if let Err(err) = item.session.transport_send(&item.payload) {
                    warn!(error = %err, "command send failed, failing pending command");
                    item.session.fail_pending();
                    item.session.disconnect();
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                sweep_heartbeats(&sessions, ticks_per_heartbeat);
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("command queue stopped");
}

fn sweep_heartbeats(sessions: &SessionList, ticks_per_heartbeat: u32) {
    let sessions = sessions.lock().unwrap();
    for session in sessions.iter() {
        if session.is_disconnected() {
            continue;
        }
        if session.is_timed_out() {
            warn!(address = %session.address, "no status reply in time, disconnecting");
            session.disconnect();
            continue;
        }
        if session.tick_heartbeat(ticks_per_heartbeat) {
            let payload = status_command(session.flags_snapshot()).to_vec();
            if let Err(err) = session.transport_send(&payload) {
                warn!(error = %err, "heartbeat send failed, disconnecting");
                session.disconnect();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_ticks_matches_five_seconds_over_half_second_polls() {
        let cfg = Config::default();
        assert_eq!(heartbeat_ticks(&cfg), 10);
    }
}
