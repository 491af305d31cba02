//! The single reader thread: multiplexes every connected session's data
//! socket with `poll(2)` and dispatches inbound frames (§4.3).

use crate::command_queue::SessionList;
use crate::config::Config;
use std::os::fd::BorrowedFd;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Owns the reader thread. Dropping stops it.
pub struct Receiver {
    stop: Option<std::sync::mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Receiver {
    /// Spawns the reader thread, polling `sessions`' data sockets every
    /// `config.poll_timeout`.
    pub fn start(config: Config, sessions: SessionList) -> Self {
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = std::thread::spawn(move || run(rx, sessions, config));
        Self { stop: Some(tx), handle: Some(handle) }
    }

    /// Signals the reader thread to exit and joins it. Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(stop: std::sync::mpsc::Receiver<()>, sessions: SessionList, config: Config) {
    use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

    debug!("receiver started");
    let timeout = PollTimeout::from(config.poll_timeout.as_millis().min(u16::MAX as u128) as u16);
    loop {
        if stop.try_recv().is_ok() {
            break;
        }

        let live: Vec<Arc<crate::session::DeviceSession>> = {
            let guard = sessions.lock().unwrap();
            guard.iter().filter(|s| !s.is_disconnected()).cloned().collect()
        };
        if live.is_empty() {
            std::thread::sleep(config.poll_timeout);
            continue;
        }

        let borrowed: Vec<BorrowedFd> =
            live.iter().map(|s| unsafe { BorrowedFd::borrow_raw(s.data_fd()) }).collect();
        let mut fds: Vec<PollFd> = borrowed.iter().map(|fd| PollFd::new(fd, PollFlags::POLLIN)).collect();

        match poll(&mut fds, timeout) {
            Ok(n) if n > 0 => {
                for (fd, session) in fds.iter().zip(live.iter()) {
                    let Some(revents) = fd.revents() else { continue };
                    if revents.is_empty() {
                        continue;
                    }
                    dispatch(session);
                }
            }
            Ok(_) => {
                // Idle tick; the heartbeat sweep lives in the command
                // queue, not here.
            }
            Err(err) => {
                warn!(error = %err, "poll failed");
            }
        }

        prune_disconnected(&sessions);
    }
    debug!("receiver stopped");
}

fn dispatch(session: &Arc<crate::session::DeviceSession>) {
    match session.recv_frame() {
        Ok(Some((code, payload))) => session.handle_frame(code, &payload),
        Ok(None) => session.disconnect(),
        Err(err) => {
            warn!(address = %session.address, error = %err, "read failed");
            session.disconnect();
        }
    }
}

fn prune_disconnected(sessions: &SessionList) {
    let mut guard = sessions.lock().unwrap();
    guard.retain(|s| !s.is_disconnected());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receiver_stops_promptly_with_no_sessions() {
        let sessions: SessionList = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut config = Config::default();
        config.poll_timeout = std::time::Duration::from_millis(10);
        let mut receiver = Receiver::start(config, sessions);
        receiver.stop();
    }
}
