//! Owns every live [`DeviceSession`] plus the shared writer and reader
//! threads, and is the connect/disconnect entry point for embedders
//! (§6.1-§6.3).

use crate::address::ControllerAddress;
use crate::command_queue::{CommandQueue, SessionList};
use crate::config::Config;
use crate::error::WiiResult;
use crate::led::LedAllocator;
use crate::mapping::MappingProfile;
use crate::receiver::Receiver;
use crate::session::{DeviceSession, SessionCallbacks};
use crate::transport::Transport;
use std::sync::{Arc, Mutex};
use tracing::info;

struct Callbacks {
    leds: Arc<LedAllocator>,
    sessions: SessionList,
}

impl SessionCallbacks for Callbacks {
    fn on_disconnect(&self, address: &ControllerAddress) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(pos) = sessions.iter().position(|s| &s.address == address) {
            let session = sessions.remove(pos);
            self.leds.release(session.led_index());
        }
    }

    fn on_extension_changed(&self, address: &ControllerAddress, kind: crate::flags::ExtensionKind) {
        info!(%address, ?kind, "extension changed");
    }
}

/// Coordinates connection setup/teardown and owns the shared background
/// threads (one writer, one reader) that every session's traffic flows
/// through.
pub struct SessionRegistry {
    config: Config,
    sessions: SessionList,
    leds: Arc<LedAllocator>,
    command_queue: CommandQueue,
    receiver: Receiver,
}

impl SessionRegistry {
    pub fn new(config: Config) -> Self {
        let sessions: SessionList = Arc::new(Mutex::new(Vec::new()));
        let command_queue = CommandQueue::start(config.clone(), Arc::clone(&sessions));
        let receiver = Receiver::start(config.clone(), Arc::clone(&sessions));
        Self {
            config,
            sessions,
            leds: Arc::new(LedAllocator::new()),
            command_queue,
            receiver,
        }
    }

    /// Opens both L2CAP channels to `address`, runs the connect
    /// sequence, and registers the resulting session.
    pub fn connect(&self, address: ControllerAddress, mapping: MappingProfile) -> WiiResult<Arc<DeviceSession>> {
        let transport = Transport::connect(&address)?;
        let led_index = self.leds.acquire();
        let callbacks = Box::new(Callbacks { leds: Arc::clone(&self.leds), sessions: Arc::clone(&self.sessions) });
        let session = DeviceSession::new(
            address,
            transport,
            mapping,
            self.command_queue.sender(),
            self.config.clone(),
            led_index,
            callbacks,
        );

        {
            let mut sessions = self.sessions.lock().unwrap();
            sessions.push(Arc::clone(&session));
        }

        if let Err(err) = session.run_connect_sequence() {
            session.disconnect();
            return Err(err);
        }
        Ok(session)
    }

    /// Number of currently connected (non-torn-down) sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().iter().filter(|s| !s.is_disconnected()).count()
    }

    /// Disconnects every session and stops the shared background
    /// threads. Safe to call more than once.
    pub fn shutdown(&mut self) {
        let sessions: Vec<Arc<DeviceSession>> = self.sessions.lock().unwrap().clone();
        for session in sessions {
            session.disconnect();
        }
        self.command_queue.stop();
        self.receiver.stop();
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_registry_has_no_sessions() {
        let registry = SessionRegistry::new(Config::default());
        assert_eq!(registry.session_count(), 0);
    }
}
