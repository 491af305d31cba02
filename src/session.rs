//! Per-controller state: protocol bookkeeping, the command/reply
//! rendezvous, report dispatch, and the connect/disconnect lifecycle
//! (§4.4, §5).

use crate::address::ControllerAddress;
use crate::command_queue::CommandSender;
use crate::config::Config;
use crate::error::{WiiError, WiiResult};
use crate::extension;
use crate::flags::{DeviceKind, ExtensionKind, SessionFlags};
use crate::mapping::MappingProfile;
use crate::protocol;
use crate::report::{self, ProCalibration, ReportShape};
use crate::translator::{self, SyntheticEvent};
use crate::transport::Transport;
use crate::uinput::{self, SyntheticDevice};
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Which reply, if any, the session is currently waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    None,
    Status,
    ReadMem,
    WriteMem,
}

/// The command/reply rendezvous state, guarded by one mutex + one
/// condition variable (§4.4).
struct PendingCommand {
    kind: PendingKind,
    buffer: Vec<u8>,
    error: Option<u8>,
}

impl Default for PendingCommand {
    fn default() -> Self {
        Self { kind: PendingKind::None, buffer: Vec::new(), error: None }
    }
}

/// Protocol state mutated only by the Receiver thread or by the
/// session's own setup/helper threads (§5).
struct ProtocolState {
    device_kind: DeviceKind,
    ext_kind: ExtensionKind,
    flags: SessionFlags,
    calib: ProCalibration,
    calibrated: bool,
    /// `None` means no status reply has ever been observed; the
    /// disconnect timeout does not apply until the first one arrives
    /// (§9, resolved open question).
    last_status: Option<Instant>,
    heartbeat_tick: u32,
}

/// Capabilities the session invokes on lifecycle events, supplied once
/// at construction instead of nullable callback slots (§9).
pub trait SessionCallbacks: Send + Sync {
    fn on_disconnect(&self, address: &ControllerAddress);
    fn on_extension_changed(&self, address: &ControllerAddress, kind: ExtensionKind);
}

/// All state for one connected controller.
pub struct DeviceSession {
    pub address: ControllerAddress,
    transport: Transport,
    mapping: MappingProfile,
    cmd_tx: CommandSender,
    config: Config,
    led_index: u8,
    state: Mutex<ProtocolState>,
    pending: Mutex<PendingCommand>,
    cond: Condvar,
    send_lock: Mutex<()>,
    synthetic: Mutex<Option<SyntheticDevice>>,
    disconnected: AtomicBool,
    callbacks: Box<dyn SessionCallbacks>,
}

impl DeviceSession {
    /// Builds a session in its pre-connect state. The caller (normally
    /// [`crate::registry::SessionRegistry`]) still needs to call
    /// [`DeviceSession::run_connect_sequence`].
    pub fn new(
        address: ControllerAddress,
        transport: Transport,
        mapping: MappingProfile,
        cmd_tx: CommandSender,
        config: Config,
        led_index: u8,
        callbacks: Box<dyn SessionCallbacks>,
    ) -> Arc<Self> {
        let device_kind = address.device_kind();
        Arc::new(Self {
            address,
            transport,
            mapping,
            cmd_tx,
            config,
            led_index,
            state: Mutex::new(ProtocolState {
                device_kind,
                ext_kind: ExtensionKind::None,
                flags: SessionFlags::empty(),
                calib: ProCalibration::default(),
                calibrated: false,
                last_status: None,
                heartbeat_tick: 0,
            }),
            pending: Mutex::new(PendingCommand::default()),
            cond: Condvar::new(),
            send_lock: Mutex::new(()),
            synthetic: Mutex::new(None),
            disconnected: AtomicBool::new(false),
            callbacks,
        })
    }

    /// The file descriptor [`crate::receiver::Receiver`] should poll for
    /// inbound reports.
    pub fn data_fd(&self) -> RawFd {
        self.transport.data_fd()
    }

    /// Reads one inbound frame. `Ok(None)` signals disconnection.
    pub fn recv_frame(&self) -> WiiResult<Option<(u8, Vec<u8>)>> {
        self.transport.recv()
    }

    /// Sends a frame directly on the transport, bypassing the rendezvous.
    /// Used by [`crate::command_queue::CommandQueue`]'s writer thread.
    pub fn transport_send(&self, payload: &[u8]) -> WiiResult<()> {
        self.transport.send(payload)
    }

    fn flags(&self) -> SessionFlags {
        self.state.lock().unwrap().flags
    }

    pub fn flags_snapshot(&self) -> SessionFlags {
        self.flags()
    }

    /// Advances the heartbeat counter by one idle tick; returns `true`
    /// (and resets the counter) once it reaches `threshold`.
    pub fn tick_heartbeat(&self, threshold: u32) -> bool {
        let mut state = self.state.lock().unwrap();
        state.heartbeat_tick += 1;
        if state.heartbeat_tick >= threshold {
            state.heartbeat_tick = 0;
            true
        } else {
            false
        }
    }

    /// Runs the status→extension-detect→DRM-select→LED-write sequence
    /// once, synchronously, right after connecting.
    pub fn run_connect_sequence(self: &Arc<Self>) -> WiiResult<()> {
        self.request_status()?;
        self.detect_extension_sync()?;
        self.recompute_drm()?;
        self.write_led()?;
        self.rebuild_synthetic_device()?;
        info!(address = %self.address, "session connected");
        Ok(())
    }

    fn send_command(self: &Arc<Self>, kind: PendingKind, payload: Vec<u8>) -> WiiResult<Vec<u8>> {
        let _serialize = self.send_lock.lock().unwrap();
        {
            let mut pending = self.pending.lock().unwrap();
            pending.kind = kind;
            pending.buffer.clear();
            pending.error = None;
        }
        self.cmd_tx.enqueue(Arc::clone(self), payload);

        let mut pending = self.pending.lock().unwrap();
        let timeout = self.config.status_timeout;
        loop {
            if let Some(err) = pending.error {
                pending.kind = PendingKind::None;
                return Err(if err == 0xFF { WiiError::CommandFailed } else { WiiError::Disconnected });
            }
            if pending.kind == PendingKind::None {
                return Ok(std::mem::take(&mut pending.buffer));
            }
            let (guard, result) = self.cond.wait_timeout(pending, timeout).unwrap();
            pending = guard;
            if result.timed_out() && pending.kind != PendingKind::None {
                pending.kind = PendingKind::None;
                return Err(WiiError::ProtocolTimeout(timeout));
            }
        }
    }

    /// Records a transport failure for whatever command is outstanding,
    /// holding the rendezvous lock while doing so (§9 bug correction).
    pub fn fail_pending(&self) {
        let mut pending = self.pending.lock().unwrap();
        pending.error = Some(0xFF);
        self.cond.notify_all();
    }

    fn request_status(self: &Arc<Self>) -> WiiResult<()> {
        let flags = self.flags();
        let payload = protocol::status_command(flags).to_vec();
        let reply = self.send_command(PendingKind::Status, payload)?;
        self.apply_status_reply(&reply)
    }

    /// Dispatches an inbound frame from the Receiver thread: status
    /// replies and read/write-mem replies satisfy the rendezvous; DRM
    /// report codes are parsed and translated into synthetic events.
    pub fn handle_frame(self: &Arc<Self>, code: u8, payload: &[u8]) {
        match code {
            protocol::REPLY_STATUS => {
                if self.complete_pending(PendingKind::Status, payload) {
                    return;
                }
                // Unsolicited status push (battery/extension change).
                let _ = self.apply_status_reply(payload);
            }
            protocol::REPLY_READ_MEM => {
                self.complete_pending(PendingKind::ReadMem, payload);
            }
            protocol::REPLY_ACK => {
                self.complete_pending(PendingKind::WriteMem, payload);
            }
            _ => self.process_report(code, payload),
        }
    }

    fn complete_pending(&self, expected: PendingKind, payload: &[u8]) -> bool {
        let mut pending = self.pending.lock().unwrap();
        if pending.kind != expected {
            return false;
        }
        pending.buffer = payload.to_vec();
        pending.error = Some(0);
        pending.kind = PendingKind::None;
        self.cond.notify_all();
        true
    }

    fn apply_status_reply(self: &Arc<Self>, payload: &[u8]) -> WiiResult<()> {
        if payload.len() < 6 {
            return Ok(());
        }
        let was_plugged;
        let now_plugged = payload[0] & 0b10 != 0;
        {
            let mut state = self.state.lock().unwrap();
            state.last_status = Some(Instant::now());
            was_plugged = state.flags.contains(SessionFlags::EXT_PLUGGED);
            state.flags.set(SessionFlags::EXT_PLUGGED, now_plugged);
            if !now_plugged {
                state.flags.remove(SessionFlags::EXT_ACTIVE | SessionFlags::MP_PLUGGED | SessionFlags::MP_ACTIVE);
            }
        }
        let divisor = if self.address.is_battery_uc_scale() { 255.0 } else { 208.0 };
        let battery = ((payload[5] as f64 / divisor) * 100.0) as u32;
        debug!(address = %self.address, battery, "status reply");

        if now_plugged && !was_plugged {
            self.spawn_extension_redetect();
        }
        Ok(())
    }

    /// Runs extension detection on a short-lived helper thread so the
    /// Receiver is never blocked on it (§4.4, §5).
    fn spawn_extension_redetect(self: &Arc<Self>) {
        let session = Arc::clone(self);
        std::thread::spawn(move || {
            if let Err(err) = session.detect_extension_sync() {
                warn!(address = %session.address, error = %err, "extension re-detection failed");
                return;
            }
            if let Err(err) = session.recompute_drm() {
                warn!(address = %session.address, error = %err, "DRM recompute after extension change failed");
            }
            if let Err(err) = session.rebuild_synthetic_device() {
                warn!(address = %session.address, error = %err, "synthetic device rebuild failed");
            }
        });
    }

    fn detect_extension_sync(self: &Arc<Self>) -> WiiResult<()> {
        self.send_command(
            PendingKind::WriteMem,
            protocol::write_mem_command(protocol::EXT_INIT_ADDR_1, &[0x55], false).to_vec(),
        )?;
        self.send_command(
            PendingKind::WriteMem,
            protocol::write_mem_command(protocol::EXT_INIT_ADDR_2, &[0x00], false).to_vec(),
        )?;
        let reply = self.send_command(
            PendingKind::ReadMem,
            protocol::read_mem_command(protocol::EXT_SIG_ADDR, 6, false).to_vec(),
        )?;

        let kind = if reply.len() >= 6 + 7 {
            let mut sig = [0u8; 6];
            sig.copy_from_slice(&reply[7..13]);
            extension::classify(&sig)
        } else {
            ExtensionKind::None
        };

        let mut state = self.state.lock().unwrap();
        let changed = state.ext_kind != kind;
        state.ext_kind = kind;
        state.flags.set(SessionFlags::EXT_PLUGGED, kind != ExtensionKind::None);
        if kind == ExtensionKind::None {
            state.flags.disable_extension();
        } else {
            state.flags.enable_extension();
        }
        drop(state);

        if changed {
            self.callbacks.on_extension_changed(&self.address, kind);
        }
        Ok(())
    }

    /// Recomputes the Data Reporting Mode from current flags and
    /// re-issues the DRM-set command (fire-and-forget).
    fn recompute_drm(self: &Arc<Self>) -> WiiResult<()> {
        let (device_kind, flags) = {
            let state = self.state.lock().unwrap();
            (state.device_kind, state.flags)
        };
        let code = protocol::select_drm(device_kind, flags);
        let payload = protocol::drm_command(flags, code).to_vec();
        self.cmd_tx.enqueue(Arc::clone(self), payload);
        Ok(())
    }

    fn write_led(self: &Arc<Self>) -> WiiResult<()> {
        let mut flags = self.flags();
        flags.set_led_by_index(self.led_index);
        {
            self.state.lock().unwrap().flags = flags;
        }
        let payload = protocol::led_command(flags).to_vec();
        self.cmd_tx.enqueue(Arc::clone(self), payload);
        Ok(())
    }

    /// Enables the accelerometer DRM bit and re-selects the DRM.
    pub fn enable_accel(self: &Arc<Self>) -> WiiResult<()> {
        self.state.lock().unwrap().flags.insert(SessionFlags::ACCEL);
        self.recompute_drm()
    }

    fn uinput_name_and_profile(&self, state: &ProtocolState) -> (String, &'static str) {
        match state.device_kind {
            DeviceKind::ProController => ("Nintendo Wii Remote Pro Controller".to_string(), "pro"),
            _ => match state.ext_kind {
                ExtensionKind::Classic | ExtensionKind::ClassicPro => {
                    ("Nintendo Wii Remote Classic Controller".to_string(), "classic")
                }
                ExtensionKind::Nunchuk => ("Nintendo Wii Remote".to_string(), "wiimotenunchuk"),
                _ => ("Nintendo Wii Remote".to_string(), "wiimote"),
            },
        }
    }

    /// Destroys the current synthetic device (if any) and creates a new
    /// one matching the session's current device/extension kind (§4.8).
    fn rebuild_synthetic_device(self: &Arc<Self>) -> WiiResult<()> {
        if self.address.device_kind() == DeviceKind::BalanceBoard {
            // No Mapping kind exists for the Balance Board profile; it
            // is parsed (see report::parse_balance_board_keys) but never
            // routed through a synthetic device.
            return Ok(());
        }

        let (name, profile_key, is_gamepad) = {
            let state = self.state.lock().unwrap();
            let (name, profile_key) = self.uinput_name_and_profile(&state);
            let is_gamepad = match profile_key {
                "pro" => self.mapping.pro.is_gamepad(),
                "classic" => self.mapping.classic.is_gamepad(),
                "wiimotenunchuk" => self.mapping.wiimote_nunchuk.is_gamepad(),
                _ => self.mapping.wiimote.is_gamepad(),
            };
            (name, profile_key, is_gamepad)
        };
        let name = if is_gamepad { name } else { name.replacen("Nintendo", "Nintendo Keyboard", 1) };

        let device_kind = self.address.device_kind();
        let product = match device_kind {
            DeviceKind::Gen10 => 0x0306,
            DeviceKind::Gen20 | DeviceKind::ProController => 0x0330,
            _ => 0x0001,
        };
        const BUS_BLUETOOTH: u16 = 0x0005;
        const VENDOR_NINTENDO: u16 = 0x057E;

        let mut device = SyntheticDevice::new(&self.config.uinput_paths, &name, BUS_BLUETOOTH, VENDOR_NINTENDO, product)?;
        match profile_key {
            "pro" => uinput::enable_mapping_codes(&mut device, &self.mapping.pro)?,
            "classic" => uinput::enable_mapping_codes(&mut device, &self.mapping.classic)?,
            "wiimotenunchuk" => uinput::enable_mapping_codes(&mut device, &self.mapping.wiimote_nunchuk)?,
            _ => uinput::enable_mapping_codes(&mut device, &self.mapping.wiimote)?,
        }
        {
            let session = Arc::clone(self);
            device.enable_ff(move |_code, value| {
                debug!(address = %session.address, value, "rumble event from synthetic device");
            })?;
        }
        device.create()?;

        let mut slot = self.synthetic.lock().unwrap();
        if let Some(mut old) = slot.take() {
            old.destroy();
        }
        *slot = Some(device);
        Ok(())
    }

    fn process_report(self: &Arc<Self>, code: u8, payload: &[u8]) {
        let shape = match report::resolve_handler(code, payload.len()) {
            Some(shape) => shape,
            None => return,
        };
        if payload.len() < 2 {
            return;
        }
        let buttons = report::parse_wiimote_keys(payload);
        let device_kind = self.address.device_kind();

        let events: Vec<SyntheticEvent> = match (device_kind, shape) {
            (DeviceKind::BalanceBoard, _) => return,
            (_, ReportShape::Keys) => translator::translate_wiimote_keys(&self.mapping.wiimote, buttons),
            (_, ReportShape::KeysAccel) => {
                let gen10 = device_kind == DeviceKind::Gen10;
                let accel = report::parse_wiimote_accel(payload, gen10);
                translator::translate_wiimote_keys_accel(&self.mapping.wiimote, buttons, accel)
            }
            (_, ReportShape::KeysAccelExt) if payload.len() >= 11 => {
                let gen10 = device_kind == DeviceKind::Gen10;
                let accel = report::parse_wiimote_accel(payload, gen10);
                self.translate_with_extension(buttons, Some(accel), &payload[5..])
            }
            (_, ReportShape::KeysExt) if payload.len() >= 8 => {
                self.translate_with_extension(buttons, None, &payload[2..])
            }
            _ => translator::translate_wiimote_keys(&self.mapping.wiimote, buttons),
        };

        self.emit(&events);
    }

    fn translate_with_extension(
        self: &Arc<Self>,
        buttons: report::WiimoteButtons,
        accel: Option<report::Accel>,
        ext_bytes: &[u8],
    ) -> Vec<SyntheticEvent> {
        let ext_kind = self.state.lock().unwrap().ext_kind;
        match ext_kind {
            ExtensionKind::Nunchuk if ext_bytes.len() >= 6 => {
                let mut ext = [0u8; 6];
                ext.copy_from_slice(&ext_bytes[..6]);
                let mp_active = self.flags().contains(SessionFlags::MP_ACTIVE);
                let nun = report::parse_nunchuk(&ext, mp_active);
                translator::translate_nunchuk(&self.mapping.wiimote_nunchuk, buttons, accel, nun)
            }
            ExtensionKind::Classic | ExtensionKind::ClassicPro if ext_bytes.len() >= 6 => {
                let mut ext = [0u8; 6];
                ext.copy_from_slice(&ext_bytes[..6]);
                let mp_active = self.flags().contains(SessionFlags::MP_ACTIVE);
                let classic = report::parse_classic(&ext, mp_active);
                translator::translate_classic(&self.mapping.classic, classic)
            }
            ExtensionKind::Pro if ext_bytes.len() >= 11 => {
                let mut ext = [0u8; 11];
                ext.copy_from_slice(&ext_bytes[..11]);
                let mut state = self.state.lock().unwrap();
                let pro = report::parse_pro(&ext, &mut state.calib, &mut state.calibrated);
                if state.calibrated {
                    state.flags.insert(SessionFlags::PRO_CALIB_DONE);
                }
                drop(state);
                translator::translate_pro(&self.mapping.pro, pro)
            }
            _ => translator::translate_wiimote_keys(&self.mapping.wiimote, buttons),
        }
    }

    fn emit(&self, events: &[SyntheticEvent]) {
        let mut slot = self.synthetic.lock().unwrap();
        let Some(device) = slot.as_mut() else { return };
        for event in events {
            let result = match *event {
                SyntheticEvent::Key { code, value } => device.write_event(uinput::EV_KEY, code, value as i32),
                SyntheticEvent::Abs { code, value } => device.write_event(uinput::EV_ABS, code, value),
                SyntheticEvent::Sync => device.sync(),
            };
            if let Err(err) = result {
                warn!(address = %self.address, error = %err, "synthetic event write failed");
                return;
            }
        }
    }

    /// Whether this session has gone more than `status_timeout` without
    /// a status reply, the first one having already arrived.
    pub fn is_timed_out(&self) -> bool {
        let state = self.state.lock().unwrap();
        match state.last_status {
            Some(at) => at.elapsed() > self.config.status_timeout,
            None => false,
        }
    }

    /// The player LED slot index assigned to this session (for
    /// [`crate::led::LedAllocator::release`] at teardown).
    pub fn led_index(&self) -> u8 {
        self.led_index
    }

    /// Idempotently tears the session down: closes both transport
    /// sockets, destroys the synthetic device, fails any outstanding
    /// command, and invokes the disconnect callback. Safe to call from
    /// any thread, including from inside a callback.
    pub fn disconnect(&self) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        self.fail_pending();
        if let Some(mut device) = self.synthetic.lock().unwrap().take() {
            device.destroy();
        }
        info!(address = %self.address, "session disconnected");
        self.callbacks.on_disconnect(&self.address);
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_default_has_no_kind() {
        let pending = PendingCommand::default();
        assert_eq!(pending.kind, PendingKind::None);
        assert!(pending.buffer.is_empty());
    }

    #[test]
    fn heartbeat_resets_after_threshold() {
        let state = Mutex::new(ProtocolState {
            device_kind: DeviceKind::Gen10,
            ext_kind: ExtensionKind::None,
            flags: SessionFlags::empty(),
            calib: ProCalibration::default(),
            calibrated: false,
            last_status: None,
            heartbeat_tick: 0,
        });
        for _ in 0..9 {
            let mut s = state.lock().unwrap();
            s.heartbeat_tick += 1;
        }
        assert_eq!(state.lock().unwrap().heartbeat_tick, 9);
    }
}
