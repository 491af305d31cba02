//! Synthetic input devices created through the kernel's `uinput` character
//! device (§4.9). `libc` does not expose the `uinput` ioctl numbers or
//! wire structs, so both are declared here against the Linux ABI, the
//! same way [`transport`](crate::transport) declares the Bluetooth socket
//! layout `libc` leaves out.

use crate::error::{WiiError, WiiResult};
use crate::mapping::{AbsRange, Mapping, MappingEntry};
use nix::{ioctl_none, ioctl_readwrite, ioctl_write_int};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::sync::mpsc;
use std::thread::JoinHandle;

pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_ABS: u16 = 0x03;
pub const EV_FF: u16 = 0x15;
pub const EV_UINPUT: u16 = 0x101;

const UI_FF_UPLOAD: u16 = 1;
const UI_FF_ERASE: u16 = 2;
const FF_EFFECT_MAX: usize = 0x7f + 1;

const ABS_CNT: usize = 0x40;
const UINPUT_MAX_NAME_SIZE: usize = 80;

const UINPUT_IOCTL_BASE: u8 = b'U';

ioctl_write_int!(ui_set_evbit, UINPUT_IOCTL_BASE, 100);
ioctl_write_int!(ui_set_keybit, UINPUT_IOCTL_BASE, 101);
ioctl_write_int!(ui_set_absbit, UINPUT_IOCTL_BASE, 103);
ioctl_none!(ui_dev_create, UINPUT_IOCTL_BASE, 1);
ioctl_none!(ui_dev_destroy, UINPUT_IOCTL_BASE, 2);
ioctl_readwrite!(ui_begin_ff_upload, UINPUT_IOCTL_BASE, 200, UinputFfUpload);
ioctl_readwrite!(ui_end_ff_upload, UINPUT_IOCTL_BASE, 201, UinputFfUpload);
ioctl_readwrite!(ui_begin_ff_erase, UINPUT_IOCTL_BASE, 202, UinputFfErase);
ioctl_readwrite!(ui_end_ff_erase, UINPUT_IOCTL_BASE, 203, UinputFfErase);

/// Mirrors `struct input_id` (`linux/input.h`).
#[repr(C)]
#[derive(Clone, Copy, Default)]
struct InputId {
    bustype: u16,
    vendor: u16,
    product: u16,
    version: u16,
}

/// Mirrors `struct uinput_user_dev`.
#[repr(C)]
struct UinputUserDev {
    name: [u8; UINPUT_MAX_NAME_SIZE],
    id: InputId,
    ff_effects_max: u32,
    absmax: [i32; ABS_CNT],
    absmin: [i32; ABS_CNT],
    absfuzz: [i32; ABS_CNT],
    absflat: [i32; ABS_CNT],
}

impl UinputUserDev {
    fn as_bytes(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                (self as *const Self) as *const u8,
                std::mem::size_of::<Self>(),
            )
        }
    }
}

/// Mirrors `struct timeval` as embedded in `struct input_event`.
#[repr(C)]
#[derive(Clone, Copy, Default)]
struct TimeVal {
    tv_sec: i64,
    tv_usec: i64,
}

/// Mirrors `struct input_event`.
#[repr(C)]
#[derive(Clone, Copy)]
struct InputEvent {
    time: TimeVal,
    kind: u16,
    code: u16,
    value: i32,
}

/// Mirrors `struct ff_effect` closely enough to round-trip an upload: the
/// kernel only requires this side to preserve the bytes it was handed
/// back, never to interpret the force-feedback waveform itself.
#[repr(C)]
#[derive(Clone, Copy)]
struct FfEffect {
    opaque: [u8; 32],
}

/// Mirrors `struct uinput_ff_upload`.
#[repr(C)]
#[derive(Clone, Copy)]
struct UinputFfUpload {
    request_id: u32,
    retval: i32,
    effect: FfEffect,
    old: FfEffect,
}

/// Mirrors `struct uinput_ff_erase`.
#[repr(C)]
#[derive(Clone, Copy)]
struct UinputFfErase {
    request_id: u32,
    retval: i32,
    effect_id: u32,
}

fn open_uinput(paths: &[&str]) -> WiiResult<File> {
    let mut last_err = None;
    for path in paths {
        match OpenOptions::new().read(true).write(true).custom_flags(libc::O_NONBLOCK).open(path) {
            Ok(f) => return Ok(f),
            Err(e) => last_err = Some(e),
        }
    }
    Err(WiiError::UinputUnavailable(
        last_err.unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no uinput path configured")),
    ))
}

/// The three-state lifecycle a synthetic device moves through. Mirrors
/// the original driver's `STATE_UINPUT`/`STATE_DEV_CREATED`/
/// `STATE_DEV_DESTROYED` so that destruction is never attempted twice
/// and events are never written before the device exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Created,
    Destroyed,
}

/// One synthetic gamepad or keyboard device backed by `/dev/uinput`.
///
/// Event types and codes must be enabled (`enable_key`/`enable_abs`)
/// before [`SyntheticDevice::create`] is called; the kernel rejects an
/// attempt to enable a code once the device exists.
pub struct SyntheticDevice {
    file: File,
    state: State,
    dev: UinputUserDev,
    ff_thread: Option<JoinHandle<()>>,
    ff_stop: Option<mpsc::Sender<()>>,
}

impl SyntheticDevice {
    /// Opens the first reachable uinput path from `paths` and prepares a
    /// device descriptor. No event codes are enabled and no kernel
    /// device exists yet.
    pub fn new(paths: &[&str], name: &str, bustype: u16, vendor: u16, product: u16) -> WiiResult<Self> {
        let file = open_uinput(paths)?;
        let mut raw_name = [0u8; UINPUT_MAX_NAME_SIZE];
        let bytes = name.as_bytes();
        let len = bytes.len().min(UINPUT_MAX_NAME_SIZE - 1);
        raw_name[..len].copy_from_slice(&bytes[..len]);
        let dev = UinputUserDev {
            name: raw_name,
            id: InputId { bustype, vendor, product, version: 1 },
            ff_effects_max: 0,
            absmax: [0; ABS_CNT],
            absmin: [0; ABS_CNT],
            absfuzz: [0; ABS_CNT],
            absflat: [0; ABS_CNT],
        };
        Ok(Self { file, state: State::Open, dev, ff_thread: None, ff_stop: None })
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Enables `EV_KEY` as a whole and one button/key code under it.
    pub fn enable_key(&mut self, code: u16) -> WiiResult<()> {
        unsafe {
            ui_set_evbit(self.fd(), EV_KEY as i32).map_err(ioctl_err)?;
            ui_set_keybit(self.fd(), code as i32).map_err(ioctl_err)?;
        }
        Ok(())
    }

    /// Enables `EV_ABS` as a whole, one absolute axis code under it, and
    /// records its reported range.
    pub fn enable_abs(&mut self, code: u16, range: AbsRange) -> WiiResult<()> {
        unsafe {
            ui_set_evbit(self.fd(), EV_ABS as i32).map_err(ioctl_err)?;
            ui_set_absbit(self.fd(), code as i32).map_err(ioctl_err)?;
        }
        let i = code as usize;
        self.dev.absmax[i] = range.max;
        self.dev.absmin[i] = range.min;
        self.dev.absfuzz[i] = range.fuzz;
        self.dev.absflat[i] = range.flat;
        Ok(())
    }

    /// Enables force-feedback rumble (`EV_FF`/`FF_RUMBLE`) and starts the
    /// background thread that acknowledges upload/erase requests and
    /// forwards play/stop notifications to `on_rumble`.
    pub fn enable_ff<F>(&mut self, on_rumble: F) -> WiiResult<()>
    where
        F: Fn(u16, i32) + Send + 'static,
    {
        unsafe {
            ui_set_evbit(self.fd(), EV_FF as i32).map_err(ioctl_err)?;
        }
        self.dev.ff_effects_max = FF_EFFECT_MAX as u32;

        let (tx, rx) = mpsc::channel();
        let fd = self.fd();
        let handle = std::thread::spawn(move || ff_reader_loop(fd, rx, on_rumble));
        self.ff_thread = Some(handle);
        self.ff_stop = Some(tx);
        Ok(())
    }

    /// Writes the device descriptor and issues `UI_DEV_CREATE`. After
    /// this call no further `enable_*` calls are accepted by the kernel.
    pub fn create(&mut self) -> WiiResult<()> {
        self.file.write_all(self.dev.as_bytes()).map_err(WiiError::Uinput)?;
        unsafe {
            ui_dev_create(self.fd()).map_err(ioctl_err)?;
        }
        self.state = State::Created;
        Ok(())
    }

    /// Writes one `(type, code, value)` event. A no-op before the device
    /// is created or after it is destroyed.
    pub fn write_event(&mut self, kind: u16, code: u16, value: i32) -> WiiResult<()> {
        if self.state != State::Created {
            return Ok(());
        }
        let ev = InputEvent { time: TimeVal::default(), kind, code, value };
        let bytes = unsafe {
            std::slice::from_raw_parts((&ev as *const InputEvent) as *const u8, std::mem::size_of::<InputEvent>())
        };
        self.file.write_all(bytes).map_err(WiiError::Uinput)?;
        Ok(())
    }

    /// Writes a `SYN_REPORT` event.
    pub fn sync(&mut self) -> WiiResult<()> {
        self.write_event(EV_SYN, 0, 0)
    }

    /// Destroys the kernel device, idempotently: a second call (or a
    /// call before `create`) is a no-op.
    pub fn destroy(&mut self) {
        if self.state != State::Created {
            return;
        }
        if let Some(tx) = self.ff_stop.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.ff_thread.take() {
            let _ = handle.join();
        }
        let _ = unsafe { ui_dev_destroy(self.fd()) };
        self.state = State::Destroyed;
    }
}

impl Drop for SyntheticDevice {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn ioctl_err(e: nix::Error) -> WiiError {
    WiiError::Uinput(std::io::Error::from_raw_os_error(e as i32))
}

fn ff_reader_loop<F: Fn(u16, i32)>(fd: RawFd, stop: mpsc::Receiver<()>, on_rumble: F) {
    use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
    loop {
        if stop.try_recv().is_ok() {
            return;
        }
        let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
        let mut fds = [PollFd::new(&borrowed, PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::from(500u16)) {
            Ok(n) if n > 0 => {}
            _ => continue,
        }
        let mut raw = [0u8; std::mem::size_of::<InputEvent>()];
        let n = unsafe { libc::read(fd, raw.as_mut_ptr() as *mut _, raw.len()) };
        if n != raw.len() as isize {
            continue;
        }
        let ev = unsafe { std::ptr::read(raw.as_ptr() as *const InputEvent) };
        if ev.kind == EV_FF {
            on_rumble(ev.code, ev.value);
        } else if ev.kind == EV_UINPUT {
            handle_ff_control(fd, ev.code, ev.value);
        }
    }
}

fn handle_ff_control(fd: RawFd, code: u16, value: i32) {
    match code {
        UI_FF_UPLOAD => {
            let mut upload = UinputFfUpload {
                request_id: value as u32,
                retval: 0,
                effect: FfEffect { opaque: [0; 32] },
                old: FfEffect { opaque: [0; 32] },
            };
            unsafe {
                let _ = ui_begin_ff_upload(fd, &mut upload);
                let _ = ui_end_ff_upload(fd, &mut upload);
            }
        }
        UI_FF_ERASE => {
            let mut erase = UinputFfErase { request_id: value as u32, retval: 0, effect_id: 0 };
            unsafe {
                let _ = ui_begin_ff_erase(fd, &mut erase);
                let _ = ui_end_ff_erase(fd, &mut erase);
            }
        }
        _ => {}
    }
}

/// Enables every code referenced by `mapping`'s populated cells on
/// `device`, following the three absprops cases from §4.9: a single
/// natural-axis target keeps the position's real range, a single
/// non-natural-axis target (button-emulated-as-axis) gets `{-1,1,0,0}`,
/// and a split two-target axis gets a halved range on each target.
pub fn enable_mapping_codes<P: crate::mapping::DescriptorPosition>(
    device: &mut SyntheticDevice,
    mapping: &Mapping<P>,
) -> WiiResult<()> {
    for (pos, entry) in mapping.iter() {
        enable_entry_codes(device, entry, pos.is_natural_axis(), pos.abs_range())?;
    }
    Ok(())
}

/// The absprops `(range, second_code)` an entry should be enabled with,
/// per the three cases in §4.9. Pulled out of [`enable_entry_codes`] so
/// the case selection can be tested without a real uinput file.
fn abs_props_for_entry(entry: &MappingEntry, is_natural_axis: bool, range: Option<AbsRange>) -> (AbsRange, Option<u16>) {
    match entry.second_code() {
        Some(second) => {
            let base = range.unwrap_or(AbsRange { min: 0, max: 0, fuzz: 0, flat: 0 });
            let half = AbsRange { min: base.min / 2, max: base.max / 2, fuzz: base.fuzz, flat: base.flat };
            (half, Some(second))
        }
        None if is_natural_axis => (range.unwrap_or(AbsRange { min: -1, max: 1, fuzz: 0, flat: 0 }), None),
        None => (AbsRange { min: -1, max: 1, fuzz: 0, flat: 0 }, None),
    }
}

fn enable_entry_codes(
    device: &mut SyntheticDevice,
    entry: &MappingEntry,
    is_natural_axis: bool,
    range: Option<AbsRange>,
) -> WiiResult<()> {
    use crate::codes::EventType;
    match entry.target_type {
        EventType::Key => device.enable_key(entry.code()),
        EventType::Abs => {
            let (primary, split) = abs_props_for_entry(entry, is_natural_axis, range);
            device.enable_abs(entry.code(), primary)?;
            if let Some(second) = split {
                device.enable_abs(second, primary)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes;
    use crate::mapping::MappingEntry;

    #[test]
    fn single_natural_axis_keeps_real_range() {
        let entry = MappingEntry::new(codes::EventType::Abs, &[codes::ABS_X]);
        let range = AbsRange { min: -120, max: 120, fuzz: 2, flat: 4 };
        let (out, split) = abs_props_for_entry(&entry, true, Some(range));
        assert_eq!(out, range);
        assert_eq!(split, None);
    }

    #[test]
    fn single_non_natural_axis_gets_plus_minus_one() {
        let entry = MappingEntry::new(codes::EventType::Abs, &[codes::ABS_X]);
        let (out, split) = abs_props_for_entry(&entry, false, None);
        assert_eq!(out, AbsRange { min: -1, max: 1, fuzz: 0, flat: 0 });
        assert_eq!(split, None);
    }

    #[test]
    fn split_axis_halves_the_range() {
        let entry = MappingEntry::new(codes::EventType::Abs, &[codes::ABS_Z, codes::ABS_RZ]);
        let range = AbsRange { min: -30, max: 30, fuzz: 1, flat: 1 };
        let (out, split) = abs_props_for_entry(&entry, true, Some(range));
        assert_eq!(out, AbsRange { min: -15, max: 15, fuzz: 1, flat: 1 });
        assert_eq!(split, Some(codes::ABS_RZ));
    }
}
