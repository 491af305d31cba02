//! Command builders and the Data Reporting Mode selector.
//!
//! Everything here is a pure function from session state to a byte buffer
//! or a decision; the actual sending, rendezvous and dispatch live in
//! [`crate::session`], [`crate::command_queue`] and [`crate::receiver`].

use crate::flags::{DeviceKind, SessionFlags};

pub const CMD_RUMBLE: u8 = 0x10;
pub const CMD_LED: u8 = 0x11;
pub const CMD_DRM: u8 = 0x12;
pub const CMD_WRITE_MEM: u8 = 0x16;
pub const CMD_STATUS: u8 = 0x15;
pub const CMD_READ_MEM: u8 = 0x17;

pub const REPLY_STATUS: u8 = 0x20;
pub const REPLY_READ_MEM: u8 = 0x21;
pub const REPLY_ACK: u8 = 0x22;

/// Data Reporting Mode codes, named as in the kernel/wiibrew documentation.
pub mod drm {
    pub const K: u8 = 0x30;
    pub const KA: u8 = 0x31;
    pub const KIE: u8 = 0x36;
    pub const KAI: u8 = 0x33;
    pub const KEE: u8 = 0x34;
    pub const KAE: u8 = 0x35;
    pub const KAIE: u8 = 0x37;
    pub const SKAI1: u8 = 0x3E;
}

const EXT_MEM_BANK: u8 = 0x04;
pub const EXT_INIT_ADDR_1: u32 = 0xA400F0;
pub const EXT_INIT_ADDR_2: u32 = 0xA400FB;
pub const EXT_SIG_ADDR: u32 = 0xA400FA;

/// Builds the one-byte LED write command (0x11): LED bits 4..7, rumble
/// bit 0.
pub fn led_command(flags: SessionFlags) -> [u8; 2] {
    [CMD_LED, flags.led_byte()]
}

/// Builds the two-byte DRM-set command (0x12).
pub fn drm_command(flags: SessionFlags, drm_code: u8) -> [u8; 3] {
    let rumble = if flags.contains(SessionFlags::RUMBLE) { 1 } else { 0 };
    [CMD_DRM, rumble | 0x04, drm_code]
}

/// Builds the one-byte status-request command (0x15).
pub fn status_command(flags: SessionFlags) -> [u8; 2] {
    let rumble = if flags.contains(SessionFlags::RUMBLE) { 1 } else { 0 };
    [CMD_STATUS, rumble]
}

/// Builds the six-byte read-memory command (0x17). `space` byte is 0x00
/// for EEPROM, `EXT_MEM_BANK` for the extension/register area.
pub fn read_mem_command(addr: u32, len: u16, eeprom: bool) -> [u8; 7] {
    let space = if eeprom { 0x00 } else { EXT_MEM_BANK };
    let addr_bytes = addr.to_be_bytes();
    let len_bytes = len.to_be_bytes();
    [
        CMD_READ_MEM,
        space,
        addr_bytes[1],
        addr_bytes[2],
        addr_bytes[3],
        len_bytes[0],
        len_bytes[1],
    ]
}

/// Builds the 22-byte write-memory command (0x16): space, 24-bit address,
/// length byte, 16 bytes of (zero-padded) data.
pub fn write_mem_command(addr: u32, data: &[u8], eeprom: bool) -> [u8; 22] {
    assert!(data.len() <= 16, "write-memory payload is capped at 16 bytes");
    let space = if eeprom { 0x00 } else { EXT_MEM_BANK };
    let addr_bytes = addr.to_be_bytes();
    let mut buf = [0u8; 22];
    buf[0] = CMD_WRITE_MEM;
    buf[1] = space;
    buf[2] = addr_bytes[1];
    buf[3] = addr_bytes[2];
    buf[4] = addr_bytes[3];
    buf[5] = data.len() as u8;
    buf[6..6 + data.len()].copy_from_slice(data);
    buf
}

/// Picks the Data Reporting Mode for the given device kind and flag
/// state, per the priority table in §4.4. First matching row wins.
pub fn select_drm(device: DeviceKind, flags: SessionFlags) -> u8 {
    let ext_or_mp_used = flags.intersects(SessionFlags::EXT_USED | SessionFlags::MP_USED);
    let accel = flags.contains(SessionFlags::ACCEL);

    if device == DeviceKind::BalanceBoard {
        return if ext_or_mp_used { drm::KEE } else { drm::K };
    }
    if flags.contains(SessionFlags::IR_BASIC) && accel {
        return drm::KAIE;
    }
    if flags.contains(SessionFlags::IR_BASIC) {
        return drm::KIE;
    }
    if flags.contains(SessionFlags::IR_EXT) {
        return drm::KAI;
    }
    if flags.contains(SessionFlags::IR_FULL) {
        return drm::SKAI1;
    }
    if accel && ext_or_mp_used {
        return drm::KAE;
    }
    if accel {
        return drm::KA;
    }
    if ext_or_mp_used {
        return drm::KEE;
    }
    drm::K
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_board_overrides_everything() {
        let flags = SessionFlags::ACCEL | SessionFlags::IR_FULL;
        assert_eq!(select_drm(DeviceKind::BalanceBoard, flags), drm::KEE);
        assert_eq!(
            select_drm(DeviceKind::BalanceBoard, SessionFlags::empty()),
            drm::K
        );
    }

    #[test]
    fn ir_full_overrides_accel_and_ext() {
        let flags = SessionFlags::IR_FULL | SessionFlags::ACCEL | SessionFlags::EXT_USED;
        assert_eq!(select_drm(DeviceKind::Gen10, flags), drm::SKAI1);
    }

    #[test]
    fn ir_basic_with_accel_picks_kaie() {
        let flags = SessionFlags::IR_BASIC | SessionFlags::ACCEL;
        assert_eq!(select_drm(DeviceKind::Gen10, flags), drm::KAIE);
    }

    #[test]
    fn plain_accel_picks_ka() {
        assert_eq!(
            select_drm(DeviceKind::Gen10, SessionFlags::ACCEL),
            drm::KA
        );
    }

    #[test]
    fn ext_alone_picks_kee() {
        assert_eq!(
            select_drm(DeviceKind::Gen10, SessionFlags::EXT_USED),
            drm::KEE
        );
    }

    #[test]
    fn nothing_set_picks_k() {
        assert_eq!(select_drm(DeviceKind::Gen10, SessionFlags::empty()), drm::K);
    }

    #[test]
    fn led_command_packs_bits_and_rumble() {
        let flags = SessionFlags::LED2 | SessionFlags::RUMBLE;
        assert_eq!(led_command(flags), [CMD_LED, 0b0010_0001]);
    }

    #[test]
    fn read_mem_command_layout() {
        let cmd = read_mem_command(0xA400FA, 6, false);
        assert_eq!(cmd, [CMD_READ_MEM, 0x04, 0x40, 0x00, 0xFA, 0x00, 0x06]);
    }
}
