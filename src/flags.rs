//! Session-level enums and the protocol state bitset.

use bitflags::bitflags;
use num_derive::FromPrimitive;

/// The coarse hardware generation of the connected Wiimote, inferred
/// from its advertised Bluetooth name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Unknown,
    /// The original Wiimote ("Nintendo RVL-CNT-01").
    Gen10,
    /// Wiimote Plus, with a built-in Motion Plus ("-TR" suffix).
    Gen20,
    BalanceBoard,
    ProController,
}

/// What, if anything, is plugged into the expansion port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
pub enum ExtensionKind {
    None = 0,
    Unknown,
    Nunchuk,
    Classic,
    ClassicPro,
    BalanceBoard,
    Pro,
}

bitflags! {
    /// Protocol state flags tracked per [`DeviceSession`](crate::session::DeviceSession).
    ///
    /// `IrFull` implies both `IrBasic` and `IrExt`; `ExtActive` and
    /// `ExtUsed` both imply `ExtPlugged`. LED bits are kept mutually
    /// exclusive by [`crate::led::LedAllocator`] and [`set_led_by_index`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SessionFlags: u32 {
        const LED1 = 1 << 0;
        const LED2 = 1 << 1;
        const LED3 = 1 << 2;
        const LED4 = 1 << 3;
        const RUMBLE = 1 << 4;
        const ACCEL = 1 << 5;
        const IR_BASIC = 1 << 6;
        const IR_EXT = 1 << 7;
        const IR_FULL = 1 << 8;
        const EXT_PLUGGED = 1 << 9;
        const EXT_USED = 1 << 10;
        const EXT_ACTIVE = 1 << 11;
        const MP_PLUGGED = 1 << 12;
        const MP_USED = 1 << 13;
        const MP_ACTIVE = 1 << 14;
        const BUILTIN_MP = 1 << 15;
        const NO_MP = 1 << 16;
        const PRO_CALIB_DONE = 1 << 17;
    }
}

impl SessionFlags {
    /// Clears every LED bit and sets exactly the one corresponding to
    /// `index` (1-based). Indices outside `1..=4` clear all LED bits.
    pub fn set_led_by_index(&mut self, index: u8) {
        self.remove(Self::LED1 | Self::LED2 | Self::LED3 | Self::LED4);
        let bit = match index {
            1 => Self::LED1,
            2 => Self::LED2,
            3 => Self::LED3,
            4 => Self::LED4,
            _ => return,
        };
        self.insert(bit);
    }

    /// One byte with bits 4..7 holding the LED state and bit 0 holding
    /// the rumble bit, as expected by the LED-write (0x11) command.
    pub fn led_byte(&self) -> u8 {
        let mut byte = 0u8;
        if self.contains(Self::LED1) {
            byte |= 1 << 4;
        }
        if self.contains(Self::LED2) {
            byte |= 1 << 5;
        }
        if self.contains(Self::LED3) {
            byte |= 1 << 6;
        }
        if self.contains(Self::LED4) {
            byte |= 1 << 7;
        }
        if self.contains(Self::RUMBLE) {
            byte |= 1;
        }
        byte
    }

    /// Sets `EXT_USED` (and implicitly requires `EXT_PLUGGED` to already
    /// be set by the caller for the invariant to hold).
    pub fn enable_extension(&mut self) {
        self.insert(Self::EXT_USED);
    }

    /// Clears `EXT_USED` only, leaving every other bit untouched.
    ///
    /// The original driver cleared this with a plain AND against the
    /// flag's own bit, which zeroes every flag whose bit isn't also set
    /// in `EXT_USED`; that is a bug. This clears via AND-NOT instead.
    pub fn disable_extension(&mut self) {
        self.remove(Self::EXT_USED);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn led_by_index_is_exclusive() {
        let mut f = SessionFlags::empty();
        f.set_led_by_index(3);
        assert_eq!(f, SessionFlags::LED3);
        f.set_led_by_index(1);
        assert_eq!(f, SessionFlags::LED1);
    }

    #[test]
    fn led_by_index_out_of_range_clears() {
        let mut f = SessionFlags::LED2;
        f.set_led_by_index(9);
        assert!(!f.intersects(SessionFlags::LED1 | SessionFlags::LED2 | SessionFlags::LED3 | SessionFlags::LED4));
    }

    #[test]
    fn disable_extension_is_and_not() {
        let mut f = SessionFlags::EXT_USED | SessionFlags::EXT_PLUGGED | SessionFlags::ACCEL;
        f.disable_extension();
        assert_eq!(f, SessionFlags::EXT_PLUGGED | SessionFlags::ACCEL);
    }
}
