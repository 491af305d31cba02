//! Linux input event type/code constants and the name→code lookup table
//! that replaces the `eval`-on-strings trick of the original mapping
//! parser (§9).

/// The two code families a mapping target can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Key,
    Abs,
}

pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_ABS: u16 = 0x03;
pub const SYN_REPORT: u16 = 0;

pub const BTN_A: u16 = 0x130;
pub const BTN_B: u16 = 0x131;
pub const BTN_C: u16 = 0x132;
pub const BTN_X: u16 = 0x133;
pub const BTN_Y: u16 = 0x134;
pub const BTN_Z: u16 = 0x135;
pub const BTN_TL: u16 = 0x136;
pub const BTN_TR: u16 = 0x137;
pub const BTN_TL2: u16 = 0x138;
pub const BTN_TR2: u16 = 0x139;
pub const BTN_SELECT: u16 = 0x13a;
pub const BTN_START: u16 = 0x13b;
pub const BTN_MODE: u16 = 0x13c;
pub const BTN_THUMBL: u16 = 0x13d;
pub const BTN_THUMBR: u16 = 0x13e;

pub const BTN_DPAD_UP: u16 = 0x220;
pub const BTN_DPAD_DOWN: u16 = 0x221;
pub const BTN_DPAD_LEFT: u16 = 0x222;
pub const BTN_DPAD_RIGHT: u16 = 0x223;

pub const BTN_TRIGGER_HAPPY1: u16 = 0x2c0;
pub const BTN_TRIGGER_HAPPY40: u16 = 0x2e7;

pub const BTN_JOYSTICK: u16 = 0x120;
pub const BTN_GEAR_UP: u16 = 0x151;

pub const KEY_ESC: u16 = 1;
pub const KEY_ENTER: u16 = 28;
pub const KEY_SPACE: u16 = 57;
pub const KEY_LEFT: u16 = 105;
pub const KEY_RIGHT: u16 = 106;
pub const KEY_UP: u16 = 103;
pub const KEY_DOWN: u16 = 108;
pub const KEY_HOME: u16 = 102;
pub const KEY_PAGEUP: u16 = 104;
pub const KEY_PAGEDOWN: u16 = 109;

pub const ABS_X: u16 = 0x00;
pub const ABS_Y: u16 = 0x01;
pub const ABS_Z: u16 = 0x02;
pub const ABS_RX: u16 = 0x03;
pub const ABS_RY: u16 = 0x04;
pub const ABS_RZ: u16 = 0x05;
pub const ABS_MAX: u16 = 0x3f;

/// Looks up a raw or pretty target token, returning its event type and
/// code. Unrecognized names yield `None`; the caller (mapping-line
/// parser) turns that into `WiiError::UnknownCode`.
pub fn lookup(name: &str) -> Option<(EventType, u16)> {
    let key = |code| Some((EventType::Key, code));
    let abs = |code| Some((EventType::Abs, code));
    match name {
        "BTN_A" | "XBOX360_A" => key(BTN_A),
        "BTN_B" | "XBOX360_B" => key(BTN_B),
        "BTN_C" => key(BTN_C),
        "BTN_X" | "XBOX360_X" => key(BTN_X),
        "BTN_Y" | "XBOX360_Y" => key(BTN_Y),
        "BTN_Z" => key(BTN_Z),
        "BTN_TL" | "XBOX360_LB" => key(BTN_TL),
        "BTN_TR" | "XBOX360_RB" => key(BTN_TR),
        "BTN_TL2" | "XBOX360_LT" => key(BTN_TL2),
        "BTN_TR2" | "XBOX360_RT" => key(BTN_TR2),
        "BTN_SELECT" | "XBOX360_BACK" => key(BTN_SELECT),
        "BTN_START" | "XBOX360_START" => key(BTN_START),
        "BTN_MODE" | "XBOX360_GUIDE" => key(BTN_MODE),
        "BTN_THUMBL" | "XBOX360_LSB" => key(BTN_THUMBL),
        "BTN_THUMBR" | "XBOX360_RSB" => key(BTN_THUMBR),
        "BTN_DPAD_UP" => key(BTN_DPAD_UP),
        "BTN_DPAD_DOWN" => key(BTN_DPAD_DOWN),
        "BTN_DPAD_LEFT" => key(BTN_DPAD_LEFT),
        "BTN_DPAD_RIGHT" => key(BTN_DPAD_RIGHT),
        "KEY_ESC" => key(KEY_ESC),
        "KEY_ENTER" => key(KEY_ENTER),
        "KEY_SPACE" => key(KEY_SPACE),
        "KEY_LEFT" => key(KEY_LEFT),
        "KEY_RIGHT" => key(KEY_RIGHT),
        "KEY_UP" => key(KEY_UP),
        "KEY_DOWN" => key(KEY_DOWN),
        "KEY_HOME" => key(KEY_HOME),
        "KEY_PAGEUP" => key(KEY_PAGEUP),
        "KEY_PAGEDOWN" => key(KEY_PAGEDOWN),
        "ABS_X" => abs(ABS_X),
        "ABS_Y" => abs(ABS_Y),
        "ABS_Z" => abs(ABS_Z),
        "ABS_RX" => abs(ABS_RX),
        "ABS_RY" => abs(ABS_RY),
        "ABS_RZ" => abs(ABS_RZ),
        _ => None,
    }
}

/// Whether `code` falls in one of the OS's "gamepad-recognized" ranges
/// (§6: `BTN_JOYSTICK..BTN_GEAR_UP`, `BTN_DPAD_UP..BTN_TRIGGER_HAPPY40`,
/// `ABS_X..ABS_MAX`). Used to decide the Xorg-keyboard-blacklist rename.
pub fn is_gamepad_bit(ty: EventType, code: u16) -> bool {
    match ty {
        EventType::Key => {
            (BTN_JOYSTICK..=BTN_GEAR_UP).contains(&code)
                || (BTN_DPAD_UP..=BTN_TRIGGER_HAPPY40).contains(&code)
        }
        EventType::Abs => (ABS_X..=ABS_MAX).contains(&code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_resolves_same_as_canonical() {
        assert_eq!(lookup("BTN_A"), lookup("XBOX360_A"));
    }

    #[test]
    fn unknown_name_is_none() {
        assert_eq!(lookup("NOT_A_REAL_CODE"), None);
    }

    #[test]
    fn gamepad_bit_ranges() {
        assert!(is_gamepad_bit(EventType::Abs, ABS_X));
        assert!(!is_gamepad_bit(EventType::Key, KEY_ESC));
        assert!(is_gamepad_bit(EventType::Key, BTN_DPAD_UP));
    }
}
