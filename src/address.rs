//! Controller addressing and protocol-generation discrimination.

use crate::flags::DeviceKind;
use std::fmt;

/// A Bluetooth device address, in the usual big-endian byte order used
/// when printing (`AA:BB:CC:DD:EE:FF`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BdAddr(pub [u8; 6]);

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// A controller's Bluetooth address together with the advertised device
/// name, which is the only signal this crate has for telling protocol
/// generations apart before any report has been received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerAddress {
    pub addr: BdAddr,
    pub name: String,
}

impl ControllerAddress {
    pub fn new(addr: BdAddr, name: impl Into<String>) -> Self {
        Self {
            addr,
            name: name.into(),
        }
    }

    /// Whether this address uses the v2 (Wiimote Plus / Pro Controller)
    /// wire generation, which opens an extra control channel and sends
    /// commands on the data PSM instead of the control PSM.
    pub fn is_v2(&self) -> bool {
        self.name.ends_with("-TR") || self.name.ends_with("-UC")
    }

    /// The report-type prefix byte this address's generation expects on
    /// every outbound frame.
    pub fn report_type_byte(&self) -> u8 {
        if self.is_v2() {
            0xA2
        } else {
            0x52
        }
    }

    /// Classifies the [`DeviceKind`] implied by the advertised name alone.
    /// Balance Boards and Pro Controllers are distinguishable this way;
    /// a plain Wiimote vs. Wiimote Plus is not (both advertise as
    /// `"Nintendo RVL-CNT-01"` pre-Plus, `"-TR"` post-Plus, so a `-TR`
    /// suffix is classified as [`DeviceKind::Gen20`]).
    pub fn device_kind(&self) -> DeviceKind {
        if self.name.ends_with("-UC") {
            DeviceKind::ProController
        } else if self.name == "Nintendo RVL-WBC-01" {
            DeviceKind::BalanceBoard
        } else if self.name.ends_with("-TR") {
            DeviceKind::Gen20
        } else if self.name == "Nintendo RVL-CNT-01" {
            DeviceKind::Gen10
        } else {
            DeviceKind::Unknown
        }
    }

    /// Is this the variant of Pro Controller whose battery is scaled
    /// with a divisor of 255 rather than 208 (§4.4)?
    pub fn is_battery_uc_scale(&self) -> bool {
        self.name.contains("RVL-CNT-01-UC")
    }
}

impl fmt::Display for ControllerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.addr, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(name: &str) -> ControllerAddress {
        ControllerAddress::new(BdAddr([0, 1, 2, 3, 4, 5]), name)
    }

    #[test]
    fn classifies_known_names() {
        assert_eq!(addr("Nintendo RVL-CNT-01").device_kind(), DeviceKind::Gen10);
        assert_eq!(
            addr("Nintendo RVL-CNT-01-TR").device_kind(),
            DeviceKind::Gen20
        );
        assert_eq!(
            addr("Nintendo RVL-CNT-01-UC").device_kind(),
            DeviceKind::ProController
        );
        assert_eq!(
            addr("Nintendo RVL-WBC-01").device_kind(),
            DeviceKind::BalanceBoard
        );
        assert_eq!(addr("something else").device_kind(), DeviceKind::Unknown);
    }

    #[test]
    fn v1_vs_v2_report_byte() {
        assert_eq!(addr("Nintendo RVL-CNT-01").report_type_byte(), 0x52);
        assert_eq!(addr("Nintendo RVL-CNT-01-TR").report_type_byte(), 0xA2);
        assert_eq!(addr("Nintendo RVL-CNT-01-UC").report_type_byte(), 0xA2);
    }

    #[test]
    fn battery_scale_selection() {
        assert!(addr("Nintendo RVL-CNT-01-UC").is_battery_uc_scale());
        assert!(!addr("Nintendo RVL-CNT-01-TR").is_battery_uc_scale());
    }
}
