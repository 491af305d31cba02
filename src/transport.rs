//! Raw L2CAP sockets to a controller's control (PSM 17) and data (PSM 19)
//! channels.
//!
//! `libc` does not expose the Bluetooth address family or the L2CAP socket
//! address layout, so both are declared locally against the Linux ABI,
//! the same way a raw-socket protocol engine in this ecosystem declares
//! the HCI address family it needs instead of waiting for `libc` to grow it.

use crate::address::{BdAddr, ControllerAddress};
use crate::error::WiiResult;
use libc::{c_int, c_ushort, sockaddr, socklen_t};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

const AF_BLUETOOTH: c_int = 31;
const BTPROTO_L2CAP: c_int = 0;

pub const PSM_CONTROL: u16 = 0x11;
pub const PSM_DATA: u16 = 0x13;

/// Mirrors Linux's `struct sockaddr_l2` (see `bluetooth/l2cap.h`).
#[repr(C)]
#[derive(Clone, Copy)]
struct SockaddrL2 {
    l2_family: c_ushort,
    l2_psm: c_ushort,
    l2_bdaddr: [u8; 6],
    l2_cid: c_ushort,
    l2_bdaddr_type: u8,
}

impl SockaddrL2 {
    fn new(addr: &BdAddr, psm: u16) -> Self {
        // The kernel expects the address in little-endian byte order
        // regardless of how it is conventionally printed.
        let mut bdaddr = addr.0;
        bdaddr.reverse();
        Self {
            l2_family: AF_BLUETOOTH as c_ushort,
            l2_psm: psm.to_le(),
            l2_bdaddr: bdaddr,
            l2_cid: 0,
            l2_bdaddr_type: 0,
        }
    }
}

fn connect_l2cap(addr: &BdAddr, psm: u16) -> io::Result<OwnedFd> {
    let raw_fd = unsafe { libc::socket(AF_BLUETOOTH, libc::SOCK_SEQPACKET, BTPROTO_L2CAP) };
    if raw_fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `raw_fd` was just created above and is owned by nobody else.
    let fd = unsafe { OwnedFd::from_raw_fd(raw_fd) };

    let sockaddr = SockaddrL2::new(addr, psm);
    let res = unsafe {
        libc::connect(
            fd.as_raw_fd(),
            &sockaddr as *const SockaddrL2 as *const sockaddr,
            std::mem::size_of::<SockaddrL2>() as socklen_t,
        )
    };
    if res != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd)
}

fn recv_fd(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut _, buf.len(), 0) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

fn send_fd(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    let n = unsafe { libc::send(fd, buf.as_ptr() as *const _, buf.len(), 0) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

/// The two L2CAP sockets that make up a connection to a single controller.
///
/// For v1 devices the control socket (PSM 17) both sends commands and is
/// otherwise unused, and the data socket (PSM 19) carries inbound reports.
/// For v2 devices ("-TR", "-UC") an extra control channel is opened at
/// PSM 17 but commands are instead sent over the data socket, per §4.1.
pub struct Transport {
    report_type: u8,
    control: OwnedFd,
    data: OwnedFd,
    /// True for v2 devices, where `data` (not `control`) is the send socket.
    send_on_data: bool,
}

impl Transport {
    /// Opens both L2CAP channels to `address` and performs the
    /// generation-dependent wiring described in §4.1.
    pub fn connect(address: &ControllerAddress) -> WiiResult<Self> {
        let control = connect_l2cap(&address.addr, PSM_CONTROL)?;
        let data = connect_l2cap(&address.addr, PSM_DATA)?;
        Ok(Self {
            report_type: address.report_type_byte(),
            control,
            data,
            send_on_data: address.is_v2(),
        })
    }

    /// The file descriptor the [`Receiver`](crate::receiver::Receiver)
    /// should poll for inbound reports.
    pub fn data_fd(&self) -> RawFd {
        self.data.as_raw_fd()
    }

    fn send_fd(&self) -> RawFd {
        if self.send_on_data {
            self.data.as_raw_fd()
        } else {
            self.control.as_raw_fd()
        }
    }

    /// Sends one command frame, prefixing it with the report-type byte.
    pub fn send(&self, payload: &[u8]) -> WiiResult<()> {
        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.push(self.report_type);
        frame.extend_from_slice(payload);
        send_fd(self.send_fd(), &frame)?;
        Ok(())
    }

    /// Reads one inbound frame from the data socket. Returns `(code,
    /// payload)`, having stripped the report-type echo byte. A zero-length
    /// frame (`Ok(None)`) signals disconnection.
    pub fn recv(&self) -> WiiResult<Option<(u8, Vec<u8>)>> {
        let mut buf = [0u8; 32];
        let n = recv_fd(self.data.as_raw_fd(), &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        if n < 2 {
            return Ok(Some((0, Vec::new())));
        }
        Ok(Some((buf[1], buf[2..n].to_vec())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sockaddr_l2_reverses_address_bytes() {
        let addr = BdAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        let sa = SockaddrL2::new(&addr, PSM_DATA);
        assert_eq!(sa.l2_bdaddr, [0x55, 0x44, 0x33, 0x22, 0x11, 0x00]);
        assert_eq!(sa.l2_family, AF_BLUETOOTH as c_ushort);
    }
}
