//! The error type shared by every fallible operation in this crate.

use thiserror::Error;

/// The result type used throughout this crate.
pub type WiiResult<T> = Result<T, WiiError>;

/// Everything that can go wrong while driving a Wii or Wii U controller.
#[derive(Debug, Error)]
pub enum WiiError {
    /// A send or receive on an L2CAP socket failed, or returned a
    /// zero-length read. Always followed by a session disconnect.
    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// A command was issued but the transport failed before a reply
    /// arrived; surfaced to the caller as error code 0xFF.
    #[error("command failed before a reply was received")]
    CommandFailed,

    /// No status reply was observed for longer than the configured
    /// timeout; treated identically to a transport error.
    #[error("protocol timeout: no status reply for over {0:?}")]
    ProtocolTimeout(std::time::Duration),

    /// Neither `/dev/uinput` nor `/dev/input/uinput` could be opened.
    #[error("could not open a uinput device: {0}")]
    UinputUnavailable(#[source] std::io::Error),

    /// A `uinput` ioctl returned an error.
    #[error("uinput ioctl failed: {0}")]
    Uinput(#[source] std::io::Error),

    /// A mapping line referenced a target code family that doesn't
    /// match the other codes on the same line.
    #[error("mapping line mixes key and axis code families")]
    MixedCodeFamily,

    /// A mapping line referenced an event code name this crate doesn't
    /// recognize.
    #[error("unknown target code: {0}")]
    UnknownCode(String),

    /// A mapping line could not be parsed at all.
    #[error("malformed mapping line: {0}")]
    MalformedLine(String),

    /// The session is no longer connected.
    #[error("session is disconnected")]
    Disconnected,
}

impl From<std::io::Error> for WiiError {
    fn from(err: std::io::Error) -> Self {
        WiiError::Transport(err)
    }
}
