use std::ffi::NulError;
use std::string::FromUtf8Error;

/// Error kinds a launch can fail with, matching the taxonomy a caller needs
/// to tell a misconfigured request apart from a kernel refusal mid-handshake.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid request fields; nothing was acquired yet, no cleanup needed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Allocation or fd-table exhaustion.
    #[error("resource error: {0}")]
    Resource(String),

    /// Pre-existing cgroup directory, unwritable mount source, missing
    /// kernel features.
    #[error("host-state error: {0}")]
    HostState(String),

    /// Peer closed unexpectedly, or a short read/write on the IPC channel.
    #[error("handshake error: {0}")]
    Handshake(String),

    /// A kernel-refused operation: mount, pivot_root, capability drop, ...
    #[error("syscall error: {0}: {1}")]
    Syscall(&'static str, nix::errno::Errno),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn host_state(msg: impl Into<String>) -> Self {
        Self::HostState(msg.into())
    }

    pub fn handshake(msg: impl Into<String>) -> Self {
        Self::Handshake(msg.into())
    }

    /// Tags a raw errno with the syscall that produced it.
    pub fn syscall(op: &'static str, errno: nix::errno::Errno) -> Self {
        Self::Syscall(op, errno)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.raw_os_error().map(nix::errno::Errno::from_raw) {
            Some(errno) => Self::Resource(errno.to_string()),
            None => Self::Resource(err.to_string()),
        }
    }
}

impl From<NulError> for Error {
    fn from(err: NulError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<FromUtf8Error> for Error {
    fn from(err: FromUtf8Error) -> Self {
        Self::Handshake(err.to_string())
    }
}
