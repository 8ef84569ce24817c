use std::os::fd::{AsRawFd, OwnedFd};

use nix::sys::socket::{recv, send, socketpair, AddressFamily, MsgFlags, SockFlag, SockType};

use crate::Error;

/// Ordered, boundary-preserving endpoint pair used for the cross-process
/// handshake between the Supervisor and Init. Built on `SOCK_SEQPACKET`
/// rather than a pipe: the handshake only ever carries small integers, and a
/// datagram socket keeps message boundaries without requiring a framing
/// layer on top of a byte stream.
#[derive(Debug)]
pub struct IpcChannel(OwnedFd);

impl IpcChannel {
    /// Creates a connected pair of endpoints, both already close-on-exec so
    /// neither leaks into the final `exec`'d command.
    pub(crate) fn pair() -> Result<(Self, Self), Error> {
        let (a, b) = socketpair(
            AddressFamily::Unix,
            SockType::SeqPacket,
            None,
            SockFlag::SOCK_CLOEXEC,
        )
        .map_err(|e| Error::syscall("socketpair", e))?;
        Ok((Self(a), Self(b)))
    }

    /// Sends one signed 32-bit message. A short write is a handshake error:
    /// the contract promises each `send` delivers exactly one message.
    pub(crate) fn send(&self, value: i32) -> Result<(), Error> {
        let buf = value.to_le_bytes();
        let n = send(self.0.as_raw_fd(), &buf, MsgFlags::empty())
            .map_err(|e| Error::syscall("send", e))?;
        if n != buf.len() {
            return Err(Error::handshake("short write on ipc channel"));
        }
        Ok(())
    }

    /// Receives one signed 32-bit message. Zero bytes means the peer closed
    /// its end, which is observable end-of-stream rather than a valid value.
    pub(crate) fn recv(&self) -> Result<i32, Error> {
        let mut buf = [0u8; 4];
        let n = recv(self.0.as_raw_fd(), &mut buf, MsgFlags::empty())
            .map_err(|e| Error::syscall("recv", e))?;
        if n == 0 {
            return Err(Error::handshake("peer closed ipc channel"));
        }
        if n != buf.len() {
            return Err(Error::handshake("short read on ipc channel"));
        }
        Ok(i32::from_le_bytes(buf))
    }
}
