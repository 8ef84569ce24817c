use std::fs::File;
use std::io::Write as _;

use nix::sched::{unshare, CloneFlags};
use nix::unistd::{setgroups, setresgid, setresuid, Gid, Pid, Uid};

use crate::ipc::IpcChannel;
use crate::Error;

/// Host/container uid & gid range used when writing `uid_map`/`gid_map`.
/// The fixed policy maps a contiguous block starting at container uid 0 to
/// a non-zero host offset, so container-root appears as an unprivileged
/// host user.
#[derive(Clone, Copy, Debug)]
pub struct IdRange {
    pub container_start: u32,
    pub host_start: u32,
    pub size: u32,
}

impl Default for IdRange {
    fn default() -> Self {
        Self {
            container_start: 0,
            host_start: 10000,
            size: 2000,
        }
    }
}

/// Ephemeral state of the two-sided user-namespace handshake. Exists only
/// across steps D.1-D.4; `failed` is reachable from either non-terminal
/// state on a negative outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemappingState {
    AwaitingChildUnshare,
    AwaitingParentMap,
    Ready,
    Failed,
}

/// Child (Init) side of the handshake: unshares into a new user namespace,
/// reports the outcome, blocks for the Supervisor's confirmation, then
/// drops privileges to `uid`/`gid`. The ordering inside step 5 is mandatory:
/// supplementary groups must be cleared before the euid is dropped, since
/// once euid is non-zero `setgroups` is forbidden.
pub(crate) fn remap_child(channel: &IpcChannel, uid: Uid, gid: Gid) -> Result<(), Error> {
    let outcome = match unshare(CloneFlags::CLONE_NEWUSER) {
        Ok(()) => 0,
        Err(errno) => {
            let _ = channel.send(-1);
            return Err(Error::syscall("unshare", errno));
        }
    };
    channel.send(outcome)?;

    let ack = channel.recv()?;
    if ack != 0 {
        return Err(Error::handshake(
            "supervisor failed to install uid/gid mapping",
        ));
    }

    setgroups(&[gid]).map_err(|e| Error::syscall("setgroups", e))?;
    setresgid(gid, gid, gid).map_err(|e| Error::syscall("setresgid", e))?;
    setresuid(uid, uid, uid).map_err(|e| Error::syscall("setresuid", e))?;
    Ok(())
}

/// Supervisor (parent) side of the handshake: waits for Init's unshare
/// outcome, then writes the fixed-offset uid/gid mapping directly into
/// `/proc/<pid>/{uid,gid}_map` (no `newuidmap`/`newgidmap` helper, since
/// the Supervisor already holds `CAP_SETUID`/`CAP_SETGID` over the new
/// namespace as its creator's parent).
pub(crate) fn remap_parent(channel: &IpcChannel, pid: Pid, range: IdRange) -> Result<(), Error> {
    let outcome = channel.recv()?;
    if outcome != 0 {
        let _ = channel.send(-1);
        return Err(Error::handshake("init failed to unshare user namespace"));
    }

    let result = write_id_map(pid, "uid_map", range).and_then(|_| write_id_map(pid, "gid_map", range));
    match result {
        Ok(()) => {
            channel.send(0)?;
            Ok(())
        }
        Err(err) => {
            let _ = channel.send(-1);
            Err(err)
        }
    }
}

fn write_id_map(pid: Pid, file: &str, range: IdRange) -> Result<(), Error> {
    let path = format!("/proc/{}/{file}", pid.as_raw());
    let line = format!("{} {} {}\n", range.host_start, range.container_start, range.size);
    File::options()
        .write(true)
        .open(&path)
        .and_then(|mut f| f.write_all(line.as_bytes()))
        .map_err(|e| Error::host_state(format!("write {path}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_range_matches_fixed_policy() {
        let range = IdRange::default();
        assert_eq!(range.container_start, 0);
        assert_eq!(range.host_start, 10000);
        assert_eq!(range.size, 2000);
    }

    #[test]
    fn id_map_line_is_bit_exact() {
        let range = IdRange {
            container_start: 0,
            host_start: 10000,
            size: 2000,
        };
        let line = format!("{} {} {}\n", range.host_start, range.container_start, range.size);
        assert_eq!(line, "10000 0 2000\n");
    }
}
