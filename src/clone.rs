use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};

use crate::Error;

pub type Pid = nix::unistd::Pid;

/// Mirrors the kernel's `clone_args` struct for the `clone3` syscall, which
/// has no libc wrapper. `stack`/`stack_size` are left zero: like `fork`, a
/// zero stack tells the kernel to duplicate the caller's via copy-on-write,
/// so no caller-provided child stack is ever allocated here.
#[repr(C, align(8))]
#[derive(Debug, Default)]
pub(crate) struct CloneArgs {
    pub flags: u64,
    pub pidfd: u64,
    pub child_tid: u64,
    pub parent_tid: u64,
    pub exit_signal: u64,
    pub stack: u64,
    pub stack_size: u64,
    pub tls: u64,
    pub set_tid: u64,
    pub set_tid_size: u64,
    pub cgroup: u64,
}

impl CloneArgs {
    pub fn flag_newns(&mut self) {
        self.flags |= nix::libc::CLONE_NEWNS as u64;
    }

    pub fn flag_newpid(&mut self) {
        self.flags |= nix::libc::CLONE_NEWPID as u64;
    }

    pub fn flag_newipc(&mut self) {
        self.flags |= nix::libc::CLONE_NEWIPC as u64;
    }

    pub fn flag_newuts(&mut self) {
        self.flags |= nix::libc::CLONE_NEWUTS as u64;
    }

    pub fn flag_newcgroup(&mut self) {
        self.flags |= nix::libc::CLONE_NEWCGROUP as u64;
    }
}

pub(crate) enum CloneResult {
    Child,
    Parent { child: Pid },
}

/// Raw `clone3` invocation. Safety: the caller must ensure `cl_args` stays
/// alive for the call and that the child side of the fork only runs code
/// safe to run after a single-threaded fork (no allocator state shared with
/// threads that no longer exist on this side).
pub(crate) unsafe fn clone3(cl_args: &CloneArgs) -> Result<CloneResult, nix::errno::Errno> {
    let res = nix::libc::syscall(
        nix::libc::SYS_clone3,
        cl_args as *const CloneArgs,
        core::mem::size_of::<CloneArgs>(),
    );
    nix::errno::Errno::result(res).map(|v| match v {
        0 => CloneResult::Child,
        v => CloneResult::Parent {
            child: Pid::from_raw(v as nix::libc::pid_t),
        },
    })
}

pub(crate) fn exit_child<T, E>(result: Result<T, E>) -> ! {
    match result {
        Ok(_) => unsafe { nix::libc::_exit(0) },
        Err(_) => unsafe { nix::libc::_exit(1) },
    }
}

/// Wait-on-drop handle for a cloned child. Reaping a child on every exit
/// path keeps the coordinator's fatal-error unwinding from leaking a zombie.
pub(crate) struct OwnedPid(Option<Pid>);

impl OwnedPid {
    pub unsafe fn from_raw(pid: Pid) -> Self {
        Self(Some(pid))
    }

    pub fn as_raw(&self) -> Pid {
        self.0.unwrap()
    }

    /// Waits for the child and maps its exit status onto the Supervisor's
    /// own exit code, per spec: "boolean OR of its own failure flag and a
    /// truncation of Init's exit status."
    pub fn wait_status(mut self) -> Result<i32, Error> {
        let pid = self.0.take().unwrap();
        match waitpid(pid, Some(WaitPidFlag::__WALL))
            .map_err(|e| Error::syscall("waitpid", e))?
        {
            WaitStatus::Exited(_, code) => Ok(code),
            WaitStatus::Signaled(_, sig, _) => Ok(128 + sig as i32),
            status => Err(Error::handshake(format!("unexpected wait status: {status:?}"))),
        }
    }
}

impl Drop for OwnedPid {
    fn drop(&mut self) {
        if let Some(pid) = self.0.take() {
            let _ = waitpid(pid, Some(WaitPidFlag::__WALL));
        }
    }
}

pub(crate) fn ignore_kind(
    result: std::io::Result<()>,
    kind: std::io::ErrorKind,
) -> std::io::Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.kind() == kind {
                Ok(())
            } else {
                Err(err)
            }
        }
    }
}
