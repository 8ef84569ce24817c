use std::collections::BTreeMap;
use std::convert::TryInto;

use caps::CapSet;
use seccompiler::{apply_filter, BpfProgram, SeccompAction, SeccompFilter};

use crate::Error;

/// Closed syscall deny-list: each entry returns EPERM unconditionally rather
/// than executing. `clone`/`clone3` are deliberately left allowed since
/// workloads still need ordinary threading/forking inside the container.
const DENIED_SYSCALLS: &[i64] = &[
    nix::libc::SYS_mount,
    nix::libc::SYS_umount2,
    nix::libc::SYS_init_module,
    nix::libc::SYS_finit_module,
    nix::libc::SYS_delete_module,
    nix::libc::SYS_settimeofday,
    nix::libc::SYS_clock_settime,
    nix::libc::SYS_adjtimex,
    nix::libc::SYS_unshare,
    nix::libc::SYS_setns,
    nix::libc::SYS_ptrace,
    nix::libc::SYS_reboot,
    nix::libc::SYS_keyctl,
    nix::libc::SYS_add_key,
    nix::libc::SYS_request_key,
    nix::libc::SYS_semget,
    nix::libc::SYS_semop,
    nix::libc::SYS_semctl,
    nix::libc::SYS_shmget,
    nix::libc::SYS_shmat,
    nix::libc::SYS_shmctl,
    nix::libc::SYS_shmdt,
    nix::libc::SYS_msgget,
    nix::libc::SYS_msgsnd,
    nix::libc::SYS_msgrcv,
    nix::libc::SYS_msgctl,
];

const EPERM: u32 = nix::libc::EPERM as u32;

/// Drops capabilities from the bounding, inheritable, effective, permitted,
/// and ambient sets down to the default policy of none, then installs the
/// fixed syscall deny-list. Both are the last privileged actions before
/// `exec` of the user command; once installed, the filter and dropped
/// bounding set are inherited across `exec` and apply to all descendants.
pub(crate) fn apply() -> Result<(), Error> {
    drop_capabilities()?;
    install_syscall_filter()
}

fn drop_capabilities() -> Result<(), Error> {
    for cset in [
        CapSet::Bounding,
        CapSet::Inheritable,
        CapSet::Effective,
        CapSet::Permitted,
    ] {
        caps::clear(None, cset).map_err(|e| {
            Error::host_state(format!("clear {cset:?} capability set: {e}"))
        })?;
    }
    caps::clear(None, CapSet::Ambient)
        .map_err(|e| Error::host_state(format!("clear ambient capability set: {e}")))
}

fn install_syscall_filter() -> Result<(), Error> {
    let rules: BTreeMap<i64, Vec<seccompiler::SeccompRule>> = DENIED_SYSCALLS
        .iter()
        .map(|&syscall| (syscall, Vec::new()))
        .collect();
    let filter = SeccompFilter::new(
        rules,
        SeccompAction::Allow,
        SeccompAction::Errno(EPERM),
        std::env::consts::ARCH
            .try_into()
            .map_err(|_| Error::configuration("unsupported target architecture for seccomp"))?,
    )
    .map_err(|e| Error::configuration(format!("build seccomp filter: {e}")))?;
    let program: BpfProgram = filter
        .try_into()
        .map_err(|e| Error::configuration(format!("compile seccomp filter: {e}")))?;
    apply_filter(&program).map_err(|e| Error::host_state(format!("apply seccomp filter: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_list_excludes_clone() {
        assert!(!DENIED_SYSCALLS.contains(&nix::libc::SYS_clone));
        assert!(!DENIED_SYSCALLS.contains(&nix::libc::SYS_clone3));
    }

    #[test]
    fn deny_list_includes_mount_and_ptrace() {
        assert!(DENIED_SYSCALLS.contains(&nix::libc::SYS_mount));
        assert!(DENIED_SYSCALLS.contains(&nix::libc::SYS_ptrace));
    }
}
