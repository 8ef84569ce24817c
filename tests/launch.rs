mod common;

use std::fs::create_dir_all;

use common::{rand_string, get_rootfs, TempDir};
use enclosure::{ContainerRequest, Error, ResourceLimits};

fn unpack_rootfs(dir: &TempDir) {
    let mut rootfs = get_rootfs().unwrap();
    rootfs.unpack(dir.as_path()).unwrap();
}

/// S1 — happy path: a zero-argument command exits cleanly, the cgroup
/// directory is gone afterward, and the supervisor reports exit code 0.
#[test]
fn happy_path_cleans_up_and_exits_zero() {
    let rootfs = TempDir::new().unwrap();
    unpack_rootfs(&rootfs);

    let hostname = format!("t-{}", rand_string(8));
    let request = ContainerRequest::options()
        .uid(0)
        .hostname(hostname.clone())
        .mount_source(rootfs.as_path())
        .command("/bin/true")
        .build()
        .unwrap();

    let outcome = enclosure::launch(request, ResourceLimits::default(), Default::default(), None)
        .unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert!(!std::path::Path::new("/sys/fs/cgroup").join(&hostname).exists());
}

/// S2 — cgroup collision: a pre-existing directory at the hostname path
/// makes the supervisor fail before Init ever pivots.
#[test]
fn cgroup_collision_fails_before_pivot() {
    let rootfs = TempDir::new().unwrap();
    unpack_rootfs(&rootfs);

    let hostname = format!("t-{}", rand_string(8));
    let cgroup_path = std::path::Path::new("/sys/fs/cgroup").join(&hostname);
    create_dir_all(&cgroup_path).unwrap();

    let request = ContainerRequest::options()
        .uid(0)
        .hostname(hostname)
        .mount_source(rootfs.as_path())
        .command("/bin/true")
        .build()
        .unwrap();

    let err = enclosure::launch(request, ResourceLimits::default(), Default::default(), None)
        .unwrap_err();
    assert!(matches!(err, Error::HostState(ref msg) if msg.contains("mkdir")));

    std::fs::remove_dir(&cgroup_path).unwrap();
}

/// S4 — mount source missing: Init fails at the bind-mount step and the
/// supervisor surfaces that as a non-zero launch result, not a panic.
#[test]
fn missing_mount_source_is_rejected_before_launch() {
    let hostname = format!("t-{}", rand_string(8));
    let err = ContainerRequest::options()
        .uid(0)
        .hostname(hostname)
        .mount_source("/does/not/exist")
        .command("/bin/true")
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

/// S5 — command non-zero exit: the supervisor's exit code reflects Init's,
/// and the cgroup is still released.
#[test]
fn nonzero_command_exit_propagates_and_still_cleans_up() {
    use std::os::unix::fs::PermissionsExt;

    let rootfs = TempDir::new().unwrap();
    unpack_rootfs(&rootfs);
    let script = rootfs.join("exit42.sh");
    std::fs::write(&script, "#!/bin/sh\nexit 42\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let hostname = format!("t-{}", rand_string(8));
    let request = ContainerRequest::options()
        .uid(0)
        .hostname(hostname.clone())
        .mount_source(rootfs.as_path())
        .command("/exit42.sh")
        .build()
        .unwrap();

    let outcome = enclosure::launch(request, ResourceLimits::default(), Default::default(), None)
        .unwrap();
    assert_eq!(outcome.exit_code, 42);
    assert!(!std::path::Path::new("/sys/fs/cgroup").join(&hostname).exists());
}

/// Without CLONE_NEWUSER at clone time, Init's namespace set requires real
/// privilege; an unprivileged caller sees a tagged syscall error rather than
/// a panic or a hang.
#[test]
fn unprivileged_clone_fails_with_syscall_error() {
    if nix::unistd::Uid::current().is_root() {
        return;
    }
    let rootfs = TempDir::new().unwrap();
    let hostname = format!("t-{}", rand_string(8));
    let request = ContainerRequest::options()
        .uid(0)
        .hostname(hostname)
        .mount_source(rootfs.as_path())
        .command("/bin/true")
        .build()
        .unwrap();

    let err = enclosure::launch(request, ResourceLimits::default(), Default::default(), None)
        .unwrap_err();
    assert!(matches!(err, Error::Syscall("clone3", _)));
}
