use std::fs::remove_dir as rmdir;
use std::path::Path;

use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::unistd::{chdir, pivot_root};
use tempfile::Builder;

use crate::Error;

const SCRATCH_DIR: &str = "/tmp";
const MOUNT_PREFIX: &str = "enclosure-mnt.";
const OLDROOT_PREFIX: &str = "enclosure-oldroot.";

/// Bind-mounts `mount_source` and pivots Init's root onto it, using a
/// scratch temporary directory and an inner holding pen for the previous
/// root rather than a self-bind pivot, so that the previous root can be
/// lazily detached and removed from inside the new root.
///
/// Runs inside Init, after the mount namespace has been entered but before
/// the user namespace handshake, per the coordinator's sequence.
pub(crate) fn pivot(mount_source: &Path) -> Result<(), Error> {
    // Step 1: make the whole mount tree private and recursive so nothing
    // that follows propagates back to the host.
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| Error::syscall("mount(MS_PRIVATE)", e))?;

    // Step 2-3: bind-mount the requested root onto a fresh scratch directory.
    let mount_dir = Builder::new()
        .prefix(MOUNT_PREFIX)
        .tempdir_in(SCRATCH_DIR)
        .map_err(|e| Error::host_state(format!("mkdtemp {SCRATCH_DIR}: {e}")))?
        .keep();
    mount(
        Some(mount_source),
        &mount_dir,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| Error::syscall("mount(MS_BIND)", e))?;
    mount(
        None::<&str>,
        &mount_dir,
        None::<&str>,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| Error::syscall("mount(MS_PRIVATE)", e))?;

    // Step 4: a holding pen inside the new root for the previous one.
    let old_root_dir = Builder::new()
        .prefix(OLDROOT_PREFIX)
        .tempdir_in(&mount_dir)
        .map_err(|e| Error::host_state(format!("mkdtemp {}: {}", mount_dir.display(), e)))?
        .keep();
    let old_root_name = old_root_dir
        .file_name()
        .expect("tempdir has a file name")
        .to_owned();

    // Step 5: atomic pivot. The bind-mount becomes `/`; the previous root
    // ends up stacked at `/<old_root_name>` relative to the new `/`.
    pivot_root(&mount_dir, &old_root_dir).map_err(|e| Error::syscall("pivot_root", e))?;

    // Step 6.
    chdir("/").map_err(|e| Error::syscall("chdir", e))?;

    // Step 7: lazily detach the stacked old root and remove the now-empty
    // holding directory.
    let old_root = Path::new("/").join(&old_root_name);
    umount2(&old_root, MntFlags::MNT_DETACH).map_err(|e| Error::syscall("umount2", e))?;
    rmdir(&old_root).map_err(|e| Error::host_state(format!("rmdir {}: {}", old_root.display(), e)))?;

    Ok(())
}
