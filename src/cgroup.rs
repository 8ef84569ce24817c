use std::fs::{remove_dir, DirBuilder, File};
use std::io::{ErrorKind, Write as _};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use crate::clone::{ignore_kind, Pid};
use crate::Error;

const CGROUP_MOUNT: &str = "/sys/fs/cgroup";

/// Fixed policy applied to every launched container's cgroup, per
/// `CGroupController::apply`. Surfaced as a value rather than compiled-in
/// constants so a caller can override the defaults.
#[derive(Clone, Copy, Debug)]
pub struct ResourceLimits {
    pub memory_max_bytes: u64,
    pub cpu_weight: u32,
    pub pids_max: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_max_bytes: 1 << 30,
            cpu_weight: 256,
            pids_max: 64,
        }
    }
}

/// Identifies a single cgroup v2 directory at `<cgroup-root>/<hostname>`.
/// The handle exclusively owns the directory: `apply` fails if it already
/// exists, and `release` must only run after Init and its descendants have
/// been reaped.
#[derive(Clone, Debug)]
pub struct CGroupHandle {
    path: PathBuf,
}

impl CGroupHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates `<cgroup-root>/<hostname>`, writes the fixed resource limits,
    /// then appends `pid` to `cgroup.procs`. Limits are written strictly
    /// before pid attachment so Init can never run in the group before its
    /// ceiling is in place.
    pub fn apply(hostname: &str, pid: Pid, limits: ResourceLimits) -> Result<Self, Error> {
        let path = Path::new(CGROUP_MOUNT).join(hostname);
        DirBuilder::new()
            .mode(0o700)
            .create(&path)
            .map_err(|e| Error::host_state(format!("mkdir {}: {}", path.display(), e)))?;
        let handle = Self { path };
        if let Err(err) = handle.write_limits(limits).and_then(|_| handle.attach(pid)) {
            let _ = handle.release();
            return Err(err);
        }
        Ok(handle)
    }

    fn write_limits(&self, limits: ResourceLimits) -> Result<(), Error> {
        self.write_attr("memory.max", &limits.memory_max_bytes.to_string())?;
        self.write_attr("cpu.weight", &limits.cpu_weight.to_string())?;
        self.write_attr("pids.max", &limits.pids_max.to_string())?;
        Ok(())
    }

    fn attach(&self, pid: Pid) -> Result<(), Error> {
        self.write_attr("cgroup.procs", &pid.as_raw().to_string())
    }

    fn write_attr(&self, name: &str, value: &str) -> Result<(), Error> {
        File::options()
            .write(true)
            .open(self.path.join(name))
            .and_then(|mut f| f.write_all(value.as_bytes()))
            .map_err(|e| Error::host_state(format!("write {}/{}: {}", self.path.display(), name, e)))
    }

    /// Removes the cgroup directory. Only valid once Init and all
    /// descendants have exited; the kernel refuses to remove a populated
    /// cgroup.
    pub fn release(&self) -> Result<(), Error> {
        ignore_kind(remove_dir(&self.path), ErrorKind::NotFound)
            .map_err(|e| Error::host_state(format!("rmdir {}: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_match_fixed_policy() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.memory_max_bytes, 1024 * 1024 * 1024);
        assert_eq!(limits.cpu_weight, 256);
        assert_eq!(limits.pids_max, 64);
    }
}
