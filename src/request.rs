use std::path::PathBuf;

use nix::unistd::Uid;

use crate::Error;

const MAX_HOSTNAME_LEN: usize = 64;

/// Immutable, fully-populated request for a single container launch. Built
/// with `ContainerRequest::options()`; no field mutates once `build()`
/// succeeds, matching the invariant that nothing changes after Init spawns.
#[derive(Clone, Debug)]
pub struct ContainerRequest {
    pub(crate) uid: Uid,
    pub(crate) hostname: String,
    pub(crate) mount_source: PathBuf,
    pub(crate) command: PathBuf,
    pub(crate) argument: Option<String>,
}

impl ContainerRequest {
    pub fn options() -> ContainerRequestOptions {
        ContainerRequestOptions::default()
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn mount_source(&self) -> &std::path::Path {
        &self.mount_source
    }

    pub fn command(&self) -> &std::path::Path {
        &self.command
    }

    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ContainerRequestOptions {
    uid: Option<Uid>,
    hostname: Option<String>,
    mount_source: Option<PathBuf>,
    command: Option<PathBuf>,
    argument: Option<String>,
}

impl ContainerRequestOptions {
    pub fn uid(mut self, uid: u32) -> Self {
        self.uid = Some(Uid::from_raw(uid));
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn mount_source(mut self, mount_source: impl Into<PathBuf>) -> Self {
        self.mount_source = Some(mount_source.into());
        self
    }

    pub fn command(mut self, command: impl Into<PathBuf>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn argument(mut self, argument: impl Into<String>) -> Self {
        self.argument = Some(argument.into());
        self
    }

    /// Validates the request per the coordinator's first sequencing step:
    /// non-empty command, existing mount source, hostname within length and
    /// character constraints.
    pub fn build(self) -> Result<ContainerRequest, Error> {
        let uid = self.uid.ok_or_else(|| Error::configuration("uid is required"))?;
        let hostname = self
            .hostname
            .ok_or_else(|| Error::configuration("hostname is required"))?;
        validate_hostname(&hostname)?;
        let mount_source = self
            .mount_source
            .ok_or_else(|| Error::configuration("mount_source is required"))?;
        if !mount_source.is_dir() {
            return Err(Error::configuration(format!(
                "mount_source {} is not an existing directory",
                mount_source.display()
            )));
        }
        let command = self
            .command
            .ok_or_else(|| Error::configuration("command is required"))?;
        if !command.is_absolute() {
            return Err(Error::configuration(format!(
                "command {} must be an absolute path",
                command.display()
            )));
        }
        Ok(ContainerRequest {
            uid,
            hostname,
            mount_source,
            command,
            argument: self.argument,
        })
    }
}

fn validate_hostname(hostname: &str) -> Result<(), Error> {
    if hostname.is_empty() || hostname.len() > MAX_HOSTNAME_LEN {
        return Err(Error::configuration(format!(
            "hostname must be 1-{MAX_HOSTNAME_LEN} characters, got {}",
            hostname.len()
        )));
    }
    let filesystem_safe = hostname
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if !filesystem_safe {
        return Err(Error::configuration(format!(
            "hostname {hostname:?} contains characters unsafe for a cgroup directory name"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_hostname() {
        assert!(validate_hostname("").is_err());
    }

    #[test]
    fn rejects_hostname_with_path_separator() {
        assert!(validate_hostname("a/b").is_err());
    }

    #[test]
    fn rejects_overlong_hostname() {
        let long = "a".repeat(MAX_HOSTNAME_LEN + 1);
        assert!(validate_hostname(&long).is_err());
    }

    #[test]
    fn accepts_simple_hostname() {
        assert!(validate_hostname("t1").is_ok());
    }

    #[test]
    fn build_rejects_relative_command() {
        let dir = tempfile::tempdir().unwrap();
        let err = ContainerRequest::options()
            .uid(0)
            .hostname("t1")
            .mount_source(dir.path())
            .command("bin/true")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn build_rejects_missing_mount_source() {
        let err = ContainerRequest::options()
            .uid(0)
            .hostname("t1")
            .mount_source("/does/not/exist")
            .command("/bin/true")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
