use std::ffi::CString;
use std::panic::{catch_unwind, AssertUnwindSafe};

use nix::sys::signal::{kill, Signal};
use nix::unistd::{execv, sethostname, Gid};

use crate::cgroup::{CGroupHandle, ResourceLimits};
use crate::clone::{clone3, exit_child, CloneArgs, CloneResult, OwnedPid};
use crate::event::{emit, emit_err, Severity, Sink, TracingSink};
use crate::ipc::IpcChannel;
use crate::mount;
use crate::request::ContainerRequest;
use crate::userns::{self, IdRange};
use crate::{filter, Error};

const COMPONENT: &str = "coordinator";

/// Outcome of a single launch: the exit code to propagate as the
/// Supervisor's own exit code, per spec's "boolean OR of its own failure
/// flag and a truncation of Init's exit status."
#[derive(Debug)]
pub struct LaunchOutcome {
    pub exit_code: i32,
}

/// Orchestrates a single container launch end to end: clone-with-namespaces,
/// the cgroup and user-remapping handshake, waiting for Init, and cleanup.
///
/// The user namespace is deliberately not requested at clone time; Init
/// creates it itself during the handshake so the unshare-then-map sequence
/// can be synchronized with the Supervisor (see `userns`).
pub fn launch(
    request: ContainerRequest,
    limits: ResourceLimits,
    id_range: IdRange,
    sink: Option<std::sync::Arc<dyn Sink>>,
) -> Result<LaunchOutcome, Error> {
    let sink: std::sync::Arc<dyn Sink> = sink.unwrap_or_else(|| std::sync::Arc::new(TracingSink));

    let (supervisor_end, init_end) = IpcChannel::pair()?;

    let mut clone_args = CloneArgs::default();
    clone_args.flag_newns();
    clone_args.flag_newpid();
    clone_args.flag_newipc();
    clone_args.flag_newuts();
    clone_args.flag_newcgroup();

    match unsafe { clone3(&clone_args) }.map_err(|e| Error::syscall("clone3", e))? {
        CloneResult::Child => {
            drop(supervisor_end);
            let result = catch_unwind(AssertUnwindSafe(move || run_init(request, init_end, sink)));
            // run_init only returns (an Error) on failure, and may also
            // panic; either way Init must never unwind back to the
            // caller's stack, so it always exits here instead of returning.
            exit_child(Err::<(), _>(result))
        }
        CloneResult::Parent { child } => {
            drop(init_end);
            let child = unsafe { OwnedPid::from_raw(child) };
            run_supervisor(child, request, limits, id_range, supervisor_end, sink)
        }
    }
}

fn run_supervisor(
    child: OwnedPid,
    request: ContainerRequest,
    limits: ResourceLimits,
    id_range: IdRange,
    channel: IpcChannel,
    sink: std::sync::Arc<dyn Sink>,
) -> Result<LaunchOutcome, Error> {
    let pid = child.as_raw();

    let cgroup = match CGroupHandle::apply(request.hostname(), pid, limits) {
        Ok(v) => v,
        Err(err) => {
            emit_err(
                sink.as_ref(),
                Severity::Fatal,
                COMPONENT,
                "cannot attach cgroup",
                &err,
            );
            let _ = kill(pid, Signal::SIGTERM);
            child.wait_status()?;
            return Err(err);
        }
    };

    let remap_result = userns::remap_parent(&channel, pid, id_range);
    if let Err(err) = remap_result {
        emit_err(
            sink.as_ref(),
            Severity::Fatal,
            COMPONENT,
            "cannot install uid/gid mapping",
            &err,
        );
        let _ = kill(pid, Signal::SIGTERM);
        let _ = child.wait_status();
        emit(sink.as_ref(), Severity::Debug, COMPONENT, "releasing cgroup after failure");
        let _ = cgroup.release();
        return Err(err);
    }

    let exit_code = child.wait_status()?;
    emit(sink.as_ref(), Severity::Debug, COMPONENT, "releasing cgroup");
    cgroup.release()?;
    Ok(LaunchOutcome { exit_code })
}

/// Init's sequence after spawn: set hostname, pivot root, complete the user
/// namespace handshake, drop capabilities and install the syscall filter,
/// then replace itself with the requested command. Only returns on error;
/// success ends in `execv`, which never returns to the caller.
fn run_init(request: ContainerRequest, channel: IpcChannel, sink: std::sync::Arc<dyn Sink>) -> Error {
    if let Err(err) = run_init_inner(&request, &channel) {
        emit_err(sink.as_ref(), Severity::Fatal, "init", "container launch failed", &err);
        return err;
    }
    unreachable!("run_init_inner only returns Err; success execs")
}

fn run_init_inner(request: &ContainerRequest, channel: &IpcChannel) -> Result<(), Error> {
    sethostname(request.hostname()).map_err(|e| Error::syscall("sethostname", e))?;

    mount::pivot(request.mount_source())?;

    let gid = Gid::from_raw(request.uid().as_raw());
    userns::remap_child(channel, request.uid(), gid)?;

    filter::apply()?;

    exec_command(request)
}

fn exec_command(request: &ContainerRequest) -> Result<(), Error> {
    let command_str = request
        .command()
        .to_str()
        .ok_or_else(|| Error::configuration("command path must be valid UTF-8"))?;
    let command_cstr = CString::new(command_str)?;
    let mut argv = vec![command_cstr.clone()];
    if let Some(argument) = request.argument() {
        argv.push(CString::new(argument.as_bytes())?);
    }
    execv(&command_cstr, &argv).map_err(|e| Error::syscall("execv", e))?;
    unreachable!("execv only returns on error")
}
