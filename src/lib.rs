mod cgroup;
mod clone;
mod coordinator;
mod error;
mod event;
mod filter;
mod ipc;
mod mount;
mod request;
mod userns;

pub use cgroup::{CGroupHandle, ResourceLimits};
pub use coordinator::{launch, LaunchOutcome};
pub use error::Error;
pub use event::{Event, Severity, Sink, TracingSink};
pub use request::{ContainerRequest, ContainerRequestOptions};
pub use userns::{IdRange, RemappingState};
