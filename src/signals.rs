use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::Deserialize;
use std::fmt;

/// Signals the harness knows how to inject into a process under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// Ask the process to reload its configuration
    Reload,
    /// Ask the process to shut down gracefully
    Terminate,
}

impl SignalKind {
    /// Platform signal backing this kind.
    pub fn as_signal(self) -> Signal {
        match self {
            SignalKind::Reload => Signal::SIGUSR1,
            SignalKind::Terminate => Signal::SIGTERM,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Reload => write!(f, "reload"),
            SignalKind::Terminate => write!(f, "terminate"),
        }
    }
}

/// Sends `signal` to a single process.
pub fn send_to_process(pid: Pid, signal: Signal) -> nix::Result<()> {
    kill(pid, signal)
}

/// Sends `signal` to every member of the process group led by `pgid`.
pub fn send_to_group(pgid: Pid, signal: Signal) -> nix::Result<()> {
    kill(Pid::from_raw(-pgid.as_raw()), signal)
}

/// Whether a process with `pid` still exists (zombies included).
pub fn is_alive(pid: Pid) -> bool {
    kill(pid, None).is_ok()
}
