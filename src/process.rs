use super::Result;
use chrono::{DateTime, Local};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::catalog::{Injection, ProcessSpec};
use crate::outcome::{ExitState, InjectionReport, ProcessResult};
use crate::signals::{self, SignalKind};

/// Private file a process's output stream is redirected into.
///
/// Backed by an anonymous temporary file so output survives the process
/// being killed and never blocks on a full pipe.
#[derive(Debug)]
pub struct CaptureSink {
    file: File,
}

impl CaptureSink {
    pub fn new() -> Result<Self> {
        Ok(Self { file: tempfile::tempfile()? })
    }

    /// A handle the child can write to.
    pub fn stdio(&self) -> Result<Stdio> {
        Ok(Stdio::from(self.file.try_clone()?))
    }

    /// Everything written so far.
    pub fn drain(&mut self) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        self.file.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// State of a managed process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Process is running
    Running,
    /// A termination request has been sent
    Stopping,
    /// Process has exited or been killed
    Stopped,
    /// Process could not be started, or waiting on it failed
    Failed,
}

/// One launched process of a case, from spawn until its result is frozen.
pub struct ManagedProcess {
    name: String,
    injection: Option<Injection>,
    child: Option<Child>,
    pid: Option<Pid>,
    state: ProcessState,
    started: Instant,
    launched_at: DateTime<Local>,
    stdout: CaptureSink,
    stderr: CaptureSink,
    exit: Option<ExitState>,
    launch_error: Option<String>,
    injection_report: Option<InjectionReport>,
}

impl ManagedProcess {
    /// Starts `spec` with its environment overrides and private capture sinks.
    ///
    /// A process that fails to spawn is still returned, in the `Failed`
    /// state with its launch error recorded. Only harness-side faults, such
    /// as being unable to create a capture sink, are returned as errors.
    pub fn launch(spec: &ProcessSpec) -> Result<Self> {
        let stdout = CaptureSink::new()?;
        let stderr = CaptureSink::new()?;

        // The harness environment is inherited as is, overrides go on top
        let mut command = Command::new(spec.command.program());
        command.args(spec.command.args());
        command.envs(spec.env.iter());
        command.stdin(Stdio::null());
        command.stdout(stdout.stdio()?);
        command.stderr(stderr.stdio()?);

        // Own process group, so forced termination also reaches grandchildren
        command.process_group(0);
        command.kill_on_drop(true);

        let mut process = Self {
            name: spec.name.clone(),
            injection: spec.injection,
            child: None,
            pid: None,
            state: ProcessState::Failed,
            started: Instant::now(),
            launched_at: Local::now(),
            stdout,
            stderr,
            exit: None,
            launch_error: None,
            injection_report: None,
        };

        info!("launching '{}': {}", spec.name, spec.command);
        match command.spawn() {
            Ok(child) => {
                if let Some(id) = child.id() {
                    process.pid = Some(Pid::from_raw(i32::try_from(id)?));
                }
                process.child = Some(child);
                process.state = ProcessState::Running;
                info!("'{}' spawned with PID: {:?}", spec.name, process.pid);
            }
            Err(e) => {
                warn!("failed to launch '{}': {}", spec.name, e);
                process.exit = Some(ExitState::Unknown);
                process.launch_error = Some(e.to_string());
            }
        }

        Ok(process)
    }

    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running || self.state == ProcessState::Stopping
    }

    /// Waits for the process to exit, delivering its injection on the way.
    ///
    /// The injection fires `delay` after this process was launched. If the
    /// process exits first the injection is recorded as skipped.
    pub async fn supervise(&mut self) {
        if let Some(injection) = self.injection {
            let at = self.started + injection.delay;
            let Some(child) = self.child.as_mut() else { return };

            let exited = tokio::select! {
                status = child.wait() => Some(status),
                _ = sleep_until(at) => None,
            };
            if let Some(status) = exited {
                self.record_exit(status);
                debug!("'{}' exited before its {} injection", self.name, injection.kind);
                self.injection_report = Some(InjectionReport::Skipped(injection.kind));
                return;
            }

            self.injection_report = Some(self.deliver(injection.kind));
        }

        self.wait_for_exit().await;
    }

    /// Waits for the current process to exit and records its status.
    pub async fn wait_for_exit(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if self.exit.is_none() {
                let status = child.wait().await;
                self.record_exit(status);
            }
        }
    }

    /// Sends an injected signal to this process alone.
    pub fn deliver(&self, kind: SignalKind) -> InjectionReport {
        let pid = match self.pid {
            Some(pid) if self.is_running() => pid,
            _ => return InjectionReport::Skipped(kind),
        };

        match signals::send_to_process(pid, kind.as_signal()) {
            Ok(()) => {
                info!("delivered {} signal to '{}' (pid {})", kind, self.name, pid);
                InjectionReport::Delivered(kind)
            }
            Err(nix::Error::ESRCH) => InjectionReport::Skipped(kind),
            Err(e) => {
                warn!("failed to deliver {} signal to '{}': {}", kind, self.name, e);
                InjectionReport::Failed { kind, reason: e.to_string() }
            }
        }
    }

    /// Asks a still-running process to terminate, escalating to a hard kill
    /// if it has not exited within `grace`.
    pub async fn terminate(&mut self, grace: Duration) {
        if !self.is_running() {
            return;
        }
        let Some(pid) = self.pid else { return };

        info!("terminating '{}' (pid {})", self.name, pid);
        self.state = ProcessState::Stopping;
        self.signal_group(pid, Signal::SIGTERM);

        let Some(child) = self.child.as_mut() else { return };
        match timeout(grace, child.wait()).await {
            Ok(status) => self.record_exit(status),
            Err(_) => {
                warn!("'{}' did not exit within {:?}, forcing kill", self.name, grace);
                self.force_kill(grace).await;
            }
        }
    }

    /// Kills the process group and reaps the child. The exit status is
    /// recorded as unknown.
    pub async fn force_kill(&mut self, grace: Duration) {
        if let Some(pid) = self.pid {
            self.signal_group(pid, Signal::SIGKILL);
        }

        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.start_kill() {
                debug!("start_kill on '{}': {}", self.name, e);
            }
            if timeout(grace, child.wait()).await.is_err() {
                error!("'{}' survived SIGKILL", self.name);
            }
        }

        self.exit = Some(ExitState::Unknown);
        self.state = ProcessState::Stopped;
    }

    /// Freezes the captured output and status into a result.
    pub fn finish(&mut self) -> Result<ProcessResult> {
        Ok(ProcessResult {
            name: self.name.clone(),
            pid: self.pid.and_then(|pid| u32::try_from(pid.as_raw()).ok()),
            launched_at: self.launched_at,
            stdout: self.stdout.drain()?,
            stderr: self.stderr.drain()?,
            exit: self.exit.unwrap_or(ExitState::Unknown),
            launch_error: self.launch_error.clone(),
            injection: self.injection_report.clone(),
        })
    }

    fn record_exit(&mut self, status: std::io::Result<ExitStatus>) {
        match status {
            Ok(status) => {
                info!("'{}' exited with status: {:?}", self.name, status);
                self.exit = Some(ExitState::from(status));
                self.state = ProcessState::Stopped;
            }
            Err(e) => {
                error!("error waiting for '{}': {}", self.name, e);
                self.exit = Some(ExitState::Unknown);
                self.state = ProcessState::Failed;
            }
        }
    }

    fn signal_group(&self, pid: Pid, signal: Signal) {
        debug!("sending {:?} to process group {}", signal, pid);
        let sent = signals::send_to_group(pid, signal)
            .or_else(|_| signals::send_to_process(pid, signal));
        match sent {
            Ok(()) | Err(nix::Error::ESRCH) => {}
            Err(e) => warn!("failed to send {:?} to '{}': {}", signal, self.name, e),
        }
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        // A case aborted by a harness error must not leave its process group behind
        if self.is_running() {
            if let Some(pid) = self.pid {
                warn!(
                    "'{}' dropped while running (PID: {}), killing process group",
                    self.name, pid
                );
                let _ = signals::send_to_group(pid, Signal::SIGKILL);
            }
        }
    }
}
