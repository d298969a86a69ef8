use crate::error::{Result, WardenError};
use serde_json::Value;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};
use tracing::debug;

/// Check that a value can name a single OS process
pub fn validate_pid(pid: i64) -> Result<u32> {
    if pid <= 0 {
        return Err(WardenError::InvalidPid(format!(
            "PID must be a positive integer [{}]",
            pid
        )));
    }

    if pid > i64::from(i32::MAX) {
        return Err(WardenError::InvalidPid(format!(
            "PID is out of range [{}]",
            pid
        )));
    }

    Ok(pid as u32)
}

/// Read an optional pid from a persisted JSON value
pub fn pid_from_value(value: Option<&Value>) -> Result<Option<u32>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(pid) => validate_pid(pid).map(Some),
            None => Err(WardenError::InvalidPid(format!(
                "PID must be an integer [{}]",
                n
            ))),
        },
        Some(other) => Err(WardenError::InvalidPid(format!(
            "PID must be an integer [{}]",
            other
        ))),
    }
}

/// OS process liveness and termination
pub struct ProcessProbe {
    system: System,
}

impl ProcessProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Check whether `pid` refers to a running, non-zombie process
    pub fn is_alive(&mut self, pid: i64) -> Result<bool> {
        let pid = validate_pid(pid)?;
        let sys_pid = Pid::from_u32(pid);

        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::everything(),
        );

        let alive = match self.system.process(sys_pid) {
            Some(process) => !matches!(process.status(), ProcessStatus::Zombie),
            None => false,
        };

        debug!("pid {} alive: {}", pid, alive);
        Ok(alive)
    }

    /// Ask a process to exit; does not wait for it
    #[cfg(unix)]
    pub fn terminate(&mut self, pid: i64) -> Result<()> {
        use nix::sys::signal::{self, Signal};

        let pid = validate_pid(pid)?;
        signal::kill(nix::unistd::Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(|e| {
            WardenError::ProcessError(format!("Failed to send SIGTERM to {}: {}", pid, e))
        })?;

        debug!("sent SIGTERM to pid {}", pid);
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn terminate(&mut self, pid: i64) -> Result<()> {
        let pid = validate_pid(pid)?;
        let sys_pid = Pid::from_u32(pid);

        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::everything(),
        );

        let process = self
            .system
            .process(sys_pid)
            .ok_or_else(|| WardenError::ProcessError(format!("No such process: {}", pid)))?;

        let delivered = match process.kill_with(sysinfo::Signal::Term) {
            Some(delivered) => delivered,
            None => process.kill(),
        };

        if !delivered {
            return Err(WardenError::ProcessError(format!(
                "Failed to terminate process {}",
                pid
            )));
        }

        Ok(())
    }

    /// Collect exit statuses of finished children so they don't linger as zombies
    ///
    /// Only matters for a long-running supervisor; returns the reaped pids.
    #[cfg(unix)]
    pub fn reap_exited_children(&self) -> Vec<u32> {
        use nix::errno::Errno;
        use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};

        let mut reaped = Vec::new();

        loop {
            match waitpid(Option::<nix::unistd::Pid>::None, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => break,
                Ok(status) => match status.pid() {
                    Some(pid) => reaped.push(pid.as_raw() as u32),
                    None => break,
                },
                Err(Errno::ECHILD) => break,
                Err(e) => {
                    debug!("waitpid failed: {}", e);
                    break;
                }
            }
        }

        reaped
    }

    #[cfg(not(unix))]
    pub fn reap_exited_children(&self) -> Vec<u32> {
        Vec::new()
    }
}

impl Default for ProcessProbe {
    fn default() -> Self {
        Self::new()
    }
}
